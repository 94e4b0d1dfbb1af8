use common::domain::{DomainError, DomainResult};

/// Uplink topic of the LoRa application server, every application and device
pub const UPLINK_TOPIC: &str = "application/+/device/+/rx";

/// Parsed uplink topic
#[derive(Debug, Clone, PartialEq)]
pub struct UplinkTopic {
    pub app_id: String,
    pub dev_eui: String,
}

/// Parse a topic in the format `application/{app_id}/device/{dev_eui}/rx`
///
/// # Examples
/// ```
/// use lora_adapter::parse_uplink_topic;
///
/// let parsed = parse_uplink_topic("application/3/device/0102030405060708/rx").unwrap();
/// assert_eq!(parsed.app_id, "3");
/// assert_eq!(parsed.dev_eui, "0102030405060708");
/// ```
pub fn parse_uplink_topic(topic: &str) -> DomainResult<UplinkTopic> {
    match topic.split('/').collect::<Vec<_>>().as_slice() {
        ["application", app_id, "device", dev_eui, "rx"]
            if !app_id.is_empty() && !dev_eui.is_empty() =>
        {
            Ok(UplinkTopic {
                app_id: app_id.to_string(),
                dev_eui: dev_eui.to_string(),
            })
        }
        _ => Err(DomainError::MalformedFrame(format!(
            "Invalid topic '{}': expected 'application/{{app_id}}/device/{{dev_eui}}/rx'",
            topic
        ))),
    }
}
