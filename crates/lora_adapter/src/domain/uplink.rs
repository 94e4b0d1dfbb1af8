use base64::{Engine as _, engine::general_purpose::STANDARD};
use common::domain::{DomainError, DomainResult};
use serde::Deserialize;
use serde_json::Value;

/// Uplink event as published by the LoRa application server
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UplinkEvent {
    #[serde(rename = "applicationID")]
    application_id: Value,
    #[serde(rename = "devEUI")]
    dev_eui: String,
    #[serde(default)]
    data: String,
    #[serde(default)]
    f_port: Option<u32>,
}

/// A decoded uplink frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UplinkFrame {
    pub app_id: String,
    /// Lowercase 16-digit hex EUI-64 of the device
    pub dev_eui: String,
    pub payload: Vec<u8>,
    pub f_port: Option<u32>,
}

/// Decode an uplink payload.
///
/// Rejects frames whose application id is missing, whose devEUI is not an
/// EUI-64, or whose data is not base64.
pub fn decode_uplink(raw: &[u8]) -> DomainResult<UplinkFrame> {
    let event: UplinkEvent = serde_json::from_slice(raw)
        .map_err(|e| DomainError::MalformedFrame(format!("invalid uplink JSON: {}", e)))?;

    let app_id = match event.application_id {
        Value::String(id) if !id.is_empty() => id,
        Value::Number(id) => id.to_string(),
        other => {
            return Err(DomainError::MalformedFrame(format!(
                "invalid applicationID: {}",
                other
            )));
        }
    };

    let dev_eui = normalize_dev_eui(&event.dev_eui)?;

    let payload = STANDARD
        .decode(event.data.as_bytes())
        .map_err(|e| DomainError::MalformedFrame(format!("data is not base64: {}", e)))?;

    Ok(UplinkFrame {
        app_id,
        dev_eui,
        payload,
        f_port: event.f_port,
    })
}

fn normalize_dev_eui(raw: &str) -> DomainResult<String> {
    if raw.len() != 16 || !raw.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(DomainError::MalformedFrame(format!(
            "devEUI must be 16 hex digits, got {:?}",
            raw
        )));
    }
    Ok(raw.to_ascii_lowercase())
}
