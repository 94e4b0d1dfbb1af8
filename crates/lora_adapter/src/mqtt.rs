mod subscriber;
mod topic;

pub use subscriber::{MqttSubscriberConfig, run_mqtt_subscriber};
pub use topic::{UPLINK_TOPIC, UplinkTopic, parse_uplink_topic};
