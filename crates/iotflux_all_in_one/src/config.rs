use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // NATS configuration
    /// NATS server URL
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// Startup timeout for initialization operations in seconds
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    /// JetStream stream carrying thing and channel lifecycle events
    #[serde(default = "default_things_stream")]
    pub things_stream: String,

    /// Subject filter for lifecycle consumers
    #[serde(default = "default_things_filter_subject")]
    pub things_filter_subject: String,

    /// JetStream stream carrying canonical messages (`channel.<id>`)
    #[serde(default = "default_channel_stream")]
    pub channel_stream: String,

    /// Batch size for lifecycle consumers
    #[serde(default = "default_nats_batch_size")]
    pub nats_batch_size: usize,

    /// Max wait time for batches in seconds
    #[serde(default = "default_nats_batch_wait_secs")]
    pub nats_batch_wait_secs: u64,

    /// Sleep after an empty poll, in milliseconds
    #[serde(default = "default_poll_idle_delay_ms")]
    pub poll_idle_delay_ms: u64,

    /// Sleep after a failed poll or halted batch, in milliseconds
    #[serde(default = "default_poll_error_delay_ms")]
    pub poll_error_delay_ms: u64,

    /// Identity of this instance within consumer groups
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    // LoRa adapter configuration
    /// Durable consumer shared by LoRa adapter instances
    #[serde(default = "default_lora_consumer_group")]
    pub lora_consumer_group: String,

    /// LoRa application server MQTT broker
    #[serde(default = "default_lora_mqtt_url")]
    pub lora_mqtt_url: String,

    #[serde(default = "default_lora_mqtt_client_id")]
    pub lora_mqtt_client_id: String,

    #[serde(default = "default_lora_mqtt_topic")]
    pub lora_mqtt_topic: String,

    #[serde(default = "default_lora_mqtt_max_retry_attempts")]
    pub lora_mqtt_max_retry_attempts: u32,

    #[serde(default = "default_lora_mqtt_retry_delay_secs")]
    pub lora_mqtt_retry_delay_secs: u64,

    // Bootstrap configuration
    /// Durable consumer shared by bootstrap instances
    #[serde(default = "default_bootstrap_consumer_group")]
    pub bootstrap_consumer_group: String,

    #[serde(default = "default_handshake_subject")]
    pub handshake_subject: String,

    #[serde(default = "default_handshake_queue_group")]
    pub handshake_queue_group: String,

    // Provision configuration
    #[serde(default = "default_provision_subject")]
    pub provision_subject: String,

    #[serde(default = "default_provision_queue_group")]
    pub provision_queue_group: String,

    /// TOML provisioning profile
    #[serde(default = "default_provision_config_path")]
    pub provision_config_path: String,

    // Collaborators
    #[serde(default = "default_things_url")]
    pub things_url: String,

    #[serde(default = "default_users_url")]
    pub users_url: String,

    #[serde(default = "default_certs_url")]
    pub certs_url: String,

    /// Bound on every collaborator call, in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    // OpenTelemetry configuration
    /// Enable OpenTelemetry export of traces and logs
    #[serde(default = "default_otel_enabled")]
    pub otel_enabled: bool,

    /// OTLP gRPC endpoint
    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_startup_timeout_secs() -> u64 {
    30
}

fn default_things_stream() -> String {
    "things".to_string()
}

fn default_things_filter_subject() -> String {
    "things.>".to_string()
}

fn default_channel_stream() -> String {
    "channel".to_string()
}

fn default_nats_batch_size() -> usize {
    50
}

fn default_nats_batch_wait_secs() -> u64 {
    5
}

fn default_poll_idle_delay_ms() -> u64 {
    500
}

fn default_poll_error_delay_ms() -> u64 {
    1000
}

fn default_instance_name() -> String {
    "iotflux-0".to_string()
}

fn default_lora_consumer_group() -> String {
    "lora-adapter".to_string()
}

fn default_lora_mqtt_url() -> String {
    "mqtt://localhost:1883".to_string()
}

fn default_lora_mqtt_client_id() -> String {
    "iotflux-lora-adapter".to_string()
}

fn default_lora_mqtt_topic() -> String {
    lora_adapter::UPLINK_TOPIC.to_string()
}

fn default_lora_mqtt_max_retry_attempts() -> u32 {
    10
}

fn default_lora_mqtt_retry_delay_secs() -> u64 {
    5
}

fn default_bootstrap_consumer_group() -> String {
    "bootstrap".to_string()
}

fn default_handshake_subject() -> String {
    bootstrap::HANDSHAKE_SUBJECT.to_string()
}

fn default_handshake_queue_group() -> String {
    "bootstrap".to_string()
}

fn default_provision_subject() -> String {
    provision::PROVISION_SUBJECT.to_string()
}

fn default_provision_queue_group() -> String {
    "provision".to_string()
}

fn default_provision_config_path() -> String {
    "config/provision.toml".to_string()
}

fn default_things_url() -> String {
    "http://localhost:9000".to_string()
}

fn default_users_url() -> String {
    "http://localhost:9002".to_string()
}

fn default_certs_url() -> String {
    "http://localhost:9019".to_string()
}

fn default_request_timeout_ms() -> u64 {
    1000
}

fn default_otel_enabled() -> bool {
    false
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_service_name() -> String {
    "iotflux".to_string()
}

impl ServiceConfig {
    /// Load configuration from `IOTFLUX_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("IOTFLUX"))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Tests touching the process environment run serially
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_default_config() {
        let _lock = TEST_LOCK.lock().unwrap();

        // SAFETY: Test runs with mutex lock to prevent concurrent env access
        unsafe {
            std::env::remove_var("IOTFLUX_LOG_LEVEL");
            std::env::remove_var("IOTFLUX_REQUEST_TIMEOUT_MS");
        }

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.things_stream, "things");
        assert_eq!(config.channel_stream, "channel");
        assert_eq!(config.request_timeout_ms, 1000);
        assert_eq!(config.handshake_subject, "bootstrap.handshake");
        assert_eq!(config.provision_subject, "provision.requests");
        assert_eq!(config.lora_mqtt_topic, "application/+/device/+/rx");
    }

    #[test]
    fn test_custom_config() {
        let _lock = TEST_LOCK.lock().unwrap();

        // SAFETY: Test runs with mutex lock to prevent concurrent env access
        unsafe {
            std::env::set_var("IOTFLUX_LOG_LEVEL", "debug");
            std::env::set_var("IOTFLUX_REQUEST_TIMEOUT_MS", "2500");
        }

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.request_timeout_ms, 2500);

        // SAFETY: Test runs with mutex lock to prevent concurrent env access
        unsafe {
            std::env::remove_var("IOTFLUX_LOG_LEVEL");
            std::env::remove_var("IOTFLUX_REQUEST_TIMEOUT_MS");
        }
    }
}
