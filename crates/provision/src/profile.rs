use common::domain::Metadata;
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

/// Metadata key of thing templates replaced with the caller's external id
pub const EXTERNAL_ID_METADATA_KEY: &str = "external_id";

/// Credentials used when a request carries no token
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServerCredentials {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BootstrapSettings {
    /// Register a bootstrap config per thing
    #[serde(default)]
    pub provision: bool,
    /// Issue a client certificate per thing
    #[serde(default)]
    pub x509_provision: bool,
    /// Activate the bootstrap config of every thing
    #[serde(default)]
    pub auto_whitelist: bool,
    /// Content blob handed to devices on handshake
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EntityTemplate {
    pub name: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// What a provisioning run creates, and how
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProvisionProfile {
    #[serde(default)]
    pub server: ServerCredentials,
    #[serde(default)]
    pub bootstrap: BootstrapSettings,
    #[serde(default)]
    pub things: Vec<EntityTemplate>,
    #[serde(default)]
    pub channels: Vec<EntityTemplate>,
}

impl ProvisionProfile {
    /// Load a TOML profile, then apply `IOTFLUX_PROVISION_*` overrides
    /// (`__` separates nested keys, e.g. `IOTFLUX_PROVISION_SERVER__API_KEY`)
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::new(path, FileFormat::Toml))
            .add_source(
                Environment::with_prefix("IOTFLUX_PROVISION")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(raw, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static TEST_LOCK: Mutex<()> = Mutex::new(());

    const PROFILE: &str = r#"
[server]
user = "provisioner@example.com"
password = "12345678"

[bootstrap]
provision = true
x509_provision = true
auto_whitelist = true
content = '{"agent": {"interval": 30}}'

[[things]]
name = "gateway"

[things.metadata]
external_id = "placeholder"
kind = "edge"

[[channels]]
name = "control"

[channels.metadata]
type = "control"

[[channels]]
name = "data"
"#;

    #[test]
    fn test_parse_profile() {
        let profile = ProvisionProfile::from_toml(PROFILE).unwrap();

        assert_eq!(profile.server.user.as_deref(), Some("provisioner@example.com"));
        assert!(profile.server.api_key.is_none());
        assert!(profile.bootstrap.provision);
        assert!(profile.bootstrap.auto_whitelist);
        assert_eq!(profile.things.len(), 1);
        assert_eq!(profile.things[0].metadata["kind"], "edge");
        assert_eq!(profile.channels.len(), 2);
        assert!(profile.channels[1].metadata.is_empty());
    }

    #[test]
    fn test_empty_profile_defaults() {
        let profile = ProvisionProfile::from_toml("").unwrap();

        assert!(profile.things.is_empty());
        assert!(!profile.bootstrap.x509_provision);
    }

    #[test]
    fn test_env_overrides_file() {
        let _lock = TEST_LOCK.lock().unwrap();

        let path = std::env::temp_dir().join(format!("iotflux-profile-{}.toml", std::process::id()));
        std::fs::write(&path, PROFILE).unwrap();

        // SAFETY: Test runs with mutex lock to prevent concurrent env access
        unsafe {
            std::env::set_var("IOTFLUX_PROVISION_SERVER__API_KEY", "from-env");
        }

        let profile = ProvisionProfile::load(path.to_str().unwrap()).unwrap();
        assert_eq!(profile.server.api_key.as_deref(), Some("from-env"));
        assert_eq!(profile.channels.len(), 2);

        // SAFETY: Test runs with mutex lock to prevent concurrent env access
        unsafe {
            std::env::remove_var("IOTFLUX_PROVISION_SERVER__API_KEY");
        }
        let _ = std::fs::remove_file(path);
    }
}
