use common::domain::{Channel, Thing};
use serde::Serialize;
use std::collections::BTreeMap;

/// Everything a successful provisioning run created
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ProvisionResult {
    pub things: Vec<Thing>,
    pub channels: Vec<Channel>,
    /// Client certificate per thing id
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub client_cert: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub client_key: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub ca_cert: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub whitelisted: BTreeMap<String, bool>,
}
