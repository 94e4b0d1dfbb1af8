use crate::domain::result::DomainResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Client certificate material issued for a thing
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Cert {
    pub client_cert: String,
    pub client_key: String,
    pub ca_cert: String,
}

/// Certificate authority collaborator
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CertsClient: Send + Sync {
    async fn issue_cert(&self, token: &str, thing_id: &str, thing_key: &str) -> DomainResult<Cert>;

    async fn revoke_cert(&self, token: &str, thing_id: &str) -> DomainResult<()>;
}
