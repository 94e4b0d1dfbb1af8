use common::domain::DomainError;
use serde::Serialize;
use thiserror::Error;

/// Step of a provisioning run a failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionStage {
    Authenticate,
    ValidateTemplates,
    ThingCreation,
    ThingRetrieval,
    ChannelCreation,
    ChannelRetrieval,
    Bootstrap,
    CertIssuance,
    Whitelist,
}

/// What must be undone after a failure at a given stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Compensation {
    /// Delete things and channels created by the run
    pub delete_entities: bool,
    /// Revoke certificates of created things, when certificates were requested
    pub revoke_certs: bool,
    /// Look up and remove the bootstrap entry of every created thing
    pub remove_bootstrap: bool,
}

impl ProvisionStage {
    pub fn compensation(self) -> Compensation {
        let (delete_entities, revoke_certs, remove_bootstrap) = match self {
            Self::Authenticate | Self::ValidateTemplates => (false, false, false),
            Self::ThingCreation
            | Self::ThingRetrieval
            | Self::ChannelCreation
            | Self::ChannelRetrieval
            | Self::CertIssuance => (true, false, false),
            // Earlier things of the run may already hold an entry
            Self::Bootstrap | Self::Whitelist => (true, true, true),
        };
        Compensation {
            delete_entities,
            revoke_certs,
            remove_bootstrap,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("missing credentials")]
    MissingCredentials,

    #[error("failed to create access token: {0}")]
    FailedToCreateToken(#[source] DomainError),

    #[error("things list in profile is empty")]
    EmptyThingsList,

    #[error("channels list in profile is empty")]
    EmptyChannelsList,

    #[error("failed to create thing: {0}")]
    FailedThingCreation(#[source] DomainError),

    #[error("failed to retrieve thing {thing_id}: {source}")]
    FailedThingRetrieval { thing_id: String, source: DomainError },

    #[error("failed to create channel: {0}")]
    FailedChannelCreation(#[source] DomainError),

    #[error("failed to retrieve channel {channel_id}: {source}")]
    FailedChannelRetrieval { channel_id: String, source: DomainError },

    #[error("failed to create bootstrap config for thing {thing_id}: {source}")]
    FailedBootstrap { thing_id: String, source: DomainError },

    #[error("failed to create certificates for thing {thing_id}: {source}")]
    FailedCertCreation { thing_id: String, source: DomainError },

    #[error("failed to whitelist thing {thing_id}: {source}")]
    FailedWhitelist { thing_id: String, source: DomainError },
}

impl ProvisionError {
    pub fn stage(&self) -> ProvisionStage {
        match self {
            Self::MissingCredentials | Self::FailedToCreateToken(_) => ProvisionStage::Authenticate,
            Self::EmptyThingsList | Self::EmptyChannelsList => ProvisionStage::ValidateTemplates,
            Self::FailedThingCreation(_) => ProvisionStage::ThingCreation,
            Self::FailedThingRetrieval { .. } => ProvisionStage::ThingRetrieval,
            Self::FailedChannelCreation(_) => ProvisionStage::ChannelCreation,
            Self::FailedChannelRetrieval { .. } => ProvisionStage::ChannelRetrieval,
            Self::FailedBootstrap { .. } => ProvisionStage::Bootstrap,
            Self::FailedCertCreation { .. } => ProvisionStage::CertIssuance,
            Self::FailedWhitelist { .. } => ProvisionStage::Whitelist,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_of_error() {
        let err = ProvisionError::FailedWhitelist {
            thing_id: "th-1".into(),
            source: DomainError::Unavailable("timeout".into()),
        };
        assert_eq!(err.stage(), ProvisionStage::Whitelist);
        assert_eq!(
            err.to_string(),
            "failed to whitelist thing th-1: Service unavailable: timeout"
        );
        assert_eq!(
            ProvisionError::EmptyChannelsList.stage(),
            ProvisionStage::ValidateTemplates
        );
    }

    #[test]
    fn test_compensation_scope_grows_with_stage() {
        assert!(!ProvisionStage::ValidateTemplates.compensation().delete_entities);

        let fetch = ProvisionStage::ThingRetrieval.compensation();
        assert!(fetch.delete_entities && !fetch.revoke_certs && !fetch.remove_bootstrap);

        let bootstrap = ProvisionStage::Bootstrap.compensation();
        assert!(bootstrap.revoke_certs && bootstrap.remove_bootstrap);

        let whitelist = ProvisionStage::Whitelist.compensation();
        assert!(whitelist.delete_entities && whitelist.revoke_certs && whitelist.remove_bootstrap);
    }

    #[test]
    fn test_stage_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(ProvisionStage::CertIssuance).unwrap(),
            "cert_issuance"
        );
    }
}
