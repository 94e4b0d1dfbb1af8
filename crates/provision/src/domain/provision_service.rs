use crate::domain::{Compensation, ProvisionError, ProvisionResult, ProvisionStage};
use crate::profile::{EXTERNAL_ID_METADATA_KEY, ProvisionProfile};
use common::domain::{
    BootstrapClient, BootstrapRequest, BootstrapState, CertsClient, Channel, CreateChannelInput,
    CreateThingInput, DomainError, DomainResult, Thing, ThingsRegistry, TokenIssuer, bounded,
};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Ids created by a run, recorded as soon as the registry returns them
#[derive(Debug, Default)]
struct RollbackLedger {
    things: Vec<String>,
    channels: Vec<String>,
}

/// Provisioning saga: creates the things and channels of the profile, then
/// bootstraps, certifies and whitelists every thing. Any failure undoes
/// what the run created, scoped by the stage that failed.
pub struct ProvisionService {
    profile: ProvisionProfile,
    registry: Arc<dyn ThingsRegistry>,
    tokens: Arc<dyn TokenIssuer>,
    certs: Arc<dyn CertsClient>,
    bootstrap: Arc<dyn BootstrapClient>,
    request_timeout: Duration,
}

impl ProvisionService {
    pub fn new(
        profile: ProvisionProfile,
        registry: Arc<dyn ThingsRegistry>,
        tokens: Arc<dyn TokenIssuer>,
        certs: Arc<dyn CertsClient>,
        bootstrap: Arc<dyn BootstrapClient>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            profile,
            registry,
            tokens,
            certs,
            bootstrap,
            request_timeout,
        }
    }

    async fn bounded<T>(&self, call: impl Future<Output = DomainResult<T>>) -> DomainResult<T> {
        bounded(self.request_timeout, call).await
    }

    /// Provision a device. An empty token is replaced with one derived from
    /// the profile credentials.
    #[instrument(skip(self, token, external_id, external_key), fields(external_id = %external_id))]
    pub async fn provision(
        &self,
        token: &str,
        external_id: &str,
        external_key: &str,
    ) -> Result<ProvisionResult, ProvisionError> {
        let token = self.authenticate(token).await?;

        if self.profile.things.is_empty() {
            return Err(ProvisionError::EmptyThingsList);
        }
        if self.profile.channels.is_empty() {
            return Err(ProvisionError::EmptyChannelsList);
        }

        let mut ledger = RollbackLedger::default();
        match self
            .run(&token, external_id, external_key, &mut ledger)
            .await
        {
            Ok(result) => {
                info!(
                    things = result.things.len(),
                    channels = result.channels.len(),
                    "device provisioned"
                );
                Ok(result)
            }
            Err(e) => {
                warn!(stage = ?e.stage(), error = %e, "provisioning failed, rolling back");
                self.compensate(&token, e.stage(), &ledger).await;
                Err(e)
            }
        }
    }

    async fn authenticate(&self, token: &str) -> Result<String, ProvisionError> {
        if !token.is_empty() {
            return Ok(token.to_string());
        }

        let server = &self.profile.server;
        if let Some(api_key) = server.api_key.as_deref().filter(|k| !k.is_empty()) {
            return Ok(api_key.to_string());
        }

        match (server.user.as_deref(), server.password.as_deref()) {
            (Some(user), Some(password)) if !user.is_empty() && !password.is_empty() => self
                .bounded(self.tokens.issue_token(user, password))
                .await
                .map_err(ProvisionError::FailedToCreateToken),
            _ => Err(ProvisionError::MissingCredentials),
        }
    }

    async fn run(
        &self,
        token: &str,
        external_id: &str,
        external_key: &str,
        ledger: &mut RollbackLedger,
    ) -> Result<ProvisionResult, ProvisionError> {
        let things = self.create_things(token, external_id, ledger).await?;
        let channels = self.create_channels(token, ledger).await?;
        let channel_ids: Vec<String> = channels.iter().map(|c| c.id.clone()).collect();

        let mut result = ProvisionResult {
            things,
            channels,
            ..Default::default()
        };
        let settings = &self.profile.bootstrap;

        for thing in &result.things {
            if settings.provision {
                // Client certs are per thing and issued after registration,
                // so only the CA cert can be carried here
                let request = BootstrapRequest {
                    thing_id: Some(thing.id.clone()),
                    external_id: external_id.to_string(),
                    external_key: external_key.to_string(),
                    channels: channel_ids.clone(),
                    name: thing.name.clone(),
                    content: settings.content.clone(),
                    ca_cert: result.ca_cert.clone(),
                    ..Default::default()
                };
                self.bounded(self.bootstrap.add_config(token, request))
                    .await
                    .map_err(|source| ProvisionError::FailedBootstrap {
                        thing_id: thing.id.clone(),
                        source,
                    })?;
            }

            if settings.x509_provision {
                let cert = self
                    .bounded(self.certs.issue_cert(token, &thing.id, &thing.key))
                    .await
                    .map_err(|source| ProvisionError::FailedCertCreation {
                        thing_id: thing.id.clone(),
                        source,
                    })?;
                result.client_cert.insert(thing.id.clone(), cert.client_cert);
                result.client_key.insert(thing.id.clone(), cert.client_key);
                result.ca_cert = cert.ca_cert;
            }

            if settings.auto_whitelist {
                self.bounded(
                    self.bootstrap
                        .change_state(token, &thing.id, BootstrapState::Active),
                )
                .await
                .map_err(|source| ProvisionError::FailedWhitelist {
                    thing_id: thing.id.clone(),
                    source,
                })?;
                result.whitelisted.insert(thing.id.clone(), true);
            }
        }

        Ok(result)
    }

    async fn create_things(
        &self,
        token: &str,
        external_id: &str,
        ledger: &mut RollbackLedger,
    ) -> Result<Vec<Thing>, ProvisionError> {
        let mut things = Vec::with_capacity(self.profile.things.len());

        for template in &self.profile.things {
            let mut metadata = template.metadata.clone();
            if let Some(value) = metadata.get_mut(EXTERNAL_ID_METADATA_KEY) {
                *value = Value::String(external_id.to_string());
            }
            let input = CreateThingInput {
                name: template.name.clone(),
                metadata,
            };

            let thing_id = self
                .bounded(self.registry.create_thing(token, input))
                .await
                .map_err(ProvisionError::FailedThingCreation)?;
            ledger.things.push(thing_id.clone());

            // Creation does not return the key
            let thing = self
                .bounded(self.registry.view_thing(token, &thing_id))
                .await
                .map_err(|source| ProvisionError::FailedThingRetrieval { thing_id, source })?;
            debug!(thing_id = %thing.id, "thing created");
            things.push(thing);
        }

        Ok(things)
    }

    async fn create_channels(
        &self,
        token: &str,
        ledger: &mut RollbackLedger,
    ) -> Result<Vec<Channel>, ProvisionError> {
        let mut channels = Vec::with_capacity(self.profile.channels.len());

        for template in &self.profile.channels {
            let input = CreateChannelInput {
                name: template.name.clone(),
                metadata: template.metadata.clone(),
            };

            let channel_id = self
                .bounded(self.registry.create_channel(token, input))
                .await
                .map_err(ProvisionError::FailedChannelCreation)?;
            ledger.channels.push(channel_id.clone());

            let channel = self
                .bounded(self.registry.view_channel(token, &channel_id))
                .await
                .map_err(|source| ProvisionError::FailedChannelRetrieval { channel_id, source })?;
            debug!(channel_id = %channel.id, "channel created");
            channels.push(channel);
        }

        Ok(channels)
    }

    /// Best-effort undo; failures are logged and never returned
    async fn compensate(&self, token: &str, stage: ProvisionStage, ledger: &RollbackLedger) {
        let Compensation {
            delete_entities,
            revoke_certs,
            remove_bootstrap,
        } = stage.compensation();

        if revoke_certs && self.profile.bootstrap.x509_provision {
            for thing_id in &ledger.things {
                log_failure(
                    "revoke certificate",
                    thing_id,
                    self.bounded(self.certs.revoke_cert(token, thing_id)).await,
                );
            }
        }

        if remove_bootstrap {
            for thing_id in &ledger.things {
                // The entry's thing id is only known once it is looked up
                match self
                    .bounded(self.bootstrap.view_config(token, thing_id))
                    .await
                {
                    Ok(summary) => log_failure(
                        "remove bootstrap config",
                        &summary.thing_id,
                        self.bounded(self.bootstrap.remove_config(token, &summary.thing_id))
                            .await,
                    ),
                    Err(DomainError::ConfigNotFound(_)) => {
                        debug!(thing_id = %thing_id, "no bootstrap config to remove")
                    }
                    Err(e) => error!(thing_id = %thing_id, error = %e, "failed to retrieve bootstrap config"),
                }
            }
        }

        if delete_entities {
            for channel_id in ledger.channels.iter().rev() {
                log_failure(
                    "delete channel",
                    channel_id,
                    self.bounded(self.registry.delete_channel(token, channel_id)).await,
                );
            }
            for thing_id in ledger.things.iter().rev() {
                log_failure(
                    "delete thing",
                    thing_id,
                    self.bounded(self.registry.delete_thing(token, thing_id)).await,
                );
            }
        }

        info!(
            stage = ?stage,
            things = ledger.things.len(),
            channels = ledger.channels.len(),
            "rollback finished"
        );
    }
}

fn log_failure(action: &str, id: &str, result: DomainResult<()>) {
    if let Err(e) = result {
        error!(id = %id, error = %e, "rollback failed to {}", action);
    }
}
