//! End-to-end provisioning against an in-memory registry and CA, with the
//! real bootstrap service and store.

use async_trait::async_trait;
use bootstrap::{BootstrapService, ConfigFilter, ConfigRepository, InMemoryConfigRepository};
use common::domain::{
    BootstrapState, Cert, CertsClient, Channel, CreateChannelInput, CreateThingInput, DomainError,
    DomainResult, MockIdentityProvider, Thing, ThingsRegistry, TokenIssuer,
};
use provision::{ProvisionError, ProvisionProfile, ProvisionService, ProvisionStage};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct FakeRegistry {
    things: Mutex<HashMap<String, Thing>>,
    channels: Mutex<HashMap<String, Channel>>,
    next_id: AtomicUsize,
    calls: AtomicUsize,
    refuse_connect: bool,
}

impl FakeRegistry {
    fn id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn counts(&self) -> (usize, usize) {
        (
            self.things.lock().unwrap().len(),
            self.channels.lock().unwrap().len(),
        )
    }
}

#[async_trait]
impl ThingsRegistry for FakeRegistry {
    async fn create_thing(&self, _token: &str, input: CreateThingInput) -> DomainResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let id = self.id("th");
        let thing = Thing {
            id: id.clone(),
            name: input.name,
            key: format!("key-{}", id),
            metadata: input.metadata,
        };
        self.things.lock().unwrap().insert(id.clone(), thing);
        Ok(id)
    }

    async fn view_thing(&self, _token: &str, thing_id: &str) -> DomainResult<Thing> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.things
            .lock()
            .unwrap()
            .get(thing_id)
            .cloned()
            .ok_or_else(|| DomainError::EntityNotFound(thing_id.to_string()))
    }

    async fn delete_thing(&self, _token: &str, thing_id: &str) -> DomainResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.things.lock().unwrap().remove(thing_id);
        Ok(())
    }

    async fn create_channel(&self, _token: &str, input: CreateChannelInput) -> DomainResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let id = self.id("ch");
        let channel = Channel {
            id: id.clone(),
            name: input.name,
            metadata: input.metadata,
        };
        self.channels.lock().unwrap().insert(id.clone(), channel);
        Ok(id)
    }

    async fn view_channel(&self, _token: &str, channel_id: &str) -> DomainResult<Channel> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.channels
            .lock()
            .unwrap()
            .get(channel_id)
            .cloned()
            .ok_or_else(|| DomainError::EntityNotFound(channel_id.to_string()))
    }

    async fn delete_channel(&self, _token: &str, channel_id: &str) -> DomainResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.channels.lock().unwrap().remove(channel_id);
        Ok(())
    }

    async fn connect(&self, _token: &str, _channel_id: &str, _thing_id: &str) -> DomainResult<()> {
        if self.refuse_connect {
            return Err(DomainError::Unavailable("registry down".into()));
        }
        Ok(())
    }

    async fn disconnect(&self, _token: &str, _channel_id: &str, _thing_id: &str) -> DomainResult<()> {
        Ok(())
    }
}

#[derive(Default)]
struct FakeCa {
    issued: Mutex<HashSet<String>>,
}

#[async_trait]
impl CertsClient for FakeCa {
    async fn issue_cert(&self, _token: &str, thing_id: &str, thing_key: &str) -> DomainResult<Cert> {
        self.issued.lock().unwrap().insert(thing_id.to_string());
        Ok(Cert {
            client_cert: format!("cert({})", thing_key),
            client_key: format!("key({})", thing_key),
            ca_cert: "root-ca".to_string(),
        })
    }

    async fn revoke_cert(&self, _token: &str, thing_id: &str) -> DomainResult<()> {
        if self.issued.lock().unwrap().remove(thing_id) {
            Ok(())
        } else {
            Err(DomainError::EntityNotFound(thing_id.to_string()))
        }
    }
}

struct NoTokens;

#[async_trait]
impl TokenIssuer for NoTokens {
    async fn issue_token(&self, _email: &str, _password: &str) -> DomainResult<String> {
        Err(DomainError::Unauthorized("token exchange disabled".into()))
    }
}

const FULL_PROFILE: &str = r#"
[server]
api_key = "service-key"

[bootstrap]
provision = true
x509_provision = true
auto_whitelist = true
content = "{}"

[[things]]
name = "gateway"

[things.metadata]
external_id = ""

[[things]]
name = "sensor"

[[channels]]
name = "data"
"#;

const OWNER: &str = "ops@example.com";

const SINGLE_PROFILE: &str = r#"
[server]
api_key = "service-key"

[bootstrap]
provision = true
x509_provision = true
auto_whitelist = true
content = "{}"

[[things]]
name = "gateway"

[things.metadata]
external_id = ""

[[channels]]
name = "data"
"#;

struct Harness {
    registry: Arc<FakeRegistry>,
    ca: Arc<FakeCa>,
    store: Arc<InMemoryConfigRepository>,
    service: ProvisionService,
}

impl Harness {
    async fn stored_configs(&self) -> usize {
        self.store
            .retrieve_all(OWNER, ConfigFilter::default(), 0, 10)
            .await
            .unwrap()
            .total
    }
}

fn harness(profile: &str, refuse_connect: bool) -> Harness {
    let registry = Arc::new(FakeRegistry {
        refuse_connect,
        ..Default::default()
    });
    let ca = Arc::new(FakeCa::default());
    let store = Arc::new(InMemoryConfigRepository::new());

    let mut identity = MockIdentityProvider::new();
    identity.expect_identify().returning(|token| match token {
        "service-key" => Ok(OWNER.to_string()),
        _ => Err(DomainError::Unauthorized("invalid token".into())),
    });
    let bootstrap = Arc::new(BootstrapService::new(
        store.clone(),
        Arc::new(identity),
        registry.clone(),
        Duration::from_secs(1),
    ));

    let service = ProvisionService::new(
        ProvisionProfile::from_toml(profile).unwrap(),
        registry.clone(),
        Arc::new(NoTokens),
        ca.clone(),
        bootstrap,
        Duration::from_secs(1),
    );
    Harness {
        registry,
        ca,
        store,
        service,
    }
}

#[tokio::test]
async fn whitelist_failure_rolls_back_everything() {
    let h = harness(FULL_PROFILE, true);

    let err = h
        .service
        .provision("", "aa:bb:cc:dd", "device-key")
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisionError::FailedWhitelist { .. }));
    assert_eq!(err.stage(), ProvisionStage::Whitelist);
    assert_eq!(h.registry.counts(), (0, 0));
    assert_eq!(h.stored_configs().await, 0);
    assert!(h.ca.issued.lock().unwrap().is_empty());
}

#[tokio::test]
async fn second_thing_cannot_rebind_the_external_pair() {
    let h = harness(FULL_PROFILE, false);

    let err = h
        .service
        .provision("", "aa:bb:cc:dd", "device-key")
        .await
        .unwrap_err();

    // The first thing took the pair; its entry goes with the rollback
    match &err {
        ProvisionError::FailedBootstrap { thing_id, source } => {
            assert_eq!(thing_id, "th-1");
            assert!(matches!(source, DomainError::Conflict(_)));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(h.registry.counts(), (0, 0));
    assert_eq!(h.stored_configs().await, 0);
    assert!(h.store.retrieve_by_external_id("aa:bb:cc:dd", "device-key").await.is_err());
    assert!(h.ca.issued.lock().unwrap().is_empty());
}

#[tokio::test]
async fn full_run_leaves_everything_in_place() {
    let h = harness(SINGLE_PROFILE, false);

    let result = h
        .service
        .provision("", "aa:bb:cc:dd", "device-key")
        .await
        .unwrap();

    assert_eq!(result.things.len(), 1);
    assert_eq!(result.channels.len(), 1);
    assert_eq!(result.ca_cert, "root-ca");
    assert_eq!(result.whitelisted.len(), 1);
    assert_eq!(result.things[0].metadata["external_id"], "aa:bb:cc:dd");

    assert_eq!(h.registry.counts(), (1, 1));
    assert_eq!(h.ca.issued.lock().unwrap().len(), 1);

    let config = h
        .store
        .retrieve_by_external_id("aa:bb:cc:dd", "device-key")
        .await
        .unwrap();
    assert_eq!(config.thing_id, result.things[0].id);
    assert_eq!(config.thing_key, result.things[0].key);
    assert_eq!(config.channel_ids(), vec![result.channels[0].id.clone()]);
    assert_eq!(config.state, BootstrapState::Active);
}

#[tokio::test]
async fn empty_channel_templates_fail_fast() {
    let profile = r#"
[server]
api_key = "service-key"

[[things]]
name = "gateway"
"#;
    let h = harness(profile, false);

    let err = h.service.provision("", "aa:bb", "k").await.unwrap_err();

    assert!(matches!(err, ProvisionError::EmptyChannelsList));
    assert_eq!(h.registry.calls.load(Ordering::SeqCst), 0);
}
