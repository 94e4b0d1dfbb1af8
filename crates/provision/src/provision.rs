use crate::domain::ProvisionService;
use crate::nats::ProvisionRequestService;
use common::nats::RequestReplyServer;
use common::process::RunnerProcess;
use std::sync::Arc;
use tracing::debug;

/// Provisioning wiring: the saga behind its request/reply endpoint
pub struct Provision {
    server: RequestReplyServer<ProvisionRequestService>,
}

impl Provision {
    pub fn new(
        service: Arc<ProvisionService>,
        nats_client: async_nats::Client,
        subject: impl Into<String>,
        queue_group: impl Into<String>,
    ) -> Self {
        debug!("initializing provision module");

        let server = RequestReplyServer::new(
            nats_client,
            subject,
            queue_group,
            ProvisionRequestService::new(service),
        );
        Self { server }
    }

    pub fn into_runner_process(self) -> RunnerProcess {
        let server = self.server;
        Box::new(move |ctx| Box::pin(async move { server.run(ctx).await }))
    }
}
