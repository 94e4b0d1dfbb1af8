use std::future::Future;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

/// A module's long-running task, handed to the process runner
pub type RunnerProcess = Box<
    dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>
        + Send,
>;
