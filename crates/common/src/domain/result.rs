use std::future::Future;
use std::time::Duration;
use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Route not found: {0}")]
    RouteNotFound(String),

    #[error("Config not found: {0}")]
    ConfigNotFound(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Config already exists: {0}")]
    ConfigAlreadyExists(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),
}

impl DomainError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::RouteNotFound(_) | Self::ConfigNotFound(_) | Self::EntityNotFound(_)
        )
    }

    /// Transient failures clear on their own; the caller may try again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::RepositoryError(_))
    }
}

/// Await a collaborator call for at most `timeout`; expiry is reported as
/// `Unavailable`
pub async fn bounded<T>(
    timeout: Duration,
    call: impl Future<Output = DomainResult<T>>,
) -> DomainResult<T> {
    tokio::time::timeout(timeout, call).await.map_err(|_| {
        DomainError::Unavailable(format!("collaborator did not answer within {:?}", timeout))
    })?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        assert!(DomainError::ConfigNotFound("t-1".into()).is_not_found());
        assert!(DomainError::RouteNotFound("app".into()).is_not_found());
        assert!(!DomainError::Conflict("dup".into()).is_not_found());
    }

    #[test]
    fn test_transient_classification() {
        assert!(DomainError::Unavailable("timeout".into()).is_transient());
        assert!(DomainError::from(anyhow::anyhow!("io")).is_transient());
        assert!(!DomainError::MalformedEvent("missing id".into()).is_transient());
    }

    #[tokio::test]
    async fn test_bounded_call_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        };

        let result = bounded(Duration::from_millis(5), slow).await;

        assert!(matches!(result, Err(DomainError::Unavailable(_))));
        assert_eq!(bounded(Duration::from_secs(1), async { Ok(7) }).await.unwrap(), 7);
    }
}
