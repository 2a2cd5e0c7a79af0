use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tracing::trace;

use crate::maven::coordinates::Coordinate;
use crate::maven::paths::as_maven_path;
use crate::util::retry::RetryPolicy;
use crate::util::validating_http_downloader::ValidatingHttpDownloader;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepoError {
    /// transient, worth retrying
    #[error("network error: {0}")]
    Network(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// the repository refused the request for a reason retrying does not fix
    #[error("request rejected: {0}")]
    Rejected(String),
}
impl RepoError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RepoError::Network(_))
    }
}

/// Access to the files of a remote repository. Implementations are expected to handle retries
///  of transient failures themselves and never touch the local cache.
#[async_trait]
pub trait RepositoryClient: Send + Sync {
    async fn fetch_artifact(&self, coordinate: &Coordinate) -> Result<Bytes, RepoError>;
}

pub struct RemoteMavenRepo {
    downloader: ValidatingHttpDownloader,
    retry_policy: RetryPolicy,
}

impl RemoteMavenRepo {
    pub fn new(base_uri: String, timeout: Duration, retry_policy: RetryPolicy) -> anyhow::Result<RemoteMavenRepo> {
        Ok(RemoteMavenRepo {
            downloader: ValidatingHttpDownloader::new(base_uri, timeout)?,
            retry_policy,
        })
    }
}

#[async_trait]
impl RepositoryClient for RemoteMavenRepo {
    async fn fetch_artifact(&self, coordinate: &Coordinate) -> Result<Bytes, RepoError> {
        let path = as_maven_path(coordinate);
        trace!("fetching {} from {}{}", coordinate, self.downloader.base_uri(), path);

        self.retry_policy
            .retry(&path, || self.downloader.get(&path))
            .await
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(RepoError::Network("x".to_string()).is_transient());
        assert!(!RepoError::NotFound("x".to_string()).is_transient());
        assert!(!RepoError::Rejected("x".to_string()).is_transient());
    }

    #[tokio::test]
    async fn test_unreachable_repo_surfaces_network_error() {
        // nothing listens on port 9 (discard) on the loopback interface in test environments
        let repo = RemoteMavenRepo::new(
            "http://127.0.0.1:9/maven2".to_string(),
            Duration::from_millis(500),
            RetryPolicy {
                max_attempts: 2,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(1),
            },
        ).unwrap();

        let result = repo.fetch_artifact(&Coordinate::parse("a:b:1").unwrap()).await;
        assert!(matches!(result, Err(RepoError::Network(_))));
    }
}
