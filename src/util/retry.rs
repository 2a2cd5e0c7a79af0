use std::future::Future;
use std::time::Duration;

use failsafe::backoff;
use tracing::warn;

use crate::maven::remote_repo::RepoError;

/// Bounded retries with exponential backoff for transient repository errors
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// total number of attempts, including the first one
    pub max_attempts: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    pub async fn retry<T, F, Fut>(&self, what: &str, mut operation: F) -> Result<T, RepoError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RepoError>>,
    {
        let mut delays = backoff::exponential(self.initial_backoff, self.max_backoff)
            .take(self.max_attempts.saturating_sub(1));
        let mut attempt = 1;

        loop {
            match operation().await {
                Err(e) if e.is_transient() => match delays.next() {
                    Some(delay) => {
                        warn!("attempt {} for {} failed, retrying in {:?}: {}", attempt, what, delay, e);
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => return Err(e),
                },
                other => return other,
            }
        }
    }
}
