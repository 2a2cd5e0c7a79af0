use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{BoxFuture, FutureExt, WeakShared};
use tracing::{debug, trace, warn};

use crate::cache::local_cache::{CacheEntry, CacheError, LocalCache};
use crate::maven::coordinates::Coordinate;
use crate::maven::remote_repo::RepositoryClient;
use crate::resolve::error::ResolveError;

type FetchFuture = BoxFuture<'static, Result<CacheEntry, ResolveError>>;

/// Cache-aware access to artifacts: a lookup in the local cache, falling back to the remote
///  repository and storing what was fetched.
///
/// Concurrent requests for the same coordinate are coalesced onto a single in-flight future, so
///  there is at most one fetch and store per coordinate at any time. Cloning is cheap and clones
///  share the in-flight state.
///
/// The in-flight map only holds weak handles: once every caller waiting for a fetch is gone, the
///  fetch is dropped and its entry removed.
#[derive(Clone)]
pub struct ArtifactFetcher {
    inner: Arc<FetcherInner>,
}

struct FetcherInner {
    client: Arc<dyn RepositoryClient>,
    cache: LocalCache,
    in_flight: Mutex<HashMap<Coordinate, (u64, WeakShared<FetchFuture>)>>,
    next_fetch_id: AtomicU64,
}

impl ArtifactFetcher {
    pub fn new(client: Arc<dyn RepositoryClient>, cache: LocalCache) -> ArtifactFetcher {
        ArtifactFetcher {
            inner: Arc::new(FetcherInner {
                client,
                cache,
                in_flight: Default::default(),
                next_fetch_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn cache(&self) -> &LocalCache {
        &self.inner.cache
    }

    pub async fn fetch_artifact(&self, coordinate: &Coordinate) -> Result<CacheEntry, ResolveError> {
        let shared = {
            let mut in_flight = self.inner.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            match in_flight.get(coordinate).and_then(|(_, weak)| weak.upgrade()) {
                Some(existing) => {
                    trace!("joining in-flight fetch of {}", coordinate);
                    existing
                }
                None => {
                    let id = self.inner.next_fetch_id.fetch_add(1, Ordering::Relaxed);
                    let guard = InFlightEntry {
                        inner: self.inner.clone(),
                        coordinate: coordinate.clone(),
                        id,
                    };
                    let fetch = async move {
                        guard.inner.load(&guard.coordinate).await
                    }.boxed().shared();
                    if let Some(weak) = fetch.downgrade() {
                        in_flight.insert(coordinate.clone(), (id, weak));
                    }
                    fetch
                }
            }
        };
        shared.await
    }
}

/// Owned by an in-flight fetch; removes the fetch's map entry when it completes or is dropped
struct InFlightEntry {
    inner: Arc<FetcherInner>,
    coordinate: Coordinate,
    id: u64,
}

impl Drop for InFlightEntry {
    fn drop(&mut self) {
        let mut in_flight = self.inner.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        // a newer fetch may have replaced this one after all of its callers went away
        if matches!(in_flight.get(&self.coordinate), Some((id, _)) if *id == self.id) {
            in_flight.remove(&self.coordinate);
        }
    }
}

impl FetcherInner {
    async fn load(&self, coordinate: &Coordinate) -> Result<CacheEntry, ResolveError> {
        let corruption = match self.cache.lookup(coordinate).await {
            Ok(Some(entry)) => {
                trace!("cache hit for {}", coordinate);
                return Ok(entry);
            }
            Ok(None) => None,
            Err(CacheError::Corrupted { reason, .. }) => {
                warn!("cached {} is corrupted, fetching it again: {}", coordinate, reason);
                Some(reason)
            }
            Err(e) => return Err(ResolveError::from_cache(e)),
        };

        debug!("fetching {} from remote repository", coordinate);
        match self.client.fetch_artifact(coordinate).await {
            Ok(data) => self.cache
                .store(coordinate, &data)
                .await
                .map_err(ResolveError::from_cache),
            Err(e) => {
                let e = ResolveError::from_repo(coordinate, e);
                match corruption {
                    None => Err(e),
                    Some(reason) => Err(ResolveError::CacheCorruption {
                        coordinate: coordinate.to_string(),
                        reason,
                        refetch: Box::new(e),
                    }),
                }
            }
        }
    }
}
