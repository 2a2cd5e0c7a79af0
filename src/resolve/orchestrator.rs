use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::{stream, StreamExt};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::fetcher::ArtifactFetcher;
use crate::cache::local_cache::LocalCache;
use crate::maven::coordinates::{Coordinate, Dependency, Scope};
use crate::maven::remote_repo::{RemoteMavenRepo, RepositoryClient};
use crate::resolve::builder::GraphBuilder;
use crate::resolve::error::ResolveError;
use crate::resolve::graph::{DependencyGraph, NodeId};
use crate::resolve::mediator::{MediationPolicy, Mediator, TieBreak};
use crate::util::retry::RetryPolicy;

pub const DEFAULT_REMOTE_REPO: &str = "https://repo1.maven.org/maven2/";
pub const DEFAULT_POOL_SIZE: usize = 4;

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub remote_repo: String,
    pub local_repo: PathBuf,
    pub mediation_policy: MediationPolicy,
    pub tie_break: TieBreak,
    /// maximum number of concurrent fetches
    pub pool_size: usize,
    /// follow optional dependencies declared by transitive artifacts
    pub include_optional: bool,
    /// per attempt
    pub request_timeout: Duration,
    pub retry_policy: RetryPolicy,
}

impl ResolverConfig {
    pub fn new(local_repo: impl Into<PathBuf>) -> ResolverConfig {
        ResolverConfig {
            remote_repo: DEFAULT_REMOTE_REPO.to_string(),
            local_repo: local_repo.into(),
            mediation_policy: MediationPolicy::default(),
            tie_break: TieBreak::default(),
            pool_size: DEFAULT_POOL_SIZE,
            include_optional: false,
            request_timeout: Duration::from_secs(30),
            retry_policy: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionRequest {
    pub dependencies: Vec<Dependency>,
}

impl ResolutionRequest {
    pub fn parse<S: AsRef<str>>(coordinates: &[S], scope: Scope) -> Result<ResolutionRequest, ResolveError> {
        let dependencies = coordinates.iter()
            .map(|c| Coordinate::parse(c.as_ref()).map(|c| Dependency::new(c, scope)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ResolutionRequest {
            dependencies,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    Pending,
    Expanding,
    Mediating,
    Fetching,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
    pub coordinate: Coordinate,
    pub path: PathBuf,
    /// same identity (version ignored) as one of the requested dependencies
    pub direct: bool,
    pub scope: Scope,
}

impl Display for ResolvedArtifact {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{},{},{}",
            if self.direct { "direct" } else { "transitive" },
            self.coordinate,
            self.path.display(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionOutcome {
    /// direct artifacts in request order, followed by transitive artifacts in discovery order
    pub artifacts: Vec<ResolvedArtifact>,
    /// non-fatal failures of optional dependencies
    pub warnings: Vec<ResolveError>,
}

/// Entry point for resolving dependencies. Cloning is cheap, and all clones share the fetcher so
///  that concurrent resolutions never fetch the same coordinate twice.
#[derive(Clone)]
pub struct Resolver {
    fetcher: ArtifactFetcher,
    mediator: Mediator,
    pool_size: usize,
    include_optional: bool,
}

impl Resolver {
    pub fn new(config: &ResolverConfig) -> anyhow::Result<Resolver> {
        let client = RemoteMavenRepo::new(config.remote_repo.clone(), config.request_timeout, config.retry_policy.clone())?;
        Ok(Self::with_client(Arc::new(client), config))
    }

    pub fn with_client(client: Arc<dyn RepositoryClient>, config: &ResolverConfig) -> Resolver {
        Resolver {
            fetcher: ArtifactFetcher::new(client, LocalCache::new(&config.local_repo)),
            mediator: Mediator::new(config.mediation_policy, config.tie_break),
            pool_size: config.pool_size.max(1),
            include_optional: config.include_optional,
        }
    }

    pub fn start(&self, request: ResolutionRequest) -> Resolution {
        let (state, _) = watch::channel(ResolutionState::Pending);
        Resolution {
            resolver: self.clone(),
            request,
            state,
            cancel: CancellationToken::new(),
        }
    }

    pub async fn resolve(&self, request: ResolutionRequest) -> Result<ResolutionOutcome, ResolveError> {
        self.start(request).run().await
    }
}

/// A single resolution run: `Pending -> Expanding -> Mediating -> Fetching -> Done`, or `Failed`
///  from any state.
pub struct Resolution {
    resolver: Resolver,
    request: ResolutionRequest,
    state: watch::Sender<ResolutionState>,
    cancel: CancellationToken,
}

impl Resolution {
    pub fn state(&self) -> watch::Receiver<ResolutionState> {
        self.state.subscribe()
    }

    /// cancelling the token makes [Resolution::run] return [ResolveError::Cancelled] promptly
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run(self) -> Result<ResolutionOutcome, ResolveError> {
        let result = self.drive().await;
        match &result {
            Ok(outcome) => {
                info!("resolved {} artifact(s) with {} warning(s)", outcome.artifacts.len(), outcome.warnings.len());
                self.transition(ResolutionState::Done);
            }
            Err(e) => {
                error!("resolution failed: {}", e);
                self.transition(ResolutionState::Failed);
            }
        }
        result
    }

    fn transition(&self, state: ResolutionState) {
        debug!("resolution state {:?}", state);
        self.state.send_replace(state);
    }

    fn check_cancelled(&self) -> Result<(), ResolveError> {
        if self.cancel.is_cancelled() {
            Err(ResolveError::Cancelled)
        }
        else {
            Ok(())
        }
    }

    async fn drive(&self) -> Result<ResolutionOutcome, ResolveError> {
        let resolver = &self.resolver;

        self.check_cancelled()?;
        self.transition(ResolutionState::Expanding);
        let expansion = GraphBuilder {
            fetcher: &resolver.fetcher,
            pool_size: resolver.pool_size,
            include_optional: resolver.include_optional,
            cancel: &self.cancel,
        }.expand(&self.request.dependencies).await?;
        let mut warnings = expansion.warnings;

        self.check_cancelled()?;
        self.transition(ResolutionState::Mediating);
        let graph = resolver.mediator.mediate(&expansion.graph);

        self.check_cancelled()?;
        self.transition(ResolutionState::Fetching);
        let paths = self.fetch_all(&graph, &mut warnings).await?;

        Ok(ResolutionOutcome {
            artifacts: self.assemble(&graph, &paths),
            warnings,
        })
    }

    /// Downloads the payload of every surviving node. Optional nodes that can not be fetched are
    ///  left without a path.
    async fn fetch_all(&self, graph: &DependencyGraph, warnings: &mut Vec<ResolveError>) -> Result<Vec<Option<PathBuf>>, ResolveError> {
        let mut results = stream::iter(0..graph.len())
            .map(|id| {
                let fetcher = self.resolver.fetcher.clone();
                let cancel = self.cancel.clone();
                let coordinate = graph.node(id).coordinate.clone();
                async move {
                    if cancel.is_cancelled() {
                        return (id, Err(ResolveError::Cancelled));
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => (id, Err(ResolveError::Cancelled)),
                        result = fetcher.fetch_artifact(&coordinate) => (id, result),
                    }
                }
            })
            .buffered(self.resolver.pool_size);

        let mut paths = vec![None; graph.len()];
        while let Some((id, result)) = results.next().await {
            match result {
                Ok(entry) => paths[id] = Some(entry.path),
                Err(ResolveError::Cancelled) => return Err(ResolveError::Cancelled),
                Err(cause) => {
                    let e = ResolveError::UnresolvableDependency {
                        chain: graph.chain(id),
                        cause: Box::new(cause),
                    };
                    if graph.node(id).optional {
                        warn!("skipping optional dependency: {}", e);
                        warnings.push(e);
                    }
                    else {
                        return Err(e);
                    }
                }
            }
        }
        Ok(paths)
    }

    fn assemble(&self, graph: &DependencyGraph, paths: &[Option<PathBuf>]) -> Vec<ResolvedArtifact> {
        let mut emitted = vec![false; graph.len()];
        let mut result = Vec::new();

        let mut push = |id: NodeId, direct: bool, result: &mut Vec<ResolvedArtifact>| {
            if emitted[id] {
                return;
            }
            emitted[id] = true;
            if let Some(path) = &paths[id] {
                let node = graph.node(id);
                result.push(ResolvedArtifact {
                    coordinate: node.coordinate.clone(),
                    path: path.clone(),
                    direct,
                    scope: node.scope,
                });
            }
        };

        for root in &self.request.dependencies {
            if let Some(id) = graph.find_by_identity(&root.coordinate.identity_key()) {
                push(id, true, &mut result);
            }
        }
        for id in 0..graph.len() {
            push(id, false, &mut result);
        }
        result
    }
}
