use std::collections::HashMap;

use futures::{stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::cache::fetcher::ArtifactFetcher;
use crate::maven::coordinates::Dependency;
use crate::resolve::error::ResolveError;
use crate::resolve::graph::{DependencyGraph, NodeId};
use crate::resolve::metadata::fetch_metadata;

/// Result of expanding a set of roots to a fixed point
#[derive(Debug)]
pub struct Expansion {
    pub graph: DependencyGraph,
    /// failures of optional nodes
    pub warnings: Vec<ResolveError>,
}

/// Discovers transitive dependencies breadth first.
///
/// The graph is owned by [GraphBuilder::expand]'s loop: metadata for a whole BFS level is
///  fetched concurrently (at most `pool_size` at a time), and results are applied to the graph
///  one by one in the level's order. That keeps discovery order, and therefore node ids, independent
///  of network timing.
pub struct GraphBuilder<'a> {
    pub fetcher: &'a ArtifactFetcher,
    pub pool_size: usize,
    pub include_optional: bool,
    pub cancel: &'a CancellationToken,
}

impl GraphBuilder<'_> {
    pub async fn expand(&self, roots: &[Dependency]) -> Result<Expansion, ResolveError> {
        let mut graph = DependencyGraph::new();
        let mut warnings = Vec::new();
        let mut optional_failures: HashMap<NodeId, ResolveError> = HashMap::new();

        let mut frontier: Vec<NodeId> = Vec::new();
        for root in roots {
            let id = graph.add_root(root);
            if !frontier.contains(&id) {
                frontier.push(id);
            }
        }

        let mut level = 0;
        while !frontier.is_empty() {
            if self.cancel.is_cancelled() {
                return Err(ResolveError::Cancelled);
            }
            debug!("expanding {} node(s) at depth {}", frontier.len(), level);

            let jobs: Vec<_> = frontier.iter()
                .map(|&id| (id, graph.node(id).coordinate.clone()))
                .collect();
            let mut results = stream::iter(jobs)
                .map(|(id, coordinate)| {
                    let fetcher = self.fetcher.clone();
                    let cancel = self.cancel.clone();
                    async move {
                        if cancel.is_cancelled() {
                            return (id, Err(ResolveError::Cancelled));
                        }
                        tokio::select! {
                            _ = cancel.cancelled() => (id, Err(ResolveError::Cancelled)),
                            result = fetch_metadata(&fetcher, &coordinate) => (id, result),
                        }
                    }
                })
                .buffered(self.pool_size.max(1));

            let mut next = Vec::new();
            while let Some((id, result)) = results.next().await {
                match result {
                    Ok(dependencies) => self.add_children(&mut graph, id, dependencies, &mut next),
                    Err(ResolveError::Cancelled) => return Err(ResolveError::Cancelled),
                    Err(cause) => {
                        let e = ResolveError::UnresolvableDependency {
                            chain: graph.chain(id),
                            cause: Box::new(cause),
                        };
                        if graph.node(id).optional {
                            warn!("skipping optional dependency: {}", e);
                            graph.mark_failed(id);
                            optional_failures.insert(id, e.clone());
                            warnings.push(e);
                        }
                        else {
                            return Err(e);
                        }
                    }
                }
            }

            // a failed optional node may have been reached through a required path since
            if let Some(e) = graph.failed_required().and_then(|id| optional_failures.remove(&id)) {
                return Err(e);
            }

            frontier = next;
            level += 1;
        }

        debug!("expansion reached a fixed point with {} node(s)", graph.len());
        Ok(Expansion {
            graph,
            warnings,
        })
    }

    fn add_children(&self, graph: &mut DependencyGraph, parent: NodeId, dependencies: Vec<Dependency>, next: &mut Vec<NodeId>) {
        let parent_scope = graph.node(parent).scope;

        for dependency in dependencies {
            let Some(scope) = parent_scope.inherit(dependency.scope) else {
                trace!("not following {} dependency {}", dependency.scope, dependency.coordinate);
                continue;
            };
            if dependency.optional && !self.include_optional {
                trace!("not following optional dependency {}", dependency.coordinate);
                continue;
            }

            let child = Dependency {
                coordinate: dependency.coordinate,
                scope,
                optional: dependency.optional,
            };
            let (id, added) = graph.add_child(parent, &child);
            if added {
                next.push(id);
            }
        }
    }
}
