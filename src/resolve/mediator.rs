use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};

use tracing::debug;

use crate::maven::coordinates::IdentityKey;
use crate::resolve::graph::{ArtifactNode, DependencyGraph, NodeId};

/// Which version survives when several versions of an artifact are present in a graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediationPolicy {
    /// the version declared closest to a root
    #[default]
    NearestWins,
    /// the highest version by Maven's version ordering, regardless of depth
    HighestVersion,
}

/// Breaks ties between candidates that the policy considers equal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TieBreak {
    /// declaration order of the roots, then breadth first discovery order
    #[default]
    FirstDiscovered,
    HighestVersion,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Mediator {
    pub policy: MediationPolicy,
    pub tie_break: TieBreak,
}

impl Mediator {
    pub fn new(policy: MediationPolicy, tie_break: TieBreak) -> Mediator {
        Mediator {
            policy,
            tie_break,
        }
    }

    /// `Less` if `a` is preferred over `b`
    fn preference(&self, (a_id, a): (NodeId, &ArtifactNode), (b_id, b): (NodeId, &ArtifactNode)) -> Ordering {
        let by_depth = a.depth.cmp(&b.depth);
        let by_version = b.coordinate.version.compare(&a.coordinate.version);
        let by_tie_break = match self.tie_break {
            TieBreak::FirstDiscovered => a_id.cmp(&b_id),
            TieBreak::HighestVersion => by_version.then(a_id.cmp(&b_id)),
        };

        match self.policy {
            MediationPolicy::NearestWins => by_depth.then(by_tie_break),
            MediationPolicy::HighestVersion => by_version.then(by_depth).then(a_id.cmp(&b_id)),
        }
    }

    /// The surviving candidate among nodes sharing an identity key. Failed nodes never win.
    pub fn select(&self, graph: &DependencyGraph, candidates: &[NodeId]) -> Option<NodeId> {
        candidates.iter()
            .copied()
            .filter(|&id| !graph.node(id).failed)
            .min_by(|&a, &b| self.preference((a, graph.node(a)), (b, graph.node(b))))
    }

    /// Reduces the graph to a single version per identity key: edges to discarded versions are
    ///  rewired to the survivor, and nodes that are no longer reachable from a root are pruned.
    ///  Surviving nodes keep their relative discovery order, so mediating an already mediated
    ///  graph returns it unchanged.
    pub fn mediate(&self, graph: &DependencyGraph) -> DependencyGraph {
        let mut groups: HashMap<IdentityKey, Vec<NodeId>> = HashMap::new();
        for (id, node) in graph.nodes().iter().enumerate() {
            groups.entry(node.coordinate.identity_key()).or_default().push(id);
        }

        let mut winner_of: Vec<Option<NodeId>> = vec![None; graph.len()];
        for (key, candidates) in &groups {
            let winner = self.select(graph, candidates);
            if candidates.len() > 1 {
                if let Some(winner) = winner {
                    debug!("mediated {} to version {} among {} candidates", key, graph.node(winner).coordinate.version, candidates.len());
                }
            }
            for &id in candidates {
                winner_of[id] = winner;
            }
        }

        let rewired_children = |id: NodeId| -> Vec<NodeId> {
            let mut result = Vec::new();
            for &child in &graph.node(id).children {
                if let Some(target) = winner_of[child] {
                    if target != id && !result.contains(&target) {
                        result.push(target);
                    }
                }
            }
            result
        };

        let mut roots = Vec::new();
        for &root in graph.roots() {
            if let Some(winner) = winner_of[root] {
                if !roots.contains(&winner) {
                    roots.push(winner);
                }
            }
        }

        let mut reachable = vec![false; graph.len()];
        let mut queue: VecDeque<NodeId> = roots.iter().copied().collect();
        for &root in &roots {
            reachable[root] = true;
        }
        while let Some(id) = queue.pop_front() {
            for child in rewired_children(id) {
                if !reachable[child] {
                    reachable[child] = true;
                    queue.push_back(child);
                }
            }
        }

        let mut new_id: Vec<Option<NodeId>> = vec![None; graph.len()];
        let mut next = 0;
        for (id, is_reachable) in reachable.iter().enumerate() {
            if *is_reachable {
                new_id[id] = Some(next);
                next += 1;
            }
        }

        let mut result = DependencyGraph::new();
        for (id, node) in graph.nodes().iter().enumerate() {
            let Some(this_id) = new_id[id] else {
                continue;
            };
            let parent = node.parent
                .and_then(|p| winner_of[p])
                .and_then(|p| new_id[p])
                .filter(|&p| p < this_id);

            result.push_node(ArtifactNode {
                children: rewired_children(id).into_iter().filter_map(|c| new_id[c]).collect(),
                parent,
                ..node.clone()
            });
        }
        for root in roots {
            if let Some(root) = new_id[root] {
                result.push_root(root);
            }
        }

        debug!("mediation kept {} of {} nodes", result.len(), graph.len());
        result
    }
}

#[cfg(test)]
mod test {
    use rstest::*;
    use super::*;
    use crate::maven::coordinates::{Coordinate, Dependency, Scope};

    fn dep(s: &str) -> Dependency {
        Dependency::new(Coordinate::parse(s).unwrap(), Scope::Compile)
    }

    fn versions(graph: &DependencyGraph) -> Vec<String> {
        graph.nodes().iter().map(|n| n.coordinate.to_string()).collect()
    }

    /// roots a and c; a -> b:1.0, c -> b:2.0
    fn diamond() -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        let a = graph.add_root(&dep("g:a:1"));
        let c = graph.add_root(&dep("g:c:1"));
        graph.add_child(a, &dep("g:b:1.0"));
        graph.add_child(c, &dep("g:b:2.0"));
        graph
    }

    #[rstest]
    #[case::nearest_first_discovered(MediationPolicy::NearestWins, TieBreak::FirstDiscovered, "g:b:jar:1.0")]
    #[case::nearest_highest_tie_break(MediationPolicy::NearestWins, TieBreak::HighestVersion, "g:b:jar:2.0")]
    #[case::highest(MediationPolicy::HighestVersion, TieBreak::FirstDiscovered, "g:b:jar:2.0")]
    fn test_diamond(#[case] policy: MediationPolicy, #[case] tie_break: TieBreak, #[case] expected: &str) {
        let mediated = Mediator::new(policy, tie_break).mediate(&diamond());

        assert_eq!(versions(&mediated), vec!["g:a:jar:1", "g:c:jar:1", expected]);
        assert_eq!(mediated.node(0).children, vec![2]);
        assert_eq!(mediated.node(1).children, vec![2]);
    }

    #[test]
    fn test_highest_ignores_declaration_order() {
        let mut graph = DependencyGraph::new();
        let c = graph.add_root(&dep("g:c:1"));
        let a = graph.add_root(&dep("g:a:1"));
        graph.add_child(c, &dep("g:b:2.0"));
        graph.add_child(a, &dep("g:b:1.0"));

        let mediated = Mediator::new(MediationPolicy::HighestVersion, TieBreak::FirstDiscovered).mediate(&graph);
        assert!(versions(&mediated).contains(&"g:b:jar:2.0".to_string()));
        assert!(!versions(&mediated).contains(&"g:b:jar:1.0".to_string()));
    }

    #[test]
    fn test_nearest_prefers_shallow_over_declaration_order() {
        // a -> x -> b:1.0 (depth 2), c -> b:2.0 (depth 1)
        let mut graph = DependencyGraph::new();
        let a = graph.add_root(&dep("g:a:1"));
        let c = graph.add_root(&dep("g:c:1"));
        let (x, _) = graph.add_child(a, &dep("g:x:1"));
        graph.add_child(c, &dep("g:b:2.0"));
        graph.add_child(x, &dep("g:b:1.0"));

        let mediated = Mediator::default().mediate(&graph);
        assert_eq!(versions(&mediated), vec!["g:a:jar:1", "g:c:jar:1", "g:x:jar:1", "g:b:jar:2.0"]);
        assert_eq!(mediated.node(2).children, vec![3]);
    }

    #[test]
    fn test_prunes_subtree_of_discarded_version() {
        // a -> b:1.0 -> only-in-old; a -> c -> b:2.0 -> only-in-new; nearest keeps b:1.0
        let mut graph = DependencyGraph::new();
        let a = graph.add_root(&dep("g:a:1"));
        let (b1, _) = graph.add_child(a, &dep("g:b:1.0"));
        let (c, _) = graph.add_child(a, &dep("g:c:1"));
        graph.add_child(b1, &dep("g:only-in-old:1"));
        let (b2, _) = graph.add_child(c, &dep("g:b:2.0"));
        graph.add_child(b2, &dep("g:only-in-new:1"));

        let mediated = Mediator::default().mediate(&graph);
        assert_eq!(versions(&mediated), vec!["g:a:jar:1", "g:b:jar:1.0", "g:c:jar:1", "g:only-in-old:jar:1"]);
        // c now points at the surviving b
        assert_eq!(mediated.node(2).children, vec![1]);
        assert!(mediated.incoming_counts().iter().skip(1).all(|&count| count > 0));
    }

    #[test]
    fn test_failed_nodes_never_win() {
        let mut graph = diamond();
        let b1 = graph.find(&Coordinate::parse("g:b:1.0").unwrap()).unwrap();
        graph.mark_failed(b1);

        let mediated = Mediator::default().mediate(&graph);
        assert_eq!(versions(&mediated), vec!["g:a:jar:1", "g:c:jar:1", "g:b:jar:2.0"]);
    }

    #[test]
    fn test_failed_without_alternative_is_dropped() {
        let mut graph = DependencyGraph::new();
        let a = graph.add_root(&dep("g:a:1"));
        let (b, _) = graph.add_child(a, &dep("g:b:1"));
        graph.mark_failed(b);

        let mediated = Mediator::default().mediate(&graph);
        assert_eq!(versions(&mediated), vec!["g:a:jar:1"]);
        assert!(mediated.node(0).children.is_empty());
    }

    #[test]
    fn test_cycle_is_kept_once() {
        let mut graph = DependencyGraph::new();
        let a = graph.add_root(&dep("g:a:1"));
        let (b, _) = graph.add_child(a, &dep("g:b:1"));
        graph.add_child(b, &dep("g:a:1"));

        let mediated = Mediator::default().mediate(&graph);
        assert_eq!(versions(&mediated), vec!["g:a:jar:1", "g:b:jar:1"]);
        assert_eq!(mediated.node(1).children, vec![0]);
    }

    #[rstest]
    #[case(MediationPolicy::NearestWins)]
    #[case(MediationPolicy::HighestVersion)]
    fn test_mediation_is_idempotent(#[case] policy: MediationPolicy) {
        let mut graph = diamond();
        let b2 = graph.find(&Coordinate::parse("g:b:2.0").unwrap()).unwrap();
        let (d, _) = graph.add_child(b2, &dep("g:d:1"));
        graph.add_child(d, &dep("g:b:3.0"));

        let mediator = Mediator::new(policy, TieBreak::FirstDiscovered);
        let once = mediator.mediate(&graph);
        let twice = mediator.mediate(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_mediation_is_deterministic() {
        let mediator = Mediator::default();
        assert_eq!(mediator.mediate(&diamond()), mediator.mediate(&diamond()));
    }
}
