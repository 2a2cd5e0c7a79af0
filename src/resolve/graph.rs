use std::collections::{HashMap, HashSet};

use crate::maven::coordinates::{Coordinate, Dependency, IdentityKey, Scope};

/// index into [DependencyGraph]'s node arena; ids are assigned in discovery order
pub type NodeId = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNode {
    pub coordinate: Coordinate,
    /// effective scope along the path through which the node was first discovered
    pub scope: Scope,
    /// every path from a root to this node passes through an optional declaration
    pub optional: bool,
    /// distance from the nearest root, 0 for roots
    pub depth: usize,
    /// the node through which this one was first discovered, `None` for roots
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// metadata could not be fetched while the node was optional
    pub failed: bool,
}

/// Arena of artifact nodes, keyed by full coordinate. Several versions of the same
///  [IdentityKey] may coexist until the graph is mediated.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DependencyGraph {
    nodes: Vec<ArtifactNode>,
    index: HashMap<Coordinate, NodeId>,
    roots: Vec<NodeId>,
    /// edges declared `<optional>true</optional>` by their parent; only tracked during expansion
    optional_edges: HashSet<(NodeId, NodeId)>,
}

impl DependencyGraph {
    pub fn new() -> DependencyGraph {
        Default::default()
    }

    pub fn add_root(&mut self, dependency: &Dependency) -> NodeId {
        let (id, _) = self.insert(dependency, 0, None);
        if !self.roots.contains(&id) {
            self.roots.push(id);
        }
        id
    }

    /// Links `parent` to the node for `dependency`, creating it if the coordinate was not seen
    ///  before. The returned flag is `true` if the node was created (and therefore needs to be
    ///  expanded).
    ///
    /// `dependency.optional` is the flag as declared by `parent`. A node is optional if it was
    ///  only reached through optional declarations or optional parents; linking an existing
    ///  optional node through a required edge makes it, and everything it pulled in through
    ///  required edges, required.
    pub fn add_child(&mut self, parent: NodeId, dependency: &Dependency) -> (NodeId, bool) {
        let depth = self.nodes[parent].depth + 1;
        let parent_optional = self.nodes[parent].optional;
        let inherited = Dependency {
            optional: parent_optional || dependency.optional,
            ..dependency.clone()
        };
        let (id, added) = self.insert(&inherited, depth, Some(parent));

        if dependency.optional {
            self.optional_edges.insert((parent, id));
        }
        else if !parent_optional && self.nodes[id].optional {
            self.require(id);
        }
        self.link(parent, id);
        (id, added)
    }

    fn require(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !self.nodes[current].optional {
                continue;
            }
            self.nodes[current].optional = false;
            for &child in &self.nodes[current].children {
                if self.nodes[child].optional && !self.optional_edges.contains(&(current, child)) {
                    stack.push(child);
                }
            }
        }
    }

    /// the first failed node that has since become required, if any
    pub fn failed_required(&self) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.failed && !n.optional)
    }

    pub fn link(&mut self, parent: NodeId, child: NodeId) {
        let children = &mut self.nodes[parent].children;
        if !children.contains(&child) {
            children.push(child);
        }
    }

    fn insert(&mut self, dependency: &Dependency, depth: usize, parent: Option<NodeId>) -> (NodeId, bool) {
        if let Some(&existing) = self.index.get(&dependency.coordinate) {
            return (existing, false);
        }

        let id = self.nodes.len();
        self.nodes.push(ArtifactNode {
            coordinate: dependency.coordinate.clone(),
            scope: dependency.scope,
            optional: dependency.optional,
            depth,
            parent,
            children: Vec::new(),
            failed: false,
        });
        self.index.insert(dependency.coordinate.clone(), id);
        (id, true)
    }

    pub(crate) fn push_node(&mut self, node: ArtifactNode) -> NodeId {
        let id = self.nodes.len();
        self.index.insert(node.coordinate.clone(), id);
        self.nodes.push(node);
        id
    }

    pub(crate) fn push_root(&mut self, id: NodeId) {
        self.roots.push(id);
    }

    pub fn mark_failed(&mut self, id: NodeId) {
        self.nodes[id].failed = true;
    }

    pub fn node(&self, id: NodeId) -> &ArtifactNode {
        &self.nodes[id]
    }

    pub fn nodes(&self) -> &[ArtifactNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn find(&self, coordinate: &Coordinate) -> Option<NodeId> {
        self.index.get(coordinate).copied()
    }

    /// the first node (in discovery order) with the given identity
    pub fn find_by_identity(&self, key: &IdentityKey) -> Option<NodeId> {
        self.nodes.iter().position(|n| &n.coordinate.identity_key() == key)
    }

    /// The path through which a node was first discovered, root first
    pub fn chain(&self, id: NodeId) -> Vec<Coordinate> {
        let mut result = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = &self.nodes[node_id];
            result.push(node.coordinate.clone());
            // parents are always discovered before their children, which rules out loops
            current = node.parent.filter(|&p| p < node_id);
        }
        result.reverse();
        result
    }

    /// number of edges pointing to each node
    pub fn incoming_counts(&self) -> Vec<usize> {
        let mut result = vec![0; self.nodes.len()];
        for node in &self.nodes {
            for &child in &node.children {
                result[child] += 1;
            }
        }
        result
    }
}
