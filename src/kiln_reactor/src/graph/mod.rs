pub mod builder;

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;

use kiln_model::{Coordinate, Descriptor};

/// Which form of a coordinate a node was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Variant {
    Source,
    Binary,
}

/// A node of the output graph: an effective descriptor plus coordinate
/// handles to the nodes it references. Handles are resolved through the
/// graph, which owns every node.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectNode {
    pub coordinate: Coordinate,
    pub descriptor: Descriptor,
    pub variant: Variant,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<Coordinate>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<Coordinate>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<Coordinate>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Coordinate>,
}

impl ProjectNode {
    /// Every coordinate this node points at, in edge order.
    pub fn references(&self) -> impl Iterator<Item = &Coordinate> {
        self.parent
            .iter()
            .chain(&self.imports)
            .chain(&self.plugins)
            .chain(&self.dependencies)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Parent,
    Import,
    Plugin,
    Dependency,
}

/// The assembled reactor graph. The node sequence is a topological order:
/// every node appears after all of its out-edges.
pub struct ProjectGraph {
    graph: DiGraph<ProjectNode, EdgeKind>,
    order: Vec<NodeIndex>,
    by_coord: HashMap<Coordinate, NodeIndex>,
}

impl ProjectGraph {
    /// Build from nodes already in topological order (the builder's
    /// completion order). References to coordinates outside the node set are
    /// external and carry no edge.
    pub(crate) fn from_nodes(nodes: Vec<ProjectNode>) -> Self {
        let mut graph = DiGraph::new();
        let mut order = Vec::with_capacity(nodes.len());
        let mut by_coord = HashMap::new();
        for node in nodes {
            let coord = node.coordinate.clone();
            let idx = graph.add_node(node);
            order.push(idx);
            by_coord.insert(coord, idx);
        }
        for &idx in &order {
            let mut edges: Vec<(NodeIndex, EdgeKind)> = Vec::new();
            {
                let node = &graph[idx];
                let mut push = |coord: &Coordinate, kind: EdgeKind| {
                    if let Some(&target) = by_coord.get(coord) {
                        edges.push((target, kind));
                    }
                };
                if let Some(parent) = &node.parent {
                    push(parent, EdgeKind::Parent);
                }
                for c in &node.imports {
                    push(c, EdgeKind::Import);
                }
                for c in &node.plugins {
                    push(c, EdgeKind::Plugin);
                }
                for c in &node.dependencies {
                    push(c, EdgeKind::Dependency);
                }
            }
            for (target, kind) in edges {
                graph.add_edge(idx, target, kind);
            }
        }
        Self {
            graph,
            order,
            by_coord,
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, coord: &Coordinate) -> bool {
        self.by_coord.contains_key(coord)
    }

    pub fn get(&self, coord: &Coordinate) -> Option<&ProjectNode> {
        self.by_coord.get(coord).map(|&idx| &self.graph[idx])
    }

    /// The topological node sequence.
    pub fn sorted_projects(&self) -> Vec<&ProjectNode> {
        self.order.iter().map(|&idx| &self.graph[idx]).collect()
    }

    /// Projects this one builds on (its out-edges), optionally the whole
    /// closure. The result follows the sorted order.
    pub fn upstream_projects(&self, coord: &Coordinate, transitive: bool) -> Vec<&ProjectNode> {
        self.neighbors(coord, Direction::Outgoing, transitive)
    }

    /// Direct (or transitive) dependents of a project, via the reverse-edge
    /// index.
    pub fn downstream_projects(&self, coord: &Coordinate, transitive: bool) -> Vec<&ProjectNode> {
        self.neighbors(coord, Direction::Incoming, transitive)
    }

    fn neighbors(
        &self,
        coord: &Coordinate,
        direction: Direction,
        transitive: bool,
    ) -> Vec<&ProjectNode> {
        let Some(&start) = self.by_coord.get(coord) else {
            return Vec::new();
        };
        let mut found: HashSet<NodeIndex> = HashSet::new();
        let mut queue: VecDeque<NodeIndex> = VecDeque::new();
        for neighbor in self.graph.neighbors_directed(start, direction) {
            if found.insert(neighbor) {
                queue.push_back(neighbor);
            }
        }
        if transitive {
            while let Some(next) = queue.pop_front() {
                for neighbor in self.graph.neighbors_directed(next, direction) {
                    if found.insert(neighbor) {
                        queue.push_back(neighbor);
                    }
                }
            }
        }
        self.order
            .iter()
            .filter(|idx| found.contains(*idx))
            .map(|&idx| &self.graph[idx])
            .collect()
    }
}
