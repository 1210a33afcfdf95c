use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    fs,
    path::Path,
};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{FlockErr, FlockNode, NodeId, NodeKind, Result};

/// Wire form of a topology: a flat list of nodes with their children.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopologySpec {
    pub nodes: Vec<NodeSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub idx: NodeId,
    #[serde(default)]
    pub children: Vec<NodeId>,
}

/// The immutable hierarchy of simulated nodes taking part in a federated run.
///
/// A flock is a rooted tree. The root is the leader, inner nodes are
/// aggregators and leaves are workers.
#[derive(Debug, Clone)]
pub struct Flock {
    leader: NodeId,
    nodes: BTreeMap<NodeId, FlockNode>,
    parents: BTreeMap<NodeId, NodeId>,
}

impl Flock {
    /// Creates a leader with `num_workers` direct worker children.
    ///
    /// The leader gets id `0` and the workers `1..=num_workers`.
    pub fn star(num_workers: usize) -> Self {
        let builder = (1..=num_workers).fold(
            FlockBuilder::new().node(0, 1..=num_workers),
            FlockBuilder::leaf,
        );

        // SAFETY: a star is always a valid tree.
        builder.build().unwrap()
    }

    /// Creates a leader over `num_aggregators` aggregators, each one with
    /// `workers_per_aggregator` workers.
    ///
    /// Ids are assigned breadth first starting from the leader at `0`.
    pub fn two_tier(num_aggregators: usize, workers_per_aggregator: usize) -> Self {
        let mut builder = FlockBuilder::new().node(0, 1..=num_aggregators);
        let mut next = num_aggregators + 1;

        for a in 1..=num_aggregators {
            let workers = next..next + workers_per_aggregator;
            next += workers_per_aggregator;

            builder = workers.clone().fold(builder.node(a, workers), FlockBuilder::leaf);
        }

        // SAFETY: a two tier tree is always valid.
        builder.build().unwrap()
    }

    /// Builds a flock from its wire form.
    ///
    /// # Errors
    /// Returns a `FlockErr` if the described topology is not a rooted tree.
    pub fn from_spec(spec: TopologySpec) -> Result<Self> {
        spec.nodes
            .into_iter()
            .fold(FlockBuilder::new(), |b, n| {
                b.node(n.idx.0, n.children.into_iter().map(|c| c.0))
            })
            .build()
    }

    /// Parses a topology from a json string.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let spec: TopologySpec = serde_json::from_str(s)?;
        Self::from_spec(spec)
    }

    /// Reads and parses a topology json file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Returns the wire form of this flock.
    pub fn to_spec(&self) -> TopologySpec {
        let nodes = self
            .nodes
            .values()
            .map(|n| NodeSpec {
                idx: n.idx,
                children: n.children.clone(),
            })
            .collect();

        TopologySpec { nodes }
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_spec())?)
    }

    #[inline]
    pub fn leader(&self) -> &FlockNode {
        // SAFETY: the leader is always part of the node map.
        &self.nodes[&self.leader]
    }

    #[inline]
    pub fn get(&self, idx: NodeId) -> Option<&FlockNode> {
        self.nodes.get(&idx)
    }

    #[inline]
    pub fn kind(&self, idx: NodeId) -> Option<NodeKind> {
        self.get(idx).map(|n| n.kind)
    }

    /// Returns the direct children of `idx`, in declaration order.
    pub fn children(&self, idx: NodeId) -> impl Iterator<Item = &FlockNode> {
        self.get(idx)
            .into_iter()
            .flat_map(|n| n.children.iter())
            .filter_map(|c| self.nodes.get(c))
    }

    #[inline]
    pub fn parent(&self, idx: NodeId) -> Option<&FlockNode> {
        self.parents.get(&idx).and_then(|p| self.nodes.get(p))
    }

    /// Returns every worker, in ascending id order.
    pub fn workers(&self) -> impl Iterator<Item = &FlockNode> {
        self.nodes.values().filter(|n| n.is_worker())
    }

    pub fn aggregators(&self) -> impl Iterator<Item = &FlockNode> {
        self.nodes.values().filter(|n| n.is_aggregator())
    }

    pub fn nodes(&self) -> impl Iterator<Item = &FlockNode> {
        self.nodes.values()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Accumulates node declarations and validates them into a `Flock`.
#[derive(Debug, Default, Clone)]
pub struct FlockBuilder {
    decls: Vec<(NodeId, Vec<NodeId>)>,
}

impl FlockBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a node and its direct children.
    ///
    /// # Arguments
    /// * `idx` - The id of the node.
    /// * `children` - The ids of its children, each of which must be declared too.
    pub fn node<I>(mut self, idx: usize, children: I) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        let children = children.into_iter().map(NodeId).collect();
        self.decls.push((NodeId(idx), children));
        self
    }

    /// Declares a node without children.
    pub fn leaf(self, idx: usize) -> Self {
        self.node(idx, [])
    }

    /// Validates the declarations and builds the flock.
    ///
    /// # Errors
    /// Returns a `FlockErr` if the declarations don't describe a single rooted tree.
    pub fn build(self) -> Result<Flock> {
        if self.decls.is_empty() {
            return Err(FlockErr::EmptyFlock);
        }

        let mut children_of = BTreeMap::new();
        for (idx, children) in self.decls {
            if children_of.insert(idx, children).is_some() {
                return Err(FlockErr::DuplicateNode(idx));
            }
        }

        let mut parents = BTreeMap::new();
        for (&idx, children) in &children_of {
            for &child in children {
                if !children_of.contains_key(&child) {
                    return Err(FlockErr::UnknownNode(child));
                }

                if let Some(first) = parents.insert(child, idx) {
                    return Err(FlockErr::MultipleParents {
                        node: child,
                        first,
                        second: idx,
                    });
                }
            }
        }

        let mut roots = children_of.keys().filter(|idx| !parents.contains_key(idx));
        let leader = *roots.next().ok_or(FlockErr::NoLeader)?;
        if let Some(&second) = roots.next() {
            return Err(FlockErr::MultipleLeaders {
                first: leader,
                second,
            });
        }

        // Every non-root node has exactly one parent, so anything the leader
        // can't reach hangs off a cycle.
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([leader]);
        while let Some(idx) = queue.pop_front() {
            if !seen.insert(idx) {
                return Err(FlockErr::Cycle(idx));
            }
            queue.extend(children_of[&idx].iter().copied());
        }

        if let Some(&idx) = children_of.keys().find(|idx| !seen.contains(idx)) {
            return Err(FlockErr::Cycle(idx));
        }

        let nodes: BTreeMap<_, _> = children_of
            .into_iter()
            .map(|(idx, children)| {
                let kind = if idx == leader {
                    NodeKind::Leader
                } else if children.is_empty() {
                    NodeKind::Worker
                } else {
                    NodeKind::Aggregator
                };

                (
                    idx,
                    FlockNode {
                        idx,
                        kind,
                        children,
                    },
                )
            })
            .collect();

        debug!(
            leader = leader.0,
            nodes = nodes.len();
            "built flock"
        );

        Ok(Flock {
            leader,
            nodes,
            parents,
        })
    }
}
