//! Flattened topology consumed by the execution environment.
//!
//! A run is described by an ordered list of [`FlowRecord`]s: the node, its
//! physical parent (the one channel it listens on) and whether anything
//! listens on its own channel. Logical parents may be several; they are
//! resolved against the envelope, so every one of them must have stamped
//! the envelope somewhere on the physical path leading to the node.
//!
//! [`flatten`] lays a graph out as a single chain in topological order, which
//! satisfies that precondition by construction. [`validate`] checks it for
//! any list of records, so a malformed layout fails at startup with a clear
//! message instead of a missing envelope key at run time.

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::id::NodeId;
use crate::pipeline::node::{GraphNode, NodeKind};
use std::collections::{HashMap, HashSet, VecDeque};

/// One entry of the flattened topology.
pub struct FlowRecord<T> {
    pub node: GraphNode<T>,
    /// Node whose channel this one reads. `None` for the source.
    pub parent: Option<NodeId>,
    /// Whether another entry reads this node's channel.
    pub has_children: bool,
}

impl<T> FlowRecord<T> {
    pub fn new(node: GraphNode<T>, parent: Option<NodeId>, has_children: bool) -> Self {
        Self {
            node,
            parent,
            has_children,
        }
    }

    #[inline]
    pub fn id(&self) -> NodeId {
        self.node.id()
    }
}

impl<T> std::fmt::Debug for FlowRecord<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowRecord")
            .field("node", &self.node)
            .field("parent", &self.parent)
            .field("has_children", &self.has_children)
            .finish()
    }
}

/// Lay `nodes` out as a chain in topological order.
///
/// Entry `i` reads entry `i - 1`'s channel, so the envelope reaching any node
/// has passed every node before it. Ties are broken by input order, making
/// the layout deterministic.
pub fn flatten<T>(nodes: Vec<GraphNode<T>>) -> PipelineResult<Vec<FlowRecord<T>>> {
    let n = nodes.len();
    let mut index_of: HashMap<NodeId, usize> = HashMap::with_capacity(n);
    for (i, node) in nodes.iter().enumerate() {
        if index_of.insert(node.id(), i).is_some() {
            return Err(PipelineError::DuplicateNode(node.id()));
        }
    }

    let sources = nodes.iter().filter(|n| n.kind() == NodeKind::Source).count();
    if sources != 1 {
        return Err(PipelineError::Topology(format!(
            "a flow needs exactly one source, found {}",
            sources
        )));
    }

    let mut in_degree = vec![0u32; n];
    let mut adj: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (to, node) in nodes.iter().enumerate() {
        if node.kind() != NodeKind::Source && node.parents().is_empty() {
            return Err(PipelineError::Topology(format!(
                "{} '{}' ({}) has no parents",
                node.kind(),
                node.name(),
                node.id()
            )));
        }
        for parent in node.parents() {
            let &from = index_of.get(parent).ok_or(PipelineError::UnknownParent {
                node: node.id(),
                parent: *parent,
            })?;
            if nodes[from].kind() == NodeKind::Sink {
                return Err(PipelineError::Topology(format!(
                    "{} lists sink {} as a parent; sinks produce no values",
                    node.id(),
                    parent
                )));
            }
            adj[from].push(to);
            in_degree[to] += 1;
        }
    }

    // Kahn's algorithm, FIFO so that input order breaks ties
    let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(current) = queue.pop_front() {
        order.push(current);
        for &next in &adj[current] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                queue.push_back(next);
            }
        }
    }
    if order.len() != n {
        return Err(PipelineError::CycleDetected);
    }

    let mut slots: Vec<Option<GraphNode<T>>> = nodes.into_iter().map(Some).collect();
    let mut records = Vec::with_capacity(n);
    let mut previous: Option<NodeId> = None;
    for (position, &index) in order.iter().enumerate() {
        let node = slots[index]
            .take()
            .ok_or_else(|| PipelineError::Topology("node scheduled twice".to_string()))?;
        let id = node.id();
        records.push(FlowRecord::new(node, previous, position + 1 < n));
        previous = Some(id);
    }

    tracing::debug!(
        "Flattened {} nodes: {:?}",
        records.len(),
        records.iter().map(|r| r.id()).collect::<Vec<_>>()
    );
    Ok(records)
}

/// Check that `records` can run.
///
/// - ids are unique;
/// - only sources lack a physical parent, and that parent exists;
/// - physical parent chains are acyclic;
/// - `has_children` matches whether some record reads the channel;
/// - every logical parent is a source or transform on the physical path.
pub fn validate<T>(records: &[FlowRecord<T>]) -> PipelineResult<()> {
    let mut by_id: HashMap<NodeId, &FlowRecord<T>> = HashMap::with_capacity(records.len());
    for record in records {
        if by_id.insert(record.id(), record).is_some() {
            return Err(PipelineError::DuplicateNode(record.id()));
        }
    }

    let read: HashSet<NodeId> = records.iter().filter_map(|r| r.parent).collect();

    for record in records {
        let id = record.id();
        match (record.node.kind(), record.parent) {
            (NodeKind::Source, Some(parent)) => {
                return Err(PipelineError::Topology(format!(
                    "source {} cannot read from {}",
                    id, parent
                )));
            }
            (NodeKind::Source, None) => {}
            (kind, None) => {
                return Err(PipelineError::Topology(format!(
                    "{} {} has no inbound channel",
                    kind, id
                )));
            }
            (_, Some(parent)) if !by_id.contains_key(&parent) => {
                return Err(PipelineError::UnknownParent { node: id, parent });
            }
            _ => {}
        }

        if record.has_children != read.contains(&id) {
            return Err(PipelineError::Topology(format!(
                "{} has_children={} but {} reads its channel",
                id,
                record.has_children,
                if read.contains(&id) { "a node" } else { "no node" }
            )));
        }

        // Stamping ancestors along the physical path.
        let mut stamped = HashSet::new();
        let mut visited = HashSet::from([id]);
        let mut cursor = record.parent;
        while let Some(ancestor) = cursor {
            if !visited.insert(ancestor) {
                return Err(PipelineError::CycleDetected);
            }
            let upstream = by_id
                .get(&ancestor)
                .ok_or(PipelineError::UnknownParent { node: id, parent: ancestor })?;
            if upstream.node.kind() != NodeKind::Sink {
                stamped.insert(ancestor);
            }
            cursor = upstream.parent;
        }

        for logical in record.node.parents() {
            if !stamped.contains(logical) {
                return Err(PipelineError::MissingAncestor {
                    node: id,
                    ancestor: *logical,
                });
            }
        }
    }
    Ok(())
}
