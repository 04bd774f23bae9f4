//! Node abstraction for the pipeline.
//!
//! What a node computes is up to its implementation. The pipeline only needs
//! the role-specific step (`next`, `process`, `consume`), the lifecycle hooks,
//! and for processors the device affinity.
//!
//! `NodeRole` is a closed tagged variant; the scheduler matches on it to
//! build the right task, with no runtime type inspection.

use crate::pipeline::accelerator::AcceleratorVisibility;
use crate::pipeline::id::NodeId;
use serde::{Deserialize, Serialize};

/// Where a processor runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Cpu,
    Gpu,
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Cpu => write!(f, "CPU"),
            Device::Gpu => write!(f, "GPU"),
        }
    }
}

/// Lifecycle shared by every role.
pub trait Node: Send {
    /// Human-readable name of this node.
    fn name(&self) -> &str;

    /// Called inside the execution unit before the first step.
    fn open(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called inside the execution unit after the last step.
    fn close(&mut self) {}
}

/// A node with no inputs.
pub trait Producer<T>: Node {
    /// Next value, or `None` once exhausted.
    fn next(&mut self) -> anyhow::Result<Option<T>>;
}

/// A node that maps its parents' values to one output.
pub trait Processor<T>: Node {
    /// `inputs` holds one value per logical parent, in parent order.
    fn process(&mut self, inputs: Vec<T>) -> anyhow::Result<T>;

    fn device(&self) -> Device {
        Device::Cpu
    }

    /// Switch execution device. The default refuses any change.
    fn change_device(&mut self, device: Device) -> anyhow::Result<()> {
        if device == self.device() {
            Ok(())
        } else {
            anyhow::bail!("{} cannot run on {}", self.name(), device)
        }
    }

    /// Called inside an accelerated unit, after the device restriction is
    /// installed and before `open`.
    fn bind_accelerator(&mut self, _visibility: &AcceleratorVisibility) {}
}

/// A node that only reads.
pub trait Consumer<T>: Node {
    fn consume(&mut self, inputs: Vec<T>) -> anyhow::Result<()>;
}

/// Role discriminant, without the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Source,
    Transform,
    Sink,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKind::Source => write!(f, "source"),
            NodeKind::Transform => write!(f, "transform"),
            NodeKind::Sink => write!(f, "sink"),
        }
    }
}

/// The node behind a graph entry, by role.
pub enum NodeRole<T> {
    Source(Box<dyn Producer<T>>),
    Transform(Box<dyn Processor<T>>),
    Sink(Box<dyn Consumer<T>>),
}

impl<T> NodeRole<T> {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeRole::Source(_) => NodeKind::Source,
            NodeRole::Transform(_) => NodeKind::Transform,
            NodeRole::Sink(_) => NodeKind::Sink,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            NodeRole::Source(n) => n.name(),
            NodeRole::Transform(n) => n.name(),
            NodeRole::Sink(n) => n.name(),
        }
    }
}

/// A node with its identity and logical parents.
pub struct GraphNode<T> {
    id: NodeId,
    parents: Vec<NodeId>,
    role: NodeRole<T>,
}

impl<T> GraphNode<T> {
    pub fn source(id: NodeId, node: impl Producer<T> + 'static) -> Self {
        Self {
            id,
            parents: Vec::new(),
            role: NodeRole::Source(Box::new(node)),
        }
    }

    pub fn transform(
        id: NodeId,
        parents: Vec<NodeId>,
        node: impl Processor<T> + 'static,
    ) -> Self {
        Self {
            id,
            parents,
            role: NodeRole::Transform(Box::new(node)),
        }
    }

    pub fn sink(id: NodeId, parents: Vec<NodeId>, node: impl Consumer<T> + 'static) -> Self {
        Self {
            id,
            parents,
            role: NodeRole::Sink(Box::new(node)),
        }
    }

    /// Build from an already boxed role. Sources never keep parents.
    pub fn from_role(id: NodeId, parents: Vec<NodeId>, role: NodeRole<T>) -> Self {
        let parents = match role {
            NodeRole::Source(_) => Vec::new(),
            _ => parents,
        };
        Self { id, parents, role }
    }

    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Logical parents, in the order their values are handed to the node.
    pub fn parents(&self) -> &[NodeId] {
        &self.parents
    }

    pub fn kind(&self) -> NodeKind {
        self.role.kind()
    }

    pub fn name(&self) -> &str {
        self.role.name()
    }

    pub fn role(&self) -> &NodeRole<T> {
        &self.role
    }

    pub fn into_parts(self) -> (NodeId, Vec<NodeId>, NodeRole<T>) {
        (self.id, self.parents, self.role)
    }
}

impl<T> std::fmt::Debug for GraphNode<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphNode")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("kind", &self.kind())
            .field("parents", &self.parents)
            .finish()
    }
}
