//! Pipeline-specific error types.

use crate::pipeline::id::NodeId;
use thiserror::Error;

/// Errors that can occur within the pipeline system.
///
/// Only startup failures reach the caller of the execution environment.
/// Receive-side errors are handled inside each worker task.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid topology: {0}")]
    Topology(String),

    #[error("Duplicate node id {0}")]
    DuplicateNode(NodeId),

    #[error("Node {node} refers to unknown parent {parent}")]
    UnknownParent { node: NodeId, parent: NodeId },

    #[error("Cycle detected in pipeline graph")]
    CycleDetected,

    #[error("Invalid channel capacity {0}: must be at least 1")]
    InvalidCapacity(usize),

    #[error("No GPU available to allocate {node}: {reason}")]
    AcceleratorUnavailable { node: String, reason: String },

    #[error("Failed to launch execution unit '{name}': {source}")]
    Launch {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Execution environment already started")]
    AlreadyStarted,

    #[error("Node {0} has no inbound channel")]
    NoInboundChannel(NodeId),

    #[error("Upstream of node {0} closed its channel")]
    UpstreamClosed(NodeId),

    #[error("Envelope received by {node} has no entry for ancestor {ancestor}")]
    MissingAncestor { node: NodeId, ancestor: NodeId },
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
