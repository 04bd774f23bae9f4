//! Built-in node implementations for `f64` flows.
//!
//! | kind     | role      | node                |
//! |----------|-----------|---------------------|
//! | `range`  | source    | [`RangeSource`]     |
//! | `script` | transform | [`ScriptTransform`] |
//! | `print`  | sink      | [`PrintSink`]       |
//! | `log`    | sink      | [`LogSink`]         |

pub mod range_source;
pub mod script_transform;
pub mod sinks;

pub use range_source::RangeSource;
pub use script_transform::ScriptTransform;
pub use sinks::{LogSink, PrintSink};

use crate::config::{FlowFile, NodeConfig, NodeKindConfig};
use crate::error::{FlowError, Result};
use crate::pipeline::{GraphNode, NodeId};
use std::collections::HashMap;
use std::time::Duration;

/// Factory for creating nodes from configuration.
#[derive(Debug, Default, Clone, Copy)]
pub struct NodeFactory;

impl NodeFactory {
    pub fn new() -> Self {
        Self
    }

    /// Create one node. `parents` are already resolved to ids.
    pub fn create(
        &self,
        id: NodeId,
        parents: Vec<NodeId>,
        config: &NodeConfig,
    ) -> Result<GraphNode<f64>> {
        let name = config.name.clone();
        if config.kind.is_source() && !parents.is_empty() {
            return Err(FlowError::node(name, "a range source cannot have parents"));
        }
        if !config.kind.is_source() && parents.is_empty() {
            return Err(FlowError::node(name, "needs at least one parent"));
        }

        Ok(match &config.kind {
            NodeKindConfig::Range {
                start,
                end,
                step,
                interval_ms,
            } => GraphNode::source(
                id,
                RangeSource::new(name, *start, *end, *step)?
                    .with_interval(interval_ms.map(Duration::from_millis)),
            ),
            NodeKindConfig::Script {
                script,
                device,
                allow_cpu_fallback,
            } => GraphNode::transform(
                id,
                parents,
                ScriptTransform::compile(name, script)?
                    .with_device(*device)
                    .allow_cpu_fallback(*allow_cpu_fallback),
            ),
            NodeKindConfig::Print { prefix } => {
                GraphNode::sink(id, parents, PrintSink::stdout(name, prefix.clone()))
            }
            NodeKindConfig::Log => GraphNode::sink(id, parents, LogSink::new(name)),
        })
    }

    /// Create every node of `flow`. Ids follow file order.
    pub fn build(&self, flow: &FlowFile) -> Result<Vec<GraphNode<f64>>> {
        let ids: HashMap<&str, NodeId> = flow
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.name.as_str(), NodeId(i as u32)))
            .collect();

        flow.nodes
            .iter()
            .enumerate()
            .map(|(i, config)| {
                let parents = config
                    .parents
                    .iter()
                    .map(|p| {
                        ids.get(p.as_str()).copied().ok_or_else(|| {
                            FlowError::node(&config.name, format!("unknown parent '{}'", p))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                self.create(NodeId(i as u32), parents, config)
            })
            .collect()
    }
}
