//! Configuration for dataflow-rs
//!
//! Two layers:
//! - [`EngineConfig`] - how the execution environment moves data (delivery
//!   policy, channel capacity, accelerator count)
//! - [`FlowFile`] - a complete flow description: engine settings, run
//!   settings and the node list
//!
//! Flow files are TOML by default, JSON when the extension is `.json`.
//!
//! # Example
//!
//! ```toml
//! name = "doubler"
//!
//! [engine]
//! delivery = "batch"
//! channel_capacity = 10
//!
//! [[nodes]]
//! name = "numbers"
//! kind = "range"
//! start = 1.0
//! end = 5.0
//!
//! [[nodes]]
//! name = "double"
//! kind = "script"
//! parents = ["numbers"]
//! script = "inputs[0] * 2.0"
//!
//! [[nodes]]
//! name = "out"
//! kind = "print"
//! parents = ["double"]
//! ```

use crate::error::{FlowError, Result};
use crate::pipeline::{DeliveryPolicy, Device, DEFAULT_CHANNEL_CAPACITY};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Flow file extension for JSON flows
pub const JSON_EXTENSION: &str = "json";

/// Settings for the execution environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Lossless (`batch`) or lossy (`realtime`) delivery
    pub delivery: DeliveryPolicy,
    /// Capacity of every node's output channel
    pub channel_capacity: usize,
    /// Number of accelerators to assign from. `None` probes the host.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accelerators: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            delivery: DeliveryPolicy::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            accelerators: None,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.channel_capacity == 0 {
            return Err(FlowError::Config(
                "channel_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings for a single run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Request termination after this many milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl RunConfig {
    pub fn duration(&self) -> Option<Duration> {
        self.duration_ms.map(Duration::from_millis)
    }
}

fn default_step() -> f64 {
    1.0
}

/// What a configured node does
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NodeKindConfig {
    /// Emits `start, start + step, ...` up to and including `end`
    Range {
        start: f64,
        end: f64,
        #[serde(default = "default_step")]
        step: f64,
        /// Pause between values
        #[serde(default, skip_serializing_if = "Option::is_none")]
        interval_ms: Option<u64>,
    },
    /// Rhai expression over `inputs`, one element per parent
    Script {
        script: String,
        #[serde(default)]
        device: Device,
        #[serde(default)]
        allow_cpu_fallback: bool,
    },
    /// Prints one line per envelope to stdout
    Print {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prefix: Option<String>,
    },
    /// Logs one line per envelope through tracing
    Log,
}

impl NodeKindConfig {
    pub fn is_source(&self) -> bool {
        matches!(self, NodeKindConfig::Range { .. })
    }
}

/// One node of a flow file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub name: String,
    /// Names of the nodes whose values this node reads, in order
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(flatten)]
    pub kind: NodeKindConfig,
}

fn default_flow_name() -> String {
    "flow".to_string()
}

/// A complete flow description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowFile {
    #[serde(default = "default_flow_name")]
    pub name: String,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
}

impl FlowFile {
    /// Load a flow file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            FlowError::Config(format!("Failed to read flow file {:?}: {}", path, e))
        })?;

        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(JSON_EXTENSION));
        let flow = if is_json {
            Self::from_json(&content)
        } else {
            Self::from_toml(&content)
        }
        .map_err(|e| e.with_context(format!("Failed to parse flow file {:?}", path)))?;

        flow.validate()?;
        tracing::debug!("Loaded flow '{}' with {} nodes", flow.name, flow.nodes.len());
        Ok(flow)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| FlowError::Config(e.to_string()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| FlowError::Config(e.to_string()))
    }

    /// Structural checks that need no node construction.
    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        if self.nodes.is_empty() {
            return Err(FlowError::Config(format!("flow '{}' has no nodes", self.name)));
        }
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.name.as_str()) {
                return Err(FlowError::Config(format!(
                    "duplicate node name '{}'",
                    node.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLOW: &str = r#"
name = "doubler"

[engine]
delivery = "lossy"
channel_capacity = 4

[run]
duration_ms = 250

[[nodes]]
name = "numbers"
kind = "range"
start = 1.0
end = 5.0

[[nodes]]
name = "double"
kind = "script"
parents = ["numbers"]
script = "inputs[0] * 2.0"
device = "gpu"

[[nodes]]
name = "out"
kind = "log"
parents = ["double"]
"#;

    #[test]
    fn test_engine_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.delivery, DeliveryPolicy::Batch);
        assert_eq!(config.channel_capacity, 10);
        assert_eq!(config.accelerators, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = EngineConfig {
            channel_capacity: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(FlowError::Config(_))));
    }

    #[test]
    fn test_parse_toml_flow() {
        let flow = FlowFile::from_toml(FLOW).unwrap();
        assert_eq!(flow.name, "doubler");
        assert_eq!(flow.engine.delivery, DeliveryPolicy::Realtime);
        assert_eq!(flow.engine.channel_capacity, 4);
        assert_eq!(flow.run.duration(), Some(Duration::from_millis(250)));
        assert_eq!(flow.nodes.len(), 3);
        assert_eq!(
            flow.nodes[0].kind,
            NodeKindConfig::Range {
                start: 1.0,
                end: 5.0,
                step: 1.0,
                interval_ms: None
            }
        );
        assert!(matches!(
            flow.nodes[1].kind,
            NodeKindConfig::Script {
                device: Device::Gpu,
                allow_cpu_fallback: false,
                ..
            }
        ));
        assert_eq!(flow.nodes[2].parents, vec!["double".to_string()]);
        assert_eq!(flow.nodes[2].kind, NodeKindConfig::Log);
        assert!(flow.validate().is_ok());
    }

    #[test]
    fn test_parse_json_flow() {
        let json = r#"{
            "nodes": [
                { "name": "n", "kind": "range", "start": 0.0, "end": 2.0, "step": 0.5 },
                { "name": "p", "kind": "print", "parents": ["n"], "prefix": "> " }
            ]
        }"#;
        let flow = FlowFile::from_json(json).unwrap();
        assert_eq!(flow.name, "flow");
        assert_eq!(flow.engine, EngineConfig::default());
        assert!(flow.nodes[0].kind.is_source());
        assert_eq!(
            flow.nodes[1].kind,
            NodeKindConfig::Print {
                prefix: Some("> ".to_string())
            }
        );
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let toml = r#"
[[nodes]]
name = "x"
kind = "teleport"
"#;
        assert!(FlowFile::from_toml(toml).is_err());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let toml = r#"
[[nodes]]
name = "a"
kind = "range"
start = 0.0
end = 1.0

[[nodes]]
name = "a"
kind = "log"
parents = ["a"]
"#;
        let flow = FlowFile::from_toml(toml).unwrap();
        let err = flow.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate node name 'a'"));
    }

    #[test]
    fn test_empty_flow_rejected() {
        let flow = FlowFile::from_toml("name = \"empty\"").unwrap();
        assert!(flow.validate().is_err());
    }
}
