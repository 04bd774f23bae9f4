//! # dataflow-rs: a threaded dataflow pipeline engine
//!
//! A flow is a DAG of nodes (one source, any number of transforms and sinks)
//! laid out as a chain. Each node runs in its own execution unit and talks to
//! its neighbours over bounded channels carrying envelopes, so every node can
//! read the output of any of its ancestors.
//!
//! ## Architecture
//!
//! - **Pipeline**: channels, envelopes, messengers, tasks and the execution
//!   environment that launches and joins them
//! - **Delivery**: `batch` (lossless, back-pressure) or `realtime` (lossy,
//!   drops on a full channel)
//! - **Accelerators**: GPU transforms get one device each until none are left,
//!   then move to CPU or fail startup
//! - **Nodes**: built-in range source, Rhai script transform, print and log sinks
//!
//! ## Example
//!
//! ```ignore
//! use dataflow_rs::{config::FlowFile, flow::run_flow, pipeline::VisibleDevicesProbe};
//!
//! let flow = FlowFile::load("doubler.toml")?;
//! let summary = run_flow(&flow, &VisibleDevicesProbe)?;
//! summary.log();
//! ```

pub mod config;
pub mod error;
pub mod flow;
pub mod nodes;
pub mod pipeline;

// Re-export commonly used types
pub use config::{EngineConfig, FlowFile, NodeConfig, RunConfig};
pub use error::{FlowError, Result};
pub use flow::{run_flow, FlowSummary};
pub use nodes::NodeFactory;
pub use pipeline::{
    DeliveryPolicy, ExecutionEnvironment, GraphNode, NodeId, PipelineError, TerminationSignal,
};
