//! Execution core of the dataflow engine.
//!
//! A flow is a DAG of nodes flattened into a chain. Every node runs in its own
//! execution unit and owns one bounded output channel. Values travel inside an
//! [`Envelope`]: a map from node id to the value that node produced, which
//! grows as it moves downstream so a node can read any ancestor's output.
//!
//! # Architecture
//!
//! ```text
//! [Source] ──ch0──► [Transform] ──ch1──► [Sink] ──ch2──► [Sink]
//!    │                  │                  │               │
//!    └──────────── TerminationSignal (polled between steps) ┘
//! ```
//!
//! # Design
//!
//! - **Enum dispatch** over delivery policies (`AnyMessenger`) and task roles (`Task`).
//! - **Owned envelopes**: stamping clones, a received envelope is never mutated in place.
//! - **Start gate**: no unit runs before every unit exists.
//! - **Disconnect as end of stream**: the environment keeps no channel handles
//!   once the units are released.

pub mod accelerator;
pub mod channel;
pub mod envelope;
pub mod error;
pub mod id;
pub mod messenger;
pub mod node;
pub mod scheduler;
pub mod signal;
pub mod task;
pub mod topology;
pub mod unit;

pub use accelerator::{
    AcceleratorAllocator, AcceleratorProbe, AcceleratorVisibility, FixedAccelerators,
    VisibleDevicesProbe,
};
pub use channel::{Channel, ChannelRegistry, DEFAULT_CHANNEL_CAPACITY};
pub use envelope::Envelope;
pub use error::{PipelineError, PipelineResult};
pub use id::NodeId;
pub use messenger::{
    AnyMessenger, Delivery, DeliveryPolicy, Endpoint, LosslessMessenger, LossyMessenger,
    Messenger, MessengerStats, SkipReason,
};
pub use node::{Consumer, Device, GraphNode, Node, NodeKind, NodeRole, Processor, Producer};
pub use scheduler::{EnvironmentState, ExecutionEnvironment, TerminationHandle};
pub use signal::{TerminationObserver, TerminationSignal};
pub use task::{ExitReason, Message, SinkTask, SourceTask, Task, TaskReport, TransformTask};
pub use topology::{flatten, validate, FlowRecord};
pub use unit::{ExecutionUnit, StartGate, UnitExit, UnitReport};
