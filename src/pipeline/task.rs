//! Worker tasks: a node bound to its messenger.
//!
//! Each task runs inside its own execution unit and drives one node:
//!
//! - **Source**: `next` → publish, until exhausted or termination requested,
//!   then publish a `Stop` (always blocking).
//! - **Transform**: receive → process → publish. A `Stop` among the inputs is
//!   forwarded as the task's own `Stop` and ends the loop.
//! - **Sink**: receive → consume, passing envelopes through when the sink has
//!   children. A `Stop` is passed through (blocking) and ends the loop. On any
//!   other exit a sink with children stamps its own `Stop`.
//!
//! An envelope carrying `Stop` under any id ends the reader's stream.
//!
//! The termination flag is polled between iterations. A task already blocked
//! in a send or receive stays blocked until that I/O completes or its peer
//! goes away; a closed upstream channel is treated like a `Stop`.

use crate::pipeline::accelerator::AcceleratorVisibility;
use crate::pipeline::error::PipelineError;
use crate::pipeline::id::NodeId;
use crate::pipeline::messenger::{AnyMessenger, Messenger, MessengerStats};
use crate::pipeline::node::{Consumer, Device, NodeKind, Processor, Producer};

/// Envelope payload: a value, or the end-of-stream marker.
#[derive(Debug, Clone, PartialEq)]
pub enum Message<T> {
    Data(T),
    Stop,
}

impl<T> Message<T> {
    #[inline]
    pub fn is_stop(&self) -> bool {
        matches!(self, Message::Stop)
    }

    pub fn into_data(self) -> Option<T> {
        match self {
            Message::Data(value) => Some(value),
            Message::Stop => None,
        }
    }
}

/// Why a task left its loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// The producer ran out of values.
    Exhausted,
    /// A `Stop` arrived from upstream.
    StopReceived,
    /// The shared termination flag was set.
    TerminationRequested,
    /// The upstream channel closed without a `Stop`.
    UpstreamClosed,
    /// The node (or its envelope) failed; the message says how.
    NodeFailed(String),
}

/// Summary of one task's run.
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    /// Values produced, processed or consumed.
    pub processed: u64,
    pub exit: ExitReason,
    pub stats: MessengerStats,
}

/// Inputs after a receive, already checked for end-of-stream.
enum Inbound<T> {
    Values(Vec<T>),
    Stop,
    Closed,
    Failed(String),
}

fn receive_inputs<T: Clone + Send>(messenger: &mut AnyMessenger<Message<T>>) -> Inbound<T> {
    // A `Stop` under any id ends the stream, not only under a logical parent.
    match messenger.receive_until(Message::is_stop) {
        Ok(None) => Inbound::Stop,
        Ok(Some(inputs)) => {
            Inbound::Values(inputs.into_iter().filter_map(Message::into_data).collect())
        }
        Err(PipelineError::UpstreamClosed(_)) => Inbound::Closed,
        Err(e) => Inbound::Failed(e.to_string()),
    }
}

pub struct SourceTask<T> {
    id: NodeId,
    node: Box<dyn Producer<T>>,
    messenger: AnyMessenger<Message<T>>,
}

impl<T: Clone + Send> SourceTask<T> {
    pub fn new(id: NodeId, node: Box<dyn Producer<T>>, messenger: AnyMessenger<Message<T>>) -> Self {
        Self {
            id,
            node,
            messenger,
        }
    }

    pub fn run(mut self) -> TaskReport {
        let mut processed = 0;
        let exit = match self.node.open() {
            Err(e) => ExitReason::NodeFailed(format!("open failed: {:#}", e)),
            Ok(()) => loop {
                if self.messenger.is_termination_requested() {
                    break ExitReason::TerminationRequested;
                }
                match self.node.next() {
                    Ok(Some(value)) => {
                        self.messenger.publish(Message::Data(value));
                        processed += 1;
                    }
                    Ok(None) => break ExitReason::Exhausted,
                    Err(e) => break ExitReason::NodeFailed(format!("{:#}", e)),
                }
            },
        };

        self.messenger.publish_termination(Message::Stop);
        self.node.close();
        finish(self.id, self.node.name(), NodeKind::Source, processed, exit, &self.messenger)
    }
}

pub struct TransformTask<T> {
    id: NodeId,
    parent: NodeId,
    node: Box<dyn Processor<T>>,
    messenger: AnyMessenger<Message<T>>,
}

impl<T: Clone + Send> TransformTask<T> {
    pub fn new(
        id: NodeId,
        parent: NodeId,
        node: Box<dyn Processor<T>>,
        messenger: AnyMessenger<Message<T>>,
    ) -> Self {
        Self {
            id,
            parent,
            node,
            messenger,
        }
    }

    pub fn parent(&self) -> NodeId {
        self.parent
    }

    pub fn device(&self) -> Device {
        self.node.device()
    }

    pub fn change_device(&mut self, device: Device) -> anyhow::Result<()> {
        self.node.change_device(device)
    }

    pub fn bind_accelerator(&mut self, visibility: &AcceleratorVisibility) {
        self.node.bind_accelerator(visibility);
    }

    pub fn run(mut self) -> TaskReport {
        let mut processed = 0;
        let exit = match self.node.open() {
            Err(e) => ExitReason::NodeFailed(format!("open failed: {:#}", e)),
            Ok(()) => loop {
                if self.messenger.is_termination_requested() {
                    break ExitReason::TerminationRequested;
                }
                match receive_inputs(&mut self.messenger) {
                    Inbound::Values(inputs) => match self.node.process(inputs) {
                        Ok(output) => {
                            self.messenger.publish(Message::Data(output));
                            processed += 1;
                        }
                        Err(e) => break ExitReason::NodeFailed(format!("{:#}", e)),
                    },
                    Inbound::Stop => break ExitReason::StopReceived,
                    Inbound::Closed => break ExitReason::UpstreamClosed,
                    Inbound::Failed(message) => break ExitReason::NodeFailed(message),
                }
            },
        };

        self.messenger.publish_termination(Message::Stop);
        self.node.close();
        finish(self.id, self.node.name(), NodeKind::Transform, processed, exit, &self.messenger)
    }
}

pub struct SinkTask<T> {
    id: NodeId,
    parent: NodeId,
    has_children: bool,
    node: Box<dyn Consumer<T>>,
    messenger: AnyMessenger<Message<T>>,
}

impl<T: Clone + Send> SinkTask<T> {
    pub fn new(
        id: NodeId,
        parent: NodeId,
        has_children: bool,
        node: Box<dyn Consumer<T>>,
        messenger: AnyMessenger<Message<T>>,
    ) -> Self {
        Self {
            id,
            parent,
            has_children,
            node,
            messenger,
        }
    }

    pub fn parent(&self) -> NodeId {
        self.parent
    }

    pub fn has_children(&self) -> bool {
        self.has_children
    }

    pub fn run(mut self) -> TaskReport {
        let mut processed = 0;
        let exit = match self.node.open() {
            Err(e) => ExitReason::NodeFailed(format!("open failed: {:#}", e)),
            Ok(()) => loop {
                if self.messenger.is_termination_requested() {
                    break ExitReason::TerminationRequested;
                }
                match receive_inputs(&mut self.messenger) {
                    Inbound::Values(inputs) => {
                        if let Err(e) = self.node.consume(inputs) {
                            break ExitReason::NodeFailed(format!("{:#}", e));
                        }
                        processed += 1;
                        if self.has_children {
                            self.messenger.passthrough();
                        }
                    }
                    Inbound::Stop => {
                        if self.has_children {
                            self.messenger.passthrough_termination();
                        }
                        break ExitReason::StopReceived;
                    }
                    Inbound::Closed => break ExitReason::UpstreamClosed,
                    Inbound::Failed(message) => break ExitReason::NodeFailed(message),
                }
            },
        };

        if self.has_children && exit != ExitReason::StopReceived {
            self.messenger.publish_termination(Message::Stop);
        }
        self.node.close();
        finish(self.id, self.node.name(), NodeKind::Sink, processed, exit, &self.messenger)
    }
}

fn finish<T: Clone + Send>(
    id: NodeId,
    name: &str,
    kind: NodeKind,
    processed: u64,
    exit: ExitReason,
    messenger: &AnyMessenger<Message<T>>,
) -> TaskReport {
    let stats = messenger.stats();
    match &exit {
        ExitReason::NodeFailed(message) => {
            tracing::error!("{} '{}' ({}) failed: {}", kind, name, id, message)
        }
        _ => tracing::debug!(
            "{} '{}' ({}) finished: {:?}, {} processed, {} sent, {} dropped",
            kind,
            name,
            id,
            exit,
            processed,
            stats.sent,
            stats.dropped
        ),
    }
    TaskReport {
        id,
        name: name.to_string(),
        kind,
        processed,
        exit,
        stats,
    }
}

/// Enum dispatch over the three task roles.
pub enum Task<T> {
    Source(SourceTask<T>),
    Transform(TransformTask<T>),
    Sink(SinkTask<T>),
}

impl<T: Clone + Send> Task<T> {
    pub fn id(&self) -> NodeId {
        match self {
            Task::Source(t) => t.id,
            Task::Transform(t) => t.id,
            Task::Sink(t) => t.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Task::Source(t) => t.node.name(),
            Task::Transform(t) => t.node.name(),
            Task::Sink(t) => t.node.name(),
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Task::Source(_) => NodeKind::Source,
            Task::Transform(_) => NodeKind::Transform,
            Task::Sink(_) => NodeKind::Sink,
        }
    }

    /// Apply a device restriction before running. Only transforms use it.
    pub fn bind_accelerator(&mut self, visibility: &AcceleratorVisibility) {
        if let Task::Transform(t) = self {
            t.bind_accelerator(visibility);
        }
    }

    pub fn run(self) -> TaskReport {
        match self {
            Task::Source(t) => t.run(),
            Task::Transform(t) => t.run(),
            Task::Sink(t) => t.run(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::channel::ChannelRegistry;
    use crate::pipeline::envelope::Envelope;
    use crate::pipeline::messenger::{DeliveryPolicy, Endpoint};
    use crate::pipeline::node::Node;
    use crate::pipeline::signal::TerminationSignal;
    use std::sync::{Arc, Mutex};

    struct Counter {
        next: i64,
        end: i64,
    }

    impl Node for Counter {
        fn name(&self) -> &str {
            "counter"
        }
    }

    impl Producer<i64> for Counter {
        fn next(&mut self) -> anyhow::Result<Option<i64>> {
            if self.next > self.end {
                return Ok(None);
            }
            self.next += 1;
            Ok(Some(self.next - 1))
        }
    }

    struct Negate;

    impl Node for Negate {
        fn name(&self) -> &str {
            "negate"
        }
    }

    impl Processor<i64> for Negate {
        fn process(&mut self, inputs: Vec<i64>) -> anyhow::Result<i64> {
            Ok(-inputs[0])
        }
    }

    struct Failing;

    impl Node for Failing {
        fn name(&self) -> &str {
            "failing"
        }
    }

    impl Processor<i64> for Failing {
        fn process(&mut self, _inputs: Vec<i64>) -> anyhow::Result<i64> {
            anyhow::bail!("boom")
        }
    }

    struct Collect(Arc<Mutex<Vec<Vec<i64>>>>);

    impl Node for Collect {
        fn name(&self) -> &str {
            "collect"
        }
    }

    impl Consumer<i64> for Collect {
        fn consume(&mut self, inputs: Vec<i64>) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(inputs);
            Ok(())
        }
    }

    fn messenger(
        registry: &ChannelRegistry<Message<i64>>,
        signal: &TerminationSignal,
        id: u32,
        parent: Option<u32>,
        parents: Vec<u32>,
    ) -> AnyMessenger<Message<i64>> {
        let endpoint = Endpoint::new(
            NodeId(id),
            parents.into_iter().map(NodeId).collect(),
            registry.get(NodeId(id)).unwrap().sender(),
            parent.map(|p| registry.get(NodeId(p)).unwrap().receiver()),
            signal.observer(),
        );
        AnyMessenger::new(DeliveryPolicy::Batch, endpoint)
    }

    fn registry(ids: &[u32]) -> ChannelRegistry<Message<i64>> {
        let mut registry = ChannelRegistry::new(16).unwrap();
        for id in ids {
            registry.create(NodeId(*id)).unwrap();
        }
        registry
    }

    #[test]
    fn test_source_publishes_then_stops() {
        let registry = registry(&[0]);
        let signal = TerminationSignal::new();
        let task = SourceTask::new(
            NodeId(0),
            Box::new(Counter { next: 1, end: 3 }),
            messenger(&registry, &signal, 0, None, vec![]),
        );

        let report = task.run();
        assert_eq!(report.exit, ExitReason::Exhausted);
        assert_eq!(report.processed, 3);

        let rx = registry.get(NodeId(0)).unwrap().receiver();
        let received: Vec<_> = rx.try_iter().map(|e| e.get(NodeId(0)).cloned()).collect();
        assert_eq!(
            received,
            vec![
                Some(Message::Data(1)),
                Some(Message::Data(2)),
                Some(Message::Data(3)),
                Some(Message::Stop)
            ]
        );
    }

    #[test]
    fn test_source_honours_termination() {
        let registry = registry(&[0]);
        let signal = TerminationSignal::new();
        signal.set();
        let task = SourceTask::new(
            NodeId(0),
            Box::new(Counter { next: 1, end: 100 }),
            messenger(&registry, &signal, 0, None, vec![]),
        );

        let report = task.run();
        assert_eq!(report.exit, ExitReason::TerminationRequested);
        assert_eq!(report.processed, 0);
        let rx = registry.get(NodeId(0)).unwrap().receiver();
        assert_eq!(rx.recv().unwrap().get(NodeId(0)), Some(&Message::Stop));
    }

    #[test]
    fn test_transform_forwards_stop() {
        let registry = registry(&[0, 1]);
        let signal = TerminationSignal::new();
        let upstream = registry.get(NodeId(0)).unwrap().sender();
        upstream.send(Envelope::single(NodeId(0), Message::Data(4))).unwrap();
        upstream.send(Envelope::single(NodeId(0), Message::Stop)).unwrap();

        let task = TransformTask::new(
            NodeId(1),
            NodeId(0),
            Box::new(Negate),
            messenger(&registry, &signal, 1, Some(0), vec![0]),
        );
        let report = task.run();
        assert_eq!(report.exit, ExitReason::StopReceived);
        assert_eq!(report.processed, 1);

        let rx = registry.get(NodeId(1)).unwrap().receiver();
        let first = rx.recv().unwrap();
        assert_eq!(first.get(NodeId(0)), Some(&Message::Data(4)));
        assert_eq!(first.get(NodeId(1)), Some(&Message::Data(-4)));
        let second = rx.recv().unwrap();
        assert_eq!(second.get(NodeId(1)), Some(&Message::Stop));
    }

    #[test]
    fn test_transform_failure_still_stops_downstream() {
        let registry = registry(&[0, 1]);
        let signal = TerminationSignal::new();
        let upstream = registry.get(NodeId(0)).unwrap().sender();
        upstream.send(Envelope::single(NodeId(0), Message::Data(1))).unwrap();

        let task = TransformTask::new(
            NodeId(1),
            NodeId(0),
            Box::new(Failing),
            messenger(&registry, &signal, 1, Some(0), vec![0]),
        );
        let report = task.run();
        assert!(matches!(report.exit, ExitReason::NodeFailed(ref m) if m.contains("boom")));

        let rx = registry.get(NodeId(1)).unwrap().receiver();
        assert_eq!(rx.recv().unwrap().get(NodeId(1)), Some(&Message::Stop));
    }

    #[test]
    fn test_sink_passthrough_when_it_has_children() {
        let registry = registry(&[0, 1]);
        let signal = TerminationSignal::new();
        let upstream = registry.get(NodeId(0)).unwrap().sender();
        upstream.send(Envelope::single(NodeId(0), Message::Data(9))).unwrap();
        upstream.send(Envelope::single(NodeId(0), Message::Stop)).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let task = SinkTask::new(
            NodeId(1),
            NodeId(0),
            true,
            Box::new(Collect(Arc::clone(&seen))),
            messenger(&registry, &signal, 1, Some(0), vec![0]),
        );
        let report = task.run();
        assert_eq!(report.exit, ExitReason::StopReceived);
        assert_eq!(*seen.lock().unwrap(), vec![vec![9]]);

        let rx = registry.get(NodeId(1)).unwrap().receiver();
        assert_eq!(rx.recv().unwrap(), Envelope::single(NodeId(0), Message::Data(9)));
        assert_eq!(rx.recv().unwrap(), Envelope::single(NodeId(0), Message::Stop));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_sink_without_children_sends_nothing() {
        let registry = registry(&[0, 1]);
        let signal = TerminationSignal::new();
        let upstream = registry.get(NodeId(0)).unwrap().sender();
        upstream.send(Envelope::single(NodeId(0), Message::Data(9))).unwrap();
        upstream.send(Envelope::single(NodeId(0), Message::Stop)).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let task = SinkTask::new(
            NodeId(1),
            NodeId(0),
            false,
            Box::new(Collect(Arc::clone(&seen))),
            messenger(&registry, &signal, 1, Some(0), vec![0]),
        );
        task.run();
        assert!(registry.get(NodeId(1)).unwrap().is_empty());
    }

    #[test]
    fn test_sink_stops_on_stop_under_non_parent() {
        let registry = registry(&[0, 1, 2]);
        let signal = TerminationSignal::new();
        let upstream = registry.get(NodeId(1)).unwrap().sender();
        let last: Envelope<Message<i64>> =
            [(NodeId(0), Message::Data(5)), (NodeId(1), Message::Stop)]
                .into_iter()
                .collect();
        upstream.send(last).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let task = SinkTask::new(
            NodeId(2),
            NodeId(1),
            false,
            Box::new(Collect(Arc::clone(&seen))),
            messenger(&registry, &signal, 2, Some(1), vec![0]),
        );
        let report = task.run();
        assert_eq!(report.exit, ExitReason::StopReceived);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_bare_stop_from_physical_parent_is_not_a_failure() {
        let registry = registry(&[0, 1, 2]);
        let signal = TerminationSignal::new();
        let upstream = registry.get(NodeId(1)).unwrap().sender();
        upstream.send(Envelope::single(NodeId(1), Message::Stop)).unwrap();

        let task = TransformTask::new(
            NodeId(2),
            NodeId(1),
            Box::new(Negate),
            messenger(&registry, &signal, 2, Some(1), vec![0]),
        );
        assert_eq!(task.run().exit, ExitReason::StopReceived);
    }

    #[test]
    fn test_transform_flag_exit_stops_bypassing_reader() {
        let registry = registry(&[0, 1, 2]);
        let signal = TerminationSignal::new();
        signal.set();
        let transform = TransformTask::new(
            NodeId(1),
            NodeId(0),
            Box::new(Negate),
            messenger(&registry, &signal, 1, Some(0), vec![0]),
        );
        assert_eq!(transform.run().exit, ExitReason::TerminationRequested);

        // The reader skips node 1 and has never seen node 0.
        let reader = SinkTask::new(
            NodeId(2),
            NodeId(1),
            false,
            Box::new(Collect(Arc::new(Mutex::new(Vec::new())))),
            messenger(&registry, &TerminationSignal::new(), 2, Some(1), vec![0]),
        );
        assert_eq!(reader.run().exit, ExitReason::StopReceived);
    }

    #[test]
    fn test_sink_with_children_stops_them_on_flag_exit() {
        let registry = registry(&[0, 1]);
        let signal = TerminationSignal::new();
        signal.set();

        let task = SinkTask::new(
            NodeId(1),
            NodeId(0),
            true,
            Box::new(Collect(Arc::new(Mutex::new(Vec::new())))),
            messenger(&registry, &signal, 1, Some(0), vec![0]),
        );
        assert_eq!(task.run().exit, ExitReason::TerminationRequested);

        let rx = registry.get(NodeId(1)).unwrap().receiver();
        assert_eq!(rx.recv().unwrap(), Envelope::single(NodeId(1), Message::Stop));
    }

    #[test]
    fn test_sink_treats_closed_upstream_as_end() {
        let mut registry = registry(&[1]);
        registry.create(NodeId(0)).unwrap();
        let signal = TerminationSignal::new();
        let sink_messenger = messenger(&registry, &signal, 1, Some(0), vec![0]);
        // Keep only the sink's receiver alive for channel 0.
        drop(registry);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let task = SinkTask::new(
            NodeId(1),
            NodeId(0),
            false,
            Box::new(Collect(Arc::clone(&seen))),
            sink_messenger,
        );
        assert_eq!(task.run().exit, ExitReason::UpstreamClosed);
    }
}
