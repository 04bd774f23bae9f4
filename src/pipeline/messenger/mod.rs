//! Per-task communication endpoints.
//!
//! A messenger is bound to exactly one outbound channel (its own node's) and
//! at most one inbound channel (its physical parent's). It stamps values into
//! the last received envelope, forwards envelopes, and extracts the values of
//! the node's logical parents from whatever arrives.
//!
//! Two delivery policies share the same payload construction and differ only
//! in how ordinary sends treat a full channel:
//!
//! | operation                  | lossless (batch) | lossy (realtime)       |
//! |----------------------------|------------------|------------------------|
//! | `publish`, `passthrough`   | block            | try, skip when full    |
//! | `*_termination`            | block            | block                  |
//!
//! Sends report a [`Delivery`] instead of failing: a skipped send is a normal,
//! named outcome of the lossy policy.

pub mod lossless;
pub mod lossy;

pub use lossless::LosslessMessenger;
pub use lossy::LossyMessenger;

use crate::pipeline::envelope::Envelope;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::id::NodeId;
use crate::pipeline::signal::TerminationObserver;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};

/// Send discipline for a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryPolicy {
    /// Every send blocks until the channel has room. Nothing is dropped.
    #[default]
    #[serde(alias = "lossless")]
    Batch,
    /// Ordinary sends never block; a full channel drops the new envelope.
    #[serde(alias = "lossy")]
    Realtime,
}

impl std::fmt::Display for DeliveryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryPolicy::Batch => write!(f, "batch"),
            DeliveryPolicy::Realtime => write!(f, "realtime"),
        }
    }
}

impl std::str::FromStr for DeliveryPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "batch" | "lossless" => Ok(DeliveryPolicy::Batch),
            "realtime" | "lossy" => Ok(DeliveryPolicy::Realtime),
            other => Err(format!("unknown delivery policy '{}'", other)),
        }
    }
}

/// Why a send did not enqueue anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Delivery skipped: channel full (lossy policy only).
    ChannelFull,
    /// Nobody reads this channel any more.
    Disconnected,
    /// Passthrough requested before any envelope was received.
    NothingReceived,
}

/// Outcome of a send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Skipped(SkipReason),
}

impl Delivery {
    #[inline]
    pub fn is_sent(self) -> bool {
        self == Delivery::Sent
    }
}

/// Per-messenger counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessengerStats {
    pub sent: u64,
    pub dropped: u64,
    pub disconnected: u64,
    pub received: u64,
}

/// The capability every worker task uses for channel I/O.
pub trait Messenger<M>: Send {
    /// Identity this messenger stamps values under.
    fn node_id(&self) -> NodeId;

    /// Stamp `value` under the own id into the last received envelope (or a
    /// fresh one) and send it.
    fn publish(&mut self, value: M) -> Delivery;

    /// Same payload as [`Messenger::publish`], always sent blocking.
    fn publish_termination(&mut self, value: M) -> Delivery;

    /// Resend the last received envelope unchanged.
    fn passthrough(&mut self) -> Delivery;

    /// Same as [`Messenger::passthrough`], always sent blocking.
    fn passthrough_termination(&mut self) -> Delivery;

    /// Block for the next envelope and return the values of the configured
    /// parents, in parent order.
    fn receive(&mut self) -> PipelineResult<Vec<M>>;

    /// Like [`Messenger::receive`], but returns `Ok(None)` when any entry of
    /// the envelope matches `ends_stream`, whichever node stamped it.
    fn receive_until(&mut self, ends_stream: fn(&M) -> bool) -> PipelineResult<Option<Vec<M>>>;

    /// Non-blocking read of the shared termination flag.
    fn is_termination_requested(&self) -> bool;

    fn stats(&self) -> MessengerStats;
}

/// Channel handles and state shared by both policies.
pub struct Endpoint<M> {
    node_id: NodeId,
    parents: Vec<NodeId>,
    outbound: Sender<Envelope<M>>,
    inbound: Option<Receiver<Envelope<M>>>,
    termination: TerminationObserver,
    last_received: Option<Envelope<M>>,
    stats: MessengerStats,
}

impl<M: Clone> Endpoint<M> {
    pub fn new(
        node_id: NodeId,
        parents: Vec<NodeId>,
        outbound: Sender<Envelope<M>>,
        inbound: Option<Receiver<Envelope<M>>>,
        termination: TerminationObserver,
    ) -> Self {
        Self {
            node_id,
            parents,
            outbound,
            inbound,
            termination,
            last_received: None,
            stats: MessengerStats::default(),
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn parents(&self) -> &[NodeId] {
        &self.parents
    }

    /// Build the envelope for a publish: the last received envelope plus
    /// the own stamp, or a fresh one.
    fn outgoing(&self, value: M) -> Envelope<M> {
        match &self.last_received {
            Some(envelope) => envelope.stamped(self.node_id, value),
            None => Envelope::single(self.node_id, value),
        }
    }

    fn replay(&self) -> Option<Envelope<M>> {
        self.last_received.clone()
    }

    fn send_blocking(&mut self, envelope: Envelope<M>) -> Delivery {
        match self.outbound.send(envelope) {
            Ok(()) => {
                self.stats.sent += 1;
                Delivery::Sent
            }
            Err(_) => self.skipped(SkipReason::Disconnected),
        }
    }

    fn send_nonblocking(&mut self, envelope: Envelope<M>) -> Delivery {
        match self.outbound.try_send(envelope) {
            Ok(()) => {
                self.stats.sent += 1;
                Delivery::Sent
            }
            Err(TrySendError::Full(_)) => self.skipped(SkipReason::ChannelFull),
            Err(TrySendError::Disconnected(_)) => self.skipped(SkipReason::Disconnected),
        }
    }

    fn skipped(&mut self, reason: SkipReason) -> Delivery {
        match reason {
            SkipReason::ChannelFull => self.stats.dropped += 1,
            SkipReason::Disconnected => self.stats.disconnected += 1,
            SkipReason::NothingReceived => {}
        }
        tracing::trace!("{}: delivery skipped ({:?})", self.node_id, reason);
        Delivery::Skipped(reason)
    }

    fn next_envelope(&mut self) -> PipelineResult<Envelope<M>> {
        let inbound = self
            .inbound
            .as_ref()
            .ok_or(PipelineError::NoInboundChannel(self.node_id))?;
        let envelope = inbound
            .recv()
            .map_err(|_| PipelineError::UpstreamClosed(self.node_id))?;
        self.stats.received += 1;
        Ok(envelope)
    }

    fn receive(&mut self) -> PipelineResult<Vec<M>> {
        let envelope = self.next_envelope()?;
        self.resolve(envelope)
    }

    fn receive_until(&mut self, ends_stream: fn(&M) -> bool) -> PipelineResult<Option<Vec<M>>> {
        let envelope = self.next_envelope()?;
        if envelope.values().any(ends_stream) {
            self.last_received = Some(envelope);
            return Ok(None);
        }
        self.resolve(envelope).map(Some)
    }

    fn resolve(&mut self, envelope: Envelope<M>) -> PipelineResult<Vec<M>> {
        let values = envelope.select(&self.parents);
        self.last_received = Some(envelope);
        values.map_err(|ancestor| PipelineError::MissingAncestor {
            node: self.node_id,
            ancestor,
        })
    }

    fn is_termination_requested(&self) -> bool {
        self.termination.is_set()
    }
}

/// Enum dispatch over the two delivery policies.
pub enum AnyMessenger<M> {
    Lossless(LosslessMessenger<M>),
    Lossy(LossyMessenger<M>),
}

impl<M: Clone> AnyMessenger<M> {
    /// Wrap `endpoint` in the messenger for `policy`.
    pub fn new(policy: DeliveryPolicy, endpoint: Endpoint<M>) -> Self {
        match policy {
            DeliveryPolicy::Batch => AnyMessenger::Lossless(LosslessMessenger::new(endpoint)),
            DeliveryPolicy::Realtime => AnyMessenger::Lossy(LossyMessenger::new(endpoint)),
        }
    }

    pub fn policy(&self) -> DeliveryPolicy {
        match self {
            AnyMessenger::Lossless(_) => DeliveryPolicy::Batch,
            AnyMessenger::Lossy(_) => DeliveryPolicy::Realtime,
        }
    }
}

impl<M: Clone + Send> Messenger<M> for AnyMessenger<M> {
    fn node_id(&self) -> NodeId {
        match self {
            AnyMessenger::Lossless(m) => m.node_id(),
            AnyMessenger::Lossy(m) => m.node_id(),
        }
    }

    fn publish(&mut self, value: M) -> Delivery {
        match self {
            AnyMessenger::Lossless(m) => m.publish(value),
            AnyMessenger::Lossy(m) => m.publish(value),
        }
    }

    fn publish_termination(&mut self, value: M) -> Delivery {
        match self {
            AnyMessenger::Lossless(m) => m.publish_termination(value),
            AnyMessenger::Lossy(m) => m.publish_termination(value),
        }
    }

    fn passthrough(&mut self) -> Delivery {
        match self {
            AnyMessenger::Lossless(m) => m.passthrough(),
            AnyMessenger::Lossy(m) => m.passthrough(),
        }
    }

    fn passthrough_termination(&mut self) -> Delivery {
        match self {
            AnyMessenger::Lossless(m) => m.passthrough_termination(),
            AnyMessenger::Lossy(m) => m.passthrough_termination(),
        }
    }

    fn receive(&mut self) -> PipelineResult<Vec<M>> {
        match self {
            AnyMessenger::Lossless(m) => m.receive(),
            AnyMessenger::Lossy(m) => m.receive(),
        }
    }

    fn receive_until(&mut self, ends_stream: fn(&M) -> bool) -> PipelineResult<Option<Vec<M>>> {
        match self {
            AnyMessenger::Lossless(m) => m.receive_until(ends_stream),
            AnyMessenger::Lossy(m) => m.receive_until(ends_stream),
        }
    }

    fn is_termination_requested(&self) -> bool {
        match self {
            AnyMessenger::Lossless(m) => m.is_termination_requested(),
            AnyMessenger::Lossy(m) => m.is_termination_requested(),
        }
    }

    fn stats(&self) -> MessengerStats {
        match self {
            AnyMessenger::Lossless(m) => m.stats(),
            AnyMessenger::Lossy(m) => m.stats(),
        }
    }
}
