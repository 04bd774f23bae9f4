//! Lossy (realtime) messenger.
//!
//! Ordinary sends never wait: when the outbound channel is full the new
//! envelope is discarded and the channel is left as it was. The most recent
//! values that did fit win; gaps are preferred over staleness.
//!
//! Termination sends always block. A shutdown notice must reach the consumer
//! even under load.

use super::{Delivery, Endpoint, Messenger, MessengerStats, SkipReason};
use crate::pipeline::error::PipelineResult;
use crate::pipeline::id::NodeId;

pub struct LossyMessenger<M> {
    endpoint: Endpoint<M>,
}

impl<M: Clone> LossyMessenger<M> {
    pub fn new(endpoint: Endpoint<M>) -> Self {
        Self { endpoint }
    }
}

impl<M: Clone + Send> Messenger<M> for LossyMessenger<M> {
    fn node_id(&self) -> NodeId {
        self.endpoint.node_id()
    }

    fn publish(&mut self, value: M) -> Delivery {
        let envelope = self.endpoint.outgoing(value);
        self.endpoint.send_nonblocking(envelope)
    }

    fn publish_termination(&mut self, value: M) -> Delivery {
        let envelope = self.endpoint.outgoing(value);
        self.endpoint.send_blocking(envelope)
    }

    fn passthrough(&mut self) -> Delivery {
        match self.endpoint.replay() {
            Some(envelope) => self.endpoint.send_nonblocking(envelope),
            None => self.endpoint.skipped(SkipReason::NothingReceived),
        }
    }

    fn passthrough_termination(&mut self) -> Delivery {
        match self.endpoint.replay() {
            Some(envelope) => self.endpoint.send_blocking(envelope),
            None => self.endpoint.skipped(SkipReason::NothingReceived),
        }
    }

    fn receive(&mut self) -> PipelineResult<Vec<M>> {
        self.endpoint.receive()
    }

    fn receive_until(&mut self, ends_stream: fn(&M) -> bool) -> PipelineResult<Option<Vec<M>>> {
        self.endpoint.receive_until(ends_stream)
    }

    fn is_termination_requested(&self) -> bool {
        self.endpoint.is_termination_requested()
    }

    fn stats(&self) -> MessengerStats {
        self.endpoint.stats
    }
}
