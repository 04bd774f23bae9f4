//! Lossless (batch) messenger.
//!
//! Every send blocks until the outbound channel has room, so a slow consumer
//! back-pressures its whole upstream path and no value is ever dropped.

use super::{Delivery, Endpoint, Messenger, MessengerStats, SkipReason};
use crate::pipeline::error::PipelineResult;
use crate::pipeline::id::NodeId;

pub struct LosslessMessenger<M> {
    endpoint: Endpoint<M>,
}

impl<M: Clone> LosslessMessenger<M> {
    pub fn new(endpoint: Endpoint<M>) -> Self {
        Self { endpoint }
    }
}

impl<M: Clone + Send> Messenger<M> for LosslessMessenger<M> {
    fn node_id(&self) -> NodeId {
        self.endpoint.node_id()
    }

    fn publish(&mut self, value: M) -> Delivery {
        let envelope = self.endpoint.outgoing(value);
        self.endpoint.send_blocking(envelope)
    }

    fn publish_termination(&mut self, value: M) -> Delivery {
        self.publish(value)
    }

    fn passthrough(&mut self) -> Delivery {
        match self.endpoint.replay() {
            Some(envelope) => self.endpoint.send_blocking(envelope),
            None => self.endpoint.skipped(SkipReason::NothingReceived),
        }
    }

    fn passthrough_termination(&mut self) -> Delivery {
        self.passthrough()
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
