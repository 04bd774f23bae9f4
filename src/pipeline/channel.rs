//! Channel registry: one bounded FIFO of envelopes per node.
//!
//! Channels are created up front, before any task exists, so no worker can
//! observe a channel that is not there yet. Each channel has a single writer
//! (the task of the node it is keyed by) and is read by the task whose
//! physical parent is that node.

use crate::pipeline::envelope::Envelope;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::id::NodeId;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::collections::HashMap;

/// Slots per channel unless configured otherwise.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10;

/// A bounded envelope channel keyed by its writer's node id.
pub struct Channel<M> {
    id: NodeId,
    capacity: usize,
    tx: Sender<Envelope<M>>,
    rx: Receiver<Envelope<M>>,
}

impl<M> Channel<M> {
    fn new(id: NodeId, capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self {
            id,
            capacity,
            tx,
            rx,
        }
    }

    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of envelopes currently queued.
    #[inline]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.rx.is_full()
    }

    /// A handle for the writer side.
    pub fn sender(&self) -> Sender<Envelope<M>> {
        self.tx.clone()
    }

    /// A handle for the reader side.
    pub fn receiver(&self) -> Receiver<Envelope<M>> {
        self.rx.clone()
    }
}

impl<M> std::fmt::Debug for Channel<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

/// All channels of one run, keyed by node id.
pub struct ChannelRegistry<M> {
    capacity: usize,
    channels: HashMap<NodeId, Channel<M>>,
}

impl<M> ChannelRegistry<M> {
    /// Create an empty registry whose channels hold `capacity` envelopes.
    ///
    /// Zero is rejected: a rendezvous channel would turn every non-blocking
    /// send into a drop.
    pub fn new(capacity: usize) -> PipelineResult<Self> {
        if capacity == 0 {
            return Err(PipelineError::InvalidCapacity(capacity));
        }
        Ok(Self {
            capacity,
            channels: HashMap::new(),
        })
    }

    /// Create the channel owned by `id`.
    pub fn create(&mut self, id: NodeId) -> PipelineResult<&Channel<M>> {
        if self.channels.contains_key(&id) {
            return Err(PipelineError::DuplicateNode(id));
        }
        let capacity = self.capacity;
        tracing::trace!("Creating channel for {} (capacity {})", id, capacity);
        Ok(self
            .channels
            .entry(id)
            .or_insert_with(|| Channel::new(id, capacity)))
    }

    pub fn get(&self, id: NodeId) -> Option<&Channel<M>> {
        self.channels.get(&id)
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
