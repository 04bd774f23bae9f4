//! Accumulating message envelope.
//!
//! An `Envelope` maps node identity to the last value that node stamped.
//! It travels along one physical channel path, and every node on the path
//! adds its own entry before forwarding. A node with several logical parents
//! reads all of them from the single envelope it receives, indexing by
//! parent id rather than by position.
//!
//! Envelopes are plain owned values: a send moves an independent copy into
//! the channel, so no state is shared between execution units.

use crate::pipeline::id::NodeId;
use std::collections::BTreeMap;

/// Node id → last value produced by that node.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<M> {
    entries: BTreeMap<NodeId, M>,
}

impl<M> Envelope<M> {
    /// Create an empty envelope.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Create an envelope holding one entry. Used by sources.
    pub fn single(id: NodeId, value: M) -> Self {
        let mut envelope = Self::new();
        envelope.stamp(id, value);
        envelope
    }

    /// Insert or overwrite the entry for `id`.
    #[inline]
    pub fn stamp(&mut self, id: NodeId, value: M) {
        self.entries.insert(id, value);
    }

    #[inline]
    pub fn get(&self, id: NodeId) -> Option<&M> {
        self.entries.get(&id)
    }

    #[inline]
    pub fn contains(&self, id: NodeId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Ids present in the envelope, in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.entries.keys().copied()
    }

    pub fn values(&self) -> impl Iterator<Item = &M> {
        self.entries.values()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<M: Clone> Envelope<M> {
    /// Copy-on-stamp: a new envelope with `id` set to `value`, leaving `self`
    /// untouched.
    pub fn stamped(&self, id: NodeId, value: M) -> Self {
        let mut next = self.clone();
        next.stamp(id, value);
        next
    }

    /// Values for `ids`, in the order given.
    ///
    /// Returns the first id with no entry as the error.
    pub fn select(&self, ids: &[NodeId]) -> Result<Vec<M>, NodeId> {
        ids.iter()
            .map(|id| self.entries.get(id).cloned().ok_or(*id))
            .collect()
    }
}

impl<M> Default for Envelope<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> FromIterator<(NodeId, M)> for Envelope<M> {
    fn from_iter<I: IntoIterator<Item = (NodeId, M)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_single_entry() {
        let env = Envelope::single(NodeId(0), 5);
        assert_eq!(env.len(), 1);
        assert_eq!(env.get(NodeId(0)), Some(&5));
        assert!(!env.contains(NodeId(1)));
    }

    #[test]
    fn test_stamp_overwrites() {
        let mut env = Envelope::single(NodeId(0), 1);
        env.stamp(NodeId(0), 2);
        assert_eq!(env.len(), 1);
        assert_eq!(env.get(NodeId(0)), Some(&2));
    }

    #[test]
    fn test_stamped_leaves_original() {
        let env = Envelope::single(NodeId(0), 1);
        let next = env.stamped(NodeId(1), 2);
        assert_eq!(env.len(), 1);
        assert_eq!(next.len(), 2);
        assert_eq!(next.get(NodeId(0)), Some(&1));
    }

    #[test]
    fn test_select_in_requested_order() {
        let env: Envelope<&str> = [(NodeId(0), "a"), (NodeId(1), "b"), (NodeId(2), "c")]
            .into_iter()
            .collect();
        assert_eq!(env.select(&[NodeId(2), NodeId(0)]), Ok(vec!["c", "a"]));
        assert_eq!(env.select(&[]), Ok(vec![]));
    }

    #[test]
    fn test_select_reports_missing() {
        let env = Envelope::single(NodeId(0), 1);
        assert_eq!(env.select(&[NodeId(0), NodeId(4), NodeId(5)]), Err(NodeId(4)));
    }

    proptest! {
        #[test]
        fn test_accumulation_preserves_earlier_entries(
            values in prop::collection::vec(any::<i64>(), 1..20)
        ) {
            // Each node on a path stamps once; every earlier stamp survives
            // unchanged in the final envelope.
            let mut env = Envelope::single(NodeId(0), values[0]);
            for (i, v) in values.iter().enumerate().skip(1) {
                env = env.stamped(NodeId(i as u32), *v);
            }
            prop_assert_eq!(env.len(), values.len());
            for (i, v) in values.iter().enumerate() {
                prop_assert_eq!(env.get(NodeId(i as u32)), Some(v));
            }
        }
    }
}
