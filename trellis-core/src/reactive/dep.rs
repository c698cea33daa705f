//! Dependency Nodes
//!
//! A `Dep` is one trackable slot in the graph: "this field of this record".
//! It only knows which effects are subscribed to it. The reverse edge (which
//! Deps an effect reads) lives on the effect slot, and the runtime keeps the
//! two views in sync.

use indexmap::IndexSet;

use super::effect::EffectId;

/// Identifier of a Dep inside a runtime's dep arena.
///
/// Assigned monotonically; used for indexing and debugging, never compared
/// across runtimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DepId(u64);

impl DepId {
    pub(crate) fn from_index(index: usize) -> Self {
        Self(index as u64)
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }

    pub(crate) fn index(&self) -> usize {
        self.0 as usize
    }
}

/// A dependency node.
#[derive(Debug, Default)]
pub(crate) struct Dep {
    /// Subscribers in insertion order. Doubles as the membership set, so an
    /// effect can appear at most once.
    subscribers: IndexSet<EffectId>,
}

impl Dep {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber. Returns `false` if it was already subscribed.
    pub(crate) fn add_subscriber(&mut self, effect: EffectId) -> bool {
        self.subscribers.insert(effect)
    }

    /// Remove a subscriber, keeping the order of the others. Idempotent.
    pub(crate) fn remove_subscriber(&mut self, effect: EffectId) -> bool {
        self.subscribers.shift_remove(&effect)
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, effect: EffectId) -> bool {
        self.subscribers.contains(&effect)
    }

    /// Copy of the subscriber sequence, taken before notifying so that
    /// re-subscription during a run cannot disturb the iteration.
    pub(crate) fn snapshot(&self) -> Vec<EffectId> {
        self.subscribers.iter().copied().collect()
    }

    pub(crate) fn subscribers(&self) -> impl Iterator<Item = EffectId> + '_ {
        self.subscribers.iter().copied()
    }

    pub(crate) fn clear(&mut self) {
        self.subscribers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn effect(index: usize) -> EffectId {
        EffectId::from_index(index)
    }

    #[test]
    fn subscriber_added_once() {
        let mut dep = Dep::new();
        assert!(dep.add_subscriber(effect(1)));
        assert!(!dep.add_subscriber(effect(1)));
        assert_eq!(dep.snapshot(), vec![effect(1)]);
    }

    #[test]
    fn remove_subscriber_is_idempotent() {
        let mut dep = Dep::new();
        dep.add_subscriber(effect(1));
        dep.add_subscriber(effect(2));

        assert!(dep.remove_subscriber(effect(1)));
        assert!(!dep.remove_subscriber(effect(1)));
        assert!(!dep.contains(effect(1)));
        assert!(dep.contains(effect(2)));
    }

    #[test]
    fn removal_keeps_insertion_order() {
        let mut dep = Dep::new();
        for i in 0..4 {
            dep.add_subscriber(effect(i));
        }

        dep.remove_subscriber(effect(1));
        dep.add_subscriber(effect(1));

        assert_eq!(
            dep.snapshot(),
            vec![effect(0), effect(2), effect(3), effect(1)]
        );
    }

    #[test]
    fn empty_dep_stays_usable() {
        let mut dep = Dep::new();
        dep.add_subscriber(effect(7));
        dep.clear();
        assert!(dep.snapshot().is_empty());
        assert!(dep.add_subscriber(effect(7)));
    }
}
