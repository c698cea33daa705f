//! Target Map
//!
//! The registry that maps a record and one of its fields to the `Dep` that
//! represents it. Records are identified by their storage address, not by
//! their contents, so two records with equal fields never share a Dep.

use std::collections::HashMap;

use serde::Serialize;

use super::dep::DepId;

/// Identity of a tracked record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TargetId(usize);

impl TargetId {
    /// Identity of the value behind `target`, derived from its address.
    ///
    /// The value must stay at that address for as long as it is tracked; for
    /// heap-allocated shared records (`Arc`, `Box`) that holds for the life of
    /// the allocation.
    pub fn of<T: ?Sized>(target: &T) -> Self {
        Self(target as *const T as *const () as usize)
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> usize {
        self.0
    }
}

impl From<usize> for TargetId {
    fn from(raw: usize) -> Self {
        Self(raw)
    }
}

/// `target -> field -> dep`, populated lazily by `track`.
#[derive(Debug, Default)]
pub(crate) struct TargetMap {
    targets: HashMap<TargetId, HashMap<String, DepId>>,
}

impl TargetMap {
    pub(crate) fn get(&self, target: TargetId, field: &str) -> Option<DepId> {
        self.targets.get(&target)?.get(field).copied()
    }

    /// Look up the Dep for `(target, field)`, creating it with `create` if
    /// either the target or the field is new.
    pub(crate) fn get_or_insert_with(
        &mut self,
        target: TargetId,
        field: &str,
        create: impl FnOnce() -> DepId,
    ) -> DepId {
        let fields = self.targets.entry(target).or_default();
        if let Some(dep) = fields.get(field) {
            return *dep;
        }
        let dep = create();
        fields.insert(field.to_owned(), dep);
        dep
    }

    /// Drop every entry for `target`, returning the Deps it owned.
    pub(crate) fn remove(&mut self, target: TargetId) -> Vec<DepId> {
        self.targets
            .remove(&target)
            .map(|fields| fields.into_values().collect())
            .unwrap_or_default()
    }

    pub(crate) fn target_count(&self) -> usize {
        self.targets.len()
    }

    pub(crate) fn field_count(&self) -> usize {
        self.targets.values().map(HashMap::len).sum()
    }

    pub(crate) fn deps(&self) -> impl Iterator<Item = DepId> + '_ {
        self.targets.values().flat_map(|fields| fields.values().copied())
    }
}
