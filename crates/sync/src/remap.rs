//! Placeholder-to-server id mapping built during a push.

use std::collections::HashMap;

use duka_core::{Collection, RecordId};

/// Reference fields between collections: (child, field, parent).
///
/// A child row's `field` may hold a parent placeholder id until the
/// parent's first push. Every pass that rewrites references iterates
/// this table, so adding a relation is a one-line change.
pub(crate) const REFERENCES: &[(Collection, &str, Collection)] = &[
    (Collection::Sales, "product_id", Collection::Products),
    (Collection::Notifications, "product_id", Collection::Products),
];

/// Ids assigned to placeholder records in the current push cycle.
///
/// Keyed per collection because placeholder ids embed the collection
/// name but nothing enforces global uniqueness across tables.
#[derive(Debug, Default)]
pub(crate) struct RemapTable {
    entries: HashMap<Collection, HashMap<RecordId, RecordId>>,
}

impl RemapTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, collection: Collection, placeholder: RecordId, assigned: RecordId) {
        self.entries
            .entry(collection)
            .or_default()
            .insert(placeholder, assigned);
    }

    /// Server id assigned to this placeholder, if any insert in the
    /// queue will create it.
    pub fn get(&self, collection: Collection, placeholder: &RecordId) -> Option<&RecordId> {
        self.entries.get(&collection)?.get(placeholder)
    }

    /// Reverse lookup: the placeholder behind an assigned id.
    pub fn placeholder_for(&self, collection: Collection, assigned: &RecordId) -> Option<&RecordId> {
        self.entries
            .get(&collection)?
            .iter()
            .find(|(_, new)| *new == assigned)
            .map(|(old, _)| old)
    }

    /// All (placeholder, assigned) pairs for one collection.
    pub fn for_collection(
        &self,
        collection: Collection,
    ) -> impl Iterator<Item = (&RecordId, &RecordId)> {
        self.entries
            .get(&collection)
            .into_iter()
            .flat_map(|map| map.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(|map| map.is_empty())
    }
}
