//! Subscription table.
//!
//! Stores every registered [`Subscription`] under a [`SubscriptionId`] along
//! with its liveness flag. Removal only flips the flag; dead entries are
//! purged by [`SubscriptionTable::purge_dead`], which the router calls at the
//! start of each tick, outside of any iteration.
//!
//! Ids are handed out in increasing order and never reused, so a stale handle
//! can never cancel somebody else's subscription.

use std::fmt;

use crate::components::collision::{ContactCallback, Subscription};
use crate::components::interest::Interest;

/// Handle returned on registration, used to cancel later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub(crate) u64);

impl SubscriptionId {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// One row of the table.
#[derive(Debug)]
pub struct SubscriptionEntry {
    pub id: SubscriptionId,
    pub subscription: Subscription,
    pub live: bool,
}

/// Registered subscriptions, kept sorted by id.
#[derive(Debug, Default)]
pub struct SubscriptionTable {
    entries: Vec<SubscriptionEntry>,
    next_id: u64,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscription from its parts.
    pub fn add(
        &mut self,
        interest_a: Interest,
        interest_b: Interest,
        on_start: Option<ContactCallback>,
        on_active: Option<ContactCallback>,
        on_end: Option<ContactCallback>,
    ) -> SubscriptionId {
        self.insert(Subscription::from_parts(
            interest_a, interest_b, on_start, on_active, on_end,
        ))
    }

    /// Register an already built subscription.
    pub fn insert(&mut self, subscription: Subscription) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.entries.push(SubscriptionEntry {
            id,
            subscription,
            live: true,
        });
        id
    }

    /// Mark a subscription dead.
    ///
    /// Returns `true` if it was live. Removing an unknown or already dead
    /// subscription does nothing.
    pub fn remove(&mut self, id: SubscriptionId) -> bool {
        match self.get_mut(id) {
            Some(entry) if entry.live => {
                entry.live = false;
                true
            }
            _ => false,
        }
    }

    pub fn is_live(&self, id: SubscriptionId) -> bool {
        self.get(id).is_some_and(|e| e.live)
    }

    pub fn get(&self, id: SubscriptionId) -> Option<&SubscriptionEntry> {
        self.entries
            .binary_search_by_key(&id, |e| e.id)
            .ok()
            .map(|i| &self.entries[i])
    }

    pub fn get_mut(&mut self, id: SubscriptionId) -> Option<&mut SubscriptionEntry> {
        match self.entries.binary_search_by_key(&id, |e| e.id) {
            Ok(i) => Some(&mut self.entries[i]),
            Err(_) => None,
        }
    }

    /// Live subscriptions in registration order.
    pub fn iter_live(&self) -> impl Iterator<Item = &SubscriptionEntry> {
        self.entries.iter().filter(|e| e.live)
    }

    /// Call `f` for each live subscription in registration order.
    pub fn for_each_live(&self, mut f: impl FnMut(&SubscriptionEntry)) {
        for entry in self.iter_live() {
            f(entry);
        }
    }

    /// Copy the ids of live subscriptions into `out`, replacing its contents.
    ///
    /// The router snapshots the live set this way at tick start so that
    /// registrations and removals made by callbacks do not change which
    /// subscriptions the tick walks over.
    pub fn snapshot_live(&self, out: &mut Vec<SubscriptionId>) {
        out.clear();
        out.extend(self.iter_live().map(|e| e.id));
    }

    /// Ids of live subscriptions for which `predicate` holds.
    pub fn live_ids_where(
        &self,
        mut predicate: impl FnMut(&Subscription) -> bool,
    ) -> Vec<SubscriptionId> {
        self.iter_live()
            .filter(|e| predicate(&e.subscription))
            .map(|e| e.id)
            .collect()
    }

    /// Drop dead entries.
    pub fn purge_dead(&mut self) {
        self.entries.retain(|e| e.live);
    }

    pub fn live_count(&self) -> usize {
        self.iter_live().count()
    }

    /// Drop every subscription. Ids keep increasing afterwards.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy_ecs::world::World;

    fn table_with(n: usize) -> (SubscriptionTable, Vec<SubscriptionId>) {
        let mut world = World::new();
        let mut table = SubscriptionTable::new();
        let ids = (0..n)
            .map(|_| {
                let e = world.spawn_empty().id();
                table.add(Interest::from(e), Interest::any(), None, None, None)
            })
            .collect();
        (table, ids)
    }

    #[test]
    fn test_ids_are_unique_and_increasing() {
        let (_, ids) = table_with(3);
        assert!(ids[0] < ids[1] && ids[1] < ids[2]);
    }

    #[test]
    fn test_remove_marks_dead() {
        let (mut table, ids) = table_with(2);
        assert!(table.remove(ids[0]));
        assert!(!table.is_live(ids[0]));
        assert!(table.is_live(ids[1]));
        assert_eq!(table.live_count(), 1);
    }

    #[test]
    fn test_double_remove_is_noop() {
        let (mut table, ids) = table_with(1);
        assert!(table.remove(ids[0]));
        assert!(!table.remove(ids[0]));
        table.purge_dead();
        assert!(!table.remove(ids[0]));
    }

    #[test]
    fn test_snapshot_skips_dead() {
        let (mut table, ids) = table_with(3);
        table.remove(ids[1]);
        let mut snapshot = Vec::new();
        table.snapshot_live(&mut snapshot);
        assert_eq!(snapshot, vec![ids[0], ids[2]]);

        let mut seen = Vec::new();
        table.for_each_live(|e| seen.push(e.id));
        assert_eq!(seen, snapshot);
    }

    #[test]
    fn test_purge_keeps_lookup_working() {
        let (mut table, ids) = table_with(4);
        table.remove(ids[0]);
        table.remove(ids[2]);
        table.purge_dead();
        assert!(table.get(ids[0]).is_none());
        assert!(table.get(ids[1]).is_some());
        assert!(table.get(ids[3]).is_some());
    }

    #[test]
    fn test_ids_not_reused_after_clear() {
        let (mut table, ids) = table_with(2);
        table.clear();
        let fresh = table.add(Interest::any(), Interest::any(), None, None, None);
        assert!(fresh > ids[1]);
        assert!(!table.is_live(ids[0]));
    }
}
