//! Body to owner registry.
//!
//! The [`BodyRegistry`] maps physics [`BodyId`]s to the entities that own
//! them, and records parent links for compound bodies. Bodies live in a flat
//! map keyed by id; resolving a child is an explicit walk up the parent links
//! to the compound root, whose owner is the owner of every part.
//!
//! Unknown bodies are a normal case (terrain, props with no logic): they
//! resolve to no owner and stay eligible for wildcard matches.

use bevy_ecs::prelude::Entity;
use log::{trace, warn};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::components::body::BodyId;
use crate::events::collision::ContactSide;

#[derive(Debug, Clone, PartialEq, Eq)]
struct BodyRecord {
    owner: Option<Entity>,
    parent: Option<BodyId>,
    children: SmallVec<[BodyId; 4]>,
}

/// What [`BodyRegistry::register`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The body was not known before.
    New,
    /// Same owner and parent as before; nothing changed.
    Unchanged,
    /// Owner or parent differed; the new values replaced the old ones.
    Replaced,
}

/// Flat registry of bodies, their owners, and compound parent links.
#[derive(Debug, Clone)]
pub struct BodyRegistry {
    bodies: FxHashMap<BodyId, BodyRecord>,
    /// Parts registered before their parent, keyed by the missing parent.
    orphans: FxHashMap<BodyId, SmallVec<[BodyId; 4]>>,
    warn_on_reregister: bool,
}

impl Default for BodyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BodyRegistry {
    pub fn new() -> Self {
        Self {
            bodies: FxHashMap::default(),
            orphans: FxHashMap::default(),
            warn_on_reregister: true,
        }
    }

    pub fn warns_on_reregister(&self) -> bool {
        self.warn_on_reregister
    }

    /// Toggle the warning logged when a body is registered again with a
    /// different owner or parent.
    pub fn set_warn_on_reregister(&mut self, warn: bool) {
        self.warn_on_reregister = warn;
    }

    /// Record `body` as owned by `owner`, optionally as a part of `parent`.
    ///
    /// Registering again with the same arguments is a no-op. Registering
    /// again with different ones replaces the old entry (last write wins) and
    /// logs a warning, since it usually means two pieces of application code
    /// disagree about who owns the body.
    ///
    /// A parent link that would close a cycle is dropped and the body becomes
    /// a root.
    pub fn register(
        &mut self,
        body: BodyId,
        owner: Option<Entity>,
        parent: Option<BodyId>,
    ) -> Registration {
        let parent = match parent {
            Some(p) if self.would_cycle(body, p) => {
                warn!(
                    target: "contacts",
                    "Parent {} of {} would form a cycle; registering as root",
                    p, body
                );
                None
            }
            other => other,
        };

        let outcome = match self.bodies.get_mut(&body) {
            Some(record) if record.owner == owner && record.parent == parent => {
                return Registration::Unchanged;
            }
            Some(record) => {
                if self.warn_on_reregister {
                    warn!(
                        target: "contacts",
                        "{} re-registered: owner {:?} -> {:?}, parent {:?} -> {:?}",
                        body, record.owner, owner, record.parent, parent
                    );
                }
                let old_parent = record.parent;
                record.owner = owner;
                record.parent = parent;
                if old_parent != parent {
                    if let Some(old) = old_parent {
                        self.detach_child(old, body);
                    }
                    if let Some(new) = parent {
                        self.attach_child(new, body);
                    }
                }
                Registration::Replaced
            }
            None => {
                let children = self.orphans.remove(&body).unwrap_or_default();
                self.bodies.insert(
                    body,
                    BodyRecord {
                        owner,
                        parent,
                        children,
                    },
                );
                if let Some(p) = parent {
                    self.attach_child(p, body);
                }
                Registration::New
            }
        };

        trace!(target: "contacts", "Registered {} owner={:?} parent={:?}", body, owner, parent);
        outcome
    }

    /// Remove `body` and every body below it in the compound tree.
    ///
    /// Returns the removed ids, `body` first and then its descendants. An
    /// unknown body yields an empty list.
    pub fn unregister(&mut self, body: BodyId) -> Vec<BodyId> {
        let Some(record) = self.bodies.remove(&body) else {
            return Vec::new();
        };
        if let Some(p) = record.parent {
            self.detach_child(p, body);
        }

        let mut removed = vec![body];
        let mut pending: Vec<BodyId> = record.children.into_vec();
        while let Some(child) = pending.pop() {
            if let Some(child_record) = self.bodies.remove(&child) {
                removed.push(child);
                pending.extend(child_record.children);
            }
        }
        trace!(target: "contacts", "Unregistered {:?}", removed);
        removed
    }

    /// `body` followed by every body below it in the compound tree. Empty
    /// for an unknown body.
    pub fn subtree(&self, body: BodyId) -> Vec<BodyId> {
        if !self.bodies.contains_key(&body) {
            return Vec::new();
        }
        let mut out = vec![body];
        let mut next = 0;
        while next < out.len() {
            out.extend_from_slice(self.children_of(out[next]));
            next += 1;
        }
        out
    }

    /// Owner of `body`, resolved through its compound root.
    pub fn resolve(&self, body: BodyId) -> Option<Entity> {
        let root = self.root_of(body);
        self.bodies.get(&root).and_then(|r| r.owner)
    }

    /// Compound root of `body`. A body with no registered parent is its own
    /// root, and so is an unknown body.
    pub fn root_of(&self, body: BodyId) -> BodyId {
        let mut current = body;
        while let Some(parent) = self.bodies.get(&current).and_then(|r| r.parent) {
            if !self.bodies.contains_key(&parent) {
                break;
            }
            current = parent;
        }
        current
    }

    /// Resolve `body` into the side of a contact.
    #[inline]
    pub fn side(&self, body: BodyId) -> ContactSide {
        if self.bodies.is_empty() {
            return ContactSide::bare(body);
        }
        let root = self.root_of(body);
        ContactSide {
            body,
            root,
            owner: self.bodies.get(&root).and_then(|r| r.owner),
        }
    }

    pub fn parent_of(&self, body: BodyId) -> Option<BodyId> {
        self.bodies.get(&body).and_then(|r| r.parent)
    }

    /// Direct children of `body`, in registration order.
    pub fn children_of(&self, body: BodyId) -> &[BodyId] {
        self.bodies
            .get(&body)
            .map(|r| r.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains(&self, body: BodyId) -> bool {
        self.bodies.contains_key(&body)
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn clear(&mut self) {
        self.bodies.clear();
        self.orphans.clear();
    }

    fn would_cycle(&self, body: BodyId, parent: BodyId) -> bool {
        let mut current = Some(parent);
        while let Some(id) = current {
            if id == body {
                return true;
            }
            current = self.bodies.get(&id).and_then(|r| r.parent);
        }
        false
    }

    fn attach_child(&mut self, parent: BodyId, child: BodyId) {
        let children = match self.bodies.get_mut(&parent) {
            Some(record) => &mut record.children,
            None => self.orphans.entry(parent).or_default(),
        };
        if !children.contains(&child) {
            children.push(child);
        }
    }

    fn detach_child(&mut self, parent: BodyId, child: BodyId) {
        if let Some(record) = self.bodies.get_mut(&parent) {
            record.children.retain(|c| *c != child);
        } else if let Some(waiting) = self.orphans.get_mut(&parent) {
            waiting.retain(|c| *c != child);
            if waiting.is_empty() {
                self.orphans.remove(&parent);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy_ecs::world::World;

    fn entities(n: usize) -> Vec<Entity> {
        let mut world = World::new();
        (0..n).map(|_| world.spawn_empty().id()).collect()
    }

    #[test]
    fn test_register_and_resolve() {
        let e = entities(1);
        let mut registry = BodyRegistry::new();
        assert_eq!(registry.register(BodyId(1), Some(e[0]), None), Registration::New);
        assert_eq!(registry.resolve(BodyId(1)), Some(e[0]));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_body_resolves_to_none() {
        let registry = BodyRegistry::new();
        assert_eq!(registry.resolve(BodyId(42)), None);
        assert_eq!(registry.root_of(BodyId(42)), BodyId(42));
        assert_eq!(registry.side(BodyId(42)), ContactSide::bare(BodyId(42)));
    }

    #[test]
    fn test_register_is_idempotent() {
        let e = entities(1);
        let mut registry = BodyRegistry::new();
        registry.register(BodyId(1), Some(e[0]), None);
        assert_eq!(
            registry.register(BodyId(1), Some(e[0]), None),
            Registration::Unchanged
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reregister_last_write_wins() {
        let e = entities(2);
        let mut registry = BodyRegistry::new();
        registry.register(BodyId(1), Some(e[0]), None);
        assert_eq!(
            registry.register(BodyId(1), Some(e[1]), None),
            Registration::Replaced
        );
        assert_eq!(registry.resolve(BodyId(1)), Some(e[1]));
    }

    #[test]
    fn test_children_resolve_to_root_owner() {
        let e = entities(2);
        let mut registry = BodyRegistry::new();
        registry.register(BodyId(1), Some(e[0]), None);
        registry.register(BodyId(2), None, Some(BodyId(1)));
        // a child's own owner does not override the root's
        registry.register(BodyId(3), Some(e[1]), Some(BodyId(2)));

        assert_eq!(registry.resolve(BodyId(2)), Some(e[0]));
        assert_eq!(registry.resolve(BodyId(3)), Some(e[0]));
        assert_eq!(registry.root_of(BodyId(3)), BodyId(1));

        let side = registry.side(BodyId(3));
        assert_eq!(side.body, BodyId(3));
        assert_eq!(side.root, BodyId(1));
        assert_eq!(side.owner, Some(e[0]));
    }

    #[test]
    fn test_unregister_cascades_to_children() {
        let e = entities(1);
        let mut registry = BodyRegistry::new();
        registry.register(BodyId(1), Some(e[0]), None);
        registry.register(BodyId(2), None, Some(BodyId(1)));
        registry.register(BodyId(3), None, Some(BodyId(2)));
        registry.register(BodyId(4), None, None);

        let mut removed = registry.unregister(BodyId(1));
        removed.sort();
        assert_eq!(removed, vec![BodyId(1), BodyId(2), BodyId(3)]);
        assert!(!registry.contains(BodyId(2)));
        assert!(registry.contains(BodyId(4)));
    }

    #[test]
    fn test_unregister_child_detaches_from_parent() {
        let e = entities(1);
        let mut registry = BodyRegistry::new();
        registry.register(BodyId(1), Some(e[0]), None);
        registry.register(BodyId(2), None, Some(BodyId(1)));
        registry.register(BodyId(3), None, Some(BodyId(1)));

        assert_eq!(registry.unregister(BodyId(2)), vec![BodyId(2)]);
        assert_eq!(registry.children_of(BodyId(1)), &[BodyId(3)]);
        assert!(registry.contains(BodyId(1)));
    }

    #[test]
    fn test_unregister_unknown_is_empty() {
        let mut registry = BodyRegistry::new();
        assert!(registry.unregister(BodyId(5)).is_empty());
    }

    #[test]
    fn test_reparent_moves_child() {
        let e = entities(2);
        let mut registry = BodyRegistry::new();
        registry.register(BodyId(1), Some(e[0]), None);
        registry.register(BodyId(2), Some(e[1]), None);
        registry.register(BodyId(3), None, Some(BodyId(1)));
        registry.register(BodyId(3), None, Some(BodyId(2)));

        assert!(registry.children_of(BodyId(1)).is_empty());
        assert_eq!(registry.children_of(BodyId(2)), &[BodyId(3)]);
        assert_eq!(registry.resolve(BodyId(3)), Some(e[1]));
    }

    #[test]
    fn test_cycle_is_rejected() {
        let mut registry = BodyRegistry::new();
        registry.register(BodyId(1), None, None);
        registry.register(BodyId(2), None, Some(BodyId(1)));
        registry.register(BodyId(1), None, Some(BodyId(2)));

        assert_eq!(registry.parent_of(BodyId(1)), None);
        assert_eq!(registry.root_of(BodyId(2)), BodyId(1));
    }

    #[test]
    fn test_self_parent_is_rejected() {
        let mut registry = BodyRegistry::new();
        registry.register(BodyId(1), None, Some(BodyId(1)));
        assert_eq!(registry.parent_of(BodyId(1)), None);
    }

    #[test]
    fn test_child_registered_before_parent() {
        let e = entities(1);
        let mut registry = BodyRegistry::new();
        registry.register(BodyId(2), None, Some(BodyId(1)));
        registry.register(BodyId(1), Some(e[0]), None);

        assert_eq!(registry.resolve(BodyId(2)), Some(e[0]));
        assert_eq!(registry.children_of(BodyId(1)), &[BodyId(2)]);
        assert_eq!(registry.unregister(BodyId(1)), vec![BodyId(1), BodyId(2)]);
    }

    #[test]
    fn test_orphan_moved_away_before_parent_arrives() {
        let mut registry = BodyRegistry::new();
        registry.register(BodyId(3), None, Some(BodyId(1)));
        registry.register(BodyId(4), None, Some(BodyId(1)));
        registry.register(BodyId(3), None, Some(BodyId(2)));
        registry.unregister(BodyId(4));
        registry.register(BodyId(1), None, None);
        registry.register(BodyId(2), None, None);

        assert!(registry.children_of(BodyId(1)).is_empty());
        assert_eq!(registry.children_of(BodyId(2)), &[BodyId(3)]);
        assert_eq!(registry.root_of(BodyId(3)), BodyId(2));
    }

    #[test]
    fn test_orphans_keep_registration_order() {
        let mut registry = BodyRegistry::new();
        registry.register(BodyId(9), None, Some(BodyId(1)));
        registry.register(BodyId(5), None, Some(BodyId(1)));
        registry.register(BodyId(1), None, None);
        assert_eq!(registry.children_of(BodyId(1)), &[BodyId(9), BodyId(5)]);

        registry.clear();
        registry.register(BodyId(1), None, None);
        assert!(registry.children_of(BodyId(1)).is_empty());
    }

    #[test]
    fn test_bulk_roots_register_without_children() {
        let mut registry = BodyRegistry::new();
        for id in 0..10_000 {
            registry.register(BodyId(id), None, None);
        }
        assert_eq!(registry.len(), 10_000);
        assert!(registry.children_of(BodyId(0)).is_empty());
    }

    #[test]
    fn test_subtree_lists_body_then_descendants() {
        let mut registry = BodyRegistry::new();
        registry.register(BodyId(1), None, None);
        registry.register(BodyId(2), None, Some(BodyId(1)));
        registry.register(BodyId(3), None, Some(BodyId(2)));
        registry.register(BodyId(4), None, Some(BodyId(1)));

        assert_eq!(
            registry.subtree(BodyId(1)),
            vec![BodyId(1), BodyId(2), BodyId(4), BodyId(3)]
        );
        assert_eq!(registry.subtree(BodyId(3)), vec![BodyId(3)]);
        assert!(registry.subtree(BodyId(7)).is_empty());
    }

    #[test]
    fn test_default_matches_new() {
        assert!(BodyRegistry::default().warns_on_reregister());
        let mut registry = BodyRegistry::default();
        registry.set_warn_on_reregister(false);
        assert!(!registry.warns_on_reregister());
    }

    #[test]
    fn test_missing_parent_stops_walk() {
        let e = entities(1);
        let mut registry = BodyRegistry::new();
        registry.register(BodyId(2), Some(e[0]), Some(BodyId(1)));
        assert_eq!(registry.root_of(BodyId(2)), BodyId(2));
        assert_eq!(registry.resolve(BodyId(2)), Some(e[0]));
    }
}
