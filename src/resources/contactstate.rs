//! Per-subscription contact state.
//!
//! The physics engine reports touching pairs tick by tick; it does not know
//! about subscriptions. [`ContactTracker`] keeps, for every subscription, the
//! set of [`PairKey`]s currently in contact and turns each matched report
//! into one of four transitions:
//!
//! | before   | report       | after    | callback    |
//! |----------|--------------|----------|-------------|
//! | none     | touching     | touching | `on_start`  |
//! | touching | touching     | touching | `on_active` |
//! | touching | ended/stale  | none     | `on_end`    |
//! | none     | ended        | none     | nothing     |
//!
//! Non-matching pairs never reach the tracker at all, so the common "nothing
//! is happening" case costs no lookups and no allocation.
//!
//! Every entry carries an insertion sequence number. Anything the tracker
//! hands back in bulk (stale sweeps, destroyed bodies, listings) is sorted by
//! it, which keeps callback order reproducible across runs.

use rustc_hash::FxHashMap;

use crate::components::body::BodyId;
use crate::components::collision::MatchedPair;
use crate::events::collision::{ContactSide, PairKey};
use crate::resources::subscriptions::SubscriptionId;

/// A tracked contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactEntry {
    pub a: ContactSide,
    pub b: ContactSide,
    /// Tick the contact started in.
    pub since: u64,
    /// Last tick the engine reported it as touching.
    pub last_seen: u64,
    seq: u64,
}

/// Outcome of feeding one matched report to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Started,
    Continued,
    Ended,
    /// An end for a pair that was never tracked. No callback.
    Untracked,
}

/// A transition together with the pair as the tracker stores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub transition: Transition,
    pub pair: MatchedPair,
}

impl Observation {
    pub fn key(&self) -> PairKey {
        self.pair.key()
    }
}

#[derive(Debug, Default)]
struct ContactSet {
    entries: FxHashMap<PairKey, ContactEntry>,
    next_seq: u64,
}

impl ContactSet {
    /// Symmetric matches may arrive in either orientation; stick to the one
    /// already tracked.
    fn orient(&self, pair: MatchedPair) -> MatchedPair {
        if pair.symmetric
            && !self.entries.contains_key(&pair.key())
            && self.entries.contains_key(&pair.key().swapped())
        {
            pair.swapped()
        } else {
            pair
        }
    }

    fn sorted(&self) -> Vec<(PairKey, ContactEntry)> {
        let mut all: Vec<_> = self.entries.iter().map(|(k, e)| (*k, *e)).collect();
        all.sort_by_key(|(_, e)| e.seq);
        all
    }
}

/// Contact sets of every subscription.
#[derive(Debug, Default)]
pub struct ContactTracker {
    sets: FxHashMap<SubscriptionId, ContactSet>,
}

impl ContactTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one matched pair for `subscription`.
    ///
    /// `touching` is `true` for pairs the engine reported as started or
    /// active, `false` for pairs it reported as ended.
    pub fn observe(
        &mut self,
        subscription: SubscriptionId,
        pair: MatchedPair,
        touching: bool,
        tick: u64,
    ) -> Observation {
        if touching {
            let set = self.sets.entry(subscription).or_default();
            let pair = set.orient(pair);
            let key = pair.key();
            if let Some(entry) = set.entries.get_mut(&key) {
                entry.last_seen = tick;
                entry.a = pair.a;
                entry.b = pair.b;
                return Observation {
                    transition: Transition::Continued,
                    pair,
                };
            }
            let seq = set.next_seq;
            set.next_seq += 1;
            set.entries.insert(
                key,
                ContactEntry {
                    a: pair.a,
                    b: pair.b,
                    since: tick,
                    last_seen: tick,
                    seq,
                },
            );
            Observation {
                transition: Transition::Started,
                pair,
            }
        } else {
            let Some(set) = self.sets.get_mut(&subscription) else {
                return Observation {
                    transition: Transition::Untracked,
                    pair,
                };
            };
            let pair = set.orient(pair);
            match set.entries.remove(&pair.key()) {
                Some(entry) => Observation {
                    transition: Transition::Ended,
                    pair: MatchedPair {
                        a: entry.a,
                        b: entry.b,
                        symmetric: pair.symmetric,
                    },
                },
                None => Observation {
                    transition: Transition::Untracked,
                    pair,
                },
            }
        }
    }

    /// Remove and return contacts of `subscription` not reported as touching
    /// in `tick`, oldest first.
    pub fn take_stale(
        &mut self,
        subscription: SubscriptionId,
        tick: u64,
    ) -> Vec<(PairKey, ContactEntry)> {
        let Some(set) = self.sets.get_mut(&subscription) else {
            return Vec::new();
        };
        if set.entries.values().all(|e| e.last_seen >= tick) {
            return Vec::new();
        }
        let mut stale: Vec<_> = set
            .entries
            .iter()
            .filter(|(_, e)| e.last_seen < tick)
            .map(|(k, e)| (*k, *e))
            .collect();
        stale.sort_by_key(|(_, e)| e.seq);
        for (key, _) in &stale {
            set.entries.remove(key);
        }
        stale
    }

    /// Remove and return every contact whose key involves one of `bodies`,
    /// ordered by subscription id and then by age.
    pub fn take_involving(
        &mut self,
        bodies: &[BodyId],
    ) -> Vec<(SubscriptionId, PairKey, ContactEntry)> {
        let mut taken = Vec::new();
        for (id, set) in self.sets.iter_mut() {
            let mut hits: Vec<_> = set
                .entries
                .iter()
                .filter(|(k, _)| bodies.iter().any(|b| k.involves(*b)))
                .map(|(k, e)| (*id, *k, *e))
                .collect();
            for (_, key, _) in &hits {
                set.entries.remove(key);
            }
            taken.append(&mut hits);
        }
        taken.sort_by_key(|(id, _, e)| (*id, e.seq));
        taken
    }

    /// Re-examine contacts whose key involves one of `bodies`.
    ///
    /// `keep` may refresh the entry's sides. Entries it rejects are removed
    /// and returned, ordered by subscription id and then by age.
    pub fn retain_involving(
        &mut self,
        bodies: &[BodyId],
        mut keep: impl FnMut(SubscriptionId, &mut ContactEntry) -> bool,
    ) -> Vec<(SubscriptionId, PairKey, ContactEntry)> {
        let mut taken = Vec::new();
        for (id, set) in self.sets.iter_mut() {
            set.entries.retain(|key, entry| {
                if !bodies.iter().any(|b| key.involves(*b)) || keep(*id, entry) {
                    return true;
                }
                taken.push((*id, *key, *entry));
                false
            });
        }
        taken.sort_by_key(|(id, _, e)| (*id, e.seq));
        taken
    }

    /// Forget everything tracked for `subscription`. Returns how many
    /// contacts were dropped.
    pub fn drop_subscription(&mut self, subscription: SubscriptionId) -> usize {
        self.sets
            .remove(&subscription)
            .map(|s| s.entries.len())
            .unwrap_or(0)
    }

    /// Keys currently touching for `subscription`, oldest first.
    pub fn contacts_of(&self, subscription: SubscriptionId) -> Vec<PairKey> {
        self.sets
            .get(&subscription)
            .map(|s| s.sorted().into_iter().map(|(k, _)| k).collect())
            .unwrap_or_default()
    }

    pub fn entry(&self, subscription: SubscriptionId, key: PairKey) -> Option<&ContactEntry> {
        self.sets.get(&subscription)?.entries.get(&key)
    }

    pub fn is_touching(&self, subscription: SubscriptionId, key: PairKey) -> bool {
        self.entry(subscription, key).is_some()
    }

    /// Number of tracked contacts across all subscriptions.
    pub fn total(&self) -> usize {
        self.sets.values().map(|s| s.entries.len()).sum()
    }

    pub fn clear(&mut self) {
        self.sets.clear();
    }
}
