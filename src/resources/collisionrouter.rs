//! Collision router resource.
//!
//! [`CollisionRouter`] is the dispatcher. It owns the
//! [`BodyRegistry`], the [`SubscriptionTable`] and the [`ContactTracker`],
//! and once per tick turns the engine's raw contact report into subscriber
//! callbacks:
//!
//! 1. Purge subscriptions cancelled since the last tick and snapshot the live set.
//! 2. For every raw pair (started, then active, then ended) resolve both
//!    bodies through the registry.
//! 3. Match the resolved pair against every subscription in the snapshot.
//! 4. Feed each match to the tracker and fire the callback for the resulting
//!    transition.
//! 5. Optionally end tracked contacts that were not reported this tick.
//!
//! # Callback rules
//!
//! - A callback runs at most once per (subscription, pair, phase) per tick.
//! - A callback returning `Err` is logged, recorded and passed to the failure
//!   hook; dispatch carries on with the next subscription.
//! - Callbacks may cancel subscriptions (their own included) through the
//!   [`ContactContext`]. Cancellations apply as soon as the callback returns,
//!   so a cancelled subscription receives nothing more, not even later in the
//!   same tick.
//!
//! Subscriptions added or removed between ticks take effect on the next tick.

use std::collections::VecDeque;

use bevy_ecs::prelude::{Entity, Resource};
use log::{debug, error, trace, warn};
use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::components::body::{BodyId, BodyPair};
use crate::components::collision::{MatchedPair, Subscription};
use crate::components::interest::Interest;
use crate::events::collision::{CallbackFailure, ContactEvent, ContactPhase, PairKey};
use crate::events::contactreport::RawContactReport;
use crate::resources::bodyregistry::{BodyRegistry, Registration};
use crate::resources::contactstate::{ContactEntry, ContactTracker, Transition};
use crate::resources::routerconfig::{DestroyPolicy, RouterConfig};
use crate::resources::subscriptions::{SubscriptionId, SubscriptionTable};

/// Hook receiving every callback failure as it happens.
pub type FailureHook = Box<dyn FnMut(&CallbackFailure) + Send + Sync>;

/// Context handed to callbacks alongside the event.
///
/// Collects cancellations requested by the callback. The router applies them
/// right after the callback returns.
#[derive(Debug)]
pub struct ContactContext {
    subscription: SubscriptionId,
    tick: u64,
    cancellations: SmallVec<[SubscriptionId; 2]>,
}

impl ContactContext {
    fn new(subscription: SubscriptionId, tick: u64) -> Self {
        Self {
            subscription,
            tick,
            cancellations: SmallVec::new(),
        }
    }

    /// Subscription whose callback is running.
    pub fn subscription(&self) -> SubscriptionId {
        self.subscription
    }

    /// Router tick being dispatched.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Cancel `id`. Cancelling a dead subscription is a no-op.
    pub fn cancel(&mut self, id: SubscriptionId) {
        if !self.cancellations.contains(&id) {
            self.cancellations.push(id);
        }
    }

    /// Cancel the subscription whose callback is running.
    pub fn cancel_self(&mut self) {
        self.cancel(self.subscription);
    }
}

/// Counters for one dispatched tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub tick: u64,
    /// Raw pairs in the report.
    pub raw_pairs: usize,
    /// (raw pair, subscription) combinations that matched.
    pub matched: usize,
    pub starts: usize,
    pub actives: usize,
    pub ends: usize,
    pub failures: usize,
}

impl TickStats {
    fn count(&mut self, phase: ContactPhase) {
        match phase {
            ContactPhase::Start => self.starts += 1,
            ContactPhase::Active => self.actives += 1,
            ContactPhase::End => self.ends += 1,
        }
    }
}

/// Dispatcher between the physics contact stream and subscribers.
#[derive(Resource)]
pub struct CollisionRouter {
    config: RouterConfig,
    registry: BodyRegistry,
    subscriptions: SubscriptionTable,
    contacts: ContactTracker,
    tick: u64,
    failures: VecDeque<CallbackFailure>,
    failure_hook: Option<FailureHook>,
    live_scratch: Vec<SubscriptionId>,
}

impl Default for CollisionRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl CollisionRouter {
    pub fn new() -> Self {
        Self::with_config(RouterConfig::new())
    }

    pub fn with_config(config: RouterConfig) -> Self {
        let mut registry = BodyRegistry::new();
        registry.set_warn_on_reregister(config.warn_on_reregister);
        Self {
            config,
            registry,
            subscriptions: SubscriptionTable::new(),
            contacts: ContactTracker::new(),
            tick: 0,
            failures: VecDeque::new(),
            failure_hook: None,
            live_scratch: Vec::new(),
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Replace the configuration. Takes effect from the next call on.
    pub fn set_config(&mut self, config: RouterConfig) {
        self.registry
            .set_warn_on_reregister(config.warn_on_reregister);
        while self.failures.len() > config.max_recorded_failures {
            self.failures.pop_front();
        }
        self.config = config;
    }

    /// Install a hook called for every callback failure.
    pub fn set_failure_hook(&mut self, hook: impl FnMut(&CallbackFailure) + Send + Sync + 'static) {
        self.failure_hook = Some(Box::new(hook));
    }

    /// Number of ticks dispatched so far.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn registry(&self) -> &BodyRegistry {
        &self.registry
    }

    // ==================== BODIES ====================

    /// Record a body created by the physics side.
    ///
    /// Registering a known body again with a different owner or parent can
    /// change who its tracked contacts belong to. Contacts that no longer
    /// match their subscription in the same orientation end as if the body
    /// had been destroyed, following [`DestroyPolicy`]; the others keep
    /// going with refreshed sides.
    pub fn register_body(
        &mut self,
        body: BodyId,
        owner: Option<Entity>,
        parent: Option<BodyId>,
    ) -> Registration {
        let outcome = self.registry.register(body, owner, parent);
        let recheck = match outcome {
            Registration::Unchanged => false,
            Registration::Replaced => true,
            // a new root with no waiting parts cannot change an existing match
            Registration::New => {
                self.registry.parent_of(body).is_some()
                    || !self.registry.children_of(body).is_empty()
            }
        };
        if recheck && self.contacts.total() > 0 {
            self.recheck_contacts(body);
        }
        outcome
    }

    /// Forget a destroyed body and every compound part below it.
    ///
    /// Tracked contacts involving any removed body leave the contact sets.
    /// With [`DestroyPolicy::SynthesizeEnd`] each of them fires `on_end`
    /// immediately, as the engine will never report an end for them; with
    /// [`DestroyPolicy::Silent`] they are dropped quietly.
    ///
    /// Returns the removed body ids.
    pub fn destroy_body(&mut self, body: BodyId) -> Vec<BodyId> {
        let mut removed = self.registry.unregister(body);
        if removed.is_empty() {
            // bare bodies can still be in contact through wildcards
            removed.push(body);
        }

        let taken = self.contacts.take_involving(&removed);
        if taken.is_empty() {
            return removed;
        }
        debug!(
            target: "contacts",
            "{} destroyed with {} live contact(s), policy {}",
            body,
            taken.len(),
            self.config.destroy_policy
        );
        self.end_contacts(taken);
        removed
    }

    /// Re-resolve contacts involving `body` or its parts after it was
    /// registered again.
    fn recheck_contacts(&mut self, body: BodyId) {
        let affected = self.registry.subtree(body);
        let registry = &self.registry;
        let subscriptions = &self.subscriptions;
        let taken = self.contacts.retain_involving(&affected, |id, entry| {
            let Some(row) = subscriptions.get(id).filter(|row| row.live) else {
                return false;
            };
            let a = registry.side(entry.a.body);
            let b = registry.side(entry.b.body);
            match row.subscription.match_and_order(a, b) {
                Some(pair) if pair.a.body == entry.a.body && pair.b.body == entry.b.body => {
                    entry.a = pair.a;
                    entry.b = pair.b;
                    true
                }
                _ => false,
            }
        });
        if taken.is_empty() {
            return;
        }
        debug!(
            target: "contacts",
            "{} re-registered, {} contact(s) no longer match, policy {}",
            body,
            taken.len(),
            self.config.destroy_policy
        );
        self.end_contacts(taken);
    }

    /// End contacts the engine will never report an end for.
    fn end_contacts(&mut self, taken: Vec<(SubscriptionId, PairKey, ContactEntry)>) {
        if self.config.destroy_policy == DestroyPolicy::Silent {
            return;
        }
        for (id, _, entry) in taken {
            if !self.subscriptions.is_live(id) {
                continue;
            }
            let event = ContactEvent {
                subscription: id,
                phase: ContactPhase::End,
                a: entry.a,
                b: entry.b,
                tick: self.tick,
            };
            self.invoke(event);
        }
    }

    // ==================== SUBSCRIPTIONS ====================

    /// Register a subscription. It receives events from the next tick on.
    pub fn subscribe(&mut self, subscription: Subscription) -> SubscriptionId {
        let id = self.subscriptions.insert(subscription);
        debug!(target: "contacts", "Added {}", id);
        id
    }

    /// Register a subscription with only an `on_start` callback.
    pub fn on_collide_start<F>(
        &mut self,
        interest_a: impl Into<Interest>,
        interest_b: impl Into<Interest>,
        callback: F,
    ) -> SubscriptionId
    where
        F: FnMut(&ContactEvent, &mut ContactContext) -> Result<(), String> + Send + Sync + 'static,
    {
        self.subscribe(
            Subscription::new(interest_a)
                .against(interest_b)
                .on_start(callback),
        )
    }

    /// Register a subscription with only an `on_active` callback.
    pub fn on_collide_active<F>(
        &mut self,
        interest_a: impl Into<Interest>,
        interest_b: impl Into<Interest>,
        callback: F,
    ) -> SubscriptionId
    where
        F: FnMut(&ContactEvent, &mut ContactContext) -> Result<(), String> + Send + Sync + 'static,
    {
        self.subscribe(
            Subscription::new(interest_a)
                .against(interest_b)
                .on_active(callback),
        )
    }

    /// Register a subscription with only an `on_end` callback.
    pub fn on_collide_end<F>(
        &mut self,
        interest_a: impl Into<Interest>,
        interest_b: impl Into<Interest>,
        callback: F,
    ) -> SubscriptionId
    where
        F: FnMut(&ContactEvent, &mut ContactContext) -> Result<(), String> + Send + Sync + 'static,
    {
        self.subscribe(
            Subscription::new(interest_a)
                .against(interest_b)
                .on_end(callback),
        )
    }

    /// Cancel a subscription. Its contact state is dropped without `on_end`.
    ///
    /// Returns `true` if the subscription was live; cancelling twice is a
    /// no-op.
    pub fn cancel(&mut self, id: SubscriptionId) -> bool {
        if !self.subscriptions.remove(id) {
            return false;
        }
        let dropped = self.contacts.drop_subscription(id);
        debug!(target: "contacts", "Cancelled {} ({} contact(s) dropped)", id, dropped);
        true
    }

    /// Cancel every live subscription whose interests name `owner`.
    ///
    /// Wildcards name nobody, so a subscription only watching "anything" is
    /// left alone. Returns how many were cancelled.
    pub fn cancel_involving(&mut self, owner: Entity) -> usize {
        let ids = self.subscriptions.live_ids_where(|s| s.involves(owner));
        ids.into_iter().filter(|id| self.cancel(*id)).count()
    }

    /// Drop every subscription and all contact state without firing callbacks.
    ///
    /// Meant for scene changes; bodies stay registered.
    pub fn teardown(&mut self) {
        let live = self.subscriptions.live_count();
        self.subscriptions.clear();
        self.contacts.clear();
        debug!(target: "contacts", "Teardown dropped {} subscription(s)", live);
    }

    pub fn is_live(&self, id: SubscriptionId) -> bool {
        self.subscriptions.is_live(id)
    }

    pub fn live_count(&self) -> usize {
        self.subscriptions.live_count()
    }

    /// Pairs currently touching for `id`, oldest first.
    pub fn contacts_of(&self, id: SubscriptionId) -> Vec<PairKey> {
        self.contacts.contacts_of(id)
    }

    // ==================== FAILURES ====================

    /// Drain the recorded callback failures, oldest first.
    pub fn take_failures(&mut self) -> Vec<CallbackFailure> {
        self.failures.drain(..).collect()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    // ==================== DISPATCH ====================

    /// Dispatch a report written by the physics step.
    pub fn dispatch(&mut self, report: &RawContactReport) -> TickStats {
        self.on_tick(&report.started, &report.active, &report.ended)
    }

    /// Dispatch one tick of raw contacts.
    pub fn on_tick(
        &mut self,
        started: &[BodyPair],
        active: &[BodyPair],
        ended: &[BodyPair],
    ) -> TickStats {
        self.tick += 1;
        let tick = self.tick;
        let mut stats = TickStats {
            tick,
            raw_pairs: started.len() + active.len() + ended.len(),
            ..TickStats::default()
        };

        self.subscriptions.purge_dead();
        let mut live = std::mem::take(&mut self.live_scratch);
        self.subscriptions.snapshot_live(&mut live);

        // allocates only once something fires
        let mut fired: FxHashSet<(SubscriptionId, PairKey, ContactPhase)> = FxHashSet::default();

        let categories = [(started, true), (active, true), (ended, false)];
        for (pairs, touching) in categories {
            for pair in pairs {
                let first = self.registry.side(pair.0);
                let second = self.registry.side(pair.1);
                for &id in &live {
                    let Some(entry) = self.subscriptions.get(id) else {
                        continue;
                    };
                    if !entry.live {
                        continue;
                    }
                    let Some(matched) = entry.subscription.match_and_order(first, second) else {
                        continue;
                    };
                    stats.matched += 1;
                    self.route(id, matched, touching, &mut fired, &mut stats);
                }
            }
        }

        if self.config.sweep_stale {
            for &id in &live {
                if !self.subscriptions.is_live(id) {
                    continue;
                }
                for (key, entry) in self.contacts.take_stale(id, tick) {
                    trace!(target: "contacts", "{} {} went stale", id, key);
                    if !self.subscriptions.is_live(id) {
                        break;
                    }
                    let event = ContactEvent {
                        subscription: id,
                        phase: ContactPhase::End,
                        a: entry.a,
                        b: entry.b,
                        tick,
                    };
                    if fired.insert((id, key, ContactPhase::End)) {
                        stats.count(ContactPhase::End);
                        if !self.invoke(event) {
                            stats.failures += 1;
                        }
                    }
                }
            }
        }

        live.clear();
        self.live_scratch = live;

        if stats.starts + stats.actives + stats.ends > 0 {
            debug!(
                target: "contacts",
                "tick {}: {} raw, {} matched, {} start, {} active, {} end, {} failed",
                stats.tick,
                stats.raw_pairs,
                stats.matched,
                stats.starts,
                stats.actives,
                stats.ends,
                stats.failures
            );
        }
        stats
    }

    fn route(
        &mut self,
        id: SubscriptionId,
        matched: MatchedPair,
        touching: bool,
        fired: &mut FxHashSet<(SubscriptionId, PairKey, ContactPhase)>,
        stats: &mut TickStats,
    ) {
        let observation = self.contacts.observe(id, matched, touching, self.tick);
        let phase = match observation.transition {
            Transition::Started => ContactPhase::Start,
            Transition::Continued => ContactPhase::Active,
            Transition::Ended => ContactPhase::End,
            Transition::Untracked => return,
        };
        let key = observation.key();
        if !fired.insert((id, key, phase)) {
            return;
        }
        trace!(target: "contacts", "{} {} {}", id, phase, key);
        stats.count(phase);

        let event = ContactEvent {
            subscription: id,
            phase,
            a: observation.pair.a,
            b: observation.pair.b,
            tick: self.tick,
        };
        if !self.invoke(event) {
            stats.failures += 1;
        }
    }

    /// Run the callback for `event`, then apply the cancellations it asked for.
    ///
    /// Returns `false` if the callback failed.
    fn invoke(&mut self, event: ContactEvent) -> bool {
        let id = event.subscription;
        let mut ctx = ContactContext::new(id, self.tick);
        let result = match self.subscriptions.get_mut(id) {
            Some(entry) if entry.live => match entry.subscription.callback_mut(event.phase) {
                Some(callback) => callback(&event, &mut ctx),
                None => Ok(()),
            },
            _ => Ok(()),
        };

        for cancelled in ctx.cancellations {
            self.cancel(cancelled);
        }

        match result {
            Ok(()) => true,
            Err(message) => {
                self.record_failure(CallbackFailure {
                    subscription: id,
                    phase: event.phase,
                    key: event.key(),
                    tick: event.tick,
                    message,
                });
                false
            }
        }
    }

    fn record_failure(&mut self, failure: CallbackFailure) {
        error!(target: "contacts", "{}", failure);
        if let Some(hook) = self.failure_hook.as_mut() {
            hook(&failure);
        }
        if self.config.max_recorded_failures == 0 {
            return;
        }
        if self.failures.len() >= self.config.max_recorded_failures {
            warn!(target: "contacts", "Failure log full, dropping oldest entry");
            self.failures.pop_front();
        }
        self.failures.push_back(failure);
    }
}
