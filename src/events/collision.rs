//! Contact event payloads.
//!
//! The router hands a [`ContactEvent`] to subscriber callbacks. Its two
//! sides are always in the subscription's declared order: `a` satisfied
//! interest A and `b` satisfied interest B, whatever order the engine
//! reported the raw bodies in.
//!
//! Each [`ContactSide`] carries the exact body that touched (for compound
//! objects, the specific child part), the compound root that body belongs to,
//! and the owning entity the match was made against.

use std::fmt;

use bevy_ecs::prelude::Entity;

use crate::components::body::BodyId;
use crate::resources::subscriptions::SubscriptionId;

/// Lifecycle stage of a contact, as seen by one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContactPhase {
    Start,
    Active,
    End,
}

impl fmt::Display for ContactPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContactPhase::Start => "start",
            ContactPhase::Active => "active",
            ContactPhase::End => "end",
        };
        f.write_str(name)
    }
}

/// One side of a resolved contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContactSide {
    /// The body the engine actually reported.
    pub body: BodyId,
    /// Root of the compound `body` belongs to (`body` itself if it has no parent).
    pub root: BodyId,
    /// Entity owning the root, if any.
    pub owner: Option<Entity>,
}

impl ContactSide {
    /// A body the registry knows nothing about.
    pub fn bare(body: BodyId) -> Self {
        Self {
            body,
            root: body,
            owner: None,
        }
    }

    /// Returns `true` if the reported body is a child part of a compound.
    pub fn is_child_part(&self) -> bool {
        self.body != self.root
    }
}

/// Canonical key of a tracked contact: the exact bodies in slot A and slot B.
///
/// Keyed by body rather than owner so that two parts of one compound object
/// touching the same thing are tracked independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey {
    pub a: BodyId,
    pub b: BodyId,
}

impl PairKey {
    pub fn new(a: BodyId, b: BodyId) -> Self {
        Self { a, b }
    }

    pub fn swapped(self) -> Self {
        Self {
            a: self.b,
            b: self.a,
        }
    }

    pub fn involves(&self, body: BodyId) -> bool {
        self.a == body || self.b == body
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.a, self.b)
    }
}

/// Payload passed to subscriber callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactEvent {
    /// Subscription receiving the event.
    pub subscription: SubscriptionId,
    pub phase: ContactPhase,
    /// Side matching interest A.
    pub a: ContactSide,
    /// Side matching interest B.
    pub b: ContactSide,
    /// Router tick the event was produced in. Ends fired between ticks, when
    /// a body is destroyed or re-registered, carry the last dispatched tick.
    pub tick: u64,
}

impl ContactEvent {
    pub fn key(&self) -> PairKey {
        PairKey::new(self.a.body, self.b.body)
    }

    pub fn owner_a(&self) -> Option<Entity> {
        self.a.owner
    }

    pub fn owner_b(&self) -> Option<Entity> {
        self.b.owner
    }
}

/// A subscriber callback that returned an error during dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackFailure {
    pub subscription: SubscriptionId,
    pub phase: ContactPhase,
    pub key: PairKey,
    pub tick: u64,
    pub message: String,
}

impl fmt::Display for CallbackFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} callback failed on {} at tick {}: {}",
            self.subscription, self.phase, self.key, self.tick, self.message
        )
    }
}
