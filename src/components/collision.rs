//! Collision subscriptions and the pair normalizer.
//!
//! A [`Subscription`] pairs two [`Interest`]s with up to three callbacks
//! (start, active, end). Unlike a single global collision handler with a
//! growing list of conditionals, every interested party registers its own
//! subscription and the router only routes.
//!
//! [`match_pair`] is the normalizer: given two resolved raw bodies in engine
//! order, it decides whether they satisfy a pair of interests and returns
//! them in the subscription's declared order.
//!
//! # Example
//!
//! ```ignore
//! let id = router.subscribe(
//!     Subscription::new(player)
//!         .against(coins.clone())
//!         .on_start(|event, _ctx| {
//!             log::info!("picked up {:?}", event.owner_b());
//!             Ok(())
//!         }),
//! );
//! ```

use bevy_ecs::prelude::Entity;

use crate::components::interest::Interest;
use crate::events::collision::{ContactEvent, ContactPhase, ContactSide, PairKey};
use crate::resources::collisionrouter::ContactContext;

/// Callback invoked on a contact transition.
///
/// Returning `Err` does not abort dispatch; the router records the failure
/// and carries on with the remaining subscriptions.
pub type ContactCallback =
    Box<dyn FnMut(&ContactEvent, &mut ContactContext) -> Result<(), String> + Send + Sync>;

/// Result of a successful match, in the subscription's declared order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchedPair {
    /// Side that satisfied interest A.
    pub a: ContactSide,
    /// Side that satisfied interest B.
    pub b: ContactSide,
    /// Both orientations satisfied the interests, so the choice of `a` and
    /// `b` came from the tie-break rather than from the interests.
    pub symmetric: bool,
}

impl MatchedPair {
    pub fn key(&self) -> PairKey {
        PairKey::new(self.a.body, self.b.body)
    }

    pub fn swapped(self) -> Self {
        Self {
            a: self.b,
            b: self.a,
            symmetric: self.symmetric,
        }
    }
}

/// Match two resolved raw bodies against a pair of interests.
///
/// The engine order (`first`, `second`) against (A, B) is tried first, then
/// the swapped orientation. When both orientations fit, the engine order wins.
/// That tie-break is deterministic but arbitrary; callers should not give it
/// meaning.
///
/// Two non-wildcard interests never match a pair whose bodies resolve to the
/// same owner (two parts of one compound touching each other).
#[inline]
pub fn match_pair(
    interest_a: &Interest,
    interest_b: &Interest,
    first: ContactSide,
    second: ContactSide,
) -> Option<MatchedPair> {
    if !interest_a.is_wildcard()
        && !interest_b.is_wildcard()
        && first.owner.is_some()
        && first.owner == second.owner
    {
        return None;
    }

    let in_order = interest_a.matches(first.owner) && interest_b.matches(second.owner);
    let swapped = interest_a.matches(second.owner) && interest_b.matches(first.owner);

    match (in_order, swapped) {
        (true, _) => Some(MatchedPair {
            a: first,
            b: second,
            symmetric: swapped,
        }),
        (false, true) => Some(MatchedPair {
            a: second,
            b: first,
            symmetric: false,
        }),
        (false, false) => None,
    }
}

/// A collision subscription: two interests and the callbacks to run.
///
/// Built with a chain of `with`-style methods and handed to
/// [`CollisionRouter::subscribe`](crate::resources::collisionrouter::CollisionRouter::subscribe).
/// Interest B defaults to a wildcard.
pub struct Subscription {
    pub interest_a: Interest,
    pub interest_b: Interest,
    on_start: Option<ContactCallback>,
    on_active: Option<ContactCallback>,
    on_end: Option<ContactCallback>,
}

impl Subscription {
    /// New subscription watching `interest_a` against anything.
    pub fn new(interest_a: impl Into<Interest>) -> Self {
        Self {
            interest_a: interest_a.into(),
            interest_b: Interest::Wildcard,
            on_start: None,
            on_active: None,
            on_end: None,
        }
    }

    /// Set interest B.
    pub fn against(mut self, interest_b: impl Into<Interest>) -> Self {
        self.interest_b = interest_b.into();
        self
    }

    pub fn on_start<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&ContactEvent, &mut ContactContext) -> Result<(), String> + Send + Sync + 'static,
    {
        self.on_start = Some(Box::new(callback));
        self
    }

    pub fn on_active<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&ContactEvent, &mut ContactContext) -> Result<(), String> + Send + Sync + 'static,
    {
        self.on_active = Some(Box::new(callback));
        self
    }

    pub fn on_end<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&ContactEvent, &mut ContactContext) -> Result<(), String> + Send + Sync + 'static,
    {
        self.on_end = Some(Box::new(callback));
        self
    }

    /// Assemble a subscription from already boxed parts.
    pub fn from_parts(
        interest_a: Interest,
        interest_b: Interest,
        on_start: Option<ContactCallback>,
        on_active: Option<ContactCallback>,
        on_end: Option<ContactCallback>,
    ) -> Self {
        Self {
            interest_a,
            interest_b,
            on_start,
            on_active,
            on_end,
        }
    }

    pub fn has_callback(&self, phase: ContactPhase) -> bool {
        match phase {
            ContactPhase::Start => self.on_start.is_some(),
            ContactPhase::Active => self.on_active.is_some(),
            ContactPhase::End => self.on_end.is_some(),
        }
    }

    pub(crate) fn callback_mut(&mut self, phase: ContactPhase) -> Option<&mut ContactCallback> {
        match phase {
            ContactPhase::Start => self.on_start.as_mut(),
            ContactPhase::Active => self.on_active.as_mut(),
            ContactPhase::End => self.on_end.as_mut(),
        }
    }

    /// Run the normalizer with this subscription's interests.
    #[inline]
    pub fn match_and_order(&self, first: ContactSide, second: ContactSide) -> Option<MatchedPair> {
        match_pair(&self.interest_a, &self.interest_b, first, second)
    }

    /// Returns `true` if either interest explicitly names `entity`.
    pub fn involves(&self, entity: Entity) -> bool {
        self.interest_a.names(entity) || self.interest_b.names(entity)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("interest_a", &self.interest_a)
            .field("interest_b", &self.interest_b)
            .field("on_start", &self.on_start.is_some())
            .field("on_active", &self.on_active.is_some())
            .field("on_end", &self.on_end.is_some())
            .finish()
    }
}
