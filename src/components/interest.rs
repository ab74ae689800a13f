//! Interest specifiers.
//!
//! An [`Interest`] declares which owning entities one side of a subscription
//! wants to watch. Every subscription carries two of them (slot A and slot B)
//! and the [pair normalizer](crate::components::collision::match_pair)
//! evaluates both uniformly, so callbacks never have to check "is this the
//! object I care about" themselves.
//!
//! # Example
//!
//! ```ignore
//! // player against anything
//! Subscription::new(player).against(Interest::any());
//! // any coin against the player
//! Subscription::new(vec![coin_a, coin_b, coin_c]).against(player);
//! ```

use bevy_ecs::prelude::Entity;
use rustc_hash::FxHashSet;

/// What one slot of a subscription matches against.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Interest {
    /// Only this owning entity.
    Single(Entity),
    /// Any member of the set.
    Set(FxHashSet<Entity>),
    /// Anything, including bare bodies with no owner.
    #[default]
    Wildcard,
}

impl Interest {
    /// Shorthand for [`Interest::Wildcard`].
    pub fn any() -> Self {
        Interest::Wildcard
    }

    /// Build a set interest from any collection of entities.
    pub fn set(entities: impl IntoIterator<Item = Entity>) -> Self {
        Interest::Set(entities.into_iter().collect())
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Interest::Wildcard)
    }

    /// Returns `true` if a body resolved to `owner` satisfies this interest.
    ///
    /// Bare bodies (`owner == None`) only satisfy a wildcard.
    #[inline]
    pub fn matches(&self, owner: Option<Entity>) -> bool {
        match self {
            Interest::Wildcard => true,
            Interest::Single(target) => owner == Some(*target),
            Interest::Set(members) => owner.is_some_and(|o| members.contains(&o)),
        }
    }

    /// Returns `true` if this interest explicitly names `entity`.
    ///
    /// A wildcard names nobody.
    pub fn names(&self, entity: Entity) -> bool {
        match self {
            Interest::Wildcard => false,
            Interest::Single(target) => *target == entity,
            Interest::Set(members) => members.contains(&entity),
        }
    }
}

impl From<Entity> for Interest {
    fn from(entity: Entity) -> Self {
        Interest::Single(entity)
    }
}

impl From<Vec<Entity>> for Interest {
    fn from(entities: Vec<Entity>) -> Self {
        Interest::set(entities)
    }
}

impl From<&[Entity]> for Interest {
    fn from(entities: &[Entity]) -> Self {
        Interest::set(entities.iter().copied())
    }
}

impl<const N: usize> From<[Entity; N]> for Interest {
    fn from(entities: [Entity; N]) -> Self {
        Interest::set(entities)
    }
}
