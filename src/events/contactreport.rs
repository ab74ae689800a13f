//! Messages fed into the router from the physics side.
//!
//! The physics step writes one [`RawContactReport`] per tick and a
//! [`BodyLifecycle`] message whenever it creates or destroys a body. The
//! [collision systems](crate::systems::collision) drain both mailboxes and
//! hand them to the [`CollisionRouter`](crate::resources::collisionrouter::CollisionRouter).

use bevy_ecs::message::Message;
use bevy_ecs::prelude::Entity;
use serde::{Deserialize, Serialize};

use crate::components::body::{BodyId, BodyPair};

/// Raw per-tick contact report from the physics engine.
///
/// Pair order inside each list is whatever the engine produced; the router
/// canonicalizes it per subscription.
#[derive(Message, Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawContactReport {
    /// Pairs that began touching this tick.
    #[serde(default)]
    pub started: Vec<BodyPair>,
    /// Pairs that were already touching and still are.
    #[serde(default)]
    pub active: Vec<BodyPair>,
    /// Pairs that stopped touching this tick.
    #[serde(default)]
    pub ended: Vec<BodyPair>,
}

impl RawContactReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_started(mut self, pair: BodyPair) -> Self {
        self.started.push(pair);
        self
    }

    pub fn with_active(mut self, pair: BodyPair) -> Self {
        self.active.push(pair);
        self
    }

    pub fn with_ended(mut self, pair: BodyPair) -> Self {
        self.ended.push(pair);
        self
    }

    /// Total number of raw pairs across all three lists.
    pub fn len(&self) -> usize {
        self.started.len() + self.active.len() + self.ended.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Body creation or destruction notice from the physics side.
#[derive(Message, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyLifecycle {
    Created {
        body: BodyId,
        owner: Option<Entity>,
        parent: Option<BodyId>,
    },
    Destroyed {
        body: BodyId,
    },
}
