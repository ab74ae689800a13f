//! Collision routing systems.
//!
//! Bridges the ECS message mailboxes and the [`CollisionRouter`] resource:
//!
//! - [`body_lifecycle_system`] – applies [`BodyLifecycle`] messages to the
//!   router's body registry
//! - [`collision_dispatch_system`] – feeds every [`RawContactReport`] to the
//!   router, which runs subscriber callbacks
//!
//! # Schedule position
//!
//! Run both right after the physics step, lifecycle first:
//!
//! ```ignore
//! schedule.add_systems((body_lifecycle_system, collision_dispatch_system).chain());
//! ```
//!
//! so that bodies created this frame resolve to their owners in this frame's
//! report, and contacts of bodies destroyed this frame end before the report
//! is dispatched.

use bevy_ecs::prelude::*;
use log::trace;

use crate::events::contactreport::{BodyLifecycle, RawContactReport};
use crate::resources::collisionrouter::CollisionRouter;

/// Apply body creation and destruction notices to the router.
pub fn body_lifecycle_system(
    mut reader: MessageReader<BodyLifecycle>,
    mut router: ResMut<CollisionRouter>,
) {
    for message in reader.read() {
        match *message {
            BodyLifecycle::Created {
                body,
                owner,
                parent,
            } => {
                router.register_body(body, owner, parent);
            }
            BodyLifecycle::Destroyed { body } => {
                router.destroy_body(body);
            }
        }
    }
}

/// Dispatch every pending contact report through the router.
///
/// Each report counts as one tick.
pub fn collision_dispatch_system(
    mut reader: MessageReader<RawContactReport>,
    mut router: ResMut<CollisionRouter>,
) {
    for report in reader.read() {
        let stats = router.dispatch(report);
        trace!(target: "contacts", "{:?}", stats);
    }
}
