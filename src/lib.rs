//! Contact router library.
//!
//! Sits between a physics engine's per-tick contact stream and application
//! code: resolves raw bodies to the entities that own them, matches them
//! against subscriptions, tracks start/active/end per subscription and fires
//! callbacks in a canonical order.
//!
//! - [`components`] – body handles, interest specifiers, subscriptions and the pair normalizer
//! - [`events`] – callback payloads and the messages fed in from the physics side
//! - [`resources`] – the [`CollisionRouter`](resources::collisionrouter::CollisionRouter) and its parts
//! - [`systems`] – ECS systems draining the message mailboxes into the router
//! - [`replay`] – JSON trace replay used by the binary

pub mod components;
pub mod events;
pub mod replay;
pub mod resources;
pub mod systems;
