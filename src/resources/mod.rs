//! ECS resources and the state they are built from.
//!
//! Overview
//! - `bodyregistry` – body to owner mapping with compound parent links
//! - `collisionrouter` – the dispatcher resource tying everything together
//! - `contactstate` – per-subscription sets of pairs currently in contact
//! - `routerconfig` – INI-backed router settings
//! - `subscriptions` – registered subscriptions and their liveness
pub mod bodyregistry;
pub mod collisionrouter;
pub mod contactstate;
pub mod routerconfig;
pub mod subscriptions;
