//! Event and message types.
//!
//! Submodules:
//! - [`collision`] – payloads handed to subscriber callbacks
//! - [`contactreport`] – raw contact reports and body lifecycle messages from the physics side
pub mod collision;
pub mod contactreport;
