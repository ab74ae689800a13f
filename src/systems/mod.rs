//! Engine systems.
//!
//! Submodules overview
//! - [`collision`] – apply body lifecycle messages and dispatch contact reports

pub mod collision;
