//! Data types describing bodies and what subscribers want to watch.
//!
//! Submodules overview:
//! - [`body`] – opaque physics body handles and raw body pairs
//! - [`collision`] – subscriptions, callbacks and the pair normalizer
//! - [`interest`] – single / set / wildcard interest specifiers

pub mod body;
pub mod collision;
pub mod interest;
