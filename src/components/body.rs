//! Physics body handles.
//!
//! A [`BodyId`] is the opaque identity the physics engine hands out for each
//! collision shape. The router never looks inside it: it only compares and
//! hashes ids, and resolves them to owning entities through the
//! [`BodyRegistry`](crate::resources::bodyregistry::BodyRegistry).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identity of a collision body in the physics engine.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct BodyId(pub u64);

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "body#{}", self.0)
    }
}

impl From<u64> for BodyId {
    fn from(raw: u64) -> Self {
        BodyId(raw)
    }
}

/// Unordered pair of bodies reported as touching by the engine.
///
/// The engine gives no ordering guarantee: `(a, b)` and `(b, a)` describe the
/// same contact. Serialized as a two element array, `[a, b]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BodyPair(pub BodyId, pub BodyId);

impl BodyPair {
    pub fn new(a: impl Into<BodyId>, b: impl Into<BodyId>) -> Self {
        BodyPair(a.into(), b.into())
    }

    /// The same pair with its raw order flipped.
    pub fn flipped(self) -> Self {
        BodyPair(self.1, self.0)
    }

    /// Returns `true` if either side is `body`.
    pub fn contains(&self, body: BodyId) -> bool {
        self.0 == body || self.1 == body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_pair_flipped() {
        let pair = BodyPair::new(1, 2);
        assert_eq!(pair.flipped(), BodyPair::new(2, 1));
        assert_eq!(pair.flipped().flipped(), pair);
    }

    #[test]
    fn test_body_pair_contains() {
        let pair = BodyPair::new(7, 9);
        assert!(pair.contains(BodyId(7)));
        assert!(pair.contains(BodyId(9)));
        assert!(!pair.contains(BodyId(8)));
    }

    #[test]
    fn test_body_pair_json_is_array() {
        let pair: BodyPair = serde_json::from_str("[3, 4]").unwrap();
        assert_eq!(pair, BodyPair::new(3, 4));
        assert_eq!(serde_json::to_string(&pair).unwrap(), "[3,4]");
    }

    #[test]
    fn test_body_id_display() {
        assert_eq!(BodyId(12).to_string(), "body#12");
    }
}
