//! Broadcast and cache scope identification.

use serde::{Deserialize, Serialize};

/// Identifies one broadcast / cache audience: the clients viewing `system_id`
/// through access mask `mask_id`.
///
/// Derived from client-supplied values at subscribe time. Authorization of
/// the pair is the access policy's concern, not this type's.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeKey {
    /// Access-control grouping identifier, opaque to this crate.
    pub mask_id: String,
    /// Solar system the audience is viewing.
    pub system_id: i64,
}

impl ScopeKey {
    /// Create a scope key.
    pub fn new(mask_id: impl Into<String>, system_id: i64) -> Self {
        Self {
            mask_id: mask_id.into(),
            system_id,
        }
    }

    /// Canonical string form, used as the subscription map key.
    pub fn canonical(&self) -> String {
        format!("{}_{}", self.mask_id, self.system_id)
    }

    /// Cache tag covering reads filtered by this scope's system.
    pub fn system_tag(&self) -> String {
        format!("system:{}", self.system_id)
    }

    /// Cache tag covering reads filtered by this scope's mask.
    pub fn mask_tag(&self) -> String {
        format!("mask:{}", self.mask_id)
    }

    /// Both invalidation tags for a mutation on this scope. Reads may be
    /// filtered by either dimension, so a mutation must invalidate both.
    pub fn tags(&self) -> [String; 2] {
        [self.system_tag(), self.mask_tag()]
    }
}

impl std::fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.mask_id, self.system_id)
    }
}
