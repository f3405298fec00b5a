//! Annotation records: cosmic signatures and wormhole connections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wormholes heavier than this are mass-critical.
const MASS_CRITICAL: i64 = 500_000_000;
/// Wormholes heavier than this show a mass warning.
const MASS_WARNING: i64 = 200_000_000;

/// Which kind of record a mutation touched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Signature,
    Wormhole,
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Signature => write!(f, "signature"),
            Self::Wormhole => write!(f, "wormhole"),
        }
    }
}

/// A scanned cosmic signature in one system, visible to one mask.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    pub id: i64,
    #[serde(rename = "systemID")]
    pub system_id: i64,
    /// In-game identifier, e.g. `"ABC-123"`.
    #[serde(rename = "signatureID")]
    pub signature_id: String,
    /// Signature classification (`"wormhole"`, `"data"`, `"relic"`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "createdBy", default)]
    pub created_by: Option<i64>,
    #[serde(rename = "createdByName", default)]
    pub created_by_name: Option<String>,
    #[serde(rename = "lifeTime")]
    pub life_time: DateTime<Utc>,
    /// When the signature is expected to despawn.
    #[serde(rename = "lifeLeft")]
    pub life_left: DateTime<Utc>,
    #[serde(rename = "modifiedTime")]
    pub modified_time: DateTime<Utc>,
    #[serde(rename = "maskID")]
    pub mask_id: String,
}

impl Signature {
    /// Whether the signature has outlived its expected lifetime.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.life_left <= now
    }
}

/// Remaining-life / remaining-mass classification for a wormhole.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WormholeStatus {
    Stable,
    Warning,
    Critical,
}

/// A wormhole connection between two systems, visible to one mask.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Wormhole {
    pub id: i64,
    #[serde(rename = "fromSystemID")]
    pub from_system_id: i64,
    #[serde(rename = "toSystemID")]
    pub to_system_id: i64,
    #[serde(rename = "signatureID")]
    pub signature_id: String,
    /// Hole classification, e.g. `"K162"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Remaining life as a fraction in `0.0..=1.0`.
    pub life: f64,
    /// Accumulated mass that has passed through, in kilograms.
    pub mass: i64,
    #[serde(rename = "createdBy", default)]
    pub created_by: Option<i64>,
    #[serde(rename = "createdByName", default)]
    pub created_by_name: Option<String>,
    #[serde(rename = "createdTime")]
    pub created_time: DateTime<Utc>,
    #[serde(rename = "modifiedTime")]
    pub modified_time: DateTime<Utc>,
    #[serde(rename = "maskID")]
    pub mask_id: String,
}

impl Wormhole {
    /// Classify remaining life.
    pub fn life_status(&self) -> WormholeStatus {
        if self.life < 0.1 {
            WormholeStatus::Critical
        } else if self.life < 0.5 {
            WormholeStatus::Warning
        } else {
            WormholeStatus::Stable
        }
    }

    /// Classify accumulated mass.
    pub fn mass_status(&self) -> WormholeStatus {
        if self.mass > MASS_CRITICAL {
            WormholeStatus::Critical
        } else if self.mass > MASS_WARNING {
            WormholeStatus::Warning
        } else {
            WormholeStatus::Stable
        }
    }

    /// Whether the hole is about to collapse on either axis.
    pub fn is_eol(&self) -> bool {
        self.life < 0.1 || self.mass > MASS_CRITICAL
    }

    /// Whether the connection touches the given system on either end.
    pub fn connects(&self, system_id: i64) -> bool {
        self.from_system_id == system_id || self.to_system_id == system_id
    }
}
