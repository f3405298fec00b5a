//! JSON wire envelopes, tagged by `"action"`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::EntityType;

/// Frames sent by a client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Start receiving updates for one scope. Replaces any prior
    /// subscription held by the same connection.
    Subscribe {
        #[serde(rename = "maskId")]
        mask_id: String,
        #[serde(rename = "systemId")]
        system_id: i64,
    },
    /// Stop receiving updates.
    Unsubscribe,
    /// Application-level keepalive; the server answers with `pong`.
    Ping,
}

/// Frames sent by the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ServerFrame {
    Subscribed {
        #[serde(rename = "maskId")]
        mask_id: String,
        #[serde(rename = "systemId")]
        system_id: i64,
    },
    Unsubscribed,
    /// Authoritative snapshot of the scope, sent on subscribe. Clients
    /// replace local state with this, never merge.
    InitialData {
        signatures: Vec<Value>,
        wormholes: Vec<Value>,
    },
    /// One committed mutation. Deletes carry `"deleted": true` inside `data`.
    Update {
        #[serde(rename = "type")]
        entity_type: EntityType,
        data: Value,
        timestamp: i64,
    },
    Pong {
        timestamp: i64,
    },
    Error {
        error: String,
    },
}
