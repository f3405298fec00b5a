//! # sigtrack-client
//!
//! Client-side counterpart to the sigtrack server: a WebSocket client that
//! subscribes to one `(mask, system)` scope, keeps a local replica of the
//! scope's records, and reconnects with exponential backoff when the
//! transport drops. Every reconnect resubscribes and replaces the replica
//! with the server's fresh snapshot.

#![deny(unsafe_code)]

pub mod backoff;
pub mod client;
pub mod state;

pub use backoff::Backoff;
pub use client::{ClientConfig, ClientEvent, ReconnectingClient};
pub use state::{LocalCache, ReconnectState};
