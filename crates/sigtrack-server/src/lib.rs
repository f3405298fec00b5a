//! # sigtrack-server
//!
//! Real-time update distribution for the sigtrack map:
//!
//! - Connection registry owning every WebSocket client (arena + index)
//! - Subscription index mapping scope keys to their audience
//! - Broadcast dispatcher fanning committed mutations out per scope
//! - Mutation publisher enforcing invalidate-then-dispatch ordering
//! - Axum WebSocket gateway with per-connection liveness monitoring
//! - Graceful shutdown via `tokio::signal` + `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod dispatch;
pub mod gateway;
pub mod health;
pub mod heartbeat;
pub mod index;
pub mod publish;
pub mod registry;
pub mod shutdown;
pub mod store;
