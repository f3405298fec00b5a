//! # sigtrack-core
//!
//! Domain types shared between the sigtrack server and client:
//!
//! - `ScopeKey` — the `(mask, system)` pair identifying one broadcast and
//!   cache audience, with its canonical string form and cache tags
//! - `Signature` / `Wormhole` — the annotation records being distributed
//! - `MutationEvent` — one committed write, ready for fan-out
//! - `ClientFrame` / `ServerFrame` — the JSON wire envelopes

#![deny(unsafe_code)]

pub mod entity;
pub mod event;
pub mod protocol;
pub mod scope;

pub use entity::{EntityType, Signature, Wormhole};
pub use event::MutationEvent;
pub use protocol::{ClientFrame, ServerFrame};
pub use scope::ScopeKey;
