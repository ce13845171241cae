//! Wire types for the OwnMon backend.
//!
//! This crate is shared by every client of the activity backend to prevent
//! schema drift. It covers two surfaces:
//!
//! - [`envelope`]: the push-style streaming channel (`/ws`), a closed set of
//!   message kinds decoded strictly at the boundary.
//! - [`api`]: request parameters and response bodies of the companion HTTP
//!   endpoints.

pub mod api;
pub mod envelope;

pub use api::*;
pub use envelope::{
    decode_envelope, ActiveMedia, ActiveSession, DecodeError, Envelope, MediaSignal, Message,
    MessageKind, RunningCounters, SessionChange, Snapshot,
};

/// Default backend host used when no configuration is supplied.
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Default backend port used when no configuration is supplied.
pub const DEFAULT_PORT: u16 = 13234;
/// Path of the streaming endpoint on the backend.
pub const STREAM_PATH: &str = "/ws";
