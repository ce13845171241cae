//! # ownmon-live
//!
//! Real-time state synchronization for OwnMon dashboard clients: one
//! streaming connection to the activity backend, fanned out to any number of
//! independent views.
//!
//! ## Design Principles
//!
//! - **Single-threaded core**: the hub, connection state machine and reducers
//!   are `!Send` and live on the rendering thread. Only socket I/O runs in a
//!   spawned task, talking back over a channel.
//! - **Sans-IO where possible**: the connection state machine and reducers
//!   take the current time as an argument, so they are tested without sockets
//!   or sleeps.
//! - **Errors stay local**: dropped connections reconnect on a fixed delay,
//!   bad frames are logged and skipped, a panicking observer is isolated.
//! - **No globals**: the composing scope constructs and owns the client.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ownmon_live::{load_config, LiveClient};
//!
//! let config = load_config(None)?;
//! let mut client = LiveClient::new(&config)?;
//! let _subscription = client.subscribe(|envelope| println!("{}", envelope.kind()));
//! client.connect();
//! client.run().await;
//! ```

// Public modules
pub mod api;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod format;
pub mod hub;
pub mod reducers;
pub mod tls;
pub mod transport;

// Re-export commonly used items at crate root
pub use api::ApiClient;
pub use client::LiveClient;
pub use config::*;
pub use connection::{ConnectionManager, ConnectionStatus, Connector, TransportEvent};
pub use error::{LiveError, Result};
pub use format::*;
pub use hub::{Hub, Subscription, SubscriptionId};
pub use reducers::*;
pub use transport::WsConnector;
