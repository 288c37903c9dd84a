//! Stream transport for MVCP clients.
//!
//! Provides the connected byte stream the rest of the client runs on:
//! - TCP (the engine's native listener, port 5250 by default)
//! - Unix domain sockets (local proxies and test rigs)
//!
//! This is the lowest layer of mvcp. Everything else builds on top of the
//! [`Connector`] trait and the [`EngineStream`] it produces for [`Endpoint`].

pub mod endpoint;
pub mod error;
pub mod traits;

pub use endpoint::{Endpoint, DEFAULT_PORT};
pub use error::{Result, TransportError};
pub use traits::{Connector, EngineStream};
