//! Asynchronous client for the MVCP playback engine control protocol.
//!
//! This is the "just works" layer. Connect to an engine, submit commands,
//! and await each reply. Replies are matched to commands strictly in
//! submission order; failures land in a per-client error ledger.

pub mod client;
pub mod completion;
pub mod config;
pub mod correlator;
pub mod error;
pub mod handshake;
pub mod state;

pub use client::Client;
pub use completion::Completion;
pub use config::{ClientConfig, DisconnectedPolicy, DEFAULT_GOODBYE};
pub use correlator::{Correlator, ErrorKind, ErrorRecord, PendingCommand};
pub use error::{ClientError, Result};
pub use handshake::read_greeting;
pub use mvcp_frame::{Failure, Outcome, Response};
pub use mvcp_transport::{Connector, Endpoint};
pub use state::ConnectionState;
