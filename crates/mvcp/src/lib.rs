//! Client for MVCP, the line-oriented control protocol of the Melted
//! playback engine.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP and Unix socket endpoints
//! - [`frame`]: reply framing and classification
//! - [`client`]: command correlation and connection lifecycle (behind `client` feature)

/// Re-export transport types.
pub mod transport {
    pub use mvcp_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use mvcp_frame::*;
}

/// Re-export client types (requires `client` feature).
#[cfg(feature = "client")]
pub mod client {
    pub use mvcp_client::*;
}

pub use mvcp_transport::Endpoint;

#[cfg(feature = "client")]
pub use mvcp_client::{Client, ClientConfig, ClientError, Completion, Response};
