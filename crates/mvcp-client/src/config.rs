use std::time::Duration;

use mvcp_frame::FrameConfig;

/// Command sent to the engine before closing a connection on purpose.
pub const DEFAULT_GOODBYE: &str = "BYE";

/// What `submit` does with a command while the client is not connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisconnectedPolicy {
    /// Settle the command immediately with [`crate::ClientError::NotConnected`].
    #[default]
    Reject,
    /// Keep the command pending and write it first on the next successful
    /// connect, in submission order.
    Buffer,
}

/// Configuration for a [`crate::Client`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Timeout for opening the transport.
    pub connect_timeout: Duration,
    /// Timeout for the engine greeting after the transport opens.
    pub greeting_timeout: Duration,
    /// How long `disconnect` waits for queued writes to drain.
    pub shutdown_timeout: Duration,
    /// Require a `100` greeting before the connection is usable.
    pub expect_greeting: bool,
    /// Command written on `disconnect`, not correlated with any reply.
    pub goodbye: Option<String>,
    /// Handling of commands submitted while disconnected.
    pub disconnected_policy: DisconnectedPolicy,
    /// Reply framing limits.
    pub frame: FrameConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            greeting_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(2),
            expect_greeting: true,
            goodbye: Some(DEFAULT_GOODBYE.to_string()),
            disconnected_policy: DisconnectedPolicy::default(),
            frame: FrameConfig::default(),
        }
    }
}
