use std::time::Duration;

use futures_util::StreamExt;
use mvcp_frame::{parse_status_line, ResponseCodec, STATUS_READY};
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tracing::debug;

use crate::error::{ClientError, Result};

/// Wait for the engine's `100` greeting on a fresh connection.
///
/// The greeting is not a reply to any command, so it must be consumed before
/// the reader starts feeding replies to the correlator. Returns the greeting
/// status line.
pub async fn read_greeting<R: AsyncRead + Unpin>(
    frames: &mut FramedRead<R, ResponseCodec>,
    timeout: Duration,
) -> Result<String> {
    let frame = match tokio::time::timeout(timeout, frames.next()).await {
        Err(_) => return Err(ClientError::Timeout(timeout)),
        Ok(None) => {
            return Err(ClientError::Handshake(
                "connection closed before greeting".to_string(),
            ))
        }
        Ok(Some(frame)) => frame?,
    };

    match parse_status_line(&frame.status_line) {
        Some((STATUS_READY, _)) => {
            debug!(greeting = %frame.status_line, "engine ready");
            Ok(frame.status_line)
        }
        _ => Err(ClientError::Handshake(format!(
            "unexpected greeting {:?}",
            frame.status_line
        ))),
    }
}
