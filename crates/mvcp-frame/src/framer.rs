use bytes::BytesMut;
use tracing::debug;

use crate::codec::{FrameConfig, FrameDecoder, RawFrame};
use crate::error::Result;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Reassembles complete replies from arbitrarily chunked bytes.
///
/// Handles partial input internally; callers always get complete frames,
/// each exactly once. One framer serves one connection; build a new one (or
/// call [`StreamFramer::reset`]) when reconnecting.
#[derive(Debug)]
pub struct StreamFramer {
    buf: BytesMut,
    decoder: FrameDecoder,
}

impl StreamFramer {
    /// Create a new framer with default configuration.
    pub fn new() -> Self {
        Self::with_config(FrameConfig::default())
    }

    /// Create a new framer with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            decoder: FrameDecoder::new(config),
        }
    }

    /// Append bytes and return every frame they complete.
    ///
    /// An error leaves the framer unusable for the current connection.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<RawFrame>> {
        self.buf.extend_from_slice(bytes);
        let mut frames = Vec::new();
        while let Some(frame) = self.decoder.decode(&mut self.buf)? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// End of stream: discard any unterminated reply.
    ///
    /// Returns the number of bytes dropped.
    pub fn finish(&mut self) -> usize {
        let dropped = self.decoder.reset() + self.buf.len();
        if dropped > 0 {
            debug!(bytes = dropped, "discarding unterminated reply at end of stream");
        }
        self.buf.clear();
        dropped
    }

    /// Forget all buffered bytes.
    pub fn reset(&mut self) {
        self.decoder.reset();
        self.buf.clear();
    }

    /// Bytes not yet consumed by a completed frame.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// True while a reply has started but is not complete.
    pub fn in_progress(&self) -> bool {
        self.decoder.in_progress() || !self.buf.is_empty()
    }

    /// Current framer configuration.
    pub fn config(&self) -> &FrameConfig {
        self.decoder.config()
    }
}

impl Default for StreamFramer {
    fn default() -> Self {
        Self::new()
    }
}
