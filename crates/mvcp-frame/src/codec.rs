use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::classify::parse_status_line;
use crate::error::{FrameError, Result};
use crate::status::BodyShape;

/// Line terminator appended to every outgoing command.
pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// Default maximum length of a single line: 64 KiB.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

/// Default maximum number of body lines in one reply.
pub const DEFAULT_MAX_BODY_LINES: usize = 64 * 1024;

/// One complete reply, as delimited on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// First line of the reply, without its terminator.
    pub status_line: String,
    /// Body lines, without terminators. The empty line closing a `201` body
    /// is not included.
    pub body: Vec<String>,
}

impl RawFrame {
    /// Create a frame with no body.
    pub fn status(status_line: impl Into<String>) -> Self {
        Self {
            status_line: status_line.into(),
            body: Vec::new(),
        }
    }
}

/// Configuration for response framing.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum line length in bytes. Default: 64 KiB.
    pub max_line_length: usize,
    /// Maximum number of body lines per reply. Default: 65 536.
    pub max_body_lines: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            max_body_lines: DEFAULT_MAX_BODY_LINES,
        }
    }
}

/// Reject commands that would occupy more than one wire line.
pub fn validate_command(command: &str) -> Result<()> {
    if command.contains(['\r', '\n']) {
        return Err(FrameError::MultiLineCommand);
    }
    Ok(())
}

/// Encode a command line into the wire format (`command\r\n`).
pub fn encode_command(command: &str, dst: &mut BytesMut) -> Result<()> {
    validate_command(command)?;
    dst.reserve(command.len() + LINE_TERMINATOR.len());
    dst.put_slice(command.as_bytes());
    dst.put_slice(LINE_TERMINATOR);
    Ok(())
}

/// Incremental reply decoder.
///
/// Complete lines are taken off the buffer as soon as they arrive and held
/// here until their reply is whole, so every byte is scanned once no matter
/// how the stream is chunked. A line still waiting for its `\n` stays in the
/// buffer; `scanned` remembers how much of it was already searched.
#[derive(Debug, Clone, Default)]
pub struct FrameDecoder {
    config: FrameConfig,
    scanned: usize,
    partial: Option<PartialFrame>,
}

#[derive(Debug, Clone)]
struct PartialFrame {
    status_line: String,
    /// `false` for a `202` reply (exactly one body line).
    until_blank: bool,
    body: Vec<String>,
    /// Wire bytes already taken off the buffer for this reply.
    consumed: usize,
}

impl PartialFrame {
    fn finish(self) -> RawFrame {
        RawFrame {
            status_line: self.status_line,
            body: self.body,
        }
    }
}

impl FrameDecoder {
    pub fn new(config: FrameConfig) -> Self {
        Self {
            config,
            scanned: 0,
            partial: None,
        }
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    /// Decode the next complete reply.
    ///
    /// Returns `Ok(None)` when `src` holds no complete reply yet. Empty lines
    /// ahead of a status line are consumed and ignored.
    pub fn decode(&mut self, src: &mut BytesMut) -> Result<Option<RawFrame>> {
        loop {
            let Some((line, len)) = self.take_line(src)? else {
                return Ok(None);
            };

            let Some(mut partial) = self.partial.take() else {
                if line.is_empty() {
                    continue;
                }
                let code = parse_status_line(&line).map(|(code, _)| code);
                let until_blank = match BodyShape::for_code(code) {
                    BodyShape::None => return Ok(Some(RawFrame::status(line))),
                    BodyShape::Single => false,
                    BodyShape::UntilBlank => true,
                };
                self.partial = Some(PartialFrame {
                    status_line: line,
                    until_blank,
                    body: Vec::new(),
                    consumed: len,
                });
                continue;
            };

            partial.consumed += len;
            if !partial.until_blank {
                partial.body.push(line);
                return Ok(Some(partial.finish()));
            }
            if line.is_empty() {
                return Ok(Some(partial.finish()));
            }
            if partial.body.len() == self.config.max_body_lines {
                return Err(FrameError::BodyTooLong {
                    lines: partial.body.len() + 1,
                    max: self.config.max_body_lines,
                });
            }
            partial.body.push(line);
            self.partial = Some(partial);
        }
    }

    /// Forget any partially decoded reply.
    ///
    /// Returns how many wire bytes of it had already been consumed from the
    /// buffer.
    pub fn reset(&mut self) -> usize {
        self.scanned = 0;
        self.partial.take().map_or(0, |partial| partial.consumed)
    }

    /// True while a reply has started but is not complete.
    pub fn in_progress(&self) -> bool {
        self.partial.is_some()
    }

    /// Take one terminated line off the front of `src`. Returns the text
    /// (terminator and a trailing `\r` stripped) and its wire length.
    fn take_line(&mut self, src: &mut BytesMut) -> Result<Option<(String, usize)>> {
        let max = self.config.max_line_length;
        let from = self.scanned.min(src.len());
        let Some(offset) = src[from..].iter().position(|b| *b == b'\n') else {
            self.scanned = src.len();
            // A trailing '\r' may still turn out to be part of the terminator.
            let size = src.len() - usize::from(src.ends_with(b"\r"));
            if size > max {
                return Err(FrameError::LineTooLong { size, max });
            }
            return Ok(None); // Need more data
        };

        let wire = src.split_to(from + offset + 1);
        self.scanned = 0;
        let mut line = &wire[..wire.len() - 1];
        if let Some(stripped) = line.strip_suffix(b"\r") {
            line = stripped;
        }
        if line.len() > max {
            return Err(FrameError::LineTooLong {
                size: line.len(),
                max,
            });
        }
        Ok(Some((String::from_utf8_lossy(line).into_owned(), wire.len())))
    }
}

/// `tokio_util` codec for a live MVCP connection.
///
/// Decodes replies into [`RawFrame`]s and encodes command lines.
#[derive(Debug, Clone, Default)]
pub struct ResponseCodec {
    decoder: FrameDecoder,
}

impl ResponseCodec {
    pub fn new(config: FrameConfig) -> Self {
        Self {
            decoder: FrameDecoder::new(config),
        }
    }

    pub fn config(&self) -> &FrameConfig {
        self.decoder.config()
    }
}

impl Decoder for ResponseCodec {
    type Item = RawFrame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<RawFrame>> {
        self.decoder.decode(src)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<RawFrame>> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        let dropped = self.decoder.reset() + src.len();
        if dropped > 0 {
            // Cannot be attributed to any pending command.
            debug!(bytes = dropped, "discarding unterminated reply at end of stream");
            src.clear();
        }
        Ok(None)
    }
}

impl Encoder<&str> for ResponseCodec {
    type Error = FrameError;

    fn encode(&mut self, command: &str, dst: &mut BytesMut) -> Result<()> {
        encode_command(command, dst)
    }
}

impl Encoder<String> for ResponseCodec {
    type Error = FrameError;

    fn encode(&mut self, command: String, dst: &mut BytesMut) -> Result<()> {
        encode_command(&command, dst)
    }
}
