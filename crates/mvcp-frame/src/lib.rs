//! Response framing and status classification for the MVCP text protocol.
//!
//! MVCP replies carry no request id. Every command gets exactly one reply,
//! and a reply is one of:
//! - a single status line `<code> <reason>`
//! - `202 <reason>` followed by exactly one body line
//! - `201 <reason>` followed by body lines and a terminating empty line
//!
//! Lines end in `\r\n` (a bare `\n` is tolerated). This crate turns an
//! arbitrarily chunked byte stream into [`RawFrame`]s and classifies each one
//! into an [`Outcome`].

pub mod classify;
pub mod codec;
pub mod error;
pub mod framer;
pub mod status;

pub use classify::{classify, parse_status_line, Failure, Outcome, Response};
pub use codec::{
    encode_command, validate_command, FrameConfig, FrameDecoder, RawFrame, ResponseCodec,
    DEFAULT_MAX_BODY_LINES, DEFAULT_MAX_LINE_LENGTH, LINE_TERMINATOR,
};
pub use error::{FrameError, Result};
pub use framer::StreamFramer;
pub use status::{
    ERROR_THRESHOLD, STATUS_MULTI_LINE, STATUS_OK, STATUS_READY, STATUS_SERVER_ERROR,
    STATUS_SINGLE_LINE, STATUS_UNKNOWN_COMMAND,
};
