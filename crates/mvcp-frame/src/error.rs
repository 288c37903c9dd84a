/// Errors that can occur during response framing.
///
/// Every variant is fatal to the connection it was raised on: once framing
/// fails, later bytes can no longer be attributed to pending commands.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A single line exceeded the configured maximum length.
    #[error("line too long ({size} bytes, max {max})")]
    LineTooLong { size: usize, max: usize },

    /// A multi-line body exceeded the configured maximum line count.
    #[error("response body too long ({lines} lines, max {max})")]
    BodyTooLong { lines: usize, max: usize },

    /// An outgoing command would span more than one wire line.
    #[error("command must be a single line without CR or LF")]
    MultiLineCommand,

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
