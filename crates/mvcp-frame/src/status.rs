//! Well-known MVCP status codes.
//!
//! Codes below [`ERROR_THRESHOLD`] report success; 4xx codes report a
//! rejected command and 5xx codes an engine-side failure.

/// Greeting sent by the engine when a connection is accepted.
pub const STATUS_READY: u16 = 100;

/// Command accepted, no body.
pub const STATUS_OK: u16 = 200;

/// Command accepted, multi-line body terminated by an empty line.
pub const STATUS_MULTI_LINE: u16 = 201;

/// Command accepted, exactly one body line.
pub const STATUS_SINGLE_LINE: u16 = 202;

/// First status code that reports a failure.
pub const ERROR_THRESHOLD: u16 = 400;

/// The engine does not recognise the command.
pub const STATUS_UNKNOWN_COMMAND: u16 = 400;

/// Generic engine-side failure.
pub const STATUS_SERVER_ERROR: u16 = 500;

/// How many body lines follow a status line with this code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyShape {
    /// Status line only.
    None,
    /// Exactly one body line.
    Single,
    /// Body lines up to an empty line.
    UntilBlank,
}

impl BodyShape {
    /// Body shape for a (possibly unparseable) status code.
    pub fn for_code(code: Option<u16>) -> Self {
        match code {
            Some(STATUS_MULTI_LINE) => BodyShape::UntilBlank,
            Some(STATUS_SINGLE_LINE) => BodyShape::Single,
            _ => BodyShape::None,
        }
    }
}

/// Returns true if the code reports success.
pub fn is_success(code: u16) -> bool {
    code < ERROR_THRESHOLD
}
