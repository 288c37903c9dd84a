use std::fmt;

use crate::codec::RawFrame;
use crate::status::is_success;

/// A successful reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status code (always below [`crate::ERROR_THRESHOLD`]).
    pub code: u16,
    /// Free text after the status code.
    pub reason: String,
    /// Body lines, empty for single-line replies.
    pub body: Vec<String>,
}

impl Response {
    /// Body lines joined with `\n`.
    pub fn body_text(&self) -> String {
        self.body.join("\n")
    }

    /// The status line as it appeared on the wire.
    pub fn status_line(&self) -> String {
        if self.reason.is_empty() {
            self.code.to_string()
        } else {
            format!("{} {}", self.code, self.reason)
        }
    }
}

/// A rejected reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Status code, or `None` if the status line could not be parsed.
    pub code: Option<u16>,
    /// Status code plus reason text, or a parse diagnostic.
    pub reason: String,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

/// Result of classifying one reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(Response),
    Failure(Failure),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}

/// Split a status line into its code and reason.
///
/// The code must be exactly three ASCII digits in `100..=599`.
pub fn parse_status_line(line: &str) -> Option<(u16, &str)> {
    let (token, reason) = match line.split_once(' ') {
        Some((token, reason)) => (token, reason.trim()),
        None => (line, ""),
    };
    if token.len() != 3 || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let code: u16 = token.parse().ok()?;
    (100..=599).contains(&code).then_some((code, reason))
}

/// Map a frame to its outcome.
///
/// Total: a frame whose status line cannot be parsed still yields a
/// [`Failure`], so it consumes exactly one pending slot.
pub fn classify(frame: RawFrame) -> Outcome {
    let RawFrame { status_line, body } = frame;
    match parse_status_line(&status_line) {
        Some((code, reason)) if is_success(code) => Outcome::Success(Response {
            code,
            reason: reason.to_string(),
            body,
        }),
        Some((code, _)) => Outcome::Failure(Failure {
            code: Some(code),
            reason: status_line.trim().to_string(),
        }),
        None => Outcome::Failure(Failure {
            code: None,
            reason: format!("malformed status line: {status_line:?}"),
        }),
    }
}
