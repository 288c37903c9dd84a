//! FIFO correlation of commands and replies.
//!
//! MVCP replies carry no request id, so arrival order is the only thing that
//! ties a reply to its command: the Nth reply read after a command was
//! written settles the Nth outstanding command. Every mutation here must be
//! serialized with the writes that put commands on the wire.

use std::collections::VecDeque;
use std::time::{Instant, SystemTime};

use mvcp_frame::{Failure, Outcome};
use serde::Serialize;
use tracing::{debug, warn};

use crate::completion::{Completion, Settlement};
use crate::error::ClientError;

/// Snapshot of one outstanding command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommand {
    /// Submission sequence number.
    pub seq: u64,
    /// Command text as submitted.
    pub command: String,
    /// When the command was queued.
    pub enqueued_at: Instant,
}

/// Category of a recorded failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// The engine replied with an error status (or an unparseable one).
    Protocol,
    /// The command was outstanding when its connection went away.
    Abandoned,
    /// The command was refused before reaching the wire.
    Rejected,
}

/// One entry of the error ledger.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    /// Submission sequence number of the failed command.
    pub seq: u64,
    /// Command text as submitted.
    pub command: String,
    pub kind: ErrorKind,
    /// Human-readable failure description.
    pub message: String,
    /// Status code for protocol failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    /// When the failure was recorded.
    pub at: SystemTime,
}

struct PendingEntry {
    seq: u64,
    command: String,
    settlement: Settlement,
    enqueued_at: Instant,
}

/// Pending queue plus error ledger.
///
/// The ledger is append-only for the lifetime of the correlator: exactly one
/// record per command that settles with a failure.
#[derive(Default)]
pub struct Correlator {
    pending: VecDeque<PendingEntry>,
    ledger: Vec<ErrorRecord>,
    next_seq: u64,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a command that has been (or is about to be) written.
    pub fn submit(&mut self, command: String) -> Completion {
        let seq = self.take_seq();
        let (settlement, completion) = Completion::new(seq);
        debug!(seq, %command, pending = self.pending.len() + 1, "command queued");
        self.pending.push_back(PendingEntry {
            seq,
            command,
            settlement,
            enqueued_at: Instant::now(),
        });
        completion
    }

    /// Settle a command immediately with `error`, without queuing it.
    pub fn reject(&mut self, command: String, error: ClientError) -> Completion {
        let seq = self.take_seq();
        let (settlement, completion) = Completion::new(seq);
        debug!(seq, %command, %error, "command rejected before send");
        self.record(seq, command, &error);
        let _ = settlement.send(Err(error));
        completion
    }

    /// Settle the oldest outstanding command with a reply.
    ///
    /// Returns `false` if nothing was outstanding; the reply is then logged
    /// and discarded.
    pub fn on_outcome(&mut self, outcome: Outcome) -> bool {
        let Some(entry) = self.pending.pop_front() else {
            warn!(?outcome, "reply with no outstanding command, discarding");
            return false;
        };

        let result = match outcome {
            Outcome::Success(response) => {
                debug!(seq = entry.seq, code = response.code, "command succeeded");
                Ok(response)
            }
            Outcome::Failure(failure) => {
                debug!(seq = entry.seq, %failure, "command failed");
                let error = ClientError::Protocol(failure);
                self.record(entry.seq, entry.command.clone(), &error);
                Err(error)
            }
        };
        // A dropped Completion still consumed its slot.
        let _ = entry.settlement.send(result);
        true
    }

    /// Fail every outstanding command with `reason`.
    ///
    /// Returns how many commands were abandoned.
    pub fn abandon_all(&mut self, reason: &str) -> usize {
        let count = self.pending.len();
        while let Some(entry) = self.pending.pop_front() {
            let error = ClientError::Abandoned(reason.to_string());
            self.record(entry.seq, entry.command, &error);
            let _ = entry.settlement.send(Err(error));
        }
        if count > 0 {
            debug!(count, reason, "abandoned outstanding commands");
        }
        count
    }

    /// Outstanding commands, oldest first.
    pub fn pending(&self) -> Vec<PendingCommand> {
        self.pending
            .iter()
            .map(|entry| PendingCommand {
                seq: entry.seq,
                command: entry.command.clone(),
                enqueued_at: entry.enqueued_at,
            })
            .collect()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Every failure recorded so far, oldest first.
    pub fn errors(&self) -> &[ErrorRecord] {
        &self.ledger
    }

    fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn record(&mut self, seq: u64, command: String, error: &ClientError) {
        let (kind, code) = match error {
            ClientError::Protocol(Failure { code, .. }) => (ErrorKind::Protocol, *code),
            ClientError::Abandoned(_) => (ErrorKind::Abandoned, None),
            _ => (ErrorKind::Rejected, None),
        };
        self.ledger.push(ErrorRecord {
            seq,
            command,
            kind,
            message: error.to_string(),
            code,
            at: SystemTime::now(),
        });
    }
}

impl std::fmt::Debug for Correlator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Correlator")
            .field("pending", &self.pending.len())
            .field("errors", &self.ledger.len())
            .field("next_seq", &self.next_seq)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use mvcp_frame::{classify, RawFrame, Response};

    use super::*;

    fn reply(status_line: &str, body: &[&str]) -> Outcome {
        classify(RawFrame {
            status_line: status_line.to_string(),
            body: body.iter().map(|line| line.to_string()).collect(),
        })
    }

    fn body(result: Option<Result<Response, ClientError>>) -> Vec<String> {
        result.expect("settled").expect("success").body
    }

    #[test]
    fn settles_in_submission_order() {
        let mut correlator = Correlator::new();
        let mut first = correlator.submit("usta u0".to_string());
        let mut second = correlator.submit("usta u1".to_string());
        let mut third = correlator.submit("uls".to_string());
        assert_eq!(correlator.pending_len(), 3);

        assert!(correlator.on_outcome(reply("202 OK", &["unit 0"])));
        assert!(first.try_result().is_some_and(|r| r.is_ok()));
        assert!(second.try_result().is_none());

        assert!(correlator.on_outcome(reply("202 OK", &["unit 1"])));
        assert!(correlator.on_outcome(reply("201 OK", &["U0", "U1"])));

        assert_eq!(body(second.try_result()), vec!["unit 1"]);
        assert_eq!(body(third.try_result()), vec!["U0", "U1"]);
        assert_eq!(correlator.pending_len(), 0);
    }

    #[test]
    fn failure_recorded_before_settling() {
        let mut correlator = Correlator::new();
        let mut completion = correlator.submit("no_such_command in my town".to_string());

        correlator.on_outcome(reply("400 Unknown command", &[]));

        let err = completion.try_result().unwrap().unwrap_err();
        assert!(matches!(&err, ClientError::Protocol(f) if f.code == Some(400)));

        let errors = correlator.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ErrorKind::Protocol);
        assert_eq!(errors[0].code, Some(400));
        assert_eq!(errors[0].command, "no_such_command in my town");
        assert_eq!(errors[0].seq, completion.seq());
    }

    #[test]
    fn malformed_reply_consumes_a_slot() {
        let mut correlator = Correlator::new();
        let mut garbled = correlator.submit("usta u0".to_string());
        let mut next = correlator.submit("play u0".to_string());

        correlator.on_outcome(reply("what?", &[]));
        correlator.on_outcome(reply("200 OK", &[]));

        assert!(garbled.try_result().unwrap().is_err());
        assert!(next.try_result().unwrap().is_ok());
        assert_eq!(correlator.errors()[0].code, None);
    }

    #[test]
    fn reply_without_pending_is_discarded() {
        let mut correlator = Correlator::new();
        assert!(!correlator.on_outcome(reply("200 OK", &[])));
        assert!(!correlator.on_outcome(reply("500 Server error", &[])));
        assert!(correlator.errors().is_empty());
    }

    #[test]
    fn abandon_all_settles_everything() {
        let mut correlator = Correlator::new();
        let mut completions: Vec<_> = (0..5)
            .map(|_| correlator.submit("usta u0".to_string()))
            .collect();

        assert_eq!(correlator.abandon_all("disconnected"), 5);
        assert_eq!(correlator.pending_len(), 0);
        for completion in &mut completions {
            let err = completion.try_result().unwrap().unwrap_err();
            assert!(matches!(err, ClientError::Abandoned(reason) if reason == "disconnected"));
        }
        assert_eq!(correlator.errors().len(), 5);
        assert!(correlator
            .errors()
            .iter()
            .all(|record| record.kind == ErrorKind::Abandoned));

        assert_eq!(correlator.abandon_all("disconnected"), 0);
        assert_eq!(correlator.errors().len(), 5);
    }

    #[test]
    fn reject_settles_immediately_and_records() {
        let mut correlator = Correlator::new();
        let mut completion = correlator.reject("play u0".to_string(), ClientError::NotConnected);

        assert!(matches!(
            completion.try_result(),
            Some(Err(ClientError::NotConnected))
        ));
        assert_eq!(correlator.pending_len(), 0);
        assert_eq!(correlator.errors()[0].kind, ErrorKind::Rejected);
    }

    #[test]
    fn dropped_completion_still_consumes_reply() {
        let mut correlator = Correlator::new();
        drop(correlator.submit("play u0".to_string()));
        let mut kept = correlator.submit("usta u0".to_string());

        correlator.on_outcome(reply("200 OK", &[]));
        assert!(kept.try_result().is_none());

        correlator.on_outcome(reply("202 OK", &["status"]));
        assert_eq!(body(kept.try_result()), vec!["status"]);
    }

    #[test]
    fn ledger_only_grows() {
        let mut correlator = Correlator::new();
        let mut last = 0;
        for round in 0..4 {
            correlator.submit(format!("bad {round}"));
            correlator.submit(format!("good {round}"));
            correlator.on_outcome(reply("400 Unknown command", &[]));
            correlator.submit(format!("lost {round}"));
            correlator.abandon_all("connection lost");

            let len = correlator.errors().len();
            assert!(len > last);
            last = len;
        }
        assert_eq!(last, 12);
    }

    #[test]
    fn pending_snapshot_in_order() {
        let mut correlator = Correlator::new();
        correlator.submit("load u0 a.mp4".to_string());
        correlator.submit("play u0".to_string());

        let pending = correlator.pending();
        let commands: Vec<_> = pending.iter().map(|p| p.command.as_str()).collect();
        assert_eq!(commands, ["load u0 a.mp4", "play u0"]);
        assert!(pending[0].seq < pending[1].seq);
        assert!(pending[0].enqueued_at <= pending[1].enqueued_at);
    }
}
