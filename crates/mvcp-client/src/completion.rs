use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::future::FusedFuture;
use mvcp_frame::Response;
use tokio::sync::oneshot;

use crate::error::{ClientError, Result};

pub(crate) type Settlement = oneshot::Sender<Result<Response>>;

/// The pending result of one submitted command.
///
/// Settled exactly once with the engine's reply, a rejection, or an
/// abandonment. Await it, or poll it with [`Completion::try_result`].
/// Once the result has been taken the future is terminated: further polls
/// return `Poll::Pending` and [`FusedFuture::is_terminated`] is true.
/// Dropping a `Completion` does not cancel the command; its reply still
/// consumes the command's slot.
#[derive(Debug)]
pub struct Completion {
    seq: u64,
    rx: Option<oneshot::Receiver<Result<Response>>>,
}

impl Completion {
    pub(crate) fn new(seq: u64) -> (Settlement, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { seq, rx: Some(rx) })
    }

    /// Submission sequence number of the command.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Take the result if the command has been settled.
    ///
    /// Returns `None` while the command is outstanding, and after the result
    /// has been taken once.
    pub fn try_result(&mut self) -> Option<Result<Response>> {
        let rx = self.rx.as_mut()?;
        let result = match rx.try_recv() {
            Ok(result) => result,
            Err(oneshot::error::TryRecvError::Empty) => return None,
            Err(oneshot::error::TryRecvError::Closed) => Err(dropped()),
        };
        self.rx = None;
        Some(result)
    }

    /// True once the result has been taken.
    pub fn is_consumed(&self) -> bool {
        self.rx.is_none()
    }
}

impl Future for Completion {
    type Output = Result<Response>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Some(rx) = self.rx.as_mut() else {
            return Poll::Pending;
        };
        let result = match Pin::new(rx).poll(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(Ok(result)) => result,
            Poll::Ready(Err(_)) => Err(dropped()),
        };
        self.rx = None;
        Poll::Ready(result)
    }
}

impl FusedFuture for Completion {
    fn is_terminated(&self) -> bool {
        self.rx.is_none()
    }
}

// The sender only disappears without sending when the client state itself
// is dropped.
fn dropped() -> ClientError {
    ClientError::Abandoned("client dropped".to_string())
}
