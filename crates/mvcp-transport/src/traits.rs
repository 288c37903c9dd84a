use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

use crate::error::Result;

/// Opens a fresh byte stream to the engine.
///
/// The client calls [`Connector::connect`] once per connection cycle, so an
/// implementation must be able to connect any number of times.
pub trait Connector: Send + Sync + 'static {
    /// The connected stream type.
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Open a new connection.
    fn connect(&self) -> impl Future<Output = Result<Self::Stream>> + Send;

    /// Human-readable target for logs and error messages.
    fn describe(&self) -> String;
}

/// A connected engine stream, implementing `AsyncRead + AsyncWrite`.
///
/// This is the stream type produced by [`crate::Endpoint`].
pub struct EngineStream {
    inner: EngineStreamInner,
}

enum EngineStreamInner {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(tokio::net::UnixStream),
}

impl EngineStream {
    pub(crate) fn from_tcp(stream: TcpStream) -> Self {
        Self {
            inner: EngineStreamInner::Tcp(stream),
        }
    }

    #[cfg(unix)]
    pub(crate) fn from_unix(stream: tokio::net::UnixStream) -> Self {
        Self {
            inner: EngineStreamInner::Unix(stream),
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            EngineStreamInner::Tcp(_) => "tcp",
            #[cfg(unix)]
            EngineStreamInner::Unix(_) => "unix-domain-socket",
        }
    }

    /// Disable Nagle's algorithm on TCP streams. No-op for other transports.
    ///
    /// Commands are short lines and every one of them is awaited by a caller,
    /// so batching them at the socket layer only adds latency.
    pub fn set_nodelay(&self, nodelay: bool) -> Result<()> {
        match &self.inner {
            EngineStreamInner::Tcp(stream) => stream.set_nodelay(nodelay).map_err(Into::into),
            #[cfg(unix)]
            EngineStreamInner::Unix(_) => Ok(()),
        }
    }
}

impl AsyncRead for EngineStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            EngineStreamInner::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            #[cfg(unix)]
            EngineStreamInner::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for EngineStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut self.get_mut().inner {
            EngineStreamInner::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            #[cfg(unix)]
            EngineStreamInner::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            EngineStreamInner::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            #[cfg(unix)]
            EngineStreamInner::Unix(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            EngineStreamInner::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            #[cfg(unix)]
            EngineStreamInner::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

impl std::fmt::Debug for EngineStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineStream")
            .field("type", &self.transport_name())
            .finish()
    }
}
