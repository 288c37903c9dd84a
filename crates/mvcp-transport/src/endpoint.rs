use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::{Connector, EngineStream};

/// Default MVCP listener port.
pub const DEFAULT_PORT: u16 = 5250;

const UNIX_PREFIX: &str = "unix:";

/// Where the engine is listening.
///
/// Parsed from strings:
/// - `host:port` or `[v6addr]:port`
/// - `host` (port defaults to [`DEFAULT_PORT`])
/// - `unix:/path/to/socket`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// TCP host and port.
    Tcp { host: String, port: u16 },
    /// Filesystem-path Unix domain socket.
    Unix(PathBuf),
}

impl Endpoint {
    /// TCP endpoint.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Unix domain socket endpoint.
    pub fn unix(path: impl AsRef<Path>) -> Self {
        Self::Unix(path.as_ref().to_path_buf())
    }

    async fn open(&self) -> Result<EngineStream> {
        match self {
            Endpoint::Tcp { host, port } => {
                let stream = TcpStream::connect((host.as_str(), *port))
                    .await
                    .map_err(|e| TransportError::Connect {
                        endpoint: self.to_string(),
                        source: e,
                    })?;
                debug!(endpoint = %self, "connected over tcp");
                let stream = EngineStream::from_tcp(stream);
                stream.set_nodelay(true)?;
                Ok(stream)
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                let stream = tokio::net::UnixStream::connect(path).await.map_err(|e| {
                    TransportError::Connect {
                        endpoint: self.to_string(),
                        source: e,
                    }
                })?;
                debug!(?path, "connected to unix domain socket");
                Ok(EngineStream::from_unix(stream))
            }
            #[cfg(not(unix))]
            Endpoint::Unix(_) => Err(TransportError::Connect {
                endpoint: self.to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::Unsupported,
                    "unix domain sockets are not available on this platform",
                ),
            }),
        }
    }
}

impl Connector for Endpoint {
    type Stream = EngineStream;

    async fn connect(&self) -> Result<EngineStream> {
        self.open().await
    }

    fn describe(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { host, port } if host.contains(':') => write!(f, "[{host}]:{port}"),
            Endpoint::Tcp { host, port } => write!(f, "{host}:{port}"),
            Endpoint::Unix(path) => write!(f, "{UNIX_PREFIX}{}", path.display()),
        }
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let invalid = |reason: &str| TransportError::InvalidEndpoint {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        if trimmed.is_empty() {
            return Err(invalid("endpoint must not be empty"));
        }

        if let Some(path) = trimmed.strip_prefix(UNIX_PREFIX) {
            if path.is_empty() {
                return Err(invalid("unix socket path must not be empty"));
            }
            return Ok(Endpoint::unix(path));
        }

        // Bracketed IPv6 literal, optionally followed by a port.
        if let Some(rest) = trimmed.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| invalid("unterminated '[' in IPv6 address"))?;
            if host.is_empty() {
                return Err(invalid("host must not be empty"));
            }
            let port = match tail {
                "" => DEFAULT_PORT,
                tail => {
                    let port = tail
                        .strip_prefix(':')
                        .ok_or_else(|| invalid("expected ':' after ']'"))?;
                    parse_port(port)
                        .ok_or_else(|| invalid("port must be a number between 1 and 65535"))?
                }
            };
            return Ok(Endpoint::tcp(host, port));
        }

        match trimmed.split_once(':') {
            // Unbracketed IPv6 literal: no port can be expressed.
            Some((_, rest)) if rest.contains(':') => Ok(Endpoint::tcp(trimmed, DEFAULT_PORT)),
            Some((host, port)) => {
                if host.is_empty() {
                    return Err(invalid("host must not be empty"));
                }
                let port = parse_port(port)
                    .ok_or_else(|| invalid("port must be a number between 1 and 65535"))?;
                Ok(Endpoint::tcp(host, port))
            }
            None => Ok(Endpoint::tcp(trimmed, DEFAULT_PORT)),
        }
    }
}

fn parse_port(input: &str) -> Option<u16> {
    input.parse::<u16>().ok().filter(|port| *port != 0)
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[test]
    fn parses_host_and_port() {
        let endpoint: Endpoint = "engine.local:5260".parse().unwrap();
        assert_eq!(endpoint, Endpoint::tcp("engine.local", 5260));
    }

    #[test]
    fn bare_host_uses_default_port() {
        let endpoint: Endpoint = "localhost".parse().unwrap();
        assert_eq!(endpoint, Endpoint::tcp("localhost", DEFAULT_PORT));
    }

    #[test]
    fn parses_ipv6_forms() {
        assert_eq!(
            "[::1]:7000".parse::<Endpoint>().unwrap(),
            Endpoint::tcp("::1", 7000)
        );
        assert_eq!(
            "[::1]".parse::<Endpoint>().unwrap(),
            Endpoint::tcp("::1", DEFAULT_PORT)
        );
        assert_eq!(
            "fe80::1".parse::<Endpoint>().unwrap(),
            Endpoint::tcp("fe80::1", DEFAULT_PORT)
        );
    }

    #[test]
    fn parses_unix_path() {
        let endpoint: Endpoint = "unix:/run/melted.sock".parse().unwrap();
        assert_eq!(endpoint, Endpoint::unix("/run/melted.sock"));
        assert_eq!(endpoint.to_string(), "unix:/run/melted.sock");
    }

    #[test]
    fn rejects_bad_endpoints() {
        for input in ["", "   ", "host:", "host:0", "host:70000", ":5250", "unix:", "[::1"] {
            let err = input.parse::<Endpoint>().unwrap_err();
            assert!(
                matches!(err, TransportError::InvalidEndpoint { .. }),
                "{input:?} should be rejected"
            );
        }
    }

    #[test]
    fn display_round_trips_through_parse() {
        let endpoint = Endpoint::tcp("::1", 5250);
        assert_eq!(endpoint.to_string(), "[::1]:5250");
        assert_eq!(endpoint.to_string().parse::<Endpoint>().unwrap(), endpoint);
    }

    #[tokio::test]
    async fn connects_over_tcp() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 5];
            socket.read_exact(&mut buf).await.unwrap();
            buf
        });

        let mut stream = Endpoint::tcp("127.0.0.1", port).connect().await.unwrap();
        assert_eq!(stream.transport_name(), "tcp");
        stream.write_all(b"hello").await.unwrap();

        assert_eq!(&server.await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn refused_connection_reports_endpoint() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = Endpoint::tcp("127.0.0.1", port).connect().await.unwrap_err();
        match err {
            TransportError::Connect { endpoint, .. } => {
                assert_eq!(endpoint, format!("127.0.0.1:{port}"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn connects_over_unix_socket() {
        let dir = std::env::temp_dir().join(format!("mvcp-transport-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let sock_path = dir.join("engine.sock");
        let _ = std::fs::remove_file(&sock_path);
        let listener = tokio::net::UnixListener::bind(&sock_path).unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"100 VTR Ready\r\n").await.unwrap();
        });

        let mut stream = Endpoint::unix(&sock_path).connect().await.unwrap();
        assert_eq!(stream.transport_name(), "unix-domain-socket");
        let mut greeting = Vec::new();
        stream.read_to_end(&mut greeting).await.unwrap();
        assert_eq!(greeting, b"100 VTR Ready\r\n");

        server.await.unwrap();
        let _ = std::fs::remove_dir_all(&dir);
    }
}
