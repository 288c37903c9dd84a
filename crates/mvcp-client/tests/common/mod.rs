//! In-process mock MVCP engine on a loopback TCP listener.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mvcp_client::{ClientConfig, Endpoint};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct MockOptions {
    /// Greeting written on accept; `None` writes nothing.
    pub greeting: Option<String>,
    /// Write replies in pieces of this many bytes, flushing between pieces.
    pub chunk_size: Option<usize>,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self {
            greeting: Some("100 VTR Ready".to_string()),
            chunk_size: None,
        }
    }
}

enum Action {
    Reply(String),
    Silent,
    Close,
}

pub struct MockEngine {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<String>>>,
    connections: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl MockEngine {
    pub async fn start() -> Self {
        Self::start_with(MockOptions::default()).await
    }

    pub async fn start_with(options: MockOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        let task = tokio::spawn({
            let received = Arc::clone(&received);
            let connections = Arc::clone(&connections);
            async move {
                while let Ok((stream, _)) = listener.accept().await {
                    connections.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(serve(stream, options.clone(), Arc::clone(&received)));
                }
            }
        });

        Self {
            addr,
            received,
            connections,
            task,
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::tcp(self.addr.ip().to_string(), self.addr.port())
    }

    /// Every command line received so far, across all connections.
    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Poll until `count` command lines have arrived.
    pub async fn wait_for_received(&self, count: usize) -> Vec<String> {
        for _ in 0..200 {
            let received = self.received();
            if received.len() >= count {
                return received;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("engine saw {:?}, expected {count} lines", self.received());
    }
}

impl Drop for MockEngine {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub fn test_config() -> ClientConfig {
    ClientConfig {
        connect_timeout: Duration::from_secs(2),
        greeting_timeout: Duration::from_millis(500),
        shutdown_timeout: Duration::from_millis(500),
        ..ClientConfig::default()
    }
}

async fn serve(stream: TcpStream, options: MockOptions, received: Arc<Mutex<Vec<String>>>) {
    let (read, mut write) = stream.into_split();
    if let Some(greeting) = &options.greeting {
        if send(&mut write, &format!("{greeting}\r\n"), options.chunk_size)
            .await
            .is_err()
        {
            return;
        }
    }

    let mut lines = BufReader::new(read).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        received.lock().unwrap().push(line.clone());
        match respond(&line) {
            Action::Reply(reply) => {
                if send(&mut write, &reply, options.chunk_size).await.is_err() {
                    return;
                }
            }
            Action::Silent => {}
            Action::Close => return,
        }
    }
}

async fn send(
    write: &mut tokio::net::tcp::OwnedWriteHalf,
    reply: &str,
    chunk_size: Option<usize>,
) -> std::io::Result<()> {
    match chunk_size {
        None => write.write_all(reply.as_bytes()).await?,
        Some(size) => {
            for piece in reply.as_bytes().chunks(size.max(1)) {
                write.write_all(piece).await?;
                write.flush().await?;
                tokio::task::yield_now().await;
            }
        }
    }
    write.flush().await
}

fn respond(line: &str) -> Action {
    let mut words = line.splitn(2, ' ');
    let verb = words.next().unwrap_or_default().to_ascii_lowercase();
    let rest = words.next().unwrap_or_default();

    match verb.as_str() {
        "load" | "play" | "apnd" | "pause" | "stop" | "goto" | "clear" => {
            Action::Reply("200 OK\r\n".to_string())
        }
        "echo" => Action::Reply(format!("202 OK\r\n{rest}\r\n")),
        "usta" => Action::Reply(format!("202 OK\r\n{rest} playing \"clip.mp4\" 0 1000 25.00\r\n")),
        "list" | "uls" => Action::Reply("201 OK\r\nU0 00 avformat 1\r\nU1 00 avformat 1\r\n\r\n".to_string()),
        "fail" => Action::Reply(format!("{rest}\r\n")),
        "garble" => Action::Reply("what is this\r\n".to_string()),
        "hold" => Action::Silent,
        "crash" | "bye" => Action::Close,
        _ => Action::Reply("400 Unknown command\r\n".to_string()),
    }
}
