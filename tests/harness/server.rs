//! Mock terminal server for scenario testing.
//!
//! Accepts Upgrade requests on a random port, admits at most `capacity`
//! concurrent sessions (503 beyond that) and answers every text frame with a
//! binary frame, the way a PTY bridge echoes output.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use wsprobe::codec::decode_one_frame;
use wsprobe::config::Limits;
use wsprobe::protocol::{Frame, OpCode, compute_accept_key};

const UNAVAILABLE: &[u8] = b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\n\r\n";

/// Counters updated by the server.
#[derive(Debug, Default)]
pub struct ServerStats {
    accepted: AtomicUsize,
    upgraded: AtomicUsize,
    rejected: AtomicUsize,
    active: AtomicUsize,
    frames: AtomicUsize,
}

impl ServerStats {
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn upgraded(&self) -> usize {
        self.upgraded.load(Ordering::SeqCst)
    }

    pub fn rejected(&self) -> usize {
        self.rejected.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn frames(&self) -> usize {
        self.frames.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
struct Options {
    capacity: usize,
    silent: bool,
    wrong_accept: bool,
}

/// Builder for [`TestServer`].
#[derive(Debug, Clone)]
pub struct TestServerBuilder {
    options: Options,
}

impl TestServerBuilder {
    /// Maximum concurrent upgraded sessions.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.options.capacity = capacity;
        self
    }

    /// Read requests but never answer.
    pub fn silent(mut self) -> Self {
        self.options.silent = true;
        self
    }

    /// Answer 101 with a bogus `Sec-WebSocket-Accept`.
    pub fn wrong_accept(mut self) -> Self {
        self.options.wrong_accept = true;
        self
    }

    pub async fn spawn(self) -> (TestServer, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stats = Arc::new(ServerStats::default());
        let shutdown = Arc::new(Notify::new());
        let slots = Arc::new(Semaphore::new(self.options.capacity));

        let handle = tokio::spawn(accept_loop(
            listener,
            self.options,
            Arc::clone(&stats),
            Arc::clone(&shutdown),
            slots,
        ));

        (
            TestServer {
                handle,
                stats,
                shutdown,
            },
            addr,
        )
    }
}

/// Running mock server.
pub struct TestServer {
    handle: JoinHandle<()>,
    stats: Arc<ServerStats>,
    shutdown: Arc<Notify>,
}

impl TestServer {
    pub fn builder() -> TestServerBuilder {
        TestServerBuilder {
            options: Options {
                capacity: 15,
                silent: false,
                wrong_accept: false,
            },
        }
    }

    /// Server with default options (15 slots, answering).
    pub async fn spawn() -> (Self, SocketAddr) {
        Self::builder().spawn().await
    }

    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    pub async fn shutdown(self) {
        self.shutdown.notify_one();
        let _ = self.handle.await;
    }
}

async fn accept_loop(
    listener: TcpListener,
    options: Options,
    stats: Arc<ServerStats>,
    shutdown: Arc<Notify>,
    slots: Arc<Semaphore>,
) {
    loop {
        tokio::select! {
            _ = shutdown.notified() => break,
            accepted = listener.accept() => {
                let Ok((stream, _)) = accepted else { continue };
                stats.accepted.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(
                    stream,
                    options.clone(),
                    Arc::clone(&stats),
                    Arc::clone(&slots),
                ));
            }
        }
    }
}

async fn read_request(stream: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 512];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 || buf.len() > 8192 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Some(String::from_utf8_lossy(&buf).into_owned())
}

fn header<'a>(request: &'a str, name: &str) -> Option<&'a str> {
    request.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim().eq_ignore_ascii_case(name).then(|| value.trim())
    })
}

async fn serve(
    mut stream: TcpStream,
    options: Options,
    stats: Arc<ServerStats>,
    slots: Arc<Semaphore>,
) {
    let Some(request) = read_request(&mut stream).await else {
        return;
    };

    if options.silent {
        // Hold the connection until the client goes away.
        let mut sink = [0u8; 256];
        while matches!(stream.read(&mut sink).await, Ok(n) if n > 0) {}
        return;
    }

    let Ok(permit) = slots.try_acquire_owned() else {
        stats.rejected.fetch_add(1, Ordering::SeqCst);
        let _ = stream.write_all(UNAVAILABLE).await;
        let _ = stream.shutdown().await;
        return;
    };

    let key = header(&request, "Sec-WebSocket-Key").unwrap_or_default();
    let accept = if options.wrong_accept {
        "AAAAAAAAAAAAAAAAAAAAAAAAAAA=".to_string()
    } else {
        compute_accept_key(key)
    };
    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept}\r\n\r\n"
    );
    if stream.write_all(response.as_bytes()).await.is_err() {
        return;
    }
    stats.upgraded.fetch_add(1, Ordering::SeqCst);
    stats.active.fetch_add(1, Ordering::SeqCst);

    let limits = Limits::default();
    while let Ok(frame) = decode_one_frame(&mut stream, &limits).await {
        match frame.opcode {
            OpCode::Text | OpCode::Binary => {
                stats.frames.fetch_add(1, Ordering::SeqCst);
                let mut output = b"$ ".to_vec();
                output.extend_from_slice(frame.payload());
                let reply = Frame::new(OpCode::Binary, output).encode();
                if stream.write_all(&reply).await.is_err() {
                    break;
                }
            }
            OpCode::Close => break,
            _ => {}
        }
    }

    stats.active.fetch_sub(1, Ordering::SeqCst);
    drop(permit);
}
