//! JSON-lines transport over a Unix domain socket.
//!
//! Each line on the socket is one JSON message:
//!
//! ```text
//! -> {"id":1,"method":"GetChargeType","params":[]}
//! <- {"id":1,"result":"Long Life"}
//! <- {"id":2,"error":{"message":"no such method"}}
//! <- {"signal":"ModeReapplyPendingChanged","params":[true]}
//! ```
//!
//! Requests are answered by id, so several calls may be in flight at once.
//! A background task reads replies and signals; when the peer goes away every
//! pending call fails with [`Error::ConnectionLost`]. So does a message
//! longer than the transport's line limit, or a request whose write was cut
//! short, since the stream is out of step after either.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{ConnectionFailureReason, Error, Result};
use crate::transport::{Channel, Signal, Transport, Value};

/// Handshake call sent after connecting, with the target as only argument.
pub const OPEN_METHOD: &str = "open";

/// Default upper bound for one incoming message, in bytes.
pub const MAX_LINE_LEN: usize = 4 * 1024 * 1024;

const SIGNAL_CAPACITY: usize = 64;

#[derive(Serialize)]
struct Request<'a> {
    id: u64,
    method: &'a str,
    params: &'a [Value],
}

#[derive(Deserialize)]
struct Incoming {
    id: Option<u64>,
    result: Option<Value>,
    error: Option<RemoteError>,
    signal: Option<String>,
    #[serde(default)]
    params: Vec<Value>,
}

#[derive(Deserialize)]
struct RemoteError {
    message: String,
}

struct Pending {
    method: String,
    reply: oneshot::Sender<Result<Value>>,
}

type PendingMap = Arc<parking_lot::Mutex<HashMap<u64, Pending>>>;

/// Removes a pending request when the caller stops waiting for it.
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.id);
    }
}

/// Closes the channel if dropped while a request line is being written.
struct WriteGuard<'a> {
    open: &'a AtomicBool,
    pending: &'a PendingMap,
    armed: bool,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("Request write interrupted, closing channel");
            self.open.store(false, Ordering::SeqCst);
            fail_pending(self.pending, || {
                Error::ConnectionLost("request write was interrupted".to_string())
            });
        }
    }
}

/// Opens [`IpcChannel`]s on a Unix socket.
#[derive(Debug, Clone)]
pub struct IpcTransport {
    socket_path: PathBuf,
    handshake: bool,
    max_line_len: usize,
}

impl IpcTransport {
    /// Transport for the socket at `socket_path`.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            handshake: true,
            max_line_len: MAX_LINE_LEN,
        }
    }

    /// Limit incoming messages to `max_len` bytes (default [`MAX_LINE_LEN`]).
    #[must_use]
    pub fn max_line_length(mut self, max_len: usize) -> Self {
        self.max_line_len = max_len;
        self
    }

    /// Skip the [`OPEN_METHOD`] handshake; the target is then ignored.
    #[must_use]
    pub fn without_handshake(mut self) -> Self {
        self.handshake = false;
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

#[async_trait]
impl Transport for IpcTransport {
    async fn open(&self, target: &str) -> Result<Arc<dyn Channel>> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| Error::connection_failed(target, failure_reason(&e)))?;
        debug!("Connected to socket {}", self.socket_path.display());

        let channel = Arc::new(IpcChannel::spawn(stream, self.max_line_len));
        if self.handshake {
            let rejected = match channel.call(OPEN_METHOD, &[json!(target)]).await {
                Ok(Value::Bool(false)) => Some("peer refused the target".to_string()),
                Ok(_) => None,
                Err(e) => Some(e.to_string()),
            };
            if let Some(reason) = rejected {
                if let Err(e) = channel.close().await {
                    debug!("Closing rejected channel failed: {}", e);
                }
                return Err(Error::connection_failed(
                    target,
                    ConnectionFailureReason::Rejected(reason),
                ));
            }
        }
        Ok(channel as Arc<dyn Channel>)
    }
}

fn failure_reason(err: &io::Error) -> ConnectionFailureReason {
    match err.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused => {
            ConnectionFailureReason::Unreachable
        }
        io::ErrorKind::PermissionDenied => {
            ConnectionFailureReason::Rejected("permission denied".to_string())
        }
        _ => ConnectionFailureReason::Other(err.to_string()),
    }
}

/// One socket connection.
pub struct IpcChannel {
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    pending: PendingMap,
    next_id: AtomicU64,
    open: Arc<AtomicBool>,
    signals: broadcast::Sender<Signal>,
    reader: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl IpcChannel {
    /// Wrap a connected stream and start reading from it. Incoming messages
    /// longer than `max_line_len` bytes end the connection.
    pub fn spawn(stream: UnixStream, max_line_len: usize) -> Self {
        let (read_half, write_half) = stream.into_split();
        let pending: PendingMap = Arc::default();
        let open = Arc::new(AtomicBool::new(true));
        let (signals, _) = broadcast::channel(SIGNAL_CAPACITY);

        let reader = tokio::spawn(read_loop(
            read_half,
            Arc::clone(&pending),
            Arc::clone(&open),
            signals.clone(),
            max_line_len,
        ));

        Self {
            writer: tokio::sync::Mutex::new(Some(write_half)),
            pending,
            next_id: AtomicU64::new(1),
            open,
            signals,
            reader: parking_lot::Mutex::new(Some(reader)),
        }
    }
}

#[async_trait]
impl Channel for IpcChannel {
    async fn call(&self, method: &str, args: &[Value]) -> Result<Value> {
        if !self.is_open() {
            return Err(Error::NotConnected);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply, response) = oneshot::channel();
        self.pending.lock().insert(
            id,
            Pending {
                method: method.to_string(),
                reply,
            },
        );
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
        };
        // The reader may have finished draining between the check and insert
        if !self.is_open() {
            return Err(Error::ConnectionLost("connection closed".to_string()));
        }

        let mut line = serde_json::to_vec(&Request {
            id,
            method,
            params: args,
        })?;
        line.push(b'\n');

        {
            let mut writer = self.writer.lock().await;
            let Some(writer) = writer.as_mut() else {
                return Err(Error::NotConnected);
            };
            let mut guard = WriteGuard {
                open: self.open.as_ref(),
                pending: &self.pending,
                armed: true,
            };
            let written = writer.write_all(&line).await;
            guard.armed = false;
            if let Err(e) = written {
                self.open.store(false, Ordering::SeqCst);
                return Err(Error::ConnectionLost(e.to_string()));
            }
        }

        match response.await {
            Ok(result) => result,
            Err(_) => Err(Error::ConnectionLost(
                "connection closed before reply".to_string(),
            )),
        }
    }

    async fn close(&self) -> Result<()> {
        self.open.store(false, Ordering::SeqCst);
        let writer = self.writer.lock().await.take();
        let result = match writer {
            Some(mut writer) => match writer.shutdown().await {
                Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(Error::Io(e)),
                _ => Ok(()),
            },
            None => Ok(()),
        };
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
        fail_pending(&self.pending, || Error::NotConnected);
        result
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn signals(&self) -> Option<broadcast::Receiver<Signal>> {
        Some(self.signals.subscribe())
    }
}

impl Drop for IpcChannel {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
    }
}

impl std::fmt::Debug for IpcChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpcChannel")
            .field("open", &self.is_open())
            .field("pending", &self.pending.lock().len())
            .finish()
    }
}

async fn read_loop(
    reader: OwnedReadHalf,
    pending: PendingMap,
    open: Arc<AtomicBool>,
    signals: broadcast::Sender<Signal>,
    max_line_len: usize,
) {
    let mut reader = BufReader::new(reader);
    let mut frame = Vec::new();
    let reason = loop {
        match read_frame(&mut reader, &mut frame, max_line_len).await {
            Ok(true) if frame.iter().all(u8::is_ascii_whitespace) => continue,
            Ok(true) => route(&frame, &pending, &signals),
            Ok(false) => break "peer closed the connection".to_string(),
            Err(e) => break e.to_string(),
        }
    };

    debug!("Socket reader finished: {}", reason);
    open.store(false, Ordering::SeqCst);
    fail_pending(&pending, || Error::ConnectionLost(reason.clone()));
}

/// Read one newline-terminated frame into `buf`, without the newline.
///
/// Returns `Ok(false)` at end of stream. A frame longer than `max_len` bytes
/// fails with [`io::ErrorKind::InvalidData`] before it is buffered.
async fn read_frame<R>(reader: &mut R, buf: &mut Vec<u8>, max_len: usize) -> io::Result<bool>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    loop {
        let (used, done) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(!buf.is_empty());
            }
            let (chunk, done) = match available.iter().position(|&b| b == b'\n') {
                Some(end) => (&available[..end], true),
                None => (available, false),
            };
            if buf.len() + chunk.len() > max_len {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("message exceeds {} bytes", max_len),
                ));
            }
            buf.extend_from_slice(chunk);
            (chunk.len() + usize::from(done), done)
        };
        reader.consume(used);
        if done {
            return Ok(true);
        }
    }
}

fn route(line: &[u8], pending: &PendingMap, signals: &broadcast::Sender<Signal>) {
    let message: Incoming = match serde_json::from_slice(line) {
        Ok(message) => message,
        Err(e) => {
            warn!("Ignoring malformed message: {}", e);
            return;
        }
    };

    if let Some(name) = message.signal {
        // No receivers is fine: nothing is buffered
        let _ = signals.send(Signal::new(name, message.params));
        return;
    }

    let Some(id) = message.id else {
        debug!("Ignoring message with neither id nor signal");
        return;
    };
    let Some(waiter) = pending.lock().remove(&id) else {
        debug!("Reply for unknown request {}", id);
        return;
    };

    let result = match message.error {
        Some(error) => Err(Error::call(waiter.method, error.message)),
        None => Ok(message.result.unwrap_or(Value::Null)),
    };
    let _ = waiter.reply.send(result);
}

fn fail_pending(pending: &PendingMap, error: impl Fn() -> Error) {
    let waiters: Vec<Pending> = pending.lock().drain().map(|(_, p)| p).collect();
    for waiter in waiters {
        let _ = waiter.reply.send(Err(error()));
    }
}
