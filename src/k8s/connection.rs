//! A live port-forward connection
//!
//! Wraps one data stream, the task draining its paired error stream, and the
//! session that owns both. Reads and writes honour optional deadlines, and
//! [`PortForwardConnection::close`] unblocks any read or write still in
//! flight.

use std::fmt;
use std::io;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::portforward::{MultiplexedSession, PortForwardStream, TunnelDescriptor};
use crate::errors::TransportError;

/// Network name reported for tunnel addresses
pub const NETWORK: &str = "portforward";

/// How long `close` waits for the pod to finish its error stream
pub const ERROR_STREAM_GRACE: Duration = Duration::from_millis(250);

/// Synthetic address of either end of a tunnel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortForwardAddr {
    /// The local end has no meaningful address
    Local,
    Remote(TunnelDescriptor),
}

impl fmt::Display for PortForwardAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortForwardAddr::Local => write!(f, "localhost:0"),
            PortForwardAddr::Remote(target) => write!(f, "{}", target),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Deadlines {
    read: Option<Instant>,
    write: Option<Instant>,
}

enum ConnectionState {
    Open {
        drain: JoinHandle<()>,
        session: Box<dyn MultiplexedSession>,
    },
    Closing,
    Closed,
}

/// Bidirectional byte stream to a port inside a pod
pub struct PortForwardConnection {
    target: TunnelDescriptor,
    request_id: u64,
    reader: Mutex<Option<ReadHalf<PortForwardStream>>>,
    writer: Mutex<Option<WriteHalf<PortForwardStream>>>,
    deadlines: StdMutex<Deadlines>,
    state: Mutex<ConnectionState>,
    io_cancel: CancellationToken,
    closing: CancellationToken,
    drain_stop: CancellationToken,
    remote_errors: Arc<StdMutex<Vec<String>>>,
}

impl PortForwardConnection {
    /// Take ownership of a freshly opened stream pair and start draining the
    /// error stream
    pub(crate) fn open(
        target: TunnelDescriptor,
        request_id: u64,
        data: PortForwardStream,
        error_stream: PortForwardStream,
        session: Box<dyn MultiplexedSession>,
    ) -> Self {
        let closing = CancellationToken::new();
        let drain_stop = CancellationToken::new();
        let remote_errors = Arc::new(StdMutex::new(Vec::new()));

        let drain = tokio::spawn(drain_error_stream(
            target.clone(),
            error_stream,
            closing.clone(),
            drain_stop.clone(),
            remote_errors.clone(),
        ));

        let (reader, writer) = tokio::io::split(data);

        Self {
            target,
            request_id,
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(Some(writer)),
            deadlines: StdMutex::new(Deadlines::default()),
            state: Mutex::new(ConnectionState::Open { drain, session }),
            io_cancel: CancellationToken::new(),
            closing,
            drain_stop,
            remote_errors,
        }
    }

    pub fn target(&self) -> &TunnelDescriptor {
        &self.target
    }

    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    pub fn local_addr(&self) -> PortForwardAddr {
        PortForwardAddr::Local
    }

    /// Renders as `pod/<name>:<port>`
    pub fn remote_addr(&self) -> PortForwardAddr {
        PortForwardAddr::Remote(self.target.clone())
    }

    /// Set both the read and the write deadline; `None` clears them
    pub fn set_deadline(&self, deadline: Option<Instant>) -> io::Result<()> {
        let mut deadlines = self.lock_deadlines()?;
        deadlines.read = deadline;
        deadlines.write = deadline;
        Ok(())
    }

    pub fn set_read_deadline(&self, deadline: Option<Instant>) -> io::Result<()> {
        self.lock_deadlines()?.read = deadline;
        Ok(())
    }

    pub fn set_write_deadline(&self, deadline: Option<Instant>) -> io::Result<()> {
        self.lock_deadlines()?.write = deadline;
        Ok(())
    }

    /// Read into `buf`, returning 0 at end of stream
    pub async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let deadline = check_deadline(self.lock_deadlines()?.read)?;

        let mut guard = self.reader.lock().await;
        let reader = guard.as_mut().ok_or_else(closed_error)?;

        tokio::select! {
            biased;
            _ = self.io_cancel.cancelled() => Err(closed_error()),
            result = with_deadline(deadline, reader.read(buf)) => result,
        }
    }

    /// Write part of `buf`, returning how much was accepted
    pub async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let deadline = check_deadline(self.lock_deadlines()?.write)?;

        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or_else(closed_error)?;

        tokio::select! {
            biased;
            _ = self.io_cancel.cancelled() => Err(closed_error()),
            result = with_deadline(deadline, writer.write(buf)) => result,
        }
    }

    /// Write and flush the whole buffer under a single deadline
    pub async fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        let deadline = check_deadline(self.lock_deadlines()?.write)?;

        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or_else(closed_error)?;

        let op = async {
            writer.write_all(buf).await?;
            writer.flush().await
        };

        tokio::select! {
            biased;
            _ = self.io_cancel.cancelled() => Err(closed_error()),
            result = with_deadline(deadline, op) => result,
        }
    }

    /// Signal end of request to the pod while keeping the read side open
    pub async fn shutdown_write(&self) -> io::Result<()> {
        let deadline = check_deadline(self.lock_deadlines()?.write)?;

        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or_else(closed_error)?;

        tokio::select! {
            biased;
            _ = self.io_cancel.cancelled() => Err(closed_error()),
            result = with_deadline(deadline, writer.shutdown()) => result,
        }
    }

    /// Messages the remote side reported on the error stream so far
    pub fn remote_errors(&self) -> Vec<String> {
        self.remote_errors
            .lock()
            .map(|errors| errors.clone())
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub async fn is_closed(&self) -> bool {
        matches!(*self.state.lock().await, ConnectionState::Closed)
    }

    /// Close the data stream, then the error stream, wait for the drain task
    /// and finally tear down the session
    ///
    /// The pod often reports a failure only after the data stream ended, so
    /// the drain task gets [`ERROR_STREAM_GRACE`] to read the error stream to
    /// its end before it is stopped.
    ///
    /// Only the first call does any work; later calls return `Ok(())`.
    pub async fn close(&self) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        let (mut drain, session) = match std::mem::replace(&mut *state, ConnectionState::Closing) {
            ConnectionState::Open { drain, session } => (drain, session),
            other => {
                *state = other;
                return Ok(());
            }
        };

        // Unblock anything still waiting on the data stream
        self.io_cancel.cancel();

        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                debug!(tunnel = %self.target, error = %e, "Data stream shutdown failed");
            }
        }
        self.reader.lock().await.take();

        self.closing.cancel();
        let drained = match tokio::time::timeout(ERROR_STREAM_GRACE, &mut drain).await {
            Ok(joined) => joined,
            Err(_) => {
                debug!(tunnel = %self.target, "Error stream still open, stopping drain");
                self.drain_stop.cancel();
                drain.await
            }
        };

        let closed = session.close().await;
        *state = ConnectionState::Closed;

        debug!(tunnel = %self.target, request_id = self.request_id, "Port-forward connection closed");

        drained.map_err(|e| TransportError::Close(format!("error stream drain failed: {}", e)))?;
        closed
    }

    fn lock_deadlines(&self) -> io::Result<std::sync::MutexGuard<'_, Deadlines>> {
        self.deadlines
            .lock()
            .map_err(|e| io::Error::other(format!("Lock error: {}", e)))
    }
}

impl fmt::Debug for PortForwardConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortForwardConnection")
            .field("target", &self.target)
            .field("request_id", &self.request_id)
            .finish_non_exhaustive()
    }
}

impl Drop for PortForwardConnection {
    fn drop(&mut self) {
        // Lets the drain task finish if the connection was never closed
        self.io_cancel.cancel();
        self.drain_stop.cancel();
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "port-forward connection closed")
}

fn timeout_error() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "port-forward i/o deadline exceeded")
}

/// Fail immediately if the deadline has already passed
fn check_deadline(deadline: Option<Instant>) -> io::Result<Option<Instant>> {
    match deadline {
        Some(at) if at <= Instant::now() => Err(timeout_error()),
        other => Ok(other),
    }
}

async fn with_deadline<T, F>(deadline: Option<Instant>, op: F) -> io::Result<T>
where
    F: std::future::Future<Output = io::Result<T>>,
{
    match deadline {
        None => op.await,
        Some(at) => tokio::time::timeout_at(at, op)
            .await
            .map_err(|_| timeout_error())?,
    }
}

/// Collect everything the pod writes on the error stream
///
/// `closing` half-closes our side so the pod can finish; `stop` abandons the
/// read, keeping whatever already arrived.
async fn drain_error_stream(
    target: TunnelDescriptor,
    stream: PortForwardStream,
    closing: CancellationToken,
    stop: CancellationToken,
    errors: Arc<StdMutex<Vec<String>>>,
) {
    let (mut reader, mut writer) = tokio::io::split(stream);
    let half_close = async {
        closing.cancelled().await;
        if let Err(e) = writer.shutdown().await {
            debug!(tunnel = %target, error = %e, "Error stream shutdown failed");
        }
        std::future::pending::<()>().await
    };

    let mut message = Vec::new();
    let result = tokio::select! {
        biased;
        _ = stop.cancelled() => Ok(()),
        result = reader.read_to_end(&mut message) => result.map(|_| ()),
        _ = half_close => Ok(()),
    };

    if let Err(e) = result {
        warn!(tunnel = %target, error = %e, "Failed to read port-forward error stream");
    }

    let text = String::from_utf8_lossy(&message).trim().to_string();
    if text.is_empty() {
        return;
    }

    error!(tunnel = %target, message = %text, "Port-forward reported an error");
    if let Ok(mut errors) = errors.lock() {
        errors.push(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::portforward::testing::{DialedPair, DuplexUpgrader};
    use crate::k8s::portforward::PortForwardDialer;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Dial once and hand back the connection plus the server-side ends
    async fn connect() -> (PortForwardConnection, DialedPair, Arc<StdMutex<usize>>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let upgrader = DuplexUpgrader::new(move |pair| {
            let _ = tx.send(pair);
        });
        let closed = upgrader.sessions_closed.clone();
        let dialer = PortForwardDialer::new(TunnelDescriptor::new("web-0", 8080), Arc::new(upgrader));
        let conn = dialer.dial().await.unwrap();
        let pair = rx.recv().await.unwrap();
        (conn, pair, closed)
    }

    #[tokio::test]
    async fn test_read_write_through_data_stream() {
        let (conn, mut pair, _) = connect().await;

        conn.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        pair.data.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        pair.data.write_all(b"pong").await.unwrap();
        let mut buf = [0u8; 16];
        let n = conn.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"pong");

        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_write_keeps_read_side() {
        let (conn, mut pair, _) = connect().await;

        conn.write_all(b"req").await.unwrap();
        conn.shutdown_write().await.unwrap();

        let mut received = Vec::new();
        pair.data.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"req");

        pair.data.write_all(b"resp").await.unwrap();
        let mut buf = [0u8; 8];
        let n = conn.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"resp");

        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_addresses() {
        let (conn, _pair, _) = connect().await;
        assert_eq!(conn.remote_addr().to_string(), "pod/web-0:8080");
        assert_eq!(conn.local_addr(), PortForwardAddr::Local);
        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (conn, _pair, closed) = connect().await;

        conn.close().await.unwrap();
        let second = tokio::time::timeout(Duration::from_secs(1), conn.close()).await;
        assert!(matches!(second, Ok(Ok(()))));

        assert!(conn.is_closed().await);
        assert_eq!(*closed.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_past_deadline_fails_without_io() {
        let (conn, mut pair, _) = connect().await;
        pair.data.write_all(b"queued").await.unwrap();

        conn.set_read_deadline(Some(Instant::now())).unwrap();
        let mut buf = [0u8; 16];
        let err = conn.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);

        // Nothing was consumed by the failed read
        conn.set_read_deadline(None).unwrap();
        let n = conn.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"queued");

        conn.set_write_deadline(Some(Instant::now() - Duration::from_millis(1))).unwrap();
        assert_eq!(conn.write(b"x").await.unwrap_err().kind(), io::ErrorKind::TimedOut);

        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_deadline_expires_on_idle_read() {
        let (conn, _pair, _) = connect().await;
        conn.set_deadline(Some(Instant::now() + Duration::from_millis(50))).unwrap();

        let mut buf = [0u8; 16];
        let err = conn.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);

        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_unblocks_pending_read() {
        let (conn, _pair, _) = connect().await;
        let conn = Arc::new(conn);

        let reader = {
            let conn = conn.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 16];
                conn.read(&mut buf).await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        conn.close().await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), reader)
            .await
            .expect("read should be unblocked by close")
            .unwrap();
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::NotConnected);
    }

    #[tokio::test]
    async fn test_io_after_close_fails() {
        let (conn, _pair, _) = connect().await;
        conn.close().await.unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(conn.read(&mut buf).await.unwrap_err().kind(), io::ErrorKind::NotConnected);
        assert_eq!(conn.write(b"x").await.unwrap_err().kind(), io::ErrorKind::NotConnected);
    }

    #[tokio::test]
    async fn test_close_waits_for_late_error_message() {
        let (conn, pair, _) = connect().await;
        let DialedPair { data, mut error, .. } = pair;

        // The pod ends the data stream first and reports the failure afterwards
        tokio::spawn(async move {
            drop(data);
            tokio::time::sleep(Duration::from_millis(10)).await;
            let _ = error.write_all(b"error forwarding port 8080: connection refused").await;
        });

        let mut buf = [0u8; 16];
        assert_eq!(conn.read(&mut buf).await.unwrap(), 0);
        conn.close().await.unwrap();

        assert_eq!(
            conn.remote_errors(),
            vec!["error forwarding port 8080: connection refused".to_string()]
        );
    }

    #[tokio::test]
    async fn test_close_gives_up_on_silent_error_stream() {
        let (conn, _pair, _) = connect().await;

        let started = Instant::now();
        conn.close().await.unwrap();

        assert!(started.elapsed() >= ERROR_STREAM_GRACE);
        assert!(conn.remote_errors().is_empty());
    }

    #[tokio::test]
    async fn test_error_stream_message_is_reported() {
        let (conn, mut pair, _) = connect().await;
        pair.error
            .write_all(b"an error occurred forwarding 8080 -> 8080: connection refused\n")
            .await
            .unwrap();
        drop(pair.error);

        for _ in 0..100 {
            if !conn.remote_errors().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        conn.close().await.unwrap();
        assert_eq!(
            conn.remote_errors(),
            vec!["an error occurred forwarding 8080 -> 8080: connection refused".to_string()]
        );
    }
}
