//! Kubernetes port-forward transport
//!
//! Opens byte streams to a port inside a pod through the API server's
//! `pods/portforward` sub-resource. Every dial opens a fresh multiplexed
//! session with its own error/data stream pair, because the protocol cannot
//! carry more than one logical request per stream pair.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, Portforwarder};
use kube::Client;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use super::connection::PortForwardConnection;
use crate::errors::TransportError;

/// One pod-local endpoint: pod name and target port
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TunnelDescriptor {
    pub pod: String,
    pub port: u16,
}

impl TunnelDescriptor {
    pub fn new(pod: impl Into<String>, port: u16) -> Self {
        Self {
            pod: pod.into(),
            port,
        }
    }
}

impl fmt::Display for TunnelDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pod/{}:{}", self.pod, self.port)
    }
}

/// Kind of sub-stream within a port-forward session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    Data,
    Error,
}

impl StreamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamType::Data => "data",
            StreamType::Error => "error",
        }
    }
}

/// Headers tagging one sub-stream of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeaders {
    pub stream_type: StreamType,
    pub port: u16,
    pub request_id: u64,
}

/// Bidirectional byte stream opened inside a session
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncStream for T {}

pub type PortForwardStream = Box<dyn AsyncStream>;

/// An upgraded connection carrying independently addressed sub-streams
#[async_trait]
pub trait MultiplexedSession: Send {
    /// Open a sub-stream tagged with the given headers
    async fn create_stream(&mut self, headers: &StreamHeaders) -> Result<PortForwardStream, TransportError>;

    /// Tear down the session and everything still running on it
    async fn close(self: Box<Self>) -> Result<(), TransportError>;
}

/// Performs the protocol upgrade against the pod's port-forward sub-resource
#[async_trait]
pub trait SessionUpgrader: Send + Sync {
    async fn upgrade(&self, target: &TunnelDescriptor) -> Result<Box<dyn MultiplexedSession>, TransportError>;
}

/// Source of request identifiers for stream pairs
pub trait RequestIdAllocator: Send + Sync {
    fn next_id(&self) -> u64;
}

/// Monotonically increasing identifiers, safe to share between threads
#[derive(Debug, Default)]
pub struct SequentialRequestIds {
    next: AtomicU64,
}

impl SequentialRequestIds {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }
}

impl RequestIdAllocator for SequentialRequestIds {
    fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

static DEFAULT_REQUEST_IDS: OnceLock<Arc<SequentialRequestIds>> = OnceLock::new();

/// Process-wide allocator shared by dialers that were not given their own
pub fn default_request_ids() -> Arc<SequentialRequestIds> {
    DEFAULT_REQUEST_IDS
        .get_or_init(|| Arc::new(SequentialRequestIds::new()))
        .clone()
}

/// Connection factory for one [`TunnelDescriptor`]
///
/// Cheap to clone; each [`dial`](Self::dial) opens an independent session.
#[derive(Clone)]
pub struct PortForwardDialer {
    target: TunnelDescriptor,
    upgrader: Arc<dyn SessionUpgrader>,
    request_ids: Arc<dyn RequestIdAllocator>,
}

impl PortForwardDialer {
    pub fn new(target: TunnelDescriptor, upgrader: Arc<dyn SessionUpgrader>) -> Self {
        Self::with_request_ids(target, upgrader, default_request_ids())
    }

    pub fn with_request_ids(
        target: TunnelDescriptor,
        upgrader: Arc<dyn SessionUpgrader>,
        request_ids: Arc<dyn RequestIdAllocator>,
    ) -> Self {
        Self {
            target,
            upgrader,
            request_ids,
        }
    }

    pub fn target(&self) -> &TunnelDescriptor {
        &self.target
    }

    /// Open a new session and its error/data stream pair
    pub async fn dial(&self) -> Result<PortForwardConnection, TransportError> {
        let mut session = self.upgrader.upgrade(&self.target).await?;
        let request_id = self.request_ids.next_id();

        debug!(pod = %self.target.pod, port = self.target.port, request_id, "Dialing port-forward");

        let mut headers = StreamHeaders {
            stream_type: StreamType::Error,
            port: self.target.port,
            request_id,
        };

        let error_stream = match session.create_stream(&headers).await {
            Ok(stream) => stream,
            Err(e) => {
                close_quietly(session).await;
                return Err(e);
            }
        };

        headers.stream_type = StreamType::Data;
        let data_stream = match session.create_stream(&headers).await {
            Ok(stream) => stream,
            Err(e) => {
                drop(error_stream);
                close_quietly(session).await;
                return Err(e);
            }
        };

        Ok(PortForwardConnection::open(
            self.target.clone(),
            request_id,
            data_stream,
            error_stream,
            session,
        ))
    }
}

async fn close_quietly(session: Box<dyn MultiplexedSession>) {
    if let Err(e) = session.close().await {
        debug!(error = %e, "Failed to close session after dial error");
    }
}

/// [`SessionUpgrader`] that talks to the real API server through kube
#[derive(Clone)]
pub struct KubeUpgrader {
    client: Client,
    namespace: String,
}

impl KubeUpgrader {
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }
}

#[async_trait]
impl SessionUpgrader for KubeUpgrader {
    async fn upgrade(&self, target: &TunnelDescriptor) -> Result<Box<dyn MultiplexedSession>, TransportError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &self.namespace);
        let forwarder = pods
            .portforward(&target.pod, &[target.port])
            .await
            .map_err(|e| TransportError::Dial {
                pod: target.pod.clone(),
                reason: e.to_string(),
            })?;

        Ok(Box::new(KubeSession {
            pod: target.pod.clone(),
            forwarder,
        }))
    }
}

/// One kube port-forward session
///
/// kube's websocket protocol pairs streams by port rather than by request id,
/// which is sound here because every session carries a single stream pair.
struct KubeSession {
    pod: String,
    forwarder: Portforwarder,
}

impl KubeSession {
    fn stream_open_error(&self, headers: &StreamHeaders, reason: &str) -> TransportError {
        TransportError::StreamOpen {
            pod: self.pod.clone(),
            port: headers.port,
            stream: headers.stream_type.as_str(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl MultiplexedSession for KubeSession {
    async fn create_stream(&mut self, headers: &StreamHeaders) -> Result<PortForwardStream, TransportError> {
        match headers.stream_type {
            StreamType::Data => {
                let stream = self
                    .forwarder
                    .take_stream(headers.port)
                    .ok_or_else(|| self.stream_open_error(headers, "stream already taken"))?;
                Ok(Box::new(stream))
            }
            StreamType::Error => {
                let message = self
                    .forwarder
                    .take_error(headers.port)
                    .ok_or_else(|| self.stream_open_error(headers, "error channel already taken"))?;

                // Present the error channel as a stream: the message (if any)
                // followed by EOF once the forwarder finishes.
                let (mut writer, reader) = tokio::io::duplex(4096);
                tokio::spawn(async move {
                    if let Some(message) = message.await {
                        let _ = writer.write_all(message.as_bytes()).await;
                    }
                    let _ = writer.shutdown().await;
                });
                Ok(Box::new(reader))
            }
        }
    }

    async fn close(self: Box<Self>) -> Result<(), TransportError> {
        let KubeSession { pod, forwarder } = *self;
        forwarder.abort();
        if let Err(e) = forwarder.join().await {
            // Aborting the forwarder surfaces as a join error; nothing is lost.
            debug!(pod = %pod, error = %e, "Port-forward session ended");
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory session used by the transport and client tests

    use super::*;
    use std::sync::Mutex;
    use tokio::io::DuplexStream;

    /// Server-side ends of one dial
    pub struct DialedPair {
        pub headers: Vec<StreamHeaders>,
        pub data: DuplexStream,
        pub error: DuplexStream,
    }

    /// Upgrader whose sessions are backed by `tokio::io::duplex` pipes
    ///
    /// Every dial hands its server-side ends to `on_dial`.
    pub struct DuplexUpgrader {
        on_dial: Arc<dyn Fn(DialedPair) + Send + Sync>,
        pub sessions_closed: Arc<Mutex<usize>>,
        pub dials: Arc<Mutex<Vec<TunnelDescriptor>>>,
    }

    impl DuplexUpgrader {
        pub fn new(on_dial: impl Fn(DialedPair) + Send + Sync + 'static) -> Self {
            Self {
                on_dial: Arc::new(on_dial),
                sessions_closed: Arc::new(Mutex::new(0)),
                dials: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    struct DuplexSession {
        on_dial: Arc<dyn Fn(DialedPair) + Send + Sync>,
        headers: Vec<StreamHeaders>,
        error: Option<DuplexStream>,
        closed: Arc<Mutex<usize>>,
    }

    #[async_trait]
    impl SessionUpgrader for DuplexUpgrader {
        async fn upgrade(&self, target: &TunnelDescriptor) -> Result<Box<dyn MultiplexedSession>, TransportError> {
            self.dials.lock().unwrap().push(target.clone());
            Ok(Box::new(DuplexSession {
                on_dial: self.on_dial.clone(),
                headers: Vec::new(),
                error: None,
                closed: self.sessions_closed.clone(),
            }))
        }
    }

    #[async_trait]
    impl MultiplexedSession for DuplexSession {
        async fn create_stream(&mut self, headers: &StreamHeaders) -> Result<PortForwardStream, TransportError> {
            self.headers.push(*headers);
            let (client, server) = tokio::io::duplex(64 * 1024);
            match headers.stream_type {
                StreamType::Error => self.error = Some(server),
                StreamType::Data => {
                    let error = self.error.take().expect("error stream opened first");
                    (self.on_dial)(DialedPair {
                        headers: self.headers.clone(),
                        data: server,
                        error,
                    });
                }
            }
            Ok(Box::new(client))
        }

        async fn close(self: Box<Self>) -> Result<(), TransportError> {
            *self.closed.lock().unwrap() += 1;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use std::sync::Mutex;

    struct FixedIds(Mutex<Vec<u64>>);

    impl RequestIdAllocator for FixedIds {
        fn next_id(&self) -> u64 {
            self.0.lock().unwrap().remove(0)
        }
    }

    #[test]
    fn test_sequential_ids_are_unique() {
        let ids = Arc::new(SequentialRequestIds::starting_at(5));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ids = ids.clone();
                std::thread::spawn(move || (0..100).map(|_| ids.next_id()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<u64> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 800);
        assert_eq!(all[0], 5);
    }

    #[test]
    fn test_descriptor_display() {
        assert_eq!(TunnelDescriptor::new("web-0", 8081).to_string(), "pod/web-0:8081");
    }

    #[tokio::test]
    async fn test_each_dial_opens_tagged_stream_pair() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let upgrader = Arc::new(DuplexUpgrader::new(move |pair: DialedPair| {
            sink.lock().unwrap().push(pair.headers);
        }));
        let dials = upgrader.dials.clone();

        let dialer = PortForwardDialer::with_request_ids(
            TunnelDescriptor::new("web-0", 8080),
            upgrader,
            Arc::new(FixedIds(Mutex::new(vec![41, 42]))),
        );

        let first = dialer.dial().await.unwrap();
        let second = dialer.dial().await.unwrap();
        first.close().await.unwrap();
        second.close().await.unwrap();

        assert_eq!(dials.lock().unwrap().len(), 2);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        for (pair, id) in seen.iter().zip([41, 42]) {
            assert_eq!(pair[0].stream_type, StreamType::Error);
            assert_eq!(pair[1].stream_type, StreamType::Data);
            assert!(pair.iter().all(|h| h.request_id == id && h.port == 8080));
        }
    }
}
