//! HTTP/1.1 over a port-forward tunnel
//!
//! Each request dials a fresh tunnel, writes one `Connection: close` request
//! and reads until the response framing is satisfied. Only a response with
//! neither `Content-Length` nor chunked encoding runs until the pod closes
//! the stream.

use async_trait::async_trait;
use http::StatusCode;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::errors::{ActuatorError, Result, TransportError};
use crate::k8s::{PortForwardConnection, PortForwardDialer};

/// Host header sent through the tunnel; the pod never sees a real hostname
pub const TUNNEL_HOST: &str = "port-forwarded-actuator";

pub const USER_AGENT_STRING: &str = concat!("kubectl-actuator/", env!("CARGO_PKG_VERSION"));

const READ_CHUNK: usize = 8 * 1024;

/// Transport-agnostic result of one HTTP request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActuatorResponse {
    pub body: Vec<u8>,
    pub status_code: u16,
    /// Status line text, e.g. `404 Not Found`
    pub status: String,
}

impl ActuatorResponse {
    pub fn new(status_code: u16, body: impl Into<Vec<u8>>) -> Self {
        let reason = StatusCode::from_u16(status_code)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("");
        Self {
            body: body.into(),
            status_code,
            status: format!("{} {}", status_code, reason).trim_end().to_string(),
        }
    }

    pub fn is_error_status(&self) -> bool {
        !(200..300).contains(&self.status_code)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Minimal HTTP surface the actuator client needs
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, path: &str) -> Result<ActuatorResponse>;
    async fn post(&self, path: &str, body: &serde_json::Value) -> Result<ActuatorResponse>;
}

/// [`HttpClient`] that sends every request through its own port-forward dial
pub struct TunnelHttpClient {
    dialer: PortForwardDialer,
    base_path: String,
    timeout: Duration,
}

impl TunnelHttpClient {
    /// `base_path` is the management root every request path is joined to
    pub fn new(dialer: PortForwardDialer, base_path: &str, timeout: Duration) -> Self {
        let trimmed = base_path.trim_matches('/');
        let base_path = if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{}", trimmed)
        };
        Self {
            dialer,
            base_path,
            timeout,
        }
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Join a request path onto the base path
    pub fn full_path(&self, path: &str) -> String {
        let full = if path.is_empty() || path == "/" {
            self.base_path.clone()
        } else if path.starts_with('/') {
            format!("{}{}", self.base_path, path)
        } else {
            format!("{}/{}", self.base_path, path)
        };
        if full.is_empty() {
            "/".to_string()
        } else {
            full
        }
    }

    async fn send(&self, method: &str, path: &str, body: Option<&[u8]>) -> Result<ActuatorResponse> {
        let full_path = self.full_path(path);
        let request = build_request(method, &full_path, body);

        let conn = self.dialer.dial().await?;
        conn.set_deadline(Some(Instant::now() + self.timeout))?;

        debug!(
            method,
            path = %full_path,
            remote = %conn.remote_addr(),
            request_id = conn.request_id(),
            "Sending actuator request"
        );

        let exchanged = self.exchange(&conn, &request, body).await;
        // Closing waits for the error stream, so its messages are complete after this
        let closed = conn.close().await;

        let response = match exchanged {
            Ok(response) => response,
            Err(e) => {
                return Err(match conn.remote_errors().into_iter().next() {
                    Some(message) => self.remote_error(message),
                    None => e,
                });
            }
        };

        closed?;
        debug!(status = %response.status, bytes = response.body.len(), "Received actuator response");
        Ok(response)
    }

    /// Write the request and read until the response is complete
    async fn exchange(
        &self,
        conn: &PortForwardConnection,
        request: &str,
        body: Option<&[u8]>,
    ) -> Result<ActuatorResponse> {
        conn.write_all(request.as_bytes())
            .await
            .map_err(|e| self.map_io_error(e))?;
        if let Some(body_bytes) = body {
            conn.write_all(body_bytes).await.map_err(|e| self.map_io_error(e))?;
        }

        let mut parser = ResponseParser::new();
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            let n = conn.read(&mut buf).await.map_err(|e| self.map_io_error(e))?;
            if n == 0 {
                return parser.finish();
            }
            if let Some(response) = parser.feed(&buf[..n])? {
                return Ok(response);
            }
        }
    }

    fn remote_error(&self, message: String) -> ActuatorError {
        let target = self.dialer.target();
        TransportError::Remote {
            pod: target.pod.clone(),
            port: target.port,
            message,
        }
        .into()
    }

    fn map_io_error(&self, e: std::io::Error) -> ActuatorError {
        if e.kind() == std::io::ErrorKind::TimedOut {
            TransportError::Timeout {
                pod: self.dialer.target().pod.clone(),
                seconds: self.timeout.as_secs_f64(),
            }
            .into()
        } else {
            TransportError::Io(e).into()
        }
    }
}

#[async_trait]
impl HttpClient for TunnelHttpClient {
    async fn get(&self, path: &str) -> Result<ActuatorResponse> {
        self.send("GET", path, None).await
    }

    async fn post(&self, path: &str, body: &serde_json::Value) -> Result<ActuatorResponse> {
        let body = serde_json::to_vec(body)?;
        self.send("POST", path, Some(&body)).await
    }
}

/// Render the request head
fn build_request(method: &str, path: &str, body: Option<&[u8]>) -> String {
    let mut request = format!("{} {} HTTP/1.1\r\n", method, path);
    request.push_str(&format!("Host: {}\r\n", TUNNEL_HOST));
    request.push_str(&format!("User-Agent: {}\r\n", USER_AGENT_STRING));
    request.push_str("Accept: application/json\r\n");

    if let Some(body_bytes) = body {
        request.push_str("Content-Type: application/json\r\n");
        request.push_str(&format!("Content-Length: {}\r\n", body_bytes.len()));
    }

    // One request per tunnel
    request.push_str("Connection: close\r\n");
    request.push_str("\r\n");
    request
}

/// How the end of a response body is recognised
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    Length(usize),
    Chunked,
    UntilClose,
}

#[derive(Debug)]
struct ResponseHead {
    status_code: u16,
    reason: Option<String>,
    framing: Framing,
}

impl ResponseHead {
    fn parse(head: &[u8]) -> Result<Self> {
        let text = String::from_utf8_lossy(head);
        let mut lines = text.lines();
        let status_line = lines.next().unwrap_or("").trim();

        // e.g. "HTTP/1.1 200 OK"; the reason phrase is optional
        let mut parts = status_line.splitn(3, ' ');
        let version = parts.next().unwrap_or("");
        let code = parts.next().filter(|_| version.starts_with("HTTP/")).ok_or_else(|| {
            ActuatorError::Http(format!("Invalid status line: {:?}", status_line))
        })?;
        let status_code: u16 = code
            .parse()
            .map_err(|_| ActuatorError::Http(format!("Invalid status code: {}", code)))?;
        let reason = parts.next().map(str::trim).filter(|r| !r.is_empty()).map(String::from);

        let mut length = None;
        let mut chunked = false;
        for (name, value) in lines.filter_map(|line| line.split_once(':')) {
            let (name, value) = (name.trim(), value.trim());
            if name.eq_ignore_ascii_case("content-length") {
                length = Some(value.parse::<usize>().map_err(|_| {
                    ActuatorError::Http(format!("Invalid Content-Length: {}", value))
                })?);
            } else if name.eq_ignore_ascii_case("transfer-encoding") {
                chunked = value.to_ascii_lowercase().contains("chunked");
            }
        }

        // 204 and 304 never carry a body, whatever the headers say
        let framing = match (status_code, chunked, length) {
            (204 | 304, _, _) => Framing::Length(0),
            (_, true, _) => Framing::Chunked,
            (_, false, Some(len)) => Framing::Length(len),
            (_, false, None) => Framing::UntilClose,
        };

        Ok(Self {
            status_code,
            reason,
            framing,
        })
    }
}

/// Position inside a chunked body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkState {
    Size,
    Data(usize),
    DataEnd,
    Trailer,
    Done,
}

/// HTTP/1.1 response parser fed with whatever the tunnel delivers
///
/// The response is complete as soon as its framing says so; the pod does not
/// have to close the stream.
#[derive(Debug)]
struct ResponseParser {
    pending: Vec<u8>,
    head: Option<ResponseHead>,
    body: Vec<u8>,
    chunk: ChunkState,
}

impl ResponseParser {
    fn new() -> Self {
        Self {
            pending: Vec::new(),
            head: None,
            body: Vec::new(),
            chunk: ChunkState::Size,
        }
    }

    /// Add bytes; returns the response once it is complete
    fn feed(&mut self, data: &[u8]) -> Result<Option<ActuatorResponse>> {
        self.pending.extend_from_slice(data);

        if self.head.is_none() {
            let Some(end) = find(&self.pending, b"\r\n\r\n") else {
                return Ok(None);
            };
            self.head = Some(ResponseHead::parse(&self.pending[..end])?);
            self.pending.drain(..end + 4);
        }

        if self.body_complete()? {
            return self.take_response().map(Some);
        }
        Ok(None)
    }

    /// The pod closed the stream; whatever arrived has to be the response
    fn finish(mut self) -> Result<ActuatorResponse> {
        if self.head.is_none() {
            let head = std::mem::take(&mut self.pending);
            self.head = Some(ResponseHead::parse(&head)?);
        }

        if !self.body_complete()? {
            let framing = self.head.as_ref().map(|h| h.framing);
            match framing {
                Some(Framing::Length(len)) => {
                    return Err(ActuatorError::Http(format!(
                        "Response body truncated: got {} of {} bytes",
                        self.body.len(),
                        len
                    )));
                }
                Some(Framing::Chunked) => {
                    return Err(ActuatorError::Http("Chunked response body truncated".to_string()));
                }
                _ => {}
            }
        }
        self.take_response()
    }

    /// Move pending bytes into the body; true once the framing is satisfied
    fn body_complete(&mut self) -> Result<bool> {
        let framing = match &self.head {
            Some(head) => head.framing,
            None => return Ok(false),
        };

        match framing {
            Framing::Length(len) => {
                let take = (len - self.body.len()).min(self.pending.len());
                self.body.extend(self.pending.drain(..take));
                Ok(self.body.len() == len)
            }
            Framing::UntilClose => {
                self.body.append(&mut self.pending);
                Ok(false)
            }
            Framing::Chunked => self.advance_chunks(),
        }
    }

    fn advance_chunks(&mut self) -> Result<bool> {
        loop {
            match self.chunk {
                ChunkState::Size => {
                    let Some(line) = self.take_line() else {
                        return Ok(false);
                    };
                    let size = line.split(';').next().unwrap_or("").trim();
                    let size = usize::from_str_radix(size, 16)
                        .map_err(|_| ActuatorError::Http(format!("Invalid chunk size: {:?}", size)))?;
                    self.chunk = if size == 0 {
                        ChunkState::Trailer
                    } else {
                        ChunkState::Data(size)
                    };
                }
                ChunkState::Data(remaining) => {
                    let take = remaining.min(self.pending.len());
                    self.body.extend(self.pending.drain(..take));
                    if take < remaining {
                        self.chunk = ChunkState::Data(remaining - take);
                        return Ok(false);
                    }
                    self.chunk = ChunkState::DataEnd;
                }
                ChunkState::DataEnd => {
                    let Some(line) = self.take_line() else {
                        return Ok(false);
                    };
                    if !line.is_empty() {
                        return Err(ActuatorError::Http("Missing CRLF after chunk".to_string()));
                    }
                    self.chunk = ChunkState::Size;
                }
                ChunkState::Trailer => {
                    let Some(line) = self.take_line() else {
                        return Ok(false);
                    };
                    if line.is_empty() {
                        self.chunk = ChunkState::Done;
                    }
                }
                ChunkState::Done => return Ok(true),
            }
        }
    }

    /// Next CRLF-terminated line without its terminator
    fn take_line(&mut self) -> Option<String> {
        let end = find(&self.pending, b"\r\n")?;
        let line = String::from_utf8_lossy(&self.pending[..end]).into_owned();
        self.pending.drain(..end + 2);
        Some(line)
    }

    fn take_response(&mut self) -> Result<ActuatorResponse> {
        let head = self
            .head
            .take()
            .ok_or_else(|| ActuatorError::Http("Response head missing".to_string()))?;
        let mut response = ActuatorResponse::new(head.status_code, std::mem::take(&mut self.body));
        if let Some(reason) = head.reason {
            response.status = format!("{} {}", head.status_code, reason);
        }
        Ok(response)
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted pod-side HTTP server for tunnel tests

    use super::*;
    use crate::k8s::portforward::testing::{DialedPair, DuplexUpgrader};
    use crate::k8s::TunnelDescriptor;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// A request as seen by the pod
    #[derive(Debug, Clone)]
    pub struct SeenRequest {
        pub head: String,
        pub body: Vec<u8>,
    }

    impl SeenRequest {
        pub fn request_line(&self) -> &str {
            self.head.lines().next().unwrap_or("")
        }
    }

    /// Build a dialer whose pod answers each request with `respond(path)`
    pub fn scripted_dialer(
        respond: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> (PortForwardDialer, Arc<Mutex<Vec<SeenRequest>>>) {
        let (upgrader, seen) = scripted_upgrader(respond);
        let dialer = PortForwardDialer::new(TunnelDescriptor::new("web-0", 8080), upgrader);
        (dialer, seen)
    }

    /// Upgrader whose every pod answers each request with `respond(path)`
    pub fn scripted_upgrader(
        respond: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> (Arc<DuplexUpgrader>, Arc<Mutex<Vec<SeenRequest>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let respond = Arc::new(respond);

        let upgrader = DuplexUpgrader::new(move |pair: DialedPair| {
            let log = log.clone();
            let respond = respond.clone();
            tokio::spawn(async move {
                let DialedPair { mut data, error, .. } = pair;
                let request = read_request(&mut data).await;
                let path = request
                    .request_line()
                    .split(' ')
                    .nth(1)
                    .unwrap_or("")
                    .to_string();
                log.lock().unwrap().push(request);
                let _ = data.write_all((*respond)(&path).as_bytes()).await;
                let _ = data.shutdown().await;
                drop(error);
            });
        });

        (Arc::new(upgrader), seen)
    }

    async fn read_request(data: &mut tokio::io::DuplexStream) -> SeenRequest {
        let mut raw = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = data.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..n]);
            if let Some(pos) = find_head_end(&raw) {
                let head = String::from_utf8_lossy(&raw[..pos]).into_owned();
                let length = head
                    .lines()
                    .find_map(|l| {
                        let (name, value) = l.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())?
                    })
                    .unwrap_or(0);
                let mut body = raw[pos + 4..].to_vec();
                while body.len() < length {
                    let n = data.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    body.extend_from_slice(&buf[..n]);
                }
                return SeenRequest { head, body };
            }
        }
        SeenRequest {
            head: String::from_utf8_lossy(&raw).into_owned(),
            body: Vec::new(),
        }
    }

    fn find_head_end(raw: &[u8]) -> Option<usize> {
        raw.windows(4).position(|w| w == b"\r\n\r\n")
    }

    /// Render a complete `Connection: close` response
    pub fn http_response(status: u16, body: &str) -> String {
        let reason = StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("");
        format!(
            "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            reason,
            body.len(),
            body
        )
    }
}
