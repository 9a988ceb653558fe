//! Error types for kubectl-actuator

use thiserror::Error;

/// Documentation link appended to "endpoint not exposed" errors
pub const ENDPOINTS_DOC_URL: &str =
    "https://docs.spring.io/spring-boot/reference/actuator/endpoints.html";

/// Main error type for kubectl-actuator
#[derive(Error, Debug)]
pub enum ActuatorError {
    #[error("no pods selected: specify --pod, --deployment, or --selector")]
    NoTargetsSelected,

    #[error("selector {} matched no pods", .selectors.join(", "))]
    SelectorMatchedNoPods { selectors: Vec<String> },

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    #[error("failed to decode {endpoint} response: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Malformed HTTP response: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    Argument(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("{action} failed on {count} pod(s)")]
    PodsFailed { action: String, count: usize },
}

impl ActuatorError {
    /// Wrap a JSON decode failure for the given endpoint
    pub fn decode(endpoint: impl Into<String>, source: serde_json::Error) -> Self {
        ActuatorError::Decode {
            endpoint: endpoint.into(),
            source,
        }
    }
}

/// Failures from the cluster API lookups
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("{kind} \"{name}\" not found")]
    NotFound { kind: &'static str, name: String },

    #[error("invalid label selector for deployment {deployment}: {reason}")]
    InvalidSelector { deployment: String, reason: String },

    #[error("failed to read kubeconfig: {0}")]
    Kubeconfig(String),

    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),
}

/// Failures while opening or using a port-forward tunnel
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("unable to dial portforward protocol for pod/{pod}: {reason}")]
    Dial { pod: String, reason: String },

    #[error("unable to open {stream} stream to pod/{pod}:{port}: {reason}")]
    StreamOpen {
        pod: String,
        port: u16,
        stream: &'static str,
        reason: String,
    },

    #[error("port-forward to pod/{pod}:{port} reported: {message}")]
    Remote { pod: String, port: u16, message: String },

    #[error("request to pod/{pod} timed out after {seconds:.1} seconds")]
    Timeout { pod: String, seconds: f64 },

    #[error("tunnel I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to close port-forward session: {0}")]
    Close(String),
}

/// A non-2xx answer from an actuator endpoint, classified for the operator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointError {
    #[error(
        "{context}: {status}\nMake sure the '{endpoint}' endpoint is exposed in your Spring Boot configuration: {}",
        ENDPOINTS_DOC_URL
    )]
    NotExposed {
        endpoint: String,
        status: String,
        context: String,
    },

    #[error("{resource_type} '{name}' not found: {status}")]
    ResourceNotFound {
        resource_type: String,
        name: String,
        status: String,
    },

    #[error("{context}: {status} (endpoint '{endpoint}')")]
    Status {
        endpoint: String,
        status: String,
        context: String,
    },
}

pub type Result<T> = std::result::Result<T, ActuatorError>;
