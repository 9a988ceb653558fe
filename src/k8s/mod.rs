//! Kubernetes integration module
//!
//! Resolves operator targets to pods and opens port-forward tunnels to them
//! through the API server, without any local listener or `kubectl` process.
//!
//! # Layers
//! - [`cluster`] - the lookups needed from the cluster API
//! - [`resolver`] - pods/deployments/selectors to a deduplicated pod list
//! - [`portforward`] - session upgrade, stream headers, the dialer
//! - [`connection`] - one live tunnel with deadlines and idempotent close

pub mod cluster;
pub mod connection;
pub mod portforward;
pub mod resolver;

pub use cluster::{ClusterApi, KubeCluster};
pub use connection::{PortForwardAddr, PortForwardConnection};
pub use portforward::{
    default_request_ids, KubeUpgrader, MultiplexedSession, PortForwardDialer, PortForwardStream,
    RequestIdAllocator, SequentialRequestIds, SessionUpgrader, StreamHeaders, StreamType,
    TunnelDescriptor,
};
pub use resolver::{resolve_targets, ResolvedPodSet, TargetSpec};
