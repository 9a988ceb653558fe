//! Per-pod actuator client construction
//!
//! Port and base path are chosen per pod: command-line flag first, then the
//! pod's annotations, then the config file, then the built-in defaults.

use k8s_openapi::api::core::v1::Pod;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::client::ActuatorClient;
use super::http::TunnelHttpClient;
use crate::config::{validate_port, Defaults, BASE_PATH_ANNOTATION, PORT_ANNOTATION};
use crate::errors::{ActuatorError, Result};
use crate::k8s::{ClusterApi, PortForwardDialer, SessionUpgrader, TunnelDescriptor};

/// Connection settings given on the command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionOverrides {
    pub port: Option<u16>,
    pub base_path: Option<String>,
    pub timeout: Option<Duration>,
}

/// Effective connection settings for one pod
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActuatorSettings {
    pub port: u16,
    pub base_path: String,
    pub timeout: Duration,
}

impl ActuatorSettings {
    pub fn resolve(pod: &Pod, overrides: &ConnectionOverrides, defaults: &Defaults) -> Result<Self> {
        let annotations = pod.metadata.annotations.as_ref();
        let annotation = |key: &str| annotations.and_then(|a| a.get(key)).map(String::as_str);

        let base_path = overrides
            .base_path
            .as_deref()
            .filter(|p| !p.is_empty())
            .or_else(|| annotation(BASE_PATH_ANNOTATION).filter(|p| !p.is_empty()))
            .unwrap_or_else(|| defaults.base_path())
            .to_string();

        let port = match (overrides.port, annotation(PORT_ANNOTATION)) {
            (Some(port), _) => validate_port(port as i64).map_err(ActuatorError::Config)?,
            (None, Some(value)) => {
                let parsed: i64 = value.trim().parse().map_err(|e| {
                    ActuatorError::Config(format!(
                        "invalid port ({} annotation): {:?}: {}",
                        PORT_ANNOTATION, value, e
                    ))
                })?;
                validate_port(parsed).map_err(ActuatorError::Config)?
            }
            (None, None) => defaults.port(),
        };

        Ok(Self {
            port,
            base_path,
            timeout: overrides.timeout.unwrap_or_else(|| defaults.timeout()),
        })
    }
}

/// Builds an [`ActuatorClient`] for any pod in one namespace
pub struct ActuatorClientFactory {
    cluster: Arc<dyn ClusterApi>,
    upgrader: Arc<dyn SessionUpgrader>,
    namespace: String,
    overrides: ConnectionOverrides,
    defaults: Defaults,
}

impl ActuatorClientFactory {
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        upgrader: Arc<dyn SessionUpgrader>,
        namespace: impl Into<String>,
        overrides: ConnectionOverrides,
        defaults: Defaults,
    ) -> Self {
        Self {
            cluster,
            upgrader,
            namespace: namespace.into(),
            overrides,
            defaults,
        }
    }

    /// Look the pod up, settle its settings and wire a tunnel client to it
    pub async fn client_for(&self, pod_name: &str) -> Result<ActuatorClient<TunnelHttpClient>> {
        let pod = self.cluster.get_pod(&self.namespace, pod_name).await?;
        let settings = ActuatorSettings::resolve(&pod, &self.overrides, &self.defaults)?;

        debug!(
            pod = %pod_name,
            port = settings.port,
            base_path = %settings.base_path,
            timeout = ?settings.timeout,
            "Resolved actuator settings"
        );

        let dialer = PortForwardDialer::new(
            TunnelDescriptor::new(pod_name, settings.port),
            self.upgrader.clone(),
        );
        Ok(ActuatorClient::new(TunnelHttpClient::new(
            dialer,
            &settings.base_path,
            settings.timeout,
        )))
    }
}
