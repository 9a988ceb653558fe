//! Typed access to the actuator endpoints of one pod

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use super::http::{ActuatorResponse, HttpClient};
use super::models::*;
use crate::errors::{ActuatorError, EndpointError, Result};

/// Characters left unescaped in a single path segment
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

/// Client for the management endpoints behind one [`HttpClient`]
pub struct ActuatorClient<H> {
    http: H,
}

impl<H: HttpClient> ActuatorClient<H> {
    pub fn new(http: H) -> Self {
        Self { http }
    }

    #[cfg(test)]
    fn http(&self) -> &H {
        &self.http
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.get_json("/health", "health", "failed to get health").await
    }

    pub async fn info(&self) -> Result<Map<String, Value>> {
        self.get_json("/info", "info", "failed to get info").await
    }

    /// All loggers, sorted by name
    pub async fn loggers(&self) -> Result<Vec<LoggerConfiguration>> {
        let response: LoggersResponse = self
            .get_json("/loggers", "loggers", "failed to get loggers")
            .await?;

        // BTreeMap iteration is already ordered by name
        Ok(response
            .loggers
            .into_iter()
            .map(|(name, levels)| LoggerConfiguration {
                name,
                configured_level: levels.configured_level,
                effective_level: levels.effective_level,
            })
            .collect())
    }

    /// Set a logger's configured level; `None` resets it to the inherited one
    pub async fn set_logger_level(&self, logger: &str, level: Option<&str>) -> Result<()> {
        let path = format!("/loggers/{}", encode_segment(logger));
        let body = serde_json::to_value(SetLoggerLevelRequest {
            configured_level: level.map(str::to_string),
        })?;

        let response = self.http.post(&path, &body).await?;
        if response.is_error_status() {
            return Err(classify(&response, "loggers", "failed to set logger level").into());
        }
        Ok(())
    }

    pub async fn scheduled_tasks(&self) -> Result<ScheduledTasksResponse> {
        self.get_json("/scheduledtasks", "scheduledtasks", "unable to get scheduled tasks")
            .await
    }

    pub async fn metrics(&self) -> Result<MetricsListResponse> {
        self.get_json("/metrics", "metrics", "failed to get metrics").await
    }

    pub async fn metric(&self, name: &str) -> Result<MetricResponse> {
        let path = format!("/metrics/{}", encode_segment(name));
        self.get_sub_resource(&path, "/metrics", "metrics", "metric", name, "failed to get metric")
            .await
    }

    pub async fn env(&self) -> Result<EnvResponse> {
        self.get_json("/env", "env", "failed to get environment").await
    }

    pub async fn env_property(&self, name: &str) -> Result<EnvPropertyResponse> {
        let path = format!("/env/{}", encode_segment(name));
        self.get_sub_resource(&path, "/env", "env", "property", name, "failed to get property")
            .await
    }

    pub async fn thread_dump(&self) -> Result<ThreadDumpResponse> {
        self.get_json("/threaddump", "threaddump", "failed to get thread dump")
            .await
    }

    pub async fn beans(&self) -> Result<BeansResponse> {
        self.get_json("/beans", "beans", "failed to get beans").await
    }

    /// Fetch any endpoint below the base path without decoding it
    ///
    /// An empty endpoint or `/` addresses the discovery page.
    pub async fn raw(&self, endpoint: &str) -> Result<Vec<u8>> {
        let path = normalize_raw_endpoint(endpoint);
        let response = self.http.get(&path).await?;
        if response.is_error_status() {
            let name = if path.is_empty() { "/" } else { path.as_str() };
            return Err(classify(&response, name, "failed to get endpoint").into());
        }
        Ok(response.body)
    }

    pub async fn index(&self) -> Result<ActuatorIndex> {
        self.get_json("", "index", "failed to get actuator index").await
    }

    /// Endpoint names advertised by the discovery page
    pub async fn available_endpoints(&self) -> Result<Vec<String>> {
        Ok(self.index().await?.endpoint_names())
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, endpoint: &str, context: &str) -> Result<T> {
        let response = self.http.get(path).await?;
        if response.is_error_status() {
            return Err(classify(&response, endpoint, context).into());
        }
        decode(&response, endpoint)
    }

    /// GET a named resource under a collection, telling a missing resource
    /// apart from a missing endpoint
    async fn get_sub_resource<T: DeserializeOwned>(
        &self,
        path: &str,
        collection: &str,
        endpoint: &str,
        resource_type: &str,
        name: &str,
        context: &str,
    ) -> Result<T> {
        let response = self.http.get(path).await?;
        if !response.is_error_status() {
            return decode(&response, endpoint);
        }

        if response.status_code == 404 && self.is_accessible(collection).await {
            return Err(EndpointError::ResourceNotFound {
                resource_type: resource_type.to_string(),
                name: name.to_string(),
                status: response.status,
            }
            .into());
        }

        Err(classify(&response, endpoint, context).into())
    }

    /// Probe a collection root; transport failures count as inaccessible
    async fn is_accessible(&self, path: &str) -> bool {
        match self.http.get(path).await {
            Ok(response) => response.status_code != 404,
            Err(e) => {
                debug!(path, error = %e, "Endpoint probe failed");
                false
            }
        }
    }
}

/// A 404 means the endpoint is not exposed; anything else is reported as is
fn classify(response: &ActuatorResponse, endpoint: &str, context: &str) -> EndpointError {
    if response.status_code == 404 {
        not_exposed(response, endpoint, context)
    } else {
        EndpointError::Status {
            endpoint: endpoint.to_string(),
            status: response.status.clone(),
            context: context.to_string(),
        }
    }
}

fn not_exposed(response: &ActuatorResponse, endpoint: &str, context: &str) -> EndpointError {
    EndpointError::NotExposed {
        endpoint: endpoint.to_string(),
        status: response.status.clone(),
        context: context.to_string(),
    }
}

fn decode<T: DeserializeOwned>(response: &ActuatorResponse, endpoint: &str) -> Result<T> {
    serde_json::from_slice(&response.body).map_err(|e| ActuatorError::decode(endpoint, e))
}

fn normalize_raw_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim();
    if trimmed.is_empty() || trimmed == "/" {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}
