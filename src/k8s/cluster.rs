//! Cluster API capability
//!
//! The handful of lookups the resolver and the client factory need from the
//! Kubernetes API, behind a trait so tests can run without a cluster.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::{Api, ListParams};
use kube::config::KubeConfigOptions;
use kube::{Client, Config};
use tracing::debug;

use crate::errors::ClusterError;

#[cfg(test)]
use mockall::automock;

/// Read-only view of the cluster used to resolve targets and pod settings
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Fetch a single pod
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, ClusterError>;

    /// Names of the pods matching a label selector (empty selector lists all)
    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<String>, ClusterError>;

    /// Names of all deployments in the namespace
    async fn list_deployments(&self, namespace: &str) -> Result<Vec<String>, ClusterError>;

    /// Names of the pods selected by a deployment's label selector
    async fn get_deployment_pods(
        &self,
        namespace: &str,
        deployment: &str,
    ) -> Result<Vec<String>, ClusterError>;
}

/// [`ClusterApi`] backed by a kube client
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    namespace: String,
}

impl KubeCluster {
    /// Connect using the local kubeconfig
    ///
    /// `context` selects a kubeconfig context; `namespace` overrides the
    /// namespace the context would otherwise default to.
    pub async fn connect(
        context: Option<&str>,
        namespace: Option<&str>,
    ) -> Result<Self, ClusterError> {
        let options = KubeConfigOptions {
            context: context.map(str::to_string),
            ..Default::default()
        };

        let config = match Config::from_kubeconfig(&options).await {
            Ok(config) => config,
            // Running inside a pod without a kubeconfig
            Err(kubeconfig_err) if context.is_none() => Config::incluster().map_err(|_| {
                ClusterError::Kubeconfig(kubeconfig_err.to_string())
            })?,
            Err(e) => return Err(ClusterError::Kubeconfig(e.to_string())),
        };

        let namespace = namespace
            .map(str::to_string)
            .unwrap_or_else(|| config.default_namespace.clone());
        let client = Client::try_from(config)?;

        debug!(namespace = %namespace, "Connected to cluster");
        Ok(Self { client, namespace })
    }

    /// The underlying kube client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Namespace commands operate in
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, ClusterError> {
        self.pods(namespace)
            .get_opt(name)
            .await?
            .ok_or_else(|| ClusterError::NotFound {
                kind: "pod",
                name: name.to_string(),
            })
    }

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<String>, ClusterError> {
        let mut params = ListParams::default();
        if !selector.is_empty() {
            params = params.labels(selector);
        }

        let list = self.pods(namespace).list(&params).await?;
        Ok(list
            .items
            .into_iter()
            .filter_map(|pod| pod.metadata.name)
            .collect())
    }

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<String>, ClusterError> {
        let list = self.deployments(namespace).list(&ListParams::default()).await?;
        Ok(list
            .items
            .into_iter()
            .filter_map(|deployment| deployment.metadata.name)
            .collect())
    }

    async fn get_deployment_pods(
        &self,
        namespace: &str,
        deployment: &str,
    ) -> Result<Vec<String>, ClusterError> {
        let found = self
            .deployments(namespace)
            .get_opt(deployment)
            .await?
            .ok_or_else(|| ClusterError::NotFound {
                kind: "deployment",
                name: deployment.to_string(),
            })?;

        let selector = found
            .spec
            .as_ref()
            .map(|spec| &spec.selector)
            .ok_or_else(|| ClusterError::InvalidSelector {
                deployment: deployment.to_string(),
                reason: "deployment has no spec".to_string(),
            })
            .and_then(|selector| selector_to_string(deployment, selector))?;

        debug!(deployment, selector = %selector, "Expanding deployment to pods");
        self.list_pods(namespace, &selector).await
    }
}

/// Render a `LabelSelector` in the label-selector query syntax
///
/// An empty selector would match every pod in the namespace, which is never
/// what a deployment means, so it is rejected.
pub fn selector_to_string(deployment: &str, selector: &LabelSelector) -> Result<String, ClusterError> {
    let invalid = |reason: String| ClusterError::InvalidSelector {
        deployment: deployment.to_string(),
        reason,
    };

    let mut terms = Vec::new();

    if let Some(labels) = &selector.match_labels {
        for (key, value) in labels {
            terms.push(format!("{}={}", key, value));
        }
    }

    for expr in selector.match_expressions.iter().flatten() {
        let values = expr.values.clone().unwrap_or_default();
        let term = match expr.operator.as_str() {
            "In" | "NotIn" => {
                if values.is_empty() {
                    return Err(invalid(format!(
                        "operator {} on key {} requires values",
                        expr.operator, expr.key
                    )));
                }
                let op = if expr.operator == "In" { "in" } else { "notin" };
                format!("{} {} ({})", expr.key, op, values.join(","))
            }
            "Exists" => expr.key.clone(),
            "DoesNotExist" => format!("!{}", expr.key),
            other => return Err(invalid(format!("unknown operator {}", other))),
        };
        terms.push(term);
    }

    if terms.is_empty() {
        return Err(invalid("selector is empty".to_string()));
    }

    Ok(terms.join(","))
}
