//! Target resolution
//!
//! Turns the operator's `--pod`, `--deployment` and `--selector` inputs into
//! the ordered, deduplicated list of pods a command runs against.

use std::collections::HashSet;
use tracing::debug;

use super::cluster::ClusterApi;
use crate::errors::{ActuatorError, Result};

/// What the operator asked to target
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetSpec {
    pub pods: Vec<String>,
    pub deployments: Vec<String>,
    pub selectors: Vec<String>,
}

impl TargetSpec {
    pub fn new(pods: Vec<String>, deployments: Vec<String>, selectors: Vec<String>) -> Self {
        Self {
            pods,
            deployments,
            selectors,
        }
    }

    /// True when no pod, deployment or selector was given
    pub fn is_empty(&self) -> bool {
        self.pods.is_empty() && self.deployments.is_empty() && self.selectors.is_empty()
    }
}

/// Unique pod names in first-seen order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedPodSet {
    pods: Vec<String>,
}

impl ResolvedPodSet {
    /// Keep the first occurrence of each name, dropping empty names
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let pods = names
            .into_iter()
            .map(Into::into)
            .filter(|name: &String| !name.is_empty())
            .filter(|name| seen.insert(name.clone()))
            .collect();
        Self { pods }
    }

    pub fn as_slice(&self) -> &[String] {
        &self.pods
    }

    pub fn len(&self) -> usize {
        self.pods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pods.is_empty()
    }

    pub fn first(&self) -> Option<&str> {
        self.pods.first().map(String::as_str)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.pods.iter()
    }
}

impl<'a> IntoIterator for &'a ResolvedPodSet {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.pods.iter()
    }
}

/// Resolve a [`TargetSpec`] against the cluster
///
/// Explicit pods come first, then each deployment's pods, then each
/// selector's pods. Lookup failures abort resolution unchanged.
pub async fn resolve_targets(
    cluster: &dyn ClusterApi,
    namespace: &str,
    spec: &TargetSpec,
) -> Result<ResolvedPodSet> {
    if spec.is_empty() {
        return Err(ActuatorError::NoTargetsSelected);
    }

    let mut names = spec.pods.clone();

    for deployment in &spec.deployments {
        let pods = cluster.get_deployment_pods(namespace, deployment).await?;
        debug!(deployment = %deployment, count = pods.len(), "Resolved deployment");
        names.extend(pods);
    }

    let mut unmatched = Vec::new();
    for selector in &spec.selectors {
        let pods = cluster.list_pods(namespace, selector).await?;
        debug!(selector = %selector, count = pods.len(), "Resolved selector");
        if pods.is_empty() {
            unmatched.push(selector.clone());
        }
        names.extend(pods);
    }

    let resolved = ResolvedPodSet::from_names(names);

    if resolved.is_empty() {
        if !unmatched.is_empty() {
            return Err(ActuatorError::SelectorMatchedNoPods {
                selectors: unmatched,
            });
        }
        return Err(ActuatorError::NoTargetsSelected);
    }

    Ok(resolved)
}
