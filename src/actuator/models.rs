//! Typed actuator response models
//!
//! Shapes follow the Spring Boot Actuator JSON. Every field tolerates being
//! absent so that older or trimmed-down actuator versions still decode.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// `GET /health`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthResponse {
    pub status: String,
    pub components: BTreeMap<String, HealthComponent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
}

/// One health indicator, possibly composite
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthComponent {
    pub status: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub components: BTreeMap<String, HealthComponent>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub details: Map<String, Value>,
}

/// `GET /loggers`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggersResponse {
    pub levels: Vec<String>,
    pub loggers: BTreeMap<String, LoggerLevels>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoggerLevels {
    pub configured_level: Option<String>,
    pub effective_level: Option<String>,
}

/// A logger with its name attached
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggerConfiguration {
    pub name: String,
    pub configured_level: Option<String>,
    pub effective_level: Option<String>,
}

/// Body of `POST /loggers/{name}`; `null` resets to the inherited level
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetLoggerLevelRequest {
    pub configured_level: Option<String>,
}

/// `GET /scheduledtasks`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScheduledTasksResponse {
    pub cron: Vec<CronTask>,
    pub fixed_delay: Vec<FixedIntervalTask>,
    pub fixed_rate: Vec<FixedIntervalTask>,
    pub custom: Vec<CustomTask>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Runnable {
    pub target: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NextExecution {
    pub time: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskException {
    pub message: String,
    #[serde(rename = "type")]
    pub exception_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LastExecution {
    pub time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<TaskException>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CronTask {
    pub runnable: Runnable,
    pub expression: String,
    pub next_execution: Option<NextExecution>,
    pub last_execution: Option<LastExecution>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FixedIntervalTask {
    pub runnable: Runnable,
    pub initial_delay: i64,
    pub interval: i64,
    pub next_execution: Option<NextExecution>,
    pub last_execution: Option<LastExecution>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CustomTask {
    pub runnable: Runnable,
    pub trigger: Option<String>,
    pub next_execution: Option<NextExecution>,
    pub last_execution: Option<LastExecution>,
}

/// `GET /metrics`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsListResponse {
    pub names: Vec<String>,
}

/// `GET /metrics/{name}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MetricResponse {
    pub name: String,
    pub description: Option<String>,
    pub base_unit: Option<String>,
    pub measurements: Vec<Measurement>,
    pub available_tags: Vec<AvailableTag>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Measurement {
    pub statistic: String,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvailableTag {
    pub tag: String,
    pub values: Vec<String>,
}

/// `GET /env`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EnvResponse {
    pub active_profiles: Vec<String>,
    pub property_sources: Vec<PropertySource>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertySource {
    pub name: String,
    pub properties: BTreeMap<String, PropertyDetails>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyDetails {
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

/// `GET /env/{name}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EnvPropertyResponse {
    pub property: Option<PropertyValue>,
    pub active_profiles: Vec<String>,
    pub default_profiles: Vec<String>,
    pub property_sources: Vec<PropertySourceReference>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyValue {
    pub source: String,
    pub value: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertySourceReference {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property: Option<Value>,
}

/// `GET /threaddump`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadDumpResponse {
    pub threads: Vec<ThreadInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ThreadInfo {
    pub thread_name: String,
    pub thread_id: i64,
    pub thread_state: String,
    pub blocked_count: i64,
    pub blocked_time: i64,
    pub waited_count: i64,
    pub waited_time: i64,
    pub lock_name: Option<String>,
    pub lock_owner_id: i64,
    pub lock_owner_name: Option<String>,
    pub daemon: bool,
    pub in_native: bool,
    pub suspended: bool,
    pub priority: i32,
    pub stack_trace: Vec<StackFrame>,
    pub locked_monitors: Vec<Value>,
    pub locked_synchronizers: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StackFrame {
    pub class_name: String,
    pub method_name: String,
    pub file_name: Option<String>,
    pub line_number: Option<i32>,
    pub native_method: bool,
}

/// `GET /beans`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeansResponse {
    pub contexts: BTreeMap<String, BeanContext>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BeanContext {
    pub beans: BTreeMap<String, Bean>,
    #[serde(alias = "parent", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bean {
    pub aliases: Vec<String>,
    pub scope: String,
    #[serde(rename = "type")]
    pub bean_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    pub dependencies: Vec<String>,
}

/// Actuator discovery page (`GET <base path>`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ActuatorIndex {
    #[serde(rename = "_links")]
    pub links: BTreeMap<String, Link>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Link {
    pub href: String,
    pub templated: bool,
}

/// Suffixes Spring appends to templated link names
const TEMPLATE_SUFFIXES: &[&str] = &[
    "-path",
    "-name",
    "-cache",
    "-prefix",
    "-toMatch",
    "-requiredMetricName",
];

impl ActuatorIndex {
    /// Endpoint names advertised by the index, without `self` and with
    /// templated variants folded into their base endpoint
    pub fn endpoint_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::with_capacity(self.links.len());

        for (name, link) in &self.links {
            if name == "self" {
                continue;
            }

            let mut base = name.as_str();
            if link.templated {
                for suffix in TEMPLATE_SUFFIXES {
                    base = base.strip_suffix(suffix).unwrap_or(base);
                }
            }

            if !names.iter().any(|n| n == base) {
                names.push(base.to_string());
            }
        }

        names
    }
}
