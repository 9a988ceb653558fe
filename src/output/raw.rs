use serde::Serialize;
use serde_json::Value;

use super::to_pretty_json;
use crate::errors::Result;

/// Aggregate document printed by `raw`, one entry per pod
#[derive(Debug, Clone, Default, Serialize)]
pub struct RawOutput {
    pub pods: Vec<PodResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PodResult {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub error: Option<String>,
}

impl PodResult {
    /// Embed the body as JSON; anything else is kept as a string
    pub fn success(name: impl Into<String>, body: &[u8]) -> Self {
        let data = serde_json::from_slice(body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()));
        Self {
            name: name.into(),
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(name: impl Into<String>, error: impl ToString) -> Self {
        Self {
            name: name.into(),
            data: None,
            error: Some(error.to_string()),
        }
    }
}

impl RawOutput {
    pub fn push(&mut self, result: PodResult) {
        self.pods.push(result);
    }

    pub fn render(&self) -> Result<String> {
        to_pretty_json(self)
    }
}
