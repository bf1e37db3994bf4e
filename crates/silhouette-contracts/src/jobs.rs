use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::models::{ModelRef, ModelSpec};

/// Provider-reported prediction status, normalized across vendor spellings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Canceled,
    Other(String),
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::Other(raw) => raw.as_str(),
        }
    }
}

impl From<String> for JobStatus {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "starting" | "queued" => Self::Queued,
            "processing" | "running" => Self::Running,
            "succeeded" | "success" => Self::Succeeded,
            "failed" | "error" => Self::Failed,
            "canceled" | "cancelled" => Self::Canceled,
            _ => Self::Other(raw),
        }
    }
}

impl From<JobStatus> for String {
    fn from(status: JobStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobUrls {
    pub get: Option<String>,
    pub cancel: Option<String>,
}

/// A remote prediction as last observed by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub urls: Option<JobUrls>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(id: impl Into<String>, status: JobStatus) -> Self {
        Self {
            id: id.into(),
            status,
            output: None,
            error: None,
            urls: None,
            created_at: None,
            completed_at: None,
        }
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(Value::String(error.into()));
        self
    }

    pub fn artifact_urls(&self) -> Vec<String> {
        let mut urls = Vec::new();
        if let Some(output) = &self.output {
            extract_output_urls(output, &mut urls);
        }
        urls
    }

    pub fn first_artifact_url(&self) -> Option<String> {
        self.artifact_urls().into_iter().next()
    }

    /// Provider error text, verbatim when it is a string.
    pub fn error_detail(&self) -> Option<String> {
        match self.error.as_ref()? {
            Value::Null => None,
            Value::String(text) if text.trim().is_empty() => None,
            Value::String(text) => Some(text.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn run_time(&self) -> Option<chrono::Duration> {
        Some(self.completed_at? - self.created_at?)
    }
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| {
        DateTime::parse_from_rfc3339(value.trim())
            .ok()
            .map(|parsed| parsed.with_timezone(&Utc))
    }))
}

pub fn extract_output_urls(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(url) => {
            let trimmed = url.trim();
            if !trimmed.is_empty()
                && trimmed.starts_with("http")
                && !out.iter().any(|existing| existing == trimmed)
            {
                out.push(trimmed.to_string());
            }
        }
        Value::Array(rows) => {
            for row in rows {
                extract_output_urls(row, out);
            }
        }
        Value::Object(obj) => {
            if let Some(url) = obj.get("url") {
                extract_output_urls(url, out);
            }
            if let Some(urls) = obj.get("urls") {
                extract_output_urls(urls, out);
            }
            if let Some(output) = obj.get("output") {
                extract_output_urls(output, out);
            }
        }
        _ => {}
    }
}

/// Output-sizing hints forwarded to the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SizingOptions {
    pub aspect_ratio: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub megapixels: Option<String>,
}

impl SizingOptions {
    pub fn aspect_ratio(&self) -> Option<String> {
        if let Some(ratio) = self
            .aspect_ratio
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            return Some(ratio.to_string());
        }
        let (width, height) = (self.width?, self.height?);
        if width == 0 || height == 0 {
            return None;
        }
        let divisor = gcd(width, height);
        Some(format!("{}:{}", width / divisor, height / divisor))
    }

    pub fn apply(&self, inputs: &mut Map<String, Value>) {
        if let Some(ratio) = self.aspect_ratio() {
            inputs.insert("aspect_ratio".to_string(), Value::String(ratio));
        }
        if let Some(megapixels) = self
            .megapixels
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            inputs.insert(
                "megapixels".to_string(),
                Value::String(megapixels.to_string()),
            );
        }
    }
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// A prediction submission. Built once, never mutated after submit.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub model: String,
    pub selector: ModelRef,
    pub inputs: Map<String, Value>,
}

impl GenerationRequest {
    /// Model defaults first, then caller inputs on top.
    pub fn for_model(spec: &ModelSpec, inputs: Map<String, Value>) -> Option<Self> {
        let selector = spec.selector.clone()?;
        let mut merged = spec.default_inputs.clone();
        for (key, value) in inputs {
            merged.insert(key, value);
        }
        Some(Self {
            model: spec.name.clone(),
            selector,
            inputs: merged,
        })
    }

    pub fn prompt(&self) -> Option<&str> {
        self.inputs.get("prompt").and_then(Value::as_str)
    }

    pub fn payload(&self) -> Value {
        let mut body = Map::new();
        body.insert(
            self.selector.key().to_string(),
            Value::String(self.selector.value().to_string()),
        );
        body.insert("input".to_string(), Value::Object(self.inputs.clone()));
        Value::Object(body)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedArtifact {
    pub image_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transparent_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction_id: Option<String>,
}
