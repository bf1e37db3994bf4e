use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use silhouette_contracts::models::{Capability, ModelRegistry, PollPolicy};
use tracing::info;

use crate::client::{ReplicateClient, DEFAULT_REPLICATE_API_BASE};
use crate::credential::Credential;
use crate::removal::{BriaRemover, RemoveBgRemover, DEFAULT_BRIA_API_URL, DEFAULT_REMOVE_BG_API_URL};
use crate::studio::Studio;

pub const DEFAULT_BIND: &str = "0.0.0.0:3000";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

/// Settings read from the environment (and an optional `.env` file).
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub bind: SocketAddr,
    pub replicate_api_base: String,
    pub replicate_token: Option<String>,
    pub bria_api_key: Option<String>,
    pub bria_api_url: String,
    pub remove_bg_api_key: Option<String>,
    pub remove_bg_api_url: String,
    pub background_remover: Option<String>,
    pub poll_interval: Option<Duration>,
    pub generate_max_attempts: Option<u32>,
    pub removal_max_attempts: Option<u32>,
    pub http_timeout: Duration,
    pub models_file: Option<PathBuf>,
}

impl ServiceConfig {
    /// Process environment first, then `env_file` (or `./.env` when present).
    pub fn load(env_file: Option<&Path>) -> anyhow::Result<Self> {
        let file_vars = match env_file {
            Some(path) => read_env_file(path)?,
            None => {
                let default = Path::new(".env");
                if default.is_file() {
                    read_env_file(default)?
                } else {
                    HashMap::new()
                }
            }
        };
        Self::from_lookup(|key| {
            env::var(key)
                .ok()
                .or_else(|| file_vars.get(key).cloned())
        })
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };

        let bind = value("SILHOUETTE_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind
            .parse::<SocketAddr>()
            .with_context(|| format!("SILHOUETTE_BIND is not a socket address: {bind}"))?;

        Ok(Self {
            bind,
            replicate_api_base: value("REPLICATE_API_BASE")
                .unwrap_or_else(|| DEFAULT_REPLICATE_API_BASE.to_string()),
            replicate_token: value("REPLICATE_API_TOKEN").or_else(|| value("REPLICATE_API_KEY")),
            bria_api_key: value("BRIA_API_KEY"),
            bria_api_url: value("BRIA_API_URL").unwrap_or_else(|| DEFAULT_BRIA_API_URL.to_string()),
            remove_bg_api_key: value("REMOVE_BG_API_KEY"),
            remove_bg_api_url: value("REMOVE_BG_API_URL")
                .unwrap_or_else(|| DEFAULT_REMOVE_BG_API_URL.to_string()),
            background_remover: value("SILHOUETTE_BACKGROUND_REMOVER"),
            poll_interval: parse_var::<u64>(&value, "SILHOUETTE_POLL_INTERVAL_MS")?
                .map(Duration::from_millis),
            generate_max_attempts: attempts_var(&value, "SILHOUETTE_GENERATE_MAX_ATTEMPTS")?,
            removal_max_attempts: attempts_var(&value, "SILHOUETTE_REMOVAL_MAX_ATTEMPTS")?,
            http_timeout: Duration::from_secs(
                parse_var(&value, "SILHOUETTE_HTTP_TIMEOUT_SECS")?
                    .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
            ),
            models_file: value("SILHOUETTE_MODELS_FILE").map(PathBuf::from),
        })
    }

    /// Explicit choice (with `replicate` as an alias for `rmbg-1.4`), else
    /// BRIA or Remove.bg when keyed, else the first Replicate remover.
    pub fn background_model(&self) -> Option<String> {
        if let Some(choice) = &self.background_remover {
            let normalized = choice.to_ascii_lowercase();
            return Some(match normalized.as_str() {
                "replicate" => "rmbg-1.4".to_string(),
                "removebg" | "remove.bg" => "remove-bg".to_string(),
                _ => normalized,
            });
        }
        if self.bria_api_key.is_some() {
            return Some("bria".to_string());
        }
        if self.remove_bg_api_key.is_some() {
            return Some("remove-bg".to_string());
        }
        None
    }

    pub fn apply_poll_overrides(&self, registry: &mut ModelRegistry) {
        for spec in registry.list_mut() {
            let max_attempts = match spec.capability {
                Capability::BackgroundRemoval => self.removal_max_attempts,
                _ => self.generate_max_attempts,
            }
            .unwrap_or(spec.poll.max_attempts);
            let interval = self.poll_interval.unwrap_or_else(|| spec.poll.interval());
            spec.poll = PollPolicy::new(interval, max_attempts);
        }
    }

    pub fn registry(&self) -> anyhow::Result<ModelRegistry> {
        let mut registry = ModelRegistry::default();
        if let Some(path) = &self.models_file {
            let merged = registry.merge_json_file(path)?;
            info!(path = %path.display(), merged, "loaded model overrides");
        }
        self.apply_poll_overrides(&mut registry);
        Ok(registry)
    }

    pub fn build_studio(&self) -> anyhow::Result<Studio> {
        let http = reqwest::Client::builder()
            .timeout(self.http_timeout)
            .build()
            .context("failed to build HTTP client")?;
        let registry = self.registry()?;
        let default_credential = self
            .replicate_token
            .as_deref()
            .map(Credential::parse)
            .transpose()
            .context("REPLICATE_API_TOKEN is malformed")?;
        let api = Arc::new(ReplicateClient::new(&self.replicate_api_base, http.clone()));

        let mut studio = Studio::new(registry.clone(), api)
            .with_default_credential(default_credential)
            .with_background_model(self.background_model());
        if let (Some(key), Some(spec)) = (&self.bria_api_key, registry.get("bria")) {
            studio = studio.with_remover(Box::new(BriaRemover::new(
                spec.clone(),
                &self.bria_api_url,
                key,
                http.clone(),
            )));
        }
        if let (Some(key), Some(spec)) = (&self.remove_bg_api_key, registry.get("remove-bg")) {
            studio = studio.with_remover(Box::new(RemoveBgRemover::new(
                spec.clone(),
                &self.remove_bg_api_url,
                key,
                http,
            )));
        }
        if let Some(name) = self.background_model() {
            studio.background_remover().with_context(|| {
                format!("SILHOUETTE_BACKGROUND_REMOVER names '{name}', which has no usable remover")
            })?;
        }
        info!(
            replicate_api_base = %self.replicate_api_base,
            default_token = self.replicate_token.is_some(),
            removers = ?studio.removers(),
            "studio configured"
        );
        Ok(studio)
    }
}

fn read_env_file(path: &Path) -> anyhow::Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    let iter = dotenvy::from_path_iter(path)
        .with_context(|| format!("failed to open env file {}", path.display()))?;
    for item in iter {
        let (key, value) =
            item.with_context(|| format!("invalid line in env file {}", path.display()))?;
        vars.insert(key, value);
    }
    Ok(vars)
}

fn parse_var<T>(value: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value(key)
        .map(|raw| {
            raw.parse::<T>()
                .with_context(|| format!("{key} must be a non-negative integer, got {raw:?}"))
        })
        .transpose()
}

fn attempts_var(value: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<u32>> {
    match parse_var::<u32>(value, key)? {
        Some(0) => anyhow::bail!("{key} must be at least 1"),
        other => Ok(other),
    }
}
