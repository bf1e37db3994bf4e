use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    TextToImage,
    ImageToImage,
    BackgroundRemoval,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TextToImage => "text-to-image",
            Self::ImageToImage => "image-to-image",
            Self::BackgroundRemoval => "background-removal",
        }
    }

    /// Generation capabilities always surface upstream failures to the caller.
    pub fn is_generation(&self) -> bool {
        matches!(self, Self::TextToImage | Self::ImageToImage)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    Replicate,
    Bria,
    RemoveBg,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Replicate => "replicate",
            Self::Bria => "bria",
            Self::RemoveBg => "remove-bg",
        }
    }
}

/// How a prediction names the model it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelRef {
    Version(String),
    Model(String),
}

impl ModelRef {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Version(_) => "version",
            Self::Model(_) => "model",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Self::Version(value) | Self::Model(value) => value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    pub interval_ms: u64,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval_ms: interval.as_millis() as u64,
            max_attempts,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), 60)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    pub provider: ProviderKind,
    pub capability: Capability,
    #[serde(default)]
    pub selector: Option<ModelRef>,
    #[serde(default)]
    pub default_inputs: Map<String, Value>,
    #[serde(default)]
    pub prefer_wait: bool,
    #[serde(default)]
    pub poll: PollPolicy,
    #[serde(default = "default_propagate")]
    pub propagate_failure: bool,
}

fn default_propagate() -> bool {
    true
}

impl ModelSpec {
    pub fn supports(&self, capability: Capability) -> bool {
        self.capability == capability
    }

    pub fn accepts_input(&self, key: &str) -> bool {
        self.default_inputs.contains_key(key)
    }
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn list_mut(&mut self) -> impl Iterator<Item = &mut ModelSpec> {
        self.models.values_mut()
    }

    pub fn by_capability(&self, capability: Capability) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.supports(capability))
            .cloned()
            .collect()
    }

    pub fn ensure(&self, name: &str, capability: Capability) -> Option<ModelSpec> {
        let model = self.get(name)?;
        if model.supports(capability) {
            return Some(model.clone());
        }
        None
    }

    /// Adds or replaces a model. Generation models must propagate failures.
    pub fn insert(&mut self, spec: ModelSpec) -> anyhow::Result<()> {
        if spec.name.trim().is_empty() {
            bail!("model entry is missing a name");
        }
        if spec.capability.is_generation() && !spec.propagate_failure {
            bail!(
                "model '{}' is {} and cannot degrade failures",
                spec.name,
                spec.capability
            );
        }
        if spec.provider == ProviderKind::Replicate && spec.selector.is_none() {
            bail!("replicate model '{}' needs a version or model selector", spec.name);
        }
        if spec.poll.max_attempts == 0 {
            bail!("model '{}' must allow at least one status check", spec.name);
        }
        self.models.insert(spec.name.clone(), spec);
        Ok(())
    }

    /// Merges a JSON array of model entries over the current table.
    pub fn merge_json_file(&mut self, path: &Path) -> anyhow::Result<usize> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read model table {}", path.display()))?;
        let specs: Vec<ModelSpec> = serde_json::from_str(&raw)
            .with_context(|| format!("invalid model table {}", path.display()))?;
        let count = specs.len();
        for spec in specs {
            self.insert(spec)?;
        }
        Ok(count)
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str,
                      provider: ProviderKind,
                      capability: Capability,
                      selector: Option<ModelRef>,
                      default_inputs: Value,
                      prefer_wait: bool,
                      max_attempts: u32| {
        map.insert(
            name.to_string(),
            ModelSpec {
                name: name.to_string(),
                provider,
                capability,
                selector,
                default_inputs: default_inputs.as_object().cloned().unwrap_or_default(),
                prefer_wait,
                poll: PollPolicy::new(Duration::from_secs(1), max_attempts),
                propagate_failure: capability.is_generation(),
            },
        );
    };

    insert(
        "flux-schnell",
        ProviderKind::Replicate,
        Capability::TextToImage,
        Some(ModelRef::Version(
            "5599ed30703defd1d160a25a63321b4dec97101d98b4674bcc56e41f62f35637".to_string(),
        )),
        json!({
            "go_fast": true,
            "megapixels": "1",
            "num_outputs": 1,
            "aspect_ratio": "2:3",
            "output_format": "png",
            "output_quality": 100,
            "num_inference_steps": 4,
        }),
        true,
        60,
    );
    insert(
        "flux-dev",
        ProviderKind::Replicate,
        Capability::ImageToImage,
        Some(ModelRef::Model("black-forest-labs/flux-dev".to_string())),
        json!({
            "num_outputs": 1,
            "aspect_ratio": "2:3",
            "output_format": "png",
            "output_quality": 100,
            "prompt_strength": 0.8,
        }),
        true,
        60,
    );
    insert(
        "rmbg-1.4",
        ProviderKind::Replicate,
        Capability::BackgroundRemoval,
        Some(ModelRef::Version(
            "95fcc2a26d3899cd6c2691c900465aaeff466285a65c14638cc5f36f34befaf1".to_string(),
        )),
        json!({}),
        false,
        30,
    );
    insert(
        "rembg",
        ProviderKind::Replicate,
        Capability::BackgroundRemoval,
        Some(ModelRef::Model("cjwbw/rembg".to_string())),
        json!({}),
        false,
        30,
    );
    insert(
        "bria",
        ProviderKind::Bria,
        Capability::BackgroundRemoval,
        None,
        json!({ "output_type": "url" }),
        false,
        1,
    );
    insert(
        "remove-bg",
        ProviderKind::RemoveBg,
        Capability::BackgroundRemoval,
        None,
        json!({ "size": "auto", "format": "png" }),
        false,
        1,
    );

    map
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn default_table_covers_every_capability() {
        let registry = ModelRegistry::default();
        for capability in [
            Capability::TextToImage,
            Capability::ImageToImage,
            Capability::BackgroundRemoval,
        ] {
            assert!(
                !registry.by_capability(capability).is_empty(),
                "no model for {capability}"
            );
        }
        let schnell = registry.get("flux-schnell").cloned().unwrap();
        assert!(schnell.prefer_wait);
        assert_eq!(schnell.poll.max_attempts, 60);
        assert_eq!(schnell.poll.interval(), Duration::from_secs(1));
        assert_eq!(schnell.default_inputs["aspect_ratio"], json!("2:3"));
    }

    #[test]
    fn removal_models_degrade_and_generation_models_propagate() {
        let registry = ModelRegistry::default();
        for model in registry.list() {
            assert_eq!(model.propagate_failure, model.capability.is_generation());
        }
        let rmbg = registry.by_capability(Capability::BackgroundRemoval);
        assert_eq!(rmbg[0].name, "rmbg-1.4");
        assert_eq!(rmbg[0].poll.max_attempts, 30);
    }

    #[test]
    fn insert_rejects_degrading_generation_model() {
        let mut registry = ModelRegistry::default();
        let mut spec = registry.get("flux-schnell").cloned().unwrap();
        spec.name = "lenient".to_string();
        spec.propagate_failure = false;
        let err = registry.insert(spec).err().map(|err| err.to_string());
        assert_eq!(
            err.as_deref(),
            Some("model 'lenient' is text-to-image and cannot degrade failures")
        );
    }

    #[test]
    fn merge_json_file_adds_and_overrides_models() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("models.json");
        fs::write(
            &path,
            r#"[
                {
                    "name": "flux-schnell",
                    "provider": "replicate",
                    "capability": "text-to-image",
                    "selector": {"model": "black-forest-labs/flux-schnell"},
                    "default_inputs": {"num_outputs": 1},
                    "poll": {"interval_ms": 500, "max_attempts": 10}
                },
                {
                    "name": "birefnet",
                    "provider": "replicate",
                    "capability": "background-removal",
                    "selector": {"version": "abc123"},
                    "propagate_failure": false
                }
            ]"#,
        )?;

        let mut registry = ModelRegistry::default();
        let merged = registry.merge_json_file(&path)?;
        assert_eq!(merged, 2);

        let schnell = registry
            .get("flux-schnell")
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("flux-schnell missing"))?;
        assert_eq!(
            schnell.selector,
            Some(ModelRef::Model("black-forest-labs/flux-schnell".to_string()))
        );
        assert_eq!(schnell.poll.max_attempts, 10);
        assert!(schnell.propagate_failure);
        assert!(!schnell.prefer_wait);

        let birefnet = registry
            .ensure("birefnet", Capability::BackgroundRemoval)
            .ok_or_else(|| anyhow::anyhow!("birefnet missing"))?;
        assert_eq!(birefnet.poll, PollPolicy::default());
        assert!(!birefnet.propagate_failure);
        Ok(())
    }
}
