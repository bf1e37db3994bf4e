use std::sync::Arc;

use serde_json::{Map, Value};
use silhouette_contracts::jobs::{GeneratedArtifact, SizingOptions};
use silhouette_contracts::models::{Capability, ModelRegistry, ModelSelector, ProviderKind};
use silhouette_contracts::prompt::{build_prompt, BackgroundMode, BuiltPrompt, GenerationMode, Selections};
use silhouette_contracts::providers::ProviderRegistry;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapters::PredictionAdapter;
use crate::client::PredictionApi;
use crate::credential::Credential;
use crate::error::{JobError, Result};
use crate::removal::{remove_background, BackgroundRemover, RemovalOutcome, ReplicateRemover};

#[derive(Debug, Clone, Default)]
pub struct GenerateInput {
    pub prompt: String,
    pub credential: Option<String>,
    pub sizing: SizingOptions,
    pub reference_image_url: Option<String>,
    pub strength: Option<f64>,
    pub negative_prompt: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Generated {
    pub image_url: String,
    pub prediction_id: String,
    pub model: String,
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SilhouetteInput {
    pub selections: Selections,
    pub background: BackgroundMode,
    pub reference_image_url: Option<String>,
    pub strength: Option<f64>,
    pub credential: Option<String>,
    pub sizing: SizingOptions,
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SilhouetteResult {
    pub prompt: BuiltPrompt,
    pub model: String,
    pub artifact: GeneratedArtifact,
}

/// Image generation and background removal over one prediction provider.
pub struct Studio {
    selector: ModelSelector,
    api: Arc<dyn PredictionApi>,
    removers: ProviderRegistry<Box<dyn BackgroundRemover>>,
    background_model: Option<String>,
    default_credential: Option<Credential>,
}

impl Studio {
    /// Every Replicate-hosted background model in `registry` gets a remover.
    pub fn new(registry: ModelRegistry, api: Arc<dyn PredictionApi>) -> Self {
        let mut removers: ProviderRegistry<Box<dyn BackgroundRemover>> = ProviderRegistry::default();
        for spec in registry.by_capability(Capability::BackgroundRemoval) {
            if spec.provider == ProviderKind::Replicate {
                removers.register(Box::new(ReplicateRemover::new(api.clone(), spec)));
            }
        }
        Self {
            selector: ModelSelector::new(Some(registry)),
            api,
            removers,
            background_model: None,
            default_credential: None,
        }
    }

    pub fn with_remover(mut self, remover: Box<dyn BackgroundRemover>) -> Self {
        self.removers.register(remover);
        self
    }

    pub fn with_background_model(mut self, name: Option<String>) -> Self {
        self.background_model = name;
        self
    }

    pub fn with_default_credential(mut self, credential: Option<Credential>) -> Self {
        self.default_credential = credential;
        self
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.selector.registry
    }

    pub fn removers(&self) -> Vec<String> {
        self.removers.list()
    }

    /// The configured remover, or the first registered background model.
    pub fn background_remover(&self) -> Result<&dyn BackgroundRemover> {
        let name = match &self.background_model {
            Some(name) => name.clone(),
            None => self
                .registry()
                .by_capability(Capability::BackgroundRemoval)
                .into_iter()
                .map(|spec| spec.name)
                .find(|name| self.removers.get(name).is_some())
                .ok_or_else(|| JobError::configuration("no background remover is configured"))?,
        };
        self.removers
            .get(&name)
            .map(|remover| remover.as_ref())
            .ok_or_else(|| {
                JobError::configuration(format!("background remover '{name}' is not configured"))
            })
    }

    pub async fn generate(&self, input: GenerateInput, cancel: &CancellationToken) -> Result<Generated> {
        let prompt = input.prompt.trim();
        if prompt.is_empty() {
            return Err(JobError::validation("prompt is required"));
        }
        let credential =
            Credential::resolve(input.credential.as_deref(), self.default_credential.as_ref())?;
        let reference = non_empty(input.reference_image_url.as_deref());
        if let Some(strength) = input.strength {
            if !(0.0..=1.0).contains(&strength) {
                return Err(JobError::validation("strength must be between 0 and 1"));
            }
        }

        let capability = if reference.is_some() {
            Capability::ImageToImage
        } else {
            Capability::TextToImage
        };
        let selection = self
            .selector
            .select(input.model.as_deref(), capability)
            .map_err(JobError::configuration)?;
        if let Some(reason) = &selection.fallback_reason {
            warn!(model = %selection.model.name, %reason, "using fallback model");
        }
        let spec = &selection.model;

        let mut inputs = Map::new();
        inputs.insert("prompt".to_string(), Value::String(prompt.to_string()));
        input.sizing.apply(&mut inputs);
        if let Some(reference) = reference {
            inputs.insert("image".to_string(), Value::String(reference.to_string()));
            if let Some(strength) = input.strength {
                inputs.insert("prompt_strength".to_string(), Value::from(strength));
            }
        }
        if let Some(negative) = non_empty(input.negative_prompt.as_deref()) {
            if spec.accepts_input("negative_prompt") {
                inputs.insert("negative_prompt".to_string(), Value::String(negative.to_string()));
            }
        }

        let completed = PredictionAdapter::new(self.api.as_ref(), spec)
            .run(&credential, inputs, cancel)
            .await?;
        info!(
            model = %spec.name,
            prediction_id = %completed.job.id,
            attempts = completed.attempts,
            "image generated"
        );
        Ok(Generated {
            image_url: completed.url,
            prediction_id: completed.job.id,
            model: spec.name.clone(),
            fallback_reason: selection.fallback_reason,
        })
    }

    pub async fn remove_background(
        &self,
        image_url: Option<&str>,
        credential: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<RemovalOutcome> {
        let image_url =
            non_empty(image_url).ok_or_else(|| JobError::validation("imageUrl is required"))?;
        let (remover, credential) = self.removal_stage(credential)?;
        info!(remover = remover.name(), "removing background");
        remove_background(remover, image_url, credential.as_ref(), cancel).await
    }

    fn removal_stage(
        &self,
        credential: Option<&str>,
    ) -> Result<(&dyn BackgroundRemover, Option<Credential>)> {
        let remover = self.background_remover()?;
        let credential = if remover.needs_credential() {
            Some(Credential::resolve(credential, self.default_credential.as_ref())?)
        } else {
            None
        };
        Ok((remover, credential))
    }

    /// Prompt, generation and (for transparent output) background removal.
    pub async fn silhouette(
        &self,
        input: SilhouetteInput,
        cancel: &CancellationToken,
    ) -> Result<SilhouetteResult> {
        let mode = if non_empty(input.reference_image_url.as_deref()).is_some() {
            GenerationMode::Transform
        } else {
            GenerationMode::Generate
        };
        let prompt = build_prompt(&input.selections, input.background, mode);
        // The remover must resolve before any prediction is submitted.
        let removal = match input.background {
            BackgroundMode::Transparent => Some(self.removal_stage(input.credential.as_deref())?),
            BackgroundMode::WithBackground => None,
        };
        let generated = self
            .generate(
                GenerateInput {
                    prompt: prompt.prompt.clone(),
                    credential: input.credential.clone(),
                    sizing: input.sizing,
                    reference_image_url: input.reference_image_url,
                    strength: input.strength,
                    negative_prompt: Some(prompt.negative_prompt.clone()),
                    model: input.model,
                },
                cancel,
            )
            .await?;

        let mut artifact = GeneratedArtifact {
            image_url: generated.image_url.clone(),
            prediction_id: Some(generated.prediction_id),
            ..GeneratedArtifact::default()
        };
        if let Some((remover, credential)) = removal {
            info!(remover = remover.name(), "removing background");
            let removal =
                remove_background(remover, &generated.image_url, credential.as_ref(), cancel)
                    .await?;
            artifact.transparent_image_url = Some(removal.transparent_image_url);
            artifact.warning = removal.warning;
        }
        Ok(SilhouetteResult {
            prompt,
            model: generated.model,
            artifact,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
