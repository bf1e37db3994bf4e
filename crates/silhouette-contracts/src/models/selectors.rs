use super::registry::{Capability, ModelRegistry, ModelSpec};

#[derive(Debug, Clone, PartialEq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    pub requested: Option<String>,
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ModelSelector {
    pub registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: Option<ModelRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_else(|| ModelRegistry::new(None)),
        }
    }

    pub fn select(
        &self,
        requested: Option<&str>,
        capability: Capability,
    ) -> Result<ModelSelection, String> {
        let requested = requested.map(str::trim).filter(|value| !value.is_empty());
        let (fallback_reason, requested_text) = if let Some(requested_value) = requested {
            if let Some(model) = self.registry.ensure(requested_value, capability) {
                return Ok(ModelSelection {
                    model,
                    requested: Some(requested_value.to_string()),
                    fallback_reason: None,
                });
            }
            (
                Some(format!(
                    "Requested model '{requested_value}' unavailable for capability '{capability}'."
                )),
                Some(requested_value.to_string()),
            )
        } else {
            (None, None)
        };

        let candidates = self.registry.by_capability(capability);
        let Some(model) = candidates.first().cloned() else {
            return Err(format!(
                "No models available for capability '{capability}'."
            ));
        };
        Ok(ModelSelection {
            model,
            requested: requested_text,
            fallback_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;
    use crate::models::{PollPolicy, ProviderKind};

    fn removal_model(name: &str) -> ModelSpec {
        ModelSpec {
            name: name.to_string(),
            provider: ProviderKind::Bria,
            capability: Capability::BackgroundRemoval,
            selector: None,
            default_inputs: Default::default(),
            prefer_wait: false,
            poll: PollPolicy::default(),
            propagate_failure: false,
        }
    }

    #[test]
    fn selector_falls_back_when_requested_model_unavailable() {
        let mut models = IndexMap::new();
        models.insert("bria-fallback".to_string(), removal_model("bria-fallback"));
        let selection = ModelSelector::new(Some(ModelRegistry::new(Some(models))))
            .select(Some("missing"), Capability::BackgroundRemoval)
            .unwrap();
        assert_eq!(selection.model.name, "bria-fallback");
        assert_eq!(selection.requested.as_deref(), Some("missing"));
        assert_eq!(
            selection.fallback_reason.as_deref(),
            Some("Requested model 'missing' unavailable for capability 'background-removal'.")
        );
    }

    #[test]
    fn selector_without_request_uses_first_model_silently() {
        let selection = ModelSelector::new(None)
            .select(None, Capability::TextToImage)
            .unwrap();
        assert_eq!(selection.model.name, "flux-schnell");
        assert_eq!(selection.fallback_reason, None);

        let blank = ModelSelector::new(None)
            .select(Some("  "), Capability::ImageToImage)
            .unwrap();
        assert_eq!(blank.model.name, "flux-dev");
        assert_eq!(blank.requested, None);
    }

    #[test]
    fn selector_rejects_model_of_other_capability() {
        let selection = ModelSelector::new(None)
            .select(Some("rmbg-1.4"), Capability::TextToImage)
            .unwrap();
        assert_eq!(selection.model.name, "flux-schnell");
        assert!(selection.fallback_reason.is_some());
    }

    #[test]
    fn selector_raises_when_no_models_for_capability() {
        let mut models = IndexMap::new();
        models.insert("bria-only".to_string(), removal_model("bria-only"));
        let err = ModelSelector::new(Some(ModelRegistry::new(Some(models))))
            .select(Some("flux-schnell"), Capability::TextToImage)
            .err()
            .unwrap_or_default();
        assert_eq!(err, "No models available for capability 'text-to-image'.");
    }
}
