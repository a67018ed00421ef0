use super::registry::{ModelRegistry, ModelSpec};
use crate::errors::{StudioError, StudioResult};

/// Outcome of resolving a configured model name for one capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    pub requested: String,
    pub capability: String,
    /// Set when `model` is not the requested one.
    pub fallback_reason: Option<String>,
}

impl ModelSelection {
    pub fn is_fallback(&self) -> bool {
        self.fallback_reason.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct ModelSelector {
    registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: Option<ModelRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_default(),
        }
    }

    /// Resolves `requested` (bare or `models/`-prefixed) for `capability`.
    ///
    /// A name the registry does not know, or one lacking the capability,
    /// falls back to the first registered model that has it.
    pub fn select(&self, requested: &str, capability: &str) -> StudioResult<ModelSelection> {
        let name = normalize_model_name(requested);
        let fallback_reason = if name.is_empty() {
            "No model configured; using default.".to_string()
        } else if let Some(model) = self.registry.capable(name, capability) {
            return Ok(ModelSelection {
                model: model.clone(),
                requested: name.to_string(),
                capability: capability.to_string(),
                fallback_reason: None,
            });
        } else if self.registry.get(name).is_some() {
            format!("Model '{name}' cannot be used for {capability}.")
        } else {
            format!("Model '{name}' is not available.")
        };

        let model = self.registry.first_with(capability).cloned().ok_or_else(|| {
            StudioError::Config(format!("no model available for {capability}"))
        })?;
        Ok(ModelSelection {
            fallback_reason: Some(format!("{fallback_reason} Using '{}'.", model.name)),
            model,
            requested: name.to_string(),
            capability: capability.to_string(),
        })
    }
}

fn normalize_model_name(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed.strip_prefix("models/").unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use crate::models::{
        ModelRegistry, ModelSelector, ModelSpec, CAPABILITY_IMAGE, CAPABILITY_TEXT,
        CAPABILITY_VISION,
    };
    use crate::StudioError;

    #[test]
    fn configured_studio_models_resolve_directly() -> anyhow::Result<()> {
        let selector = ModelSelector::new(None);
        let text = selector.select("gemini-3-flash-preview", CAPABILITY_VISION)?;
        assert_eq!(text.model.provider, "gemini");
        assert!(!text.is_fallback());
        let image = selector.select("models/gemini-2.5-flash-image", CAPABILITY_IMAGE)?;
        assert_eq!(image.model.name, "gemini-2.5-flash-image");
        assert_eq!(image.requested, "gemini-2.5-flash-image");
        Ok(())
    }

    #[test]
    fn image_model_cannot_serve_text_requests() -> anyhow::Result<()> {
        let selection = ModelSelector::new(None).select("gemini-2.5-flash-image", CAPABILITY_TEXT)?;
        assert_eq!(selection.model.name, "gemini-3-flash-preview");
        assert_eq!(
            selection.fallback_reason.as_deref(),
            Some("Model 'gemini-2.5-flash-image' cannot be used for text. Using 'gemini-3-flash-preview'.")
        );
        Ok(())
    }

    #[test]
    fn unknown_or_blank_names_fall_back() -> anyhow::Result<()> {
        let selector = ModelSelector::new(None);
        let unknown = selector.select("imagen-9", CAPABILITY_IMAGE)?;
        assert_eq!(unknown.model.name, "gemini-2.5-flash-image");
        assert!(unknown
            .fallback_reason
            .as_deref()
            .unwrap_or_default()
            .starts_with("Model 'imagen-9' is not available."));

        let blank = selector.select("  ", CAPABILITY_TEXT)?;
        assert_eq!(blank.requested, "");
        assert!(blank.is_fallback());
        Ok(())
    }

    #[test]
    fn dryrun_registry_only_offers_dryrun_models() -> anyhow::Result<()> {
        let selector = ModelSelector::new(Some(ModelRegistry::dryrun()));
        let image = selector.select("gemini-2.5-flash-image", CAPABILITY_IMAGE)?;
        assert_eq!(image.model.name, "dryrun-image-1");
        assert_eq!(image.model.provider, "dryrun");
        Ok(())
    }

    #[test]
    fn missing_capability_is_a_config_error() {
        let registry =
            ModelRegistry::from_specs([ModelSpec::new("text-only", "dryrun", &[CAPABILITY_TEXT])]);
        let err = ModelSelector::new(Some(registry))
            .select("gemini-2.5-flash-image", CAPABILITY_IMAGE)
            .err();
        assert_eq!(
            err,
            Some(StudioError::Config("no model available for image".to_string()))
        );
    }
}
