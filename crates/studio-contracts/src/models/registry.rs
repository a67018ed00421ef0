use indexmap::IndexMap;

pub const CAPABILITY_TEXT: &str = "text";
pub const CAPABILITY_VISION: &str = "vision";
pub const CAPABILITY_IMAGE: &str = "image";

const TEXT_AND_VISION: &[&str] = &[CAPABILITY_TEXT, CAPABILITY_VISION];
const IMAGE_ONLY: &[&str] = &[CAPABILITY_IMAGE];

/// Known models in fallback order: the first entry with a capability is its default.
const GEMINI_MODELS: &[(&str, &[&str])] = &[
    ("gemini-3-flash-preview", TEXT_AND_VISION),
    ("gemini-2.5-flash", TEXT_AND_VISION),
    ("gemini-3-pro-preview", TEXT_AND_VISION),
    ("gemini-2.5-flash-image", IMAGE_ONLY),
    ("gemini-3-pro-image-preview", IMAGE_ONLY),
];

const DRYRUN_MODELS: &[(&str, &[&str])] = &[
    ("dryrun-text-1", TEXT_AND_VISION),
    ("dryrun-image-1", IMAGE_ONLY),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub provider: String,
    pub capabilities: Vec<String>,
}

impl ModelSpec {
    pub fn new(name: &str, provider: &str, capabilities: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            provider: provider.to_string(),
            capabilities: capabilities.iter().map(|cap| cap.to_string()).collect(),
        }
    }

    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|cap| cap == capability)
    }
}

/// Name-keyed model table; iteration order is registration order.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl Default for ModelRegistry {
    /// Gemini models followed by the offline ones.
    fn default() -> Self {
        Self::from_specs(
            table("gemini", GEMINI_MODELS).chain(table("dryrun", DRYRUN_MODELS)),
        )
    }
}

impl ModelRegistry {
    /// Later specs replace earlier ones with the same name.
    pub fn from_specs(specs: impl IntoIterator<Item = ModelSpec>) -> Self {
        Self {
            models: specs
                .into_iter()
                .map(|spec| (spec.name.clone(), spec))
                .collect(),
        }
    }

    /// Registry holding only the offline models.
    pub fn dryrun() -> Self {
        Self::from_specs(table("dryrun", DRYRUN_MODELS))
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    /// `name`, if registered and able to serve `capability`.
    pub fn capable(&self, name: &str, capability: &str) -> Option<&ModelSpec> {
        self.get(name).filter(|model| model.supports(capability))
    }

    /// Default model for a capability.
    pub fn first_with(&self, capability: &str) -> Option<&ModelSpec> {
        self.models.values().find(|model| model.supports(capability))
    }
}

fn table(
    provider: &'static str,
    rows: &'static [(&'static str, &'static [&'static str])],
) -> impl Iterator<Item = ModelSpec> {
    rows.iter()
        .map(move |(name, capabilities)| ModelSpec::new(name, provider, capabilities))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_puts_gemini_first() {
        let registry = ModelRegistry::default();
        let text = registry.first_with(CAPABILITY_TEXT).map(|m| m.name.as_str());
        let image = registry.first_with(CAPABILITY_IMAGE).map(|m| m.name.as_str());
        assert_eq!(text, Some("gemini-3-flash-preview"));
        assert_eq!(image, Some("gemini-2.5-flash-image"));
        assert_eq!(registry.get("dryrun-image-1").map(|m| m.provider.as_str()), Some("dryrun"));
    }

    #[test]
    fn capable_checks_the_capability() {
        let registry = ModelRegistry::default();
        assert!(registry.capable("gemini-2.5-flash", CAPABILITY_VISION).is_some());
        assert!(registry.capable("gemini-2.5-flash", CAPABILITY_IMAGE).is_none());
        assert!(registry.capable("unknown", CAPABILITY_TEXT).is_none());
    }
}
