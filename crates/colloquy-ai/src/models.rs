//! Model registry with public lookup API.

use crate::{Model, Provider};

struct ModelEntry {
    id: &'static str,
    name: &'static str,
    provider: Provider,
    context_window: u32,
    max_tokens: u32,
}

const MODEL_ENTRIES: &[ModelEntry] = &[
    ModelEntry {
        id: "gpt-4o-mini",
        name: "GPT-4o mini",
        provider: Provider::OpenAI,
        context_window: 128_000,
        max_tokens: 16_384,
    },
    ModelEntry {
        id: "gpt-4o",
        name: "GPT-4o",
        provider: Provider::OpenAI,
        context_window: 128_000,
        max_tokens: 16_384,
    },
    ModelEntry {
        id: "llama-3.3-70b-versatile",
        name: "Llama 3.3 70B Versatile",
        provider: Provider::Groq,
        context_window: 131_072,
        max_tokens: 32_768,
    },
    ModelEntry {
        id: "llama-3.1-8b-instant",
        name: "Llama 3.1 8B Instant",
        provider: Provider::Groq,
        context_window: 131_072,
        max_tokens: 8_192,
    },
];

impl ModelEntry {
    fn to_model(&self) -> Model {
        Model {
            id: self.id.to_string(),
            name: self.name.to_string(),
            provider: self.provider,
            base_url: self.provider.default_base_url().to_string(),
            context_window: self.context_window,
            max_tokens: self.max_tokens,
            headers: Default::default(),
        }
    }
}

/// Default model for a provider
pub fn default_model_id(provider: Provider) -> &'static str {
    match provider {
        Provider::Groq => "llama-3.3-70b-versatile",
        _ => "gpt-4o-mini",
    }
}

/// Look up a model by provider and ID.
pub fn get_model(provider: Provider, id: &str) -> Option<Model> {
    MODEL_ENTRIES
        .iter()
        .find(|e| e.id == id && e.provider == provider)
        .map(|e| e.to_model())
}

/// Look up a model by ID only (first match across all providers).
pub fn get_model_by_id(id: &str) -> Option<Model> {
    MODEL_ENTRIES
        .iter()
        .find(|e| e.id == id)
        .map(|e| e.to_model())
}

/// Get all models for a specific provider.
pub fn get_models(provider: Provider) -> Vec<Model> {
    MODEL_ENTRIES
        .iter()
        .filter(|e| e.provider == provider)
        .map(|e| e.to_model())
        .collect()
}

/// Resolve a model, constructing a default-sized one for unknown IDs
/// on the provider's base URL.
pub fn resolve_model(provider: Provider, id: &str) -> Model {
    if let Some(model) = get_model(provider, id) {
        return model;
    }

    Model {
        id: id.to_string(),
        name: id.to_string(),
        provider,
        base_url: provider.default_base_url().to_string(),
        context_window: 128_000,
        max_tokens: 8_192,
        headers: Default::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_model() {
        let model = get_model(Provider::Groq, "llama-3.3-70b-versatile").unwrap();
        assert_eq!(model.base_url, "https://api.groq.com/openai/v1");
        assert!(get_model(Provider::OpenAI, "llama-3.3-70b-versatile").is_none());
    }

    #[test]
    fn test_resolve_unknown_model_uses_provider_url() {
        let model = resolve_model(Provider::Ollama, "qwen2.5");
        assert_eq!(model.id, "qwen2.5");
        assert_eq!(model.base_url, "http://localhost:11434/v1");
    }

    #[test]
    fn test_models_for_provider() {
        let models = get_models(Provider::OpenAI);
        assert!(models.iter().all(|m| m.provider == Provider::OpenAI));
        assert!(models.iter().any(|m| m.id == default_model_id(Provider::OpenAI)));
        assert!(get_model_by_id("gpt-4o").is_some());
    }
}
