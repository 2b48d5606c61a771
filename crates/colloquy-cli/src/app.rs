//! Settings shared by every subcommand: resolved provider, model and keys

use std::sync::Arc;

use anyhow::Context as _;
use colloquy_agent::{ChatModel, RunConfig};
use colloquy_ai::providers::openai::OpenAIProvider;
use colloquy_ai::{Model, Provider, models};

use crate::config::Config;
use crate::tools::TavilySearchTool;

pub struct App {
    pub config: Config,
    pub provider: Provider,
    pub model: Model,
    /// Thread id override from `--thread`
    pub thread: Option<String>,
    pub verbose: bool,
}

impl App {
    /// Merge CLI flags over the config file (CLI takes precedence)
    pub fn new(
        config: Config,
        provider: Option<String>,
        model: Option<String>,
        thread: Option<String>,
        verbose: bool,
    ) -> anyhow::Result<Self> {
        let provider_name = provider
            .or_else(|| config.provider.clone())
            .unwrap_or_else(|| "openai".to_string());
        let provider = Provider::parse(&provider_name)?;
        let model_id = model
            .or_else(|| config.model.clone())
            .unwrap_or_else(|| models::default_model_id(provider).to_string());
        let mut model = models::resolve_model(provider, &model_id);

        match config.base_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => model.base_url = url.to_string(),
            _ if provider == Provider::Custom => {
                return Err(colloquy_ai::Error::InvalidConfig(
                    "the custom provider needs base_url in the config file".into(),
                )
                .into());
            }
            _ => {}
        }
        tracing::debug!("using {} model {} at {}", provider.name(), model.id, model.base_url);

        Ok(Self {
            config,
            provider,
            model,
            thread,
            verbose,
        })
    }

    fn api_key(&self) -> anyhow::Result<String> {
        let service = self.provider.name().to_lowercase();
        match (self.config.get_api_key(&service), self.provider.api_key_env_var()) {
            (Some(key), _) => Ok(key),
            // Local endpoints accept any bearer token
            (None, None) => Ok("none".to_string()),
            (None, Some(var)) => Err(colloquy_ai::Error::InvalidApiKey).with_context(|| {
                format!("set {} or add it to the config file (colloquy --init-config)", var)
            }),
        }
    }

    /// Chat model for the configured provider
    pub fn chat_model(&self) -> anyhow::Result<ChatModel> {
        let provider = OpenAIProvider::new(self.api_key()?);
        Ok(ChatModel::new(Arc::new(provider), self.model.clone()))
    }

    pub fn search_tool(&self) -> TavilySearchTool {
        TavilySearchTool::new(self.config.get_api_key("tavily"), self.config.search_max_results())
    }

    /// Run config on `--thread`, or `default_thread` when not given
    pub fn run_config(&self, default_thread: &str) -> RunConfig {
        let thread = self.thread.as_deref().unwrap_or(default_thread);
        self.run_config_for(thread)
    }

    fn run_config_for(&self, thread: &str) -> RunConfig {
        let config = RunConfig::thread(thread);
        match self.config.recursion_limit {
            Some(limit) => config.with_recursion_limit(limit),
            None => config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let config: Config = toml::from_str("provider = \"openai\"\n").unwrap();
        let app = App::new(config, Some("groq".into()), None, None, false).unwrap();
        assert_eq!(app.provider, Provider::Groq);
        assert_eq!(app.model.id, "llama-3.3-70b-versatile");
        assert_eq!(app.model.base_url, "https://api.groq.com/openai/v1");
    }

    #[test]
    fn test_config_model_used_without_flags() {
        let config: Config = toml::from_str("model = \"gpt-4o\"\nrecursion_limit = 7\n").unwrap();
        let app = App::new(config, None, None, None, false).unwrap();
        assert_eq!(app.provider, Provider::OpenAI);
        assert_eq!(app.model.id, "gpt-4o");
        assert_eq!(app.run_config("abc123").recursion_limit, 7);
    }

    #[test]
    fn test_thread_flag_overrides_default() {
        let app = App::new(Config::default(), None, None, Some("xyz123".into()), false).unwrap();
        assert_eq!(app.run_config("abc123").thread_id.as_deref(), Some("xyz123"));
    }

    #[test]
    fn test_configured_key_builds_model() {
        let config: Config = toml::from_str("[api_keys]\nopenai = \"sk-config\"\n").unwrap();
        let app = App::new(config, None, None, None, false).unwrap();
        assert!(app.chat_model().is_ok());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let err = App::new(Config::default(), Some("anthropic".into()), None, None, false)
            .err()
            .unwrap();
        assert!(err.to_string().contains("unknown provider 'anthropic'"));
    }

    #[test]
    fn test_custom_provider_needs_base_url() {
        let err = App::new(Config::default(), Some("custom".into()), None, None, false)
            .err()
            .unwrap();
        assert!(err.to_string().contains("base_url"));

        let config: Config =
            toml::from_str("provider = \"custom\"\nbase_url = \"http://localhost:8000/v1\"\n").unwrap();
        let app = App::new(config, None, Some("my-model".into()), None, false).unwrap();
        assert_eq!(app.provider, Provider::Custom);
        assert_eq!(app.model.base_url, "http://localhost:8000/v1");
        assert!(app.chat_model().is_ok());
    }
}
