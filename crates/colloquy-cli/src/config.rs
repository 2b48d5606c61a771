//! Configuration file support

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Token budget for the chat history, counted by `ApproxTokenCounter`
pub const DEFAULT_TRIM_MAX_TOKENS: u32 = 65;
/// Results returned per web search
pub const DEFAULT_SEARCH_MAX_RESULTS: u32 = 2;

/// Configuration for colloquy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default provider (openai, groq, ollama, custom)
    pub provider: Option<String>,
    /// Default model to use
    pub model: Option<String>,
    /// OpenAI-compatible endpoint; required for the custom provider
    pub base_url: Option<String>,
    /// System prompt for the chat demo, `{language}` is substituted
    pub system_prompt: Option<String>,
    /// Maximum node executions per graph run
    pub recursion_limit: Option<usize>,
    pub trim: TrimSettings,
    pub search: SearchSettings,
    /// API keys (alternative to environment variables)
    pub api_keys: ApiKeys,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrimSettings {
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub max_results: Option<u32>,
}

/// API key configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiKeys {
    pub openai: Option<String>,
    pub groq: Option<String>,
    pub tavily: Option<String>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("colloquy")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("COLLOQUY_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from the default path
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load config from `path`; a missing or broken file yields the defaults
    pub fn load_from(path: &std::path::Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("failed to parse config file {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("failed to read config file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save config to file
    pub fn save(&self) -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(&path, content)?;
        Ok(path)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let default_config = Config {
            provider: Some("openai".to_string()),
            model: Some("gpt-4o-mini".to_string()),
            recursion_limit: Some(colloquy_agent::graph::DEFAULT_RECURSION_LIMIT),
            trim: TrimSettings {
                max_tokens: Some(DEFAULT_TRIM_MAX_TOKENS),
            },
            search: SearchSettings {
                max_results: Some(DEFAULT_SEARCH_MAX_RESULTS),
            },
            ..Default::default()
        };

        default_config.save()
    }

    /// Get API key for a service, checking config then env
    pub fn get_api_key(&self, service: &str) -> Option<String> {
        let from_config = match service {
            "openai" => self.api_keys.openai.clone(),
            "groq" => self.api_keys.groq.clone(),
            "tavily" => self.api_keys.tavily.clone(),
            _ => None,
        };

        if let Some(key) = from_config.filter(|k| !k.trim().is_empty()) {
            return Some(key);
        }

        let env_var = match service {
            "openai" => "OPENAI_API_KEY",
            "groq" => "GROQ_API_KEY",
            "tavily" => "TAVILY_API_KEY",
            _ => return None,
        };

        std::env::var(env_var).ok().filter(|k| !k.trim().is_empty())
    }

    pub fn trim_max_tokens(&self) -> u32 {
        self.trim.max_tokens.unwrap_or(DEFAULT_TRIM_MAX_TOKENS)
    }

    pub fn search_max_results(&self) -> u32 {
        self.search.max_results.unwrap_or(DEFAULT_SEARCH_MAX_RESULTS)
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# colloquy configuration file
# Place at ~/.config/colloquy/config.toml (Linux) or set COLLOQUY_CONFIG_PATH

# Default provider (openai, groq, ollama, custom)
provider = "openai"

# Default model to use
model = "gpt-4o-mini"

# Endpoint override; required when provider = "custom"
# base_url = "http://localhost:8000/v1"

# System prompt for `colloquy chat`; {language} is replaced with --language
# system_prompt = "You are a helpful assistant. Answer all questions to the best of your ability in {language}."

# Maximum node executions per graph run
recursion_limit = 25

[trim]
# Token budget for the chat history sent to the model
max_tokens = 65

[search]
max_results = 2

# API keys (optional - can also use environment variables or a .env file)
[api_keys]
# openai = "sk-..."
# groq = "gsk_..."
# tavily = "tvly-..."
"#
}
