use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TripError};

/// Top-level Tripweave configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub model: ModelConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Chat completions endpoint. Defaults to the OpenAI API.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
}

/// Model providers served by the chat completions client.
pub const MODEL_PROVIDERS: &[&str] = &["openai", "azure", "ollama", "vllm", "groq", "openrouter"];

/// Search providers with a client implementation.
pub const SEARCH_PROVIDERS: &[&str] = &["tavily"];

fn default_provider() -> String { "openai".to_string() }
fn default_model_id() -> String { "gpt-4-turbo".to_string() }
fn default_max_tokens() -> u32 { 1024 }
fn default_temperature() -> f32 { 0.0 }
fn default_model_timeout() -> u64 { 60 }

/// Knobs for the planning graph itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Upper bound on activity search passes (at least 1).
    #[serde(default = "default_max_search_iterations")]
    pub max_search_iterations: u32,
    #[serde(default = "default_min_candidates")]
    pub min_candidates_per_category: usize,
    #[serde(default = "default_max_candidates")]
    pub max_candidates_per_category: usize,
    /// Precipitation probability above which a day counts as wet.
    #[serde(default = "default_precipitation_threshold")]
    pub precipitation_threshold: f32,
    /// Per sub-query timeout.
    #[serde(default = "default_search_timeout")]
    pub search_timeout_secs: u64,
    /// Deadline for the whole fan-out.
    #[serde(default = "default_search_stage_timeout")]
    pub search_stage_timeout_secs: u64,
    /// Overall planning deadline (0 = unlimited).
    #[serde(default = "default_plan_timeout")]
    pub plan_timeout_secs: u64,
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_interests")]
    pub default_interests: Vec<String>,
    #[serde(default = "default_true")]
    pub reasoning_parse: bool,
    #[serde(default = "default_true")]
    pub reasoning_quality_check: bool,
    #[serde(default = "default_max_days")]
    pub max_days: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_search_iterations: default_max_search_iterations(),
            min_candidates_per_category: default_min_candidates(),
            max_candidates_per_category: default_max_candidates(),
            precipitation_threshold: default_precipitation_threshold(),
            search_timeout_secs: default_search_timeout(),
            search_stage_timeout_secs: default_search_stage_timeout(),
            plan_timeout_secs: default_plan_timeout(),
            retry_backoff_ms: default_retry_backoff(),
            default_interests: default_interests(),
            reasoning_parse: true,
            reasoning_quality_check: true,
            max_days: default_max_days(),
        }
    }
}

impl PlannerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_search_iterations == 0 {
            return Err(TripError::Config(
                "planner.max_search_iterations must be at least 1".into(),
            ));
        }
        if self.min_candidates_per_category == 0 {
            return Err(TripError::Config(
                "planner.min_candidates_per_category must be at least 1".into(),
            ));
        }
        if self.max_candidates_per_category < self.min_candidates_per_category {
            return Err(TripError::Config(
                "planner.max_candidates_per_category must not be below the minimum".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.precipitation_threshold) {
            return Err(TripError::Config(
                "planner.precipitation_threshold must be within 0.0..=1.0".into(),
            ));
        }
        if self.default_interests.iter().all(|i| i.trim().is_empty()) {
            return Err(TripError::Config(
                "planner.default_interests must name at least one interest".into(),
            ));
        }
        if self.max_days == 0 {
            return Err(TripError::Config("planner.max_days must be at least 1".into()));
        }
        Ok(())
    }
}

fn default_max_search_iterations() -> u32 { 2 }
fn default_min_candidates() -> usize { 2 }
fn default_max_candidates() -> usize { 5 }
fn default_precipitation_threshold() -> f32 { 0.5 }
fn default_search_timeout() -> u64 { 15 }
fn default_search_stage_timeout() -> u64 { 30 }
fn default_plan_timeout() -> u64 { 180 }
fn default_retry_backoff() -> u64 { 500 }
fn default_interests() -> Vec<String> { vec!["sightseeing".to_string()] }
fn default_true() -> bool { true }
fn default_max_days() -> u32 { 14 }

/// Weather provider configuration (OpenWeatherMap).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_weather_url")]
    pub base_url: String,
    #[serde(default = "default_weather_timeout")]
    pub timeout_secs: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_weather_url(),
            timeout_secs: default_weather_timeout(),
        }
    }
}

fn default_weather_url() -> String {
    "https://api.openweathermap.org/data/2.5/forecast".to_string()
}
fn default_weather_timeout() -> u64 { 10 }

/// Web search provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_provider")]
    pub provider: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_search_url")]
    pub base_url: String,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: default_search_provider(),
            api_key: None,
            base_url: default_search_url(),
            max_results: default_max_results(),
            timeout_secs: default_search_timeout(),
        }
    }
}

fn default_search_provider() -> String { "tavily".to_string() }
fn default_search_url() -> String { "https://api.tavily.com/search".to_string() }
fn default_max_results() -> u32 { 5 }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| TripError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        let config: AppConfig =
            toml::from_str(&expanded).map_err(|e| TripError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Build a config from the environment alone.
    ///
    /// Reads `OPENAI_API_KEY`, `OPENAI_ENDPOINT`, `OPENAI_MODEL_NAME`,
    /// `OPENWEATHERMAP_API_KEY` and `TAVILY_API_KEY`.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            model: ModelConfig {
                provider: default_provider(),
                model_id: var("OPENAI_MODEL_NAME").unwrap_or_else(default_model_id),
                api_key: var("OPENAI_API_KEY"),
                base_url: var("OPENAI_ENDPOINT"),
                max_tokens: default_max_tokens(),
                temperature: default_temperature(),
                timeout_secs: default_model_timeout(),
            },
            planner: PlannerConfig::default(),
            weather: WeatherConfig {
                api_key: var("OPENWEATHERMAP_API_KEY"),
                ..WeatherConfig::default()
            },
            search: SearchConfig {
                api_key: var("TAVILY_API_KEY"),
                ..SearchConfig::default()
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.model_id.trim().is_empty() {
            return Err(TripError::Config("model.model_id must not be empty".into()));
        }
        check_provider("model.provider", &self.model.provider, MODEL_PROVIDERS)?;
        check_provider("search.provider", &self.search.provider, SEARCH_PROVIDERS)?;
        self.planner.validate()
    }

    /// Copy of this config with secrets masked, for display.
    pub fn redacted(&self) -> Self {
        let mask = |key: &Option<String>| key.as_ref().map(|_| "********".to_string());
        let mut config = self.clone();
        config.model.api_key = mask(&self.model.api_key);
        config.weather.api_key = mask(&self.weather.api_key);
        config.search.api_key = mask(&self.search.api_key);
        config
    }

    /// Default per-user config location (`~/.tripweave/config.toml`).
    pub fn default_path() -> Option<PathBuf> {
        dirs_home().map(|h| h.join(".tripweave").join("config.toml"))
    }
}

fn check_provider(field: &str, value: &str, supported: &[&str]) -> Result<()> {
    if supported.iter().any(|p| p.eq_ignore_ascii_case(value.trim())) {
        return Ok(());
    }
    Err(TripError::Config(format!(
        "{} '{}' is not supported (expected one of: {})",
        field,
        value,
        supported.join(", ")
    )))
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_TRIPWEAVE_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_TRIPWEAVE_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_TRIPWEAVE_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_TRIPWEAVE_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_TRIPWEAVE_VAR}\"");
    }

    #[test]
    fn test_planner_defaults_from_minimal_toml() {
        let toml_str = r#"
[model]
model_id = "gpt-4o-mini"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.model.provider, "openai");
        assert_eq!(config.planner.max_search_iterations, 2);
        assert_eq!(config.planner.min_candidates_per_category, 2);
        assert_eq!(config.planner.precipitation_threshold, 0.5);
        assert_eq!(config.planner.default_interests, vec!["sightseeing"]);
        assert!(config.planner.reasoning_parse);
        assert_eq!(config.search.provider, "tavily");
        assert_eq!(config.search.max_results, 5);
        assert!(config.weather.api_key.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_iterations() {
        let planner = PlannerConfig {
            max_search_iterations: 0,
            ..PlannerConfig::default()
        };
        assert!(matches!(planner.validate(), Err(TripError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_threshold_out_of_range() {
        let planner = PlannerConfig {
            precipitation_threshold: 1.5,
            ..PlannerConfig::default()
        };
        assert!(planner.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_candidate_bounds() {
        let planner = PlannerConfig {
            min_candidates_per_category: 4,
            max_candidates_per_category: 3,
            ..PlannerConfig::default()
        };
        assert!(planner.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_providers() {
        let toml_str = r#"
[model]
model_id = "gpt-4o-mini"

[search]
provider = "serper"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        match config.validate() {
            Err(TripError::Config(message)) => {
                assert!(message.contains("search.provider"));
                assert!(message.contains("serper"));
            }
            other => panic!("unexpected: {other:?}"),
        }

        let mut config: AppConfig = toml::from_str("[model]\nmodel_id = \"m\"").unwrap();
        config.model.provider = "anthropic".into();
        assert!(config.validate().is_err());
        config.model.provider = "Ollama".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_redacted_masks_keys() {
        let toml_str = r#"
[model]
model_id = "gpt-4o"
api_key = "sk-secret"

[search]
api_key = "tvly-secret"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        let shown = config.redacted();
        assert_eq!(shown.model.api_key.as_deref(), Some("********"));
        assert_eq!(shown.search.api_key.as_deref(), Some("********"));
        assert!(shown.weather.api_key.is_none());
        assert_eq!(config.model.api_key.as_deref(), Some("sk-secret"));
    }
}
