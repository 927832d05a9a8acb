//! Agent configuration loader.

use crate::context_builder::DEFAULT_MAX_IMAGES;
use crate::extraction::DEFAULT_EXTRACTION_CONCURRENCY;
use crate::interfaces::RuntimeError;
use crate::prompts::system_prompt;
use crate::retry::StageRetries;
use screen_pilot_parser::Factor;
use screen_pilot_providers::GenerationParams;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const ENV_BASE_URL: &str = "SCREEN_PILOT_BASE_URL";
pub const ENV_API_KEY: &str = "SCREEN_PILOT_API_KEY";
pub const ENV_MODEL: &str = "SCREEN_PILOT_MODEL";

/// Vision model endpoint and sampling settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ModelConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    /// Coordinate denominators the model emits boxes in, per axis.
    #[serde(default = "default_factors")]
    pub factors: [f64; 2],
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: None,
            model: String::new(),
            max_tokens: default_max_tokens(),
            temperature: 0.0,
            top_p: default_top_p(),
            factors: default_factors(),
        }
    }
}

impl ModelConfig {
    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams {
            max_tokens: Some(self.max_tokens),
            temperature: Some(self.temperature),
            top_p: Some(self.top_p),
        }
    }

    pub fn factor(&self) -> Factor {
        Factor::from(self.factors)
    }
}

/// Output locations for the built-in plugins; unset means disabled.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PluginConfig {
    #[serde(default)]
    pub trace_dir: Option<PathBuf>,
    #[serde(default)]
    pub screenshot_dir: Option<PathBuf>,
}

/// Agent configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    pub model: ModelConfig,
    pub language: String,
    pub search_engine: String,
    /// Resolved prompt text (file contents or the built-in prompt).
    pub system_prompt: String,
    pub max_loop_count: usize,
    pub max_snapshot_err_cnt: usize,
    pub snapshot_retry_delay_ms: u64,
    pub max_images: usize,
    pub retry: StageRetries,
    pub plugins: PluginConfig,
    pub extraction_concurrency: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        let language = default_language();
        let search_engine = default_search_engine();
        Self {
            model: ModelConfig::default(),
            system_prompt: system_prompt(&language, &search_engine),
            language,
            search_engine,
            max_loop_count: default_max_loop_count(),
            max_snapshot_err_cnt: default_max_snapshot_err_cnt(),
            snapshot_retry_delay_ms: default_snapshot_retry_delay_ms(),
            max_images: DEFAULT_MAX_IMAGES,
            retry: StageRetries::default(),
            plugins: PluginConfig::default(),
            extraction_concurrency: DEFAULT_EXTRACTION_CONCURRENCY,
        }
    }
}

impl AgentConfig {
    /// Fill endpoint settings from `SCREEN_PILOT_*` variables via `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(base_url) = non_empty(ENV_BASE_URL) {
            self.model.base_url = base_url;
        }
        if let Some(api_key) = non_empty(ENV_API_KEY) {
            self.model.api_key = Some(api_key);
        }
        if let Some(model) = non_empty(ENV_MODEL) {
            self.model.model = model;
        }
    }

    /// Check the fields a run cannot start without.
    pub fn validate(&self) -> Result<(), RuntimeError> {
        if self.model.base_url.trim().is_empty() {
            return Err(RuntimeError::Config(
                "Config missing required field: model.base_url".to_string(),
            ));
        }
        if self.model.model.trim().is_empty() {
            return Err(RuntimeError::Config(
                "Config missing required field: model.model".to_string(),
            ));
        }
        if self.model.factors.iter().any(|f| *f <= 0.0) {
            return Err(RuntimeError::Config(
                "model.factors must be positive".to_string(),
            ));
        }
        if self.max_loop_count == 0 {
            return Err(RuntimeError::Config(
                "max_loop_count must be greater than 0".to_string(),
            ));
        }
        if self.max_snapshot_err_cnt == 0 {
            return Err(RuntimeError::Config(
                "max_snapshot_err_cnt must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Raw config structure from YAML.
#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    model: ModelConfig,
    #[serde(default = "default_language")]
    language: String,
    #[serde(default = "default_search_engine")]
    search_engine: String,
    #[serde(default)]
    system_prompt: Option<String>,
    #[serde(default = "default_max_loop_count")]
    max_loop_count: usize,
    #[serde(default = "default_max_snapshot_err_cnt")]
    max_snapshot_err_cnt: usize,
    #[serde(default = "default_snapshot_retry_delay_ms")]
    snapshot_retry_delay_ms: u64,
    #[serde(default = "default_max_images")]
    max_images: usize,
    #[serde(default)]
    retry: StageRetries,
    #[serde(default)]
    plugins: PluginConfig,
    #[serde(default = "default_extraction_concurrency")]
    extraction_concurrency: usize,
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_top_p() -> f32 {
    0.7
}

fn default_factors() -> [f64; 2] {
    [1000.0, 1000.0]
}

fn default_language() -> String {
    "en".to_string()
}

fn default_search_engine() -> String {
    "google".to_string()
}

fn default_max_loop_count() -> usize {
    25
}

fn default_max_snapshot_err_cnt() -> usize {
    10
}

fn default_snapshot_retry_delay_ms() -> u64 {
    1000
}

fn default_max_images() -> usize {
    DEFAULT_MAX_IMAGES
}

fn default_extraction_concurrency() -> usize {
    DEFAULT_EXTRACTION_CONCURRENCY
}

/// Resolve `path` relative to the directory holding the config file.
fn resolve_relative(config_file: &Path, path: &str) -> PathBuf {
    if Path::new(path).is_absolute() {
        Path::new(path).to_path_buf()
    } else {
        config_file
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(path)
    }
}

/// Load agent configuration from a YAML file.
///
/// Missing fields take their defaults; endpoint fields are not validated here
/// so environment overrides can still supply them (see [`AgentConfig::validate`]).
///
/// # Errors
/// Returns error if the config or prompt file is missing, or the YAML is invalid
pub fn load_agent_config(config_path: &str) -> Result<AgentConfig, RuntimeError> {
    let config_file = Path::new(config_path);

    if !config_file.exists() {
        return Err(RuntimeError::Config(format!(
            "Config file not found: {}",
            config_path
        )));
    }

    let content = std::fs::read_to_string(config_file)?;

    if content.trim().is_empty() {
        return Err(RuntimeError::Config("Config file is empty".to_string()));
    }

    let raw: RawConfig = serde_yaml::from_str(&content)
        .map_err(|e| RuntimeError::Config(format!("Invalid YAML: {}", e)))?;

    if !matches!(raw.language.as_str(), "en" | "zh") {
        return Err(RuntimeError::Config(format!(
            "language must be 'en' or 'zh', got '{}'",
            raw.language
        )));
    }

    let prompt = match &raw.system_prompt {
        Some(path) if !path.trim().is_empty() => {
            let prompt_path = resolve_relative(config_file, path);
            if !prompt_path.exists() {
                return Err(RuntimeError::Config(format!(
                    "System prompt file not found: {}",
                    prompt_path.display()
                )));
            }
            std::fs::read_to_string(&prompt_path)?
        }
        _ => system_prompt(&raw.language, &raw.search_engine),
    };

    let resolve_dir = |dir: Option<PathBuf>| {
        dir.map(|d| resolve_relative(config_file, &d.to_string_lossy()))
    };

    Ok(AgentConfig {
        model: raw.model,
        language: raw.language,
        search_engine: raw.search_engine,
        system_prompt: prompt,
        max_loop_count: raw.max_loop_count,
        max_snapshot_err_cnt: raw.max_snapshot_err_cnt,
        snapshot_retry_delay_ms: raw.snapshot_retry_delay_ms,
        max_images: raw.max_images,
        retry: raw.retry,
        plugins: PluginConfig {
            trace_dir: resolve_dir(raw.plugins.trace_dir),
            screenshot_dir: resolve_dir(raw.plugins.screenshot_dir),
        },
        extraction_concurrency: raw.extraction_concurrency,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, body: &str) -> String {
        let path = dir.path().join("agent.yaml");
        fs::write(&path, body).unwrap();
        path.to_str().unwrap().to_string()
    }

    #[test]
    fn test_load_full_config() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("prompt.md"), "Custom prompt").unwrap();
        let path = write_config(
            &temp_dir,
            r#"
model:
  base_url: http://localhost:8000/v1
  model: ui-tars-7b
  max_tokens: 500
  factors: [1366, 768]
language: zh
system_prompt: prompt.md
max_loop_count: 40
retry:
  model:
    max_retries: 3
    fatal: false
plugins:
  trace_dir: traces
"#,
        );

        let config = load_agent_config(&path).unwrap();
        assert_eq!(config.model.model, "ui-tars-7b");
        assert_eq!(config.model.max_tokens, 500);
        assert_eq!(config.model.top_p, 0.7);
        assert_eq!(config.model.factor(), Factor::PerAxis(1366.0, 768.0));
        assert_eq!(config.language, "zh");
        assert_eq!(config.system_prompt, "Custom prompt");
        assert_eq!(config.max_loop_count, 40);
        assert_eq!(config.max_snapshot_err_cnt, 10);
        assert_eq!(config.retry.model.max_retries, 3);
        assert!(!config.retry.model.fatal);
        assert_eq!(config.retry.screenshot.max_retries, 0);
        assert!(config.retry.screenshot.fatal);
        assert_eq!(config.plugins.trace_dir, Some(temp_dir.path().join("traces")));
        assert_eq!(config.plugins.screenshot_dir, None);
        config.validate().unwrap();
    }

    #[test]
    fn test_defaults_use_builtin_prompt() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(&temp_dir, "search_engine: bing\n");
        let config = load_agent_config(&path).unwrap();
        assert!(config.system_prompt.contains("default search engine (bing)"));
        assert_eq!(config.max_loop_count, 25);
        assert_eq!(config.snapshot_retry_delay_ms, 1000);
        assert_eq!(config.extraction_concurrency, 100);
        assert_eq!(config.model.generation_params().max_tokens, Some(1000));
        assert_eq!(config.model.generation_params().temperature, Some(0.0));
    }

    #[test]
    fn test_config_file_not_found() {
        match load_agent_config("/nonexistent/agent.yaml") {
            Err(RuntimeError::Config(msg)) => assert!(msg.contains("Config file not found")),
            other => panic!("Expected Config error, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(&temp_dir, "  \n");
        match load_agent_config(&path) {
            Err(RuntimeError::Config(msg)) => assert!(msg.contains("empty")),
            other => panic!("Expected Config error, got {:?}", other),
        }
    }

    #[test]
    fn test_prompt_file_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(&temp_dir, "system_prompt: missing.md\n");
        match load_agent_config(&path) {
            Err(RuntimeError::Config(msg)) => assert!(msg.contains("System prompt file not found")),
            other => panic!("Expected Config error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_language() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(&temp_dir, "language: fr\n");
        assert!(matches!(load_agent_config(&path), Err(RuntimeError::Config(_))));
    }

    #[test]
    fn test_validate_names_missing_field() {
        let config = AgentConfig::default();
        match config.validate() {
            Err(RuntimeError::Config(msg)) => assert!(msg.contains("model.base_url")),
            other => panic!("Expected Config error, got {:?}", other),
        }
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_BASE_URL, "http://gpu:8000/v1"),
            (ENV_MODEL, "ui-tars-72b"),
            (ENV_API_KEY, ""),
        ]);
        let mut config = AgentConfig::default();
        config.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.model.base_url, "http://gpu:8000/v1");
        assert_eq!(config.model.model, "ui-tars-72b");
        assert_eq!(config.model.api_key, None);
        config.validate().unwrap();
    }
}
