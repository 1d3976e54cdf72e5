use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::gateway::RetryPolicy;
use crate::sequencer::PipelineConfig;

const DEFAULT_API_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4";
const DEFAULT_TEMPERATURE: f32 = 0.1;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub api_key: String,
    pub organization: Option<String>,
    pub model: String,
    pub temperature: f32,

    pub retry: RetryPolicy,
    pub pipeline: PipelineConfig,
}

/// Credentials file layout: `{"apikey": "...", "org": "...", "model": "..."}`
#[derive(Deserialize)]
struct KeyFile {
    apikey: String,
    #[serde(default)]
    org: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            api_url: std::env::var("RSI_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            api_key: std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY must be set")?,
            organization: std::env::var("OPENAI_ORG").ok().filter(|o| !o.is_empty()),
            model: std::env::var("RSI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            temperature: env_or("RSI_TEMPERATURE", DEFAULT_TEMPERATURE)?,

            retry: retry_from_env()?,
            pipeline: pipeline_from_env()?,
        })
    }

    /// Load credentials from an `apikey.json` file.
    ///
    /// Everything else comes from the environment or defaults.
    pub fn from_key_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let key_file: KeyFile = serde_json::from_str(&contents)
            .with_context(|| format!("{} is not a valid key file", path.display()))?;

        Ok(Self {
            api_url: std::env::var("RSI_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            api_key: key_file.apikey,
            organization: key_file.org.filter(|o| !o.is_empty()),
            model: key_file.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature: env_or("RSI_TEMPERATURE", DEFAULT_TEMPERATURE)?,

            retry: retry_from_env()?,
            pipeline: pipeline_from_env()?,
        })
    }
}

fn retry_from_env() -> Result<RetryPolicy> {
    let defaults = RetryPolicy::default();
    let max_attempts = env_or("RSI_MAX_ATTEMPTS", defaults.max_attempts)?;
    Ok(defaults.with_max_attempts(max_attempts))
}

/// Fan-out defaults; `RSI_DEV` switches to the small development sizes
fn base_pipeline(development: bool) -> PipelineConfig {
    if development {
        PipelineConfig::development()
    } else {
        PipelineConfig::default()
    }
}

fn pipeline_from_env() -> Result<PipelineConfig> {
    let development = std::env::var("RSI_DEV")
        .map(|s| s != "false" && s != "0")
        .unwrap_or(false);
    let defaults = base_pipeline(development);
    let judges = env_or("RSI_JUDGES", defaults.solution_judges)?;

    Ok(PipelineConfig {
        challenges: env_or("RSI_CHALLENGES", defaults.challenges)?,
        top_challenges: env_or("RSI_TOP_CHALLENGES", defaults.top_challenges)?,
        evaluation_functions: env_or("RSI_EVAL_FNS", defaults.evaluation_functions)?,
        solutions: env_or("RSI_SOLUTIONS", defaults.solutions)?,
        max_concurrency: env_or("RSI_CONCURRENCY", defaults.max_concurrency)?,
        ..defaults
    }
    .with_judges(judges))
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(value) => parse_var(key, &value),
        Err(_) => Ok(default),
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("{} must be a valid number, got {:?}", key, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var() {
        assert_eq!(parse_var::<usize>("RSI_CHALLENGES", " 12 ").unwrap(), 12);
        let temperature = parse_var::<f32>("RSI_TEMPERATURE", "0.7").unwrap();
        assert!((temperature - 0.7).abs() < f32::EPSILON);

        let err = parse_var::<usize>("RSI_JUDGES", "two").unwrap_err();
        assert!(err.to_string().contains("RSI_JUDGES"));
    }

    #[test]
    fn test_unset_var_uses_default() {
        let value: usize = env_or("RSI_TEST_SURELY_UNSET_VARIABLE", 7).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_development_pipeline_is_smaller() {
        let development = base_pipeline(true);
        let full = base_pipeline(false);

        assert_eq!(development, PipelineConfig::development());
        assert_eq!(full, PipelineConfig::default());
        assert!(development.challenges < full.challenges);
        assert_eq!(development.top_challenges, 1);
        assert_eq!(development.solution_judges, full.solution_judges);
    }

    #[test]
    fn test_key_file() {
        let path = std::env::temp_dir()
            .join(format!("rsi-apikey-{}.json", uuid::Uuid::new_v4()));
        let contents = r#"{"apikey": "sk-test", "org": "org-42", "model": "gpt-4o"}"#;
        std::fs::write(&path, contents).unwrap();

        let config = Config::from_key_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.api_key, "sk-test");
        assert_eq!(config.organization.as_deref(), Some("org-42"));
        assert_eq!(config.model, "gpt-4o");
    }

    #[test]
    fn test_key_file_without_org() {
        let path = std::env::temp_dir()
            .join(format!("rsi-apikey-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, r#"{"apikey": "sk-test", "org": ""}"#).unwrap();

        let config = Config::from_key_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.organization, None);
        assert_eq!(config.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_missing_key_file() {
        let err = Config::from_key_file("/nonexistent/apikey.json").unwrap_err();
        assert!(err.to_string().contains("apikey.json"));
    }
}
