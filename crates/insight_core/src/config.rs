use crate::script::Limits;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// The two provider families the pipeline speaks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Gemini,
    HfEndpoint,
}

impl Provider {
    pub fn parse(s: &str) -> Result<Provider> {
        match s.to_ascii_lowercase().as_str() {
            "gemini" => Ok(Provider::Gemini),
            "hf" | "huggingface" | "hf_endpoint" => Ok(Provider::HfEndpoint),
            other => bail!("unknown provider '{}' (expected 'gemini' or 'hf')", other),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Provider::Gemini => "Gemini",
            Provider::HfEndpoint => "Hugging Face",
        }
    }

    pub fn key_env(&self) -> &'static str {
        match self {
            Provider::Gemini => "GEMINI_API_KEY",
            Provider::HfEndpoint => "HF_API_TOKEN",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Gemini => "gemini-1.5-flash",
            Provider::HfEndpoint => "mistralai/Mistral-7B-Instruct-v0.2",
        }
    }
}

/// Loaded once at process start, immutable afterwards. The transport never
/// re-reads the environment.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub provider: Provider,
    pub model: String,
    pub api_key: String,
    pub base_url: Option<String>,
}

/// Bounds the pipeline applies per turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Prompt embedding keeps only this many leading characters of the content.
    pub prompt_prefix_chars: usize,
    /// On-screen preview bound for textual uploads.
    pub preview_chars: usize,
    /// Table rows rendered into the prompt prefix.
    pub head_rows: usize,
    pub limits: Limits,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            prompt_prefix_chars: 3000,
            preview_chars: 1000,
            head_rows: 15,
            limits: Limits::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    /// Read configuration from the environment. Call once at startup, after
    /// dotenvy has run.
    pub fn from_env() -> Result<AppConfig> {
        let provider = match std::env::var("INSIGHT_PROVIDER") {
            Ok(v) => Provider::parse(&v)?,
            Err(_) => Provider::Gemini,
        };
        let api_key = std::env::var(provider.key_env()).unwrap_or_default();
        if api_key.is_empty() {
            bail!(
                "{} is not set; the {} provider needs it",
                provider.key_env(),
                provider.label()
            );
        }
        let model = std::env::var("INSIGHT_MODEL")
            .unwrap_or_else(|_| provider.default_model().to_string());
        let base_url = std::env::var("INSIGHT_BASE_URL").ok();
        Ok(AppConfig {
            provider: ProviderConfig { provider, model, api_key, base_url },
            pipeline: PipelineConfig::default(),
        })
    }
}

/// First six and last four characters, for logging a key without leaking it.
pub fn key_fingerprint(key: &str) -> String {
    if key.len() >= 10 {
        format!("{}...{}", &key[..6], &key[key.len() - 4..])
    } else {
        "invalid".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_parsing() {
        assert_eq!(Provider::parse("gemini").unwrap(), Provider::Gemini);
        assert_eq!(Provider::parse("HF").unwrap(), Provider::HfEndpoint);
        assert_eq!(Provider::parse("huggingface").unwrap(), Provider::HfEndpoint);
        assert!(Provider::parse("openai").is_err());
    }

    #[test]
    fn pipeline_defaults_match_observed_bounds() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.prompt_prefix_chars, 3000);
        assert_eq!(cfg.preview_chars, 1000);
        assert_eq!(cfg.head_rows, 15);
    }

    #[test]
    fn fingerprint_hides_the_middle() {
        assert_eq!(key_fingerprint("AIzaSyExampleExampleExample"), "AIzaSy...mple");
        assert_eq!(key_fingerprint("short"), "invalid");
    }
}
