use crate::config::{Provider, ProviderConfig};
use crate::error::TransportError;
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde_json::json;

/// The transport seam: submit one prompt, get text or an error back. No
/// retries and no timeout beyond the HTTP client's own; a hung request is the
/// user's cue to reload, as in the originals.
#[async_trait]
pub trait LlmTransport: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, TransportError>;
}

pub struct HttpLlmClient {
    cfg: ProviderConfig,
    client: reqwest::Client,
}

impl HttpLlmClient {
    pub fn new(cfg: ProviderConfig) -> HttpLlmClient {
        HttpLlmClient { cfg, client: reqwest::Client::new() }
    }

    pub fn provider(&self) -> Provider {
        self.cfg.provider
    }

    pub fn model(&self) -> &str {
        &self.cfg.model
    }
}

#[async_trait]
impl LlmTransport for HttpLlmClient {
    #[tracing::instrument(skip_all, fields(provider = self.cfg.provider.label(), model = %self.cfg.model))]
    async fn complete(&self, prompt: &str) -> Result<String, TransportError> {
        if self.cfg.api_key.is_empty() {
            return Err(TransportError::MissingKey(self.cfg.provider.label()));
        }
        let url = endpoint(&self.cfg);
        let body = request_body(self.cfg.provider, prompt);
        let mut req = self.client.post(&url).json(&body);
        if self.cfg.provider == Provider::HfEndpoint {
            req = req.header(AUTHORIZATION, format!("Bearer {}", self.cfg.api_key));
        }
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Status { status: status.as_u16(), body });
        }
        let v: serde_json::Value = resp.json().await?;
        response_text(self.cfg.provider, &v)
    }
}

fn endpoint(cfg: &ProviderConfig) -> String {
    match cfg.provider {
        Provider::Gemini => {
            let base = cfg
                .base_url
                .as_deref()
                .unwrap_or("https://generativelanguage.googleapis.com");
            format!(
                "{}/v1beta/models/{}:generateContent?key={}",
                base.trim_end_matches('/'),
                cfg.model,
                cfg.api_key
            )
        }
        Provider::HfEndpoint => {
            let base = cfg
                .base_url
                .as_deref()
                .unwrap_or("https://api-inference.huggingface.co");
            format!("{}/models/{}", base.trim_end_matches('/'), cfg.model)
        }
    }
}

fn request_body(provider: Provider, prompt: &str) -> serde_json::Value {
    match provider {
        Provider::Gemini => json!({
            "contents": [
                {"parts": [{"text": prompt}]}
            ]
        }),
        Provider::HfEndpoint => json!({
            "inputs": prompt,
            "parameters": {
                "max_new_tokens": 1024,
                "return_full_text": false
            }
        }),
    }
}

/// Pull the completion text out of a provider response body. Both providers
/// can return several text segments; they are concatenated in order.
fn response_text(provider: Provider, v: &serde_json::Value) -> Result<String, TransportError> {
    let mut buf = String::new();
    match provider {
        Provider::Gemini => {
            if let Some(parts) = v
                .pointer("/candidates/0/content/parts")
                .and_then(|p| p.as_array())
            {
                for part in parts {
                    if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
                        buf.push_str(text);
                    }
                }
            }
        }
        Provider::HfEndpoint => {
            let item = if let Some(arr) = v.as_array() { arr.first() } else { Some(v) };
            if let Some(text) = item
                .and_then(|i| i.get("generated_text"))
                .and_then(|t| t.as_str())
            {
                buf.push_str(text);
            }
        }
    }
    if buf.is_empty() {
        return Err(TransportError::MalformedResponse(
            "no completion text in response".into(),
        ));
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(provider: Provider) -> ProviderConfig {
        ProviderConfig {
            provider,
            model: match provider {
                Provider::Gemini => "gemini-1.5-flash".into(),
                Provider::HfEndpoint => "some/model".into(),
            },
            api_key: "k-123".into(),
            base_url: None,
        }
    }

    #[test]
    fn gemini_endpoint_carries_key_as_query() {
        let url = endpoint(&cfg(Provider::Gemini));
        assert_eq!(
            url,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent?key=k-123"
        );
    }

    #[test]
    fn hf_endpoint_is_model_scoped() {
        let url = endpoint(&cfg(Provider::HfEndpoint));
        assert_eq!(url, "https://api-inference.huggingface.co/models/some/model");
    }

    #[test]
    fn base_url_override_is_respected() {
        let mut c = cfg(Provider::Gemini);
        c.base_url = Some("http://localhost:9999/".into());
        assert!(endpoint(&c).starts_with("http://localhost:9999/v1beta/"));
    }

    #[test]
    fn request_bodies_match_provider_shapes() {
        let g = request_body(Provider::Gemini, "hello");
        assert_eq!(g["contents"][0]["parts"][0]["text"], "hello");
        let h = request_body(Provider::HfEndpoint, "hello");
        assert_eq!(h["inputs"], "hello");
        assert_eq!(h["parameters"]["return_full_text"], false);
    }

    #[test]
    fn gemini_response_parts_are_concatenated() {
        let v = serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "a"}, {"text": "b"}]}}]
        });
        assert_eq!(response_text(Provider::Gemini, &v).unwrap(), "ab");
    }

    #[test]
    fn hf_response_accepts_array_or_object() {
        let arr = serde_json::json!([{"generated_text": "hi"}]);
        assert_eq!(response_text(Provider::HfEndpoint, &arr).unwrap(), "hi");
        let obj = serde_json::json!({"generated_text": "hi"});
        assert_eq!(response_text(Provider::HfEndpoint, &obj).unwrap(), "hi");
    }

    #[test]
    fn empty_payload_is_malformed() {
        let err = response_text(Provider::Gemini, &serde_json::json!({})).unwrap_err();
        assert!(matches!(err, TransportError::MalformedResponse(_)));
    }
}
