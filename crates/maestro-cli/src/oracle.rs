use crate::config::{LlmProvider, ModelConfig};
use async_trait::async_trait;
use maestro_core::{MaestroError, MaestroResult};
use maestro_orchestrator::ReasoningOracle;
use std::time::Duration;
use tracing::debug;

const SYSTEM_PROMPT: &str = "You are the planning component of a task orchestration engine. \
Answer every request with exactly one JSON object and no other text.";

/// Reasoning oracle backed by a hosted LLM.
pub struct HttpOracle {
    config: ModelConfig,
    api_key: String,
    http: reqwest::Client,
}

impl HttpOracle {
    pub fn new(config: ModelConfig, api_key: String, timeout: Duration) -> MaestroResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MaestroError::Http(e.to_string()))?;
        Ok(Self {
            config,
            api_key,
            http,
        })
    }

    async fn ask_claude(&self, prompt: &str) -> MaestroResult<String> {
        let url = format!("{}/v1/messages", self.config.base_url());
        let body = serde_json::json!({
            "model": self.config.model_id,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "system": SYSTEM_PROMPT,
            "messages": [{"role": "user", "content": prompt}],
        });

        let resp = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| MaestroError::Http(e.to_string()))?;

        let status = resp.status();
        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| MaestroError::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(MaestroError::Http(format!(
                "Claude API error {status}: {resp_body}"
            )));
        }

        let text: String = resp_body["content"]
            .as_array()
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b["type"] == "text")
                    .filter_map(|b| b["text"].as_str())
                    .collect()
            })
            .unwrap_or_default();
        non_empty(text)
    }

    async fn ask_openai(&self, prompt: &str) -> MaestroResult<String> {
        let url = format!("{}/v1/chat/completions", self.config.base_url());
        let body = serde_json::json!({
            "model": self.config.model_id,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt},
            ],
        });

        let resp = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| MaestroError::Http(e.to_string()))?;

        let status = resp.status();
        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| MaestroError::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(MaestroError::Http(format!(
                "OpenAI API error {status}: {resp_body}"
            )));
        }

        let text = resp_body["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        non_empty(text)
    }
}

fn non_empty(text: String) -> MaestroResult<String> {
    if text.trim().is_empty() {
        Err(MaestroError::Oracle("empty reply".to_string()))
    } else {
        Ok(text)
    }
}

#[async_trait]
impl ReasoningOracle for HttpOracle {
    async fn ask(&self, prompt: &str) -> MaestroResult<String> {
        debug!(provider = ?self.config.provider, model = %self.config.model_id, "Querying oracle");
        match self.config.provider {
            LlmProvider::Claude => self.ask_claude(prompt).await,
            LlmProvider::OpenAi => self.ask_openai(prompt).await,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn oracle(provider: LlmProvider, server: &MockServer) -> HttpOracle {
        let config = ModelConfig {
            provider,
            model_id: "test-model".to_string(),
            api_key: "unused".to_string(),
            api_base_url: Some(server.uri()),
            temperature: 0.0,
            max_tokens: 256,
        };
        HttpOracle::new(config, "sk-test".to_string(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_claude_reply_text_is_joined() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-test"))
            .and(header("anthropic-version", "2023-06-01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [
                    {"type": "text", "text": "{\"complexity\": "},
                    {"type": "text", "text": "\"simple\"}"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reply = oracle(LlmProvider::Claude, &server).ask("classify").await.unwrap();
        assert_eq!(reply, "{\"complexity\": \"simple\"}");
    }

    #[tokio::test]
    async fn test_openai_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "{\"actions\": []}"}}]
            })))
            .mount(&server)
            .await;

        let reply = oracle(LlmProvider::OpenAi, &server).ask("decompose").await.unwrap();
        assert_eq!(reply, "{\"actions\": []}");
    }

    #[tokio::test]
    async fn test_error_status_is_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(
                ResponseTemplate::new(529)
                    .set_body_json(serde_json::json!({"error": {"type": "overloaded_error"}})),
            )
            .mount(&server)
            .await;

        let err = oracle(LlmProvider::Claude, &server).ask("x").await.unwrap_err();
        assert!(matches!(err, MaestroError::Http(ref m) if m.contains("529")));
    }

    #[tokio::test]
    async fn test_empty_reply_is_oracle_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "   "}}]
            })))
            .mount(&server)
            .await;

        let err = oracle(LlmProvider::OpenAi, &server).ask("x").await.unwrap_err();
        assert!(matches!(err, MaestroError::Oracle(_)));
    }
}
