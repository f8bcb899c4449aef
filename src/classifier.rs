//! Gemini text-completion client used as the external classifier.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::ClassifierConfig;
use crate::error::ClassifierError;

/// Single-shot text completion. Implementations own their transport timeout.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ClassifierError>;
}

pub struct GeminiClassifier {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    api_key_env: String,
}

impl GeminiClassifier {
    pub fn new(config: &ClassifierConfig, api_key: Option<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        let endpoint = format!(
            "{}/v1beta/models/{}:generateContent",
            config.base_url.trim_end_matches('/'),
            config.model
        );

        Ok(Self {
            http,
            endpoint,
            api_key,
            api_key_env: config.api_key_env.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[async_trait]
impl Classifier for GeminiClassifier {
    async fn complete(&self, prompt: &str) -> Result<String, ClassifierError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ClassifierError::MissingApiKey {
                env_var: self.api_key_env.clone(),
            })?;

        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }]
        });

        let response = self
            .http
            .post(&self.endpoint)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClassifierError::Status {
                status: status.as_u16(),
            });
        }

        let payload: GenerateContentResponse = response.json().await?;
        let text = payload
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<String>()
            })
            .unwrap_or_default();

        let text = text.trim();
        if text.is_empty() {
            return Err(ClassifierError::EmptyOutput);
        }

        debug!(chars = text.len(), "classifier returned text");
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer, timeout_ms: u64) -> ClassifierConfig {
        ClassifierConfig {
            base_url: server.uri(),
            model: "gemini-test".to_string(),
            api_key_env: "TEST_KEY".to_string(),
            timeout_ms,
        }
    }

    #[tokio::test]
    async fn concatenates_candidate_text_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-test:generateContent"))
            .and(header("x-goog-api-key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": { "parts": [{ "text": "Sure: " }, { "text": "{\"priority\":\"HIGH\"}" }] }
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let classifier =
            GeminiClassifier::new(&config_for(&server, 2_000), Some("secret".to_string())).unwrap();
        let text = classifier.complete("hello").await.unwrap();
        assert_eq!(text, "Sure: {\"priority\":\"HIGH\"}");
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let classifier =
            GeminiClassifier::new(&config_for(&server, 2_000), Some("secret".to_string())).unwrap();
        let err = classifier.complete("hello").await.unwrap_err();
        assert_eq!(err.kind(), "status");
    }

    #[tokio::test]
    async fn empty_candidates_are_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .mount(&server)
            .await;

        let classifier =
            GeminiClassifier::new(&config_for(&server, 2_000), Some("secret".to_string())).unwrap();
        let err = classifier.complete("hello").await.unwrap_err();
        assert_eq!(err.kind(), "empty_output");
    }

    #[tokio::test]
    async fn slow_reply_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_millis(500))
                    .set_body_json(json!({ "candidates": [] })),
            )
            .mount(&server)
            .await;

        let classifier =
            GeminiClassifier::new(&config_for(&server, 50), Some("secret".to_string())).unwrap();
        let err = classifier.complete("hello").await.unwrap_err();
        assert_eq!(err.kind(), "timeout");
    }

    #[tokio::test]
    async fn missing_key_fails_without_calling_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let classifier = GeminiClassifier::new(&config_for(&server, 2_000), None).unwrap();
        let err = classifier.complete("hello").await.unwrap_err();
        assert_eq!(err.kind(), "missing_api_key");
    }
}
