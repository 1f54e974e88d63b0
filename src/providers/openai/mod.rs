//! OpenAI chat provider (registry tag `openai`).
//!
//! Accepts `model` or `model_name`, `api_key` or `openai_api_key`, an
//! optional `base_url` (defaults to [`DEFAULT_BASE_URL`]) and an optional
//! `organization`.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::json;

use crate::config::ResolvedArguments;
use crate::contract::chat::{cleanse_response, ChatCapability};
use crate::providers::utils::{self, ChatSettings, RetryPolicy};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI chat-completions client.
#[derive(Debug)]
pub struct OpenAiChat {
    settings: ChatSettings,
    base_url: String,
    organization: Option<String>,
    client: reqwest::Client,
}

impl OpenAiChat {
    pub fn from_arguments(args: &ResolvedArguments) -> Result<Self> {
        let settings = ChatSettings::from_arguments(
            args,
            &["model", "model_name"],
            &["api_key", "openai_api_key"],
        )?;
        let client = settings.http_client()?;

        Ok(Self {
            base_url: args
                .optional_str("base_url")?
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            organization: args.optional_str("organization")?.map(str::to_string),
            settings,
            client,
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.settings.retry = retry;
        self
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    pub fn api_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl ChatCapability for OpenAiChat {
    async fn generate_response(&self, prompt: &str, system_message: &str) -> Result<String> {
        let api_key = self
            .settings
            .api_key
            .as_ref()
            .ok_or_else(|| anyhow!("OpenAI API key not set; configure `openai_api_key`"))?;
        let url = self.api_url();
        let body = json!({
            "model": self.settings.model,
            "messages": utils::chat_messages(prompt, system_message),
            "temperature": self.settings.temperature,
        });

        log::debug!(
            "OpenAiChat.generate_response: model={}, prompt_chars={}",
            self.settings.model,
            prompt.len()
        );

        let response = utils::send_with_retry("OpenAI", &self.settings.retry, || {
            let mut request = self.client.post(&url).bearer_auth(api_key.expose_secret());
            if let Some(org) = &self.organization {
                request = request.header("OpenAI-Organization", org);
            }
            request.json(&body)
        })
        .await?;

        let answer = utils::parse_chat_response("OpenAI", &response)?;
        Ok(cleanse_response(&answer))
    }
}

/// Registry constructor.
pub fn construct(args: &ResolvedArguments) -> Result<Arc<dyn ChatCapability>> {
    Ok(Arc::new(OpenAiChat::from_arguments(args)?))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::Value;

    use super::*;
    use crate::providers::utils::testing;

    fn args(value: Value) -> ResolvedArguments {
        match value {
            Value::Object(map) => ResolvedArguments::new(map),
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_defaults() {
        let chat = OpenAiChat::from_arguments(&args(json!({"model_name": "gpt-35"}))).unwrap();
        assert_eq!(chat.model(), "gpt-35");
        assert_eq!(chat.api_url(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn test_requires_model() {
        let err = OpenAiChat::from_arguments(&args(json!({"openai_api_key": "sk"}))).unwrap_err();
        assert!(err.to_string().contains("model"));
    }

    #[test]
    fn test_rejects_non_numeric_temperature() {
        let err = OpenAiChat::from_arguments(&args(json!({"model": "m", "temperature": "hot"})))
            .unwrap_err();
        assert!(err.to_string().contains("temperature"));
    }

    #[tokio::test]
    async fn test_generate_response_against_local_endpoint() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                if auth != "Bearer sk-test" {
                    return (StatusCode::UNAUTHORIZED, Json(json!({})));
                }
                assert_eq!(
                    headers.get("openai-organization").and_then(|v| v.to_str().ok()),
                    Some("org-1")
                );
                assert_eq!(body["model"], "gpt-35");
                assert_eq!(body["temperature"], 0.0);
                assert_eq!(body["messages"][1]["content"], "hello");
                (StatusCode::OK, Json(testing::completion("hi there")))
            }),
        );
        let base = testing::serve(router).await;

        let chat = OpenAiChat::from_arguments(&args(json!({
            "model_name": "gpt-35",
            "temperature": 0,
            "openai_api_key": "sk-test",
            "organization": "org-1",
            "base_url": format!("{base}/v1/"),
        })))
        .unwrap();

        assert_eq!(chat.generate_response("hello", "be brief").await.unwrap(), "hi there");
    }

    #[tokio::test]
    async fn test_rate_limit_exhausts_attempts() {
        let router = Router::new().route(
            "/chat/completions",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, Json(json!({}))) }),
        );
        let base = testing::serve(router).await;

        let chat = OpenAiChat::from_arguments(&args(json!({
            "model": "gpt-35",
            "api_key": "sk-test",
            "base_url": base,
        })))
        .unwrap()
        .with_retry_policy(RetryPolicy {
            max_attempts: 2,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        });

        let err = chat.generate_response("hello", "").await.unwrap_err();
        let rendered = format!("{err:#}");
        assert!(rendered.contains("after 2 attempt(s)"));
        assert!(rendered.contains("429"));
        assert!(!rendered.contains("sk-test"));
    }
}
