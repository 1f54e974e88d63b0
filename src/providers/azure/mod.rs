//! Azure OpenAI chat provider (registry tag `azure`).
//!
//! Arguments:
//!
//! | Key | Meaning |
//! |-----|---------|
//! | `model` / `engine` / `model_name` | deployment name (required) |
//! | `api_key` / `azure_api_key` | key sent as the `api-key` header |
//! | `endpoint` | resource endpoint, e.g. `https://acme.openai.azure.com` |
//! | `api_version` | defaults to [`DEFAULT_API_VERSION`] |
//! | `temperature`, `max_attempts`, `timeout_secs` | see [`ChatSettings`] |
//!
//! Construction performs no network I/O; a missing key or endpoint is
//! reported on the first call.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::json;

use crate::config::ResolvedArguments;
use crate::contract::chat::{cleanse_response, ChatCapability};
use crate::providers::utils::{self, ChatSettings, RetryPolicy};

/// API version used when none is configured.
pub const DEFAULT_API_VERSION: &str = "2024-02-01";

/// Azure OpenAI chat-completions client.
#[derive(Debug)]
pub struct AzureChat {
    settings: ChatSettings,
    endpoint: Option<String>,
    api_version: String,
    client: reqwest::Client,
}

impl AzureChat {
    pub fn from_arguments(args: &ResolvedArguments) -> Result<Self> {
        let settings = ChatSettings::from_arguments(
            args,
            &["model", "engine", "model_name"],
            &["api_key", "azure_api_key"],
        )?;
        let client = settings.http_client()?;

        Ok(Self {
            endpoint: args.optional_str("endpoint")?.map(str::to_string),
            api_version: args
                .optional_str("api_version")?
                .unwrap_or(DEFAULT_API_VERSION)
                .to_string(),
            settings,
            client,
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.settings.retry = retry;
        self
    }

    pub fn deployment(&self) -> &str {
        &self.settings.model
    }

    /// Full chat-completions URL for the configured deployment.
    pub fn api_url(&self) -> Result<String> {
        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or_else(|| anyhow!("Azure endpoint not set; configure `endpoint`"))?;
        Ok(format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            endpoint.trim_end_matches('/'),
            self.settings.model,
            self.api_version
        ))
    }
}

#[async_trait]
impl ChatCapability for AzureChat {
    async fn generate_response(&self, prompt: &str, system_message: &str) -> Result<String> {
        let api_key = self
            .settings
            .api_key
            .as_ref()
            .ok_or_else(|| anyhow!("Azure API key not set; configure `api_key`"))?;
        let url = self.api_url()?;
        let body = json!({
            "messages": utils::chat_messages(prompt, system_message),
            "temperature": self.settings.temperature,
        });

        log::debug!(
            "AzureChat.generate_response: deployment={}, prompt_chars={}",
            self.settings.model,
            prompt.len()
        );

        let response = utils::send_with_retry("Azure", &self.settings.retry, || {
            self.client
                .post(&url)
                .header("api-key", api_key.expose_secret())
                .json(&body)
        })
        .await?;

        let answer = utils::parse_chat_response("Azure", &response)?;
        Ok(cleanse_response(&answer))
    }
}

/// Registry constructor.
pub fn construct(args: &ResolvedArguments) -> Result<Arc<dyn ChatCapability>> {
    Ok(Arc::new(AzureChat::from_arguments(args)?))
}
