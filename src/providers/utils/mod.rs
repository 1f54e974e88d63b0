//! Helpers shared by the built-in chat providers.
//!
//! Both providers speak the OpenAI chat-completions wire format; they differ
//! only in URL layout, authentication header and whether the model is named
//! in the body.

use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use rand::Rng;
use secrecy::SecretString;
use serde_json::{json, Value};

use crate::config::ResolvedArguments;

/// Default request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Randomized exponential backoff for transient API failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(90),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt number `attempt` (0-based; attempt 0 has none).
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// A random delay before attempt `attempt`, drawn uniformly between
    /// `initial_delay` and [`delay_before`](Self::delay_before).
    pub fn jittered_delay_before<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let upper = self.delay_before(attempt);
        let lower = self.initial_delay.min(upper);
        if lower == upper {
            return upper;
        }
        rng.gen_range(lower..=upper)
    }
}

// ---------------------------------------------------------------------------
// Settings shared by providers
// ---------------------------------------------------------------------------

/// Constructor arguments common to every built-in chat provider.
#[derive(Debug)]
pub struct ChatSettings {
    /// Model or deployment name.
    pub model: String,
    /// API key; may be absent until the first call.
    pub api_key: Option<SecretString>,
    pub temperature: f64,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl ChatSettings {
    /// Read settings from `args`. The model is taken from the first of
    /// `model_keys` present; the key from the first of `key_keys`.
    pub fn from_arguments(
        args: &ResolvedArguments,
        model_keys: &[&str],
        key_keys: &[&str],
    ) -> Result<Self> {
        let model = first_str(args, model_keys)?
            .ok_or_else(|| anyhow!("missing required argument `{}`", model_keys[0]))?;
        if model.trim().is_empty() {
            bail!("argument `{}` must not be empty", model_keys[0]);
        }

        let api_key = first_str(args, key_keys)?
            .filter(|k| !k.is_empty())
            .map(|k| SecretString::from(k.to_string()));

        let max_attempts = match args.optional_u64("max_attempts")? {
            Some(0) => bail!("argument `max_attempts` must be at least 1"),
            Some(n) => u32::try_from(n).map_err(|_| anyhow!("argument `max_attempts` is too large"))?,
            None => RetryPolicy::default().max_attempts,
        };

        Ok(Self {
            model: model.to_string(),
            api_key,
            temperature: args.optional_f64("temperature")?.unwrap_or(0.0),
            timeout: Duration::from_secs(
                args.optional_u64("timeout_secs")?
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            retry: RetryPolicy {
                max_attempts,
                ..RetryPolicy::default()
            },
        })
    }

    pub fn http_client(&self) -> Result<reqwest::Client> {
        Ok(reqwest::Client::builder().timeout(self.timeout).build()?)
    }
}

fn first_str<'a>(args: &'a ResolvedArguments, keys: &[&str]) -> Result<Option<&'a str>> {
    for key in keys {
        if let Some(value) = args.optional_str(key)? {
            return Ok(Some(value));
        }
    }
    Ok(None)
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

/// `[system, user]` message list.
pub fn chat_messages(prompt: &str, system_message: &str) -> Value {
    json!([
        {"role": "system", "content": system_message},
        {"role": "user", "content": prompt},
    ])
}

/// Extract `choices[0].message.content` from a chat-completions response.
pub fn parse_chat_response(provider: &str, response: &Value) -> Result<String> {
    if let Some(error) = response.get("error") {
        let msg = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        bail!("{provider} API error: {msg}");
    }

    response
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow!("no message content in {provider} response"))
}

/// Send a request built by `build`, retrying transport errors, 429 and 5xx
/// responses with exponential backoff. Other 4xx responses fail at once.
pub async fn send_with_retry<F>(provider: &str, retry: &RetryPolicy, build: F) -> Result<Value>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_error = anyhow!("{provider} API call was not attempted");

    for attempt in 0..retry.max_attempts {
        if attempt > 0 {
            let delay = retry.jittered_delay_before(attempt, &mut rand::thread_rng());
            log::warn!(
                "{} API retry attempt {} after {:?}: {}",
                provider,
                attempt,
                delay,
                last_error
            );
            tokio::time::sleep(delay).await;
        }

        let response = match build().send().await {
            Ok(resp) => resp,
            Err(e) => {
                last_error = anyhow!(e).context(format!("{provider} request failed"));
                continue;
            }
        };

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            last_error = anyhow!("rate limited by {provider} API (429)");
            continue;
        }
        if status.is_server_error() {
            last_error = anyhow!("{provider} API server error: {status}");
            continue;
        }

        let text = response.text().await?;
        if status.is_client_error() {
            bail!("{provider} API error ({status}): {}", truncate(&text, 500));
        }

        return serde_json::from_str(&text).map_err(|e| {
            anyhow!(
                "failed to parse {provider} response: {e} - body: {}",
                truncate(&text, 500)
            )
        });
    }

    Err(last_error.context(format!(
        "{provider} API call failed after {} attempt(s)",
        retry.max_attempts
    )))
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn args(value: Value) -> ResolvedArguments {
        match value {
            Value::Object(map) => ResolvedArguments::new(map),
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_retry_delays_double_and_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_before(0), Duration::ZERO);
        assert_eq!(policy.delay_before(1), Duration::from_secs(1));
        assert_eq!(policy.delay_before(2), Duration::from_secs(2));
        assert_eq!(policy.delay_before(5), Duration::from_secs(16));
        assert_eq!(policy.delay_before(10), Duration::from_secs(90));
        assert_eq!(policy.delay_before(40), Duration::from_secs(90));
    }

    #[test]
    fn test_jittered_delays_stay_within_bounds() {
        use rand::rngs::StdRng;
        use rand::SeedableRng;

        let policy = RetryPolicy::default();
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(policy.jittered_delay_before(0, &mut rng), Duration::ZERO);
        assert_eq!(policy.jittered_delay_before(1, &mut rng), Duration::from_secs(1));

        let mut distinct = std::collections::BTreeSet::new();
        for _ in 0..50 {
            let delay = policy.jittered_delay_before(8, &mut rng);
            assert!(delay >= Duration::from_secs(1));
            assert!(delay <= Duration::from_secs(90));
            distinct.insert(delay);
        }
        assert!(distinct.len() > 1);
    }

    #[test]
    fn test_jitter_with_zero_delays() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        };
        let mut rng = rand::thread_rng();
        assert_eq!(policy.jittered_delay_before(2, &mut rng), Duration::ZERO);
    }

    #[test]
    fn test_settings_from_arguments() {
        let settings = ChatSettings::from_arguments(
            &args(json!({"model_name": "gpt-35", "openai_api_key": "sk", "temperature": 0, "max_attempts": 2})),
            &["model", "model_name"],
            &["api_key", "openai_api_key"],
        )
        .unwrap();
        assert_eq!(settings.model, "gpt-35");
        assert_eq!(settings.api_key.as_ref().map(|k| k.expose_secret()), Some("sk"));
        assert_eq!(settings.temperature, 0.0);
        assert_eq!(settings.retry.max_attempts, 2);
        assert_eq!(settings.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }

    #[test]
    fn test_settings_null_key_is_absent() {
        let settings = ChatSettings::from_arguments(
            &args(json!({"model": "m", "api_key": null})),
            &["model"],
            &["api_key"],
        )
        .unwrap();
        assert!(settings.api_key.is_none());
        assert!(!format!("{settings:?}").contains("api_key: Some"));
    }

    #[test]
    fn test_settings_errors() {
        assert!(ChatSettings::from_arguments(&args(json!({})), &["model"], &["api_key"]).is_err());
        assert!(
            ChatSettings::from_arguments(&args(json!({"model": " "})), &["model"], &["api_key"])
                .is_err()
        );
        assert!(ChatSettings::from_arguments(
            &args(json!({"model": "m", "max_attempts": 0})),
            &["model"],
            &["api_key"]
        )
        .is_err());
    }

    #[test]
    fn test_parse_chat_response() {
        let content = parse_chat_response("test", &testing::completion("hello")).unwrap();
        assert_eq!(content, "hello");

        let err = parse_chat_response("test", &json!({"error": {"message": "quota"}})).unwrap_err();
        assert!(err.to_string().contains("quota"));

        assert!(parse_chat_response("test", &json!({"choices": []})).is_err());
    }

    #[test]
    fn test_chat_messages_order() {
        let messages = chat_messages("question", "rules");
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "rules");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[1]["content"], "question");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("hi", 10), "hi");
    }
}
