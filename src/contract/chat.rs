//! The chat-completion capability.

use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::ResolvedArguments;
use crate::loader::{PluginEntry, PluginObject};
use crate::providers::{azure, openai};
use crate::registry::BuiltinEntry;

use super::CapabilityContract;

/// Operation name of [`ChatCapability::generate_response`].
pub const GENERATE_RESPONSE: &str = "generate_response";

/// Produce a response to a user prompt under a system message.
///
/// Instances are shared across threads after startup; any interior
/// mutability is the implementation's own business.
#[async_trait]
pub trait ChatCapability: Send + Sync + fmt::Debug {
    /// Generate a response to `prompt`, steered by `system_message`.
    async fn generate_response(&self, prompt: &str, system_message: &str) -> Result<String>;
}

impl CapabilityContract for dyn ChatCapability {
    const NAME: &'static str = "chat";
    const OPERATIONS: &'static [&'static str] = &[GENERATE_RESPONSE];

    fn builtins() -> &'static [BuiltinEntry<Self>] {
        static BUILTINS: &[BuiltinEntry<dyn ChatCapability>] = &[
            BuiltinEntry {
                tag: "azure",
                construct: azure::construct,
            },
            BuiltinEntry {
                tag: "openai",
                construct: openai::construct,
            },
        ];
        BUILTINS
    }

    fn adapt(object: Arc<dyn PluginObject>) -> Arc<Self> {
        Arc::new(PluginChat { object })
    }
}

/// Strip code fences, newlines and tabs from a model response so it can be
/// consumed as compact JSON text.
pub fn cleanse_response(answer: &str) -> String {
    answer
        .replace("```json\n", "")
        .replace("\n```", "")
        .replace('\n', "")
        .replace('\t', "")
}

// ---------------------------------------------------------------------------
// Plugin adapter
// ---------------------------------------------------------------------------

/// A loaded plugin object seen through the chat contract.
#[derive(Debug)]
pub struct PluginChat {
    object: Arc<dyn PluginObject>,
}

#[async_trait]
impl ChatCapability for PluginChat {
    async fn generate_response(&self, prompt: &str, system_message: &str) -> Result<String> {
        let input = json!({
            "prompt": prompt,
            "system_message": system_message,
        });
        match self.object.invoke(GENERATE_RESPONSE, input).await? {
            Value::String(answer) => Ok(answer),
            other => Err(anyhow!(
                "plugin `{}` returned a non-string response: {}",
                self.object.name(),
                other
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Plugin authoring
// ---------------------------------------------------------------------------

/// Exposes a native [`ChatCapability`] as a plugin object.
struct ChatObject<T> {
    name: String,
    inner: T,
}

impl<T: fmt::Debug> fmt::Debug for ChatObject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatObject")
            .field("name", &self.name)
            .field("inner", &self.inner)
            .finish()
    }
}

#[async_trait]
impl<T: ChatCapability> PluginObject for ChatObject<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn operations(&self) -> Vec<String> {
        vec![GENERATE_RESPONSE.to_string()]
    }

    async fn invoke(&self, operation: &str, input: Value) -> Result<Value> {
        if operation != GENERATE_RESPONSE {
            return Err(anyhow!("unsupported operation `{operation}`"));
        }
        let prompt = input
            .get("prompt")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("missing `prompt`"))?;
        let system_message = input
            .get("system_message")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let answer = self.inner.generate_response(prompt, system_message).await?;
        Ok(Value::String(answer))
    }
}

/// Build a plugin entry from a constructor of a native chat implementation.
///
/// ```ignore
/// let unit = CodeUnit::new("acme.chat")
///     .export(ENTRY_SYMBOL, chat_entry("AcmeChat", AcmeChat::from_arguments));
/// ```
pub fn chat_entry<T, F>(name: &str, constructor: F) -> PluginEntry
where
    T: ChatCapability + 'static,
    F: Fn(&ResolvedArguments) -> Result<T> + Send + Sync + 'static,
{
    let object_name = name.to_string();
    PluginEntry::new(name, &[GENERATE_RESPONSE], move |args| {
        let inner = constructor(args)?;
        Ok(Arc::new(ChatObject {
            name: object_name.clone(),
            inner,
        }) as Arc<dyn PluginObject>)
    })
}
