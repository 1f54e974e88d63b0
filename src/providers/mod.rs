//! Built-in chat implementations selectable by type tag.

pub mod azure;
pub mod openai;
pub mod utils;

pub use azure::AzureChat;
pub use openai::OpenAiChat;
