//! Request and response translation between the `OpenAI` chat format and
//! the Anthropic Messages API.
//!
//! All translators are pure and perform no I/O: [`disguise`] rewrites
//! inbound requests, [`stream`] converts the upstream event stream chunk by
//! chunk, and [`claude_to_openai`] converts complete responses.

pub mod claude_to_openai;
pub mod disguise;
pub mod stream;

pub use claude_to_openai::AnthropicToOpenAI;
pub use disguise::{Prepared, prepare};
pub use stream::{StreamTranslator, TranslatedEvent};
