//! Core types and traits for the subproxy workspace.
//!
//! This crate defines the shared abstractions used across all layers of the
//! proxy: the error type, provider keys, stored OAuth credentials, the
//! inbound request shape, and the async traits each layer implements.

pub mod chat;
pub mod credential;
pub mod error;
pub mod provider;
pub mod traits;

pub use chat::{MessagesRequest, SystemBlock, SystemPrompt};
pub use credential::{Credential, CredentialKind, CredentialSet, TokenState};
pub use error::ProxyError;
pub use provider::ProviderKey;
pub use traits::{Clock, CredentialStore, FixedClock, SystemClock};
