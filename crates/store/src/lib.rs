//! Credential storage backends.
//!
//! Provides an in-memory store for testing and a JSON-file store for production.

pub mod file;
pub mod memory;

pub use file::FileCredentialStore;
pub use memory::InMemoryCredentialStore;
