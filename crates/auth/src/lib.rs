//! OAuth credential lifecycle for the Anthropic upstream.
//!
//! [`AuthManager`] decides whether a stored credential is usable and
//! refreshes it against the token endpoint when it has expired. The
//! [`anthropic`] module holds the endpoint constants and request/response
//! shapes; [`flow`] is the boundary to the interactive login collaborator.

pub mod anthropic;
pub mod flow;
pub mod manager;
pub mod pkce;

pub use flow::{AuthFlow, AuthSession, CodePasteFlow};
pub use manager::AuthManager;
