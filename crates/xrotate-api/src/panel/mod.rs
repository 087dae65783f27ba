//! 3x-ui panel API.
//!
//! Cookie-session login, the xray settings document, and service restart.
//! Every call is a single HTTP round trip; nothing is retried here.

pub mod auth;
pub mod client;
pub mod models;
pub mod xray;

pub use auth::SessionToken;
pub use client::{DEFAULT_SESSION_COOKIE, PanelClient};
pub use models::PanelConfig;
