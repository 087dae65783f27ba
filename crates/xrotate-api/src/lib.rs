// xrotate-api: Async Rust client for the 3x-ui panel API

pub mod error;
pub mod panel;
pub mod transport;

pub use error::Error;
pub use panel::{PanelClient, PanelConfig, SessionToken, DEFAULT_SESSION_COOKIE};
pub use transport::{TlsMode, TransportConfig};
