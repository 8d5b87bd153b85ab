//! Page automation capabilities for storescan.
//!
//! Defines the contracts the scanner consumes ([`PageSession`],
//! [`PageAutomation`], [`PrivilegedClient`]) together with the production
//! implementations: a chromiumoxide-driven [`BrowserEngine`] whose pages share
//! one browser profile, and a reqwest-backed [`HttpPrivilegedClient`].

pub mod actions;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod http;
pub mod network;

pub use actions::{cookie_header, with_timeout, PageAutomation, PageSession, SessionCookie};
pub use engine::{BrowserEngine, LaunchOptions};
pub use error::{BrowserError, Result};
pub use fingerprint::FingerprintConfig;
pub use http::{HttpPrivilegedClient, PrivilegedClient, SwitchRequest, SwitchResponse};
pub use network::{NetworkEvent, NetworkTap, RequestObserver};
