//! `portgate-auth` — policy decision engine for reverse-proxy lifecycle events.
//!
//! This crate is intentionally decoupled from HTTP and storage: records and
//! server definitions are read through the [`PolicySource`] seam.

pub mod decision;
pub mod engine;
pub mod proxy;
pub mod source;

pub use decision::{Decision, PluginResponse};
pub use engine::{NewProxyRequest, PolicyDecisionEngine, PortalLogin};
pub use proxy::ProxyType;
pub use source::{LookupError, PolicySource};
