//! Safe-network layer: SSRF defense for every outbound call.
//!
//! All network-facing components validate destinations here before any
//! request is dispatched. Validation fails closed.

mod check;
mod client;
mod types;

pub use check::{is_ip_safe, is_safe, resolve_safe};
pub use client::SafeHttpClient;
pub use types::*;
