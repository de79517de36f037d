//! Provider-facing descriptors (data) and strategies (behavior).
//!
//! `descriptor` exposes validated metadata (`ProviderDescriptor`) covering HTTPS-only
//! authorize, token, and REST API endpoints, client authentication preferences, and provider
//! quirks. `strategy` defines [`ProviderStrategy`], an HTTP-client-agnostic hook used by flows
//! to classify failures and interpret rate-limit responses.

pub mod descriptor;
pub mod strategy;

pub use descriptor::*;
pub use strategy::*;
