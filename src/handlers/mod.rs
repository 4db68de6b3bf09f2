//! HTTP request handlers
//!
//! - `api` - Public liveness check
//! - `speech` - Text-to-speech proxy: synthesis, voices, provider health and listing

pub mod api;
pub mod speech;
