//! Provider base URL validation.
//!
//! Base URLs come from configuration and may point at local
//! OpenAI-compatible servers, so plain HTTP and private hosts are accepted.
//! What is rejected is anything that cannot be used as an HTTP endpoint.

use thiserror::Error;
use url::Url;

/// Hosts whose voice catalogue is known without asking the provider.
const FIRST_PARTY_HOSTS: &[&str] = &["api.openai.com"];

/// Errors that can occur during URL validation
#[derive(Debug, Error)]
pub enum UrlValidationError {
    #[error("Invalid URL format: {0}")]
    InvalidFormat(#[from] url::ParseError),

    #[error("URL scheme must be http or https, got: {0}")]
    UnsupportedScheme(String),

    #[error("URL must have a host")]
    MissingHost,

    #[error("URL must not carry credentials")]
    CredentialsNotAllowed,
}

/// Validates a provider base URL.
pub fn validate_base_url(raw: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(raw.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(UrlValidationError::UnsupportedScheme(other.to_string())),
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(UrlValidationError::MissingHost);
    }

    if !url.username().is_empty() || url.password().is_some() {
        return Err(UrlValidationError::CredentialsNotAllowed);
    }

    Ok(url)
}

/// Whether `base_url` points at a first-party provider host.
///
/// Unparseable URLs are never first-party.
pub fn is_first_party_host(base_url: &str) -> bool {
    Url::parse(base_url.trim())
        .ok()
        .and_then(|url| url.host_str().map(str::to_ascii_lowercase))
        .is_some_and(|host| FIRST_PARTY_HOSTS.contains(&host.as_str()))
}
