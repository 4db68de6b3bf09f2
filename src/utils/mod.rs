pub mod url_validation;
pub use url_validation::{UrlValidationError, is_first_party_host, validate_base_url};
