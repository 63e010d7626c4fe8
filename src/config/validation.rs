use super::models::Config;
use thiserror::Error;

const MAX_IMAGE_BYTES_LIMIT: u64 = 64 * 1024 * 1024; // 64 MB
const MAX_PAGE_SIZE: u32 = 500;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("fetch.user_agent must not be empty")]
    EmptyUserAgent,

    #[error("Timeout must be positive: {field} = {value}")]
    InvalidTimeout { field: String, value: u64 },

    #[error("fetch.max_image_bytes must be between 1 byte and {limit} bytes, got {actual}")]
    InvalidImageLimit { actual: u64, limit: u64 },

    #[error("Invalid URL scheme for {field} '{value}', expected 'http://' or 'https://'")]
    InvalidUrlScheme { field: String, value: String },

    #[error("gallery.page_size must be between 1 and {max}, got {value}")]
    InvalidPageSize { value: u32, max: u32 },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_fetch(config)?;
    validate_gallery(config)?;
    Ok(())
}

fn validate_fetch(config: &Config) -> Result<(), ValidationError> {
    let fetch = &config.fetch;

    if fetch.user_agent.trim().is_empty() {
        return Err(ValidationError::EmptyUserAgent);
    }

    for (field, value) in [
        ("connect_timeout_secs", fetch.connect_timeout_secs),
        ("request_timeout_secs", fetch.request_timeout_secs),
    ] {
        if value == 0 {
            return Err(ValidationError::InvalidTimeout {
                field: field.to_string(),
                value,
            });
        }
    }

    let max_image_bytes = fetch.max_image_bytes.as_u64();
    if max_image_bytes == 0 || max_image_bytes > MAX_IMAGE_BYTES_LIMIT {
        return Err(ValidationError::InvalidImageLimit {
            actual: max_image_bytes,
            limit: MAX_IMAGE_BYTES_LIMIT,
        });
    }

    if let Some(proxy) = &fetch.proxy {
        validate_http_url("fetch.proxy", proxy)?;
    }

    Ok(())
}

fn validate_gallery(config: &Config) -> Result<(), ValidationError> {
    validate_http_url("gallery.endpoint", &config.gallery.endpoint)?;

    let page_size = config.gallery.page_size;
    if page_size == 0 || page_size > MAX_PAGE_SIZE {
        return Err(ValidationError::InvalidPageSize {
            value: page_size,
            max: MAX_PAGE_SIZE,
        });
    }

    Ok(())
}

fn validate_http_url(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(ValidationError::InvalidUrlScheme {
            field: field.to_string(),
            value: value.to_string(),
        })
    }
}
