//! Configuration validation.

use url::Url;

use crate::config::schema::{CacheCategoryConfig, ProxyConfig};

/// A single validation failure, with the offending field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate the full configuration, collecting all failures.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let origins = [
        ("upstreams.main_origin", &config.upstreams.main_origin),
        ("upstreams.secondary_origin", &config.upstreams.secondary_origin),
        ("upstreams.api_origin", &config.upstreams.api_origin),
        ("upstreams.media_origin", &config.upstreams.media_origin),
        ("upstreams.palmistry_origin", &config.upstreams.palmistry_origin),
    ];
    for (field, origin) in origins {
        if Url::parse(origin).is_err() {
            errors.push(ValidationError {
                field: field.to_string(),
                message: format!("not an absolute URL: {origin}"),
            });
        } else if origin.ends_with('/') {
            errors.push(ValidationError {
                field: field.to_string(),
                message: "origin must not carry a trailing slash".to_string(),
            });
        }
    }

    if !config.upstreams.secondary_prefix.starts_with('/') {
        errors.push(ValidationError {
            field: "upstreams.secondary_prefix".to_string(),
            message: "prefix must start with '/'".to_string(),
        });
    }

    let categories = [
        ("cache.static_assets", config.cache.static_assets),
        ("cache.api", config.cache.api),
        ("cache.html", config.cache.html),
        ("cache.image", config.cache.image),
    ];
    for (field, CacheCategoryConfig { ttl_ms, capacity }) in categories {
        if ttl_ms == 0 {
            errors.push(ValidationError {
                field: format!("{field}.ttl_ms"),
                message: "TTL must be positive".to_string(),
            });
        }
        if capacity == 0 {
            errors.push(ValidationError {
                field: format!("{field}.capacity"),
                message: "capacity must be positive".to_string(),
            });
        }
    }

    if config.capture.fallback_text.trim().is_empty() {
        errors.push(ValidationError {
            field: "capture.fallback_text".to_string(),
            message: "fallback text must not be empty".to_string(),
        });
    }

    if config.currency.rate <= 0.0 {
        errors.push(ValidationError {
            field: "currency.rate".to_string(),
            message: "conversion rate must be positive".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&ProxyConfig::default()).is_ok());
    }

    #[test]
    fn test_bad_origin_rejected() {
        let mut config = ProxyConfig::default();
        config.upstreams.main_origin = "not a url".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "upstreams.main_origin"));
    }

    #[test]
    fn test_trailing_slash_rejected() {
        let mut config = ProxyConfig::default();
        config.upstreams.media_origin = "https://media.example.com/".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut config = ProxyConfig::default();
        config.cache.api.capacity = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "cache.api.capacity"));
    }

    #[test]
    fn test_empty_fallback_rejected() {
        let mut config = ProxyConfig::default();
        config.capture.fallback_text = "  ".to_string();
        assert!(validate_config(&config).is_err());
    }
}
