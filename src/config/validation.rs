use std::net::SocketAddr;

use eyre::Result;

use crate::{config::models::ServerConfig, core::i18n::Language};

/// Accepted range for generated code widths
const CODE_LENGTH_RANGE: std::ops::RangeInclusive<usize> = 4..=32;

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Server configuration validator
pub struct ServerConfigValidator;

impl ServerConfigValidator {
    /// Validate the entire server configuration
    pub fn validate(config: &ServerConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        if let Some(origin) = &config.public_origin {
            if let Err(e) = Self::validate_origin(origin) {
                errors.push(e);
            }
        }

        if config.default_language.parse::<Language>().is_err() {
            errors.push(ValidationError::InvalidField {
                field: "default_language".to_string(),
                message: format!(
                    "Unsupported language '{}', expected one of: {}",
                    config.default_language,
                    Language::ALL
                        .iter()
                        .map(|lang| lang.code())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            });
        }

        if config.default_user_agent.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "default_user_agent".to_string(),
            });
        }

        for (field, value) in [
            ("short_code_length", config.short_code_length),
            ("config_id_length", config.config_id_length),
        ] {
            if !CODE_LENGTH_RANGE.contains(&value) {
                errors.push(ValidationError::InvalidField {
                    field: field.to_string(),
                    message: format!(
                        "Must be between {} and {}, got {value}",
                        CODE_LENGTH_RANGE.start(),
                        CODE_LENGTH_RANGE.end()
                    ),
                });
            }
        }

        if config.max_body_bytes == 0 {
            errors.push(ValidationError::InvalidField {
                field: "max_body_bytes".to_string(),
                message: "Must be greater than zero".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    /// A public origin is a bare `scheme://host[:port]`, no path, query or fragment.
    fn validate_origin(origin: &str) -> ValidationResult<()> {
        let field = "public_origin".to_string();
        match url::Url::parse(origin) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    return Err(ValidationError::InvalidField {
                        field,
                        message: format!(
                            "URL scheme must be 'http' or 'https', got '{}'",
                            url.scheme()
                        ),
                    });
                }

                if url.host().is_none() {
                    return Err(ValidationError::InvalidField {
                        field,
                        message: "URL must have a valid host".to_string(),
                    });
                }

                if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
                    return Err(ValidationError::InvalidField {
                        field,
                        message: "Origin must not carry a path, query or fragment".to_string(),
                    });
                }

                Ok(())
            }
            Err(e) => Err(ValidationError::InvalidField {
                field,
                message: format!("Invalid URL format: {e}"),
            }),
        }
    }

    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}
