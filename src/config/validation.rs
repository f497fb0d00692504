//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Certificate and key must be configured together
//! - Listen addresses must resolve to socket addresses
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>

use thiserror::Error;

use crate::config::schema::ServerConfig;
use crate::net::listener::{parse_listen_addr, AddrError};

/// A single semantic problem in a configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Certfile is set but Keyfile is empty")]
    MissingKeyfile,

    #[error("Keyfile is set but Certfile is empty")]
    MissingCertfile,

    #[error("invalid {field}: {source}")]
    Address {
        field: &'static str,
        #[source]
        source: AddrError,
    },
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match (config.certfile.is_empty(), config.keyfile.is_empty()) {
        (false, true) => errors.push(ValidationError::MissingKeyfile),
        (true, false) => errors.push(ValidationError::MissingCertfile),
        _ => {}
    }

    if let Err(source) = parse_listen_addr(&config.listen) {
        errors.push(ValidationError::Address { field: "Listen", source });
    }

    if let Some(addr) = config.metric_listen_addr() {
        if let Err(source) = parse_listen_addr(addr) {
            errors.push(ValidationError::Address {
                field: "MetricListenAddr",
                source,
            });
        }
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
    fn default_config_is_valid() {
        assert!(validate_config(&ServerConfig::default()).is_ok());
    }

    #[test]
    fn reports_every_problem() {
        let config = ServerConfig {
            keyfile: "key.pem".into(),
            listen: "not an address".into(),
            metric_listen_addr: "still:not:valid".into(),
            ..ServerConfig::default()
        };

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(matches!(errors[0], ValidationError::MissingCertfile));
        assert!(matches!(errors[1], ValidationError::Address { field: "Listen", .. }));
        assert!(matches!(
            errors[2],
            ValidationError::Address { field: "MetricListenAddr", .. }
        ));
    }
}
