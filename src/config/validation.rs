//! Semantic configuration checks.

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::RouterConfig;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("bind_address '{0}' is not a valid socket address")]
    BindAddress(String),
    #[error("max_connections must be greater than zero")]
    MaxConnections,
}

/// Validate a deserialized configuration. Collects every problem instead of
/// stopping at the first.
pub fn validate_config(config: &RouterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(
            config.listener.bind_address.clone(),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::MaxConnections);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
