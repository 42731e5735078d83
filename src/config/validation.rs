//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, limits > 0)
//! - Check cross-field constraints (timeout >= interval)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: SyncConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::SyncConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &SyncConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("`{}` is not a socket address", config.listener.bind_address),
        ));
    }
    if !config.listener.path.starts_with('/') {
        errors.push(ValidationError::new("listener.path", "must start with `/`"));
    }
    if config.listener.max_message_bytes == 0 {
        errors.push(ValidationError::new("listener.max_message_bytes", "must be > 0"));
    }

    if config.heartbeat.interval_ms == 0 {
        errors.push(ValidationError::new("heartbeat.interval_ms", "must be > 0"));
    }
    if config.heartbeat.timeout_ms < config.heartbeat.interval_ms {
        errors.push(ValidationError::new(
            "heartbeat.timeout_ms",
            "must be >= heartbeat.interval_ms",
        ));
    }

    if config.limits.max_connections_per_source == 0 {
        errors.push(ValidationError::new("limits.max_connections_per_source", "must be > 0"));
    }
    if config.limits.max_messages_per_window == 0 {
        errors.push(ValidationError::new("limits.max_messages_per_window", "must be > 0"));
    }
    if config.limits.window_ms == 0 {
        errors.push(ValidationError::new("limits.window_ms", "must be > 0"));
    }

    if config.bind_retry.max_attempts == 0 {
        errors.push(ValidationError::new("bind_retry.max_attempts", "must be > 0"));
    }
    if config.events.buffer == 0 {
        errors.push(ValidationError::new("events.buffer", "must be > 0"));
    }

    if config.admin.enabled && config.admin.api_key.is_empty() {
        errors.push(ValidationError::new("admin.api_key", "required when admin is enabled"));
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
    fn defaults_are_valid() {
        assert_eq!(validate_config(&SyncConfig::default()), Ok(()));
    }

    #[test]
    fn reports_every_problem() {
        let mut config = SyncConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.listener.path = "state-sync".into();
        config.limits.window_ms = 0;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec!["listener.bind_address", "listener.path", "limits.window_ms"]
        );
    }

    #[test]
    fn timeout_must_cover_interval() {
        let mut config = SyncConfig::default();
        config.heartbeat.interval_ms = 10_000;
        config.heartbeat.timeout_ms = 5_000;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "heartbeat.timeout_ms");
    }

    #[test]
    fn error_display_names_the_field() {
        let mut config = SyncConfig::default();
        config.limits.window_ms = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].to_string(), "limits.window_ms: must be > 0");
    }
}
