//! Configuration validation

use crate::policy::{
    DEFAULT_SEQUENCE_TIMEOUT_SECS, DEFAULT_SETTLE_DELAY_SECS, MIN_CHECK_INTERVAL_SECS,
    MIN_GRACE_PERIOD_SECS,
};
use crate::schema::{RawApiConfig, RawConfig, RawShutdownStage, RawShutdownTime};
use std::collections::HashSet;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("check_interval must be at least {min}s (got {value}s)")]
    IntervalTooShort { value: u64, min: u64 },

    #[error("grace_period must be at least {min}s (got {value}s)")]
    GracePeriodTooShort { value: u64, min: u64 },

    #[error("Invalid safe_shutdown_tag '{value}': {message}")]
    InvalidTag { value: String, message: String },

    #[error("Stage '{stage}': {message}")]
    StageError { stage: String, message: String },

    #[error("Duplicate stage name: {0}")]
    DuplicateStageName(String),

    #[error("Invalid shutdown_time {hour:02}:{minute:02}: {message}")]
    InvalidShutdownTime {
        hour: u8,
        minute: u8,
        message: String,
    },

    #[error("api.{field}: {message}")]
    ApiError { field: &'static str, message: String },

    #[error("Global config error: {0}")]
    GlobalError(String),
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(interval) = config.check_interval
        && interval < MIN_CHECK_INTERVAL_SECS
    {
        errors.push(ValidationError::IntervalTooShort {
            value: interval,
            min: MIN_CHECK_INTERVAL_SECS,
        });
    }

    if let Some(grace) = config.grace_period
        && grace < MIN_GRACE_PERIOD_SECS
    {
        errors.push(ValidationError::GracePeriodTooShort {
            value: grace,
            min: MIN_GRACE_PERIOD_SECS,
        });
    }

    if config.max_consecutive_errors == Some(0) {
        errors.push(ValidationError::GlobalError(
            "max_consecutive_errors must be at least 1".into(),
        ));
    }

    if config.sequence_timeout == Some(0) {
        errors.push(ValidationError::GlobalError(
            "sequence_timeout must be greater than 0".into(),
        ));
    } else {
        let settle = config.settle_delay.unwrap_or(DEFAULT_SETTLE_DELAY_SECS);
        let sequence = config.sequence_timeout.unwrap_or(DEFAULT_SEQUENCE_TIMEOUT_SECS);
        if sequence <= settle {
            errors.push(ValidationError::GlobalError(format!(
                "sequence_timeout ({}s) must be longer than settle_delay ({}s)",
                sequence, settle
            )));
        }
    }

    if let Some(tag) = &config.safe_shutdown_tag
        && let Err(message) = check_tag(tag)
    {
        errors.push(ValidationError::InvalidTag {
            value: tag.clone(),
            message,
        });
    }

    if config.monitored_nodes.iter().any(|n| n.trim().is_empty()) {
        errors.push(ValidationError::GlobalError(
            "monitored_nodes cannot contain empty names".into(),
        ));
    }

    let mut seen_stages = HashSet::new();
    for stage in &config.shutdown_order {
        if !stage.name.trim().is_empty() && !seen_stages.insert(stage.name.as_str()) {
            errors.push(ValidationError::DuplicateStageName(stage.name.clone()));
        }
        errors.extend(validate_stage(stage));
    }

    if let Some(time) = &config.shutdown_time {
        errors.extend(validate_shutdown_time(time));
    }

    errors.extend(validate_api(&config.api));

    errors
}

/// A tag must be non-empty and must not contain the Proxmox tag delimiter
pub fn check_tag(tag: &str) -> Result<(), String> {
    if tag.trim().is_empty() {
        return Err("tag cannot be empty".into());
    }
    if tag.contains(';') {
        return Err("tag cannot contain ';'".into());
    }
    Ok(())
}

fn validate_stage(stage: &RawShutdownStage) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if stage.name.trim().is_empty() {
        errors.push(ValidationError::StageError {
            stage: stage.name.clone(),
            message: "name cannot be empty".into(),
        });
    }

    let mut seen = HashSet::new();
    for id in &stage.vmids {
        if !seen.insert(id) {
            errors.push(ValidationError::StageError {
                stage: stage.name.clone(),
                message: format!("vmid {} listed twice", id),
            });
        }
    }

    errors
}

fn validate_shutdown_time(time: &RawShutdownTime) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if time.hour >= 24 {
        errors.push(ValidationError::InvalidShutdownTime {
            hour: time.hour,
            minute: time.minute,
            message: "hour must be 0-23".into(),
        });
    }
    if time.minute >= 60 {
        errors.push(ValidationError::InvalidShutdownTime {
            hour: time.hour,
            minute: time.minute,
            message: "minute must be 0-59".into(),
        });
    }

    errors
}

fn validate_api(api: &RawApiConfig) -> Vec<ValidationError> {
    let required = [
        ("host", &api.host),
        ("user", &api.user),
        ("token_name", &api.token_name),
        ("token_value", &api.token_value),
    ];

    let mut errors: Vec<ValidationError> = required
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| ValidationError::ApiError {
            field,
            message: "cannot be empty".into(),
        })
        .collect();

    if api.port == Some(0) {
        errors.push(ValidationError::ApiError {
            field: "port",
            message: "must be greater than 0".into(),
        });
    }
    if api.request_timeout == Some(0) {
        errors.push(ValidationError::ApiError {
            field: "request_timeout",
            message: "must be greater than 0".into(),
        });
    }

    errors
}
