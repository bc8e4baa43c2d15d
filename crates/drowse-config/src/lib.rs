//! Configuration parsing and validation for drowsed
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Idle-shutdown policy (interval, grace period, uptime gate, tag)
//! - Ordered cascade stages and an optional daily shutdown time
//! - Proxmox API token settings
//! - Validation with clear error messages

mod policy;
mod schema;
mod validation;

pub use policy::*;
pub use schema::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Load and validate configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Policy> {
    let path = path.as_ref();
    tracing::debug!(path = %path.display(), "Loading configuration");
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<Policy> {
    Ok(Policy::from_raw(parse_raw(content)?))
}

/// Parse and validate, resolving the default monitored node to `local_host`
pub fn parse_config_for_host(content: &str, local_host: &str) -> ConfigResult<Policy> {
    Ok(Policy::from_raw_for_host(parse_raw(content)?, local_host))
}

fn parse_raw(content: &str) -> ConfigResult<RawConfig> {
    let raw: RawConfig = toml::from_str(content)?;

    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    Ok(raw)
}

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;
    use drowse_util::{WallClock, WorkloadId};
    use std::io::Write;
    use std::time::Duration;

    const API: &str = r#"
        [api]
        host = "pve.example.net"
        user = "root@pam"
        token_name = "drowse"
        token_value = "secret"
    "#;

    #[test]
    fn parse_minimal_config() {
        let config = format!("config_version = 1\nenabled = true\n{}", API);

        let policy = parse_config_for_host(&config, "pve01").unwrap();
        assert!(policy.enabled);
        assert!(policy.dry_run);
        assert_eq!(policy.check_interval, Duration::from_secs(300));
        assert_eq!(policy.grace_period, Duration::from_secs(60));
        assert_eq!(policy.min_uptime, Duration::from_secs(600));
        assert_eq!(policy.max_consecutive_errors, 10);
        assert_eq!(policy.safe_shutdown_tag, "safe-shutdown");
        assert_eq!(policy.monitored_nodes.len(), 1);
        assert_eq!(policy.monitored_nodes[0].as_str(), "pve01");
        assert!(policy.stages.is_empty());
        assert!(policy.shutdown_time.is_none());
        assert_eq!(policy.api.port, 8006);
    }

    #[test]
    fn parse_full_config() {
        let config = format!(
            r#"
            config_version = 1
            enabled = true
            check_interval = 60
            monitored_nodes = ["pve01", "pve02"]
            safe_shutdown_tag = "may-stop"
            grace_period = 120
            dry_run = false
            min_uptime = 900
            max_consecutive_errors = 3
            log_state_changes_only = false
            excluded_vms = [999]
            settle_delay = 10

            [[shutdown_order]]
            name = "clients"
            vmids = [101, 102]
            wait_after = 5

            [[shutdown_order]]
            name = "servers"
            vmids = [200]
            wait_after = 0

            [shutdown_time]
            hour = 23
            minute = 30
            {}
            "#,
            API
        );

        let policy = parse_config_for_host(&config, "pve01").unwrap();
        assert_eq!(policy.monitored_nodes.len(), 2);
        assert_eq!(policy.safe_shutdown_tag, "may-stop");
        assert!(!policy.dry_run);
        assert!(policy.is_excluded(WorkloadId::new(999)));
        assert_eq!(policy.timing.settle_delay, Duration::from_secs(10));
        assert_eq!(policy.stages.len(), 2);
        assert_eq!(policy.stages[0].name, "clients");
        assert_eq!(policy.stages[1].wait_after, Duration::ZERO);
        assert_eq!(policy.shutdown_time, WallClock::new(23, 30));
    }

    #[test]
    fn service_disabled_unless_enabled() {
        let config = format!("config_version = 1\n{}", API);

        let policy = parse_config_for_host(&config, "pve01").unwrap();
        assert!(!policy.enabled);
        assert!(!Policy::default().enabled);
    }

    #[test]
    fn example_config_is_valid() {
        let content = include_str!("../../../config.example.toml");

        let policy = parse_config_for_host(content, "pve01").unwrap();
        assert_eq!(policy.stages.len(), 3);
        assert!(policy.is_excluded(WorkloadId::new(100)));
        assert_eq!(policy.shutdown_time, WallClock::new(23, 30));
    }

    #[test]
    fn reject_wrong_version() {
        let config = format!("config_version = 99\n{}", API);

        let result = parse_config(&config);
        assert!(matches!(result, Err(ConfigError::UnsupportedVersion(99))));
    }

    #[test]
    fn reject_invalid_values() {
        let config = format!("config_version = 1\ncheck_interval = 5\n{}", API);

        match parse_config(&config) {
            Err(ConfigError::ValidationFailed { errors }) => assert_eq!(errors.len(), 1),
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn missing_api_table_is_parse_error() {
        let result = parse_config("config_version = 1");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "config_version = 1\ngrace_period = 45\n{}", API).unwrap();

        let policy = load_config(file.path()).unwrap();
        assert_eq!(policy.grace_period, Duration::from_secs(45));
    }

    #[test]
    fn load_missing_file() {
        let result = load_config("/nonexistent/drowse/config.toml");
        assert!(matches!(result, Err(ConfigError::ReadError(_))));
    }
}
