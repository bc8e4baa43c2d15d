//! Default paths and host identification for drowse components
//!
//! - Config: `$DROWSE_CONFIG` or `/etc/drowse/config.toml`
//! - Host name: `$DROWSE_HOSTNAME` or the kernel host name

use std::path::PathBuf;

/// Environment variable for overriding the config path
pub const DROWSE_CONFIG_ENV: &str = "DROWSE_CONFIG";

/// Environment variable for overriding the local host name
pub const DROWSE_HOSTNAME_ENV: &str = "DROWSE_HOSTNAME";

const SYSTEM_CONFIG_PATH: &str = "/etc/drowse/config.toml";

/// Get the default config file path.
///
/// Order of precedence:
/// 1. `$DROWSE_CONFIG` environment variable (if set)
/// 2. `/etc/drowse/config.toml`
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(DROWSE_CONFIG_ENV) {
        return PathBuf::from(path);
    }

    PathBuf::from(SYSTEM_CONFIG_PATH)
}

/// Name of the machine this process runs on.
///
/// Proxmox node names equal the host name by default, so this is used both
/// as the default monitored node and to decide whether a node power-off must
/// go through the local OS instead of the API.
pub fn local_hostname() -> String {
    if let Ok(name) = std::env::var(DROWSE_HOSTNAME_ENV)
        && !name.is_empty()
    {
        return name;
    }

    match nix::unistd::gethostname() {
        Ok(name) => {
            let name = name.to_string_lossy();
            // Short name only; Proxmox node names never carry the domain
            name.split('.').next().unwrap_or_default().to_string()
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read host name, using 'localhost'");
            "localhost".to_string()
        }
    }
}
