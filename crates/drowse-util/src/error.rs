//! Error types for drowse

use thiserror::Error;

use crate::NodeName;

/// Core error type for drowse operations
#[derive(Debug, Error)]
pub enum DrowseError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Query failed on node {node}: {message}")]
    TransientQuery { node: NodeName, message: String },

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Shutdown sequence for node {node} exceeded {timeout_secs}s")]
    SequenceTimeout { node: NodeName, timeout_secs: u64 },

    #[error("Stopped after {consecutive} consecutive errors (max {max})")]
    FatalErrorThreshold { consecutive: u32, max: u32 },
}

impl DrowseError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn permission(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    pub fn query(node: &NodeName, msg: impl Into<String>) -> Self {
        Self::TransientQuery {
            node: node.clone(),
            message: msg.into(),
        }
    }

    pub fn command(msg: impl Into<String>) -> Self {
        Self::CommandFailed(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, DrowseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_error_names_node() {
        let err = DrowseError::query(&NodeName::new("pve02"), "connection refused");
        assert_eq!(
            err.to_string(),
            "Query failed on node pve02: connection refused"
        );
    }
}
