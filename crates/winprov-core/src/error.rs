//! Error handling for provisioning operations

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for provisioning operations
pub type Result<T> = std::result::Result<T, ProvisionError>;

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Unsupported architecture: {0}")]
    UnsupportedArchitecture(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request to {url} returned HTTP {status}")]
    Http { url: String, status: u16 },

    #[error("Invalid asset pattern {pattern}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("No {tool} asset for {arch} in release {tag}")]
    AssetNotFound {
        tool: String,
        arch: String,
        tag: String,
    },

    #[error("Failed to extract {asset}: {message}")]
    Archive { asset: String, message: String },

    #[error("Checksum mismatch for {asset}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        asset: String,
        expected: String,
        actual: String,
    },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} is not installed (expected at {path})")]
    NotInstalled { tool: String, path: PathBuf },

    #[error("Configuration document not found: {0}")]
    DocumentNotFound(PathBuf),

    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with code {code:?}: {stderr}")]
    ToolFailed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },
}

impl ProvisionError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn archive(asset: impl Into<String>, message: impl ToString) -> Self {
        Self::Archive {
            asset: asset.into(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ProvisionError::Http {
            url: "https://api.github.com/repos/Azure/bicep/releases/latest".to_string(),
            status: 503,
        };
        assert!(err.to_string().contains("HTTP 503"));

        let err = ProvisionError::ToolFailed {
            tool: "dsc".to_string(),
            code: Some(2),
            stderr: "resource not found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "dsc exited with code Some(2): resource not found"
        );
    }

    #[test]
    fn test_io_helper_keeps_path() {
        let err = ProvisionError::io(
            "/opt/Bicep",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, ProvisionError::Io { ref path, .. } if path == Path::new("/opt/Bicep")));
    }
}
