//! Provisioning configuration
//!
//! Everything the installer needs is carried explicitly in [`ProvisionConfig`]
//! and passed to the functions that use it. Values come from defaults, an
//! optional YAML file, `WINPROV_*` environment variables and finally CLI flags.

use crate::error::{ProvisionError, Result};
use crate::platform::Architecture;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use strum::{Display, EnumString};
use winprov_retry::RetryPolicy;

/// Default GitHub API endpoint for release feeds
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Default directory for downloaded payloads
pub const DEFAULT_CACHE_DIR: &str = ".winprov/cache";

/// Who the tools are installed for
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum InstallScope {
    /// Shared install under the machine-wide program directory
    #[default]
    Machine,
    /// Per-user install under the user's program directory
    User,
}

/// Configuration for downloading and installing tools
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    /// Root for machine-scope installs
    pub install_root: PathBuf,

    /// Root for user-scope installs
    pub user_root: PathBuf,

    /// Where downloaded payloads are kept before installation
    pub cache_dir: PathBuf,

    pub scope: InstallScope,

    /// Skip detection and install for this architecture
    pub architecture: Option<Architecture>,

    /// Base URL of the release API
    pub api_base: String,

    /// Bearer token for the release API, raises rate limits
    #[serde(skip_serializing)]
    pub github_token: Option<String>,

    pub http_timeout_secs: u64,

    pub user_agent: String,

    /// Retry policy wrapped around every network call
    pub retry: RetryPolicy,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            install_root: default_install_root(),
            user_root: default_user_root(),
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            scope: InstallScope::Machine,
            architecture: None,
            api_base: DEFAULT_API_BASE.to_string(),
            github_token: None,
            http_timeout_secs: 30,
            user_agent: format!("winprov/{}", env!("CARGO_PKG_VERSION")),
            retry: RetryPolicy::default(),
        }
    }
}

fn default_install_root() -> PathBuf {
    if cfg!(windows) {
        std::env::var_os("ProgramFiles")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(r"C:\Program Files"))
    } else {
        PathBuf::from("/opt")
    }
}

fn default_user_root() -> PathBuf {
    if cfg!(windows) {
        if let Some(local) = std::env::var_os("LOCALAPPDATA") {
            return PathBuf::from(local).join("Programs");
        }
    } else if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home).join(".local").join("opt");
    }
    PathBuf::from(".winprov").join("user")
}

fn env_flag(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl ProvisionConfig {
    /// Defaults overridden by environment variables.
    ///
    /// Values that fail to parse are ignored and the default is kept.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Load a YAML file; missing keys take their defaults
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|e| ProvisionError::io(path, e))?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents)
            .map_err(|e| ProvisionError::config(format!("Invalid configuration file: {e}")))
    }

    /// Apply `WINPROV_*` (and `GITHUB_TOKEN`) environment overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(path) = env_flag("WINPROV_INSTALL_ROOT") {
            self.install_root = PathBuf::from(path);
        }

        if let Some(path) = env_flag("WINPROV_USER_ROOT") {
            self.user_root = PathBuf::from(path);
        }

        if let Some(path) = env_flag("WINPROV_CACHE_DIR") {
            self.cache_dir = PathBuf::from(path);
        }

        if let Some(Ok(scope)) = env_flag("WINPROV_SCOPE").map(|v| v.parse::<InstallScope>()) {
            self.scope = scope;
        }

        if let Some(Ok(arch)) = env_flag("WINPROV_ARCH").map(|v| v.parse::<Architecture>()) {
            self.architecture = Some(arch);
        }

        if let Some(url) = env_flag("WINPROV_API_BASE") {
            self.api_base = url;
        }

        if let Some(token) = env_flag("WINPROV_GITHUB_TOKEN").or_else(|| env_flag("GITHUB_TOKEN"))
        {
            self.github_token = Some(token);
        }

        if let Some(Ok(secs)) = env_flag("WINPROV_HTTP_TIMEOUT_SECS").map(|v| v.parse::<u64>()) {
            self.http_timeout_secs = secs;
        }

        let attempts = env_flag("WINPROV_MAX_ATTEMPTS").and_then(|v| v.parse::<u32>().ok());
        let base_delay = env_flag("WINPROV_BASE_DELAY_MS").and_then(|v| v.parse::<u64>().ok());
        if attempts.is_some() || base_delay.is_some() {
            self = self.with_retry(attempts, base_delay.map(Duration::from_millis));
        }

        self
    }

    /// Replace parts of the retry policy; an invalid combination keeps the current one
    pub fn with_retry(mut self, max_attempts: Option<u32>, base_delay: Option<Duration>) -> Self {
        let attempts = max_attempts.unwrap_or(self.retry.max_attempts());
        let delay = base_delay.unwrap_or(self.retry.base_delay());
        if let Ok(policy) = RetryPolicy::new(attempts, delay) {
            self.retry = match self.retry.max_delay() {
                Some(cap) => policy.with_max_delay(cap),
                None => policy,
            };
        }
        self
    }

    /// Root directory tools are installed under for the configured scope
    pub fn tool_root(&self) -> &Path {
        match self.scope {
            InstallScope::Machine => &self.install_root,
            InstallScope::User => &self.user_root,
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.install_root.as_os_str().is_empty() {
            return Err(ProvisionError::config("install_root cannot be empty"));
        }

        if self.user_root.as_os_str().is_empty() {
            return Err(ProvisionError::config("user_root cannot be empty"));
        }

        if self.cache_dir.as_os_str().is_empty() {
            return Err(ProvisionError::config("cache_dir cannot be empty"));
        }

        if !(self.api_base.starts_with("http://") || self.api_base.starts_with("https://")) {
            return Err(ProvisionError::config(format!(
                "api_base must be an http(s) URL, got '{}'",
                self.api_base
            )));
        }

        if self.http_timeout_secs == 0 {
            return Err(ProvisionError::config(
                "http_timeout_secs must be greater than 0",
            ));
        }

        Ok(())
    }
}
