//! Tool provisioning for Windows images
//!
//! Installs third-party CLI tools from their release feeds and uses them to
//! apply declarative configuration documents. Each step is a plain sequence:
//! check whether the tool is present, fetch it if not, install it into its
//! fixed location, verify it runs, write its configuration file, invoke it and
//! report. Every network call goes through a [`winprov_retry::Executor`].
//!
//! # Components
//!
//! - [`config`]: explicit [`ProvisionConfig`] replacing ambient script state
//! - [`platform`]: OS and architecture detection
//! - [`tools`]: catalog of supported tools and how to install them
//! - [`release`]: release feed client and asset selection
//! - [`install`]: archive extraction, checksums, configuration files
//! - [`invoke`]: running installed tools
//! - [`provisioner`]: the end-to-end flow

pub mod config;
pub mod error;
pub mod install;
pub mod invoke;
pub mod platform;
pub mod provisioner;
pub mod release;
pub mod tools;

// re-export main types for convenience
pub use config::{InstallScope, ProvisionConfig};
pub use error::{ProvisionError, Result};
pub use invoke::InvocationOutput;
pub use platform::{Architecture, Platform, PlatformTriple};
pub use provisioner::{InstallOptions, InstallOutcome, InstallReport, Provisioner};
pub use release::{Asset, GitHubReleaseFeed, Release, ReleaseFeed};
pub use tools::{InstallMethod, Tool, ToolSpec};
pub use winprov_retry::RetryPolicy;
