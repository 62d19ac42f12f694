//! Provisioning flow: check, fetch, install, verify, configure, invoke, report

use crate::config::ProvisionConfig;
use crate::error::{ProvisionError, Result};
use crate::install::{self, find_installed, install_path, tool_dir, verify_sha256};
use crate::invoke::{apply_document, tool_version, InvocationOutput};
use crate::platform::{Architecture, PlatformTriple};
use crate::release::{select_asset, Asset, GitHubReleaseFeed, Release, ReleaseFeed};
use crate::tools::{Tool, ToolSpec};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{info, instrument};
use winprov_retry::{ActionFailed, Executor};

/// Per-install switches
#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Reinstall even if the tool is already present
    pub force: bool,
    /// Expected SHA-256 of the downloaded asset
    pub sha256: Option<String>,
    /// Run the tool's version command after installing
    pub verify: bool,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            force: false,
            sha256: None,
            verify: true,
        }
    }
}

/// What [`Provisioner::ensure`] did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    AlreadyPresent,
    Installed { version: String, asset: String },
}

#[derive(Debug, Clone)]
pub struct InstallReport {
    pub tool: Tool,
    pub outcome: InstallOutcome,
    pub path: PathBuf,
    pub architecture: Architecture,
    /// Output of the version command, when it was run
    pub reported_version: Option<String>,
    pub config_file: Option<PathBuf>,
    pub finished_at: DateTime<Utc>,
}

impl InstallReport {
    pub fn was_installed(&self) -> bool {
        matches!(self.outcome, InstallOutcome::Installed { .. })
    }
}

/// Installs tools from a release feed and applies documents with them
pub struct Provisioner<F = GitHubReleaseFeed> {
    config: ProvisionConfig,
    feed: F,
    host: PlatformTriple,
}

impl Provisioner<GitHubReleaseFeed> {
    /// Provisioner backed by the GitHub releases API
    pub fn from_config(config: ProvisionConfig) -> Result<Self> {
        let feed = GitHubReleaseFeed::new(&config)?;
        Self::new(config, feed)
    }
}

impl<F: ReleaseFeed> Provisioner<F> {
    pub fn new(config: ProvisionConfig, feed: F) -> Result<Self> {
        config.validate()?;
        let host = PlatformTriple::detect(config.architecture)?;
        info!(%host, scope = %config.scope, root = %config.tool_root().display(), "Provisioner ready");
        Ok(Self { config, feed, host })
    }

    pub fn config(&self) -> &ProvisionConfig {
        &self.config
    }

    pub fn architecture(&self) -> Architecture {
        self.host.architecture
    }

    pub fn host(&self) -> PlatformTriple {
        self.host
    }

    /// Where `tool` is, or would be, installed
    pub fn install_path(&self, tool: Tool) -> PathBuf {
        install_path(&self.config, tool.spec())
    }

    fn executor(&self, operation: String) -> Executor {
        let on_exhausted = format!("Giving up on {operation}");
        Executor::new(self.config.retry.clone())
            .named(operation)
            .on_exhausted(on_exhausted)
    }

    async fn fetch_release(&self, spec: &ToolSpec) -> Result<Release> {
        self.executor(format!("fetch {} release", spec.tool))
            .run_async(|| self.feed.latest_release(spec.repo))
            .await
            .map_err(ActionFailed::into_inner)
    }

    async fn fetch_asset<'r>(
        &self,
        spec: &ToolSpec,
        release: &'r Release,
    ) -> Result<(&'r Asset, Vec<u8>)> {
        let asset = select_asset(release, spec, self.host.architecture)?;
        let bytes = self
            .executor(format!("download {}", asset.name))
            .run_async(|| self.feed.download(asset))
            .await
            .map_err(ActionFailed::into_inner)?;
        Ok((asset, bytes))
    }

    /// Make sure `tool` is installed, downloading it when absent
    #[instrument(skip(self, options), fields(arch = %self.host.architecture))]
    pub async fn ensure(&self, tool: Tool, options: &InstallOptions) -> Result<InstallReport> {
        let spec = tool.spec();

        if !options.force {
            if let Some(path) = find_installed(&self.config, spec) {
                info!(path = %path.display(), "Already installed");
                let reported_version = self.verify(spec, &path, options).await?;
                return Ok(self.report(
                    tool,
                    InstallOutcome::AlreadyPresent,
                    path,
                    reported_version,
                    None,
                ));
            }
        }

        let release = self.fetch_release(spec).await?;
        let (asset, bytes) = self.fetch_asset(spec, &release).await?;

        if let Some(expected) = &options.sha256 {
            verify_sha256(&asset.name, &bytes, expected)?;
        }

        let path = install::install(&self.config, spec, asset, &bytes).await?;

        let config_file = match spec.config_file {
            Some(file) => Some(
                install::write_config_file(&tool_dir(&self.config, spec), file.name, file.contents)
                    .await?,
            ),
            None => None,
        };

        let reported_version = self.verify(spec, &path, options).await?;
        let outcome = InstallOutcome::Installed {
            version: release.version().to_string(),
            asset: asset.name.clone(),
        };
        Ok(self.report(tool, outcome, path, reported_version, config_file))
    }

    async fn verify(
        &self,
        spec: &ToolSpec,
        path: &Path,
        options: &InstallOptions,
    ) -> Result<Option<String>> {
        if !options.verify {
            return Ok(None);
        }
        let version = tool_version(spec, path).await?;
        info!(tool = %spec.tool, %version, "Verified");
        Ok(Some(version))
    }

    fn report(
        &self,
        tool: Tool,
        outcome: InstallOutcome,
        path: PathBuf,
        reported_version: Option<String>,
        config_file: Option<PathBuf>,
    ) -> InstallReport {
        InstallReport {
            tool,
            outcome,
            path,
            architecture: self.host.architecture,
            reported_version,
            config_file,
            finished_at: Utc::now(),
        }
    }

    /// Apply `document` with an already installed `tool`
    #[instrument(skip(self, document), fields(document = %document.display()))]
    pub async fn apply(&self, tool: Tool, document: &Path) -> Result<InvocationOutput> {
        let spec = tool.spec();
        let executable =
            find_installed(&self.config, spec).ok_or_else(|| ProvisionError::NotInstalled {
                tool: spec.name(),
                path: install_path(&self.config, spec),
            })?;
        apply_document(spec, &executable, document).await
    }

    /// Install `tool` if needed, then apply `document` when given
    pub async fn provision(
        &self,
        tool: Tool,
        options: &InstallOptions,
        document: Option<&Path>,
    ) -> Result<(InstallReport, Option<InvocationOutput>)> {
        if let Some(document) = document {
            if !document.is_file() {
                return Err(ProvisionError::DocumentNotFound(document.to_path_buf()));
            }
        }

        let report = self.ensure(tool, options).await?;
        let applied = match document {
            Some(document) => Some(apply_document(tool.spec(), &report.path, document).await?),
            None => None,
        };
        Ok((report, applied))
    }
}
