//! Release feeds: latest-release lookup, asset selection and download

use crate::config::ProvisionConfig;
use crate::error::{ProvisionError, Result};
use crate::platform::Architecture;
use crate::tools::{ToolSpec, ARCH_PLACEHOLDER};
use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// A published release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

/// A downloadable file attached to a release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: u64,
}

impl Release {
    /// Tag without a leading `v`
    pub fn version(&self) -> &str {
        self.tag_name
            .strip_prefix('v')
            .unwrap_or(&self.tag_name)
    }
}

/// Source of releases and their assets
#[async_trait]
pub trait ReleaseFeed: Send + Sync {
    /// Latest published release of `repo` (`owner/name`)
    async fn latest_release(&self, repo: &str) -> Result<Release>;

    /// Raw bytes of `asset`
    async fn download(&self, asset: &Asset) -> Result<Vec<u8>>;
}

/// GitHub releases API
pub struct GitHubReleaseFeed {
    client: Client,
    api_base: String,
}

impl GitHubReleaseFeed {
    pub fn new(config: &ProvisionConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        if let Some(token) = &config.github_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| ProvisionError::config("github_token contains invalid characters"))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(config.http_timeout())
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()
            .map_err(ProvisionError::Client)?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    pub fn latest_release_url(&self, repo: &str) -> String {
        format!("{}/repos/{}/releases/latest", self.api_base, repo)
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| ProvisionError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProvisionError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl ReleaseFeed for GitHubReleaseFeed {
    async fn latest_release(&self, repo: &str) -> Result<Release> {
        let url = self.latest_release_url(repo);
        debug!(%url, "Fetching latest release");

        let release: Release = self
            .get(&url)
            .await?
            .json()
            .await
            .map_err(|source| ProvisionError::Request { url, source })?;

        info!(repo, tag = %release.tag_name, assets = release.assets.len(), "Found release");
        Ok(release)
    }

    async fn download(&self, asset: &Asset) -> Result<Vec<u8>> {
        let url = &asset.browser_download_url;
        info!(asset = %asset.name, %url, "Downloading asset");

        let bytes = self
            .get(url)
            .await?
            .bytes()
            .await
            .map_err(|source| ProvisionError::Request {
                url: url.clone(),
                source,
            })?;
        Ok(bytes.to_vec())
    }
}

/// Compile the asset pattern of `spec` for one architecture alias
fn asset_regex(spec: &ToolSpec, alias: &str) -> Result<Regex> {
    let pattern = spec
        .asset_pattern
        .replace(ARCH_PLACEHOLDER, &regex::escape(alias));
    Regex::new(&pattern).map_err(|source| ProvisionError::Pattern { pattern, source })
}

/// Pick the asset of `release` that matches `spec` on `arch`.
///
/// Aliases are tried in order, so `x86_64` wins over `x64` when a release
/// publishes both.
pub fn select_asset<'a>(
    release: &'a Release,
    spec: &ToolSpec,
    arch: Architecture,
) -> Result<&'a Asset> {
    let aliases: &[&str] = if spec.is_arch_specific() {
        arch.asset_aliases()
    } else {
        &[""]
    };

    for alias in aliases {
        let regex = asset_regex(spec, alias)?;
        if let Some(asset) = release.assets.iter().find(|a| regex.is_match(&a.name)) {
            debug!(asset = %asset.name, %arch, "Selected release asset");
            return Ok(asset);
        }
    }

    Err(ProvisionError::AssetNotFound {
        tool: spec.name(),
        arch: arch.to_string(),
        tag: release.tag_name.clone(),
    })
}
