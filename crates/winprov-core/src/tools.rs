//! Catalog of provisioned tools

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Tools winprov knows how to install
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Tool {
    /// Desired State Configuration engine
    Dsc,
    /// Bicep infrastructure-as-code compiler
    Bicep,
    /// Windows package manager
    Winget,
}

/// How a downloaded asset becomes an installed tool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallMethod {
    /// Unpack a `.zip` or `.tar.gz` archive into the tool directory
    Extract,
    /// The asset is the executable itself
    Copy,
    /// Hand the asset to a system package installer; `{package}` is replaced
    /// with the downloaded file
    Package { installer: &'static [&'static str] },
}

/// Small file written next to an installed tool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigFile {
    pub name: &'static str,
    pub contents: &'static str,
}

/// Everything needed to fetch, install and run one tool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolSpec {
    pub tool: Tool,
    /// `owner/name` of the GitHub repository publishing releases
    pub repo: &'static str,
    /// Regex matched against asset names; `{arch}` expands to each architecture alias
    pub asset_pattern: &'static str,
    pub method: InstallMethod,
    /// Directory under the install root
    pub install_subdir: &'static str,
    pub executable: &'static str,
    pub version_args: &'static [&'static str],
    /// Arguments that apply a document; `{document}` is replaced with its path
    pub apply_args: &'static [&'static str],
    pub config_file: Option<ConfigFile>,
}

/// Placeholder for the architecture alias in [`ToolSpec::asset_pattern`]
pub const ARCH_PLACEHOLDER: &str = "{arch}";

/// Placeholder for the document path in [`ToolSpec::apply_args`]
pub const DOCUMENT_PLACEHOLDER: &str = "{document}";

/// Placeholder for the downloaded package in [`InstallMethod::Package`]
pub const PACKAGE_PLACEHOLDER: &str = "{package}";

const DSC: ToolSpec = ToolSpec {
    tool: Tool::Dsc,
    repo: "PowerShell/DSC",
    asset_pattern: r"^DSC-\d+\.\d+\.\d+(-[\w.]+)?-{arch}-pc-windows-msvc\.zip$",
    method: InstallMethod::Extract,
    install_subdir: "DSC",
    executable: "dsc.exe",
    version_args: &["--version"],
    apply_args: &["config", "set", "--file", DOCUMENT_PLACEHOLDER],
    config_file: None,
};

const BICEP: ToolSpec = ToolSpec {
    tool: Tool::Bicep,
    repo: "Azure/bicep",
    asset_pattern: r"^bicep-win-{arch}\.exe$",
    method: InstallMethod::Copy,
    install_subdir: "Bicep",
    executable: "bicep.exe",
    version_args: &["--version"],
    apply_args: &["build", DOCUMENT_PLACEHOLDER],
    config_file: Some(ConfigFile {
        name: "bicepconfig.json",
        contents: r#"{
  "analyzers": {
    "core": {
      "enabled": true
    }
  }
}
"#,
    }),
};

const WINGET: ToolSpec = ToolSpec {
    tool: Tool::Winget,
    repo: "microsoft/winget-cli",
    asset_pattern: r"^Microsoft\.DesktopAppInstaller_8wekyb3d8bbwe\.msixbundle$",
    method: InstallMethod::Package {
        installer: &[
            "powershell.exe",
            "-NoProfile",
            "-NonInteractive",
            "-Command",
            "Add-AppxPackage",
            "-Path",
            PACKAGE_PLACEHOLDER,
        ],
    },
    install_subdir: "WinGet",
    executable: "winget.exe",
    version_args: &["--version"],
    apply_args: &[
        "configure",
        "--file",
        DOCUMENT_PLACEHOLDER,
        "--accept-configuration-agreements",
        "--disable-interactivity",
    ],
    config_file: None,
};

impl Tool {
    pub fn spec(&self) -> &'static ToolSpec {
        match self {
            Tool::Dsc => &DSC,
            Tool::Bicep => &BICEP,
            Tool::Winget => &WINGET,
        }
    }
}

impl ToolSpec {
    /// Whether the asset pattern depends on the architecture
    pub fn is_arch_specific(&self) -> bool {
        self.asset_pattern.contains(ARCH_PLACEHOLDER)
    }

    /// Name of the tool, used in logs and errors
    pub fn name(&self) -> String {
        self.tool.to_string()
    }
}
