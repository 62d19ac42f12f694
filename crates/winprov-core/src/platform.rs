//! Platform and architecture detection

use crate::error::{ProvisionError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;

/// Operating system platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Linux,
    MacOS,
    Windows,
}

impl Platform {
    /// Get the current platform
    pub fn current() -> Result<Self> {
        match env::consts::OS {
            "linux" => Ok(Platform::Linux),
            "macos" => Ok(Platform::MacOS),
            "windows" => Ok(Platform::Windows),
            other => Err(ProvisionError::UnsupportedPlatform(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::MacOS => "darwin",
            Platform::Windows => "windows",
        }
    }

    /// Suffix of native executables
    pub fn exe_suffix(&self) -> &'static str {
        match self {
            Platform::Windows => ".exe",
            _ => "",
        }
    }
}

/// CPU architectures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Architecture {
    #[serde(alias = "x64", alias = "amd64")]
    X86_64,
    #[serde(alias = "arm64")]
    Aarch64,
    X86,
}

impl Architecture {
    /// Architecture this binary was compiled for
    pub fn current() -> Result<Self> {
        match env::consts::ARCH {
            "x86_64" => Ok(Architecture::X86_64),
            "aarch64" => Ok(Architecture::Aarch64),
            "x86" => Ok(Architecture::X86),
            other => Err(ProvisionError::UnsupportedArchitecture(other.to_string())),
        }
    }

    /// Map a Windows `PROCESSOR_ARCHITECTURE` value
    pub fn from_processor_architecture(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "AMD64" | "EM64T" => Some(Architecture::X86_64),
            "ARM64" => Some(Architecture::Aarch64),
            "X86" => Some(Architecture::X86),
            _ => None,
        }
    }

    /// Operating system architecture.
    ///
    /// A 32-bit process on 64-bit Windows sees `PROCESSOR_ARCHITECTURE=x86`, the
    /// real value is in `PROCESSOR_ARCHITEW6432`. Falls back to [`Architecture::current`].
    pub fn detect() -> Result<Self> {
        for var in ["PROCESSOR_ARCHITEW6432", "PROCESSOR_ARCHITECTURE"] {
            if let Some(arch) = env::var(var)
                .ok()
                .and_then(|v| Self::from_processor_architecture(&v))
            {
                return Ok(arch);
            }
        }
        Self::current()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Architecture::X86_64 => "x86_64",
            Architecture::Aarch64 => "aarch64",
            Architecture::X86 => "x86",
        }
    }

    /// Names release feeds use for this architecture, most specific first
    pub fn asset_aliases(&self) -> &'static [&'static str] {
        match self {
            Architecture::X86_64 => &["x86_64", "x64", "amd64"],
            Architecture::Aarch64 => &["aarch64", "arm64"],
            Architecture::X86 => &["x86", "i686", "386"],
        }
    }
}

impl FromStr for Architecture {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        [Architecture::X86_64, Architecture::Aarch64, Architecture::X86]
            .into_iter()
            .find(|arch| arch.asset_aliases().contains(&lower.as_str()))
            .or_else(|| Self::from_processor_architecture(s))
            .ok_or_else(|| ProvisionError::UnsupportedArchitecture(s.to_string()))
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Platform and architecture combination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlatformTriple {
    pub platform: Platform,
    pub architecture: Architecture,
}

impl PlatformTriple {
    /// Detect the host, honouring an explicit architecture override
    pub fn detect(arch_override: Option<Architecture>) -> Result<Self> {
        let architecture = match arch_override {
            Some(arch) => arch,
            None => Architecture::detect()?,
        };

        Ok(Self {
            platform: Platform::current()?,
            architecture,
        })
    }
}

impl fmt::Display for PlatformTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.platform, self.architecture)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("AMD64", Some(Architecture::X86_64))]
    #[case("arm64", Some(Architecture::Aarch64))]
    #[case("x86", Some(Architecture::X86))]
    #[case(" EM64T ", Some(Architecture::X86_64))]
    #[case("IA64", None)]
    fn test_processor_architecture(#[case] value: &str, #[case] expected: Option<Architecture>) {
        assert_eq!(Architecture::from_processor_architecture(value), expected);
    }

    #[rstest]
    #[case("x64", Architecture::X86_64)]
    #[case("amd64", Architecture::X86_64)]
    #[case("X86_64", Architecture::X86_64)]
    #[case("arm64", Architecture::Aarch64)]
    #[case("aarch64", Architecture::Aarch64)]
    #[case("i686", Architecture::X86)]
    fn test_parse_aliases(#[case] input: &str, #[case] expected: Architecture) {
        assert_eq!(input.parse::<Architecture>().unwrap(), expected);
    }

    #[test]
    fn test_parse_unknown_architecture() {
        let err = "sparc".parse::<Architecture>().unwrap_err();
        assert!(matches!(err, ProvisionError::UnsupportedArchitecture(_)));
    }

    #[test]
    fn test_override_wins() {
        let triple = PlatformTriple::detect(Some(Architecture::Aarch64)).unwrap();
        assert_eq!(triple.architecture, Architecture::Aarch64);
    }

    #[test]
    fn test_display() {
        let triple = PlatformTriple {
            platform: Platform::Windows,
            architecture: Architecture::X86_64,
        };
        assert_eq!(triple.to_string(), "windows-x86_64");
        assert_eq!(Platform::Windows.exe_suffix(), ".exe");
    }
}
