//! Installing downloaded assets into their fixed locations

use crate::config::ProvisionConfig;
use crate::error::{ProvisionError, Result};
use crate::invoke::{render_args, run_program};
use crate::release::Asset;
use crate::tools::{InstallMethod, ToolSpec, PACKAGE_PLACEHOLDER};
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tar::Archive;
use tokio::fs;
use tracing::{debug, info, warn};
use zip::ZipArchive;

/// Directory a tool is installed into
pub fn tool_dir(config: &ProvisionConfig, spec: &ToolSpec) -> PathBuf {
    config.tool_root().join(spec.install_subdir)
}

/// Expected path of the tool's executable
pub fn install_path(config: &ProvisionConfig, spec: &ToolSpec) -> PathBuf {
    tool_dir(config, spec).join(spec.executable)
}

/// Path of an already installed executable, if any.
///
/// Tools installed by a package installer live wherever that installer put
/// them, so they are looked up on `PATH`.
pub fn find_installed(config: &ProvisionConfig, spec: &ToolSpec) -> Option<PathBuf> {
    let expected = install_path(config, spec);
    if expected.is_file() {
        return Some(expected);
    }

    match spec.method {
        InstallMethod::Package { .. } => locate_on_path(spec.executable),
        _ => None,
    }
}

/// First `PATH` entry containing `executable`
pub fn locate_on_path(executable: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(executable))
        .find(|candidate| candidate.is_file())
}

/// Lower-case hex SHA-256 of `bytes`
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Verify a downloaded payload against an expected SHA-256
pub fn verify_sha256(asset: &str, bytes: &[u8], expected: &str) -> Result<()> {
    let actual = sha256_hex(bytes);
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        return Err(ProvisionError::ChecksumMismatch {
            asset: asset.to_string(),
            expected: expected.trim().to_ascii_lowercase(),
            actual,
        });
    }
    debug!(asset, "Checksum verified");
    Ok(())
}

/// Install `bytes` (the contents of `asset`) and return the executable path
pub async fn install(
    config: &ProvisionConfig,
    spec: &ToolSpec,
    asset: &Asset,
    bytes: &[u8],
) -> Result<PathBuf> {
    let dir = tool_dir(config, spec);
    let target = install_path(config, spec);

    match spec.method {
        InstallMethod::Extract => {
            ensure_dir(&dir).await?;
            extract_archive_blocking(&asset.name, bytes, &dir).await?;
            if !target.is_file() {
                return Err(ProvisionError::archive(
                    &asset.name,
                    format!("archive does not contain {}", spec.executable),
                ));
            }
        }
        InstallMethod::Copy => {
            ensure_dir(&dir).await?;
            fs::write(&target, bytes)
                .await
                .map_err(|e| ProvisionError::io(&target, e))?;
        }
        InstallMethod::Package { installer } => {
            return install_package(config, spec, asset, bytes, installer).await;
        }
    }

    make_executable(&target).await?;
    info!(tool = %spec.tool, path = %target.display(), "Installed");
    Ok(target)
}

async fn install_package(
    config: &ProvisionConfig,
    spec: &ToolSpec,
    asset: &Asset,
    bytes: &[u8],
    installer: &[&str],
) -> Result<PathBuf> {
    ensure_dir(&config.cache_dir).await?;
    let package = config.cache_dir.join(&asset.name);
    fs::write(&package, bytes)
        .await
        .map_err(|e| ProvisionError::io(&package, e))?;

    let Some((program, template)) = installer.split_first() else {
        return Err(ProvisionError::config(format!(
            "{} has an empty package installer command",
            spec.tool
        )));
    };
    let args = render_args(template, PACKAGE_PLACEHOLDER, &package.to_string_lossy());

    info!(tool = %spec.tool, package = %package.display(), "Running package installer");
    run_program(&spec.name(), Path::new(program), &args)
        .await?
        .check(&spec.name())?;

    find_installed(config, spec).ok_or_else(|| ProvisionError::NotInstalled {
        tool: spec.name(),
        path: install_path(config, spec),
    })
}

/// Write a tool's configuration file into `dir`, replacing any previous one
pub async fn write_config_file(dir: &Path, name: &str, contents: &str) -> Result<PathBuf> {
    ensure_dir(dir).await?;
    let path = dir.join(name);
    fs::write(&path, contents)
        .await
        .map_err(|e| ProvisionError::io(&path, e))?;
    debug!(path = %path.display(), "Wrote configuration file");
    Ok(path)
}

async fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .await
        .map_err(|e| ProvisionError::io(dir, e))
}

/// [`extract_archive`] on the blocking thread pool
pub async fn extract_archive_blocking(name: &str, bytes: &[u8], dest: &Path) -> Result<()> {
    let (name, bytes, dest) = (name.to_string(), bytes.to_vec(), dest.to_path_buf());
    let asset = name.clone();
    tokio::task::spawn_blocking(move || extract_archive(&name, &bytes, &dest))
        .await
        .map_err(|e| ProvisionError::archive(asset, e))?
}

/// Unpack a `.zip` or `.tar.gz` archive into `dest`
pub fn extract_archive(name: &str, bytes: &[u8], dest: &Path) -> Result<()> {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".zip") {
        extract_zip(name, bytes, dest)
    } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
        extract_tar_gz(name, bytes, dest)
    } else {
        Err(ProvisionError::archive(name, "unsupported archive format"))
    }
}

fn extract_zip(name: &str, bytes: &[u8], dest: &Path) -> Result<()> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| ProvisionError::archive(name, e))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| ProvisionError::archive(name, e))?;

        let Some(relative) = entry.enclosed_name() else {
            warn!(archive = name, entry = entry.name(), "Skipping entry outside archive root");
            continue;
        };
        let out_path = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|e| ProvisionError::io(&out_path, e))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ProvisionError::io(parent, e))?;
        }
        let mut out =
            std::fs::File::create(&out_path).map_err(|e| ProvisionError::io(&out_path, e))?;
        std::io::copy(&mut entry, &mut out).map_err(|e| ProvisionError::io(&out_path, e))?;
    }

    Ok(())
}

fn extract_tar_gz(name: &str, bytes: &[u8], dest: &Path) -> Result<()> {
    let mut archive = Archive::new(GzDecoder::new(Cursor::new(bytes)));
    archive
        .unpack(dest)
        .map_err(|e| ProvisionError::archive(name, e))
}

/// Make the binary executable (Unix only)
async fn make_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let mut perms = fs::metadata(path)
            .await
            .map_err(|e| ProvisionError::io(path, e))?
            .permissions();
        perms.set_mode(perms.mode() | 0o755);
        fs::set_permissions(path, perms)
            .await
            .map_err(|e| ProvisionError::io(path, e))?;
    }
    #[cfg(not(unix))]
    let _ = path;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, contents) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(contents).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn tar_gz_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, contents) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *contents).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_verify_sha256() {
        let digest = sha256_hex(b"payload");
        assert!(verify_sha256("a.zip", b"payload", &digest.to_uppercase()).is_ok());

        let err = verify_sha256("a.zip", b"tampered", &digest).unwrap_err();
        assert!(matches!(err, ProvisionError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_extract_zip_keeps_tree() {
        let temp = TempDir::new().unwrap();
        let bytes = zip_bytes(&[
            ("dsc.exe", b"binary"),
            ("resources/registry.dsc.resource.json", b"{}"),
        ]);

        extract_archive("DSC.zip", &bytes, temp.path()).unwrap();

        assert_eq!(std::fs::read(temp.path().join("dsc.exe")).unwrap(), b"binary");
        assert!(temp
            .path()
            .join("resources/registry.dsc.resource.json")
            .is_file());
    }

    #[test]
    fn test_extract_zip_skips_escaping_entries() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("out");
        std::fs::create_dir_all(&dest).unwrap();
        let bytes = zip_bytes(&[("../evil.exe", b"nope"), ("ok.exe", b"fine")]);

        extract_archive("bad.zip", &bytes, &dest).unwrap();

        assert!(!temp.path().join("evil.exe").exists());
        assert!(dest.join("ok.exe").is_file());
    }

    #[test]
    fn test_extract_tar_gz() {
        let temp = TempDir::new().unwrap();
        let bytes = tar_gz_bytes(&[("bin/tool", b"#!/bin/sh\n")]);

        extract_archive("tool.tar.gz", &bytes, temp.path()).unwrap();

        assert!(temp.path().join("bin/tool").is_file());
    }

    #[test]
    fn test_unsupported_archive() {
        let temp = TempDir::new().unwrap();
        let err = extract_archive("tool.7z", b"", temp.path()).unwrap_err();
        assert!(matches!(err, ProvisionError::Archive { .. }));
    }

    #[test]
    fn test_corrupt_zip() {
        let temp = TempDir::new().unwrap();
        let err = extract_archive("broken.zip", b"not a zip", temp.path()).unwrap_err();
        assert!(matches!(err, ProvisionError::Archive { .. }));
    }

    #[tokio::test]
    async fn test_extract_off_the_runtime_thread() {
        let temp = TempDir::new().unwrap();
        let bytes = zip_bytes(&[("dsc.exe", b"binary")]);

        extract_archive_blocking("DSC.zip", &bytes, temp.path())
            .await
            .unwrap();
        assert!(temp.path().join("dsc.exe").is_file());

        let err = extract_archive_blocking("broken.zip", b"not a zip", temp.path())
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Archive { ref asset, .. } if asset == "broken.zip"));
    }

    #[tokio::test]
    async fn test_write_config_file_overwrites() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("Bicep");

        write_config_file(&dir, "bicepconfig.json", "{}").await.unwrap();
        let path = write_config_file(&dir, "bicepconfig.json", "{\"a\":1}")
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(path).unwrap(), "{\"a\":1}");
    }
}
