//! Running installed tools

use crate::error::{ProvisionError, Result};
use crate::tools::{ToolSpec, DOCUMENT_PLACEHOLDER};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Captured result of a finished process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationOutput {
    /// Exit code, `None` when terminated by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl InvocationOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Turn a non-zero exit into [`ProvisionError::ToolFailed`]
    pub fn check(self, tool: &str) -> Result<Self> {
        if self.success() {
            return Ok(self);
        }
        let stderr = if self.stderr.trim().is_empty() {
            self.stdout.trim().to_string()
        } else {
            self.stderr.trim().to_string()
        };
        Err(ProvisionError::ToolFailed {
            tool: tool.to_string(),
            code: self.code,
            stderr,
        })
    }
}

/// Substitute `placeholder` in every argument of `template`
pub fn render_args(template: &[&str], placeholder: &str, value: &str) -> Vec<String> {
    template
        .iter()
        .map(|arg| arg.replace(placeholder, value))
        .collect()
}

/// Run `program` to completion, capturing its output
pub async fn run_program(tool: &str, program: &Path, args: &[String]) -> Result<InvocationOutput> {
    debug!(tool, program = %program.display(), ?args, "Invoking");

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| ProvisionError::Spawn {
            program: program.display().to_string(),
            source,
        })?;

    let result = InvocationOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };

    if result.success() {
        debug!(tool, "Exited successfully");
    } else {
        warn!(tool, code = ?result.code, "Exited with failure");
    }
    Ok(result)
}

/// Ask an installed tool for its version
pub async fn tool_version(spec: &ToolSpec, executable: &Path) -> Result<String> {
    let args: Vec<String> = spec.version_args.iter().map(|a| a.to_string()).collect();
    let output = run_program(&spec.name(), executable, &args)
        .await?
        .check(&spec.name())?;

    Ok(output
        .stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .to_string())
}

/// Apply a declarative document with an installed tool
pub async fn apply_document(
    spec: &ToolSpec,
    executable: &Path,
    document: &Path,
) -> Result<InvocationOutput> {
    if !document.is_file() {
        return Err(ProvisionError::DocumentNotFound(document.to_path_buf()));
    }

    let args = render_args(
        spec.apply_args,
        DOCUMENT_PLACEHOLDER,
        &document.to_string_lossy(),
    );

    info!(tool = %spec.tool, document = %document.display(), "Applying document");
    run_program(&spec.name(), executable, &args)
        .await?
        .check(&spec.name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Tool;

    #[test]
    fn test_render_args() {
        let args = render_args(
            Tool::Dsc.spec().apply_args,
            DOCUMENT_PLACEHOLDER,
            r"C:\images\base.dsc.yaml",
        );
        assert_eq!(
            args,
            vec!["config", "set", "--file", r"C:\images\base.dsc.yaml"]
        );
    }

    #[test]
    fn test_check_reports_stderr_then_stdout() {
        let failed = InvocationOutput {
            code: Some(1),
            stdout: "partial output".to_string(),
            stderr: "  bad document \n".to_string(),
        };
        match failed.check("dsc") {
            Err(ProvisionError::ToolFailed { code, stderr, .. }) => {
                assert_eq!(code, Some(1));
                assert_eq!(stderr, "bad document");
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let quiet = InvocationOutput {
            code: None,
            stdout: "killed".to_string(),
            stderr: String::new(),
        };
        assert!(matches!(
            quiet.check("dsc"),
            Err(ProvisionError::ToolFailed { ref stderr, .. }) if stderr == "killed"
        ));
    }

    #[tokio::test]
    async fn test_missing_document() {
        let err = apply_document(
            Tool::Dsc.spec(),
            Path::new("dsc.exe"),
            Path::new("/definitely/not/here.dsc.yaml"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ProvisionError::DocumentNotFound(_)));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let err = run_program("ghost", Path::new("/definitely/not/ghost.exe"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_program_captures_output() {
        let output = run_program(
            "sh",
            Path::new("/bin/sh"),
            &["-c".to_string(), "echo hello; echo oops >&2; exit 3".to_string()],
        )
        .await
        .unwrap();

        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.stderr.trim(), "oops");
        assert!(!output.success());
    }
}
