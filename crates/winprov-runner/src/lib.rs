//! Command-line front end for `winprov-core`
//!
//! Configuration is layered: built-in defaults, an optional YAML file,
//! `WINPROV_*` environment variables, then the flags given here.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use winprov_core::{
    Architecture, InstallOptions, InstallOutcome, InstallReport, InstallScope, InvocationOutput,
    ProvisionConfig, Provisioner, Tool,
};

/// Installs provisioning tools from their release feeds and applies documents with them.
#[derive(Parser, Debug)]
#[command(name = "winprov", version, about, long_about = None)]
pub struct Cli {
    /// YAML configuration file
    #[arg(long, global = true, value_name = "YAML")]
    pub config: Option<PathBuf>,

    /// Root directory for machine-scope installs
    #[arg(long, global = true, value_name = "DIR")]
    pub install_root: Option<PathBuf>,

    /// Install for the whole machine or the current user
    #[arg(long, global = true)]
    pub scope: Option<InstallScope>,

    /// Install for this architecture instead of the detected one
    #[arg(long, global = true)]
    pub arch: Option<Architecture>,

    /// Attempts made for each network call
    #[arg(long, global = true)]
    pub max_attempts: Option<u32>,

    /// Base backoff delay in milliseconds
    #[arg(long, global = true, value_name = "MS")]
    pub base_delay_ms: Option<u64>,

    /// More log output, repeat for trace level
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Print the detected platform and where tools would be installed
    Detect,

    /// Install a tool unless it is already present
    Install {
        tool: Tool,

        /// Reinstall even if the tool is present
        #[arg(long)]
        force: bool,

        /// Expected SHA-256 of the downloaded asset
        #[arg(long, value_name = "HEX")]
        sha256: Option<String>,

        /// Skip running the tool's version command after installing
        #[arg(long)]
        no_verify: bool,
    },

    /// Apply a document with an installed tool
    Apply { tool: Tool, document: PathBuf },

    /// Install a tool if needed, then apply a document with it
    Provision {
        tool: Tool,
        document: Option<PathBuf>,

        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    /// Log filter used when `RUST_LOG` is not set
    pub fn default_log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "info,winprov_core=debug,winprov_retry=debug",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Resolve the configuration: file, then environment, then flags
pub fn build_config(cli: &Cli) -> Result<ProvisionConfig> {
    if cli.max_attempts == Some(0) {
        anyhow::bail!("--max-attempts must be at least 1");
    }

    let base = match &cli.config {
        Some(path) => ProvisionConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ProvisionConfig::default(),
    };

    let mut config = base
        .with_env_overrides()
        .with_retry(cli.max_attempts, cli.base_delay_ms.map(Duration::from_millis));

    if let Some(root) = &cli.install_root {
        config.install_root = root.clone();
    }
    if let Some(scope) = cli.scope {
        config.scope = scope;
    }
    if let Some(arch) = cli.arch {
        config.architecture = Some(arch);
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Execute the parsed command
pub async fn run(cli: Cli) -> Result<()> {
    let config = build_config(&cli)?;

    match cli.command {
        Command::Detect => {
            let host = winprov_core::PlatformTriple::detect(config.architecture)?;
            println!("platform: {host}");
            println!("scope:    {}", config.scope);
            println!("root:     {}", config.tool_root().display());
            println!(
                "retry:    {} attempt(s), base delay {:?}",
                config.retry.max_attempts(),
                config.retry.base_delay()
            );
        }
        Command::Install {
            tool,
            force,
            sha256,
            no_verify,
        } => {
            let options = InstallOptions {
                force,
                sha256,
                verify: !no_verify,
            };
            let provisioner = Provisioner::from_config(config)?;
            let report = provisioner
                .ensure(tool, &options)
                .await
                .with_context(|| format!("Failed to install {tool}"))?;
            print_report(&report);
        }
        Command::Apply { tool, document } => {
            let provisioner = Provisioner::from_config(config)?;
            let output = provisioner
                .apply(tool, &document)
                .await
                .with_context(|| format!("Failed to apply {}", document.display()))?;
            print_output(tool, &document, &output);
        }
        Command::Provision {
            tool,
            document,
            force,
        } => {
            let options = InstallOptions {
                force,
                ..Default::default()
            };
            let provisioner = Provisioner::from_config(config)?;
            let (report, applied) = provisioner
                .provision(tool, &options, document.as_deref())
                .await
                .with_context(|| format!("Failed to provision {tool}"))?;
            print_report(&report);
            if let (Some(document), Some(output)) = (document.as_deref(), applied) {
                print_output(tool, document, &output);
            }
        }
    }

    info!("Done");
    Ok(())
}

fn print_report(report: &InstallReport) {
    match &report.outcome {
        InstallOutcome::AlreadyPresent => {
            println!("✅ {} already installed at {}", report.tool, report.path.display());
        }
        InstallOutcome::Installed { version, asset } => {
            println!(
                "✅ Installed {} {version} ({asset}) to {}",
                report.tool,
                report.path.display()
            );
        }
    }
    if let Some(version) = &report.reported_version {
        println!("   version: {version}");
    }
    if let Some(file) = &report.config_file {
        println!("   config:  {}", file.display());
    }
    println!(
        "   arch:    {} at {}",
        report.architecture,
        report.finished_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
}

fn print_output(tool: Tool, document: &Path, output: &InvocationOutput) {
    println!("✅ {tool} applied {}", document.display());
    let stdout = output.stdout.trim();
    if !stdout.is_empty() {
        println!("{stdout}");
    }
}
