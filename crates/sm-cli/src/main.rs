//! Solid merge command line entry point

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use sm_cad::default_kernel;
use sm_core::{ExportRequest, MergeRequest, export_request, merge_request};

#[derive(Parser)]
#[command(name = "solid-merge")]
#[command(about = "Merge and export extruded layer solids")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge solids with a boolean operation
    Merge {
        /// Input JSON document
        input: PathBuf,

        /// Output JSON document
        output: PathBuf,

        /// union, intersection or difference (overrides the document)
        operation: Option<String>,

        /// Group by layer and elevation only, without material chaining
        #[arg(long)]
        flat: bool,
    },

    /// Export solids to a STEP file
    Export {
        /// Input JSON document
        input: PathBuf,

        /// Output STEP file
        output: PathBuf,
    },
}

fn ensure_exists(path: &Path) -> anyhow::Result<()> {
    if !path.exists() {
        bail!("Input file not found: {}", path.display());
    }
    Ok(())
}

fn run_merge(
    input: &Path,
    output: &Path,
    operation: Option<&str>,
    flat: bool,
) -> anyhow::Result<bool> {
    ensure_exists(input)?;
    let request = MergeRequest::from_path(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;

    let kernel = default_kernel();
    let result = merge_request(kernel.as_ref(), request, operation, flat)
        .context("Merge failed")?;

    result
        .write_to(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    if let Some(error) = &result.error {
        eprintln!("Error: {}", error);
    }
    tracing::info!(
        "{} -> {} solids ({} groups)",
        result.statistics.input_count,
        result.statistics.output_count,
        result.statistics.layers_processed
    );
    Ok(result.success)
}

fn run_export(input: &Path, output: &Path) -> anyhow::Result<bool> {
    ensure_exists(input)?;
    let request = ExportRequest::from_path(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;

    let kernel = default_kernel();
    let summary = export_request(kernel.as_ref(), &request, output)
        .with_context(|| format!("Failed to export {}", output.display()))?;

    if summary.skipped > 0 {
        tracing::warn!("{} solids could not be exported", summary.skipped);
    }
    Ok(true)
}

fn run(cli: Cli) -> anyhow::Result<bool> {
    match cli.command {
        Commands::Merge {
            input,
            output,
            operation,
            flat,
        } => run_merge(&input, &output, operation.as_deref(), flat),
        Commands::Export { input, output } => run_export(&input, &output),
    }
}

fn main() -> ExitCode {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sm_core=info,sm_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_merge_with_operation() {
        let cli = Cli::try_parse_from(["solid-merge", "merge", "in.json", "out.json", "difference"])
            .unwrap();
        match cli.command {
            Commands::Merge {
                operation, flat, ..
            } => {
                assert_eq!(operation.as_deref(), Some("difference"));
                assert!(!flat);
            }
            Commands::Export { .. } => panic!("expected merge"),
        }
    }

    #[test]
    fn test_parse_merge_flat_without_operation() {
        let cli =
            Cli::try_parse_from(["solid-merge", "merge", "--flat", "in.json", "out.json"]).unwrap();
        match cli.command {
            Commands::Merge {
                operation, flat, ..
            } => {
                assert!(operation.is_none());
                assert!(flat);
            }
            Commands::Export { .. } => panic!("expected merge"),
        }
    }

    #[test]
    fn test_export_requires_output() {
        assert!(Cli::try_parse_from(["solid-merge", "export", "in.json"]).is_err());
    }

    #[test]
    fn test_missing_input_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_merge(
            &dir.path().join("missing.json"),
            &dir.path().join("out.json"),
            None,
            false,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Input file not found"));
        assert!(!dir.path().join("out.json").exists());
    }
}
