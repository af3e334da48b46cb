//! # labkit
//!
//! Command-line front end for the lab-instrument template generator.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use labkit_template::{
    SpecTemplateReport, SpecTemplateWriteOptions, XlsxTemplateWriter, assemble_with,
    derive_template_file_name, parse_sample_count, registry,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// labkit - pre-formatted spreadsheet templates for laboratory instruments
#[derive(Parser, Debug)]
#[command(name = "labkit")]
#[command(author, version, about = "Lab-instrument spreadsheet template generator", long_about = None)]
struct Cli {
    /// Instrument name (see --list)
    #[arg(short = 'i', long = "instrument")]
    instrument: Option<String>,

    /// Number of samples (whole number >= 1)
    #[arg(short = 'n', long = "samples", default_value = "1")]
    samples: String,

    /// Output directory for `{instrument}_data_template.xlsx`
    #[arg(short = 'o', long = "out-dir", default_value = ".")]
    out_dir: PathBuf,

    /// List instruments and their columns
    #[arg(short, long)]
    list: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .init();
    }

    if cli.list {
        print!("{}", render_instrument_list()?);
        return Ok(());
    }

    let Some(instrument) = cli.instrument.as_deref() else {
        bail!("--instrument is required unless --list is given");
    };
    let (path_file_out, report) = run_generate(instrument, &cli.samples, &cli.out_dir)?;
    for warning in &report.warnings {
        eprintln!("warning: {warning}");
    }
    println!("{}", path_file_out.display());
    Ok(())
}

/// One line per instrument: name followed by its Analysis columns.
fn render_instrument_list() -> Result<String> {
    let registry = registry().context("Instrument registry is invalid")?;
    let mut c_out = String::new();
    for instrument in registry.instruments() {
        c_out.push_str(&format!(
            "{}: {}\n",
            instrument.name,
            instrument.columns.join(" | ")
        ));
    }
    Ok(c_out)
}

/// Generate one template into `dir_out` and return its path and write report.
fn run_generate(
    instrument_name: &str,
    samples: &str,
    dir_out: &Path,
) -> Result<(PathBuf, SpecTemplateReport)> {
    let sample_count = parse_sample_count(samples)?;
    let instrument = registry()
        .context("Instrument registry is invalid")?
        .lookup(instrument_name)?;
    let plan = assemble_with(instrument, sample_count)?;

    std::fs::create_dir_all(dir_out)
        .with_context(|| format!("Failed to create output directory: {}", dir_out.display()))?;
    let path_file_out = dir_out.join(derive_template_file_name(instrument_name));

    let mut writer = XlsxTemplateWriter::new(SpecTemplateWriteOptions::default());
    writer.write_workbook(&plan)?;
    writer
        .save(&path_file_out)
        .with_context(|| format!("Failed to save template: {}", path_file_out.display()))?;
    info!(file_out = %path_file_out.display(), sample_count, "template written");

    Ok((path_file_out, writer.report()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_cli_parses_generate_flags() {
        let cli = Cli::parse_from([
            "labkit",
            "--instrument",
            "CHN Analyzer",
            "--samples",
            "3",
            "--out-dir",
            "out",
        ]);
        assert_eq!(cli.instrument.as_deref(), Some("CHN Analyzer"));
        assert_eq!(cli.samples, "3");
        assert_eq!(cli.out_dir, PathBuf::from("out"));
        assert!(!cli.list);
    }

    #[test]
    fn test_list_names_every_instrument() {
        let c_list = render_instrument_list().expect("list");
        assert_eq!(c_list.lines().count(), 6);
        assert!(c_list.starts_with("Densimeter: Sample ID | Density (g/mL) | Temperature °C"));
    }

    #[test]
    fn test_generate_writes_named_file() {
        let dir = tempdir().expect("tempdir");
        let (path_file_out, report) =
            run_generate("Viscometer", "2.0", dir.path()).expect("generate");

        assert_eq!(
            path_file_out,
            dir.path().join("Viscometer_data_template.xlsx")
        );
        assert!(path_file_out.exists());
        assert_eq!(report.sheets.len(), 1);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_generate_rejects_bad_input() {
        let dir = tempdir().expect("tempdir");
        assert!(run_generate("Viscometer", "0", dir.path()).is_err());
        assert!(run_generate("Viscometer", "2.5", dir.path()).is_err());
        assert!(run_generate("Nonexistent Instrument", "3", dir.path()).is_err());
        assert_eq!(std::fs::read_dir(dir.path()).expect("dir").count(), 0);
    }
}
