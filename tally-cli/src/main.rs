use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tally_batch::{BatchResult, CsvWriter, StatementProcessor, collect_inputs};
use tally_core::money::format_money;
use tally_ingest::{BankIdentifier, HybridPipeline, OcrExtractor, default_registry};
use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod config;

use config::Config;

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("TALLY_BUILD_SHA"), ")");

const OUTPUT_DIR_NAME: &str = "tally_output";

#[derive(Parser, Debug)]
#[command(name = "tally", version = VERSION, about = "Bank statement PDF to CSV extraction")]
struct Cli {
    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: ~/.tally/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract movements from a statement PDF or a folder of them
    Process {
        /// A PDF file or a folder
        input: PathBuf,

        /// Where the CSV files go (default: tally_output next to the input)
        #[arg(short = 'o', long)]
        output_dir: Option<PathBuf>,

        /// Files processed at once
        #[arg(long)]
        workers: Option<usize>,

        /// Native text only, never OCR
        #[arg(long)]
        no_ocr: bool,
    },

    /// Show how a PDF's text layer classifies, page by page
    Classify {
        pdf: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List identifiable banks and which of them have a parser
    Banks,

    /// Config file commands
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write the default config if none exists
    Init,

    /// Print the effective config
    Show,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("tally=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tally=info"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Process {
            input,
            output_dir,
            workers,
            no_ocr,
        } => {
            let (cfg, _) = config::load_config(cli.config.as_deref())?;
            process(&cfg, &input, output_dir, workers, no_ocr).await?;
        }

        Command::Classify { pdf, json } => {
            let (cfg, _) = config::load_config(cli.config.as_deref())?;
            classify(&cfg, &pdf, json)?;
        }

        Command::Banks => banks()?,

        Command::Config { command } => match command {
            ConfigCommand::Init => config::init_config(cli.config.as_deref())?,
            ConfigCommand::Show => {
                let (cfg, path) = config::load_config(cli.config.as_deref())?;
                let origin = if path.exists() { "" } else { " (not found, defaults)" };
                println!("# {}{}\n", path.display(), origin);
                print!("{}", config::render_config(&cfg)?);
            }
        },
    }

    Ok(())
}

/// OCR only when enabled and both tools are installed; otherwise native text alone.
fn build_processor(cfg: &Config, no_ocr: bool) -> Result<StatementProcessor> {
    let ocr = if cfg.ocr.enabled && !no_ocr {
        let tools = cfg.ocr.tools();
        match OcrExtractor::new(tools.clone()).check_tools() {
            Ok(()) => Some(tools),
            Err(reason) => {
                warn!(%reason, "OCR unavailable, scanned pages will stay empty");
                None
            }
        }
    } else {
        None
    };
    let pipeline = HybridPipeline::standard(ocr, cfg.classifier.clone());
    let registry = default_registry().context("build parser registry")?;
    Ok(StatementProcessor::new(pipeline, BankIdentifier::default(), registry))
}

fn default_output_dir(input: &Path) -> PathBuf {
    let base = if input.is_dir() {
        input
    } else {
        input.parent().unwrap_or_else(|| Path::new("."))
    };
    base.join(OUTPUT_DIR_NAME)
}

async fn process(
    cfg: &Config,
    input: &Path,
    output_dir: Option<PathBuf>,
    workers: Option<usize>,
    no_ocr: bool,
) -> Result<()> {
    if !input.exists() {
        bail!("Input not found: {}", input.display());
    }
    let inputs = collect_inputs(input, cfg.batch.recursive)
        .with_context(|| format!("list PDFs in {}", input.display()))?;
    if inputs.is_empty() {
        bail!("No PDF files found in {}", input.display());
    }

    let processor = Arc::new(build_processor(cfg, no_ocr)?);
    let workers = workers.unwrap_or(cfg.batch.workers);
    let batch = processor.process_paths_parallel(inputs, workers).await;
    print_report(&batch);

    let out_dir = output_dir
        .or_else(|| cfg.output.dir.clone())
        .unwrap_or_else(|| default_output_dir(input));
    let written = CsvWriter::new(&out_dir).write(&batch)?;
    println!("\nSummary:   {}", written.summary.display());
    println!("Movements: {}", written.movements.display());
    if let Some(errors) = &written.errors {
        println!("Errors:    {}", errors.display());
    }

    if batch.all_failed() {
        bail!("No statement could be processed ({} failed)", batch.failure_count());
    }
    Ok(())
}

fn print_report(batch: &BatchResult) {
    for (file, outcome) in batch.outcomes() {
        match &outcome.result {
            Ok(r) => {
                let s = r.summary();
                let period = r.period.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string());
                println!(
                    "OK    {file}: {} {} {} | {} movements | deposits {} ({}) | withdrawals {} ({})",
                    r.bank(),
                    r.account.account,
                    period,
                    r.movements().len(),
                    format_money(s.total_deposits),
                    s.deposit_count,
                    format_money(s.total_withdrawals),
                    s.withdrawal_count,
                );
                for w in r.warnings() {
                    println!("      warning: {w}");
                }
            }
            Err(failure) => println!("FAIL  {file}: {failure}"),
        }
    }
    println!(
        "\n{} file(s): {} processed, {} failed, {} movements, {} warning(s)",
        batch.len(),
        batch.success_count(),
        batch.failure_count(),
        batch.total_movements(),
        batch.warnings().len()
    );
}

fn classify(cfg: &Config, pdf: &Path, json: bool) -> Result<()> {
    let pipeline = HybridPipeline::standard(None, cfg.classifier.clone());
    let (report, facts) = pipeline
        .classify(pdf)
        .with_context(|| format!("classify {}", pdf.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    let protected = if facts.copy_protected { ", copy-protected" } else { "" };
    println!("{}: {} ({} pages{})", pdf.display(), report.classification, facts.page_count, protected);
    for page in &report.pages {
        let cipher = if page.cipher { " (cipher)" } else { "" };
        println!("  page {:>3}: {:?}{}", page.page_number, page.usability, cipher);
    }
    Ok(())
}

fn banks() -> Result<()> {
    let identifier = BankIdentifier::default();
    let registry = default_registry().context("build parser registry")?;
    for bank in identifier.supported_banks() {
        let support = if registry.get(bank).is_some() { "parser" } else { "identify only" };
        println!("{bank:<16} {support}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_flags() {
        let cli = Cli::try_parse_from([
            "tally", "process", "in", "-o", "out", "--workers", "4", "--no-ocr", "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        let Command::Process {
            input,
            output_dir,
            workers,
            no_ocr,
        } = cli.command
        else {
            panic!("expected process");
        };
        assert_eq!(input, PathBuf::from("in"));
        assert_eq!(output_dir, Some(PathBuf::from("out")));
        assert_eq!(workers, Some(4));
        assert!(no_ocr);
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::try_parse_from(["tally", "config", "show", "--config", "/tmp/t.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/t.toml")));
        assert!(matches!(
            cli.command,
            Command::Config {
                command: ConfigCommand::Show
            }
        ));
    }

    #[test]
    fn output_lands_next_to_the_input() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(default_output_dir(dir.path()), dir.path().join("tally_output"));
        assert_eq!(
            default_output_dir(&dir.path().join("mar.pdf")),
            dir.path().join("tally_output")
        );
    }

    #[test]
    fn ocr_is_skipped_when_disabled() {
        let mut cfg = Config::default();
        assert!(!build_processor(&cfg, true).unwrap().pipeline().has_ocr());
        cfg.ocr.enabled = false;
        assert!(!build_processor(&cfg, false).unwrap().pipeline().has_ocr());
    }
}
