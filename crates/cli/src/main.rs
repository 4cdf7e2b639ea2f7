// crosswalk CLI - map statement line items from a source workbook into a
// destination template, with an audit trail

mod exit_codes;
mod run;
mod scope;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use crosswalk_recon::ReconError;

use exit_codes::{recon_exit_code, EXIT_IO, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "xwalk")]
#[command(about = "Reconcile financial statement line items between workbooks")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Log matching decisions to stderr (same as XWALK_LOG=debug)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Match, verify and populate the destination workbook
    #[command(after_help = "\
Examples:
  xwalk run q2.toml
  xwalk run q2.toml --dry-run --audit audit.csv
  xwalk run q2.toml --json --output result.json

Paths inside the config resolve relative to the config file.")]
    Run {
        /// Path to the .toml config file
        config: PathBuf,

        /// Compute assignments and audit without writing the destination
        #[arg(long)]
        dry_run: bool,

        /// Print the full result as JSON to stdout
        #[arg(long)]
        json: bool,

        /// Write the full JSON result to a file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Write the audit trail as CSV
        #[arg(long)]
        audit: Option<PathBuf>,
    },

    /// Parse and validate a config without running
    #[command(after_help = "\
Examples:
  xwalk validate q2.toml")]
    Validate {
        /// Path to the .toml config file
        config: PathBuf,
    },

    /// Print the scoped rows of a workbook as CSV
    #[command(after_help = "\
Examples:
  xwalk scope source.xlsx --header-row 3
  xwalk scope source.xlsx --sheet \"Balance Sheet\" --header-row 3
  xwalk scope statements/ --label-column 2")]
    Scope {
        /// Workbook file (.xlsx, .xls, .ods, .csv) or directory of CSVs
        workbook: PathBuf,

        /// Only this sheet (repeatable). Default: every sheet.
        #[arg(long)]
        sheet: Vec<String>,

        /// 1-based column holding line-item labels
        #[arg(long, default_value_t = 1)]
        label_column: usize,

        /// 1-based row holding period headers (1Q24, 2024-03-31, ...)
        #[arg(long)]
        header_row: Option<usize>,
    },
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("XWALK_COMMIT"), ")",
        "\nengine:  crosswalk-recon ", env!("CARGO_PKG_VERSION"),
        "\ntarget:  ", env!("XWALK_TARGET"), " (", env!("XWALK_PROFILE"), ")",
    )
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::new().filter_or("XWALK_LOG", default))
        .format_timestamp(None)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Run { config, dry_run, json, output, audit } => run::cmd_run(run::RunArgs {
            config,
            dry_run,
            json,
            output,
            audit,
        }),
        Commands::Validate { config } => run::cmd_validate(config),
        Commands::Scope { workbook, sheet, label_column, header_row } => {
            scope::cmd_scope(workbook, sheet, label_column, header_row)
        }
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_IO, message: msg.into(), hint: None }
    }

    /// Engine error with its registry exit code.
    pub fn recon(err: ReconError) -> Self {
        let hint = match &err {
            ReconError::MissingRequiredSheet { .. } => {
                Some("check the sheet names in the config against the workbook (`xwalk scope <workbook>` lists them)".to_string())
            }
            ReconError::ConfigParse(_) => Some("run `xwalk validate <config>` after fixing the TOML".to_string()),
            _ => None,
        };
        Self { code: recon_exit_code(&err), message: err.to_string(), hint }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
