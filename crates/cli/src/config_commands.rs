use std::path::Path;

use {anyhow::Result, clap::Subcommand};

use parley_config::validate::{self, Severity};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors/warnings.
    Check {
        /// Show informational diagnostics in addition to errors and warnings.
        #[arg(long)]
        verbose: bool,
    },
    /// Print the effective configuration as TOML.
    Show,
    /// Write the default configuration to a file.
    Init {
        /// Destination (default: ./parley.toml).
        #[arg(default_value = "parley.toml")]
        path: std::path::PathBuf,
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

pub fn handle_config(action: &ConfigAction, config_path: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Check { verbose } => check(config_path, *verbose),
        ConfigAction::Show => {
            let config = match config_path {
                Some(path) => parley_config::load_config(path)?,
                None => parley_config::discover_and_load(),
            };
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        },
        ConfigAction::Init { path, force } => {
            if path.exists() && !force {
                anyhow::bail!("{} already exists; pass --force to overwrite", path.display());
            }
            parley_config::save_config(&parley_config::ParleyConfig::default(), path)?;
            eprintln!("Wrote {}", path.display());
            Ok(())
        },
    }
}

const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn check(config_path: Option<&Path>, verbose: bool) -> Result<()> {
    let result = validate::validate(config_path);

    if let Some(ref path) = result.config_path {
        eprintln!("Checking {}\n", path.display());
    } else {
        eprintln!("No config file found; checking defaults.\n");
    }

    let mut shown = 0;
    for d in &result.diagnostics {
        if d.severity == Severity::Info && !verbose {
            continue;
        }

        let color = match d.severity {
            Severity::Error => RED,
            Severity::Warning => YELLOW,
            Severity::Info => CYAN,
        };

        if d.path.is_empty() {
            eprintln!("  {BOLD}{color}{}{RESET} {}", d.severity, d.message);
        } else {
            eprintln!(
                "  {BOLD}{color}{}{RESET} {}: {}",
                d.severity, d.path, d.message
            );
        }
        shown += 1;
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);

    if shown > 0 {
        eprintln!();
    }

    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        std::process::exit(1);
    }

    Ok(())
}
