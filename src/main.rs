//! # swodnil-build: The Main Entry Point
//!
//! Parses the command line, initialises logging, loads the build configuration and
//! dispatches to the orchestrator. With no arguments it performs a full build using the
//! configured (or default) Swodnil layout.
//!
//! The process exit code is the packaging tool's exit code, unchanged on Windows. Unix
//! truncates exit statuses to 8 bits.

use std::io::{BufRead, IsTerminal};
use std::path::PathBuf;
use clap::{Args, Parser, Subcommand};
use log::{error, info, LevelFilter};
use simplelog::{Config, SimpleLogger};

mod cleanup;
mod config;
mod invariants;
mod orchestrator;
mod packager;

use config::{BuildConfig, Overrides};
use packager::PyInstaller;

/// Command line interface.
#[derive(Parser)]
#[command(name = "swodnil-build")]
#[command(about = "Bundle Swodnil into a single executable with PyInstaller", long_about = None)]
struct Cli {
    /// What to do. Defaults to `build`.
    #[command(subcommand)]
    command: Option<Commands>,

    /// Turn on verbose logging.
    ///
    /// - `-v`: Debug
    /// - `-vv`: Trace
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// JSON config file. Without it, `./swodnil-build.json` and then the per-user
    /// config file are used if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Don't wait for Enter after a failed build.
    #[arg(long, global = true)]
    no_pause: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean, package, and clean up again.
    ///
    /// 1. Removes the output directory, work directory and `<name>.spec`.
    /// 2. Runs the packaging tool.
    /// 3. Removes the work directory and `<name>.spec` (the output is kept).
    Build(BuildArgs),
    /// Remove the output directory, work directory and `<name>.spec` without building.
    Clean,
    /// Print the effective configuration as JSON.
    Config,
}

#[derive(Args)]
struct BuildArgs {
    /// Python entry script to bundle.
    #[arg(long)]
    entry: Option<PathBuf>,
    /// Executable name, without extension.
    #[arg(long)]
    name: Option<String>,
    /// Icon file to embed.
    #[arg(long)]
    icon: Option<PathBuf>,
    /// Directory receiving the final executable.
    #[arg(long)]
    dist_dir: Option<PathBuf>,
    /// Scratch directory for the packaging tool.
    #[arg(long)]
    work_dir: Option<PathBuf>,
    /// Directory to run the packaging tool in.
    #[arg(long)]
    project_dir: Option<PathBuf>,
    /// Packaging program to invoke.
    #[arg(long)]
    packager: Option<String>,
    /// Show what would be removed and run, without doing it.
    #[arg(long)]
    dry_run: bool,
}

impl BuildArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            entry_script: self.entry.clone(),
            exe_name: self.name.clone(),
            icon: self.icon.clone(),
            dist_dir: self.dist_dir.clone(),
            work_dir: self.work_dir.clone(),
            project_dir: self.project_dir.clone(),
            packager: self.packager.clone(),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    // A logger that fails to initialise shouldn't stop the build
    let _ = SimpleLogger::init(log_level, Config::default());

    let overrides = match &cli.command {
        Some(Commands::Build(args)) => args.overrides(),
        _ => Overrides::default(),
    };

    let config = match BuildConfig::load(cli.config.as_deref(), overrides) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    match &cli.command {
        Some(Commands::Clean) => {
            let removed = cleanup::pre_clean(&config);
            info!("Removed {} artifact(s)", removed.len());
        }
        Some(Commands::Config) => match serde_json::to_string_pretty(&config) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Failed to serialise configuration: {}", e);
                std::process::exit(1);
            }
        },
        Some(Commands::Build(BuildArgs { dry_run: true, .. })) => {
            orchestrator::print_plan(&config, &PyInstaller::new(&config.packager));
        }
        Some(Commands::Build(_)) | None => {
            let tool = PyInstaller::new(&config.packager);
            let outcome = match orchestrator::run_build(&config, &tool) {
                Ok(o) => o,
                Err(e) => {
                    error!("Refusing to build: {:#}", e);
                    std::process::exit(1);
                }
            };
            if !outcome.is_success() {
                if !cli.no_pause {
                    pause();
                }
                // Unix keeps only the low 8 bits of this; Windows keeps all of it.
                std::process::exit(outcome.exit_code());
            }
        }
    }
}

/// Waits for Enter so a double-clicked console window doesn't vanish with the error.
fn pause() {
    let stdin = std::io::stdin();
    if !stdin.is_terminal() {
        return;
    }
    println!("Press Enter to exit...");
    let _ = stdin.lock().read_line(&mut String::new());
}
