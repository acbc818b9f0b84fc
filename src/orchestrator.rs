//! # Build Orchestrator
//!
//! Runs one packaging build from start to finish:
//!
//! ```text
//! START -> PRE_CLEAN -> INVOKE -> FAILURE_CLEANUP -> TERMINATE(code)
//!                              \-> SUCCESS_CLEANUP -> TERMINATE(0)
//! ```
//!
//! Everything is sequential. The only blocking step is waiting for the packaging tool,
//! which runs to its own completion with no timeout.

use std::fmt;
use std::path::PathBuf;
use anyhow::Result;
use log::{debug, info, warn};
use crate::cleanup;
use crate::config::BuildConfig;
use crate::invariants::{self, assert_invariant};
use crate::packager::{PackageRequest, PackagingTool};

/// States a build passes through. Used for logging transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    PreClean,
    Invoke,
    FailureCleanup,
    SuccessCleanup,
    Terminate(i32),
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::PreClean => write!(f, "PRE_CLEAN"),
            Stage::Invoke => write!(f, "INVOKE"),
            Stage::FailureCleanup => write!(f, "FAILURE_CLEANUP"),
            Stage::SuccessCleanup => write!(f, "SUCCESS_CLEANUP"),
            Stage::Terminate(code) => write!(f, "TERMINATE[{}]", code),
        }
    }
}

/// How a build ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// The tool exited 0. Holds the absolute path of the produced executable.
    Succeeded { executable: PathBuf },
    /// The tool exited non-zero (or could not run). Holds its exit code unchanged.
    Failed { code: i32 },
}

impl BuildOutcome {
    /// Process exit code to hand back to the caller's environment.
    pub fn exit_code(&self) -> i32 {
        match self {
            BuildOutcome::Succeeded { .. } => 0,
            BuildOutcome::Failed { code } => *code,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BuildOutcome::Succeeded { .. })
    }
}

fn enter(stage: Stage) {
    debug!("Build stage -> {}", stage);
}

/// Runs a full build with `tool` and reports the result.
///
/// Intermediate artifacts (work directory, descriptor) never survive this call. The
/// output directory is cleared beforehand and, on failure, left as the tool left it.
///
/// Errors only when `config` fails validation, before anything is deleted or run.
pub fn run_build(config: &BuildConfig, tool: &impl PackagingTool) -> Result<BuildOutcome> {
    config.validate()?;

    enter(Stage::PreClean);
    let removed = cleanup::pre_clean(config);
    if !removed.is_empty() {
        info!("Cleaned up {} artifact(s) from a previous build", removed.len());
    }

    enter(Stage::Invoke);
    let request = PackageRequest::from_config(config);
    info!("Packaging {:?} as '{}'...", config.entry_script, config.exe_name);
    info!("Running: {}", tool.describe(&request));
    let code = tool.invoke(&request);
    debug!("Packaging tool exited with code {}", code);

    let outcome = if code != 0 {
        enter(Stage::FailureCleanup);
        print_failure_banner(code);
        cleanup::clean_intermediates(config);
        let failed = BuildOutcome::Failed { code };
        assert_invariant(
            failed.exit_code() != 0,
            invariants::FAILURE_IS_NONZERO,
            Some("Orchestrator"),
        );
        failed
    } else {
        enter(Stage::SuccessCleanup);
        let executable = absolute(config.executable_path());
        print_success_banner(&executable);
        cleanup::clean_intermediates(config);
        check_output_dir(config);
        BuildOutcome::Succeeded { executable }
    };

    enter(Stage::Terminate(outcome.exit_code()));
    Ok(outcome)
}

/// Prints what a build would delete and run, without doing either.
pub fn print_plan(config: &BuildConfig, tool: &impl PackagingTool) {
    let request = PackageRequest::from_config(config);

    println!();
    println!("═══════════════════════════════════════════════════════════════");
    println!("                  Build Plan (dry run)");
    println!("═══════════════════════════════════════════════════════════════");
    println!();
    println!("1. Remove if present:");
    for path in [config.dist_path(), config.work_path(), config.descriptor_path()] {
        let mark = if path.exists() { "✕" } else { "·" };
        println!("     {} {}", mark, path.display());
    }
    println!();
    println!("2. Run (in {}):", config.project_dir.display());
    println!("     {}", tool.describe(&request));
    println!();
    println!("3. On success, expect:");
    println!("     {}", config.executable_path().display());
    println!(
        "   and remove {} and {}.",
        config.work_path().display(),
        config.descriptor_path().display()
    );
    println!();
    println!("───────────────────────────────────────────────────────────────");
    println!("This is a preview. Run without --dry-run to build.");
    println!();
}

fn print_failure_banner(code: i32) {
    println!();
    println!("═══════════════════════════════════════════════════════════════");
    println!("  ✕ BUILD FAILED");
    println!("    Packaging tool exited with code {}", code);
    println!("═══════════════════════════════════════════════════════════════");
    println!();
}

fn print_success_banner(executable: &std::path::Path) {
    println!();
    println!("═══════════════════════════════════════════════════════════════");
    println!("  ✓ BUILD SUCCEEDED");
    println!("    Executable: {}", executable.display());
    println!("═══════════════════════════════════════════════════════════════");
    println!();
}

/// Warns if the output directory holds anything besides the executable.
fn check_output_dir(config: &BuildConfig) {
    let executable = config.executable_path();
    if !executable.is_file() {
        warn!("Packaging reported success but {:?} was not found", executable);
    }
    let extras = cleanup::unexpected_outputs(&config.dist_path(), &executable);
    if !extras.is_empty() {
        warn!("Output directory contains unexpected files: {:?}", extras);
    }
}

fn absolute(path: PathBuf) -> PathBuf {
    std::path::absolute(&path).unwrap_or(path)
}
