//! # Packaging Tool Adapter
//!
//! The seam between the orchestrator and the external program that bundles the script.
//! [`PyInstaller`] is the production adapter; tests use a scripted stand-in that leaves
//! the same files behind without spawning anything.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;
use log::{debug, error};
use crate::config::BuildConfig;

/// Exit code reported when the packaging tool cannot be started at all.
///
/// Matches what `cmd.exe` sets for a command it does not recognise. Only Windows passes
/// it through intact: Unix exit statuses keep the low 8 bits, so the process ends with 49.
pub const LAUNCH_FAILURE_CODE: i32 = 9009;

/// Exit code reported when the tool ends without one (killed by a signal).
pub const NO_EXIT_CODE: i32 = 1;

/// The arguments of a single packaging run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRequest {
    pub entry_script: PathBuf,
    pub exe_name: String,
    pub icon: PathBuf,
    pub dist_dir: PathBuf,
    pub work_dir: PathBuf,
    /// Working directory of the tool; the descriptor file lands here.
    pub project_dir: PathBuf,
}

impl PackageRequest {
    pub fn from_config(config: &BuildConfig) -> Self {
        Self {
            entry_script: config.entry_script.clone(),
            exe_name: config.exe_name.clone(),
            icon: config.icon.clone(),
            dist_dir: config.dist_dir.clone(),
            work_dir: config.work_dir.clone(),
            project_dir: config.project_dir.clone(),
        }
    }
}

/// Abstraction over the external packaging tool.
///
/// The orchestrator only relies on three things: how to call it, that it drops a
/// `<name>.spec` descriptor in its working directory, and that exit code 0 means success.
/// Swapping the implementation retargets the build to another packager.
pub trait PackagingTool {
    /// Runs the tool to completion and returns its exit code.
    fn invoke(&self, request: &PackageRequest) -> i32;

    /// Human-readable command line, for logs and dry runs.
    fn describe(&self, request: &PackageRequest) -> String;
}

/// The real packager: PyInstaller in single-file mode.
pub struct PyInstaller {
    program: String,
}

impl PyInstaller {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Arguments in the order PyInstaller is invoked with. The entry script goes last.
    pub fn args(request: &PackageRequest) -> Vec<String> {
        let path = |p: &Path| p.to_string_lossy().to_string();
        vec![
            "--onefile".to_string(),
            "--name".to_string(),
            request.exe_name.clone(),
            "--icon".to_string(),
            path(&request.icon),
            "--distpath".to_string(),
            path(&request.dist_dir),
            "--workpath".to_string(),
            path(&request.work_dir),
            "--noconfirm".to_string(),
            path(&request.entry_script),
        ]
    }
}

impl PackagingTool for PyInstaller {
    fn invoke(&self, request: &PackageRequest) -> i32 {
        debug!("Spawning {} in {:?}", self.describe(request), request.project_dir);

        // stdio is inherited so the tool's own progress output reaches the user
        let status = Command::new(&self.program)
            .args(Self::args(request))
            .current_dir(&request.project_dir)
            .status();

        match status {
            Ok(s) => s.code().unwrap_or_else(|| {
                error!("{} terminated without an exit code", self.program);
                NO_EXIT_CODE
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                error!("'{}' was not found. Is PyInstaller installed and on PATH?", self.program);
                LAUNCH_FAILURE_CODE
            }
            Err(e) => {
                error!("Failed to execute {}: {}", self.program, e);
                LAUNCH_FAILURE_CODE
            }
        }
    }

    fn describe(&self, request: &PackageRequest) -> String {
        let mut parts = vec![self.program.clone()];
        for arg in Self::args(request) {
            if arg.contains(' ') {
                parts.push(format!("\"{}\"", arg));
            } else {
                parts.push(arg);
            }
        }
        parts.join(" ")
    }
}

/// A scripted packager for tests.
///
/// Mimics PyInstaller's footprint on disk (work directory, descriptor, and on success
/// the executable) and records every request it receives.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockPackager {
    pub exit_code: i32,
    /// Also write a partial file into the distribution directory on failure.
    pub leave_partial_output: bool,
    pub requests: std::sync::Mutex<Vec<PackageRequest>>,
    /// Whether any dist/work/descriptor path still existed when the tool was called.
    pub saw_stale_artifacts: std::sync::Mutex<bool>,
}

#[cfg(test)]
impl MockPackager {
    pub fn exiting_with(exit_code: i32) -> Self {
        Self {
            exit_code,
            ..Default::default()
        }
    }

    fn resolve(request: &PackageRequest, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            request.project_dir.join(path)
        }
    }
}

#[cfg(test)]
impl PackagingTool for MockPackager {
    fn invoke(&self, request: &PackageRequest) -> i32 {
        self.requests.lock().unwrap().push(request.clone());

        let dist = Self::resolve(request, &request.dist_dir);
        let work = Self::resolve(request, &request.work_dir);
        let descriptor = request.project_dir.join(format!("{}.spec", request.exe_name));
        *self.saw_stale_artifacts.lock().unwrap() =
            dist.exists() || work.exists() || descriptor.exists();

        let _ = std::fs::create_dir_all(work.join(&request.exe_name));
        let _ = std::fs::write(work.join(&request.exe_name).join("warn.txt"), "missing module");
        let _ = std::fs::write(&descriptor, "# -*- mode: python ; coding: utf-8 -*-");

        if self.exit_code == 0 {
            let _ = std::fs::create_dir_all(&dist);
            let _ = std::fs::write(dist.join(format!("{}.exe", request.exe_name)), "MZ");
        } else if self.leave_partial_output {
            let _ = std::fs::create_dir_all(&dist);
            let _ = std::fs::write(dist.join("partial.tmp"), "half");
        }
        self.exit_code
    }

    fn describe(&self, request: &PackageRequest) -> String {
        format!("mock-packager {}", PyInstaller::args(request).join(" "))
    }
}
