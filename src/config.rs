//! # Build Configuration
//!
//! Holds the handful of values that drive a build: which script to bundle, what to call
//! the executable, which icon to embed, and where the packaging tool may write.
//!
//! Values are layered, lowest precedence first:
//! 1. Built-in defaults (the Swodnil project layout).
//! 2. A JSON config file (`--config`, `./swodnil-build.json`, or the per-user config dir).
//! 3. Command line overrides.

use std::path::{Component, Path, PathBuf};
use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Name of the project-local config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "swodnil-build.json";

/// Extension the packaging tool gives the descriptor it drops next to the entry script.
const DESCRIPTOR_EXTENSION: &str = "spec";

/// Everything the orchestrator needs to know about one build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// The Python entry point handed to the packaging tool.
    pub entry_script: PathBuf,
    /// Output name, without extension. Also names the descriptor file.
    pub exe_name: String,
    /// Icon resource embedded into the executable.
    pub icon: PathBuf,
    /// Distribution path: where the final executable lands.
    pub dist_dir: PathBuf,
    /// Work path: scratch space for the packaging tool.
    pub work_dir: PathBuf,
    /// Directory the tool runs in. Relative paths above resolve against it.
    pub project_dir: PathBuf,
    /// Program used to package the script.
    pub packager: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            entry_script: PathBuf::from("swodnil.py"),
            exe_name: "Swodnil".to_string(),
            icon: PathBuf::from("swodnil.ico"),
            dist_dir: PathBuf::from("build"),
            work_dir: PathBuf::from("_pyinstaller_temp"),
            project_dir: PathBuf::from("."),
            packager: "pyinstaller".to_string(),
        }
    }
}

/// Command line values that take precedence over the file and the defaults.
///
/// `None` means "not given on the command line".
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub entry_script: Option<PathBuf>,
    pub exe_name: Option<String>,
    pub icon: Option<PathBuf>,
    pub dist_dir: Option<PathBuf>,
    pub work_dir: Option<PathBuf>,
    pub project_dir: Option<PathBuf>,
    pub packager: Option<String>,
}

impl BuildConfig {
    /// Resolves a possibly-relative path against `project_dir`.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_dir.join(path)
        }
    }

    pub fn dist_path(&self) -> PathBuf {
        self.resolve(&self.dist_dir)
    }

    pub fn work_path(&self) -> PathBuf {
        self.resolve(&self.work_dir)
    }

    /// The `<exe_name>.spec` file the packaging tool writes into its working directory.
    pub fn descriptor_path(&self) -> PathBuf {
        self.project_dir
            .join(format!("{}.{}", self.exe_name, DESCRIPTOR_EXTENSION))
    }

    /// Where the finished executable is expected after a successful build.
    pub fn executable_path(&self) -> PathBuf {
        self.dist_path().join(self.executable_file_name())
    }

    pub fn executable_file_name(&self) -> String {
        format!("{}.exe", self.exe_name)
    }

    /// Applies command line overrides on top of this config.
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(v) = overrides.entry_script {
            self.entry_script = v;
        }
        if let Some(v) = overrides.exe_name {
            self.exe_name = v;
        }
        if let Some(v) = overrides.icon {
            self.icon = v;
        }
        if let Some(v) = overrides.dist_dir {
            self.dist_dir = v;
        }
        if let Some(v) = overrides.work_dir {
            self.work_dir = v;
        }
        if let Some(v) = overrides.project_dir {
            self.project_dir = v;
        }
        if let Some(v) = overrides.packager {
            self.packager = v;
        }
        self
    }

    /// Parses a JSON config file. Missing fields fall back to the defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: BuildConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid config file {:?}", path))?;
        Ok(config)
    }

    /// Builds the effective configuration.
    ///
    /// An explicit `config_file` must exist. Without one, the local file and then the
    /// per-user file are tried, and plain defaults are used when neither is present.
    pub fn load(config_file: Option<&Path>, overrides: Overrides) -> Result<Self> {
        let base = match config_file {
            Some(path) => {
                info!("Using config file {:?}", path);
                Self::from_file(path)?
            }
            None => match discover_config_file(Path::new(".")) {
                Some(path) => {
                    info!("Using config file {:?}", path);
                    Self::from_file(&path)?
                }
                None => {
                    debug!("No config file found, using built-in defaults");
                    Self::default()
                }
            },
        };
        let config = base.with_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    /// Rejects layouts where cleaning the output or work directory would delete the project.
    ///
    /// Both directories are removed recursively, so neither may be the project directory
    /// itself or one of its ancestors.
    pub fn validate(&self) -> Result<()> {
        let project = lexical_absolute(&self.project_dir)?;
        for (label, dir) in [("dist_dir", self.dist_path()), ("work_dir", self.work_path())] {
            let dir = lexical_absolute(&dir)?;
            if project.starts_with(&dir) {
                bail!(
                    "{} {:?} would contain the project directory {:?}; refusing to delete it",
                    label,
                    dir,
                    project
                );
            }
        }
        Ok(())
    }
}

/// Makes `path` absolute and folds `.` and `..` without touching the filesystem.
fn lexical_absolute(path: &Path) -> Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("Failed to read the current directory")?
            .join(path)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    Ok(normalized)
}

/// Finds the config file to use when none was given explicitly.
fn discover_config_file(cwd: &Path) -> Option<PathBuf> {
    let local = cwd.join(LOCAL_CONFIG_FILE);
    if local.is_file() {
        return Some(local);
    }

    let user = user_config_file()?;
    debug!("Checking per-user config at {:?}", user);
    user.is_file().then_some(user)
}

/// `<config dir>/swodnil-build/config.json`, per platform conventions.
pub fn user_config_file() -> Option<PathBuf> {
    ProjectDirs::from("", "", "swodnil-build").map(|dirs| dirs.config_dir().join("config.json"))
}
