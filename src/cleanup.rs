//! # Cleanup Logic
//!
//! Removes the artifacts a packaging run leaves behind:
//! 1. The distribution directory (only before a build; see [`pre_clean`]).
//! 2. The packaging tool's work directory.
//! 3. The `<name>.spec` descriptor file.
//!
//! Every removal goes through [`remove_if_exists`], which treats a missing target as
//! success and never propagates an error. Cleanup is best-effort by contract.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use log::{debug, info, warn};
use walkdir::WalkDir;
use crate::config::BuildConfig;
use crate::invariants::{self, assert_invariant};

/// Removes `path` whether it is a directory (recursively) or a file.
///
/// Returns `true` if something was deleted. A missing path, or a failed deletion,
/// returns `false`; failures are logged and otherwise ignored.
pub fn remove_if_exists(path: &Path) -> bool {
    // symlink_metadata so a link is removed as a link, never followed into its target
    let metadata = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("Nothing to remove at {:?}", path);
            return false;
        }
        Err(e) => {
            warn!("Could not inspect {:?}: {}", path, e);
            return false;
        }
    };

    let result = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    match result {
        Ok(()) => {
            info!("Removed {:?}", path);
            true
        }
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            warn!("Failed to remove {:?}: {}", path, e);
            false
        }
    }
}

/// Removes everything a previous run may have left: output, work directory, descriptor.
///
/// Returns the paths that were actually deleted.
pub fn pre_clean(config: &BuildConfig) -> Vec<PathBuf> {
    let targets = [config.dist_path(), config.work_path(), config.descriptor_path()];
    let removed: Vec<PathBuf> = targets
        .iter()
        .filter(|p| remove_if_exists(p))
        .cloned()
        .collect();

    assert_invariant(
        targets.iter().all(|p| !p.exists()),
        invariants::PRE_CLEAN_COMPLETE,
        Some("Cleanup"),
    );
    removed
}

/// Removes the work directory and descriptor file. The output directory is left alone.
///
/// Used after both successful and failed builds.
pub fn clean_intermediates(config: &BuildConfig) -> Vec<PathBuf> {
    let work = config.work_path();
    let descriptor = config.descriptor_path();

    let removed: Vec<PathBuf> = [&work, &descriptor]
        .into_iter()
        .filter(|p| remove_if_exists(p))
        .cloned()
        .collect();

    assert_invariant(!work.exists(), invariants::WORK_DIR_REMOVED, Some("Cleanup"));
    assert_invariant(!descriptor.exists(), invariants::DESCRIPTOR_REMOVED, Some("Cleanup"));
    removed
}

/// Lists every file under `dir` other than `expected`, relative to `dir`.
///
/// After a successful build this should come back empty: the executable is the only
/// thing the distribution directory is supposed to hold.
pub fn unexpected_outputs(dir: &Path, expected: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| !e.file_type().is_dir())
        .filter(|e| e.path() != expected)
        .map(|e| e.path().strip_prefix(dir).unwrap_or(e.path()).to_path_buf())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn project() -> (TempDir, BuildConfig) {
        let temp = TempDir::new().unwrap();
        let config = BuildConfig {
            project_dir: temp.path().to_path_buf(),
            ..Default::default()
        };
        (temp, config)
    }

    fn seed_stale_artifacts(config: &BuildConfig) {
        fs::create_dir_all(config.dist_path().join("nested")).unwrap();
        fs::write(config.dist_path().join("nested/old.txt"), "old").unwrap();
        fs::create_dir_all(config.work_path().join("Swodnil")).unwrap();
        fs::write(config.work_path().join("Swodnil/base_library.zip"), "zip").unwrap();
        fs::write(config.descriptor_path(), "# -*- mode: python -*-").unwrap();
    }

    #[test]
    fn test_remove_if_exists_missing_is_noop() {
        let temp = TempDir::new().unwrap();
        assert!(!remove_if_exists(&temp.path().join("absent")));
    }

    #[test]
    fn test_remove_if_exists_handles_files_and_dirs() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a.spec");
        let dir = temp.path().join("deep");
        fs::write(&file, "x").unwrap();
        fs::create_dir_all(dir.join("a/b/c")).unwrap();
        fs::write(dir.join("a/b/c/d.txt"), "x").unwrap();

        assert!(remove_if_exists(&file));
        assert!(remove_if_exists(&dir));
        assert!(!file.exists());
        assert!(!dir.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_remove_if_exists_does_not_follow_symlinks() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("keep");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("precious.txt"), "x").unwrap();
        let link = temp.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        assert!(remove_if_exists(&link));
        assert!(target.join("precious.txt").exists());
    }

    #[test]
    fn test_pre_clean_removes_all_stale_artifacts() {
        let (_temp, config) = project();
        seed_stale_artifacts(&config);

        let removed = pre_clean(&config);

        assert_eq!(removed.len(), 3);
        assert!(!config.dist_path().exists());
        assert!(!config.work_path().exists());
        assert!(!config.descriptor_path().exists());
    }

    #[test]
    fn test_clean_intermediates_keeps_output() {
        let (_temp, config) = project();
        seed_stale_artifacts(&config);

        let removed = clean_intermediates(&config);

        assert_eq!(removed, vec![config.work_path(), config.descriptor_path()]);
        assert!(config.dist_path().join("nested/old.txt").exists());
    }

    #[test]
    fn test_unexpected_outputs() {
        let (_temp, config) = project();
        fs::create_dir_all(config.dist_path()).unwrap();
        fs::write(config.executable_path(), "MZ").unwrap();
        assert!(unexpected_outputs(&config.dist_path(), &config.executable_path()).is_empty());

        fs::write(config.dist_path().join("stray.log"), "x").unwrap();
        assert_eq!(
            unexpected_outputs(&config.dist_path(), &config.executable_path()),
            vec![PathBuf::from("stray.log")]
        );
    }

    proptest! {
        #[test]
        fn test_pre_clean_is_idempotent(
            dist in any::<bool>(),
            work in any::<bool>(),
            descriptor in any::<bool>(),
            descriptor_as_dir in any::<bool>(),
            files in prop::collection::vec("[a-z]{1,8}", 0..4)
        ) {
            let (_temp, config) = project();
            if dist {
                fs::create_dir_all(config.dist_path()).unwrap();
                for f in &files {
                    fs::write(config.dist_path().join(f), f).unwrap();
                }
            }
            if work {
                fs::create_dir_all(config.work_path().join("localpycs")).unwrap();
            }
            if descriptor {
                // A directory squatting on the descriptor name is removed too.
                if descriptor_as_dir {
                    fs::create_dir_all(config.descriptor_path()).unwrap();
                } else {
                    fs::write(config.descriptor_path(), "spec").unwrap();
                }
            }

            pre_clean(&config);
            let second = pre_clean(&config);

            prop_assert!(second.is_empty(), "Second pre-clean removed {:?}", second);
            prop_assert!(!config.dist_path().exists());
            prop_assert!(!config.work_path().exists());
            prop_assert!(!config.descriptor_path().exists());
        }
    }
}
