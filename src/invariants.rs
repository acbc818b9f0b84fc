//! Runtime invariant checks with a record of what was checked.
//!
//! The orchestrator asserts its cleanup guarantees as it goes. Tests then use
//! [`contract_test`] to prove those guarantees were actually evaluated on the path
//! they exercised, not just that nothing blew up.
//!
//! Records are kept per thread. A build runs on one thread, and each test does too,
//! so a contract only sees what its own scenario asserted.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, ThreadId};
use lazy_static::lazy_static;
use log::{error, info};

/// Work directory is gone after cleanup.
pub const WORK_DIR_REMOVED: &str = "Work directory must not exist after cleanup";
/// Descriptor file is gone after cleanup.
pub const DESCRIPTOR_REMOVED: &str = "Descriptor file must not exist after cleanup";
/// Pre-clean leaves none of its targets behind.
pub const PRE_CLEAN_COMPLETE: &str = "Pre-clean must remove output, work and descriptor paths";
/// A failed build exits non-zero.
pub const FAILURE_IS_NONZERO: &str = "Failed build must report a non-zero exit code";

lazy_static! {
    static ref CHECKED_INVARIANTS: Mutex<HashMap<ThreadId, HashSet<String>>> =
        Mutex::new(HashMap::new());
}

/// Asserts that an invariant holds.
///
/// A violation is logged as critical. Under test it also panics so the
/// offending scenario fails loudly; a release run keeps going, since every
/// guarded step is best-effort cleanup.
///
/// # Arguments
/// * `condition` - Result of the check.
/// * `description` - One of the invariant constants in this module.
/// * `component` - Optional tag for the log line (e.g. "Cleanup").
pub fn assert_invariant(condition: bool, description: &str, component: Option<&str>) {
    if !condition {
        let msg = format!(
            "CRITICAL INVARIANT VIOLATION [{}]: {}",
            component.unwrap_or("General"),
            description
        );
        error!("{}", msg);

        if cfg!(test) {
            panic!("{}", msg);
        }
        return;
    }

    let mut checked = CHECKED_INVARIANTS
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    checked
        .entry(thread::current().id())
        .or_default()
        .insert(description.to_string());
}

/// Panics unless every invariant in `required_invariants` has been asserted on this thread.
#[allow(dead_code)]
pub fn contract_test(context: &str, required_invariants: &[&str]) {
    let checked = CHECKED_INVARIANTS
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    let mine = checked.get(&thread::current().id());
    let missing: Vec<&str> = required_invariants
        .iter()
        .copied()
        .filter(|req| !mine.is_some_and(|set| set.contains(*req)))
        .collect();
    // Release the lock before panicking so the mutex is never poisoned.
    drop(checked);

    if !missing.is_empty() {
        panic!(
            "Contract Test Failed for '{}'. The following invariants were NOT checked:\n{:#?}",
            context, missing
        );
    }
    info!("Contract Test Passed: {}", context);
}

/// Forgets everything this thread has asserted. Call before an isolated scenario.
#[allow(dead_code)]
pub fn clear_invariant_log() {
    let mut checked = CHECKED_INVARIANTS
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    checked.remove(&thread::current().id());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_held_invariant_is_recorded() {
        assert_invariant(true, "test-only invariant", Some("Test"));
        contract_test("recorded", &["test-only invariant"]);
    }

    #[test]
    #[should_panic(expected = "CRITICAL INVARIANT VIOLATION [Test]")]
    fn test_violation_panics_under_test() {
        assert_invariant(false, "never holds", Some("Test"));
    }

    #[test]
    #[should_panic(expected = "were NOT checked")]
    fn test_contract_reports_unchecked() {
        contract_test("unchecked", &["an invariant nobody asserts"]);
    }

    #[test]
    fn test_failed_contract_does_not_stop_recording() {
        let failed = std::panic::catch_unwind(|| {
            contract_test("doomed", &["an invariant nobody asserts either"]);
        });
        assert!(failed.is_err());
        assert!(!CHECKED_INVARIANTS.is_poisoned());

        assert_invariant(true, "recorded after a failed contract", Some("Test"));
        contract_test("after failure", &["recorded after a failed contract"]);
    }

    #[test]
    fn test_records_are_per_thread() {
        std::thread::spawn(|| assert_invariant(true, "asserted on another thread", None))
            .join()
            .unwrap();

        let result = std::panic::catch_unwind(|| {
            contract_test("other thread", &["asserted on another thread"]);
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_clear_invariant_log() {
        assert_invariant(true, "cleared invariant", None);
        clear_invariant_log();

        let result = std::panic::catch_unwind(|| {
            contract_test("cleared", &["cleared invariant"]);
        });
        assert!(result.is_err());
    }
}
