//! Shared test scaffolding: phase markers and logged assertions.
//!
//! Unit and integration tests use the same pattern: call
//! [`init_test_logging`] once, mark phases with [`test_phase!`], assert with
//! [`assert_with_log!`] so failures carry the expected/actual pair, and end
//! with [`test_complete!`]. Output is silent unless `TEST_LOG=1` is set.

use std::sync::Once;
use std::sync::atomic::{AtomicBool, Ordering};

static INIT: Once = Once::new();
static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Initializes test logging from the `TEST_LOG` environment variable.
///
/// Safe to call from every test; only the first call reads the environment.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let on = std::env::var("TEST_LOG").is_ok_and(|v| v != "0" && !v.is_empty());
        VERBOSE.store(on, Ordering::Relaxed);
    });
}

/// Returns true when verbose test logging is enabled.
#[must_use]
pub fn verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

/// Marks the start of a named test phase.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        if $crate::test_utils::verbose() {
            eprintln!("=== phase: {}", $name);
        }
    };
}

/// Asserts a condition, reporting the expected and actual values on failure.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $what:expr, $expected:expr, $actual:expr) => {
        assert!(
            $cond,
            "{}: expected {:?}, got {:?}",
            $what, $expected, $actual
        );
    };
}

/// Marks a test as complete.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        if $crate::test_utils::verbose() {
            eprintln!("=== complete: {}", $name);
        }
    };
}
