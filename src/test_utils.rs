//! Shared helpers for unit and integration tests.
//!
//! - Consistent tracing-based logging initialization
//! - Phase/completion macros for readable test output
//! - Runtime constructors

use std::sync::Once;

use crate::config::RuntimeConfig;
use crate::runtime::Runtime;

static INIT_LOGGING: Once = Once::new();

/// Initialize test logging. Safe to call multiple times; only the first
/// call takes effect. Honors `RUST_LOG`, defaulting to `trace`.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("trace"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_ansi(false)
            .try_init();
    });
}

/// Create a runtime with default configuration and logging initialized.
#[must_use]
pub fn test_runtime() -> Runtime {
    init_test_logging();
    Runtime::with_defaults()
}

/// Create a runtime with a specific configuration and logging initialized.
#[must_use]
pub fn test_runtime_with(config: RuntimeConfig) -> Runtime {
    init_test_logging();
    Runtime::new(config)
}

/// Log a test phase transition with a visual separator.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(phase = %$name, "========================================");
        tracing::info!(phase = %$name, "TEST PHASE: {}", $name);
        tracing::info!(phase = %$name, "========================================");
    };
}

/// Log test completion with summary.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = %$name, "test completed successfully: {}", $name);
    };
    ($name:expr, $($key:ident = $value:expr),* $(,)?) => {
        tracing::info!(
            test = %$name,
            $($key = %$value,)*
            "test completed successfully: {}",
            $name
        );
    };
}
