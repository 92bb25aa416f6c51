//! Logging and tracing setup for elfscope.
//!
//! The library only emits `tracing` events; installing a subscriber is the
//! embedding application's choice. These helpers cover the common cases.

use std::sync::Once;
use tracing::info;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

static INIT: Once = Once::new();

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize the global tracing subscriber.
///
/// Filtering follows `RUST_LOG` (default `info`). Subsequent calls are ignored,
/// as is an already-installed global subscriber.
pub fn init_tracing() {
    INIT.call_once(|| {
        let fmt_layer = fmt::layer()
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true)
            .with_thread_names(true);

        if tracing_subscriber::registry()
            .with(env_filter())
            .with(fmt_layer)
            .try_init()
            .is_ok()
        {
            info!("elfscope tracing initialized");
        }
    });
}

/// Initialize tracing with JSON output for structured logging.
pub fn init_tracing_json() {
    INIT.call_once(|| {
        let fmt_layer = fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true)
            .with_thread_names(true)
            .with_current_span(true);

        if tracing_subscriber::registry()
            .with(env_filter())
            .with(fmt_layer)
            .try_init()
            .is_ok()
        {
            info!("elfscope tracing initialized (JSON mode)");
        }
    });
}

/// Info-level span for one pipeline stage.
#[macro_export]
macro_rules! stage_span {
    ($name:expr) => {
        tracing::info_span!("stage", name = $name)
    };
    ($name:expr, $($field:tt)*) => {
        tracing::info_span!("stage", name = $name, $($field)*)
    };
}

/// Log an error and hand it back.
#[macro_export]
macro_rules! log_error {
    ($err:expr) => {{
        let e = $err;
        tracing::error!(error = %e, "operation failed");
        e
    }};
    ($err:expr, $msg:expr) => {{
        let e = $err;
        tracing::error!(error = %e, message = $msg, "operation failed");
        e
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_once() {
        // Should be callable multiple times without panic
        init_tracing();
        init_tracing();
        init_tracing_json();
    }

    #[test]
    fn test_stage_span() {
        init_tracing();
        let span = stage_span!("symbols", count = 3);
        let _guard = span.enter();
        info!("inside stage");
    }

    #[test]
    fn test_log_error_returns_value() {
        let err = log_error!(crate::error::AnalysisError::Cancelled, "background run");
        assert_eq!(err, crate::error::AnalysisError::Cancelled);
    }
}
