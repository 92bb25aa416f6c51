//! Time limits for analysis runs.
//!
//! Analysis is CPU bound, so background runs go to tokio's blocking pool. On
//! timeout the run's cancellation token is fired and the caller gets
//! `Timeout`; the worker stops at its next cancellation check.

use crate::analysis::{Analysis, AnalysisFacade};
use crate::cancel::CancellationToken;
use crate::error::{AnalysisError, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error};

/// Default timeout duration in seconds
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 300;

/// Timeout for quick operations, in seconds
pub const FAST_TIMEOUT_SECONDS: u64 = 10;

#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Maximum duration for the operation
    pub duration: Duration,
    /// Log an error when the limit is hit
    pub log_warnings: bool,
    /// Operation name for logging
    pub operation_name: String,
}

impl TimeoutConfig {
    pub fn new(seconds: u64, operation: impl Into<String>) -> Self {
        Self::from_duration(Duration::from_secs(seconds), operation)
    }

    pub fn from_duration(duration: Duration, operation: impl Into<String>) -> Self {
        Self {
            duration,
            log_warnings: true,
            operation_name: operation.into(),
        }
    }

    /// 10 seconds
    pub fn fast(operation: impl Into<String>) -> Self {
        Self::new(FAST_TIMEOUT_SECONDS, operation)
    }

    /// 5 minutes
    pub fn default_timeout(operation: impl Into<String>) -> Self {
        Self::new(DEFAULT_TIMEOUT_SECONDS, operation)
    }
}

/// Run `future` to completion or fail with `Timeout`.
pub async fn with_timeout<T, F>(config: TimeoutConfig, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    debug!(
        operation = %config.operation_name,
        limit_ms = config.duration.as_millis() as u64,
        "starting timed operation"
    );

    match timeout(config.duration, future).await {
        Ok(result) => {
            debug!(operation = %config.operation_name, "timed operation finished");
            result
        }
        Err(_) => {
            if config.log_warnings {
                error!(
                    operation = %config.operation_name,
                    limit_ms = config.duration.as_millis() as u64,
                    "operation timed out"
                );
            }
            Err(AnalysisError::Timeout {
                seconds: config.duration.as_secs(),
            })
        }
    }
}

/// Analyze on a blocking worker under the facade's `timeout_seconds`.
pub async fn analyze_in_background(
    facade: &AnalysisFacade,
    buffer: impl Into<Arc<[u8]>>,
) -> Result<Analysis> {
    let limit = TimeoutConfig::new(facade.config().timeout_seconds, "analyze");
    analyze_in_background_with(facade, buffer, limit).await
}

/// [`analyze_in_background`] with an explicit limit.
pub async fn analyze_in_background_with(
    facade: &AnalysisFacade,
    buffer: impl Into<Arc<[u8]>>,
    limit: TimeoutConfig,
) -> Result<Analysis> {
    let image: Arc<[u8]> = buffer.into();
    let token = CancellationToken::new();
    let worker = {
        let facade = facade.clone();
        let token = token.clone();
        tokio::task::spawn_blocking(move || facade.analyze_with_cancel(image, &token))
    };

    let outcome = with_timeout(limit, async move {
        match worker.await {
            Ok(result) => result,
            Err(e) => Err(AnalysisError::Worker(e.to_string())),
        }
    })
    .await;

    if matches!(outcome, Err(AnalysisError::Timeout { .. })) {
        token.cancel();
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_async_timeout_success() {
        let config = TimeoutConfig::new(1, "test_operation");

        let result = with_timeout(config, async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(42)
        })
        .await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_async_timeout_failure() {
        let config = TimeoutConfig::from_duration(Duration::from_millis(50), "test_operation");

        let result: Result<i32> = with_timeout(config, async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok(42)
        })
        .await;

        assert!(matches!(result, Err(AnalysisError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_background_rejects_garbage() {
        let facade = AnalysisFacade::default();
        let err = analyze_in_background(&facade, b"BAD!not an elf".to_vec())
            .await
            .unwrap_err();
        assert_eq!(err, AnalysisError::NotAnElfFile);
    }

    #[test]
    fn test_presets() {
        assert_eq!(TimeoutConfig::fast("x").duration, Duration::from_secs(10));
        assert_eq!(
            TimeoutConfig::default_timeout("x").duration,
            Duration::from_secs(300)
        );
    }
}
