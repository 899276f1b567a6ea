/// Shared configuration types.
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Upper bound on a single retry delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// How the reconciler writes positions back.
///
/// The defaults keep the plain behavior: no retries, failures corrected by
/// the refetch that ends every batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Extra attempts per write after the first failure.
    #[serde(default)]
    pub max_retries: u32,
    /// Delay before the first retry; doubled on every further attempt.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Use a single multi-row transaction when the store offers one.
    #[serde(default = "default_prefer_batch")]
    pub prefer_batch: bool,
}

fn default_retry_backoff_ms() -> u64 {
    200
}

fn default_prefer_batch() -> bool {
    true
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_backoff_ms: default_retry_backoff_ms(),
            prefer_batch: default_prefer_batch(),
        }
    }
}

impl ReconcileConfig {
    /// Delay before retry number `attempt` (0-based), capped at [`MAX_BACKOFF`].
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.min(32)).unwrap_or(u64::MAX);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor)).min(MAX_BACKOFF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_json() {
        let config: ReconcileConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ReconcileConfig::default());
        assert_eq!(config.max_retries, 0);
        assert!(config.prefer_batch);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = ReconcileConfig {
            retry_backoff_ms: 100,
            ..ReconcileConfig::default()
        };
        assert_eq!(config.backoff_for(0), Duration::from_millis(100));
        assert_eq!(config.backoff_for(1), Duration::from_millis(200));
        assert_eq!(config.backoff_for(3), Duration::from_millis(800));
        assert_eq!(config.backoff_for(40), MAX_BACKOFF);
    }
}
