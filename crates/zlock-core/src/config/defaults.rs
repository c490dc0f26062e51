//! Default configuration values

use super::types::{LockConfig, RetryPolicy};

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            default_timeout_ms: None,
            create_parents: true,
            cleanup_attempts: 3,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::Exponential {
            base_ms: 50,
            max_ms: 2_000,
            max_attempts: 10,
        }
    }
}
