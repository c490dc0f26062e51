//! Configuration type definitions

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings shared by every lock built from one configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LockConfig {
    /// Backoff applied to `ConnectionLoss` failures
    pub retry: RetryPolicy,
    /// Timeout used when `acquire` is called without one; unset waits forever
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_timeout_ms: Option<u64>,
    /// Create the lock path (and its parents) before the first acquisition
    pub create_parents: bool,
    /// Delete attempts spent cleaning up an abandoned candidate node
    pub cleanup_attempts: u32,
}

impl LockConfig {
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }
}

/// Retry schedule for transient connectivity failures
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Surface the first failure
    None,
    /// Same delay between every attempt
    Fixed { delay_ms: u64, max_attempts: u32 },
    /// Delay doubles from `base_ms` up to `max_ms`
    Exponential {
        base_ms: u64,
        max_ms: u64,
        max_attempts: u32,
    },
}

impl RetryPolicy {
    /// Delay before the next attempt once `failures` attempts have failed,
    /// or `None` when the policy is exhausted.
    pub fn delay_for(&self, failures: u32) -> Option<Duration> {
        match *self {
            Self::None => None,
            Self::Fixed {
                delay_ms,
                max_attempts,
            } => (failures < max_attempts).then(|| Duration::from_millis(delay_ms)),
            Self::Exponential {
                base_ms,
                max_ms,
                max_attempts,
            } => (failures < max_attempts).then(|| {
                let factor = 1u64
                    .checked_shl(failures.saturating_sub(1))
                    .unwrap_or(u64::MAX);
                Duration::from_millis(base_ms.saturating_mul(factor).min(max_ms))
            }),
        }
    }

    /// Total attempts the policy allows
    pub const fn max_attempts(&self) -> u32 {
        match *self {
            Self::None => 1,
            Self::Fixed { max_attempts, .. } | Self::Exponential { max_attempts, .. } => {
                max_attempts
            }
        }
    }

    /// Same schedule with a different attempt cap
    pub const fn with_max_attempts(self, attempts: u32) -> Self {
        match self {
            Self::None => Self::None,
            Self::Fixed { delay_ms, .. } => Self::Fixed {
                delay_ms,
                max_attempts: attempts,
            },
            Self::Exponential {
                base_ms, max_ms, ..
            } => Self::Exponential {
                base_ms,
                max_ms,
                max_attempts: attempts,
            },
        }
    }
}
