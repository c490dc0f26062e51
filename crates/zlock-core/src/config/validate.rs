//! Configuration validation

use super::types::{LockConfig, RetryPolicy};
use crate::{Error, Result};

const MAX_CLEANUP_ATTEMPTS: u32 = 100;

impl LockConfig {
    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any values are out of range or inconsistent
    pub fn validate(&self) -> Result<()> {
        self.retry.validate()?;

        if self.cleanup_attempts == 0 || self.cleanup_attempts > MAX_CLEANUP_ATTEMPTS {
            return Err(Error::InvalidConfig(format!(
                "cleanup_attempts must be 1-{MAX_CLEANUP_ATTEMPTS}"
            )));
        }

        Ok(())
    }
}

impl RetryPolicy {
    /// Validate the schedule
    ///
    /// # Errors
    ///
    /// Returns error if the policy allows no attempts or its delays are
    /// inconsistent
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::None => Ok(()),
            Self::Fixed { max_attempts, .. } if max_attempts == 0 => Err(Error::InvalidConfig(
                "retry.max_attempts must be at least 1".to_string(),
            )),
            Self::Fixed { .. } => Ok(()),
            Self::Exponential {
                base_ms,
                max_ms,
                max_attempts,
            } => {
                if max_attempts == 0 {
                    return Err(Error::InvalidConfig(
                        "retry.max_attempts must be at least 1".to_string(),
                    ));
                }
                if base_ms == 0 {
                    return Err(Error::InvalidConfig(
                        "retry.base_ms must be greater than 0".to_string(),
                    ));
                }
                if max_ms < base_ms {
                    return Err(Error::InvalidConfig(
                        "retry.max_ms must not be less than retry.base_ms".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}
