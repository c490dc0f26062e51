//! Configuration loading and management
//!
//! # Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//! 1. Built-in defaults
//! 2. Global config: `<config dir>/zlock/config.toml`
//! 3. Explicit config file (if given)
//! 4. Environment variables: `ZLOCK_*`
//!
//! Tables merge key by key, so a file only needs the values it changes.
//!
//! # Example Config
//!
//! ```toml
//! default_timeout_ms = 30000
//! create_parents = true
//! cleanup_attempts = 3
//!
//! [retry]
//! kind = "exponential"
//! base_ms = 50
//! max_ms = 2000
//! max_attempts = 10
//! ```
//!
//! # Module Structure
//!
//! - `types`: Configuration structure definitions and retry schedule
//! - `defaults`: Default value implementations
//! - `load`: Loading from files and environment
//! - `validate`: Validation

mod defaults;
mod load;
mod types;
mod validate;

pub use load::{global_config_path, load_config, load_config_from};
pub use types::{LockConfig, RetryPolicy};
