//! Configuration loading from files and environment
//!
//! Files are parsed into TOML tables and merged onto the defaults before
//! deserializing, so later sources only override the keys they mention.

use std::path::{Path, PathBuf};

use super::types::LockConfig;
use crate::{Error, Result};

// ═══════════════════════════════════════════════════════════════════════════
// PUBLIC API
// ═══════════════════════════════════════════════════════════════════════════

/// Load configuration from defaults, the global config file and `ZLOCK_*`
/// environment variables.
///
/// # Errors
///
/// Returns error if:
/// - Config file is malformed TOML
/// - Environment variables hold unparseable values
/// - Config values fail validation
pub fn load_config() -> Result<LockConfig> {
    let files: Vec<PathBuf> = global_config_path()
        .filter(|path| path.exists())
        .into_iter()
        .collect();
    load_layers(&files)
}

/// Like [`load_config`], with `path` layered on top of the global file.
///
/// # Errors
///
/// Returns error if `path` cannot be read, or for any reason
/// [`load_config`] fails.
pub fn load_config_from(path: &Path) -> Result<LockConfig> {
    let mut files: Vec<PathBuf> = global_config_path()
        .filter(|global| global.exists())
        .into_iter()
        .collect();
    files.push(path.to_path_buf());
    load_layers(&files)
}

impl LockConfig {
    /// Parse a TOML document layered over the defaults (no environment).
    ///
    /// # Errors
    ///
    /// Returns error if the document is malformed or fails validation
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let overlay: toml::Table = source.parse()?;
        let mut base = defaults_table()?;
        merge_tables(&mut base, overlay);
        let config: Self = toml::Value::Table(base).try_into()?;
        config.validate()?;
        Ok(config)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// PATH HELPERS
// ═══════════════════════════════════════════════════════════════════════════

/// Get path to global config file
pub fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "zlock")
        .map(|proj_dirs| proj_dirs.config_dir().join("config.toml"))
}

// ═══════════════════════════════════════════════════════════════════════════
// LAYERING
// ═══════════════════════════════════════════════════════════════════════════

fn load_layers(files: &[PathBuf]) -> Result<LockConfig> {
    let mut table = defaults_table()?;
    for path in files {
        merge_tables(&mut table, load_toml_file(path)?);
    }
    let config: LockConfig = toml::Value::Table(table).try_into()?;
    let config = config.apply_env_vars()?;
    config.validate()?;
    Ok(config)
}

fn defaults_table() -> Result<toml::Table> {
    match toml::Value::try_from(LockConfig::default()) {
        Ok(toml::Value::Table(table)) => Ok(table),
        Ok(_) => Err(Error::Parse("defaults did not serialize to a table".into())),
        Err(e) => Err(Error::Parse(format!("Failed to serialize defaults: {e}"))),
    }
}

fn load_toml_file(path: &Path) -> Result<toml::Table> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::InvalidConfig(format!("Failed to read config {}: {e}", path.display()))
    })?;
    content.parse::<toml::Table>().map_err(|e| {
        Error::Parse(format!("Failed to parse config {}: {e}", path.display()))
    })
}

/// Recursively merge `overlay` into `base`; overlay values win.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// ENVIRONMENT
// ═══════════════════════════════════════════════════════════════════════════

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::InvalidConfig(format!("{name} has an invalid value: {raw}"))),
        Err(_) => Ok(None),
    }
}

impl LockConfig {
    /// Apply `ZLOCK_*` overrides
    ///
    /// - `ZLOCK_DEFAULT_TIMEOUT_MS`
    /// - `ZLOCK_CREATE_PARENTS`
    /// - `ZLOCK_CLEANUP_ATTEMPTS`
    /// - `ZLOCK_RETRY_MAX_ATTEMPTS`
    ///
    /// # Errors
    ///
    /// Returns error if a variable is set but does not parse
    pub fn apply_env_vars(mut self) -> Result<Self> {
        if let Some(timeout) = env_parse::<u64>("ZLOCK_DEFAULT_TIMEOUT_MS")? {
            self.default_timeout_ms = Some(timeout);
        }
        if let Some(create) = env_parse::<bool>("ZLOCK_CREATE_PARENTS")? {
            self.create_parents = create;
        }
        if let Some(attempts) = env_parse::<u32>("ZLOCK_CLEANUP_ATTEMPTS")? {
            self.cleanup_attempts = attempts;
        }
        if let Some(attempts) = env_parse::<u32>("ZLOCK_RETRY_MAX_ATTEMPTS")? {
            self.retry = self.retry.with_max_attempts(attempts);
        }
        Ok(self)
    }
}
