pub mod contend;
pub mod expire_demo;

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use zlock_core::{
    config::{load_config, load_config_from},
    LockConfig, LockHandle, LockPath, MemoryClient, MemoryEnsemble, OwnerId,
};

/// Resolve configuration from the standard layers plus an optional file.
pub fn resolve_config(explicit: Option<&Path>) -> Result<LockConfig> {
    let config = match explicit {
        Some(path) => load_config_from(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => load_config().context("loading config")?,
    };
    tracing::debug!(?config, "configuration resolved");
    Ok(config)
}

/// A simulated process: its own session, lock handle and identity.
pub struct Worker {
    pub name: String,
    pub client: MemoryClient,
    pub lock: LockHandle,
    pub owner: OwnerId,
}

impl Worker {
    pub fn connect(
        ensemble: &MemoryEnsemble,
        path: &LockPath,
        config: &LockConfig,
        name: impl Into<String>,
    ) -> Result<Self> {
        let name = name.into();
        let client = ensemble.connect();
        let lock = LockHandle::with_config(Arc::new(client.clone()), path.clone(), config.clone())?;
        let owner = OwnerId::new(name.clone())?;
        Ok(Self {
            name,
            client,
            lock,
            owner,
        })
    }
}
