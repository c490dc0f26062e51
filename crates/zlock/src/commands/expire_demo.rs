//! `zlock expire-demo`: a waiter loses its session mid-wait

use std::{path::Path, time::Duration};

use anyhow::{bail, Result};
use zlock_core::{Error, LockPath, MemoryEnsemble};

use super::{resolve_config, Worker};
use crate::cli::ExpireDemoArgs;

pub async fn run(args: &ExpireDemoArgs, config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let path = LockPath::new(args.path.as_str())?;
    let ensemble = MemoryEnsemble::new();

    let holder = Worker::connect(&ensemble, &path, &config, "holder")?;
    let waiter = Worker::connect(&ensemble, &path, &config, "waiter")?;

    holder.lock.acquire(&holder.owner, None).await?;
    println!("1. {} holds {path}", holder.name);

    let pending = {
        let lock = waiter.lock.clone();
        let owner = waiter.owner.clone();
        tokio::spawn(async move { lock.acquire(&owner, None).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    let queue = holder.lock.participants().await?;
    println!("2. {} is queued ({} candidates)", waiter.name, queue.len());

    waiter.client.suspend();
    println!("3. {} connection suspended; still waiting", waiter.name);
    tokio::time::sleep(Duration::from_millis(args.suspend_ms)).await;
    if pending.is_finished() {
        bail!("waiter gave up during a suspension");
    }

    waiter.client.expire();
    match pending.await? {
        Err(err @ Error::SessionExpired { .. }) => {
            println!("4. {} session expired: {err} [{}]", waiter.name, err.code());
        }
        Err(err) => return Err(err.into()),
        Ok(()) => bail!("waiter acquired the lock on an expired session"),
    }

    let queue = holder.lock.participants().await?;
    println!(
        "5. {} still holds the lock; {} candidate(s) remain",
        holder.name,
        queue.len()
    );

    let retry = Worker::connect(&ensemble, &path, &config, "waiter-retry")?;
    let pending = {
        let lock = retry.lock.clone();
        let owner = retry.owner.clone();
        tokio::spawn(async move { lock.acquire(&owner, None).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    holder.client.expire();
    pending.await??;
    println!(
        "6. {} crashed; {} acquired on a fresh session (holder lost: {})",
        holder.name,
        retry.name,
        holder.lock.is_lost_by(&holder.owner)
    );

    retry.lock.release(&retry.owner).await?;
    Ok(())
}
