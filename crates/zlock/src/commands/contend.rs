//! `zlock contend`: many sessions, one lock, FIFO handoff

use std::{
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use tokio::task::JoinSet;
use zlock_core::{LockPath, MemoryEnsemble};

use super::{resolve_config, Worker};
use crate::cli::ContendArgs;

/// One granted acquisition
#[derive(Debug)]
struct Grant {
    position: usize,
    worker: String,
    node: String,
    waited: Duration,
}

pub async fn run(args: &ContendArgs, config_path: Option<&Path>) -> Result<()> {
    anyhow::ensure!(args.workers > 0, "--workers must be at least 1");
    let config = resolve_config(config_path)?;
    let path = LockPath::new(args.path.as_str())?;
    let timeout = args.timeout_ms.map(Duration::from_millis);
    let hold = Duration::from_millis(args.hold_ms);

    let ensemble = MemoryEnsemble::new();
    let holders = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));
    let granted = Arc::new(AtomicUsize::new(0));
    let mut tasks = JoinSet::new();

    for index in 0..args.workers {
        let worker = Worker::connect(&ensemble, &path, &config, format!("worker-{index}"))?;
        let holders = Arc::clone(&holders);
        let overlaps = Arc::clone(&overlaps);
        let granted = Arc::clone(&granted);
        tasks.spawn(async move {
            let started = Instant::now();
            let guard = worker
                .lock
                .lock(worker.owner.clone(), timeout)
                .await
                .with_context(|| format!("{} could not acquire", worker.name))?;
            let waited = started.elapsed();
            let position = granted.fetch_add(1, Ordering::SeqCst) + 1;
            let node = worker
                .lock
                .holder()
                .await?
                .map(|holder| holder.candidate.name)
                .unwrap_or_default();

            if holders.fetch_add(1, Ordering::SeqCst) != 0 {
                overlaps.fetch_add(1, Ordering::SeqCst);
            }
            tokio::time::sleep(hold).await;
            holders.fetch_sub(1, Ordering::SeqCst);
            guard.release().await?;

            Ok::<_, anyhow::Error>(Grant {
                position,
                worker: worker.name,
                node,
                waited,
            })
        });
    }

    let mut grants = Vec::with_capacity(args.workers);
    while let Some(joined) = tasks.join_next().await {
        grants.push(joined.context("worker task failed")??);
    }
    grants.sort_by_key(|grant| grant.position);

    println!("Acquisition order on {path}:");
    for grant in &grants {
        println!(
            "  {:>3}. {:<12} {}  waited {:?}",
            grant.position,
            grant.worker,
            grant.node,
            grant.waited
        );
    }

    let overlaps = overlaps.load(Ordering::SeqCst);
    anyhow::ensure!(overlaps == 0, "{overlaps} overlapping holds observed");
    println!("✓ {} workers, no overlapping holds", grants.len());
    Ok(())
}
