//! Command-line definitions

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "zlock")]
#[command(version, about = "Distributed lock scenarios over an in-memory coordination tree")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
    /// Config file layered over the global config
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run N workers, one session each, against a single lock path
    Contend(ContendArgs),
    /// Show a waiter aborted by session expiry, then recovery
    ExpireDemo(ExpireDemoArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ContendArgs {
    /// Lock path to contend on
    #[arg(short, long, default_value = "/locks/job-42")]
    pub path: String,
    /// Number of workers
    #[arg(short, long, default_value_t = 4)]
    pub workers: usize,
    /// How long each worker holds the lock
    #[arg(long, default_value_t = 50)]
    pub hold_ms: u64,
    /// Give up waiting after this long (defaults to the configured timeout)
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct ExpireDemoArgs {
    /// Lock path to use
    #[arg(short, long, default_value = "/locks/job-42")]
    pub path: String,
    /// How long the waiter stays suspended before its session expires
    #[arg(long, default_value_t = 100)]
    pub suspend_ms: u64,
}
