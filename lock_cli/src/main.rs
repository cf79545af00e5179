/*
 * Copyright (c) Huawei Technologies Co., Ltd. 2025. All rights reserved.
 * Global Trust Authority is licensed under the Mulan PSL v2.
 * You can use this software according to the terms and conditions of the Mulan PSL v2.
 * You may obtain a copy of Mulan PSL v2 at:
 *     http://license.coscl.org.cn/MulanPSL2
 * THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND, EITHER EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT, MERCHANTABILITY OR FIT FOR A PARTICULAR
 * PURPOSE.
 * See the Mulan PSL v2 for more details.
 */


mod commands;
mod entities;

use crate::commands::LockCommands;
use crate::entities::{AcquireReport, LockStatus, StressReport};
use cache::{MemoryStore, RedisClient};
use clap::Parser;
use distributed_lock::{config, DistributedLockError, Lease, LockManager};
use log::{error, info, warn};
use serde::Serialize;
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Lock configuration file (YAML, `distributed_lock` section)
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Logging configuration file; logs go to the console without it
    #[clap(long)]
    log_config: Option<PathBuf>,

    /// Use an in-process store instead of Redis
    #[clap(long)]
    memory: bool,

    #[clap(subcommand)]
    command: LockCommands,
}

async fn build_manager(cli: &Cli) -> Result<LockManager, Box<dyn Error>> {
    let lock_config = config::init_global(cli.config.as_deref())?.clone();
    let manager = if cli.memory {
        LockManager::new(Arc::new(MemoryStore::new()), lock_config)?
    } else {
        let client = RedisClient::connect(&lock_config.redis_url).await?;
        LockManager::new(Arc::new(client), lock_config)?
    };
    Ok(manager)
}

/// Cancellation token fired by Ctrl-C.
fn interrupt_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received");
            trigger.cancel();
        }
    });
    cancel
}

fn print_json(value: &impl Serialize) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn deal_acquire(
    manager: &LockManager,
    key: &str,
    lease_ms: Option<u64>,
    wait_ms: Option<u64>,
    hold_ms: u64,
) -> Result<(), Box<dyn Error>> {
    let lease = match lease_ms {
        Some(ms) => Lease::Fixed(Duration::from_millis(ms)),
        None => Lease::Watchdog,
    };
    let cancel = interrupt_token();
    let handle = manager.acquire(key, lease, wait_ms.map(Duration::from_millis), &cancel).await?;
    info!("holding lock {} as {}", key, handle.owner_token());

    let started = Instant::now();
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_millis(hold_ms)) => {}
        _ = cancel.cancelled() => {}
        ended = handle.wait_until_ended() => warn!("lock {} ended early ({})", key, ended),
    }
    let held_ms = started.elapsed().as_millis() as u64;
    let released = manager.release(&handle).await?;

    print_json(&AcquireReport {
        key: key.to_string(),
        owner: handle.owner_token().to_string(),
        watchdog: handle.is_watchdog_enabled(),
        held_ms,
        released,
    })
}

async fn deal_status(manager: &LockManager, key: &str) -> Result<(), Box<dyn Error>> {
    let owner = manager.current_owner(key).await?;
    let remaining_ms = match owner {
        Some(_) => manager.remaining_lease(key).await?.map(|ttl| ttl.as_millis() as u64),
        None => None,
    };
    print_json(&LockStatus {
        key: key.to_string(),
        locked: owner.is_some(),
        owner,
        remaining_ms,
    })
}

async fn deal_stress(manager: &LockManager, key: &str, tasks: usize, items: usize) -> Result<(), Box<dyn Error>> {
    let counter = Arc::new(AtomicUsize::new(0));
    let started = Instant::now();

    let mut workers = Vec::with_capacity(tasks);
    for _ in 0..tasks {
        let manager = manager.clone();
        let counter = Arc::clone(&counter);
        let key = key.to_string();
        workers.push(tokio::spawn(async move {
            let handle = manager.acquire(&key, Lease::Watchdog, None, &CancellationToken::new()).await?;
            for _ in 0..items {
                // Read and write apart, so only the lock keeps updates from being lost
                let current = counter.load(Ordering::SeqCst);
                tokio::task::yield_now().await;
                counter.store(current + 1, Ordering::SeqCst);
            }
            manager.release(&handle).await?;
            Ok::<(), DistributedLockError>(())
        }));
    }
    for worker in futures::future::join_all(workers).await {
        worker??;
    }

    let report = StressReport {
        key: key.to_string(),
        tasks,
        items,
        expected: tasks * items,
        count: counter.load(Ordering::SeqCst),
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    if !report.is_consistent() {
        error!("lost updates: expected {}, counted {}", report.expected, report.count);
    }
    print_json(&report)
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let manager = build_manager(&cli).await?;
    let result = match &cli.command {
        LockCommands::Acquire { key, lease_ms, wait_ms, hold_ms } => {
            deal_acquire(&manager, key, *lease_ms, *wait_ms, *hold_ms).await
        },
        LockCommands::Status { key } => deal_status(&manager, key).await,
        LockCommands::ForceRelease { key } => {
            let removed = manager.force_release(key).await?;
            println!("{}", if removed { "removed" } else { "not locked" });
            Ok(())
        },
        LockCommands::Stress { key, tasks, items } => deal_stress(&manager, key, *tasks, *items).await,
    };
    manager.shutdown().await;
    result
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let logged = match &cli.log_config {
        Some(path) => common_log::init_with_yaml(path.clone()),
        None => common_log::init_console("info"),
    };
    if let Err(e) = logged {
        eprintln!("Failed to initialize logger: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        },
    }
}
