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

//! Lease-based distributed lock on top of a shared key/value store.
//!
//! A lock is one store key holding the owner's unique token with a time
//! to live. Acquisition is a single set-if-absent write; release and renew
//! are compare-and-act scripts so a holder can never delete or extend a
//! lock that has passed to someone else. Locks acquired without an explicit
//! lease get a watchdog task that keeps extending them until release.
//!
//! ```no_run
//! use distributed_lock::{LockConfig, LockManager, Lease};
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> distributed_lock::Result<()> {
//! let manager = LockManager::connect(LockConfig::default()).await?;
//! let handle = manager
//!     .acquire("orders:42", Lease::Watchdog, Some(Duration::from_secs(5)), &CancellationToken::new())
//!     .await?;
//! // ... critical section ...
//! manager.release(&handle).await?;
//! # Ok(())
//! # }
//! ```

pub mod blocking;
pub mod config;
pub mod error;
pub mod executor;
pub mod future;
pub mod guard;
pub mod handle;
pub mod manager;
mod poll;
pub mod reentrant;
pub mod watchdog;

pub use blocking::BlockingLockManager;
pub use config::LockConfig;
pub use error::{DistributedLockError, Result};
pub use executor::ScriptExecutor;
pub use future::AcquireFuture;
pub use guard::LockGuard;
pub use handle::{Lease, LockHandle, LockState};
pub use manager::LockManager;
pub use reentrant::ReentrantLockManager;
pub use watchdog::{LeaseRenewer, Watchdog};
