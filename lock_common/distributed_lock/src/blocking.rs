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

use std::time::Duration;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::handle::{Lease, LockHandle};
use crate::manager::LockManager;

/// Synchronous facade over [`LockManager`] for plain OS threads.
///
/// Each call parks the calling thread on `runtime` while the async operation
/// runs. Watchdogs keep running on `runtime`. Must not be called from inside
/// an async context; `Handle::block_on` panics there.
#[derive(Debug, Clone)]
pub struct BlockingLockManager {
    manager: LockManager,
    runtime: Handle,
}

impl BlockingLockManager {
    pub fn new(manager: LockManager, runtime: Handle) -> Self {
        Self { manager, runtime }
    }

    pub fn manager(&self) -> &LockManager {
        &self.manager
    }

    pub fn try_acquire(&self, key: &str, lease: impl Into<Lease>) -> Result<Option<LockHandle>> {
        self.runtime.block_on(self.manager.try_acquire(key, lease))
    }

    /// Park the thread until the lock is acquired, `max_wait` elapses or `cancel` fires.
    ///
    /// `cancel` may be fired from any other thread.
    pub fn acquire_blocking(
        &self,
        key: &str,
        lease: impl Into<Lease>,
        max_wait: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<LockHandle> {
        self.runtime.block_on(self.manager.acquire(key, lease, max_wait, cancel))
    }

    pub fn release(&self, handle: &LockHandle) -> Result<bool> {
        self.runtime.block_on(self.manager.release(handle))
    }

    pub fn renew(&self, handle: &LockHandle, new_lease: Duration) -> Result<bool> {
        self.runtime.block_on(self.manager.renew(handle, new_lease))
    }

    pub fn is_locked(&self, key: &str) -> Result<bool> {
        self.runtime.block_on(self.manager.is_locked(key))
    }
}
