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

use super::error::Result;
use super::handle::LockHandle;
use super::manager::LockManager;

/// Holds a lock until `unlock` is awaited or the guard is dropped.
///
/// Dropping releases on a background task, so the outcome is only logged.
/// Prefer `unlock` when the caller needs to know whether ownership survived.
pub struct LockGuard {
    manager: LockManager,
    handle: LockHandle,
    armed: bool,
}

impl LockGuard {
    pub fn new(manager: LockManager, handle: LockHandle) -> Self {
        Self {
            manager,
            handle,
            armed: true,
        }
    }

    pub fn handle(&self) -> &LockHandle {
        &self.handle
    }

    pub fn is_held(&self) -> bool {
        self.handle.is_held()
    }

    /// Release the lock now. Same result as [`LockManager::release`].
    pub async fn unlock(mut self) -> Result<bool> {
        self.armed = false;
        self.manager.release(&self.handle).await
    }

    /// Give up the guard without releasing; the caller takes over the handle.
    pub fn into_handle(mut self) -> LockHandle {
        self.armed = false;
        self.handle.clone()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.armed {
            self.manager.release_in_background(self.handle.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LockConfig;
    use cache::MemoryStore;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    async fn guarded() -> (LockManager, LockGuard) {
        let manager = LockManager::new(Arc::new(MemoryStore::new()), LockConfig::default()).unwrap();
        let guard = manager
            .lock_guard("k", Duration::from_secs(5), Some(Duration::from_secs(1)), &CancellationToken::new())
            .await
            .unwrap();
        (manager, guard)
    }

    #[tokio::test]
    async fn test_unlock_releases() {
        let (manager, guard) = guarded().await;
        assert!(guard.is_held());
        assert!(guard.unlock().await.unwrap());
        assert!(!manager.is_locked("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_drop_releases_in_background() {
        let (manager, guard) = guarded().await;
        let handle = guard.handle().clone();
        drop(guard);

        let ended = tokio::time::timeout(Duration::from_secs(1), handle.wait_until_ended()).await.unwrap();
        assert_eq!(ended, crate::LockState::Unlocked);
        assert!(!manager.is_locked("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_into_handle_keeps_lock() {
        let (manager, guard) = guarded().await;
        let handle = guard.into_handle();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(manager.is_locked("k").await.unwrap());
        assert!(manager.release(&handle).await.unwrap());
    }
}
