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

use std::collections::HashMap;
use std::time::Duration;

use log::debug;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::handle::{Lease, LockHandle};
use crate::manager::LockManager;

struct Hold {
    handle: LockHandle,
    count: u32,
}

/// Reentrant locking layered over [`LockManager`].
///
/// A holder that already owns `key` re-enters by bumping a local hold
/// count; the store still sees a single owner token. The lock is released
/// in the store only when the count drops back to zero. `holder` identifies
/// the logical caller (a task or request id) and is the caller's to choose.
pub struct ReentrantLockManager {
    manager: LockManager,
    holds: Mutex<HashMap<(String, String), Hold>>,
}

impl ReentrantLockManager {
    pub fn new(manager: LockManager) -> Self {
        Self {
            manager,
            holds: Mutex::new(HashMap::new()),
        }
    }

    pub fn manager(&self) -> &LockManager {
        &self.manager
    }

    /// Re-enter if `holder` still owns `key`, otherwise make one acquisition attempt.
    pub async fn try_acquire(&self, key: &str, holder: &str, lease: impl Into<Lease>) -> Result<Option<LockHandle>> {
        if let Some(handle) = self.reenter(key, holder) {
            return Ok(Some(handle));
        }
        let acquired = self.manager.try_acquire(key, lease).await?;
        Ok(acquired.map(|handle| self.record(key, holder, handle)))
    }

    /// Re-enter if `holder` still owns `key`, otherwise poll like [`LockManager::acquire`].
    pub async fn acquire(
        &self,
        key: &str,
        holder: &str,
        lease: impl Into<Lease>,
        max_wait: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<LockHandle> {
        if let Some(handle) = self.reenter(key, holder) {
            return Ok(handle);
        }
        let handle = self.manager.acquire(key, lease, max_wait, cancel).await?;
        Ok(self.record(key, holder, handle))
    }

    /// Drop one hold. Releases in the store when the last hold goes.
    ///
    /// # Returns
    ///
    /// `Ok(true)` if a hold was dropped while the lock was still owned.
    /// `Ok(false)` if `holder` held nothing or ownership had been lost; the
    /// hold is dropped either way.
    pub async fn release(&self, key: &str, holder: &str) -> Result<bool> {
        let last = {
            let mut holds = self.holds.lock();
            let id = (key.to_string(), holder.to_string());
            match holds.get_mut(&id) {
                None => return Ok(false),
                Some(hold) if hold.count > 1 => {
                    hold.count -= 1;
                    return Ok(hold.handle.is_held());
                }
                Some(_) => holds.remove(&id).map(|hold| hold.handle),
            }
        };
        match last {
            Some(handle) => self.manager.release(&handle).await,
            None => Ok(false),
        }
    }

    /// Current hold count of `holder` on `key`, zero if none.
    pub fn hold_count(&self, key: &str, holder: &str) -> u32 {
        self.holds
            .lock()
            .get(&(key.to_string(), holder.to_string()))
            .map_or(0, |hold| hold.count)
    }

    fn reenter(&self, key: &str, holder: &str) -> Option<LockHandle> {
        let mut holds = self.holds.lock();
        let id = (key.to_string(), holder.to_string());
        match holds.get_mut(&id) {
            Some(hold) if hold.handle.is_held() => {
                hold.count += 1;
                debug!("{} re-entered lock {} (holds: {})", holder, key, hold.count);
                Some(hold.handle.clone())
            }
            Some(_) => {
                // Expired or released behind our back; start over.
                holds.remove(&id);
                None
            }
            None => None,
        }
    }

    fn record(&self, key: &str, holder: &str, handle: LockHandle) -> LockHandle {
        self.holds.lock().insert(
            (key.to_string(), holder.to_string()),
            Hold {
                handle: handle.clone(),
                count: 1,
            },
        );
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LockConfig;
    use cache::MemoryStore;
    use std::sync::Arc;

    fn reentrant() -> ReentrantLockManager {
        let manager = LockManager::new(Arc::new(MemoryStore::new()), LockConfig::default()).unwrap();
        ReentrantLockManager::new(manager)
    }

    #[tokio::test]
    async fn test_same_holder_reenters() {
        let locks = reentrant();
        let first = locks.try_acquire("k", "task-1", Duration::from_secs(5)).await.unwrap().unwrap();
        let second = locks.try_acquire("k", "task-1", Duration::from_secs(5)).await.unwrap().unwrap();
        assert_eq!(first.owner_token(), second.owner_token());
        assert_eq!(locks.hold_count("k", "task-1"), 2);

        assert!(locks.release("k", "task-1").await.unwrap());
        assert!(locks.manager().is_locked("k").await.unwrap());
        assert!(locks.release("k", "task-1").await.unwrap());
        assert!(!locks.manager().is_locked("k").await.unwrap());
        assert_eq!(locks.hold_count("k", "task-1"), 0);
    }

    #[tokio::test]
    async fn test_other_holder_contends() {
        let locks = reentrant();
        locks.try_acquire("k", "task-1", Duration::from_secs(5)).await.unwrap().unwrap();
        assert!(locks.try_acquire("k", "task-2", Duration::from_secs(5)).await.unwrap().is_none());
        assert!(!locks.release("k", "task-2").await.unwrap());
    }

    #[tokio::test]
    async fn test_lost_hold_is_reacquired() {
        let locks = reentrant();
        let first = locks.try_acquire("k", "task-1", Duration::from_secs(5)).await.unwrap().unwrap();
        locks.manager().force_release("k").await.unwrap();
        assert!(!locks.manager().renew(&first, Duration::from_secs(5)).await.unwrap());

        let second = locks.try_acquire("k", "task-1", Duration::from_secs(5)).await.unwrap().unwrap();
        assert_ne!(first.owner_token(), second.owner_token());
        assert_eq!(locks.hold_count("k", "task-1"), 1);
    }

    #[tokio::test]
    async fn test_inner_release_reports_lost_ownership() {
        let locks = reentrant();
        let handle = locks.try_acquire("k", "task-1", Duration::from_secs(5)).await.unwrap().unwrap();
        locks.try_acquire("k", "task-1", Duration::from_secs(5)).await.unwrap().unwrap();
        locks.manager().force_release("k").await.unwrap();
        assert!(!locks.manager().renew(&handle, Duration::from_secs(5)).await.unwrap());

        assert!(!locks.release("k", "task-1").await.unwrap());
        assert_eq!(locks.hold_count("k", "task-1"), 1);
        assert!(!locks.release("k", "task-1").await.unwrap());
        assert_eq!(locks.hold_count("k", "task-1"), 0);
    }
}
