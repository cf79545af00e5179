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
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::LockConfig;
use crate::error::Result;
use crate::handle::{LockHandle, LockState};

/// Extends the lease of a held lock if the caller still owns it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LeaseRenewer: Send + Sync {
    /// Returns `Ok(false)` when ownership is lost.
    async fn renew(&self, handle: &LockHandle, lease: Duration) -> Result<bool>;
}

struct WatchdogTask {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

enum RenewOutcome {
    Renewed,
    OwnershipLost,
    Lapsed,
    Cancelled,
}

/// Background lease renewal for locks taken with the default lease.
///
/// One task per handle, keyed by owner token. Tasks are never detached:
/// `detach` and `shutdown` cancel and join them.
pub struct Watchdog {
    tasks: Arc<Mutex<HashMap<String, WatchdogTask>>>,
    divisor: u32,
    retry_interval: Duration,
}

impl Watchdog {
    pub fn new(divisor: u32, retry_interval: Duration) -> Self {
        Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
            divisor: divisor.max(2),
            retry_interval,
        }
    }

    pub fn from_config(config: &LockConfig) -> Self {
        Self::new(config.watchdog_divisor, config.renew_retry_interval())
    }

    /// Start renewing `handle`. Must be called from within a tokio runtime.
    ///
    /// Returns false without starting anything if the handle was acquired
    /// with an explicit lease, is not held, or already has a watchdog.
    pub fn attach(&self, handle: &LockHandle, renewer: Arc<dyn LeaseRenewer>) -> bool {
        if !handle.is_watchdog_enabled() || !handle.is_held() {
            return false;
        }
        let token = handle.owner_token().to_string();
        let mut tasks = self.tasks.lock();
        if tasks.contains_key(&token) {
            return false;
        }

        let cancel = CancellationToken::new();
        let registry = Arc::clone(&self.tasks);
        let renewal = Renewal {
            handle: handle.clone(),
            renewer,
            interval: handle.lease() / self.divisor,
            retry_interval: self.retry_interval,
            cancel: cancel.clone(),
        };
        // The registry lock is held until the entry is inserted, so the
        // task's own removal below can never run first.
        let join = tokio::spawn(async move {
            renewal.run().await;
            registry.lock().remove(&token);
        });
        tasks.insert(handle.owner_token().to_string(), WatchdogTask { cancel, join });
        debug!("watchdog started for lock {}", handle.key());
        true
    }

    /// Stop renewing `handle` and wait for its task to finish.
    pub async fn detach(&self, handle: &LockHandle) {
        let task = self.tasks.lock().remove(handle.owner_token());
        if let Some(task) = task {
            task.cancel.cancel();
            if let Err(e) = task.join.await {
                error!("watchdog task for lock {} failed: {}", handle.key(), e);
            }
            debug!("watchdog stopped for lock {}", handle.key());
        }
    }

    pub fn is_running(&self, handle: &LockHandle) -> bool {
        self.tasks.lock().contains_key(handle.owner_token())
    }

    /// Number of live renewal tasks
    pub fn running(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Cancel every renewal task and wait for all of them.
    ///
    /// Locks stay in the store until their current lease lapses.
    pub async fn shutdown(&self) {
        let drained: Vec<WatchdogTask> = self.tasks.lock().drain().map(|(_, task)| task).collect();
        if drained.is_empty() {
            return;
        }
        info!("stopping {} watchdog task(s)", drained.len());
        for task in &drained {
            task.cancel.cancel();
        }
        for task in drained {
            if let Err(e) = task.join.await {
                error!("watchdog task failed during shutdown: {}", e);
            }
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        for (_, task) in self.tasks.lock().drain() {
            task.cancel.cancel();
        }
    }
}

struct Renewal {
    handle: LockHandle,
    renewer: Arc<dyn LeaseRenewer>,
    interval: Duration,
    retry_interval: Duration,
    cancel: CancellationToken,
}

impl Renewal {
    async fn run(self) {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(self.interval) => {}
            }
            if !self.handle.is_held() {
                return;
            }
            match self.renew_before_lapse().await {
                RenewOutcome::Renewed => continue,
                RenewOutcome::Cancelled => return,
                RenewOutcome::OwnershipLost => {
                    self.handle.transition(LockState::Held, LockState::Expired);
                    if self.handle.is_expired() {
                        warn!("lock {} lost ownership, marked expired", self.handle.key());
                    }
                    return;
                }
                RenewOutcome::Lapsed => {
                    if self.handle.transition(LockState::Held, LockState::Expired) {
                        warn!("lock {} could not be renewed before its lease lapsed, marked expired", self.handle.key());
                    }
                    return;
                }
            }
        }
    }

    /// Retries failed renewals only while the current lease is still running.
    ///
    /// A renewal that has not answered by the lease deadline counts as lapsed.
    async fn renew_before_lapse(&self) -> RenewOutcome {
        let lease = self.handle.lease();
        loop {
            let deadline = match self.handle.lease_deadline() {
                Some(deadline) => tokio::time::Instant::from_std(deadline),
                None => return RenewOutcome::Lapsed,
            };
            let attempt = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return RenewOutcome::Cancelled,
                attempt = tokio::time::timeout_at(deadline, self.renewer.renew(&self.handle, lease)) => attempt,
            };
            match attempt {
                Ok(Ok(true)) => return RenewOutcome::Renewed,
                Ok(Ok(false)) => return RenewOutcome::OwnershipLost,
                Ok(Err(e)) => {
                    warn!("renewal of lock {} failed: {}", self.handle.key(), e);
                    let retry_at = tokio::time::Instant::now() + self.retry_interval;
                    if retry_at >= deadline {
                        return RenewOutcome::Lapsed;
                    }
                }
                Err(_) => {
                    warn!("renewal of lock {} did not answer before the lease deadline", self.handle.key());
                    return RenewOutcome::Lapsed;
                }
            }
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return RenewOutcome::Cancelled,
                _ = tokio::time::sleep(self.retry_interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DistributedLockError;
    use cache::StoreError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    /// Renewer whose store never answers.
    struct StalledRenewer;

    #[async_trait]
    impl LeaseRenewer for StalledRenewer {
        async fn renew(&self, _handle: &LockHandle, _lease: Duration) -> Result<bool> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(true)
        }
    }

    fn held_handle(lease_ms: u64, watchdog: bool) -> LockHandle {
        let handle = LockHandle::new("k", uuid::Uuid::new_v4().to_string(), Duration::from_millis(lease_ms), watchdog);
        handle.mark_acquired();
        handle
    }

    fn watchdog() -> Watchdog {
        Watchdog::new(3, Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_keeps_renewing_while_owned() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let mut renewer = MockLeaseRenewer::new();
        renewer.expect_renew().returning(move |handle, lease| {
            counter.fetch_add(1, Ordering::SeqCst);
            handle.mark_renewed(lease);
            Ok(true)
        });

        let watchdog = watchdog();
        let handle = held_handle(90, true);
        assert!(watchdog.attach(&handle, Arc::new(renewer)));
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert!(calls.load(Ordering::SeqCst) >= 3);
        assert!(handle.is_held());
        watchdog.detach(&handle).await;
        assert!(!watchdog.is_running(&handle));
    }

    #[tokio::test]
    async fn test_ownership_loss_expires_handle() {
        let mut renewer = MockLeaseRenewer::new();
        renewer.expect_renew().times(1).returning(|_, _| Ok(false));

        let watchdog = watchdog();
        let handle = held_handle(60, true);
        watchdog.attach(&handle, Arc::new(renewer));

        let ended = tokio::time::timeout(Duration::from_secs(1), handle.wait_until_ended()).await;
        assert_eq!(ended.unwrap(), LockState::Expired);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(watchdog.running(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_expires_after_lease_window() {
        let mut renewer = MockLeaseRenewer::new();
        renewer
            .expect_renew()
            .returning(|_, _| Err(DistributedLockError::StoreUnavailable(StoreError::OperationError("down".to_string()))));

        let watchdog = watchdog();
        let handle = held_handle(150, true);
        let started = Instant::now();
        watchdog.attach(&handle, Arc::new(renewer));

        let ended = tokio::time::timeout(Duration::from_secs(2), handle.wait_until_ended()).await;
        assert_eq!(ended.unwrap(), LockState::Expired);
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_explicit_lease_is_not_watched() {
        let renewer = MockLeaseRenewer::new();
        let watchdog = watchdog();
        let handle = held_handle(60, false);
        assert!(!watchdog.attach(&handle, Arc::new(renewer)));
        assert_eq!(watchdog.running(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_joins_every_task() {
        let mut renewer = MockLeaseRenewer::new();
        renewer.expect_renew().returning(|_, _| Ok(true));
        let renewer: Arc<dyn LeaseRenewer> = Arc::new(renewer);

        let watchdog = watchdog();
        let handles: Vec<LockHandle> = (0..5).map(|_| held_handle(300, true)).collect();
        for handle in &handles {
            assert!(watchdog.attach(handle, Arc::clone(&renewer)));
        }
        assert_eq!(watchdog.running(), 5);

        watchdog.shutdown().await;
        assert_eq!(watchdog.running(), 0);
        assert!(handles.iter().all(LockHandle::is_held));
    }

    #[tokio::test]
    async fn test_stalled_renewal_expires_at_lease_deadline() {
        let watchdog = watchdog();
        let handle = held_handle(150, true);
        let started = Instant::now();
        assert!(watchdog.attach(&handle, Arc::new(StalledRenewer)));

        let ended = tokio::time::timeout(Duration::from_secs(1), handle.wait_until_ended()).await;
        assert_eq!(ended.unwrap(), LockState::Expired);
        assert!(started.elapsed() >= Duration::from_millis(140));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(watchdog.running(), 0);
    }

    #[tokio::test]
    async fn test_detach_interrupts_stalled_renewal() {
        let watchdog = watchdog();
        let handle = held_handle(3_000, true);
        assert!(watchdog.attach(&handle, Arc::new(StalledRenewer)));

        // First renewal starts after a third of the lease and then hangs
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        tokio::time::timeout(Duration::from_millis(200), watchdog.detach(&handle))
            .await
            .unwrap();
        assert!(!watchdog.is_running(&handle));
        assert!(handle.is_held());
    }
}
