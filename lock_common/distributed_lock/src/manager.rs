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

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use cache::{RedisClient, StoreClient};
use log::{debug, error, trace, warn};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::LockConfig;
use crate::error::{DistributedLockError, Result};
use crate::executor::ScriptExecutor;
use crate::future::AcquireFuture;
use crate::guard::LockGuard;
use crate::handle::{Lease, LockHandle, LockState};
use crate::poll::{poll_until, PollSchedule};
use crate::watchdog::{LeaseRenewer, Watchdog};

struct ManagerInner {
    executor: ScriptExecutor,
    config: LockConfig,
    schedule: PollSchedule,
    watchdog: Watchdog,
    instance_id: String,
}

/// Entry point for acquiring, renewing and releasing distributed locks.
///
/// Cheap to clone; clones share the store connection and the watchdog.
/// The manager keeps no in-process lock per key: mutual exclusion comes
/// only from the store's atomic set-if-absent. Acquisition is not
/// reentrant, see [`crate::ReentrantLockManager`] for that flavor.
#[derive(Clone)]
pub struct LockManager {
    inner: Arc<ManagerInner>,
}

impl LockManager {
    /// Create a manager over an existing store client.
    ///
    /// # Errors
    ///
    /// * `DistributedLockError::InvalidArgument` - If `config` fails validation.
    pub fn new(store: Arc<dyn StoreClient>, config: LockConfig) -> Result<Self> {
        config.validate()?;
        let instance_id = Uuid::new_v4().simple().to_string();
        debug!("lock manager {} created", instance_id);
        Ok(Self {
            inner: Arc::new(ManagerInner {
                executor: ScriptExecutor::new(store),
                schedule: PollSchedule::from_config(&config),
                watchdog: Watchdog::from_config(&config),
                config,
                instance_id,
            }),
        })
    }

    /// Connect to Redis at `config.redis_url` and create a manager over it.
    pub async fn connect(config: LockConfig) -> Result<Self> {
        let client = RedisClient::connect(&config.redis_url).await?;
        Self::new(Arc::new(client), config)
    }

    pub fn config(&self) -> &LockConfig {
        &self.inner.config
    }

    /// Identifier of this manager, used as the prefix of every owner token it mints.
    pub fn instance_id(&self) -> &str {
        &self.inner.instance_id
    }

    pub fn watchdog(&self) -> &Watchdog {
        &self.inner.watchdog
    }

    /// Single non-blocking acquisition attempt.
    ///
    /// # Arguments
    ///
    /// * `key` - Lock key name
    /// * `lease` - `Lease::Watchdog` for the configured default lease kept alive
    ///   by the watchdog, or a fixed lease that is never renewed automatically
    ///
    /// # Returns
    ///
    /// `Ok(Some(handle))` on success, `Ok(None)` if another owner holds the key.
    ///
    /// # Errors
    ///
    /// * `DistributedLockError::StoreUnavailable` - The store could not be reached.
    /// * `DistributedLockError::InvalidArgument` - Empty key, or a lease that is zero or too long to express in milliseconds.
    pub async fn try_acquire(&self, key: &str, lease: impl Into<Lease>) -> Result<Option<LockHandle>> {
        let (lease_duration, watchdog) = self.resolve_lease(key, lease.into())?;
        let handle = LockHandle::new(key, self.next_owner_token(), lease_duration, watchdog);

        let acquired = self
            .inner
            .executor
            .store()
            .set_if_absent(key, handle.owner_token(), lease_duration)
            .await?;
        if !acquired {
            trace!("lock {} is held by another owner", key);
            return Ok(None);
        }

        handle.mark_acquired();
        if watchdog {
            self.inner.watchdog.attach(&handle, self.renewer());
        }
        debug!("acquired lock {} with lease {:?}", key, lease_duration);
        Ok(Some(handle))
    }

    /// Poll until the lock is acquired, `max_wait` elapses or `cancel` fires.
    ///
    /// The caller's task is suspended between attempts. `max_wait` of `None`
    /// waits indefinitely.
    ///
    /// # Errors
    ///
    /// * `DistributedLockError::AcquireTimeout` - `max_wait` elapsed.
    /// * `DistributedLockError::Interrupted` - `cancel` fired, observed within one polling interval.
    /// * `DistributedLockError::StoreUnavailable` - The store could not be reached.
    pub async fn acquire(
        &self,
        key: &str,
        lease: impl Into<Lease>,
        max_wait: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<LockHandle> {
        let lease = lease.into();
        self.resolve_lease(key, lease)?;
        let result = poll_until(self.inner.schedule, max_wait, cancel, move || self.try_acquire(key, lease)).await;
        match &result {
            Err(DistributedLockError::AcquireTimeout) => debug!("timed out waiting for lock {}", key),
            Err(DistributedLockError::Interrupted) => debug!("acquisition of lock {} interrupted", key),
            _ => {}
        }
        result
    }

    /// Start acquiring in the background and return immediately.
    ///
    /// The returned future resolves exactly once. See [`AcquireFuture`] for
    /// cancellation semantics.
    pub fn acquire_async(&self, key: &str, lease: impl Into<Lease>, max_wait: Option<Duration>) -> AcquireFuture {
        AcquireFuture::spawn(self.clone(), key.to_string(), lease.into(), max_wait)
    }

    /// Acquire and wrap the handle in a guard that releases it when dropped.
    pub async fn lock_guard(
        &self,
        key: &str,
        lease: impl Into<Lease>,
        max_wait: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<LockGuard> {
        let handle = self.acquire(key, lease, max_wait, cancel).await?;
        Ok(LockGuard::new(self.clone(), handle))
    }

    /// Release the lock if `handle` still owns it.
    ///
    /// # Returns
    ///
    /// `Ok(true)` if the store entry was deleted. `Ok(false)` if it had
    /// already expired or belongs to another owner, or if the handle was
    /// released before.
    ///
    /// # Errors
    ///
    /// * `DistributedLockError::StoreUnavailable` - Ownership is unknown; the handle keeps its previous state.
    pub async fn release(&self, handle: &LockHandle) -> Result<bool> {
        let previous = match handle.transition_any(&[LockState::Held, LockState::Expired], LockState::Releasing) {
            Some(previous) => previous,
            None => {
                debug!("lock {} is not held by this handle (state {})", handle.key(), handle.state());
                return Ok(false);
            }
        };
        self.inner.watchdog.detach(handle).await;

        match self.inner.executor.compare_and_delete(handle.key(), handle.owner_token()).await {
            Ok(deleted) => {
                handle.transition(LockState::Releasing, LockState::Unlocked);
                if deleted == 1 {
                    debug!("released lock {}", handle.key());
                    Ok(true)
                } else {
                    warn!("lock {} was no longer owned when released", handle.key());
                    Ok(false)
                }
            }
            Err(e) => {
                handle.transition(LockState::Releasing, previous);
                if previous == LockState::Held {
                    self.inner.watchdog.attach(handle, self.renewer());
                }
                Err(e)
            }
        }
    }

    /// Reset the lease of a held lock to `new_lease` if `handle` still owns it.
    ///
    /// A `false` result means ownership was lost; the handle is marked expired.
    pub async fn renew(&self, handle: &LockHandle, new_lease: Duration) -> Result<bool> {
        self.inner.renew(handle, new_lease).await
    }

    /// Whether any owner currently holds `key`.
    pub async fn is_locked(&self, key: &str) -> Result<bool> {
        Ok(self.inner.executor.store().get(key).await?.is_some())
    }

    /// Owner token currently stored under `key`.
    pub async fn current_owner(&self, key: &str) -> Result<Option<String>> {
        Ok(self.inner.executor.store().get(key).await?)
    }

    /// Lease left on `key` according to the store.
    pub async fn remaining_lease(&self, key: &str) -> Result<Option<Duration>> {
        Ok(self.inner.executor.store().pttl(key).await?)
    }

    /// Delete `key` regardless of its owner.
    ///
    /// Administrative escape hatch; breaks mutual exclusion for whoever holds the lock.
    pub async fn force_release(&self, key: &str) -> Result<bool> {
        let removed = self.inner.executor.store().del(key).await?;
        if removed {
            warn!("lock {} force released", key);
        }
        Ok(removed)
    }

    /// Stop every watchdog and wait for them to finish.
    ///
    /// Locks stay in the store until their lease lapses or they are released.
    pub async fn shutdown(&self) {
        self.inner.watchdog.shutdown().await;
    }

    /// Release `handle` on a background task. Used where no caller can await.
    pub(crate) fn release_in_background(&self, handle: LockHandle) {
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let manager = self.clone();
                runtime.spawn(async move {
                    if let Err(e) = manager.release(&handle).await {
                        error!("Failed to release lock {}: {}", handle.key(), e);
                    }
                });
            }
            Err(_) => error!(
                "no async runtime to release lock {}, it stays until its lease lapses",
                handle.key()
            ),
        }
    }

    fn resolve_lease(&self, key: &str, lease: Lease) -> Result<(Duration, bool)> {
        if key.is_empty() {
            return Err(DistributedLockError::InvalidArgument("lock key must not be empty".to_string()));
        }
        match lease {
            Lease::Watchdog => Ok((self.inner.config.default_lease(), true)),
            Lease::Fixed(duration) => Ok((checked_lease(duration)?, false)),
        }
    }

    fn next_owner_token(&self) -> String {
        format!("{}:{}", self.inner.instance_id, Uuid::new_v4().simple())
    }

    fn renewer(&self) -> Arc<dyn LeaseRenewer> {
        Arc::new(ManagerRenewer(Arc::downgrade(&self.inner)))
    }
}

/// A lease must be positive and expressible as whole milliseconds in a `u64`.
fn checked_lease(lease: Duration) -> Result<Duration> {
    if lease.is_zero() {
        return Err(DistributedLockError::InvalidArgument("lease must be positive".to_string()));
    }
    if u64::try_from(lease.as_millis()).is_err() {
        return Err(DistributedLockError::InvalidArgument(format!("lease of {:?} is out of range", lease)));
    }
    Ok(lease)
}

impl ManagerInner {
    async fn renew(&self, handle: &LockHandle, new_lease: Duration) -> Result<bool> {
        checked_lease(new_lease)?;
        if !handle.is_held() {
            return Ok(false);
        }
        let updated = self
            .executor
            .compare_and_extend(handle.key(), handle.owner_token(), new_lease)
            .await?;
        if updated == 1 {
            handle.mark_renewed(new_lease);
            trace!("renewed lock {} for {:?}", handle.key(), new_lease);
            Ok(true)
        } else {
            if handle.transition(LockState::Held, LockState::Expired) {
                warn!("lock {} lost ownership before renewal", handle.key());
            }
            Ok(false)
        }
    }
}

/// Renewer handed to watchdog tasks. Holds the manager weakly so running
/// watchdogs do not keep a dropped manager alive.
struct ManagerRenewer(Weak<ManagerInner>);

#[async_trait]
impl LeaseRenewer for ManagerRenewer {
    async fn renew(&self, handle: &LockHandle, lease: Duration) -> Result<bool> {
        match self.0.upgrade() {
            Some(inner) => inner.renew(handle, lease).await,
            None => Ok(false),
        }
    }
}

impl fmt::Debug for LockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockManager")
            .field("instance_id", &self.inner.instance_id)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}
