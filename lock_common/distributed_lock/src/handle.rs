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
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::watch;

/// Lifecycle of one lock acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockState {
    /// Released by its owner; terminal
    Unlocked,
    /// Acquisition in progress
    Acquiring,
    /// Store entry written with this handle's token
    Held,
    /// Release in flight
    Releasing,
    /// Lease lapsed or ownership lost; terminal for the watchdog
    Expired,
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LockState::Unlocked => "UNLOCKED",
            LockState::Acquiring => "ACQUIRING",
            LockState::Held => "HELD",
            LockState::Releasing => "RELEASING",
            LockState::Expired => "EXPIRED",
        };
        f.write_str(name)
    }
}

/// How long an acquired lock lives in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lease {
    /// Configured default lease, kept alive by the watchdog until release
    Watchdog,
    /// Caller-chosen lease; never renewed automatically
    Fixed(Duration),
}

impl From<Duration> for Lease {
    fn from(duration: Duration) -> Self {
        Lease::Fixed(duration)
    }
}

impl From<Option<Duration>> for Lease {
    fn from(duration: Option<Duration>) -> Self {
        duration.map_or(Lease::Watchdog, Lease::Fixed)
    }
}

#[derive(Debug, Default)]
struct Timing {
    acquired_at: Option<Instant>,
    renewed_at: Option<Instant>,
    lease: Duration,
}

#[derive(Debug)]
struct HandleInner {
    key: String,
    owner_token: String,
    watchdog: bool,
    state: watch::Sender<LockState>,
    timing: Mutex<Timing>,
}

/// One acquisition of a distributed lock.
///
/// Clones share state; the owner and its watchdog each hold one. All state
/// changes go through compare-and-swap transitions, so a release and a
/// renewal racing on the same handle cannot both win.
#[derive(Debug, Clone)]
pub struct LockHandle {
    inner: Arc<HandleInner>,
}

impl LockHandle {
    pub(crate) fn new(key: &str, owner_token: String, lease: Duration, watchdog: bool) -> Self {
        let (state, _) = watch::channel(LockState::Acquiring);
        Self {
            inner: Arc::new(HandleInner {
                key: key.to_string(),
                owner_token,
                watchdog,
                state,
                timing: Mutex::new(Timing {
                    lease,
                    ..Timing::default()
                }),
            }),
        }
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    pub fn owner_token(&self) -> &str {
        &self.inner.owner_token
    }

    /// Lease written by the last successful acquire or renew
    pub fn lease(&self) -> Duration {
        self.inner.timing.lock().lease
    }

    /// Whether the watchdog keeps this lock alive
    pub fn is_watchdog_enabled(&self) -> bool {
        self.inner.watchdog
    }

    pub fn state(&self) -> LockState {
        *self.inner.state.borrow()
    }

    pub fn is_held(&self) -> bool {
        self.state() == LockState::Held
    }

    /// The protected section must be treated as unsafe once this is true.
    pub fn is_expired(&self) -> bool {
        self.state() == LockState::Expired
    }

    pub fn acquired_at(&self) -> Option<Instant> {
        self.inner.timing.lock().acquired_at
    }

    /// Local estimate of the lease left, measured from the last write of
    /// the TTL. Does not consult the store.
    pub fn remaining_lease(&self) -> Duration {
        if !self.is_held() {
            return Duration::ZERO;
        }
        let timing = self.inner.timing.lock();
        match timing.renewed_at {
            Some(at) => timing.lease.saturating_sub(at.elapsed()),
            None => Duration::ZERO,
        }
    }

    /// Resolves once the handle is released or expired and returns that state.
    pub async fn wait_until_ended(&self) -> LockState {
        let mut rx = self.inner.state.subscribe();
        let ended = rx
            .wait_for(|state| matches!(state, LockState::Unlocked | LockState::Expired))
            .await
            .map(|state| *state);
        // The sender lives as long as `self`, so the channel cannot close here.
        ended.unwrap_or(LockState::Expired)
    }

    /// Atomically moves `from -> to`. Returns false if the state was not `from`.
    pub(crate) fn transition(&self, from: LockState, to: LockState) -> bool {
        self.transition_any(&[from], to).is_some()
    }

    /// Atomically moves to `to` from any state in `from`, returning the
    /// previous state on success.
    pub(crate) fn transition_any(&self, from: &[LockState], to: LockState) -> Option<LockState> {
        let mut previous = None;
        self.inner.state.send_if_modified(|state| {
            if from.contains(state) {
                previous = Some(*state);
                *state = to;
                true
            } else {
                false
            }
        });
        previous
    }

    pub(crate) fn mark_acquired(&self) -> bool {
        let now = Instant::now();
        {
            let mut timing = self.inner.timing.lock();
            timing.acquired_at = Some(now);
            timing.renewed_at = Some(now);
        }
        self.transition(LockState::Acquiring, LockState::Held)
    }

    pub(crate) fn mark_renewed(&self, lease: Duration) {
        let mut timing = self.inner.timing.lock();
        timing.renewed_at = Some(Instant::now());
        timing.lease = lease;
    }

    /// Instant at which the store entry lapses unless renewed again.
    pub(crate) fn lease_deadline(&self) -> Option<Instant> {
        let timing = self.inner.timing.lock();
        timing.renewed_at.and_then(|at| at.checked_add(timing.lease))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> LockHandle {
        LockHandle::new("k", "token".to_string(), Duration::from_secs(1), true)
    }

    #[test]
    fn test_new_handle_is_acquiring() {
        let handle = handle();
        assert_eq!(handle.state(), LockState::Acquiring);
        assert_eq!(handle.remaining_lease(), Duration::ZERO);
        assert!(handle.acquired_at().is_none());
    }

    #[test]
    fn test_transition_requires_expected_state() {
        let handle = handle();
        assert!(handle.mark_acquired());
        assert!(!handle.mark_acquired());
        assert!(!handle.transition(LockState::Releasing, LockState::Unlocked));
        assert_eq!(
            handle.transition_any(&[LockState::Held, LockState::Expired], LockState::Releasing),
            Some(LockState::Held)
        );
        assert_eq!(handle.state(), LockState::Releasing);
    }

    #[test]
    fn test_clones_share_state() {
        let handle = handle();
        let watchdog_view = handle.clone();
        handle.mark_acquired();
        assert!(watchdog_view.transition(LockState::Held, LockState::Expired));
        assert!(handle.is_expired());
        assert!(!handle.transition(LockState::Held, LockState::Releasing));
    }

    #[test]
    fn test_remaining_lease_counts_down() {
        let handle = handle();
        handle.mark_acquired();
        let remaining = handle.remaining_lease();
        assert!(remaining <= Duration::from_secs(1));
        assert!(remaining > Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_wait_until_ended_sees_expiry() {
        let handle = handle();
        handle.mark_acquired();
        let waiter = handle.clone();
        let task = tokio::spawn(async move { waiter.wait_until_ended().await });
        tokio::task::yield_now().await;
        handle.transition(LockState::Held, LockState::Expired);
        assert_eq!(task.await.unwrap(), LockState::Expired);
    }

    #[test]
    fn test_lease_from_option() {
        assert_eq!(Lease::from(None), Lease::Watchdog);
        assert_eq!(Lease::from(Some(Duration::from_secs(2))), Lease::Fixed(Duration::from_secs(2)));
    }
}
