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

//! Polling loop shared by every waiting acquisition path

use std::future::Future;
use std::time::Duration;

use log::trace;
use rand::Rng;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::LockConfig;
use crate::error::{DistributedLockError, Result};

/// Jittered polling interval, uniformly drawn from `[min, max]`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PollSchedule {
    min_ms: u64,
    max_ms: u64,
}

impl PollSchedule {
    pub(crate) fn new(min: Duration, max: Duration) -> Self {
        let min_ms = min.as_millis() as u64;
        let max_ms = (max.as_millis() as u64).max(min_ms);
        Self { min_ms, max_ms }
    }

    pub(crate) fn from_config(config: &LockConfig) -> Self {
        Self::new(config.poll_interval_min(), config.poll_interval_max())
    }

    pub(crate) fn next_interval(&self) -> Duration {
        Duration::from_millis(rand::thread_rng().gen_range(self.min_ms..=self.max_ms))
    }
}

/// Calls `attempt` until it yields a value, `max_wait` elapses or `cancel` fires.
///
/// Cancellation is checked before every attempt and raced against every
/// sleep, so it is observed within one polling interval. An attempt already
/// in flight is never abandoned: a value it produces is returned even if
/// cancellation fired meanwhile. `max_wait` of `None` waits indefinitely.
pub(crate) async fn poll_until<T, F, Fut>(
    schedule: PollSchedule,
    max_wait: Option<Duration>,
    cancel: &CancellationToken,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    // A wait too long to represent as an instant is the same as no limit
    let deadline = max_wait.and_then(|wait| Instant::now().checked_add(wait));
    let mut attempts: u32 = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(DistributedLockError::Interrupted);
        }
        attempts += 1;
        if let Some(value) = attempt().await? {
            return Ok(value);
        }

        let mut wait = schedule.next_interval();
        if let Some(deadline) = deadline {
            let now = Instant::now();
            if now >= deadline {
                trace!("giving up after {} attempts", attempts);
                return Err(DistributedLockError::AcquireTimeout);
            }
            wait = wait.min(deadline - now);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DistributedLockError::Interrupted),
            _ = tokio::time::sleep(wait) => {}
        }
    }
}
