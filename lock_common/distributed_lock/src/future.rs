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

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use log::{debug, warn};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{DistributedLockError, Result};
use crate::handle::{Lease, LockHandle};
use crate::manager::LockManager;

#[derive(Default)]
struct Slot {
    result: Option<Result<LockHandle>>,
    abandoned: bool,
}

/// Acquisition running on a background task.
///
/// Resolves exactly once with the handle or with `AcquireTimeout`,
/// `Interrupted` or `StoreUnavailable`. [`AcquireFuture::cancel`] stops the
/// polling; if the store write had already succeeded the handle is still
/// delivered and the caller must release it.
///
/// Dropping the future before it resolves cancels the acquisition, and a
/// lock the background task obtains anyway is released on its behalf.
pub struct AcquireFuture {
    manager: LockManager,
    join: JoinHandle<()>,
    slot: Arc<Mutex<Slot>>,
    cancel: CancellationToken,
    resolved: bool,
}

impl AcquireFuture {
    pub(crate) fn spawn(manager: LockManager, key: String, lease: Lease, max_wait: Option<Duration>) -> Self {
        let cancel = CancellationToken::new();
        let slot = Arc::new(Mutex::new(Slot::default()));

        let task_manager = manager.clone();
        let task_cancel = cancel.clone();
        let task_slot = Arc::clone(&slot);
        let join = tokio::spawn(async move {
            let result = task_manager.acquire(&key, lease, max_wait, &task_cancel).await;
            let orphan = {
                let mut slot = task_slot.lock();
                if slot.abandoned {
                    result.ok()
                } else {
                    slot.result = Some(result);
                    None
                }
            };
            if let Some(handle) = orphan {
                warn!("acquisition of lock {} was abandoned, releasing it", key);
                task_manager.release_in_background(handle);
            }
        });

        Self {
            manager,
            join,
            slot,
            cancel,
            resolved: false,
        }
    }

    /// Request interruption. Observed within one polling interval.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that interrupts this acquisition when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

impl Future for AcquireFuture {
    type Output = Result<LockHandle>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.resolved {
            return Poll::Ready(Err(DistributedLockError::TaskFailed("acquisition already resolved".to_string())));
        }
        let outcome = match Pin::new(&mut this.join).poll(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(Ok(())) => this
                .slot
                .lock()
                .result
                .take()
                .unwrap_or_else(|| Err(DistributedLockError::TaskFailed("acquisition produced no result".to_string()))),
            Poll::Ready(Err(e)) if e.is_cancelled() => Err(DistributedLockError::Interrupted),
            Poll::Ready(Err(e)) => Err(DistributedLockError::TaskFailed(e.to_string())),
        };
        this.resolved = true;
        Poll::Ready(outcome)
    }
}

impl Drop for AcquireFuture {
    fn drop(&mut self) {
        if self.resolved {
            return;
        }
        self.cancel.cancel();
        let delivered = {
            let mut slot = self.slot.lock();
            slot.abandoned = true;
            slot.result.take()
        };
        if let Some(Ok(handle)) = delivered {
            debug!("releasing lock {} acquired by a dropped future", handle.key());
            self.manager.release_in_background(handle);
        }
    }
}
