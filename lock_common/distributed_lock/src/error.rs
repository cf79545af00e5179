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

use cache::StoreError;
use thiserror::Error;

/// Hard failures of lock operations.
///
/// Contention and loss of ownership are not errors: `try_acquire` answers
/// `Ok(None)` and `release`/`renew` answer `Ok(false)`.
#[derive(Debug, Error)]
pub enum DistributedLockError {
    /// The store could not be reached; lock ownership is unknown.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("Lock acquisition timeout")]
    AcquireTimeout,

    #[error("Lock acquisition interrupted")]
    Interrupted,

    #[error("Parameter error: {0}")]
    InvalidArgument(String),

    #[error("Lock acquisition task failed: {0}")]
    TaskFailed(String),
}

impl DistributedLockError {
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, DistributedLockError::StoreUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, DistributedLockError>;
