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

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::script::LockScript;

/// Minimal set of atomic store primitives the lock engine relies on.
///
/// Implementations must make every method a single atomic operation on the
/// store side. TTLs are carried with millisecond precision.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Sets `key` to `value` with the given TTL only if `key` does not exist.
    ///
    /// # Returns
    ///
    /// Returns `Ok(true)` if the value was written, `Ok(false)` if the key was already present.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool>;

    /// Gets the value stored under `key`, `None` if absent or expired.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Deletes `key` unconditionally. Returns whether an entry was removed.
    async fn del(&self, key: &str) -> StoreResult<bool>;

    /// Resets the TTL of `key`. Returns `Ok(false)` if the key does not exist.
    async fn pexpire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// Remaining TTL of `key`, `None` if the key is absent or has no expiry.
    async fn pttl(&self, key: &str) -> StoreResult<Option<Duration>>;

    /// Evaluates one of the predefined atomic scripts.
    ///
    /// # Arguments
    ///
    /// * `script` - The script to run.
    /// * `keys` - Values bound to `KEYS`.
    /// * `args` - Values bound to `ARGV`.
    ///
    /// # Errors
    ///
    /// * `StoreError::ConnectionError` - If the store cannot be reached.
    /// * `StoreError::UnexpectedReply` - If the arguments or the reply do not match the script contract.
    async fn eval_script(&self, script: LockScript, keys: &[&str], args: &[String]) -> StoreResult<i64>;
}
