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
use std::time::Duration;

use cache::{LockScript, StoreClient};
use log::error;

use crate::error::{DistributedLockError, Result};

/// Runs the ownership-checked scripts against the store.
///
/// Each call is one server-side atomic evaluation, so the stored value cannot
/// change between the owner check and the delete/extend.
#[derive(Clone)]
pub struct ScriptExecutor {
    store: Arc<dyn StoreClient>,
}

impl ScriptExecutor {
    pub fn new(store: Arc<dyn StoreClient>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn StoreClient> {
        &self.store
    }

    /// Delete `key` if it still holds `expected_token`.
    ///
    /// # Returns
    ///
    /// Number of entries deleted, 0 or 1.
    ///
    /// # Errors
    ///
    /// * `DistributedLockError::StoreUnavailable` - The store could not be reached; ownership is unknown.
    pub async fn compare_and_delete(&self, key: &str, expected_token: &str) -> Result<i64> {
        let args = [expected_token.to_string()];
        self.run(LockScript::CompareAndDelete, key, &args).await
    }

    /// Reset the TTL of `key` to `new_ttl` if it still holds `expected_token`.
    ///
    /// # Returns
    ///
    /// Number of entries updated, 0 or 1.
    ///
    /// # Errors
    ///
    /// * `DistributedLockError::InvalidArgument` - `new_ttl` does not fit in milliseconds.
    /// * `DistributedLockError::StoreUnavailable` - The store could not be reached.
    pub async fn compare_and_extend(&self, key: &str, expected_token: &str, new_ttl: Duration) -> Result<i64> {
        let ttl_ms = u64::try_from(new_ttl.as_millis())
            .map_err(|_| DistributedLockError::InvalidArgument(format!("TTL of {:?} is out of range", new_ttl)))?
            .max(1);
        let args = [expected_token.to_string(), ttl_ms.to_string()];
        self.run(LockScript::CompareAndExtend, key, &args).await
    }

    async fn run(&self, script: LockScript, key: &str, args: &[String]) -> Result<i64> {
        let count = self.store.eval_script(script, &[key], args).await.map_err(|e| {
            error!("{} failed for key {}: {}", script.name(), key, e);
            e
        })?;
        Ok(count)
    }
}

impl fmt::Debug for ScriptExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptExecutor").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cache::MemoryStore;

    #[tokio::test]
    async fn test_compare_and_delete_leaves_foreign_entry() {
        let store = Arc::new(MemoryStore::new());
        store.set_if_absent("k", "theirs", Duration::from_secs(5)).await.unwrap();
        let executor = ScriptExecutor::new(store.clone());

        assert_eq!(executor.compare_and_delete("k", "mine").await.unwrap(), 0);
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("theirs"));
        assert_eq!(executor.compare_and_delete("k", "theirs").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_compare_and_extend_on_missing_key() {
        let executor = ScriptExecutor::new(Arc::new(MemoryStore::new()));
        assert_eq!(
            executor.compare_and_extend("absent", "mine", Duration::from_secs(1)).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_compare_and_extend_rejects_unrepresentable_ttl() {
        let store = Arc::new(MemoryStore::new());
        store.set_if_absent("k", "mine", Duration::from_secs(5)).await.unwrap();
        let executor = ScriptExecutor::new(store);
        assert!(matches!(
            executor.compare_and_extend("k", "mine", Duration::MAX).await,
            Err(DistributedLockError::InvalidArgument(_))
        ));
    }
}
