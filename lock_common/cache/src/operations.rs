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

use crate::client::RedisClient;
use crate::error::{StoreError, StoreResult};
use crate::script::LockScript;
use crate::store::StoreClient;

/// Redis rejects a zero PX, so sub-millisecond TTLs are rounded up.
pub(crate) fn ttl_millis(ttl: Duration) -> StoreResult<u64> {
    let millis = u64::try_from(ttl.as_millis())
        .map_err(|_| StoreError::OperationError(format!("TTL of {:?} does not fit in milliseconds", ttl)))?;
    Ok(millis.max(1))
}

#[async_trait]
impl StoreClient for RedisClient {
    /// Issues `SET key value NX PX ttl`.
    ///
    /// # Errors
    /// * `StoreError::ConnectionError` - If there is an error talking to Redis.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl)?)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn del(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(removed > 0)
    }

    async fn pexpire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let updated: i64 = redis::cmd("PEXPIRE")
            .arg(key)
            .arg(ttl_millis(ttl)?)
            .query_async(&mut conn)
            .await?;
        Ok(updated == 1)
    }

    /// `PTTL` answers -2 for a missing key and -1 for a key without expiry.
    async fn pttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        let mut conn = self.conn.clone();
        let ttl: i64 = redis::cmd("PTTL").arg(key).query_async(&mut conn).await?;
        if ttl > 0 {
            Ok(Some(Duration::from_millis(ttl as u64)))
        } else {
            Ok(None)
        }
    }

    /// Runs the script through `EVALSHA`, falling back to `EVAL` when the
    /// server has not cached it yet.
    async fn eval_script(&self, script: LockScript, keys: &[&str], args: &[String]) -> StoreResult<i64> {
        let mut invocation = self.script(script).prepare_invoke();
        for key in keys {
            invocation.key(*key);
        }
        for arg in args {
            invocation.arg(arg.as_str());
        }
        let mut conn = self.conn.clone();
        let result: redis::Value = invocation.invoke_async(&mut conn).await?;
        match result {
            redis::Value::Int(count) => Ok(count),
            other => Err(StoreError::UnexpectedReply(format!(
                "{} returned {:?}",
                script.name(),
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_millis_never_zero() {
        assert_eq!(ttl_millis(Duration::from_micros(10)).unwrap(), 1);
        assert_eq!(ttl_millis(Duration::from_secs(2)).unwrap(), 2000);
    }

    #[test]
    fn test_ttl_millis_rejects_overflow() {
        assert!(matches!(ttl_millis(Duration::MAX), Err(StoreError::OperationError(_))));
    }
}
