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

use log::info;
use redis::aio::ConnectionManager;
use redis::{Client, Script};

use crate::error::{StoreError, StoreResult};
use crate::script::LockScript;

/// Async Redis client shared by every lock operation.
///
/// Cloning is cheap: the connection manager multiplexes one connection and
/// reconnects on its own after transport failures.
#[derive(Clone)]
pub struct RedisClient {
    pub(crate) conn: ConnectionManager,
    scripts: Arc<LoadedScripts>,
}

pub(crate) struct LoadedScripts {
    compare_and_delete: Script,
    compare_and_extend: Script,
}

impl LoadedScripts {
    fn new() -> Self {
        Self {
            compare_and_delete: Script::new(LockScript::CompareAndDelete.body()),
            compare_and_extend: Script::new(LockScript::CompareAndExtend.body()),
        }
    }

    pub(crate) fn get(&self, script: LockScript) -> &Script {
        match script {
            LockScript::CompareAndDelete => &self.compare_and_delete,
            LockScript::CompareAndExtend => &self.compare_and_extend,
        }
    }
}

impl RedisClient {
    /// Connect to the Redis instance at `redis_url`.
    ///
    /// # Errors
    ///
    /// * `StoreError::ConnectionError` - If the URL is invalid or the first connection fails.
    pub async fn connect(redis_url: &str) -> StoreResult<Self> {
        let client = Client::open(redis_url).map_err(StoreError::ConnectionError)?;
        let conn = client
            .get_tokio_connection_manager()
            .await
            .map_err(StoreError::ConnectionError)?;
        info!("connected to redis at {}", redact(redis_url));
        Ok(Self {
            conn,
            scripts: Arc::new(LoadedScripts::new()),
        })
    }

    /// Connect using the address in the `REDIS_URL` environment variable.
    pub async fn from_env() -> StoreResult<Self> {
        let redis_url = std::env::var("REDIS_URL")
            .map_err(|_| StoreError::OperationError("REDIS_URL environment variable not set".to_string()))?;
        Self::connect(&redis_url).await
    }

    pub(crate) fn script(&self, script: LockScript) -> &Script {
        self.scripts.get(script)
    }
}

impl fmt::Debug for RedisClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisClient").finish_non_exhaustive()
    }
}

// Strip credentials before logging a connection string.
fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}***{}", &url[..scheme_end + 3], &url[at..])
        }
        _ => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::redact;

    #[test]
    fn test_redact_hides_password() {
        assert_eq!(redact("redis://:secret@127.0.0.1:6379/0"), "redis://***@127.0.0.1:6379/0");
        assert_eq!(redact("redis://127.0.0.1:6379/"), "redis://127.0.0.1:6379/");
    }
}
