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
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{StoreError, StoreResult};
use crate::script::LockScript;
use crate::store::StoreClient;

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |deadline| now < deadline)
    }
}

/// In-process store with Redis TTL semantics.
///
/// Every operation, scripts included, runs under a single mutex, so the
/// compare-and-act scripts are as atomic as their Lua counterparts.
/// Expired entries are dropped lazily on access. A TTL too large to
/// represent as an instant never lapses.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.lock().values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live_value<'a>(entries: &'a mut HashMap<String, MemoryEntry>, key: &str, now: Instant) -> Option<&'a mut MemoryEntry> {
        if entries.get(key).is_some_and(|e| !e.is_live(now)) {
            entries.remove(key);
        }
        entries.get_mut(key)
    }

    fn compare_and_delete(&self, key: &str, token: &str) -> i64 {
        let mut entries = self.entries.lock();
        let matches = Self::live_value(&mut entries, key, Instant::now()).is_some_and(|e| e.value == token);
        if matches {
            entries.remove(key);
            1
        } else {
            0
        }
    }

    fn compare_and_extend(&self, key: &str, token: &str, ttl: Duration) -> i64 {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match Self::live_value(&mut entries, key, now) {
            Some(entry) if entry.value == token => {
                entry.expires_at = now.checked_add(ttl);
                1
            }
            _ => 0,
        }
    }
}

fn script_arg<'a>(script: LockScript, args: &'a [String], index: usize) -> StoreResult<&'a str> {
    args.get(index).map(String::as_str).ok_or_else(|| {
        StoreError::UnexpectedReply(format!("{} expects ARGV[{}]", script.name(), index + 1))
    })
}

#[async_trait]
impl StoreClient for MemoryStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if Self::live_value(&mut entries, key, now).is_some() {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at: now.checked_add(ttl),
            },
        );
        Ok(true)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut entries = self.entries.lock();
        Ok(Self::live_value(&mut entries, key, Instant::now()).map(|e| e.value.clone()))
    }

    async fn del(&self, key: &str) -> StoreResult<bool> {
        let mut entries = self.entries.lock();
        let live = Self::live_value(&mut entries, key, Instant::now()).is_some();
        entries.remove(key);
        Ok(live)
    }

    async fn pexpire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match Self::live_value(&mut entries, key, now) {
            Some(entry) => {
                entry.expires_at = now.checked_add(ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn pttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        Ok(Self::live_value(&mut entries, key, now)
            .and_then(|e| e.expires_at)
            .map(|deadline| deadline.saturating_duration_since(now)))
    }

    async fn eval_script(&self, script: LockScript, keys: &[&str], args: &[String]) -> StoreResult<i64> {
        let key = keys.first().ok_or_else(|| {
            StoreError::UnexpectedReply(format!("{} expects KEYS[1]", script.name()))
        })?;
        let token = script_arg(script, args, 0)?;
        match script {
            LockScript::CompareAndDelete => Ok(self.compare_and_delete(key, token)),
            LockScript::CompareAndExtend => {
                let ttl_ms: u64 = script_arg(script, args, 1)?.parse().map_err(|_| {
                    StoreError::UnexpectedReply(format!("{} expects an integer TTL", script.name()))
                })?;
                Ok(self.compare_and_extend(key, token, Duration::from_millis(ttl_ms)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_if_absent_respects_existing_entry() {
        let store = MemoryStore::new();
        assert!(store.set_if_absent("k", "a", Duration::from_secs(5)).await.unwrap());
        assert!(!store.set_if_absent("k", "b", Duration::from_secs(5)).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_entry_expires() {
        let store = MemoryStore::new();
        store.set_if_absent("k", "a", Duration::from_millis(30)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.set_if_absent("k", "b", Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_unrepresentable_ttl_never_lapses() {
        let store = MemoryStore::new();
        assert!(store.set_if_absent("k", "a", Duration::MAX).await.unwrap());
        assert_eq!(store.pttl("k").await.unwrap(), None);
        assert!(store.pexpire("k", Duration::MAX).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_compare_and_delete_checks_owner() {
        let store = MemoryStore::new();
        store.set_if_absent("k", "owner", Duration::from_secs(5)).await.unwrap();

        let other = vec!["intruder".to_string()];
        assert_eq!(store.eval_script(LockScript::CompareAndDelete, &["k"], &other).await.unwrap(), 0);
        assert!(store.get("k").await.unwrap().is_some());

        let owner = vec!["owner".to_string()];
        assert_eq!(store.eval_script(LockScript::CompareAndDelete, &["k"], &owner).await.unwrap(), 1);
        assert!(store.get("k").await.unwrap().is_none());
        assert_eq!(store.eval_script(LockScript::CompareAndDelete, &["k"], &owner).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_compare_and_extend_resets_ttl_for_owner_only() {
        let store = MemoryStore::new();
        store.set_if_absent("k", "owner", Duration::from_millis(100)).await.unwrap();

        let wrong = vec!["other".to_string(), "10000".to_string()];
        assert_eq!(store.eval_script(LockScript::CompareAndExtend, &["k"], &wrong).await.unwrap(), 0);
        assert!(store.pttl("k").await.unwrap().unwrap() <= Duration::from_millis(100));

        let right = vec!["owner".to_string(), "10000".to_string()];
        assert_eq!(store.eval_script(LockScript::CompareAndExtend, &["k"], &right).await.unwrap(), 1);
        assert!(store.pttl("k").await.unwrap().unwrap() > Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_eval_script_rejects_missing_arguments() {
        let store = MemoryStore::new();
        let only_token = vec!["owner".to_string()];
        let err = store.eval_script(LockScript::CompareAndExtend, &["k"], &only_token).await;
        assert!(matches!(err, Err(StoreError::UnexpectedReply(_))));
        let err = store.eval_script(LockScript::CompareAndDelete, &[], &only_token).await;
        assert!(matches!(err, Err(StoreError::UnexpectedReply(_))));
    }
}
