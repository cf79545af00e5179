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

use std::env;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use log::{debug, info};
use serde::Deserialize;

use crate::error::{DistributedLockError, Result};

const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379/";
const DEFAULT_LEASE_MS: u64 = 30_000;
const DEFAULT_POLL_MIN_MS: u64 = 50;
const DEFAULT_POLL_MAX_MS: u64 = 200;
const DEFAULT_WATCHDOG_DIVISOR: u32 = 3;
const DEFAULT_RENEW_RETRY_MS: u64 = 100;

/// Lock engine settings.
///
/// Loaded from the `distributed_lock` section of a YAML file, then
/// overridden by environment variables.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LockConfig {
    /// Redis connection string, overridden by `REDIS_URL`
    pub redis_url: String,
    /// Lease used when the caller does not pick one; such locks are renewed by the watchdog
    pub default_lease_ms: u64,
    /// Lower bound of the jittered polling interval
    pub poll_interval_min_ms: u64,
    /// Upper bound of the jittered polling interval
    pub poll_interval_max_ms: u64,
    /// The watchdog renews every `lease / watchdog_divisor`
    pub watchdog_divisor: u32,
    /// Pause between renewal attempts after a store failure
    pub renew_retry_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            redis_url: DEFAULT_REDIS_URL.to_string(),
            default_lease_ms: DEFAULT_LEASE_MS,
            poll_interval_min_ms: DEFAULT_POLL_MIN_MS,
            poll_interval_max_ms: DEFAULT_POLL_MAX_MS,
            watchdog_divisor: DEFAULT_WATCHDOG_DIVISOR,
            renew_retry_interval_ms: DEFAULT_RENEW_RETRY_MS,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    distributed_lock: LockConfig,
}

impl LockConfig {
    /// Parse the `distributed_lock` section of a YAML document.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let file: ConfigFile = serde_yaml::from_str(content)
            .map_err(|e| DistributedLockError::InvalidArgument(format!("Failed to parse YAML: {}", e)))?;
        Ok(file.distributed_lock)
    }

    /// Read and parse a YAML configuration file.
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DistributedLockError::InvalidArgument(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Full load chain: defaults or YAML file, `.env`, process environment, validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Ok(env_file) = dotenv::dotenv() {
            debug!("load .env file: {}", env_file.display());
        }
        let mut config = match path {
            Some(path) => Self::from_yaml(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `REDIS_URL` and the `LOCK_*` variables.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = env::var("REDIS_URL") {
            self.redis_url = url;
        }
        override_from_env("LOCK_DEFAULT_LEASE_MS", &mut self.default_lease_ms)?;
        override_from_env("LOCK_POLL_MIN_MS", &mut self.poll_interval_min_ms)?;
        override_from_env("LOCK_POLL_MAX_MS", &mut self.poll_interval_max_ms)?;
        override_from_env("LOCK_WATCHDOG_DIVISOR", &mut self.watchdog_divisor)?;
        override_from_env("LOCK_RENEW_RETRY_MS", &mut self.renew_retry_interval_ms)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_lease_ms == 0 {
            return Err(DistributedLockError::InvalidArgument("default_lease_ms must be positive".to_string()));
        }
        if self.poll_interval_min_ms == 0 || self.poll_interval_min_ms > self.poll_interval_max_ms {
            return Err(DistributedLockError::InvalidArgument(format!(
                "poll interval range {}..={} ms is invalid",
                self.poll_interval_min_ms, self.poll_interval_max_ms
            )));
        }
        if self.watchdog_divisor < 2 {
            return Err(DistributedLockError::InvalidArgument(format!(
                "watchdog_divisor must be at least 2, got {}",
                self.watchdog_divisor
            )));
        }
        if self.renew_retry_interval_ms == 0 {
            return Err(DistributedLockError::InvalidArgument("renew_retry_interval_ms must be positive".to_string()));
        }
        Ok(())
    }

    pub fn default_lease(&self) -> Duration {
        Duration::from_millis(self.default_lease_ms)
    }

    pub fn poll_interval_min(&self) -> Duration {
        Duration::from_millis(self.poll_interval_min_ms)
    }

    pub fn poll_interval_max(&self) -> Duration {
        Duration::from_millis(self.poll_interval_max_ms)
    }

    pub fn renew_retry_interval(&self) -> Duration {
        Duration::from_millis(self.renew_retry_interval_ms)
    }
}

fn override_from_env<T: std::str::FromStr>(name: &str, field: &mut T) -> Result<()> {
    if let Ok(raw) = env::var(name) {
        *field = raw
            .trim()
            .parse()
            .map_err(|_| DistributedLockError::InvalidArgument(format!("{} has an invalid value: {}", name, raw)))?;
    }
    Ok(())
}

/// Process-wide configuration, set once at startup.
pub static LOCK_CONFIG: OnceLock<LockConfig> = OnceLock::new();

/// Load the configuration into `LOCK_CONFIG`. Later calls return the first value.
pub fn init_global(path: Option<&Path>) -> Result<&'static LockConfig> {
    if let Some(config) = LOCK_CONFIG.get() {
        return Ok(config);
    }
    let config = LockConfig::load(path)?;
    info!("distributed lock config loaded: {:?}", config);
    Ok(LOCK_CONFIG.get_or_init(|| config))
}

pub fn global() -> Result<&'static LockConfig> {
    LOCK_CONFIG
        .get()
        .ok_or_else(|| DistributedLockError::InvalidArgument("Configuration not initialized".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn clear_env() {
        for name in [
            "REDIS_URL",
            "LOCK_DEFAULT_LEASE_MS",
            "LOCK_POLL_MIN_MS",
            "LOCK_POLL_MAX_MS",
            "LOCK_WATCHDOG_DIVISOR",
            "LOCK_RENEW_RETRY_MS",
        ] {
            env::remove_var(name);
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = LockConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_lease(), Duration::from_secs(30));
        assert_eq!(config.watchdog_divisor, 3);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = LockConfig::from_yaml_str(
            "distributed_lock:\n  default_lease_ms: 5000\n  poll_interval_max_ms: 400\n",
        )
        .unwrap();
        assert_eq!(config.default_lease_ms, 5000);
        assert_eq!(config.poll_interval_max_ms, 400);
        assert_eq!(config.poll_interval_min_ms, DEFAULT_POLL_MIN_MS);
    }

    #[test]
    fn test_missing_section_uses_defaults() {
        let config = LockConfig::from_yaml_str("other: 1\n").unwrap();
        assert_eq!(config, LockConfig::default());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = LockConfig::default();
        config.poll_interval_min_ms = 500;
        assert!(config.validate().is_err());

        let mut config = LockConfig::default();
        config.watchdog_divisor = 1;
        assert!(config.validate().is_err());

        let mut config = LockConfig::default();
        config.default_lease_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_load_from_file_with_env_override() {
        clear_env();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "distributed_lock:\n  redis_url: redis://from-file:6379/\n  watchdog_divisor: 4").unwrap();

        env::set_var("REDIS_URL", "redis://from-env:6379/");
        env::set_var("LOCK_POLL_MIN_MS", "20");
        let config = LockConfig::load(Some(file.path())).unwrap();
        clear_env();

        assert_eq!(config.redis_url, "redis://from-env:6379/");
        assert_eq!(config.poll_interval_min_ms, 20);
        assert_eq!(config.watchdog_divisor, 4);
    }

    #[test]
    #[serial]
    fn test_invalid_env_value_is_rejected() {
        clear_env();
        env::set_var("LOCK_WATCHDOG_DIVISOR", "three");
        let result = LockConfig::load(None);
        clear_env();
        assert!(matches!(result, Err(DistributedLockError::InvalidArgument(_))));
    }

    #[test]
    #[serial]
    fn test_global_config_is_set_once() {
        clear_env();
        let mut first = tempfile::NamedTempFile::new().unwrap();
        writeln!(first, "distributed_lock:\n  watchdog_divisor: 5").unwrap();
        let mut second = tempfile::NamedTempFile::new().unwrap();
        writeln!(second, "distributed_lock:\n  watchdog_divisor: 6").unwrap();

        let loaded = init_global(Some(first.path())).unwrap();
        assert_eq!(loaded.watchdog_divisor, 5);
        assert_eq!(init_global(Some(second.path())).unwrap().watchdog_divisor, 5);
        assert!(std::ptr::eq(global().unwrap(), loaded));
    }
}
