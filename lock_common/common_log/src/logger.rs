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


use crate::config::{LogConfig, LoggerConfig};
use chrono::{DateTime, Local};
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger as SizeBasedTriggerPolicy;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::{
    append::rolling_file::RollingFileAppender,
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
    Config, Handle,
};
use std::env;
use std::path::{Path, PathBuf};

const LOG_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S:%3f)} {l} [{M}:{L}] - {m}{n}";
const ROOT_APPENDER: &str = "root_appender";

pub struct Logger {
    #[allow(dead_code)]
    handle: Handle,
}

impl Logger {
    pub fn new_from_yaml(config_path: impl Into<PathBuf>) -> Result<Self, Box<dyn std::error::Error>> {
        let config = LogConfig::from_yaml(config_path)?;
        Self::new_from_config(config)
    }

    pub fn new_from_config(config: LogConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let handle = log4rs::init_config(Self::build_config(&config)?)?;
        Ok(Self { handle })
    }

    /// Console only, used when no logging file is given.
    pub fn new_console(level: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let handle = log4rs::init_config(Self::console_config(level)?)?;
        Ok(Self { handle })
    }

    pub(crate) fn build_config(config: &LogConfig) -> Result<Config, Box<dyn std::error::Error>> {
        match dotenv::dotenv() {
            Ok(path) => log::debug!("load .env file: {}", path.display()),
            Err(e) => log::debug!(".env not loaded: {}", e),
        }
        let base_dir = Self::output_dir(config);
        let mut log4rs_config = Config::builder();

        // One appender and logger per module prefix
        for logger_config in config.module_loggers() {
            let appender = Self::create_appender(&base_dir, logger_config)?;
            let appender_name = format!("{}_appender", logger_config.path_prefix);
            log4rs_config = log4rs_config.appender(Appender::builder().build(&appender_name, Box::new(appender)));

            let logger = log4rs::config::Logger::builder()
                .appender(appender_name)
                .additive(false)
                .build(logger_config.path_prefix.clone(), Self::parse_level(&logger_config.level));
            log4rs_config = log4rs_config.logger(logger);
        }

        let root = match config.get_root_config() {
            Some(root_config) => {
                let root_appender = Self::create_appender(&base_dir, root_config)?;
                log4rs_config =
                    log4rs_config.appender(Appender::builder().build(ROOT_APPENDER, Box::new(root_appender)));
                Root::builder()
                    .appender(ROOT_APPENDER)
                    .build(Self::parse_level(&root_config.level))
            }
            None => {
                let console = ConsoleAppender::builder()
                    .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
                    .build();
                log4rs_config = log4rs_config.appender(Appender::builder().build(ROOT_APPENDER, Box::new(console)));
                Root::builder().appender(ROOT_APPENDER).build(LevelFilter::Info)
            }
        };
        Ok(log4rs_config.build(root)?)
    }

    fn console_config(level: &str) -> Result<Config, Box<dyn std::error::Error>> {
        let console = ConsoleAppender::builder()
            .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
            .build();
        let config = Config::builder()
            .appender(Appender::builder().build(ROOT_APPENDER, Box::new(console)))
            .build(Root::builder().appender(ROOT_APPENDER).build(Self::parse_level(level)))?;
        Ok(config)
    }

    fn output_dir(config: &LogConfig) -> PathBuf {
        env::var("LOG_OUTPUT_DIR")
            .ok()
            .or_else(|| config.output_dir.clone())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn create_appender(
        base_dir: &Path,
        config: &LoggerConfig,
    ) -> Result<RollingFileAppender, Box<dyn std::error::Error>> {
        let log_directory = base_dir.join(&config.log_directory);

        // Create log directory
        std::fs::create_dir_all(&log_directory)?;

        // Archives of one process run share a start timestamp
        let now: DateTime<Local> = Local::now();
        let formatted_time = now.format("%Y%m%d%H%M%S%3f").to_string();

        let log_file = log_directory.join(&config.log_file_name);
        let archived_log_pattern = format!(
            "{}/{}-{{}}-{}.gz",
            log_directory.display(),
            config.log_file_name,
            formatted_time
        );

        // Configure rolling policy
        let size_trigger = SizeBasedTriggerPolicy::new(config.max_file_size);
        let roller = FixedWindowRoller::builder().build(&archived_log_pattern, config.max_zip_count)?;
        let compound_policy = CompoundPolicy::new(Box::new(size_trigger), Box::new(roller));

        let appender = RollingFileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
            .build(log_file, Box::new(compound_policy))?;

        Ok(appender)
    }

    pub(crate) fn parse_level(level: &str) -> LevelFilter {
        match level.to_lowercase().as_str() {
            "trace" => LevelFilter::Trace,
            "debug" => LevelFilter::Debug,
            "info" => LevelFilter::Info,
            "warn" => LevelFilter::Warn,
            "error" => LevelFilter::Error,
            "off" => LevelFilter::Off,
            _ => LevelFilter::Info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn logger(prefix: &str) -> LoggerConfig {
        LoggerConfig {
            path_prefix: prefix.to_string(),
            log_directory: "logs".to_string(),
            log_file_name: format!("{}.log", prefix),
            max_file_size: 1024,
            max_zip_count: 2,
            level: "debug".to_string(),
        }
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(Logger::parse_level("WARN"), LevelFilter::Warn);
        assert_eq!(Logger::parse_level("bogus"), LevelFilter::Info);
    }

    #[test]
    #[serial]
    fn test_build_config_creates_log_directory() {
        env::remove_var("LOG_OUTPUT_DIR");
        let dir = TempDir::new().unwrap();
        let config = LogConfig {
            output_dir: Some(dir.path().display().to_string()),
            loggers: vec![logger("root"), logger("distributed_lock")],
        };

        let built = Logger::build_config(&config).unwrap();

        assert!(dir.path().join("logs").is_dir());
        assert_eq!(built.loggers().len(), 1);
        assert_eq!(built.root().level(), LevelFilter::Debug);
    }

    #[test]
    #[serial]
    fn test_env_overrides_output_dir() {
        let dir = TempDir::new().unwrap();
        env::set_var("LOG_OUTPUT_DIR", dir.path());
        let config = LogConfig {
            output_dir: Some("/nonexistent".to_string()),
            loggers: vec![logger("root")],
        };

        assert_eq!(Logger::output_dir(&config), dir.path());
        env::remove_var("LOG_OUTPUT_DIR");
    }

    #[test]
    fn test_console_fallback_without_root() {
        let config = LogConfig {
            output_dir: None,
            loggers: Vec::new(),
        };
        let built = Logger::build_config(&config).unwrap();
        assert_eq!(built.root().level(), LevelFilter::Info);
    }
}
