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


use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct LockStatus {
    pub key: String,
    pub locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct AcquireReport {
    pub key: String,
    pub owner: String,
    pub watchdog: bool,
    pub held_ms: u64,
    pub released: bool,
}

#[derive(Debug, Serialize)]
pub struct StressReport {
    pub key: String,
    pub tasks: usize,
    pub items: usize,
    pub expected: usize,
    pub count: usize,
    pub elapsed_ms: u64,
}

impl StressReport {
    pub fn is_consistent(&self) -> bool {
        self.count == self.expected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_omits_missing_owner() {
        let status = LockStatus {
            key: "k".to_string(),
            locked: false,
            owner: None,
            remaining_ms: None,
        };
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, r#"{"key":"k","locked":false}"#);
    }

    #[test]
    fn test_stress_report_consistency() {
        let report = StressReport {
            key: "test_key".to_string(),
            tasks: 10,
            items: 10_000,
            expected: 100_000,
            count: 99_999,
            elapsed_ms: 0,
        };
        assert!(!report.is_consistent());
    }
}
