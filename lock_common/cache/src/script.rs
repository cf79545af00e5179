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

//! Lua scripts evaluated atomically by the store

/// Deletes `KEYS[1]` only while it still stores the owner token `ARGV[1]`.
///
/// Replies 1 when the entry was removed, 0 when it was missing or owned by
/// someone else.
pub const COMPARE_AND_DELETE: &str = r#"
    if redis.call('get', KEYS[1]) == ARGV[1] then
        return redis.call('del', KEYS[1])
    end
    return 0
"#;

/// Resets the TTL of `KEYS[1]` to `ARGV[2]` milliseconds, provided the
/// entry still stores the owner token `ARGV[1]`. Replies 1 on success, 0 otherwise.
pub const COMPARE_AND_EXTEND: &str = r#"
    if redis.call('get', KEYS[1]) == ARGV[1] then
        return redis.call('pexpire', KEYS[1], ARGV[2])
    end
    return 0
"#;

/// The atomic read-compare-act operations a store must be able to run.
///
/// Both take `KEYS[1]` = lock key and `ARGV[1]` = expected owner token.
/// `CompareAndExtend` also takes `ARGV[2]` = new TTL in milliseconds.
/// Both return the number of entries affected (0 or 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockScript {
    CompareAndDelete,
    CompareAndExtend,
}

impl LockScript {
    pub fn body(&self) -> &'static str {
        match self {
            LockScript::CompareAndDelete => COMPARE_AND_DELETE,
            LockScript::CompareAndExtend => COMPARE_AND_EXTEND,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LockScript::CompareAndDelete => "compare_and_delete",
            LockScript::CompareAndExtend => "compare_and_extend",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripts_act_only_for_owner() {
        for script in [LockScript::CompareAndDelete, LockScript::CompareAndExtend] {
            assert!(script.body().contains("redis.call('get', KEYS[1]) == ARGV[1]"), "{}", script.name());
            assert!(script.body().contains("return 0"), "{}", script.name());
        }
        assert!(LockScript::CompareAndDelete.body().contains("'del', KEYS[1]"));
        assert!(LockScript::CompareAndExtend.body().contains("'pexpire', KEYS[1], ARGV[2]"));
    }
}
