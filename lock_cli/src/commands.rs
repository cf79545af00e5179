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


use clap::Subcommand;

#[derive(Subcommand)]
pub enum LockCommands {
    /// Acquire a lock, hold it for a while, then release it
    Acquire {
        /// Lock key
        #[clap(short, long, required = true)]
        key: String,

        /// Fixed lease in milliseconds; without it the watchdog keeps the default lease alive
        #[clap(short, long)]
        lease_ms: Option<u64>,

        /// Give up after waiting this many milliseconds; waits forever if absent
        #[clap(short, long)]
        wait_ms: Option<u64>,

        /// How long to hold the lock before releasing it
        #[clap(long, default_value_t = 1000)]
        hold_ms: u64,
    },

    /// Show whether a key is locked, by whom and for how long
    Status {
        /// Lock key
        #[clap(short, long, required = true)]
        key: String,
    },

    /// Delete a lock regardless of its owner
    ForceRelease {
        /// Lock key
        #[clap(short, long, required = true)]
        key: String,
    },

    /// Run concurrent tasks that each append to a shared counter under the lock
    Stress {
        /// Lock key
        #[clap(short, long, default_value = "test_key")]
        key: String,

        /// Number of concurrent tasks
        #[clap(short, long, default_value_t = 10)]
        tasks: usize,

        /// Items each task appends while holding the lock
        #[clap(short, long, default_value_t = 10_000)]
        items: usize,
    },
}
