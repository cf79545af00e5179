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

//! Key-value store access for the distributed lock: the `StoreClient`
//! contract, a Redis implementation and an in-process implementation.

pub mod client;
pub mod error;
pub mod memory;
pub mod operations;
pub mod script;
pub mod store;

pub use client::RedisClient;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use script::LockScript;
pub use store::StoreClient;
