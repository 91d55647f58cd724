/*
 * Copyright 2021 Luca Fulchir <luker@fenrirproject.org>
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *   http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! A bounded in-memory cache with W-TinyLFU admission.
//!
//! # Concurrency
//!
//! The cache is safe to share across threads behind an `Arc`. Every
//! operation, including `get`, serializes under a single internal
//! `RwLock`: a plain reader/writer split is unsound here because `get`
//! itself mutates the frequency sketch, the doorkeeper and the recency
//! lists, so it always takes the writer role. See [`Cache`] for details.
//!
//! # Admission
//!
//! A [`Cache`] keeps a small recency-biased window in front of a larger
//! segmented main cache (protected/probation). Writes always land in the
//! window; an entry evicted from the window only displaces something in
//! the main cache if a doorkeeper bloom filter has seen it before and an
//! approximate frequency sketch judges it more popular than the main
//! cache's current eviction candidate.

mod arena;
mod bloom;
mod cache;
mod error;
mod hash;
mod slru;
mod sketch;
mod window;

pub use cache::Cache;
pub use error::Error;
