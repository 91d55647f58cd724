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

/// Errors returned by [`crate::Cache`] construction.
///
/// `Get`/`Put`/`Del` never return an `Error`: a miss, a rejected admission
/// and a deleted-nothing are ordinary values, not failures.
#[derive(::thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// `capacity` passed to a constructor was `0`.
    #[error("cache capacity must be at least 1")]
    ZeroCapacity,
    /// `threshold` passed to a constructor was `0`.
    #[error("freshness threshold must be at least 1")]
    ZeroThreshold,
}
