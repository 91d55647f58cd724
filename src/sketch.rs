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

//! Approximate per-key frequency counter: a 4-row count-min sketch with
//! 4-bit saturating counters packed eight to a 32-bit word, plus a halving
//! "aging" step that keeps the estimates tracking recent rather than
//! lifetime frequency.

use rand::Rng;

/// Number of independent rows. Each row is addressed by a distinct seed, so
/// a hash collision in one row is unlikely to also collide in the others.
pub const DEPTH: usize = 4;
/// Saturating ceiling for any one counter.
pub const MAX_COUNT: u8 = 15;

const COUNTERS_PER_WORD: usize = 8;
const RESET_MASK: u32 = 0x7777_7777;

/// Round `x` up to the next power of two, floor-clamped to 8.
///
/// The original source's equivalent (`next2Power`) includes a final
/// `x >>= 32` step on a 32-bit value, which is undefined behavior in C++ and
/// a no-op shift-by-width in Rust; it is omitted here; the cascade through
/// `>> 16` already covers the full range of a `u32`.
fn next_pow2(x: u32) -> u32 {
    let mut x = x.saturating_sub(1);
    x |= x >> 1;
    x |= x >> 2;
    x |= x >> 4;
    x |= x >> 8;
    x |= x >> 16;
    x.saturating_add(1).max(8)
}

struct Row {
    words: Vec<u32>,
}

impl Row {
    fn new(width: usize) -> Self {
        Row {
            words: vec![0u32; (width + COUNTERS_PER_WORD - 1) / COUNTERS_PER_WORD],
        }
    }

    #[inline]
    fn get(&self, index: usize) -> u8 {
        let word = self.words[index / COUNTERS_PER_WORD];
        let shift = (index % COUNTERS_PER_WORD) * 4;
        ((word >> shift) & 0xF) as u8
    }

    #[inline]
    fn increment(&mut self, index: usize) {
        let word_idx = index / COUNTERS_PER_WORD;
        let shift = (index % COUNTERS_PER_WORD) * 4;
        let word = self.words[word_idx];
        if (word >> shift) & 0xF < MAX_COUNT as u32 {
            self.words[word_idx] = word + (1 << shift);
        }
    }

    fn age(&mut self) {
        for word in self.words.iter_mut() {
            *word = (*word >> 1) & RESET_MASK;
        }
    }

    fn clear(&mut self) {
        for word in self.words.iter_mut() {
            *word = 0;
        }
    }
}

/// Count-min sketch over 32-bit key fingerprints.
pub struct Sketch {
    rows: [Row; DEPTH],
    seeds: [u32; DEPTH],
    mask: u32,
}

impl Sketch {
    /// Build a sketch sized for roughly `width` distinct keys per row, with
    /// row seeds drawn from the thread-local RNG.
    pub fn new(width: usize) -> Self {
        Self::with_rng(width, &mut rand::thread_rng())
    }

    /// As [`Sketch::new`], but with an explicit RNG (used by tests that
    /// need determinism).
    pub fn with_rng<R: Rng + ?Sized>(width: usize, rng: &mut R) -> Self {
        let rounded = next_pow2(width.min(u32::MAX as usize) as u32) as usize;
        let mask = (rounded - 1) as u32;
        let mut seeds = [0u32; DEPTH];
        for seed in seeds.iter_mut() {
            *seed = rng.gen();
        }
        Sketch {
            rows: [
                Row::new(rounded),
                Row::new(rounded),
                Row::new(rounded),
                Row::new(rounded),
            ],
            seeds,
            mask,
        }
    }

    #[inline]
    fn index(&self, row: usize, hash: u32) -> usize {
        ((hash ^ self.seeds[row]) & self.mask) as usize
    }

    /// Record one access to the key fingerprinted as `hash`.
    pub fn increment(&mut self, hash: u32) {
        for row in 0..DEPTH {
            let idx = self.index(row, hash);
            self.rows[row].increment(idx);
        }
    }

    /// Estimated access count for `hash`: the minimum across all rows, which
    /// is a one-sided (over-)estimate of the true count.
    pub fn estimate(&self, hash: u32) -> u8 {
        (0..DEPTH)
            .map(|row| self.rows[row].get(self.index(row, hash)))
            .min()
            .unwrap_or(0)
    }

    /// Halve every counter (floor division), the "aging" freshness step.
    pub fn age(&mut self) {
        for row in self.rows.iter_mut() {
            row.age();
        }
    }

    /// Zero every counter.
    pub fn clear(&mut self) {
        for row in self.rows.iter_mut() {
            row.clear();
        }
    }
}
