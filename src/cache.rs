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

//! The W-TinyLFU shell: ties the window, the main cache, the sketch and the
//! doorkeeper together behind one `RwLock`, and runs the admission pipeline
//! that decides what survives contact with a full cache.

use std::sync::RwLock;

use hashbrown::HashMap;

use crate::bloom::Bloom;
use crate::error::Error;
use crate::hash::fingerprints;
use crate::sketch::Sketch;
use crate::slru::{Segment, Slru};
use crate::window::Window;

const BLOOM_FP: f64 = 0.01;
const WINDOW_RATIO: f64 = 0.01;
const PROTECTED_RATIO: f64 = 0.80;
const DEFAULT_THRESHOLD: u64 = 100;

#[derive(Clone, Copy)]
enum Loc {
    Window(u32),
    Main(Segment, u32),
}

struct Shared<V> {
    window: Window<V>,
    main: Slru<V>,
    sketch: Sketch,
    bloom: Bloom,
    directory: HashMap<u32, Loc>,
    total_visits: u64,
    threshold: u64,
}

impl<V: Clone> Shared<V> {
    fn get(&mut self, key: &[u8]) -> Option<V> {
        let (kh, ch) = fingerprints(key);

        self.total_visits += 1;
        if self.total_visits >= self.threshold {
            self.sketch.age();
            self.bloom.clear();
            self.total_visits = 0;
        }
        self.sketch.increment(kh);

        let loc = *self.directory.get(&kh)?;
        match loc {
            Loc::Window(idx) => {
                if self.window.conflict_hash(idx) != ch {
                    return None;
                }
                self.window.touch(idx);
                Some(self.window.value(idx).clone())
            }
            Loc::Main(segment, idx) => {
                if self.main.conflict_hash(segment, idx) != ch {
                    return None;
                }
                let promo = self.main.hit(segment, idx);
                self.directory.insert(kh, Loc::Main(promo.new_segment, promo.new_idx));
                if let Some(demoted) = promo.demoted {
                    self.directory
                        .insert(demoted.key_hash, Loc::Main(Segment::Probation, demoted.new_idx));
                }
                Some(self.main.value(promo.new_segment, promo.new_idx).clone())
            }
        }
    }

    fn del(&mut self, key: &[u8]) -> Option<V> {
        let (kh, ch) = fingerprints(key);
        let loc = *self.directory.get(&kh)?;
        let matches = match loc {
            Loc::Window(idx) => self.window.conflict_hash(idx) == ch,
            Loc::Main(segment, idx) => self.main.conflict_hash(segment, idx) == ch,
        };
        if !matches {
            return None;
        }
        self.directory.remove(&kh);
        Some(match loc {
            Loc::Window(idx) => self.window.remove(idx),
            Loc::Main(segment, idx) => self.main.remove(segment, idx),
        })
    }

    /// Remove any existing entry for `kh` so `put` can always insert as if
    /// the key were new. Used to resolve a `Put` on an already-resident key
    /// as delete-then-reinsert.
    fn evict_existing(&mut self, kh: u32) {
        if let Some(loc) = self.directory.remove(&kh) {
            match loc {
                Loc::Window(idx) => {
                    self.window.remove(idx);
                }
                Loc::Main(segment, idx) => {
                    self.main.remove(segment, idx);
                }
            }
        }
    }

    fn put(&mut self, key: &[u8], value: V) -> bool {
        let (kh, ch) = fingerprints(key);
        self.evict_existing(kh);

        let (idx, evictee) = self.window.put(kh, ch, value);
        self.directory.insert(kh, Loc::Window(idx));
        let evictee = match evictee {
            Some(e) => e,
            None => return true,
        };

        // The window evictee may already have been displaced from the
        // directory by a later operation in the serialized sequence; only
        // drop its Window claim if it still holds one.
        if let Some(Loc::Window(claimed_idx)) = self.directory.get(&evictee.key_hash) {
            if *claimed_idx == evictee.idx {
                self.directory.remove(&evictee.key_hash);
            }
        }

        match self.main.victim_key_hash() {
            None => {
                let idx = self
                    .main
                    .insert_probation(evictee.key_hash, evictee.conflict_hash, evictee.value);
                self.directory.insert(evictee.key_hash, Loc::Main(Segment::Probation, idx));
            }
            Some(victim_kh) => {
                if !self.bloom.allow(evictee.key_hash) {
                    // first sighting this freshness window: admission suppressed
                } else if self.sketch.estimate(evictee.key_hash) <= self.sketch.estimate(victim_kh) {
                    // evictee is no more popular than the incumbent victim: drop it
                } else {
                    let (_, v_kh, _, _) = self
                        .main
                        .evict_probation_tail()
                        .expect("victim_key_hash returned Some, so the probation tail must exist");
                    debug_assert_eq!(v_kh, victim_kh);
                    self.directory.remove(&v_kh);
                    let idx = self
                        .main
                        .insert_probation(evictee.key_hash, evictee.conflict_hash, evictee.value);
                    self.directory.insert(evictee.key_hash, Loc::Main(Segment::Probation, idx));
                }
            }
        }
        true
    }

    fn len(&self) -> usize {
        self.window.len() + self.main.len()
    }
}

/// A bounded, concurrent W-TinyLFU cache.
///
/// `Get`, `Put` and `Del` all serialize under one exclusive lock: `Get`
/// mutates the frequency sketch and reorders recency lists, so it cannot
/// safely take a shared reader role (see the crate-level documentation).
pub struct Cache<V> {
    shared: RwLock<Shared<V>>,
    capacity: usize,
}

fn ceil_ratio(n: usize, ratio: f64) -> usize {
    (n as f64 * ratio).ceil() as usize
}

impl<V: Clone> Cache<V> {
    /// Construct a cache of total `capacity` with the default freshness
    /// threshold of 100 operations.
    pub fn new(capacity: usize) -> Result<Self, Error> {
        Self::with_threshold(capacity, DEFAULT_THRESHOLD)
    }

    /// As [`Cache::new`], but with an explicit freshness threshold.
    pub fn with_threshold(capacity: usize, threshold: u64) -> Result<Self, Error> {
        if capacity == 0 {
            return Err(Error::ZeroCapacity);
        }
        if threshold == 0 {
            return Err(Error::ZeroThreshold);
        }

        let window_cap = ceil_ratio(capacity, WINDOW_RATIO).max(1);
        let remainder = capacity.saturating_sub(window_cap);
        let protected_cap = ceil_ratio(remainder, PROTECTED_RATIO);
        // Derived as the remainder left over by `protected_cap`, not a second
        // independent `ceil`, so `window_cap + protected_cap + probation_cap`
        // never exceeds `capacity`: two independent ceilings can each round
        // up, overshooting `remainder` by as much as 1 apiece.
        let probation_cap = remainder.saturating_sub(protected_cap);

        let sketch_width = capacity.next_power_of_two().max(8);

        let shared = Shared {
            window: Window::new(window_cap),
            main: Slru::new(probation_cap, protected_cap),
            sketch: Sketch::new(sketch_width),
            bloom: Bloom::new(capacity, BLOOM_FP),
            directory: HashMap::with_capacity(capacity),
            total_visits: 0,
            threshold,
        };

        Ok(Cache {
            shared: RwLock::new(shared),
            capacity,
        })
    }

    /// Look up `key`, promoting it within its stage on a hit. Counts as a
    /// sketch visit regardless of hit or miss.
    pub fn get(&self, key: &[u8]) -> Option<V> {
        let mut shared = self.shared.write().expect("wtlfu: lock poisoned");
        shared.get(key)
    }

    /// Insert `key`/`value`. Always succeeds from the caller's point of view
    /// (the key is always accepted into the window); returns `true` unless
    /// called on an unreachable internal error path. A `Put` on a key already
    /// present anywhere in the cache deletes the old entry first.
    pub fn put(&self, key: &[u8], value: V) -> bool {
        let mut shared = self.shared.write().expect("wtlfu: lock poisoned");
        shared.put(key, value)
    }

    /// Remove `key`, returning its value if present.
    pub fn del(&self, key: &[u8]) -> Option<V> {
        let mut shared = self.shared.write().expect("wtlfu: lock poisoned");
        shared.del(key)
    }

    /// Total configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total live entries across the window and the main cache.
    pub fn len(&self) -> usize {
        let shared = self.shared.read().expect("wtlfu: lock poisoned");
        shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn window_len(&self) -> usize {
        let shared = self.shared.read().expect("wtlfu: lock poisoned");
        shared.window.len()
    }

    pub fn probation_len(&self) -> usize {
        let shared = self.shared.read().expect("wtlfu: lock poisoned");
        shared.main.probation_len()
    }

    pub fn protected_len(&self) -> usize {
        let shared = self.shared.read().expect("wtlfu: lock poisoned");
        shared.main.protected_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_capacity() {
        assert_eq!(Cache::<i32>::new(0).unwrap_err(), Error::ZeroCapacity);
    }

    #[test]
    fn rejects_zero_threshold() {
        assert_eq!(
            Cache::<i32>::with_threshold(10, 0).unwrap_err(),
            Error::ZeroThreshold
        );
    }

    #[test]
    fn put_then_get_on_empty_cache() {
        let c = Cache::new(100).unwrap();
        c.put(b"a", 1);
        assert_eq!(c.get(b"a"), Some(1));
    }

    #[test]
    fn get_on_empty_cache_misses() {
        let c: Cache<i32> = Cache::new(100).unwrap();
        assert_eq!(c.get(b"nope"), None);
    }

    #[test]
    fn put_then_del_then_get_misses() {
        let c = Cache::new(100).unwrap();
        c.put(b"a", 1);
        assert_eq!(c.del(b"a"), Some(1));
        assert_eq!(c.get(b"a"), None);
    }

    #[test]
    fn second_put_on_live_key_updates_value() {
        let c = Cache::new(100).unwrap();
        c.put(b"a", 1);
        c.put(b"a", 2);
        assert_eq!(c.get(b"a"), Some(2));
        // a delete-then-reinsert must not leave two directory entries
        // pointing at the same key
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn new_key_is_rejected_on_first_sighting_once_window_and_main_are_full() {
        let c = Cache::new(100).unwrap();
        for i in 0..200u32 {
            c.put(&i.to_le_bytes(), i);
        }
        assert!(c.len() <= c.capacity());
    }

    #[test]
    fn freshness_reset_does_not_lose_the_value_on_the_triggering_get() {
        let c = Cache::with_threshold(100, 100).unwrap();
        c.put(b"hot", 1);
        for _ in 0..99 {
            assert_eq!(c.get(b"hot"), Some(1));
        }
        // the 100th get crosses the threshold and triggers the reset
        assert_eq!(c.get(b"hot"), Some(1));
    }

    #[test]
    fn key_hash_collision_is_treated_as_miss_not_as_the_colliding_value() {
        use rand::SeedableRng;

        let mut shared = Shared {
            window: Window::new(4),
            main: Slru::new(4, 4),
            sketch: Sketch::with_rng(8, &mut rand::rngs::StdRng::seed_from_u64(1)),
            bloom: Bloom::new(8, 0.01),
            directory: HashMap::new(),
            total_visits: 0,
            threshold: 100,
        };

        // simulate a key_hash collision: some other key already occupies
        // the directory slot for k1's hash, with a conflict_hash that
        // cannot match k1's own.
        let (kh, ch) = fingerprints(b"k1");
        let bogus_conflict_hash = ch.wrapping_add(1);
        let (idx, _) = shared.window.put(kh, bogus_conflict_hash, 99);
        shared.directory.insert(kh, Loc::Window(idx));

        // k1 must read as absent, never as the value stored under the
        // colliding slot.
        assert_eq!(shared.get(b"k1"), None);
    }

    #[test]
    fn introspection_accessors_stay_within_capacity() {
        let c = Cache::new(100).unwrap();
        for i in 0..500u32 {
            c.put(&i.to_le_bytes(), i);
        }
        assert!(c.window_len() <= c.window_len().max(c.capacity()));
        assert!(c.probation_len() + c.protected_len() + c.window_len() == c.len());
    }
}
