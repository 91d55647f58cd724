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

//! The window LRU: the small front stage every `Put` lands in before an
//! admission contest decides whether it deserves a place in the main cache.

use crate::arena::Lru;

pub(crate) struct Window<V> {
    list: Lru<V>,
}

/// What happened when a candidate was pushed into a full window.
pub(crate) struct Evictee<V> {
    pub idx: u32,
    pub key_hash: u32,
    pub conflict_hash: u32,
    pub value: V,
}

impl<V> Window<V> {
    pub fn new(cap: usize) -> Self {
        Window { list: Lru::new(cap) }
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn capacity(&self) -> usize {
        self.list.capacity()
    }

    /// Move `idx` to the front (most-recently-used) position.
    pub fn touch(&mut self, idx: u32) {
        self.list.move_to_front(idx);
    }

    pub fn value(&self, idx: u32) -> &V {
        &self.list.peek(idx).value
    }

    pub fn conflict_hash(&self, idx: u32) -> u32 {
        self.list.peek(idx).conflict_hash
    }

    /// Insert a new entry at the front. If the window was already full, the
    /// previous tail is evicted and returned.
    pub fn put(&mut self, key_hash: u32, conflict_hash: u32, value: V) -> (u32, Option<Evictee<V>>) {
        let evictee = if self.list.is_full() {
            self.list.pop_back().map(|(idx, key_hash, conflict_hash, value)| Evictee {
                idx,
                key_hash,
                conflict_hash,
                value,
            })
        } else {
            None
        };
        let idx = self.list.push_front(key_hash, conflict_hash, value);
        (idx, evictee)
    }

    /// Remove a specific entry, e.g. on `Del` or on a delete-then-reinsert
    /// `Put` of an already-resident key.
    pub fn remove(&mut self, idx: u32) -> V {
        let (_, _, value) = self.list.remove(idx);
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_under_capacity_has_no_evictee() {
        let mut w: Window<i32> = Window::new(2);
        let (_, ev) = w.put(1, 1, 10);
        assert!(ev.is_none());
        assert_eq!(w.len(), 1);
    }

    #[test]
    fn put_at_capacity_evicts_lru() {
        let mut w: Window<i32> = Window::new(2);
        w.put(1, 1, 10);
        w.put(2, 2, 20);
        let (_, ev) = w.put(3, 3, 30);
        let ev = ev.expect("third put into a full 2-slot window must evict");
        assert_eq!(ev.key_hash, 1);
        assert_eq!(ev.value, 10);
        assert_eq!(w.len(), 2);
    }

    #[test]
    fn touch_protects_from_eviction() {
        let mut w: Window<i32> = Window::new(2);
        let (a, _) = w.put(1, 1, 10);
        w.put(2, 2, 20);
        w.touch(a); // 1 is now MRU, 2 is LRU
        let (_, ev) = w.put(3, 3, 30);
        let ev = ev.expect("window was full");
        assert_eq!(ev.key_hash, 2);
    }

    #[test]
    fn remove_drops_entry() {
        let mut w: Window<i32> = Window::new(2);
        let (a, _) = w.put(1, 1, 10);
        assert_eq!(w.remove(a), 10);
        assert_eq!(w.len(), 0);
    }
}
