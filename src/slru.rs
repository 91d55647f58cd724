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

//! The main cache: two recency lists, Probation (cold) and Protected (hot).
//! New arrivals land in Probation; a hit there promotes into Protected, and
//! once Protected is full a promotion instead swaps places with its tail.

use crate::arena::Lru;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Segment {
    Probation,
    Protected,
}

/// Outcome of a `Get` hit inside the main cache: which segment and arena
/// index the entry now lives at, and whether a Protected entry got bumped
/// down to Probation to make room for the promotion.
pub(crate) struct Promotion {
    pub new_segment: Segment,
    pub new_idx: u32,
    pub demoted: Option<Demoted>,
}

pub(crate) struct Demoted {
    pub key_hash: u32,
    pub conflict_hash: u32,
    pub new_idx: u32,
}

pub(crate) struct Slru<V> {
    probation: Lru<V>,
    protected: Lru<V>,
}

impl<V> Slru<V> {
    pub fn new(probation_cap: usize, protected_cap: usize) -> Self {
        Slru {
            probation: Lru::new(probation_cap),
            protected: Lru::new(protected_cap),
        }
    }

    pub fn probation_len(&self) -> usize {
        self.probation.len()
    }

    pub fn protected_len(&self) -> usize {
        self.protected.len()
    }

    pub fn len(&self) -> usize {
        self.probation.len() + self.protected.len()
    }

    fn capacity(&self) -> usize {
        self.probation.capacity() + self.protected.capacity()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }

    /// The current Probation tail's key hash, the candidate the main cache
    /// would evict if forced to make room right now. `None` if there is
    /// still free capacity (no eviction needed).
    pub fn victim_key_hash(&self) -> Option<u32> {
        if self.is_full() {
            self.probation.tail_idx().map(|idx| self.probation.peek(idx).key_hash)
        } else {
            None
        }
    }

    pub fn value(&self, segment: Segment, idx: u32) -> &V {
        match segment {
            Segment::Probation => &self.probation.peek(idx).value,
            Segment::Protected => &self.protected.peek(idx).value,
        }
    }

    pub fn conflict_hash(&self, segment: Segment, idx: u32) -> u32 {
        match segment {
            Segment::Probation => self.probation.peek(idx).conflict_hash,
            Segment::Protected => self.protected.peek(idx).conflict_hash,
        }
    }

    /// Insert a brand-new entry at the front of Probation. Caller is
    /// responsible for having made room first (see `victim_key_hash` /
    /// `evict_probation_tail`); this never evicts on its own.
    pub fn insert_probation(&mut self, key_hash: u32, conflict_hash: u32, value: V) -> u32 {
        self.probation.push_front(key_hash, conflict_hash, value)
    }

    /// Evict and return the current Probation tail.
    pub fn evict_probation_tail(&mut self) -> Option<(u32, u32, u32, V)> {
        self.probation.pop_back()
    }

    pub fn remove(&mut self, segment: Segment, idx: u32) -> V {
        let (_, _, value) = match segment {
            Segment::Probation => self.probation.remove(idx),
            Segment::Protected => self.protected.remove(idx),
        };
        value
    }

    /// Handle a cache hit at `(segment, idx)`: promote within/into Protected
    /// as described in the module doc comment.
    pub fn hit(&mut self, segment: Segment, idx: u32) -> Promotion {
        match segment {
            Segment::Protected => {
                self.protected.move_to_front(idx);
                Promotion {
                    new_segment: Segment::Protected,
                    new_idx: idx,
                    demoted: None,
                }
            }
            Segment::Probation => {
                let (kh, ch, v) = self.probation.remove(idx);
                if !self.protected.is_full() {
                    let new_idx = self.protected.push_front(kh, ch, v);
                    Promotion {
                        new_segment: Segment::Protected,
                        new_idx,
                        demoted: None,
                    }
                } else {
                    let (_, t_kh, t_ch, t_v) = self
                        .protected
                        .pop_back()
                        .expect("protected is full, so it must be non-empty");
                    let new_idx = self.protected.push_front(kh, ch, v);
                    let demoted_idx = self.probation.push_front(t_kh, t_ch, t_v);
                    Promotion {
                        new_segment: Segment::Protected,
                        new_idx,
                        demoted: Some(Demoted {
                            key_hash: t_kh,
                            conflict_hash: t_ch,
                            new_idx: demoted_idx,
                        }),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entries_enter_probation() {
        let mut s: Slru<i32> = Slru::new(2, 2);
        s.insert_probation(1, 1, 10);
        assert_eq!(s.probation_len(), 1);
        assert_eq!(s.protected_len(), 0);
    }

    #[test]
    fn hit_in_probation_promotes_when_protected_has_room() {
        let mut s: Slru<i32> = Slru::new(2, 2);
        let idx = s.insert_probation(1, 1, 10);
        let promo = s.hit(Segment::Probation, idx);
        assert_eq!(promo.new_segment, Segment::Protected);
        assert!(promo.demoted.is_none());
        assert_eq!(s.protected_len(), 1);
        assert_eq!(s.probation_len(), 0);
    }

    #[test]
    fn hit_in_probation_swaps_when_protected_full() {
        let mut s: Slru<i32> = Slru::new(2, 1);
        let p_idx = s.insert_probation(1, 1, 10);
        // fill protected directly via a first promotion
        let promo = s.hit(Segment::Probation, p_idx);
        assert!(promo.demoted.is_none());
        // second candidate arrives and gets promoted on hit, swapping the
        // now-full protected segment
        let p2_idx = s.insert_probation(2, 2, 20);
        let promo2 = s.hit(Segment::Probation, p2_idx);
        assert_eq!(promo2.new_segment, Segment::Protected);
        let demoted = promo2.demoted.expect("protected was full, a swap must occur");
        assert_eq!(demoted.key_hash, 1);
        assert_eq!(s.protected_len(), 1);
        assert_eq!(s.probation_len(), 1);
        assert_eq!(*s.value(Segment::Probation, demoted.new_idx), 10);
    }

    #[test]
    fn victim_is_none_below_capacity() {
        let s: Slru<i32> = Slru::new(2, 2);
        assert!(s.victim_key_hash().is_none());
    }

    #[test]
    fn victim_is_probation_tail_when_full() {
        let mut s: Slru<i32> = Slru::new(2, 2);
        s.insert_probation(1, 1, 10);
        s.insert_probation(2, 2, 20);
        s.insert_probation(3, 3, 30);
        s.insert_probation(4, 4, 40);
        assert_eq!(s.victim_key_hash(), Some(1));
    }

    #[test]
    fn hit_in_protected_just_reorders() {
        let mut s: Slru<i32> = Slru::new(2, 2);
        let idx = s.insert_probation(1, 1, 10);
        let promo = s.hit(Segment::Probation, idx);
        let idx = promo.new_idx;
        let promo2 = s.hit(Segment::Protected, idx);
        assert_eq!(promo2.new_idx, idx);
        assert!(promo2.demoted.is_none());
    }
}
