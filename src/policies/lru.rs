use super::EvictionPolicy;
use crate::access::PartId;
use crate::error::SimError;
use crate::state::{AccessContext, CacheState};
use crate::units::BytesSize;
use std::collections::{BTreeMap, HashMap};

/// Least-recently-used eviction.
///
/// Recency is a logical clock stamped on every touch; the victim is the part holding
/// the smallest stamp. Stamps are unique and monotone, so equal-recency ties cannot
/// arise and admission order is preserved for untouched parts.
#[derive(Debug, Default)]
pub struct Lru {
    queue: BTreeMap<u64, PartId>,
    stamps: HashMap<PartId, u64>,
    clock: u64,
}

impl Lru {
    pub fn new() -> Self {
        Self::default()
    }

    fn touch(&mut self, part: PartId) {
        if let Some(stamp) = self.stamps.remove(&part) {
            self.queue.remove(&stamp);
        }
        let stamp = self.clock;
        self.clock += 1;
        self.stamps.insert(part, stamp);
        self.queue.insert(stamp, part);
    }
}

impl EvictionPolicy for Lru {
    fn name(&self) -> &'static str {
        "lru"
    }

    fn choose_victim(
        &mut self,
        _state: &CacheState,
        ctx: &AccessContext,
    ) -> Result<PartId, SimError> {
        self.queue
            .values()
            .next()
            .copied()
            .ok_or(SimError::NoEvictionCandidate { access_ind: ctx.ind })
    }

    fn on_access(&mut self, part: PartId, _hit: bool, _ctx: &AccessContext) {
        if self.stamps.contains_key(&part) {
            self.touch(part);
        }
    }

    fn on_admit(&mut self, part: PartId, _size: BytesSize, _ctx: &AccessContext) {
        self.touch(part);
    }

    fn on_evict(&mut self, part: PartId, _ctx: &AccessContext) {
        if let Some(stamp) = self.stamps.remove(&part) {
            self.queue.remove(&stamp);
        }
    }
}

/// CLOCK approximation of LRU: one reference bit per resident part and a sweeping hand.
///
/// A hit sets the part's bit. The victim search sweeps the ring from the hand, clearing
/// set bits and stopping at the first clear one, so recently referenced parts get one
/// full revolution of grace.
#[derive(Debug, Default)]
pub struct LruBit {
    ring: Vec<PartId>,
    bits: Vec<bool>,
    pos: HashMap<PartId, usize>,
    hand: usize,
}

impl LruBit {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EvictionPolicy for LruBit {
    fn name(&self) -> &'static str {
        "lru-bit"
    }

    fn choose_victim(
        &mut self,
        _state: &CacheState,
        ctx: &AccessContext,
    ) -> Result<PartId, SimError> {
        if self.ring.is_empty() {
            return Err(SimError::NoEvictionCandidate { access_ind: ctx.ind });
        }
        // Terminates: every set bit encountered is cleared, so at most two revolutions
        loop {
            let idx = self.hand % self.ring.len();
            if self.bits[idx] {
                self.bits[idx] = false;
                self.hand = idx + 1;
            } else {
                self.hand = idx;
                return Ok(self.ring[idx]);
            }
        }
    }

    fn on_access(&mut self, part: PartId, _hit: bool, _ctx: &AccessContext) {
        if let Some(&idx) = self.pos.get(&part) {
            self.bits[idx] = true;
        }
    }

    fn on_admit(&mut self, part: PartId, _size: BytesSize, _ctx: &AccessContext) {
        self.pos.insert(part, self.ring.len());
        self.ring.push(part);
        self.bits.push(false);
    }

    fn on_evict(&mut self, part: PartId, _ctx: &AccessContext) {
        let Some(idx) = self.pos.remove(&part) else {
            return;
        };
        self.ring.swap_remove(idx);
        self.bits.swap_remove(idx);
        if idx < self.ring.len() {
            self.pos.insert(self.ring[idx], idx);
        }
        if self.hand >= self.ring.len() {
            self.hand = 0;
        }
    }
}
