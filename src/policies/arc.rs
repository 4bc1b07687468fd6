use super::EvictionPolicy;
use crate::access::PartId;
use crate::error::SimError;
use crate::state::{AccessContext, CacheState};
use crate::units::BytesSize;
use std::collections::{BTreeMap, HashMap};

/// Byte-weighted LRU list used for the four ARC lists (T1/T2 and their ghosts)
#[derive(Debug, Default)]
struct SizedLru {
    queue: BTreeMap<u64, PartId>,
    stamps: HashMap<PartId, u64>,
    sizes: HashMap<PartId, BytesSize>,
    bytes: BytesSize,
    clock: u64,
}

impl SizedLru {
    fn contains(&self, part: &PartId) -> bool {
        self.stamps.contains_key(part)
    }

    fn insert(&mut self, part: PartId, size: BytesSize) {
        self.remove(&part);
        let stamp = self.clock;
        self.clock += 1;
        self.stamps.insert(part, stamp);
        self.queue.insert(stamp, part);
        self.sizes.insert(part, size);
        self.bytes += size;
    }

    fn touch(&mut self, part: &PartId) {
        if let Some(stamp) = self.stamps.remove(part) {
            self.queue.remove(&stamp);
            let stamp = self.clock;
            self.clock += 1;
            self.stamps.insert(*part, stamp);
            self.queue.insert(stamp, *part);
        }
    }

    fn remove(&mut self, part: &PartId) -> Option<BytesSize> {
        let stamp = self.stamps.remove(part)?;
        self.queue.remove(&stamp);
        let size = self.sizes.remove(part).unwrap_or(0);
        self.bytes -= size;
        Some(size)
    }

    fn oldest(&self) -> Option<PartId> {
        self.queue.values().next().copied()
    }

    fn pop_oldest(&mut self) -> Option<(PartId, BytesSize)> {
        let part = self.oldest()?;
        let size = self.remove(&part)?;
        Some((part, size))
    }

    fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }
}

/// Adaptive Replacement Cache over parts, byte-weighted.
///
/// Resident parts live in T1 (seen once since admission) or T2 (seen again); evicted
/// parts leave a ghost entry in B1/B2. A ghost hit shifts the adaptive target size of
/// T1: hits in B1 grow it (recency is paying off), hits in B2 shrink it. Ghost lists
/// are bounded to `ghost_factor` times the cache capacity in bytes.
///
/// The bit variant replaces strict in-T2 re-stamping with a reference bit and gives
/// bitted parts a second chance during victim selection, which is the cheaper
/// approximation used when exact recency bookkeeping is too expensive.
#[derive(Debug)]
pub struct Arc {
    capacity: BytesSize,
    ghost_capacity: BytesSize,
    /// Adaptive byte target for T1
    target_t1: BytesSize,
    t1: SizedLru,
    t2: SizedLru,
    b1: SizedLru,
    b2: SizedLru,
    bit_mode: bool,
    bits: HashMap<PartId, bool>,
}

impl Arc {
    pub fn new(capacity: BytesSize, ghost_factor: f64, bit_mode: bool) -> Self {
        Self {
            capacity,
            ghost_capacity: (capacity as f64 * ghost_factor) as BytesSize,
            target_t1: 0,
            t1: SizedLru::default(),
            t2: SizedLru::default(),
            b1: SizedLru::default(),
            b2: SizedLru::default(),
            bit_mode,
            bits: HashMap::new(),
        }
    }

    fn trim_ghosts(&mut self) {
        while self.b1.bytes > self.ghost_capacity {
            self.b1.pop_oldest();
        }
        while self.b2.bytes > self.ghost_capacity {
            self.b2.pop_oldest();
        }
    }

    /// Oldest entry of the list T1/T2 the replacement rule points at, honouring
    /// reference bits in bit mode
    fn select_from(lru: &mut SizedLru, bit_mode: bool, bits: &mut HashMap<PartId, bool>) -> Option<PartId> {
        if !bit_mode {
            return lru.oldest();
        }
        // Give each bitted entry one reprieve; bounded because bits only get cleared
        loop {
            let oldest = lru.oldest()?;
            if bits.get(&oldest).copied().unwrap_or(false) {
                bits.insert(oldest, false);
                lru.touch(&oldest);
            } else {
                return Some(oldest);
            }
        }
    }
}

impl EvictionPolicy for Arc {
    fn name(&self) -> &'static str {
        if self.bit_mode {
            "arc-bit"
        } else {
            "arc"
        }
    }

    fn choose_victim(
        &mut self,
        _state: &CacheState,
        ctx: &AccessContext,
    ) -> Result<PartId, SimError> {
        let prefer_t1 = !self.t1.is_empty()
            && (self.t2.is_empty() || self.t1.bytes >= self.target_t1.max(1));
        let victim = if prefer_t1 {
            Self::select_from(&mut self.t1, self.bit_mode, &mut self.bits)
        } else {
            Self::select_from(&mut self.t2, self.bit_mode, &mut self.bits)
                .or_else(|| Self::select_from(&mut self.t1, self.bit_mode, &mut self.bits))
        };
        victim.ok_or(SimError::NoEvictionCandidate { access_ind: ctx.ind })
    }

    fn on_access(&mut self, part: PartId, hit: bool, _ctx: &AccessContext) {
        if !hit {
            return;
        }
        if let Some(size) = self.t1.remove(&part) {
            // Second touch promotes out of the seen-once list
            self.t2.insert(part, size);
        } else if self.t2.contains(&part) {
            if self.bit_mode {
                self.bits.insert(part, true);
            } else {
                self.t2.touch(&part);
            }
        }
    }

    fn on_admit(&mut self, part: PartId, size: BytesSize, _ctx: &AccessContext) {
        if self.b1.remove(&part).is_some() {
            // Ghost hit in B1: recency deserves more room
            let ratio = if self.b1.bytes > 0 {
                (self.b2.bytes / self.b1.bytes).max(1)
            } else {
                1
            };
            self.target_t1 = self
                .capacity
                .min(self.target_t1 + ratio.saturating_mul(size));
            self.t2.insert(part, size);
        } else if self.b2.remove(&part).is_some() {
            // Ghost hit in B2: frequency deserves more room
            let ratio = if self.b2.bytes > 0 {
                (self.b1.bytes / self.b2.bytes).max(1)
            } else {
                1
            };
            self.target_t1 = self.target_t1.saturating_sub(ratio.saturating_mul(size));
            self.t2.insert(part, size);
        } else {
            self.t1.insert(part, size);
        }
        if self.bit_mode {
            self.bits.insert(part, false);
        }
        self.trim_ghosts();
    }

    fn on_evict(&mut self, part: PartId, _ctx: &AccessContext) {
        if let Some(size) = self.t1.remove(&part) {
            self.b1.insert(part, size);
        } else if let Some(size) = self.t2.remove(&part) {
            self.b2.insert(part, size);
        }
        self.bits.remove(&part);
        self.trim_ghosts();
    }
}
