use super::{EvictionPolicy, LazyKeyedHeap};
use crate::access::PartId;
use crate::error::SimError;
use crate::reuse::FullReuseIndex;
use crate::state::{AccessContext, CacheState};
use crate::units::BytesSize;
use std::cmp::Reverse;
use std::sync::Arc;

/// Belady's offline-optimal policy: evict the resident part whose next use lies
/// furthest in the future.
///
/// Requires a [`FullReuseIndex`] over the exact sequence being replayed; the flat touch
/// position in the [`AccessContext`] is the lookup key. Parts never used again carry the
/// index's sentinel (the flat length), which is larger than every real position and so
/// wins the max-heap comparison outright. Equal next-use positions cannot occur for
/// distinct parts, but a part re-keyed with the sentinel can collide with another, so
/// ties fall back to oldest insertion.
pub struct Min {
    reuse: Arc<FullReuseIndex>,
    heap: LazyKeyedHeap<(usize, Reverse<u64>)>,
    inserted_seq: u64,
}

impl Min {
    pub fn new(reuse: Arc<FullReuseIndex>) -> Self {
        Self {
            reuse,
            heap: LazyKeyedHeap::new(),
            inserted_seq: 0,
        }
    }

    fn rekey(&mut self, part: PartId, flat: usize) {
        let inserted = match self.heap.key(&part) {
            Some(&(_, Reverse(inserted))) => inserted,
            None => {
                let seq = self.inserted_seq;
                self.inserted_seq += 1;
                seq
            }
        };
        let next = self.reuse.next_use_ind_len(flat);
        self.heap.push(part, (next, Reverse(inserted)));
    }
}

impl EvictionPolicy for Min {
    fn name(&self) -> &'static str {
        "min"
    }

    fn choose_victim(
        &mut self,
        _state: &CacheState,
        ctx: &AccessContext,
    ) -> Result<PartId, SimError> {
        match self.heap.pop() {
            Some((part, key)) => {
                self.heap.push(part, key);
                Ok(part)
            }
            None => Err(SimError::NoEvictionCandidate { access_ind: ctx.ind }),
        }
    }

    fn on_access(&mut self, part: PartId, hit: bool, ctx: &AccessContext) {
        if hit {
            self.rekey(part, ctx.flat);
        }
    }

    fn on_admit(&mut self, part: PartId, _size: BytesSize, ctx: &AccessContext) {
        self.rekey(part, ctx.flat);
    }

    fn on_evict(&mut self, part: PartId, _ctx: &AccessContext) {
        self.heap.remove(&part);
    }
}
