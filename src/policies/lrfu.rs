use super::{EvictionPolicy, LazyKeyedHeap, OrdF64};
use crate::access::PartId;
use crate::error::SimError;
use crate::selection_tree::WeightedSelectionTree;
use crate::state::{AccessContext, CacheState};
use crate::units::BytesSize;
use ::rand::rngs::StdRng;
use ::rand::SeedableRng;
use serde::Deserialize;
use std::cmp::Reverse;
use std::collections::HashMap;

/// How the LRFU victim is located
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LrfuMode {
    /// Exact minimum-CRF part via a keyed heap
    #[default]
    Exact,
    /// Victim drawn from a weighted tree with weight 1/CRF. Weights are refreshed on
    /// touch only, so untouched parts keep their last weight instead of decaying; the
    /// drift is the price of O(log n) selection without a full re-weigh.
    Sampled,
}

#[derive(Debug, Clone, Copy)]
struct CrfMeta {
    crf: f64,
    last: usize,
}

enum Backend {
    Exact(LazyKeyedHeap<Reverse<OrdF64>>),
    Sampled {
        tree: WeightedSelectionTree<PartId>,
        rng: StdRng,
    },
}

/// Least recently/frequently used.
///
/// Every part carries a combined recency-frequency value (CRF) that decays by
/// `2^(-lambda * age)` and gains 1 on each touch. `lambda` interpolates between pure
/// LFU (0) and pure LRU (large). Age is measured in accesses.
///
/// The heap key is the decay-invariant form `log2(crf) + lambda * last_touch`: decay
/// shifts every part's log-CRF by the same amount at any common observation time, so
/// ordering by the invariant equals ordering by current CRF and re-keying on decay is
/// unnecessary.
pub struct Lrfu {
    lambda: f64,
    meta: HashMap<PartId, CrfMeta>,
    backend: Backend,
}

impl Lrfu {
    pub fn new(lambda: f64, mode: LrfuMode, seed: u64) -> Self {
        let backend = match mode {
            LrfuMode::Exact => Backend::Exact(LazyKeyedHeap::new()),
            LrfuMode::Sampled => Backend::Sampled {
                tree: WeightedSelectionTree::new(),
                rng: StdRng::seed_from_u64(seed),
            },
        };
        Self {
            lambda,
            meta: HashMap::new(),
            backend,
        }
    }

    fn record(&mut self, part: PartId, crf: f64, last: usize) {
        self.meta.insert(part, CrfMeta { crf, last });
        match &mut self.backend {
            Backend::Exact(heap) => {
                let key = Reverse(OrdF64(crf.log2() + self.lambda * last as f64));
                heap.push(part, key);
            }
            Backend::Sampled { tree, .. } => {
                tree.insert(part, 1.0 / crf);
            }
        }
    }

    fn touch(&mut self, part: PartId, ind: usize) {
        let Some(meta) = self.meta.get(&part).copied() else {
            return;
        };
        let age = ind.saturating_sub(meta.last) as f64;
        let decayed = meta.crf * (-self.lambda * age).exp2();
        self.record(part, 1.0 + decayed, ind);
    }
}

impl EvictionPolicy for Lrfu {
    fn name(&self) -> &'static str {
        match self.backend {
            Backend::Exact(_) => "lrfu",
            Backend::Sampled { .. } => "lrfu-sampled",
        }
    }

    fn choose_victim(
        &mut self,
        _state: &CacheState,
        ctx: &AccessContext,
    ) -> Result<PartId, SimError> {
        match &mut self.backend {
            Backend::Exact(heap) => {
                // Pop-and-reinsert peeks the minimum without losing it if the caller
                // ends up evicting a different part
                match heap.pop() {
                    Some((part, key)) => {
                        heap.push(part, key);
                        Ok(part)
                    }
                    None => Err(SimError::NoEvictionCandidate { access_ind: ctx.ind }),
                }
            }
            Backend::Sampled { tree, rng } => tree
                .sample(rng)
                .copied()
                .map_err(|_| SimError::NoEvictionCandidate { access_ind: ctx.ind }),
        }
    }

    fn on_access(&mut self, part: PartId, hit: bool, ctx: &AccessContext) {
        // Misses are accounted by on_admit with a fresh CRF
        if hit {
            self.touch(part, ctx.ind);
        }
    }

    fn on_admit(&mut self, part: PartId, _size: BytesSize, ctx: &AccessContext) {
        self.record(part, 1.0, ctx.ind);
    }

    fn on_evict(&mut self, part: PartId, _ctx: &AccessContext) {
        self.meta.remove(&part);
        match &mut self.backend {
            Backend::Exact(heap) => heap.remove(&part),
            Backend::Sampled { tree, .. } => {
                tree.remove(&part);
            }
        }
    }
}
