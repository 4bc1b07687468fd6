use super::EvictionPolicy;
use crate::access::PartId;
use crate::error::SimError;
use crate::policies::prp::PartWeighting;
use crate::selection_tree::WeightedSelectionTree;
use crate::state::{AccessContext, CacheState};
use crate::units::BytesSize;
use ::rand::rngs::StdRng;
use ::rand::SeedableRng;

/// Random eviction, the baseline every other policy is measured against.
///
/// Uniform by default; the size weighting makes larger parts proportionally more likely
/// victims, which frees space faster on byte-heavy workloads.
#[derive(Debug)]
pub struct Rand {
    tree: WeightedSelectionTree<PartId>,
    weighting: PartWeighting,
    rng: StdRng,
}

impl Rand {
    pub fn new(weighting: PartWeighting, seed: u64) -> Self {
        Self {
            tree: WeightedSelectionTree::new(),
            weighting,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl EvictionPolicy for Rand {
    fn name(&self) -> &'static str {
        "rand"
    }

    fn choose_victim(
        &mut self,
        _state: &CacheState,
        ctx: &AccessContext,
    ) -> Result<PartId, SimError> {
        self.tree
            .sample(&mut self.rng)
            .copied()
            .map_err(|_| SimError::NoEvictionCandidate { access_ind: ctx.ind })
    }

    fn on_access(&mut self, _part: PartId, _hit: bool, _ctx: &AccessContext) {}

    fn on_admit(&mut self, part: PartId, size: BytesSize, _ctx: &AccessContext) {
        self.tree.insert(part, self.weighting.weight_of(size));
    }

    fn on_evict(&mut self, part: PartId, _ctx: &AccessContext) {
        self.tree.remove(&part);
    }
}
