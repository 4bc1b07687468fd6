use super::EvictionPolicy;
use crate::access::PartId;
use crate::error::SimError;
use crate::selection_tree::WeightedSelectionTree;
use crate::state::{AccessContext, CacheState};
use crate::units::BytesSize;
use ::rand::rngs::StdRng;
use ::rand::SeedableRng;
use serde::Deserialize;
use std::collections::HashMap;

/// How a resident part's selection weight is derived from its size
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartWeighting {
    #[default]
    Uniform,
    /// Weight proportional to part size, biasing eviction toward large parts
    Size,
    /// Weight proportional to 1/size, biasing eviction toward small parts
    InverseSize,
}

impl PartWeighting {
    pub(crate) fn weight_of(&self, size: BytesSize) -> f64 {
        match self {
            PartWeighting::Uniform => 1.0,
            PartWeighting::Size => size as f64,
            PartWeighting::InverseSize => 1.0 / (size as f64).max(1.0),
        }
    }
}

/// Probabilistic replacement: the victim is drawn at random from the resident set with
/// probability proportional to a size-derived weight.
///
/// The bit variant keeps a reference bit per part; a sampled victim whose bit is set is
/// spared once (bit cleared, draw repeated). Attempts are bounded by the resident count
/// so a fully-bitted cache still yields a victim.
#[derive(Debug)]
pub struct Prp {
    tree: WeightedSelectionTree<PartId>,
    weighting: PartWeighting,
    rng: StdRng,
    bit_mode: bool,
    bits: HashMap<PartId, bool>,
}

impl Prp {
    pub fn new(weighting: PartWeighting, seed: u64, bit_mode: bool) -> Self {
        Self {
            tree: WeightedSelectionTree::new(),
            weighting,
            rng: StdRng::seed_from_u64(seed),
            bit_mode,
            bits: HashMap::new(),
        }
    }
}

impl EvictionPolicy for Prp {
    fn name(&self) -> &'static str {
        if self.bit_mode {
            "prp-bit"
        } else {
            "prp"
        }
    }

    fn choose_victim(
        &mut self,
        _state: &CacheState,
        ctx: &AccessContext,
    ) -> Result<PartId, SimError> {
        let mut victim = *self
            .tree
            .sample(&mut self.rng)
            .map_err(|_| SimError::NoEvictionCandidate { access_ind: ctx.ind })?;
        if self.bit_mode {
            let mut attempts = self.tree.len();
            while attempts > 0 && self.bits.get(&victim).copied().unwrap_or(false) {
                self.bits.insert(victim, false);
                victim = *self
                    .tree
                    .sample(&mut self.rng)
                    .map_err(|_| SimError::NoEvictionCandidate { access_ind: ctx.ind })?;
                attempts -= 1;
            }
        }
        Ok(victim)
    }

    fn on_access(&mut self, part: PartId, hit: bool, _ctx: &AccessContext) {
        if self.bit_mode && hit && self.tree.contains(&part) {
            self.bits.insert(part, true);
        }
    }

    fn on_admit(&mut self, part: PartId, size: BytesSize, _ctx: &AccessContext) {
        self.tree.insert(part, self.weighting.weight_of(size));
        if self.bit_mode {
            self.bits.insert(part, false);
        }
    }

    fn on_evict(&mut self, part: PartId, _ctx: &AccessContext) {
        self.tree.remove(&part);
        self.bits.remove(&part);
    }
}
