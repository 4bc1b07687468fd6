use crate::access::PartId;
use crate::config::PolicyConfig;
use crate::error::SimError;
use crate::reuse::FullReuseIndex;
use crate::state::{AccessContext, CacheState};
use crate::units::BytesSize;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

pub mod arc;
pub mod eva;
pub mod lrfu;
pub mod lru;
pub mod min;
pub mod prp;
pub mod rand;

/// Capability interface every eviction algorithm implements.
///
/// Variants differ only in the metadata they attach to resident parts and in the
/// comparator behind `choose_victim`; the state processor stays algorithm-agnostic.
///
/// Callbacks are pure notifications: they are invoked only after residency and space
/// bookkeeping for the part in question are finalized. `on_access` fires for every
/// touched part (with the hit/miss decision), `on_admit` additionally for parts that
/// just entered the cache, `on_evict` for parts that just left it.
///
/// Unless a policy defines its own explicit rule, ties between equally eligible
/// victims are broken by insertion order, oldest first (see
/// [`ResidentPart::inserted`](crate::state::ResidentPart)).
pub trait EvictionPolicy {
    fn name(&self) -> &'static str;

    /// Nominates a resident part to evict. Must return a part currently resident in
    /// `state`; the processor treats anything else as an inconsistency.
    fn choose_victim(
        &mut self,
        state: &CacheState,
        ctx: &AccessContext,
    ) -> Result<PartId, SimError>;

    fn on_access(&mut self, part: PartId, hit: bool, ctx: &AccessContext);

    fn on_admit(&mut self, part: PartId, size: BytesSize, ctx: &AccessContext);

    fn on_evict(&mut self, part: PartId, ctx: &AccessContext);
}

impl EvictionPolicy for Box<dyn EvictionPolicy> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn choose_victim(
        &mut self,
        state: &CacheState,
        ctx: &AccessContext,
    ) -> Result<PartId, SimError> {
        (**self).choose_victim(state, ctx)
    }

    fn on_access(&mut self, part: PartId, hit: bool, ctx: &AccessContext) {
        (**self).on_access(part, hit, ctx)
    }

    fn on_admit(&mut self, part: PartId, size: BytesSize, ctx: &AccessContext) {
        (**self).on_admit(part, size, ctx)
    }

    fn on_evict(&mut self, part: PartId, ctx: &AccessContext) {
        (**self).on_evict(part, ctx)
    }
}

/// Instantiates the configured policy.
///
/// The reuse index is only consulted for MIN; passing `None` for any other policy is
/// fine. Randomized policies derive their generator from `seed` so runs reproduce.
pub fn build_policy(
    config: &PolicyConfig,
    capacity: BytesSize,
    reuse: Option<std::sync::Arc<FullReuseIndex>>,
    seed: u64,
) -> Result<Box<dyn EvictionPolicy>, String> {
    let policy: Box<dyn EvictionPolicy> = match config {
        PolicyConfig::Lru => Box::new(lru::Lru::new()),
        PolicyConfig::LruBit => Box::new(lru::LruBit::new()),
        PolicyConfig::Arc { ghost_factor } => {
            Box::new(arc::Arc::new(capacity, *ghost_factor, false))
        }
        PolicyConfig::ArcBit { ghost_factor } => {
            Box::new(arc::Arc::new(capacity, *ghost_factor, true))
        }
        PolicyConfig::Prp { weighting } => Box::new(prp::Prp::new(*weighting, seed, false)),
        PolicyConfig::PrpBit { weighting } => Box::new(prp::Prp::new(*weighting, seed, true)),
        PolicyConfig::Lrfu { lambda, mode } => {
            if !lambda.is_finite() || *lambda < 0.0 {
                return Err(format!("lrfu lambda must be finite and non-negative, got {lambda}"));
            }
            Box::new(lrfu::Lrfu::new(*lambda, *mode, seed))
        }
        PolicyConfig::Eva {
            age_bin_width,
            ewma_factor,
            computation_interval,
            num_bins,
        } => Box::new(eva::Eva::new(
            *age_bin_width,
            *ewma_factor,
            *computation_interval,
            *num_bins,
            false,
        )),
        PolicyConfig::EvaBit {
            ewma_factor,
            computation_interval,
            num_bins,
        } => Box::new(eva::Eva::new(
            1,
            *ewma_factor,
            *computation_interval,
            *num_bins,
            true,
        )),
        PolicyConfig::Min => {
            let reuse =
                reuse.ok_or_else(|| "min requires a reuse index over the trace".to_string())?;
            Box::new(min::Min::new(reuse))
        }
        PolicyConfig::Rand { weighting } => Box::new(rand::Rand::new(*weighting, seed)),
    };
    Ok(policy)
}

/// f64 ordered by total order, for use in heap keys
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct OrdF64(pub f64);

impl Eq for OrdF64 {}

impl PartialOrd for OrdF64 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrdF64 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Keyed priority queue with lazy deletion.
///
/// Entries are never removed from the heap eagerly; instead the currently valid key per
/// part is tracked on the side and stale heap entries are skipped during `pop`. Cheaper
/// than a fully indexed heap for the churn pattern eviction policies produce.
#[derive(Debug)]
pub(crate) struct LazyKeyedHeap<K: Ord + Clone + PartialEq> {
    heap: BinaryHeap<(K, PartId)>,
    current: HashMap<PartId, K>,
}

impl<K: Ord + Clone + PartialEq> Default for LazyKeyedHeap<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + Clone + PartialEq> LazyKeyedHeap<K> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            current: HashMap::new(),
        }
    }

    /// Inserts or re-keys a part
    pub fn push(&mut self, part: PartId, key: K) {
        self.current.insert(part, key.clone());
        self.heap.push((key, part));
    }

    pub fn remove(&mut self, part: &PartId) {
        self.current.remove(part);
    }

    pub fn contains(&self, part: &PartId) -> bool {
        self.current.contains_key(part)
    }

    pub fn key(&self, part: &PartId) -> Option<&K> {
        self.current.get(part)
    }

    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    /// Pops the part with the maximum valid key, discarding stale entries
    pub fn pop(&mut self) -> Option<(PartId, K)> {
        while let Some((key, part)) = self.heap.pop() {
            match self.current.get(&part) {
                Some(valid) if *valid == key => {
                    self.current.remove(&part);
                    return Some((part, key));
                }
                _ => continue,
            }
        }
        None
    }

    /// Rebuilds the heap from the valid entries, dropping accumulated stale ones
    pub fn rebuild(&mut self) {
        self.heap = self
            .current
            .iter()
            .map(|(&part, key)| (key.clone(), part))
            .collect();
    }

    pub fn iter_valid(&self) -> impl Iterator<Item = (&PartId, &K)> {
        self.current.iter()
    }
}
