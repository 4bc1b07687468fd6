use super::{EvictionPolicy, LazyKeyedHeap, OrdF64};
use crate::access::PartId;
use crate::error::SimError;
use crate::state::{AccessContext, CacheState};
use crate::units::{BytesSize, TimeStamp};
use std::cmp::Reverse;
use std::collections::HashMap;

const NON_REUSED: usize = 0;
const REUSED: usize = 1;

fn lenient_div(dividend: f64, divisor: f64) -> f64 {
    if divisor == 0.0 {
        0.0
    } else {
        dividend / divisor
    }
}

/// Hit and eviction counters for one part class, binned by age.
///
/// Fresh counters accumulate between EVA computations and are folded into the durable
/// counters by EWMA, so the estimator adapts without forgetting the long-run shape of
/// the workload.
#[derive(Debug, Clone)]
struct ClassCounters {
    fresh_hits: Vec<f64>,
    fresh_evictions: Vec<f64>,
    durable_hits: Vec<f64>,
    durable_evictions: Vec<f64>,
    evas: Vec<f64>,
    hit_rates: Vec<f64>,
}

impl ClassCounters {
    fn new(num_bins: usize) -> Self {
        Self {
            fresh_hits: vec![0.0; num_bins],
            fresh_evictions: vec![0.0; num_bins],
            durable_hits: vec![0.0; num_bins],
            durable_evictions: vec![0.0; num_bins],
            evas: vec![0.0; num_bins],
            hit_rates: vec![0.0; num_bins],
        }
    }

    fn absorb_fresh(&mut self, ewma_factor: f64) {
        for bin in 0..self.durable_hits.len() {
            self.durable_hits[bin] =
                (1.0 - ewma_factor) * self.durable_hits[bin] + ewma_factor * self.fresh_hits[bin];
            self.durable_evictions[bin] = (1.0 - ewma_factor) * self.durable_evictions[bin]
                + ewma_factor * self.fresh_evictions[bin];
            self.fresh_hits[bin] = 0.0;
            self.fresh_evictions[bin] = 0.0;
        }
    }

    fn durable_totals(&self) -> (f64, f64) {
        (
            self.durable_hits.iter().sum(),
            self.durable_evictions.iter().sum(),
        )
    }
}

#[derive(Debug, Clone, Copy)]
struct PartMeta {
    last_touch: TimeStamp,
    reused: bool,
    /// Age in refresh sweeps, only meaningful in bit mode
    age_bins: usize,
    bit: bool,
}

/// EVA (economic value added) eviction.
///
/// Every resident part is valued by the expected number of future hits it will deliver,
/// minus the expected cost of the cache space it occupies while doing so. Hits and
/// evictions are sampled into age-binned histograms per class (reused vs. first-timers);
/// periodically the per-bin EVA curve is recomputed from the reverse-cumulative
/// histograms and all resident priorities are refreshed. The part with the lowest EVA is
/// evicted.
///
/// Ages are measured in trace time for the exact variant. The bit variant drops the
/// timestamps and the class split: each part carries a reference bit and an age counter
/// that the refresh sweep advances (or resets when the bit was set), trading estimation
/// sharpness for O(1) per-touch metadata.
pub struct Eva {
    age_bin_width: TimeStamp,
    ewma_factor: f64,
    computation_interval: u64,
    num_bins: usize,
    bit_mode: bool,
    classes: Vec<ClassCounters>,
    meta: HashMap<PartId, PartMeta>,
    heap: LazyKeyedHeap<Reverse<OrdF64>>,
    touches_since_compute: u64,
    last_compute_ts: TimeStamp,
    last_age_bin: usize,
}

impl Eva {
    pub fn new(
        age_bin_width: TimeStamp,
        ewma_factor: f64,
        computation_interval: u64,
        num_bins: usize,
        bit_mode: bool,
    ) -> Self {
        let num_classes = if bit_mode { 1 } else { 2 };
        Self {
            age_bin_width: age_bin_width.max(1),
            ewma_factor,
            computation_interval,
            num_bins: num_bins.max(1),
            bit_mode,
            classes: vec![ClassCounters::new(num_bins.max(1)); num_classes],
            meta: HashMap::new(),
            heap: LazyKeyedHeap::new(),
            touches_since_compute: 0,
            last_compute_ts: 0,
            last_age_bin: 0,
        }
    }

    fn class_of(&self, meta: &PartMeta) -> usize {
        if self.bit_mode || !meta.reused {
            NON_REUSED
        } else {
            REUSED
        }
    }

    fn bin_of(&self, meta: &PartMeta, ts: TimeStamp) -> usize {
        if self.bit_mode {
            meta.age_bins.min(self.num_bins - 1)
        } else {
            let age = ts.saturating_sub(meta.last_touch);
            ((age / self.age_bin_width) as usize).min(self.num_bins - 1)
        }
    }

    fn priority(&self, class: usize, bin: usize) -> Reverse<OrdF64> {
        Reverse(OrdF64(self.classes[class].evas[bin]))
    }

    /// Re-derives every resident part's priority from its current age bin. In bit mode
    /// this sweep is also what ages parts: a set reference bit buys a reset to age zero.
    fn refresh_priorities(&mut self, ts: TimeStamp) {
        let bit_mode = self.bit_mode;
        let num_bins = self.num_bins;
        let age_bin_width = self.age_bin_width;
        let classes = &self.classes;
        let heap = &mut self.heap;
        for (&part, meta) in self.meta.iter_mut() {
            if bit_mode {
                if meta.bit {
                    meta.age_bins = 0;
                    meta.bit = false;
                } else {
                    meta.age_bins += 1;
                }
            }
            let class = if bit_mode || !meta.reused {
                NON_REUSED
            } else {
                REUSED
            };
            let bin = if bit_mode {
                meta.age_bins.min(num_bins - 1)
            } else {
                ((ts.saturating_sub(meta.last_touch) / age_bin_width) as usize).min(num_bins - 1)
            };
            heap.push(part, Reverse(OrdF64(classes[class].evas[bin])));
        }
        self.heap.rebuild();
        self.last_age_bin = (ts / self.age_bin_width) as usize;
    }

    /// Recomputes the per-class EVA curves from the durable histograms
    fn compute_evas(&mut self, ts: TimeStamp) {
        let mut total_hits = 0.0;
        let mut total_events = 0.0;
        for class in &mut self.classes {
            class.absorb_fresh(self.ewma_factor);
            let (hits, evictions) = class.durable_totals();
            total_hits += hits;
            total_events += hits + evictions;
        }

        let total_hit_rate = lenient_div(total_hits, total_events);
        let avg_cache_size = self.meta.len().max(1) as f64;
        let per_access_cost = total_hit_rate / avg_cache_size;
        let time_interval = ts.saturating_sub(self.last_compute_ts).max(1);
        let per_bin_events = self.age_bin_width as f64 * total_events / time_interval as f64;
        let per_bin_cost = per_access_cost * per_bin_events;

        for class in &mut self.classes {
            let mut cum_hits = 0.0;
            let mut cum_evictions = 0.0;
            let mut cum_lifetimes = 0.0;
            for bin in (0..self.num_bins).rev() {
                cum_hits += class.durable_hits[bin];
                cum_evictions += class.durable_evictions[bin];
                cum_lifetimes += cum_hits + cum_evictions;
                let events = cum_hits + cum_evictions;
                class.evas[bin] = lenient_div(cum_hits - per_bin_cost * cum_lifetimes, events);
                class.hit_rates[bin] = lenient_div(cum_hits, events);
            }
        }

        // Reused bias: parts observed to reuse are worth the expected value of the
        // reuses they still owe
        if !self.bit_mode {
            let reused_hit_rate = self.classes[REUSED].hit_rates[0];
            if reused_hit_rate != 1.0 {
                let bias = self.classes[REUSED].evas[0] / (1.0 - reused_hit_rate);
                for class in &mut self.classes {
                    for bin in 0..self.num_bins {
                        class.evas[bin] += (class.hit_rates[bin] - total_hit_rate) * bias;
                    }
                }
            }
        }

        self.touches_since_compute = 0;
        self.last_compute_ts = ts;
    }
}

impl EvictionPolicy for Eva {
    fn name(&self) -> &'static str {
        if self.bit_mode {
            "eva-bit"
        } else {
            "eva"
        }
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
            if let Some(mut meta) = self.meta.get(&part).copied() {
                let class = self.class_of(&meta);
                let bin = self.bin_of(&meta, ctx.ts);
                self.classes[class].fresh_hits[bin] += 1.0;
                meta.reused = true;
                if self.bit_mode {
                    meta.bit = true;
                } else {
                    meta.last_touch = ctx.ts;
                    let key = self.priority(self.class_of(&meta), 0);
                    self.heap.push(part, key);
                }
                self.meta.insert(part, meta);
            }
        }

        self.touches_since_compute += 1;
        if self.touches_since_compute >= self.computation_interval {
            self.compute_evas(ctx.ts);
            self.refresh_priorities(ctx.ts);
        } else if ((ctx.ts / self.age_bin_width) as usize) != self.last_age_bin {
            self.refresh_priorities(ctx.ts);
        }
    }

    fn on_admit(&mut self, part: PartId, _size: BytesSize, ctx: &AccessContext) {
        let meta = PartMeta {
            last_touch: ctx.ts,
            reused: false,
            age_bins: 0,
            bit: false,
        };
        self.meta.insert(part, meta);
        self.heap.push(part, self.priority(NON_REUSED, 0));
    }

    fn on_evict(&mut self, part: PartId, ctx: &AccessContext) {
        if let Some(meta) = self.meta.remove(&part) {
            let class = self.class_of(&meta);
            let bin = self.bin_of(&meta, ctx.ts);
            self.classes[class].fresh_evictions[bin] += 1.0;
        }
        self.heap.remove(&part);
    }
}
