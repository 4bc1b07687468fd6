use crate::access::{Access, AccessSequence, PartId};
use crate::error::SimError;
use crate::policies::EvictionPolicy;
use crate::stats::{StatsCollector, StatsSnapshot};
use crate::units::{BytesSize, TimeStamp};
use std::collections::HashMap;

/// Lifecycle of a cache state. Mutation only happens between `Empty` and `Populated`;
/// a `Closed` state is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Empty,
    Populated,
    Closed,
}

/// Bookkeeping attached to a resident part
#[derive(Debug, Clone, Copy)]
pub struct ResidentPart {
    pub size: BytesSize,
    /// Monotone admission sequence number; policies use it for the
    /// oldest-insertion-wins tie-break
    pub inserted: u64,
}

/// The resident set of one simulated cache volume.
///
/// Invariant: the resident byte total never exceeds the capacity after a successfully
/// processed access. Only the [`StateProcessor`] mutates this; policies get a shared
/// reference when asked for a victim.
#[derive(Debug)]
pub struct CacheState {
    capacity: BytesSize,
    used: BytesSize,
    resident: HashMap<PartId, ResidentPart>,
    admit_seq: u64,
    phase: Phase,
}

impl CacheState {
    fn new(capacity: BytesSize) -> Self {
        Self {
            capacity,
            used: 0,
            resident: HashMap::new(),
            admit_seq: 0,
            phase: Phase::Empty,
        }
    }

    pub fn capacity(&self) -> BytesSize {
        self.capacity
    }

    pub fn resident_bytes(&self) -> BytesSize {
        self.used
    }

    pub fn free_bytes(&self) -> BytesSize {
        self.capacity - self.used
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn len(&self) -> usize {
        self.resident.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resident.is_empty()
    }

    pub fn contains(&self, part: &PartId) -> bool {
        self.resident.contains_key(part)
    }

    pub fn resident(&self, part: &PartId) -> Option<&ResidentPart> {
        self.resident.get(part)
    }

    pub fn residents(&self) -> impl Iterator<Item = (&PartId, &ResidentPart)> {
        self.resident.iter()
    }

    fn admit(&mut self, part: PartId, size: BytesSize) {
        let inserted = self.admit_seq;
        self.admit_seq += 1;
        self.resident.insert(part, ResidentPart { size, inserted });
        self.used += size;
        self.phase = Phase::Populated;
    }

    fn evict(&mut self, part: &PartId) -> Option<BytesSize> {
        let removed = self.resident.remove(part)?;
        self.used -= removed.size;
        Some(removed.size)
    }

    fn close(&mut self) {
        self.phase = Phase::Closed;
    }
}

/// Read-only context handed to policy callbacks for one part touch.
///
/// `flat` is the running flat touch position, aligned with the positions of a
/// [`crate::reuse::FullReuseIndex`] built over the same sequence.
#[derive(Debug, Clone, Copy)]
pub struct AccessContext {
    pub ind: usize,
    pub ts: TimeStamp,
    pub flat: usize,
}

/// Per-access result, reported back to the caller of [`StateProcessor::process`]
#[derive(Debug, Default)]
pub struct AccessOutcome {
    pub part_hits: u64,
    pub part_misses: u64,
    pub bytes_hit: BytesSize,
    pub bytes_missed: BytesSize,
    pub evicted: Vec<PartId>,
    /// The stop-early predicate fired; the caller must not offer further accesses
    pub halted: bool,
}

/// Routes each access through the cache state and the active eviction policy.
///
/// The processor is generic over the policy so a concrete policy monomorphises cleanly;
/// `Box<dyn EvictionPolicy>` also implements the trait, which is what the simulator
/// uses to stay algorithm-agnostic.
pub struct StateProcessor<P: EvictionPolicy> {
    state: CacheState,
    policy: P,
    collector: StatsCollector,
    flat_cursor: usize,
    processed: usize,
    halted_early: bool,
}

impl<P: EvictionPolicy> StateProcessor<P> {
    pub fn new(capacity: BytesSize, policy: P, collector: StatsCollector) -> Self {
        Self {
            state: CacheState::new(capacity),
            policy,
            collector,
            flat_cursor: 0,
            processed: 0,
            halted_early: false,
        }
    }

    pub fn state(&self) -> &CacheState {
        &self.state
    }

    pub fn stats(&self) -> &StatsSnapshot {
        self.collector.snapshot()
    }

    pub fn accesses_processed(&self) -> usize {
        self.processed
    }

    pub fn halted_early(&self) -> bool {
        self.halted_early
    }

    /// Processes a single access end to end: hit/miss decision per touched part,
    /// evictions, admission, stats commit.
    ///
    /// The policy is only notified after residency and space bookkeeping for the part
    /// are finalized, so its view of the state always matches what was decided.
    pub fn process(&mut self, ind: usize, access: &Access) -> Result<AccessOutcome, SimError> {
        debug_assert!(self.state.phase != Phase::Closed, "processor used after close");

        // Predicate decisions are taken against the projected counters before anything
        // is committed
        let effect = self.collector.effect_of(access);
        let candidate = self.collector.project(&effect);
        let recording = self.collector.warm_up_decision(&candidate, access.ts);
        let halted = self.collector.stop_decision(&candidate, access.ts);

        let mut outcome = AccessOutcome {
            halted,
            ..AccessOutcome::default()
        };

        for (slot, spec) in access.parts.iter().enumerate() {
            let part = access.part_id(slot);
            let ctx = AccessContext {
                ind,
                ts: access.ts,
                flat: self.flat_cursor + slot,
            };

            if self.state.contains(&part) {
                outcome.part_hits += 1;
                outcome.bytes_hit += spec.size;
                self.policy.on_access(part, true, &ctx);
                continue;
            }

            outcome.part_misses += 1;
            outcome.bytes_missed += spec.size;

            if spec.size > self.state.capacity {
                return Err(SimError::InsufficientCapacity {
                    access_ind: ind,
                    part,
                    part_bytes: spec.size,
                    capacity: self.state.capacity,
                });
            }

            while self.state.used + spec.size > self.state.capacity {
                let victim = self.policy.choose_victim(&self.state, &ctx)?;
                match self.state.evict(&victim) {
                    Some(_) => {
                        self.policy.on_evict(victim, &ctx);
                        outcome.evicted.push(victim);
                    }
                    None => return Err(SimError::NoEvictionCandidate { access_ind: ind }),
                }
            }

            self.state.admit(part, spec.size);
            self.policy.on_admit(part, spec.size, &ctx);
            self.policy.on_access(part, false, &ctx);
        }

        debug_assert!(self.state.used <= self.state.capacity);

        self.flat_cursor += access.parts.len();
        self.collector.commit(
            effect,
            recording,
            outcome.part_hits,
            outcome.part_misses,
            outcome.bytes_hit,
            outcome.bytes_missed,
        );
        self.processed += 1;

        Ok(outcome)
    }

    /// Drives the full sequence through the processor, honouring the stop-early
    /// predicate, and closes the state afterwards
    pub fn run(&mut self, sequence: &AccessSequence) -> Result<(), SimError> {
        log::debug!(
            "starting run: capacity {} bytes, {} accesses",
            self.state.capacity,
            sequence.len()
        );
        for (ind, access) in sequence.iter().enumerate() {
            let outcome = self.process(ind, access)?;
            if outcome.halted {
                self.halted_early = true;
                log::debug!("stop-early predicate fired after access {ind}");
                break;
            }
        }
        self.state.close();
        Ok(())
    }

    /// Marks the run as finished without consuming further accesses
    pub fn close(&mut self) {
        self.state.close();
    }
}
