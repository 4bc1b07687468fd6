use crate::access::{Access, PartId};
use crate::units::{BytesSize, TimeStamp};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Running hit/miss counters for one simulation run.
///
/// All counters are monotonically non-decreasing. The snapshot is independent of
/// sequence length: it never retains per-access history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub accesses: u64,
    pub bytes_seen: BytesSize,
    pub unique_bytes_seen: BytesSize,
    pub hits: u64,
    pub misses: u64,
    pub bytes_hit: BytesSize,
    pub bytes_missed: BytesSize,
}

/// What a pending access would add to the counters, computed without mutating them
#[derive(Debug, Clone)]
pub struct AccessEffect {
    pub bytes: BytesSize,
    pub new_unique_bytes: BytesSize,
    new_parts: Vec<PartId>,
}

/// Threshold vocabulary shared by the warm-up and stop-early predicates.
///
/// Limits combine with "any reached" semantics: as soon as one configured limit is
/// reached by the projected counters, the predicate fires. An empty set never fires.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Thresholds {
    #[serde(default)]
    pub accesses: Option<u64>,
    #[serde(default, deserialize_with = "crate::units::deserialize_opt_byte_size")]
    pub total_bytes: Option<BytesSize>,
    #[serde(default, deserialize_with = "crate::units::deserialize_opt_byte_size")]
    pub unique_bytes: Option<BytesSize>,
    #[serde(default)]
    pub time: Option<TimeStamp>,
}

impl Thresholds {
    /// Pure test-before-commit evaluation against a candidate snapshot
    pub fn reached(&self, candidate: &StatsSnapshot, ts: TimeStamp) -> bool {
        self.accesses.is_some_and(|limit| candidate.accesses >= limit)
            || self
                .total_bytes
                .is_some_and(|limit| candidate.bytes_seen >= limit)
            || self
                .unique_bytes
                .is_some_and(|limit| candidate.unique_bytes_seen >= limit)
            || self.time.is_some_and(|limit| ts >= limit)
    }

    pub fn is_unbounded(&self) -> bool {
        self.accesses.is_none()
            && self.total_bytes.is_none()
            && self.unique_bytes.is_none()
            && self.time.is_none()
    }
}

/// Collects per-run statistics and gates them through the warm-up and stop-early
/// predicates.
///
/// Predicates are evaluated transactionally: they see a projection of what the counters
/// would become if the pending access were committed, and only afterwards are the real
/// counters mutated. A commit-then-check ordering would be off by exactly one access
/// whenever a threshold is defined in terms of the quantities being accumulated.
///
/// The access that completes a threshold is treated inclusively: it is recorded
/// (warm-up) or processed before the run halts (stop-early).
///
/// Sequencing counters (accesses, bytes, unique bytes) always accumulate because the
/// predicates depend on them; the hit/miss counters only move while recording is
/// active. Recording latches on and never turns back off.
#[derive(Debug)]
pub struct StatsCollector {
    snapshot: StatsSnapshot,
    recording: bool,
    warm_up: Thresholds,
    stop_early: Thresholds,
    seen_parts: HashSet<PartId>,
}

impl StatsCollector {
    pub fn new(warm_up: Option<Thresholds>, stop_early: Option<Thresholds>) -> Self {
        let warm_up = warm_up.unwrap_or_default();
        Self {
            snapshot: StatsSnapshot::default(),
            // With no warm-up configured, recording starts immediately
            recording: warm_up.is_unbounded(),
            warm_up,
            stop_early: stop_early.unwrap_or_default(),
            seen_parts: HashSet::new(),
        }
    }

    pub fn snapshot(&self) -> &StatsSnapshot {
        &self.snapshot
    }

    pub fn recording(&self) -> bool {
        self.recording
    }

    /// Computes what `access` would add to the counters, without committing anything
    pub fn effect_of(&self, access: &Access) -> AccessEffect {
        let mut new_unique_bytes = 0;
        let mut new_parts = Vec::new();
        for (slot, spec) in access.parts.iter().enumerate() {
            let part = access.part_id(slot);
            if !self.seen_parts.contains(&part) {
                new_unique_bytes += spec.size;
                new_parts.push(part);
            }
        }
        AccessEffect {
            bytes: access.bytes,
            new_unique_bytes,
            new_parts,
        }
    }

    /// The counters as they would stand after committing `effect`
    pub fn project(&self, effect: &AccessEffect) -> StatsSnapshot {
        let mut candidate = self.snapshot;
        candidate.accesses += 1;
        candidate.bytes_seen += effect.bytes;
        candidate.unique_bytes_seen += effect.new_unique_bytes;
        candidate
    }

    /// Whether stats recording would be active for an access producing `candidate`
    pub fn warm_up_decision(&self, candidate: &StatsSnapshot, ts: TimeStamp) -> bool {
        self.recording || self.warm_up.reached(candidate, ts)
    }

    /// Whether the run should halt after fully processing the access producing
    /// `candidate`. Already-recorded stats are never undone.
    pub fn stop_decision(&self, candidate: &StatsSnapshot, ts: TimeStamp) -> bool {
        self.stop_early.reached(candidate, ts)
    }

    /// Commits the pending access: sequencing counters always, hit/miss counters only
    /// when `recording` was decided for this access
    pub fn commit(
        &mut self,
        effect: AccessEffect,
        recording: bool,
        part_hits: u64,
        part_misses: u64,
        bytes_hit: BytesSize,
        bytes_missed: BytesSize,
    ) {
        self.snapshot.accesses += 1;
        self.snapshot.bytes_seen += effect.bytes;
        self.snapshot.unique_bytes_seen += effect.new_unique_bytes;
        self.seen_parts.extend(effect.new_parts);
        self.recording = self.recording || recording;
        if recording {
            self.snapshot.hits += part_hits;
            self.snapshot.misses += part_misses;
            self.snapshot.bytes_hit += bytes_hit;
            self.snapshot.bytes_missed += bytes_missed;
        }
    }
}
