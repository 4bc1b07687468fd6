use crate::access::{AccessSequence, PartId};
use crate::units::{BytesSize, TimeStamp};
use std::collections::HashMap;
use std::ops::Range;

/// Full index of part re-uses over an access sequence.
///
/// The index is flat: every (access, part) touch occupies one position, in sequence
/// order, with the touches of one access stored contiguously. For each position it
/// records the previous and next position touching the same part. Positions at the
/// sequence boundary carry a sentinel equal to the flat length, which keeps the arrays
/// fixed-width and lets "no further use" sort after every finite position.
///
/// Construction is two passes over the sequence. The first pass walks forward and
/// records, per part, the most recent touch, yielding `prev_use`. The second pass scans
/// `prev_use` in reverse and flips the link direction, yielding `next_use` without
/// consulting the sequence again.
///
/// Memory is O(total part touches), the dominant consumer in the system; the index is
/// only built when an offline-optimal run or exact-reuse analysis asks for it. It is
/// immutable after construction and shared across concurrently running processors.
#[derive(Debug)]
pub struct FullReuseIndex {
    prev_use: Vec<usize>,
    next_use: Vec<usize>,
    parts_offset: Vec<usize>,
    parts: Vec<PartId>,
    part_sizes: Vec<BytesSize>,
    access_ts: Vec<TimeStamp>,
}

impl FullReuseIndex {
    pub fn build(sequence: &AccessSequence) -> Self {
        let flat_len = sequence.summary().total_parts;
        let mut prev_use = vec![flat_len; flat_len];
        let mut parts_offset = Vec::with_capacity(sequence.len());
        let mut parts = Vec::with_capacity(flat_len);
        let mut part_sizes = Vec::with_capacity(flat_len);
        let mut access_ts = Vec::with_capacity(sequence.len());

        // Pass 1: forward, recording the latest touch per part
        let mut latest: HashMap<PartId, usize> = HashMap::new();
        let mut flat = 0;
        for access in sequence.iter() {
            parts_offset.push(flat);
            access_ts.push(access.ts);
            for (slot, spec) in access.parts.iter().enumerate() {
                let part = access.part_id(slot);
                if let Some(prev) = latest.insert(part, flat) {
                    prev_use[flat] = prev;
                }
                parts.push(part);
                part_sizes.push(spec.size);
                flat += 1;
            }
        }
        drop(latest);

        // Pass 2: reverse the prev links into next links
        let mut next_use = vec![flat_len; flat_len];
        for ind in (0..flat_len).rev() {
            let prev = prev_use[ind];
            if prev < flat_len {
                next_use[prev] = ind;
            }
        }

        Self {
            prev_use,
            next_use,
            parts_offset,
            parts,
            part_sizes,
            access_ts,
        }
    }

    /// Number of flat touch positions
    pub fn len(&self) -> usize {
        self.prev_use.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prev_use.is_empty()
    }

    pub fn prev_use_ind(&self, ind: usize) -> Option<usize> {
        let prev = self.prev_use[ind];
        (prev < self.prev_use.len()).then_some(prev)
    }

    pub fn next_use_ind(&self, ind: usize) -> Option<usize> {
        let next = self.next_use[ind];
        (next < self.next_use.len()).then_some(next)
    }

    /// Sentinel-valued form of [`Self::next_use_ind`]: positions with no further use
    /// report the flat length, so the raw value orders "never used again" last
    pub fn next_use_ind_len(&self, ind: usize) -> usize {
        self.next_use[ind]
    }

    pub fn prev_use_ind_len(&self, ind: usize) -> usize {
        self.prev_use[ind]
    }

    /// Range of flat positions belonging to the access at `access_ind`
    pub fn parts_range(&self, access_ind: usize) -> Range<usize> {
        let start = self.parts_offset[access_ind];
        let end = self
            .parts_offset
            .get(access_ind + 1)
            .copied()
            .unwrap_or(self.parts.len());
        start..end
    }

    pub fn part(&self, ind: usize) -> PartId {
        self.parts[ind]
    }

    pub fn part_size(&self, ind: usize) -> BytesSize {
        self.part_sizes[ind]
    }

    pub fn access_ts(&self, access_ind: usize) -> TimeStamp {
        self.access_ts[access_ind]
    }
}
