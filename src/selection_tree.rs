use crate::error::SimError;
use rand::Rng;
use std::collections::HashMap;
use std::hash::Hash;

/// Weighted random selection with O(log n) updates and O(log n) draws.
///
/// Items sit in the leaves of a vector-backed complete binary tree; every internal node
/// caches the weight sum of its subtree, so changing one leaf only touches its
/// ancestors. `sample` descends from the root, at each node comparing a uniform draw
/// against the left child's weight range.
///
/// Freed leaf slots are recycled through a free list; when all slots are taken the leaf
/// level doubles and the sums are rebuilt.
#[derive(Debug)]
pub struct WeightedSelectionTree<T> {
    /// Leaf capacity, always a power of two. Node `i` has children `2i` and `2i + 1`,
    /// leaf slot `s` lives at `leaves + s`.
    leaves: usize,
    weights: Vec<f64>,
    items: Vec<Option<T>>,
    slots: HashMap<T, usize>,
    free: Vec<usize>,
    next_slot: usize,
}

impl<T: Clone + Eq + Hash> Default for WeightedSelectionTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Eq + Hash> WeightedSelectionTree<T> {
    pub fn new() -> Self {
        Self::with_capacity(4)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let leaves = capacity.max(1).next_power_of_two();
        Self {
            leaves,
            weights: vec![0.0; 2 * leaves],
            items: vec![None; leaves],
            slots: HashMap::with_capacity(capacity),
            free: Vec::new(),
            next_slot: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn total_weight(&self) -> f64 {
        self.weights[1]
    }

    pub fn contains(&self, item: &T) -> bool {
        self.slots.contains_key(item)
    }

    pub fn weight(&self, item: &T) -> Option<f64> {
        self.slots.get(item).map(|&slot| self.weights[self.leaves + slot])
    }

    /// Inserts `item` with the given non-negative weight, or updates its weight if it
    /// is already tracked
    pub fn insert(&mut self, item: T, weight: f64) {
        assert!(weight >= 0.0, "weights must be non-negative");
        if let Some(&slot) = self.slots.get(&item) {
            self.set_leaf(slot, weight);
            return;
        }
        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                if self.next_slot == self.leaves {
                    self.grow();
                }
                let slot = self.next_slot;
                self.next_slot += 1;
                slot
            }
        };
        self.items[slot] = Some(item.clone());
        self.slots.insert(item, slot);
        self.set_leaf(slot, weight);
    }

    /// Returns false if the item is not tracked
    pub fn update_weight(&mut self, item: &T, weight: f64) -> bool {
        assert!(weight >= 0.0, "weights must be non-negative");
        match self.slots.get(item) {
            Some(&slot) => {
                self.set_leaf(slot, weight);
                true
            }
            None => false,
        }
    }

    /// Removes the item, returning its weight, or `None` if it was not tracked
    pub fn remove(&mut self, item: &T) -> Option<f64> {
        let slot = self.slots.remove(item)?;
        let weight = self.weights[self.leaves + slot];
        self.items[slot] = None;
        self.set_leaf(slot, 0.0);
        self.free.push(slot);
        Some(weight)
    }

    /// Draws an item with probability proportional to its weight
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Result<&T, SimError> {
        let total = self.weights[1];
        if self.slots.is_empty() || total <= 0.0 {
            return Err(SimError::EmptyOrZeroWeight);
        }
        let mut draw: f64 = rng.random_range(0.0..total);
        let mut node = 1;
        while node < self.leaves {
            let left = 2 * node;
            if draw < self.weights[left] {
                node = left;
            } else {
                draw -= self.weights[left];
                node = left + 1;
            }
        }
        let slot = node - self.leaves;
        match &self.items[slot] {
            Some(item) if self.weights[node] > 0.0 => Ok(item),
            // Floating point residue can land the draw on an empty or zero leaf;
            // fall back to the first weighted item
            _ => self
                .items
                .iter()
                .enumerate()
                .find(|(s, item)| item.is_some() && self.weights[self.leaves + s] > 0.0)
                .and_then(|(_, item)| item.as_ref())
                .ok_or(SimError::EmptyOrZeroWeight),
        }
    }

    /// True iff every internal node's weight equals the sum of its children's, within
    /// floating point tolerance. For tests and debug assertions.
    pub fn check_sums(&self) -> bool {
        (1..self.leaves).all(|node| {
            let sum = self.weights[2 * node] + self.weights[2 * node + 1];
            (self.weights[node] - sum).abs() <= 1e-9 * (1.0 + sum.abs())
        })
    }

    fn set_leaf(&mut self, slot: usize, weight: f64) {
        let mut node = self.leaves + slot;
        self.weights[node] = weight;
        node /= 2;
        while node >= 1 {
            self.weights[node] = self.weights[2 * node] + self.weights[2 * node + 1];
            node /= 2;
        }
    }

    fn grow(&mut self) {
        let leaves = self.leaves * 2;
        let mut weights = vec![0.0; 2 * leaves];
        for slot in 0..self.leaves {
            weights[leaves + slot] = self.weights[self.leaves + slot];
        }
        for node in (1..leaves).rev() {
            weights[node] = weights[2 * node] + weights[2 * node + 1];
        }
        self.items.resize(leaves, None);
        self.leaves = leaves;
        self.weights = weights;
    }
}
