//! Fixed-capacity arena of weighted samples with priority-based eviction.
//!
//! Every sample gets an eviction priority `weight / u` with `u` drawn uniformly from `(0, 1)`.
//! Once the arena is full, a new sample replaces the retained sample with the lowest priority, or
//! is dropped if its own priority is lower still. The retained set is therefore a weighted random
//! sample in which heavier (more recent) samples are over-represented in proportion to their weight.

use std::{cmp::Ordering, cmp::Reverse, collections::BinaryHeap};

use rand::{Rng, distributions::Open01};

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct WeightedSample {
    pub(crate) value: f64,
    pub(crate) weight: f64,
    priority: f64,
}

/// Index of an arena slot ordered by the priority of the sample it holds.
#[derive(Debug, Clone, Copy)]
struct Ranked {
    priority: f64,
    slot: usize,
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority.total_cmp(&other.priority).then(self.slot.cmp(&other.slot))
    }
}

/// What happened to a sample offered to [`Samples::offer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Offer {
    Inserted,
    Replaced,
    Dropped,
}

#[derive(Debug)]
pub(crate) struct Samples {
    slots: Vec<WeightedSample>,
    // min-heap over slot priorities, always exactly one entry per slot
    lowest: BinaryHeap<Reverse<Ranked>>,
    capacity: usize,
}

impl Samples {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            lowest: BinaryHeap::with_capacity(capacity),
            capacity,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &WeightedSample> {
        self.slots.iter()
    }

    /// Offers a sample with a freshly drawn eviction priority.
    pub(crate) fn offer<R: Rng>(&mut self, value: f64, weight: f64, rng: &mut R) -> Offer {
        let u: f64 = rng.sample(Open01);
        self.offer_with_priority(value, weight, weight / u)
    }

    fn offer_with_priority(&mut self, value: f64, weight: f64, priority: f64) -> Offer {
        let sample = WeightedSample { value, weight, priority };

        if self.slots.len() < self.capacity {
            let slot = self.slots.len();
            self.slots.push(sample);
            self.lowest.push(Reverse(Ranked { priority, slot }));
            return Offer::Inserted;
        }

        let Some(mut lowest) = self.lowest.peek_mut() else { return Offer::Dropped };
        if lowest.0.priority >= priority {
            return Offer::Dropped;
        }

        let slot = lowest.0.slot;
        self.slots[slot] = sample;
        // sifts down when the guard drops
        lowest.0.priority = priority;
        Offer::Replaced
    }

    /// Multiplies every weight and priority by `factor`, dropping samples whose weight underflows
    /// to zero. Returns the number of dropped samples.
    pub(crate) fn rescale(&mut self, factor: f64) -> usize {
        let before = self.slots.len();

        self.slots.retain_mut(|sample| {
            sample.weight *= factor;
            sample.priority *= factor;
            sample.weight > 0.0 && sample.priority > 0.0
        });

        self.lowest = self
            .slots
            .iter()
            .enumerate()
            .map(|(slot, sample)| Reverse(Ranked { priority: sample.priority, slot }))
            .collect();

        before - self.slots.len()
    }

    /// Copies out `(value, weight)` pairs for a snapshot.
    pub(crate) fn weighted_values(&self) -> Vec<(f64, f64)> {
        self.iter().map(|sample| (sample.value, sample.weight)).collect()
    }
}
