use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::geometry::{Aabb, TileCoord};
use crate::hashing::{mix64, FixtureHash};
use crate::scalar::Scalar;
use crate::scheduler::Tick;

use super::FieldSample;

pub const CAPSULE_BINS: usize = 8;
pub const CAPSULE_CATEGORIES: usize = 4;

/// Statistical stand-in for a collapsed tile region.
///
/// Holds a histogram of the domain's aggregate field, per-category counts and
/// one RNG cursor per category so draws from the capsule are reproducible and
/// independent per category.
#[derive(Debug, Clone, PartialEq)]
pub struct Capsule {
    pub domain_id: u64,
    pub tile_id: u64,
    pub coord: TileCoord,
    pub bounds: Aabb,
    pub collapsed_at: Tick,
    pub sample_count: u32,
    pub value_min: Scalar,
    pub value_max: Scalar,
    pub mean: Scalar,
    pub histogram: [u32; CAPSULE_BINS],
    pub category_counts: [u32; CAPSULE_CATEGORIES],
    rng_cursors: [u64; CAPSULE_CATEGORIES],
}

impl Capsule {
    pub(crate) fn from_samples<S: FieldSample>(
        domain_id: u64,
        seed: u64,
        tile_id: u64,
        coord: TileCoord,
        bounds: Aabb,
        collapsed_at: Tick,
        samples: &[S],
    ) -> Self {
        let known: Vec<Scalar> = samples
            .iter()
            .filter(|s| !s.is_unknown())
            .map(FieldSample::aggregate_value)
            .collect();

        let value_min = known.iter().copied().min().unwrap_or(Scalar::ZERO);
        let value_max = known.iter().copied().max().unwrap_or(Scalar::ZERO);
        let sum: i128 = known.iter().map(|v| v.raw() as i128).sum();
        let mean = if known.is_empty() {
            Scalar::ZERO
        } else {
            Scalar::from_raw((sum / known.len() as i128) as i64)
        };

        let mut capsule = Self {
            domain_id,
            tile_id,
            coord,
            bounds,
            collapsed_at,
            sample_count: known.len() as u32,
            value_min,
            value_max,
            mean,
            histogram: [0; CAPSULE_BINS],
            category_counts: [0; CAPSULE_CATEGORIES],
            rng_cursors: [0; CAPSULE_CATEGORIES],
        };
        for value in &known {
            let bin = capsule.bin_of(*value);
            capsule.histogram[bin] += 1;
        }
        for sample in samples {
            let category = sample.category().min(CAPSULE_CATEGORIES - 1);
            capsule.category_counts[category] += 1;
        }
        for (category, cursor) in capsule.rng_cursors.iter_mut().enumerate() {
            *cursor = mix64(mix64(seed, tile_id), category as u64);
        }
        capsule
    }

    pub fn bin_of(&self, value: Scalar) -> usize {
        let span = (self.value_max - self.value_min).raw() as i128;
        if span <= 0 {
            return 0;
        }
        let offset = (value - self.value_min).raw().max(0) as i128;
        let bin = offset * CAPSULE_BINS as i128 / (span + 1);
        (bin as usize).min(CAPSULE_BINS - 1)
    }

    /// Value range covered by `bin`.
    pub fn bin_bounds(&self, bin: usize) -> (Scalar, Scalar) {
        let span = (self.value_max - self.value_min).raw() as i128;
        let edge = |b: usize| {
            self.value_min + Scalar::from_raw((span * b as i128 / CAPSULE_BINS as i128) as i64)
        };
        (edge(bin), edge(bin + 1))
    }

    pub fn cursor(&self, category: usize) -> Option<u64> {
        self.rng_cursors.get(category).copied()
    }

    /// Draws a plausible field value for `category`, weighted by the
    /// histogram, and advances that category's cursor. `None` when the
    /// category never occurred in the region.
    pub fn draw(&mut self, category: usize) -> Option<Scalar> {
        if *self.category_counts.get(category)? == 0 || self.sample_count == 0 {
            return None;
        }
        let mut rng = ChaCha8Rng::seed_from_u64(self.rng_cursors[category]);
        let mut pick = rng.gen_range(0..self.sample_count);
        let mut chosen = CAPSULE_BINS - 1;
        for (bin, &count) in self.histogram.iter().enumerate() {
            if pick < count {
                chosen = bin;
                break;
            }
            pick -= count;
        }
        let (lo, hi) = self.bin_bounds(chosen);
        let width = (hi - lo).raw().max(0);
        let value = lo + Scalar::from_raw(rng.gen_range(0..=width));
        self.rng_cursors[category] = rng.next_u64();
        Some(value)
    }

    /// Digest order: tile id, collapse tick, sample count, min, max, mean,
    /// histogram bins, category counts.
    pub fn hash_into(&self, hash: &mut FixtureHash) {
        hash.push_u64(self.tile_id);
        hash.push_u64(self.collapsed_at);
        hash.push_u32(self.sample_count);
        hash.push_scalar(self.value_min);
        hash.push_scalar(self.value_max);
        hash.push_scalar(self.mean);
        for &count in &self.histogram {
            hash.push_u32(count);
        }
        for &count in &self.category_counts {
            hash.push_u32(count);
        }
    }
}
