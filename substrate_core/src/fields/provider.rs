use serde::{Deserialize, Serialize};

use crate::domain::{FieldProvider, ProviderSample, QueryBudget};
use crate::geometry::Point3;
use crate::hashing::mix64;
use crate::scalar::{scalar_from_f32, Scalar};

/// Upstream terrain/geology values at a point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TerrainFields {
    pub elevation: Scalar,
    pub roughness: Scalar,
    pub hardness: Scalar,
    pub density: Scalar,
    pub water: bool,
    pub obstruction: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeededTerrainParams {
    pub feature_size: f32,
    pub relief: f32,
    pub sea_level: f32,
    pub base_hardness: f32,
    pub base_density: f32,
    pub query_cost: u32,
}

impl Default for SeededTerrainParams {
    fn default() -> Self {
        Self {
            feature_size: 32.0,
            relief: 24.0,
            sea_level: 4.0,
            base_hardness: 40.0,
            base_density: 2.5,
            query_cost: 2,
        }
    }
}

/// Deterministic reference provider: integer-lattice value noise in fixed
/// point. Identical seeds give identical fields on every platform.
#[derive(Debug, Clone)]
pub struct SeededTerrain {
    seed: u64,
    feature_size: Scalar,
    relief: Scalar,
    sea_level: Scalar,
    base_hardness: Scalar,
    base_density: Scalar,
    query_cost: u32,
}

impl SeededTerrain {
    pub fn new(seed: u64, params: &SeededTerrainParams) -> Self {
        Self {
            seed,
            feature_size: scalar_from_f32(params.feature_size.max(1.0)),
            relief: scalar_from_f32(params.relief),
            sea_level: scalar_from_f32(params.sea_level),
            base_hardness: scalar_from_f32(params.base_hardness),
            base_density: scalar_from_f32(params.base_density),
            query_cost: params.query_cost,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn sea_level(&self) -> Scalar {
        self.sea_level
    }

    pub fn query_cost(&self) -> u32 {
        self.query_cost
    }

    /// Fields at `point` without budget accounting.
    pub fn fields_at(&self, point: &Point3) -> TerrainFields {
        let continent = value_noise(point.x, point.y, self.feature_size, mix64(self.seed, 0xC0A5));
        let detail_size = Scalar::from_raw((self.feature_size.raw() / 4).max(Scalar::ONE.raw()));
        let detail = value_noise(point.x, point.y, detail_size, mix64(self.seed, 0xD37A));
        let strata = value_noise(point.x, point.z, self.feature_size, mix64(self.seed, 0x57A7));

        let elevation = (continent * Scalar::from_f32(0.8) + detail * Scalar::from_f32(0.2)) * self.relief;
        let hardness = self.base_hardness * (Scalar::HALF + strata);
        TerrainFields {
            elevation,
            roughness: detail,
            hardness,
            density: self.base_density,
            water: elevation < self.sea_level,
            obstruction: false,
        }
    }
}

impl FieldProvider for SeededTerrain {
    type Fields = TerrainFields;

    fn sample_query(&self, point: &Point3, budget: &mut QueryBudget) -> ProviderSample<TerrainFields> {
        if !budget.consume(self.query_cost) {
            return ProviderSample::unknown();
        }
        ProviderSample::known(self.fields_at(point))
    }
}

/// Smoothed value noise in `[0, 1)` on a lattice of `spacing`.
pub fn value_noise(x: Scalar, y: Scalar, spacing: Scalar, seed: u64) -> Scalar {
    let gx = x / spacing;
    let gy = y / spacing;
    let x0 = gx.floor_to_int();
    let y0 = gy.floor_to_int();
    let fx = smooth_step(gx - Scalar::from_int(x0));
    let fy = smooth_step(gy - Scalar::from_int(y0));

    let v00 = lattice(x0, y0, seed);
    let v10 = lattice(x0 + 1, y0, seed);
    let v01 = lattice(x0, y0 + 1, seed);
    let v11 = lattice(x0 + 1, y0 + 1, seed);

    let i1 = lerp(v00, v10, fx);
    let i2 = lerp(v01, v11, fx);
    lerp(i1, i2, fy)
}

fn lattice(x: i64, y: i64, seed: u64) -> Scalar {
    let packed = (x as u64).wrapping_mul(0x6C8E_9CF5_70932BD5) ^ (y as u64).rotate_left(32);
    Scalar::from_raw((mix64(seed, packed) >> 48) as i64)
}

fn smooth_step(t: Scalar) -> Scalar {
    t * t * (Scalar::from_int(3) - t.mul_int(2))
}

fn lerp(a: Scalar, b: Scalar, t: Scalar) -> Scalar {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noise_stays_in_unit_range() {
        let spacing = Scalar::from_int(8);
        for i in -20..20 {
            let v = value_noise(Scalar::from_int(i * 3), Scalar::from_int(i * 5), spacing, 11);
            assert!(v >= Scalar::ZERO && v < Scalar::ONE, "noise {v} out of range");
        }
    }

    #[test]
    fn noise_matches_lattice_at_integer_points() {
        let spacing = Scalar::from_int(4);
        let v = value_noise(Scalar::from_int(8), Scalar::from_int(-4), spacing, 5);
        assert_eq!(v, lattice(2, -1, 5));
    }

    #[test]
    fn provider_is_deterministic_and_charges_budget() {
        let terrain = SeededTerrain::new(99, &SeededTerrainParams::default());
        let point = Point3::from_ints(17, 40, 3);
        let mut budget = QueryBudget::new(3);
        let a = terrain.sample_query(&point, &mut budget);
        assert!(!a.unknown);
        assert_eq!(budget.used(), 2);
        let b = terrain.sample_query(&point, &mut budget);
        assert!(b.unknown);
        assert_eq!(a.fields, terrain.fields_at(&point));
    }
}
