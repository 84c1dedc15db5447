//! Structural integrity field: overburden load against material strength.

use serde::{Deserialize, Serialize};

use crate::domain::{FieldModel, FieldProvider, FieldSample, QueryBudget, SampleFlags};
use crate::geometry::Point3;
use crate::hashing::FixtureHash;
use crate::scalar::{scalar_from_f32, Scalar};
use crate::scheduler::Tick;

use super::TerrainFields;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StructuralSample {
    pub load: Scalar,
    pub strength: Scalar,
    pub stress_ratio: Scalar,
    pub flags: SampleFlags,
}

impl StructuralSample {
    pub fn is_failed(&self) -> bool {
        self.flags.contains(SampleFlags::OBSTACLE)
    }
}

impl FieldSample for StructuralSample {
    fn unknown() -> Self {
        Self {
            flags: SampleFlags::FIELDS_UNKNOWN,
            ..Self::default()
        }
    }

    fn flags(&self) -> SampleFlags {
        self.flags
    }

    fn insert_flags(&mut self, flags: SampleFlags) {
        self.flags |= flags;
    }

    fn aggregate_value(&self) -> Scalar {
        self.stress_ratio
    }

    /// 0 unloaded, 1 stable, 2 stressed (over half the failure ratio),
    /// 3 failed.
    fn category(&self) -> usize {
        if self.is_failed() {
            3
        } else if self.load == Scalar::ZERO {
            0
        } else if self.stress_ratio > Scalar::HALF {
            2
        } else {
            1
        }
    }

    fn from_aggregate(value: Scalar, flags: SampleFlags) -> Self {
        Self {
            stress_ratio: value,
            flags,
            ..Self::default()
        }
    }

    /// Order: load, strength, stress ratio, flag bits.
    fn hash_into(&self, hash: &mut FixtureHash) {
        hash.push_scalar(self.load);
        hash.push_scalar(self.strength);
        hash.push_scalar(self.stress_ratio);
        hash.push_u32(self.flags.bits());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuralParams {
    pub failure_ratio: f32,
    pub mean_surface: f32,
    pub mean_density: f32,
    pub mean_hardness: f32,
}

impl Default for StructuralParams {
    fn default() -> Self {
        Self {
            failure_ratio: 1.0,
            mean_surface: 12.0,
            mean_density: 2.5,
            mean_hardness: 40.0,
        }
    }
}

/// Load at a point is the depth below the provider's surface times density;
/// the point fails when load exceeds `failure_ratio` times its hardness.
#[derive(Debug, Clone)]
pub struct StructuralModel<P> {
    provider: P,
    failure_ratio: Scalar,
    mean_surface: Scalar,
    mean_density: Scalar,
    mean_hardness: Scalar,
}

impl<P> StructuralModel<P> {
    pub fn new(provider: P, params: &StructuralParams) -> Self {
        Self {
            provider,
            failure_ratio: scalar_from_f32(params.failure_ratio),
            mean_surface: scalar_from_f32(params.mean_surface),
            mean_density: scalar_from_f32(params.mean_density),
            mean_hardness: scalar_from_f32(params.mean_hardness),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    fn assess(&self, depth: Scalar, density: Scalar, hardness: Scalar) -> StructuralSample {
        let load = depth.clamp(Scalar::ZERO, Scalar::MAX) * density;
        let stress_ratio = if load == Scalar::ZERO {
            Scalar::ZERO
        } else {
            load / hardness
        };
        let mut flags = SampleFlags::empty();
        if stress_ratio > self.failure_ratio {
            flags |= SampleFlags::OBSTACLE;
        }
        StructuralSample {
            load,
            strength: hardness,
            stress_ratio,
            flags,
        }
    }
}

impl<P> FieldModel for StructuralModel<P>
where
    P: FieldProvider<Fields = TerrainFields>,
{
    type Sample = StructuralSample;

    fn evaluate_full(&self, point: &Point3, _tick: Tick, budget: &mut QueryBudget) -> StructuralSample {
        let upstream = self.provider.sample_query(point, budget);
        if upstream.unknown {
            return StructuralSample::unknown();
        }
        let fields = upstream.fields;
        self.assess(fields.elevation - point.z, fields.density, fields.hardness)
    }

    fn evaluate_analytic(&self, point: &Point3, _tick: Tick) -> Option<StructuralSample> {
        Some(self.assess(
            self.mean_surface - point.z,
            self.mean_density,
            self.mean_hardness,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ProviderSample;

    #[derive(Debug, Clone)]
    struct Slab {
        surface: Scalar,
        hardness: Scalar,
        blind: bool,
    }

    impl FieldProvider for Slab {
        type Fields = TerrainFields;

        fn sample_query(&self, _point: &Point3, _budget: &mut QueryBudget) -> ProviderSample<TerrainFields> {
            if self.blind {
                return ProviderSample::unknown();
            }
            ProviderSample::known(TerrainFields {
                elevation: self.surface,
                hardness: self.hardness,
                density: Scalar::from_int(2),
                ..TerrainFields::default()
            })
        }
    }

    fn model(blind: bool) -> StructuralModel<Slab> {
        StructuralModel::new(
            Slab {
                surface: Scalar::from_int(20),
                hardness: Scalar::from_int(10),
                blind,
            },
            &StructuralParams::default(),
        )
    }

    #[test]
    fn air_carries_no_load() {
        let sample = model(false).evaluate_full(
            &Point3::from_ints(0, 0, 25),
            0,
            &mut QueryBudget::unbounded(),
        );
        assert_eq!(sample.load, Scalar::ZERO);
        assert_eq!(sample.category(), 0);
    }

    #[test]
    fn deep_points_fail() {
        let model = model(false);
        let shallow = model.evaluate_full(&Point3::from_ints(0, 0, 18), 0, &mut QueryBudget::unbounded());
        // depth 2 * density 2 = 4 against hardness 10
        assert_eq!(shallow.stress_ratio, Scalar::from_f32(0.4));
        assert!(!shallow.is_failed());

        let deep = model.evaluate_full(&Point3::from_ints(0, 0, 10), 0, &mut QueryBudget::unbounded());
        // depth 10 * 2 = 20 against 10
        assert_eq!(deep.stress_ratio, Scalar::from_int(2));
        assert!(deep.is_failed());
        assert_eq!(deep.category(), 3);
    }

    #[test]
    fn unknown_upstream_marks_sample_unknown() {
        let sample = model(true).evaluate_full(&Point3::from_ints(0, 0, 0), 0, &mut QueryBudget::unbounded());
        assert!(sample.is_unknown());
    }
}
