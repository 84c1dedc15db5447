//! Travel cost field: per-mode movement cost over terrain.

use serde::{Deserialize, Serialize};

use crate::domain::{FieldModel, FieldProvider, FieldSample, QueryBudget, SampleFlags};
use crate::geometry::Point3;
use crate::hashing::{mix64, FixtureHash};
use crate::scalar::{scalar_from_f32, Scalar};
use crate::scheduler::Tick;

use super::TerrainFields;

pub const TRAVEL_MODE_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TravelMode {
    Foot,
    Pack,
    Mechanized,
    Naval,
}

impl TravelMode {
    pub const ALL: [TravelMode; TRAVEL_MODE_COUNT] = [
        TravelMode::Foot,
        TravelMode::Pack,
        TravelMode::Mechanized,
        TravelMode::Naval,
    ];

    pub fn id(self) -> u32 {
        self as u32
    }

    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    fn bit(self) -> u8 {
        1 << self.id()
    }

    pub fn is_land(self) -> bool {
        !matches!(self, TravelMode::Naval)
    }
}

/// Base cost per unit distance for each mode on flat open ground.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementProfile {
    pub foot: f32,
    pub pack: f32,
    pub mechanized: f32,
    pub naval: f32,
}

impl Default for MovementProfile {
    fn default() -> Self {
        Self {
            foot: 1.0,
            pack: 1.4,
            mechanized: 0.8,
            naval: 1.2,
        }
    }
}

impl MovementProfile {
    fn costs(&self) -> [Scalar; TRAVEL_MODE_COUNT] {
        [
            scalar_from_f32(self.foot),
            scalar_from_f32(self.pack),
            scalar_from_f32(self.mechanized),
            scalar_from_f32(self.naval),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TravelParams {
    pub movement: MovementProfile,
    pub slope_penalty: f32,
    pub roughness_penalty: f32,
    /// Steepest slope mechanized travel accepts.
    pub max_slope: f32,
    /// Obstacle probability per cell, in 1/65536ths.
    pub obstacle_density: u32,
    pub obstacle_cell: f32,
    /// Distance used for the finite-difference slope.
    pub probe: f32,
}

impl Default for TravelParams {
    fn default() -> Self {
        Self {
            movement: MovementProfile::default(),
            slope_penalty: 2.0,
            roughness_penalty: 0.5,
            max_slope: 0.6,
            obstacle_density: 2_048,
            obstacle_cell: 4.0,
            probe: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TravelSample {
    pub elevation: Scalar,
    pub slope: Scalar,
    pub roughness: Scalar,
    pub costs: [Scalar; TRAVEL_MODE_COUNT],
    /// Bit per [`TravelMode`] that may enter this point.
    pub passable: u8,
    pub flags: SampleFlags,
}

impl TravelSample {
    /// Cost of entering this point in `mode`, `None` when it cannot be
    /// entered or is not known.
    pub fn cost(&self, mode: TravelMode) -> Option<Scalar> {
        if self.is_unknown() || self.flags.contains(SampleFlags::OBSTACLE) {
            return None;
        }
        (self.passable & mode.bit() != 0).then(|| self.costs[mode.id() as usize])
    }

    pub fn is_water(&self) -> bool {
        self.passable & TravelMode::Naval.bit() != 0
    }
}

impl FieldSample for TravelSample {
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
        self.costs[TravelMode::Foot.id() as usize]
    }

    /// 0 open land, 1 water, 2 obstacle, 3 unknown.
    fn category(&self) -> usize {
        if self.is_unknown() {
            3
        } else if self.flags.contains(SampleFlags::OBSTACLE) {
            2
        } else if self.is_water() {
            1
        } else {
            0
        }
    }

    fn from_aggregate(value: Scalar, flags: SampleFlags) -> Self {
        Self {
            costs: [value; TRAVEL_MODE_COUNT],
            flags,
            ..Self::default()
        }
    }

    /// Order: elevation, slope, roughness, the four mode costs, passable
    /// mask, flag bits.
    fn hash_into(&self, hash: &mut FixtureHash) {
        hash.push_scalar(self.elevation);
        hash.push_scalar(self.slope);
        hash.push_scalar(self.roughness);
        for cost in self.costs {
            hash.push_scalar(cost);
        }
        hash.push_u32(u32::from(self.passable));
        hash.push_u32(self.flags.bits());
    }
}

/// Movement costs derived from an upstream terrain provider.
#[derive(Debug, Clone)]
pub struct TravelModel<P> {
    provider: P,
    seed: u64,
    base_costs: [Scalar; TRAVEL_MODE_COUNT],
    slope_penalty: Scalar,
    roughness_penalty: Scalar,
    max_slope: Scalar,
    obstacle_density: u32,
    obstacle_cell: Scalar,
    probe: Scalar,
}

impl<P> TravelModel<P> {
    pub fn new(provider: P, seed: u64, params: &TravelParams) -> Self {
        Self {
            provider,
            seed,
            base_costs: params.movement.costs(),
            slope_penalty: scalar_from_f32(params.slope_penalty),
            roughness_penalty: scalar_from_f32(params.roughness_penalty),
            max_slope: scalar_from_f32(params.max_slope),
            obstacle_density: params.obstacle_density.min(1 << 16),
            obstacle_cell: scalar_from_f32(params.obstacle_cell.max(1.0)),
            probe: scalar_from_f32(params.probe.max(0.25)),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn base_cost(&self, mode: TravelMode) -> Scalar {
        self.base_costs[mode.id() as usize]
    }

    /// Procedural obstacle test; depends only on the cell and the seed.
    pub fn is_obstacle(&self, point: &Point3) -> bool {
        if self.obstacle_density == 0 {
            return false;
        }
        let cx = (point.x / self.obstacle_cell).floor_to_int();
        let cy = (point.y / self.obstacle_cell).floor_to_int();
        let roll = mix64(mix64(self.seed, cx as u64), cy as u64) & 0xFFFF;
        roll < u64::from(self.obstacle_density)
    }

    fn blocked(elevation: Scalar, roughness: Scalar) -> TravelSample {
        TravelSample {
            elevation,
            roughness,
            flags: SampleFlags::OBSTACLE,
            ..TravelSample::default()
        }
    }

    fn classify(&self, fields: &TerrainFields, slope: Scalar) -> TravelSample {
        if fields.water {
            let naval = TravelMode::Naval;
            let mut costs = [Scalar::ZERO; TRAVEL_MODE_COUNT];
            costs[naval.id() as usize] = self.base_cost(naval);
            return TravelSample {
                elevation: fields.elevation,
                slope,
                roughness: fields.roughness,
                costs,
                passable: naval.bit(),
                flags: SampleFlags::empty(),
            };
        }

        let factor = Scalar::ONE + slope * self.slope_penalty + fields.roughness * self.roughness_penalty;
        let mut costs = [Scalar::ZERO; TRAVEL_MODE_COUNT];
        let mut passable = 0u8;
        for mode in TravelMode::ALL.into_iter().filter(|m| m.is_land()) {
            if mode == TravelMode::Mechanized && slope > self.max_slope {
                continue;
            }
            costs[mode.id() as usize] = self.base_cost(mode) * factor;
            passable |= mode.bit();
        }
        TravelSample {
            elevation: fields.elevation,
            slope,
            roughness: fields.roughness,
            costs,
            passable,
            flags: SampleFlags::empty(),
        }
    }
}

impl<P> FieldModel for TravelModel<P>
where
    P: FieldProvider<Fields = TerrainFields>,
{
    type Sample = TravelSample;

    fn evaluate_full(&self, point: &Point3, _tick: Tick, budget: &mut QueryBudget) -> TravelSample {
        let here = self.provider.sample_query(point, budget);
        let east = self
            .provider
            .sample_query(&point.offset_xy(self.probe, Scalar::ZERO), budget);
        let north = self
            .provider
            .sample_query(&point.offset_xy(Scalar::ZERO, self.probe), budget);
        if here.unknown || east.unknown || north.unknown {
            return TravelSample::unknown();
        }

        let fields = here.fields;
        if fields.obstruction || self.is_obstacle(point) {
            return Self::blocked(fields.elevation, fields.roughness);
        }
        let rise = (east.fields.elevation - fields.elevation)
            .abs()
            .max((north.fields.elevation - fields.elevation).abs());
        self.classify(&fields, rise / self.probe)
    }

    fn evaluate_analytic(&self, point: &Point3, _tick: Tick) -> Option<TravelSample> {
        if self.is_obstacle(point) {
            return Some(Self::blocked(Scalar::ZERO, Scalar::ZERO));
        }
        Some(self.classify(&TerrainFields::default(), Scalar::ZERO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ProviderSample;

    /// Plane rising `grade` per unit of x; water where x < 0.
    #[derive(Debug, Clone)]
    struct Incline {
        grade: Scalar,
    }

    impl FieldProvider for Incline {
        type Fields = TerrainFields;

        fn sample_query(&self, point: &Point3, budget: &mut QueryBudget) -> ProviderSample<TerrainFields> {
            if !budget.consume(1) {
                return ProviderSample::unknown();
            }
            ProviderSample::known(TerrainFields {
                elevation: point.x * self.grade,
                water: point.x < Scalar::ZERO,
                ..TerrainFields::default()
            })
        }
    }

    fn model(grade: f32) -> TravelModel<Incline> {
        let params = TravelParams {
            obstacle_density: 0,
            ..TravelParams::default()
        };
        TravelModel::new(
            Incline {
                grade: Scalar::from_f32(grade),
            },
            7,
            &params,
        )
    }

    #[test]
    fn mode_ids_round_trip() {
        for mode in TravelMode::ALL {
            assert_eq!(TravelMode::from_id(mode.id()), Some(mode));
        }
        assert_eq!(TravelMode::from_id(4), None);
    }

    #[test]
    fn flat_land_costs_base() {
        let sample = model(0.0).evaluate_full(&Point3::from_ints(3, 3, 0), 0, &mut QueryBudget::unbounded());
        assert_eq!(sample.cost(TravelMode::Foot), Some(Scalar::ONE));
        assert_eq!(sample.cost(TravelMode::Naval), None);
        assert_eq!(sample.category(), 0);
    }

    #[test]
    fn water_admits_only_naval() {
        let sample = model(0.0).evaluate_full(&Point3::from_ints(-5, 0, 0), 0, &mut QueryBudget::unbounded());
        assert!(sample.is_water());
        assert_eq!(sample.cost(TravelMode::Foot), None);
        assert_eq!(sample.cost(TravelMode::Naval), Some(Scalar::from_f32(1.2)));
    }

    #[test]
    fn steep_ground_excludes_mechanized() {
        let sample = model(1.0).evaluate_full(&Point3::from_ints(3, 3, 0), 0, &mut QueryBudget::unbounded());
        assert_eq!(sample.slope, Scalar::ONE);
        assert_eq!(sample.cost(TravelMode::Mechanized), None);
        // 1 + slope 1 * penalty 2
        assert_eq!(sample.cost(TravelMode::Foot), Some(Scalar::from_int(3)));
    }

    #[test]
    fn any_unknown_upstream_is_contagious() {
        let mut budget = QueryBudget::new(2);
        let sample = model(0.0).evaluate_full(&Point3::from_ints(3, 3, 0), 0, &mut budget);
        assert!(sample.is_unknown());
        assert_eq!(sample.cost(TravelMode::Foot), None);
    }

    #[test]
    fn obstacles_are_a_pure_function_of_cell_and_seed() {
        let params = TravelParams {
            obstacle_density: 1 << 15,
            ..TravelParams::default()
        };
        let a = TravelModel::new(Incline { grade: Scalar::ZERO }, 11, &params);
        let b = TravelModel::new(Incline { grade: Scalar::ZERO }, 11, &params);
        let mut blocked = 0;
        for x in 0..32 {
            for y in 0..32 {
                let p = Point3::from_ints(x, y, 0);
                assert_eq!(a.is_obstacle(&p), b.is_obstacle(&p));
                // same 4x4 cell
                assert_eq!(a.is_obstacle(&p), a.is_obstacle(&Point3::from_ints(x - x % 4, y - y % 4, 0)));
                blocked += usize::from(a.is_obstacle(&p));
            }
        }
        assert!(blocked > 0 && blocked < 32 * 32);
    }
}
