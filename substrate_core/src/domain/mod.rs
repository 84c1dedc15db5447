//! Multi-resolution, budgeted field queries.
//!
//! A query walks the resolution ladder Full → Medium → Coarse → Analytic and
//! stops at the first rung that the domain policy permits and the budget can
//! pay for. Medium and Coarse answer from cached tiles; Full and Analytic
//! evaluate directly. Anything the ladder cannot answer comes back as a typed
//! refusal with an unknown sample, never as a fabricated value.

mod capsule;
mod engine;
mod tile;

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{Aabb, Point3, TileCoord};
use crate::hashing::FixtureHash;
use crate::scalar::Scalar;
use crate::scheduler::Tick;

pub use capsule::{Capsule, CAPSULE_BINS, CAPSULE_CATEGORIES};
pub use engine::{DomainQueryEngine, QueryStats};
pub use tile::{Tile, TileKey};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    #[default]
    Full,
    Medium,
    Coarse,
    Analytic,
}

/// Ladder order, finest first.
pub const LADDER: [Resolution; 4] = [
    Resolution::Full,
    Resolution::Medium,
    Resolution::Coarse,
    Resolution::Analytic,
];

impl Resolution {
    pub fn code(self) -> u8 {
        match self {
            Resolution::Full => 0,
            Resolution::Medium => 1,
            Resolution::Coarse => 2,
            Resolution::Analytic => 3,
        }
    }

    pub fn is_tiled(self) -> bool {
        matches!(self, Resolution::Medium | Resolution::Coarse)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Confidence {
    Exact,
    LowerBound,
    Unknown,
}

impl Confidence {
    pub fn code(self) -> u8 {
        match self {
            Confidence::Exact => 0,
            Confidence::LowerBound => 1,
            Confidence::Unknown => 2,
        }
    }

    /// Confidence implied by answering at `resolution`.
    pub fn for_resolution(resolution: Resolution) -> Self {
        match resolution {
            Resolution::Full | Resolution::Analytic => Confidence::Exact,
            Resolution::Medium | Resolution::Coarse => Confidence::LowerBound,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefusalReason {
    DomainInactive,
    NoSource,
    Budget,
    NoAnalytic,
    Internal,
    Policy,
}

impl RefusalReason {
    pub fn code(self) -> u8 {
        match self {
            RefusalReason::DomainInactive => 1,
            RefusalReason::NoSource => 2,
            RefusalReason::Budget => 3,
            RefusalReason::NoAnalytic => 4,
            RefusalReason::Internal => 5,
            RefusalReason::Policy => 6,
        }
    }
}

impl fmt::Display for RefusalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RefusalReason::DomainInactive => "domain_inactive",
            RefusalReason::NoSource => "no_source",
            RefusalReason::Budget => "budget",
            RefusalReason::NoAnalytic => "no_analytic",
            RefusalReason::Internal => "internal",
            RefusalReason::Policy => "policy",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryStatus {
    Ok,
    Refused(RefusalReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryMeta {
    pub status: QueryStatus,
    /// Rung that produced the answer; `None` for refusals and
    /// out-of-bounds answers.
    pub resolution: Option<Resolution>,
    pub confidence: Confidence,
    pub cost_units: u32,
}

impl QueryMeta {
    pub fn ok(resolution: Option<Resolution>, confidence: Confidence, cost_units: u32) -> Self {
        Self {
            status: QueryStatus::Ok,
            resolution,
            confidence,
            cost_units,
        }
    }

    pub fn refused(reason: RefusalReason, cost_units: u32) -> Self {
        Self {
            status: QueryStatus::Refused(reason),
            resolution: None,
            confidence: Confidence::Unknown,
            cost_units,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == QueryStatus::Ok
    }

    pub fn refusal(&self) -> Option<RefusalReason> {
        match self.status {
            QueryStatus::Ok => None,
            QueryStatus::Refused(reason) => Some(reason),
        }
    }

    /// Digest order: status (0 ok / 1 refused), refusal code (0 if none),
    /// resolution code (255 if none), confidence code, cost units.
    pub fn hash_into(&self, hash: &mut FixtureHash) {
        hash.push_u32(u32::from(!self.is_ok()));
        hash.push_u32(self.refusal().map_or(0, |r| u32::from(r.code())));
        hash.push_u32(self.resolution.map_or(255, |r| u32::from(r.code())));
        hash.push_u32(u32::from(self.confidence.code()));
        hash.push_u32(self.cost_units);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult<S> {
    pub sample: S,
    pub meta: QueryMeta,
}

impl<S: FieldSample> QueryResult<S> {
    /// Sample digest followed by the meta digest.
    pub fn hash_into(&self, hash: &mut FixtureHash) {
        self.sample.hash_into(hash);
        self.meta.hash_into(hash);
    }
}

/// Upper bound on samples per tile axis.
pub const MAX_SAMPLE_DIM: u32 = 256;

/// Work-unit counter bounding a single query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryBudget {
    limit: u32,
    used: u32,
    denied: u32,
}

impl QueryBudget {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            used: 0,
            denied: 0,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(u32::MAX)
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn remaining(&self) -> u32 {
        self.limit - self.used
    }

    /// Number of charges turned away so far.
    pub fn denied(&self) -> u32 {
        self.denied
    }

    /// Returns charges made after `used` was observed. Denials are kept.
    pub fn rewind(&mut self, used: u32) {
        self.used = self.used.min(used);
    }

    pub fn can_afford(&self, cost: u32) -> bool {
        cost <= self.remaining()
    }

    /// Charges `cost` if affordable; returns whether it was charged.
    pub fn consume(&mut self, cost: u32) -> bool {
        if !self.can_afford(cost) {
            self.denied = self.denied.saturating_add(1);
            return false;
        }
        self.used += cost;
        true
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct SampleFlags: u32 {
        const FIELDS_UNKNOWN = 1 << 0;
        const OBSTACLE = 1 << 1;
        const COLLAPSED = 1 << 2;
        const OUTSIDE = 1 << 3;
    }
}

/// Field values produced by a [`FieldModel`].
pub trait FieldSample: Clone + fmt::Debug {
    /// Sample with every field unknown.
    fn unknown() -> Self;

    fn flags(&self) -> SampleFlags;

    fn insert_flags(&mut self, flags: SampleFlags);

    fn is_unknown(&self) -> bool {
        self.flags().contains(SampleFlags::FIELDS_UNKNOWN)
    }

    /// Field summarised by capsule histograms.
    fn aggregate_value(&self) -> Scalar;

    /// Capsule category, below [`CAPSULE_CATEGORIES`].
    fn category(&self) -> usize;

    /// Representative sample rebuilt from a capsule aggregate.
    fn from_aggregate(value: Scalar, flags: SampleFlags) -> Self;

    /// Emits the documented fields, in documented order.
    fn hash_into(&self, hash: &mut FixtureHash);
}

/// Evaluator behind a domain.
pub trait FieldModel {
    type Sample: FieldSample;

    /// Full-fidelity evaluation. Upstream providers draw on `budget`; an
    /// upstream unknown must mark the returned sample unknown.
    fn evaluate_full(&self, point: &Point3, tick: Tick, budget: &mut QueryBudget) -> Self::Sample;

    /// Cheap closed form, if the model has one.
    fn evaluate_analytic(&self, point: &Point3, tick: Tick) -> Option<Self::Sample>;
}

/// Upstream field collaborator (terrain, geology, weather).
pub trait FieldProvider {
    type Fields: Clone + Default + fmt::Debug;

    fn sample_query(&self, point: &Point3, budget: &mut QueryBudget) -> ProviderSample<Self::Fields>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderSample<F> {
    pub fields: F,
    pub unknown: bool,
}

impl<F: Default> ProviderSample<F> {
    pub fn known(fields: F) -> Self {
        Self {
            fields,
            unknown: false,
        }
    }

    pub fn unknown() -> Self {
        Self {
            fields: F::default(),
            unknown: true,
        }
    }
}

/// Which rungs a domain may use. A rung finer than `max_resolution` is
/// never attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainPolicy {
    pub max_resolution: Resolution,
    pub allow_full: bool,
    pub allow_medium: bool,
    pub allow_coarse: bool,
    pub allow_analytic: bool,
}

impl Default for DomainPolicy {
    fn default() -> Self {
        Self {
            max_resolution: Resolution::Full,
            allow_full: true,
            allow_medium: true,
            allow_coarse: true,
            allow_analytic: true,
        }
    }
}

impl DomainPolicy {
    pub fn permits(&self, resolution: Resolution) -> bool {
        if resolution < self.max_resolution {
            return false;
        }
        match resolution {
            Resolution::Full => self.allow_full,
            Resolution::Medium => self.allow_medium,
            Resolution::Coarse => self.allow_coarse,
            Resolution::Analytic => self.allow_analytic,
        }
    }
}

/// Declared work units per rung. Tile build costs are charged on a cache
/// miss on top of the rung cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainCosts {
    pub full: u32,
    pub medium: u32,
    pub coarse: u32,
    pub analytic: u32,
    pub medium_tile_build: u32,
    pub coarse_tile_build: u32,
}

impl Default for DomainCosts {
    fn default() -> Self {
        Self {
            full: 64,
            medium: 16,
            coarse: 4,
            analytic: 1,
            medium_tile_build: 256,
            coarse_tile_build: 64,
        }
    }
}

impl DomainCosts {
    pub fn rung(&self, resolution: Resolution) -> u32 {
        match resolution {
            Resolution::Full => self.full,
            Resolution::Medium => self.medium,
            Resolution::Coarse => self.coarse,
            Resolution::Analytic => self.analytic,
        }
    }

    pub fn tile_build(&self, resolution: Resolution) -> u32 {
        match resolution {
            Resolution::Medium => self.medium_tile_build,
            Resolution::Coarse => self.coarse_tile_build,
            Resolution::Full | Resolution::Analytic => 0,
        }
    }
}

/// Static description of one query domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainDesc {
    pub domain_id: u64,
    pub bounds: Aabb,
    pub seed: u64,
    pub authoring_version: u32,
    pub tile_size: Scalar,
    pub medium_dim: u32,
    pub coarse_dim: u32,
    pub costs: DomainCosts,
    pub policy: DomainPolicy,
    pub tile_cache_capacity: usize,
    pub capsule_capacity: usize,
    pub active: bool,
}

impl Default for DomainDesc {
    fn default() -> Self {
        Self {
            domain_id: 1,
            bounds: Aabb::new(Point3::from_ints(0, 0, 0), Point3::from_ints(256, 256, 64)),
            seed: 0,
            authoring_version: 1,
            tile_size: Scalar::from_int(16),
            medium_dim: 8,
            coarse_dim: 4,
            costs: DomainCosts::default(),
            policy: DomainPolicy::default(),
            tile_cache_capacity: 128,
            capsule_capacity: 32,
            active: true,
        }
    }
}

impl DomainDesc {
    pub fn new(domain_id: u64, bounds: Aabb) -> Self {
        Self {
            domain_id,
            bounds,
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_costs(mut self, costs: DomainCosts) -> Self {
        self.costs = costs;
        self
    }

    pub fn with_policy(mut self, policy: DomainPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn sample_dim(&self, resolution: Resolution) -> u32 {
        match resolution {
            Resolution::Medium => self.medium_dim.clamp(1, MAX_SAMPLE_DIM),
            Resolution::Coarse => self.coarse_dim.clamp(1, MAX_SAMPLE_DIM),
            Resolution::Full | Resolution::Analytic => 1,
        }
    }

    pub fn tile_coord(&self, point: &Point3) -> TileCoord {
        TileCoord::containing(point, self.tile_size)
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DomainError {
    #[error("domain {domain_id} is inactive")]
    Inactive { domain_id: u64 },
    #[error("domain {domain_id} holds {capacity} capsules already")]
    CapsuleFull { domain_id: u64, capacity: usize },
    #[error("tile {tile_id:#x} lies outside domain {domain_id}")]
    OutsideBounds { domain_id: u64, tile_id: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_never_goes_finer_than_cap() {
        let policy = DomainPolicy {
            max_resolution: Resolution::Medium,
            ..DomainPolicy::default()
        };
        assert!(!policy.permits(Resolution::Full));
        assert!(policy.permits(Resolution::Medium));
        assert!(policy.permits(Resolution::Coarse));
        assert!(policy.permits(Resolution::Analytic));
    }

    #[test]
    fn budget_refuses_overdraw() {
        let mut budget = QueryBudget::new(10);
        assert!(budget.consume(6));
        assert!(!budget.consume(5));
        assert_eq!(budget.remaining(), 4);
        assert!(budget.consume(4));
        assert_eq!(budget.used(), 10);
        assert_eq!(budget.denied(), 1);

        budget.rewind(6);
        assert_eq!(budget.remaining(), 4);
        assert_eq!(budget.denied(), 1);
    }

    #[test]
    fn oversized_sample_dims_are_capped() {
        let mut desc = DomainDesc::new(
            1,
            Aabb::new(Point3::from_ints(0, 0, 0), Point3::from_ints(8, 8, 8)),
        );
        desc.medium_dim = 4_000;
        desc.coarse_dim = 0;
        assert_eq!(desc.sample_dim(Resolution::Medium), MAX_SAMPLE_DIM);
        assert_eq!(desc.sample_dim(Resolution::Coarse), 1);
    }

    #[test]
    fn confidence_tracks_resolution() {
        assert_eq!(Confidence::for_resolution(Resolution::Full), Confidence::Exact);
        assert_eq!(
            Confidence::for_resolution(Resolution::Medium),
            Confidence::LowerBound
        );
        assert_eq!(
            Confidence::for_resolution(Resolution::Coarse),
            Confidence::LowerBound
        );
        assert_eq!(
            Confidence::for_resolution(Resolution::Analytic),
            Confidence::Exact
        );
    }

    #[test]
    fn desc_deserializes_with_defaults() {
        let desc: DomainDesc =
            serde_json::from_str(r#"{ "domain_id": 9, "policy": { "max_resolution": "coarse" } }"#)
                .expect("desc parses");
        assert_eq!(desc.domain_id, 9);
        assert_eq!(desc.policy.max_resolution, Resolution::Coarse);
        assert_eq!(desc.medium_dim, 8);
        assert!(desc.active);
    }
}
