//! Deterministic simulation substrate.
//!
//! Provides the lazy due-event scheduler, a deterministic eviction cache, the
//! budgeted multi-resolution domain query and a hierarchical pathfinder built
//! on top of it. Everything runs on fixed-point [`Scalar`] values so identical
//! inputs produce identical digests on every platform. The [`app`] module wires
//! the scheduler into a headless Bevy [`bevy::app::App`] whose turns are driven
//! by [`run_turn`].

pub mod app;
pub mod cache;
pub mod config;
pub mod domain;
pub mod fields;
pub mod geometry;
pub mod hashing;
pub mod metrics;
pub mod pathfinding;
mod scalar;
pub mod scheduler;

pub use app::{
    build_headless_app, run_turn, DueSchedulerPlugin, DueSchedulerResource, SimulationTick,
};
pub use cache::{CacheKey, CacheStats, DeterministicCache};
pub use config::{
    load_substrate_config_from_env, SubstrateConfig, SubstrateConfigError,
    SubstrateConfigMetadata, BUILTIN_SUBSTRATE_CONFIG,
};
pub use domain::{
    Capsule, Confidence, DomainDesc, DomainError, DomainPolicy, DomainQueryEngine, FieldModel,
    FieldProvider, FieldSample, ProviderSample, QueryBudget, QueryMeta, QueryResult, QueryStatus,
    RefusalReason, Resolution, SampleFlags,
};
pub use fields::{
    SeededTerrain, StructuralModel, StructuralSample, TerrainFields, TravelMode, TravelModel,
    TravelSample,
};
pub use geometry::{Aabb, Point3, TileCoord};
pub use hashing::{mix64, tile_id, FixtureHash, FnvHasher};
pub use metrics::SubstrateMetrics;
pub use pathfinding::{HierarchicalPathfinder, Path, PathFlags, PathKey, PathfinderConfig};
pub use scalar::{scalar_from_f32, scalar_from_int, scalar_one, scalar_zero, Scalar};
pub use scheduler::{
    AdvanceReport, Cadence, DueEntry, DueScheduler, EntryHandle, ProcessStatus, RefreshOutcome,
    SchedulerConfig, SchedulerError, Tick,
};
