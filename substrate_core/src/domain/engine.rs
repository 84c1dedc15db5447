use tracing::{debug, trace};

use crate::cache::{CacheStats, DeterministicCache};
use crate::geometry::{Point3, TileCoord};
use crate::hashing::tile_id;
use crate::scheduler::Tick;

use super::{
    Capsule, Confidence, DomainDesc, DomainError, DomainPolicy, FieldModel, FieldSample,
    QueryBudget, QueryMeta, QueryResult, RefusalReason, Resolution, SampleFlags, Tile, TileKey,
    LADDER,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryStats {
    pub queries: u64,
    pub refused: u64,
    pub answered_full: u64,
    pub answered_medium: u64,
    pub answered_coarse: u64,
    pub answered_analytic: u64,
    pub answered_collapsed: u64,
    pub outside_bounds: u64,
    pub tiles_built: u64,
    /// Full evaluations abandoned because an upstream provider ran dry.
    pub full_starved: u64,
}

/// Answers point queries for one domain through the resolution ladder.
#[derive(Debug)]
pub struct DomainQueryEngine<M: FieldModel> {
    desc: DomainDesc,
    model: M,
    tiles: DeterministicCache<TileKey, Tile<M::Sample>>,
    capsules: Vec<Capsule>,
    stats: QueryStats,
}

/// Why a rung was passed over; decides the refusal reason.
#[derive(Debug, Default)]
struct LadderMisses {
    permitted: bool,
    over_budget: bool,
    no_analytic: bool,
}

impl<M: FieldModel> DomainQueryEngine<M> {
    pub fn new(desc: DomainDesc, model: M) -> Self {
        let tiles = DeterministicCache::new(desc.tile_cache_capacity);
        let capsules = Vec::with_capacity(desc.capsule_capacity);
        Self {
            desc,
            model,
            tiles,
            capsules,
            stats: QueryStats::default(),
        }
    }

    pub fn desc(&self) -> &DomainDesc {
        &self.desc
    }

    pub fn domain_id(&self) -> u64 {
        self.desc.domain_id
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn stats(&self) -> QueryStats {
        self.stats
    }

    pub fn tile_cache_stats(&self) -> CacheStats {
        self.tiles.stats()
    }

    pub fn cached_tiles(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_tile_cached(&self, point: &Point3, resolution: Resolution) -> bool {
        let key = TileKey::for_coord(&self.desc, self.desc.tile_coord(point), resolution);
        self.tiles.contains(&key)
    }

    pub fn capsules(&self) -> &[Capsule] {
        &self.capsules
    }

    /// Capsule covering the tile that owns `point`.
    pub fn capsule_for(&self, point: &Point3) -> Option<&Capsule> {
        let coord = self.desc.tile_coord(point);
        self.capsules.iter().find(|capsule| capsule.coord == coord)
    }

    pub fn capsule_mut(&mut self, tile_id: u64) -> Option<&mut Capsule> {
        self.capsules.iter_mut().find(|c| c.tile_id == tile_id)
    }

    pub fn set_policy(&mut self, policy: DomainPolicy) {
        self.desc.policy = policy;
        self.invalidate_tiles("policy_changed");
    }

    pub fn set_active(&mut self, active: bool) {
        self.desc.active = active;
        self.invalidate_tiles("activity_changed");
    }

    /// Marks authored content as changed; every cached tile is rebuilt on
    /// next use.
    pub fn bump_authoring_version(&mut self) -> u32 {
        self.desc.authoring_version = self.desc.authoring_version.wrapping_add(1);
        self.invalidate_tiles("authoring_changed");
        self.desc.authoring_version
    }

    fn invalidate_tiles(&mut self, reason: &'static str) {
        let dropped = self.tiles.invalidate_owner(self.desc.domain_id);
        debug!(
            target: "substrate::domain",
            domain = self.desc.domain_id,
            dropped,
            reason,
            "tiles.invalidated"
        );
    }

    /// Samples the domain at `point`, charging `budget` for the work done.
    pub fn sample(
        &mut self,
        point: &Point3,
        tick: Tick,
        budget: &mut QueryBudget,
    ) -> QueryResult<M::Sample> {
        self.stats.queries += 1;
        let spent_before = budget.used();

        if !self.desc.active {
            self.stats.refused += 1;
            return refused(RefusalReason::DomainInactive, 0);
        }

        if !self.desc.bounds.contains(point) {
            self.stats.outside_bounds += 1;
            let mut sample = M::Sample::unknown();
            sample.insert_flags(SampleFlags::OUTSIDE);
            return QueryResult {
                sample,
                meta: QueryMeta::ok(None, Confidence::Unknown, 0),
            };
        }

        if let Some(capsule) = self.capsule_for(point) {
            let sample = M::Sample::from_aggregate(
                capsule.mean,
                SampleFlags::COLLAPSED | SampleFlags::FIELDS_UNKNOWN,
            );
            self.stats.answered_collapsed += 1;
            return QueryResult {
                sample,
                meta: QueryMeta::ok(Some(Resolution::Coarse), Confidence::Unknown, 0),
            };
        }

        let mut misses = LadderMisses::default();
        for resolution in LADDER {
            if !self.desc.policy.permits(resolution) {
                continue;
            }
            misses.permitted = true;

            let answer = match resolution {
                Resolution::Full => self.try_full(point, tick, budget),
                Resolution::Medium | Resolution::Coarse => {
                    self.try_tiled(point, tick, resolution, budget)
                }
                Resolution::Analytic => match self.model.evaluate_analytic(point, tick) {
                    None => {
                        misses.no_analytic = true;
                        continue;
                    }
                    Some(sample) => budget
                        .consume(self.desc.costs.analytic)
                        .then_some(sample),
                },
            };

            let Some(sample) = answer else {
                misses.over_budget = true;
                continue;
            };

            self.count_answer(resolution);
            let confidence = if sample.is_unknown() {
                Confidence::Unknown
            } else {
                Confidence::for_resolution(resolution)
            };
            let cost = budget.used() - spent_before;
            trace!(
                target: "substrate::domain",
                domain = self.desc.domain_id,
                ?resolution,
                cost,
                "query.answered"
            );
            return QueryResult {
                sample,
                meta: QueryMeta::ok(Some(resolution), confidence, cost),
            };
        }

        let reason = if misses.over_budget {
            RefusalReason::Budget
        } else if misses.no_analytic {
            RefusalReason::NoAnalytic
        } else if !misses.permitted {
            RefusalReason::Policy
        } else {
            RefusalReason::Internal
        };
        self.stats.refused += 1;
        trace!(
            target: "substrate::domain",
            domain = self.desc.domain_id,
            %reason,
            remaining = budget.remaining(),
            "query.refused"
        );
        refused(reason, budget.used() - spent_before)
    }

    fn try_full(
        &mut self,
        point: &Point3,
        tick: Tick,
        budget: &mut QueryBudget,
    ) -> Option<M::Sample> {
        let used_before = budget.used();
        let denied_before = budget.denied();
        if !budget.consume(self.desc.costs.full) {
            return None;
        }
        let sample = self.model.evaluate_full(point, tick, budget);
        // an upstream charge was turned away: the rung was not affordable
        if sample.is_unknown() && budget.denied() > denied_before {
            budget.rewind(used_before);
            self.stats.full_starved += 1;
            return None;
        }
        Some(sample)
    }

    fn try_tiled(
        &mut self,
        point: &Point3,
        tick: Tick,
        resolution: Resolution,
        budget: &mut QueryBudget,
    ) -> Option<M::Sample> {
        let coord = self.desc.tile_coord(point);
        let key = TileKey::for_coord(&self.desc, coord, resolution);
        let tile_size = self.desc.tile_size;
        let rung_cost = self.desc.costs.rung(resolution);

        if self.tiles.contains(&key) {
            if !budget.consume(rung_cost) {
                return None;
            }
            return self
                .tiles
                .get(&key)
                .and_then(|tile| tile.nearest(point, tile_size))
                .cloned();
        }

        let build_cost = rung_cost.saturating_add(self.desc.costs.tile_build(resolution));
        if !budget.consume(build_cost) {
            return None;
        }
        let tile = self.build_tile(coord, resolution, tick);
        let sample = tile.nearest(point, tile_size).cloned();
        if self.tiles.put(key, tile).is_none() {
            trace!(
                target: "substrate::domain",
                domain = self.desc.domain_id,
                "tile.uncached"
            );
        }
        sample
    }

    fn build_tile(&mut self, coord: TileCoord, resolution: Resolution, tick: Tick) -> Tile<M::Sample> {
        let model = &self.model;
        let dim = self.desc.sample_dim(resolution);
        let tile = Tile::build(coord, resolution, self.desc.tile_size, dim, |p| {
            let mut build_budget = QueryBudget::unbounded();
            model.evaluate_full(p, tick, &mut build_budget)
        });
        self.stats.tiles_built += 1;
        debug!(
            target: "substrate::domain",
            domain = self.desc.domain_id,
            tile_id = tile.tile_id,
            ?resolution,
            samples = tile.len(),
            "tile.built"
        );
        tile
    }

    fn count_answer(&mut self, resolution: Resolution) {
        match resolution {
            Resolution::Full => self.stats.answered_full += 1,
            Resolution::Medium => self.stats.answered_medium += 1,
            Resolution::Coarse => self.stats.answered_coarse += 1,
            Resolution::Analytic => self.stats.answered_analytic += 1,
        }
    }

    /// Replaces the tile at `coord` with a statistical capsule. Queries inside
    /// the capsule bounds answer from the aggregate until it is expanded.
    pub fn collapse_tile(&mut self, coord: TileCoord, tick: Tick) -> Result<&Capsule, DomainError> {
        let domain_id = self.desc.domain_id;
        if !self.desc.active {
            return Err(DomainError::Inactive { domain_id });
        }
        let id = tile_id(coord, Resolution::Coarse);
        let bounds = coord.bounds(self.desc.tile_size);
        if !bounds.intersects(&self.desc.bounds) {
            return Err(DomainError::OutsideBounds {
                domain_id,
                tile_id: id,
            });
        }

        let existing = self.capsules.iter().position(|c| c.tile_id == id);
        if existing.is_none() && self.capsules.len() >= self.desc.capsule_capacity {
            return Err(DomainError::CapsuleFull {
                domain_id,
                capacity: self.desc.capsule_capacity,
            });
        }

        let dim = self.desc.sample_dim(Resolution::Coarse);
        let model = &self.model;
        let grid = Tile::build(coord, Resolution::Coarse, self.desc.tile_size, dim, |p| {
            let mut build_budget = QueryBudget::unbounded();
            model.evaluate_full(p, tick, &mut build_budget)
        });
        let capsule = Capsule::from_samples(
            domain_id,
            self.desc.seed,
            id,
            coord,
            bounds,
            tick,
            grid.samples(),
        );

        self.invalidate_tiles("tile_collapsed");
        debug!(
            target: "substrate::domain",
            domain = domain_id,
            tile_id = id,
            tick,
            samples = capsule.sample_count,
            "tile.collapsed"
        );

        let slot = match existing {
            Some(idx) => {
                self.capsules[idx] = capsule;
                idx
            }
            None => {
                self.capsules.push(capsule);
                self.capsules.len() - 1
            }
        };
        Ok(&self.capsules[slot])
    }

    /// Removes the capsule for `tile_id`, returning the region to full
    /// simulation.
    pub fn expand_tile(&mut self, tile_id: u64) -> Option<Capsule> {
        let idx = self.capsules.iter().position(|c| c.tile_id == tile_id)?;
        let capsule = self.capsules.remove(idx);
        debug!(
            target: "substrate::domain",
            domain = self.desc.domain_id,
            tile_id,
            "tile.expanded"
        );
        Some(capsule)
    }
}

fn refused<S: FieldSample>(reason: RefusalReason, cost_units: u32) -> QueryResult<S> {
    QueryResult {
        sample: S::unknown(),
        meta: QueryMeta::refused(reason, cost_units),
    }
}
