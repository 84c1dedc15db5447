//! Hierarchical A* over the travel field of a query domain.
//!
//! A coarse search lays down a waypoint skeleton; each skeleton segment is
//! then refined on the fine grid. If any segment cannot be refined the whole
//! request falls back to a single fine search. Every cell cost comes from a
//! budgeted domain query, so refused or unknown cells are simply impassable.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::cache::{CacheKey, CacheStats, DeterministicCache};
use crate::domain::{DomainQueryEngine, FieldModel, QueryBudget};
use crate::fields::{TravelMode, TravelSample};
use crate::geometry::Point3;
use crate::hashing::FixtureHash;
use crate::scalar::{scalar_from_f32, Scalar};
use crate::scheduler::Tick;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct PathFlags: u32 {
        const FOUND = 1 << 0;
        const BUDGET_EXHAUSTED = 1 << 1;
        const BLOCKED = 1 << 2;
        const INVALID_MODE = 1 << 3;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Path {
    pub points: Vec<Point3>,
    pub total_cost: Scalar,
    pub visited_nodes: u32,
    pub flags: PathFlags,
}

impl Path {
    fn failed(flags: PathFlags, visited_nodes: u32) -> Self {
        Self {
            visited_nodes,
            flags,
            ..Self::default()
        }
    }

    pub fn is_found(&self) -> bool {
        self.flags.contains(PathFlags::FOUND)
    }

    /// Digest order: flag bits, visited nodes, total cost, point count, then
    /// each point as x, y, z.
    pub fn hash_into(&self, hash: &mut FixtureHash) {
        hash.push_u32(self.flags.bits());
        hash.push_u32(self.visited_nodes);
        hash.push_scalar(self.total_cost);
        hash.push_u64(self.points.len() as u64);
        for point in &self.points {
            hash.push_point(point);
        }
    }

    pub fn digest(&self) -> u64 {
        let mut hash = FixtureHash::new();
        self.hash_into(&mut hash);
        hash.finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PathKey {
    pub domain_id: u64,
    pub origin: Point3,
    pub target: Point3,
    pub mode: TravelMode,
    pub tick: Tick,
}

impl CacheKey for PathKey {
    fn owner(&self) -> u64 {
        self.domain_id
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathfinderConfig {
    fine_step: f32,
    coarse_step: f32,
    max_nodes: u32,
    cache_capacity: usize,
    /// Lower bound on per-unit travel cost; keeps the heuristic admissible.
    heuristic_floor: f32,
}

impl Default for PathfinderConfig {
    fn default() -> Self {
        Self {
            fine_step: 1.0,
            coarse_step: 8.0,
            max_nodes: 4_096,
            cache_capacity: 64,
            heuristic_floor: 0.5,
        }
    }
}

impl PathfinderConfig {
    pub fn new(fine_step: f32, coarse_step: f32, max_nodes: u32) -> Self {
        Self {
            fine_step,
            coarse_step,
            max_nodes,
            ..Self::default()
        }
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn with_heuristic_floor(mut self, floor: f32) -> Self {
        self.heuristic_floor = floor;
        self
    }

    pub fn fine_step(&self) -> Scalar {
        scalar_from_f32(self.fine_step)
    }

    pub fn coarse_step(&self) -> Scalar {
        scalar_from_f32(self.coarse_step)
    }

    pub fn max_nodes(&self) -> u32 {
        self.max_nodes
    }

    pub fn cache_capacity(&self) -> usize {
        self.cache_capacity
    }

    pub fn heuristic_floor(&self) -> Scalar {
        scalar_from_f32(self.heuristic_floor.max(0.0))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathStats {
    pub requests: u64,
    pub cache_hits: u64,
    pub found: u64,
    pub refined: u64,
    pub fine_fallbacks: u64,
    pub budget_exhausted: u64,
    pub blocked: u64,
    pub invalid_mode: u64,
}

/// Grid search context shared by every A* run of one request.
struct SegmentSearch<'a, M: FieldModel<Sample = TravelSample>> {
    domain: &'a mut DomainQueryEngine<M>,
    mode: TravelMode,
    tick: Tick,
    budget: u32,
    max_nodes: u32,
    heuristic_floor: Scalar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenNode {
    f: Scalar,
    g: Scalar,
    cell: (i64, i64),
}

impl Ord for OpenNode {
    // reversed: BinaryHeap pops the lowest f, then g, then cell
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .cmp(&self.f)
            .then_with(|| other.g.cmp(&self.g))
            .then_with(|| other.cell.cmp(&self.cell))
    }
}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

const NEIGHBOURS: [(i64, i64); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

impl<M: FieldModel<Sample = TravelSample>> SegmentSearch<'_, M> {
    fn search(&mut self, start: Point3, goal: Point3, step: Scalar) -> Path {
        if step <= Scalar::ZERO {
            return Path::failed(PathFlags::BLOCKED, 0);
        }
        let goal_cell = (
            ((goal.x - start.x) / step).round_to_int(),
            ((goal.y - start.y) / step).round_to_int(),
        );
        let floor = self.heuristic_floor;
        let position = |cell: (i64, i64)| start.offset_xy(step.mul_int(cell.0), step.mul_int(cell.1));
        let heuristic = |cell: (i64, i64)| {
            let dx = (goal_cell.0 - cell.0).abs();
            let dy = (goal_cell.1 - cell.1).abs();
            let diagonal = dx.min(dy);
            let straight = dx.max(dy) - diagonal;
            (step.mul_int(straight) + step.mul_int(diagonal) * Scalar::DIAGONAL) * floor
        };

        let mut unit_costs: HashMap<(i64, i64), Option<Scalar>> = HashMap::new();
        let mut g_score: HashMap<(i64, i64), Scalar> = HashMap::new();
        let mut came_from: HashMap<(i64, i64), (i64, i64)> = HashMap::new();
        let mut closed: HashSet<(i64, i64)> = HashSet::new();
        let mut open = BinaryHeap::new();
        let mut visited = 0u32;

        g_score.insert((0, 0), Scalar::ZERO);
        open.push(OpenNode {
            f: heuristic((0, 0)),
            g: Scalar::ZERO,
            cell: (0, 0),
        });

        while let Some(node) = open.pop() {
            if closed.contains(&node.cell) {
                continue;
            }
            if node.cell == goal_cell {
                let mut cells = vec![node.cell];
                let mut cursor = node.cell;
                while let Some(&prev) = came_from.get(&cursor) {
                    cells.push(prev);
                    cursor = prev;
                }
                cells.reverse();
                let mut points: Vec<Point3> = cells.into_iter().map(&position).collect();
                if points.len() == 1 && start != goal {
                    points.push(goal);
                } else if let Some(last) = points.last_mut() {
                    *last = goal;
                }
                return Path {
                    points,
                    total_cost: node.g,
                    visited_nodes: visited,
                    flags: PathFlags::FOUND,
                };
            }
            if visited >= self.max_nodes {
                return Path::failed(PathFlags::BUDGET_EXHAUSTED, visited);
            }
            closed.insert(node.cell);
            visited += 1;

            for (dx, dy) in NEIGHBOURS {
                let next = (node.cell.0 + dx, node.cell.1 + dy);
                if closed.contains(&next) {
                    continue;
                }
                let unit = *unit_costs
                    .entry(next)
                    .or_insert_with(|| self.unit_cost(&position(next)));
                let Some(unit) = unit else {
                    continue;
                };
                let mut step_cost = unit * step;
                if dx != 0 && dy != 0 {
                    step_cost = step_cost * Scalar::DIAGONAL;
                }
                let tentative = node.g.saturating_add(step_cost);
                if g_score.get(&next).map_or(true, |&best| tentative < best) {
                    g_score.insert(next, tentative);
                    came_from.insert(next, node.cell);
                    open.push(OpenNode {
                        f: tentative.saturating_add(heuristic(next)),
                        g: tentative,
                        cell: next,
                    });
                }
            }
        }

        Path::failed(PathFlags::BLOCKED, visited)
    }

    /// Per-unit cost of entering `point`, `None` when impassable or unknown.
    fn unit_cost(&mut self, point: &Point3) -> Option<Scalar> {
        let mut budget = QueryBudget::new(self.budget);
        let result = self.domain.sample(point, self.tick, &mut budget);
        if !result.meta.is_ok() {
            return None;
        }
        result.sample.cost(self.mode)
    }
}

/// Coarse-then-fine pathfinder with a deterministic path cache.
#[derive(Debug)]
pub struct HierarchicalPathfinder {
    config: PathfinderConfig,
    cache: DeterministicCache<PathKey, Path>,
    stats: PathStats,
}

impl HierarchicalPathfinder {
    pub fn new(config: PathfinderConfig) -> Self {
        let cache = DeterministicCache::new(config.cache_capacity());
        Self {
            config,
            cache,
            stats: PathStats::default(),
        }
    }

    pub fn config(&self) -> &PathfinderConfig {
        &self.config
    }

    pub fn stats(&self) -> PathStats {
        self.stats
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn cached_paths(&self) -> usize {
        self.cache.len()
    }

    /// Drops every cached path computed against `domain_id`.
    pub fn invalidate_domain(&mut self, domain_id: u64) -> usize {
        let dropped = self.cache.invalidate_owner(domain_id);
        debug!(
            target: "substrate::pathfinding",
            domain = domain_id,
            dropped,
            "paths.invalidated"
        );
        dropped
    }

    /// Finds a path from `origin` to `target` for travel mode `mode_id`.
    /// `budget` bounds each individual cell query.
    pub fn pathfind<M>(
        &mut self,
        domain: &mut DomainQueryEngine<M>,
        origin: Point3,
        target: Point3,
        tick: Tick,
        mode_id: u32,
        budget: u32,
    ) -> Path
    where
        M: FieldModel<Sample = TravelSample>,
    {
        self.stats.requests += 1;
        let Some(mode) = TravelMode::from_id(mode_id) else {
            self.stats.invalid_mode += 1;
            debug!(target: "substrate::pathfinding", mode_id, "path.invalid_mode");
            return Path::failed(PathFlags::INVALID_MODE, 0);
        };

        let key = PathKey {
            domain_id: domain.domain_id(),
            origin,
            target,
            mode,
            tick,
        };
        if let Some(path) = self.cache.get(&key) {
            self.stats.cache_hits += 1;
            trace!(target: "substrate::pathfinding", ?mode, "path.cache_hit");
            return path.clone();
        }

        let fine_step = self.config.fine_step();
        let coarse_step = self.config.coarse_step();
        let mut search = SegmentSearch {
            domain,
            mode,
            tick,
            budget,
            max_nodes: self.config.max_nodes(),
            heuristic_floor: self.config.heuristic_floor(),
        };

        let path = if coarse_step > fine_step {
            match refine(&mut search, origin, target, coarse_step, fine_step) {
                Ok(path) => {
                    self.stats.refined += 1;
                    path
                }
                Err(spent) => {
                    self.stats.fine_fallbacks += 1;
                    let mut path = search.search(origin, target, fine_step);
                    path.visited_nodes = path.visited_nodes.saturating_add(spent);
                    path
                }
            }
        } else {
            search.search(origin, target, fine_step)
        };

        if path.is_found() {
            self.stats.found += 1;
            self.cache.put(key, path.clone());
        } else if path.flags.contains(PathFlags::BUDGET_EXHAUSTED) {
            self.stats.budget_exhausted += 1;
        } else {
            self.stats.blocked += 1;
        }
        debug!(
            target: "substrate::pathfinding",
            ?mode,
            flags = path.flags.bits(),
            points = path.points.len(),
            visited = path.visited_nodes,
            cost = %path.total_cost,
            "path.resolved"
        );
        path
    }
}

/// Coarse skeleton plus fine refinement of every segment. On failure returns
/// the nodes visited so far.
fn refine<M: FieldModel<Sample = TravelSample>>(
    search: &mut SegmentSearch<'_, M>,
    origin: Point3,
    target: Point3,
    coarse_step: Scalar,
    fine_step: Scalar,
) -> Result<Path, u32> {
    let skeleton = search.search(origin, target, coarse_step);
    if !skeleton.is_found() {
        return Err(skeleton.visited_nodes);
    }

    let mut path = Path {
        points: vec![origin],
        total_cost: Scalar::ZERO,
        visited_nodes: skeleton.visited_nodes,
        flags: PathFlags::FOUND,
    };
    for pair in skeleton.points.windows(2) {
        let segment = search.search(pair[0], pair[1], fine_step);
        path.visited_nodes = path.visited_nodes.saturating_add(segment.visited_nodes);
        if !segment.is_found() {
            trace!(
                target: "substrate::pathfinding",
                flags = segment.flags.bits(),
                "path.segment_failed"
            );
            return Err(path.visited_nodes);
        }
        path.total_cost = path.total_cost.saturating_add(segment.total_cost);
        path.points.extend(segment.points.into_iter().skip(1));
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DomainDesc, DomainPolicy, Resolution, SampleFlags};
    use crate::geometry::Aabb;

    /// Flat open ground with a wall at x == 6 for y < 12.
    #[derive(Debug, Default)]
    struct Walled {
        no_wall: bool,
    }

    impl FieldModel for Walled {
        type Sample = TravelSample;

        fn evaluate_full(&self, point: &Point3, _tick: Tick, _budget: &mut QueryBudget) -> TravelSample {
            let x = point.x.round_to_int();
            let y = point.y.round_to_int();
            if !self.no_wall && x == 6 && y < 12 {
                return TravelSample {
                    flags: SampleFlags::OBSTACLE,
                    ..TravelSample::default()
                };
            }
            TravelSample {
                costs: [Scalar::ONE; 4],
                passable: 0b0111,
                ..TravelSample::default()
            }
        }

        fn evaluate_analytic(&self, point: &Point3, tick: Tick) -> Option<TravelSample> {
            Some(self.evaluate_full(point, tick, &mut QueryBudget::unbounded()))
        }
    }

    fn domain(no_wall: bool) -> DomainQueryEngine<Walled> {
        let desc = DomainDesc::new(
            4,
            Aabb::new(Point3::from_ints(0, 0, 0), Point3::from_ints(16, 16, 4)),
        )
        .with_policy(DomainPolicy {
            max_resolution: Resolution::Full,
            allow_medium: false,
            allow_coarse: false,
            ..DomainPolicy::default()
        });
        DomainQueryEngine::new(desc, Walled { no_wall })
    }

    fn fine_only() -> PathfinderConfig {
        PathfinderConfig::new(1.0, 1.0, 4_096)
    }

    #[test]
    fn straight_line_on_open_ground() {
        let mut domain = domain(true);
        let mut finder = HierarchicalPathfinder::new(fine_only());
        let path = finder.pathfind(
            &mut domain,
            Point3::from_ints(1, 1, 0),
            Point3::from_ints(5, 1, 0),
            0,
            TravelMode::Foot.id(),
            1_000,
        );
        assert!(path.is_found());
        assert_eq!(path.points.len(), 5);
        assert_eq!(path.total_cost, Scalar::from_int(4));
        assert_eq!(path.points.last(), Some(&Point3::from_ints(5, 1, 0)));
    }

    #[test]
    fn diagonal_moves_pay_the_diagonal_factor() {
        let mut domain = domain(true);
        let mut finder = HierarchicalPathfinder::new(fine_only());
        let path = finder.pathfind(
            &mut domain,
            Point3::from_ints(1, 1, 0),
            Point3::from_ints(3, 3, 0),
            0,
            TravelMode::Foot.id(),
            1_000,
        );
        assert_eq!(path.points.len(), 3);
        assert_eq!(path.total_cost, Scalar::DIAGONAL.mul_int(2));
    }

    #[test]
    fn routes_around_the_wall() {
        let mut domain = domain(false);
        let mut finder = HierarchicalPathfinder::new(fine_only());
        let path = finder.pathfind(
            &mut domain,
            Point3::from_ints(2, 2, 0),
            Point3::from_ints(10, 2, 0),
            0,
            TravelMode::Foot.id(),
            1_000,
        );
        assert!(path.is_found());
        assert!(path
            .points
            .iter()
            .all(|p| !(p.x == Scalar::from_int(6) && p.y < Scalar::from_int(12))));
    }

    #[test]
    fn unknown_mode_is_flagged() {
        let mut domain = domain(true);
        let mut finder = HierarchicalPathfinder::new(fine_only());
        let path = finder.pathfind(
            &mut domain,
            Point3::from_ints(1, 1, 0),
            Point3::from_ints(2, 2, 0),
            0,
            9,
            1_000,
        );
        assert_eq!(path.flags, PathFlags::INVALID_MODE);
        assert!(path.points.is_empty());
    }

    #[test]
    fn naval_on_dry_land_is_blocked() {
        let mut domain = domain(true);
        let mut finder = HierarchicalPathfinder::new(fine_only());
        let path = finder.pathfind(
            &mut domain,
            Point3::from_ints(1, 1, 0),
            Point3::from_ints(4, 1, 0),
            0,
            TravelMode::Naval.id(),
            1_000,
        );
        assert_eq!(path.flags, PathFlags::BLOCKED);
    }

    #[test]
    fn node_cap_reports_exhaustion() {
        let mut domain = domain(false);
        let mut finder = HierarchicalPathfinder::new(PathfinderConfig::new(1.0, 1.0, 4));
        let path = finder.pathfind(
            &mut domain,
            Point3::from_ints(2, 2, 0),
            Point3::from_ints(10, 2, 0),
            0,
            TravelMode::Foot.id(),
            1_000,
        );
        assert_eq!(path.flags, PathFlags::BUDGET_EXHAUSTED);
        assert_eq!(path.visited_nodes, 4);
    }

    #[test]
    fn starved_query_budget_blocks() {
        let mut domain = domain(true);
        let mut finder = HierarchicalPathfinder::new(fine_only());
        let path = finder.pathfind(
            &mut domain,
            Point3::from_ints(1, 1, 0),
            Point3::from_ints(4, 1, 0),
            0,
            TravelMode::Foot.id(),
            0,
        );
        assert_eq!(path.flags, PathFlags::BLOCKED);
        assert!(domain.stats().refused > 0);
    }

    #[test]
    fn found_paths_are_cached() {
        let mut domain = domain(false);
        let mut finder = HierarchicalPathfinder::new(PathfinderConfig::new(1.0, 4.0, 4_096));
        let origin = Point3::from_ints(2, 2, 0);
        let target = Point3::from_ints(10, 2, 0);
        let first = finder.pathfind(&mut domain, origin, target, 3, 0, 1_000);
        assert!(first.is_found());
        let queries = domain.stats().queries;

        let second = finder.pathfind(&mut domain, origin, target, 3, 0, 1_000);
        assert_eq!(first, second);
        assert_eq!(domain.stats().queries, queries);
        assert_eq!(finder.stats().cache_hits, 1);

        // other tick is a distinct key
        finder.pathfind(&mut domain, origin, target, 4, 0, 1_000);
        assert_eq!(finder.cached_paths(), 2);
        assert_eq!(finder.invalidate_domain(domain.domain_id()), 2);
    }

    #[test]
    fn refined_path_is_continuous_on_the_fine_grid() {
        let mut domain = domain(true);
        let mut finder = HierarchicalPathfinder::new(PathfinderConfig::new(1.0, 4.0, 4_096));
        let path = finder.pathfind(
            &mut domain,
            Point3::from_ints(1, 1, 0),
            Point3::from_ints(13, 1, 0),
            0,
            TravelMode::Foot.id(),
            1_000,
        );
        assert!(path.is_found());
        assert_eq!(finder.stats().refined, 1);
        assert_eq!(path.points.first(), Some(&Point3::from_ints(1, 1, 0)));
        assert_eq!(path.points.last(), Some(&Point3::from_ints(13, 1, 0)));
        assert_eq!(path.total_cost, Scalar::from_int(12));
        for pair in path.points.windows(2) {
            let dx = (pair[1].x - pair[0].x).abs();
            let dy = (pair[1].y - pair[0].y).abs();
            assert!(dx <= Scalar::ONE && dy <= Scalar::ONE && pair[0] != pair[1]);
        }
    }
}
