use crate::cache::CacheKey;
use crate::geometry::{Aabb, Point3, TileCoord};
use crate::hashing::tile_id;
use crate::scalar::Scalar;

use super::{DomainDesc, Resolution, MAX_SAMPLE_DIM};

/// Tile cache key: owner domain, tile id, resolution and authoring version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileKey {
    pub domain_id: u64,
    pub tile_id: u64,
    pub resolution: Resolution,
    pub authoring_version: u32,
}

impl CacheKey for TileKey {
    fn owner(&self) -> u64 {
        self.domain_id
    }
}

impl TileKey {
    pub fn for_coord(desc: &DomainDesc, coord: TileCoord, resolution: Resolution) -> Self {
        Self {
            domain_id: desc.domain_id,
            tile_id: tile_id(coord, resolution),
            resolution,
            authoring_version: desc.authoring_version,
        }
    }
}

/// Precomputed grid of samples covering one tile cell.
#[derive(Debug, Clone)]
pub struct Tile<S> {
    pub tile_id: u64,
    pub coord: TileCoord,
    pub resolution: Resolution,
    pub bounds: Aabb,
    pub sample_dim: u32,
    samples: Vec<S>,
}

impl<S: Clone> Tile<S> {
    /// Evaluates `eval` at every cell-centred sample position, x fastest.
    pub fn build(
        coord: TileCoord,
        resolution: Resolution,
        tile_size: Scalar,
        sample_dim: u32,
        mut eval: impl FnMut(&Point3) -> S,
    ) -> Self {
        let bounds = coord.bounds(tile_size);
        let dim = sample_dim.clamp(1, MAX_SAMPLE_DIM);
        let mut samples = Vec::with_capacity((dim as usize).pow(3));
        for k in 0..dim {
            for j in 0..dim {
                for i in 0..dim {
                    let point = Point3::new(
                        sample_axis(bounds.min.x, tile_size, dim, i),
                        sample_axis(bounds.min.y, tile_size, dim, j),
                        sample_axis(bounds.min.z, tile_size, dim, k),
                    );
                    samples.push(eval(&point));
                }
            }
        }
        Self {
            tile_id: tile_id(coord, resolution),
            coord,
            resolution,
            bounds,
            sample_dim: dim,
            samples,
        }
    }

    /// Sample whose cell contains `point`; points outside clamp to the edge.
    pub fn nearest(&self, point: &Point3, tile_size: Scalar) -> Option<&S> {
        let dim = self.sample_dim as i64;
        let index_on = |value: Scalar, origin: Scalar| -> i64 {
            if tile_size.raw() <= 0 {
                return 0;
            }
            let offset = (value - origin).raw() as i128 * dim as i128;
            (offset.div_euclid(tile_size.raw() as i128) as i64).clamp(0, dim - 1)
        };
        let i = index_on(point.x, self.bounds.min.x);
        let j = index_on(point.y, self.bounds.min.y);
        let k = index_on(point.z, self.bounds.min.z);
        self.samples.get(((k * dim + j) * dim + i) as usize)
    }

    pub fn samples(&self) -> &[S] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Centre of sample `index` along one axis.
fn sample_axis(origin: Scalar, tile_size: Scalar, dim: u32, index: u32) -> Scalar {
    let twice = tile_size.raw() as i128 * (2 * index as i128 + 1);
    origin + Scalar::from_raw((twice / (2 * dim as i128)) as i64)
}
