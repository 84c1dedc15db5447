use serde::{Deserialize, Serialize};

use crate::scalar::Scalar;

/// A point in the fixed-point world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: Scalar,
    pub y: Scalar,
    pub z: Scalar,
}

impl Point3 {
    pub const fn new(x: Scalar, y: Scalar, z: Scalar) -> Self {
        Self { x, y, z }
    }

    pub fn from_ints(x: i64, y: i64, z: i64) -> Self {
        Self::new(Scalar::from_int(x), Scalar::from_int(y), Scalar::from_int(z))
    }

    /// Offset in the XY plane, keeping `z`.
    pub fn offset_xy(self, dx: Scalar, dy: Scalar) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z)
    }
}

/// Axis-aligned box, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Point3,
    pub max: Point3,
}

impl Aabb {
    pub const fn new(min: Point3, max: Point3) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, point: &Point3) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }
}

/// Integer cell coordinates of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl TileCoord {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Cell containing `point` for tiles of edge `tile_size`.
    pub fn containing(point: &Point3, tile_size: Scalar) -> Self {
        let cell = |v: Scalar| -> i32 {
            if tile_size.raw() <= 0 {
                return 0;
            }
            (v.raw().div_euclid(tile_size.raw())) as i32
        };
        Self::new(cell(point.x), cell(point.y), cell(point.z))
    }

    pub fn bounds(&self, tile_size: Scalar) -> Aabb {
        let corner = |c: i32| Scalar::from_raw(c as i64 * tile_size.raw());
        let min = Point3::new(corner(self.x), corner(self.y), corner(self.z));
        let max = Point3::new(
            min.x + tile_size,
            min.y + tile_size,
            min.z + tile_size,
        );
        Aabb::new(min, max)
    }
}
