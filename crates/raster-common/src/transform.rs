//! Affine pixel-to-world transforms.

use serde::{Deserialize, Serialize};

use crate::BoundingBox;

/// Six-coefficient affine transform in GDAL order.
///
/// World coordinates of the top-left corner of pixel `(col, row)` are
///
/// ```text
/// x = origin_x + col * pixel_width  + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
///
/// North-up rasters have zero rotation and a negative `pixel_height`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub pixel_width: f64,
    pub row_rotation: f64,
    pub origin_y: f64,
    pub col_rotation: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform anchored at the top-left corner `(origin_x, origin_y)`.
    ///
    /// `res_x` and `res_y` are positive cell sizes.
    pub fn from_origin(origin_x: f64, origin_y: f64, res_x: f64, res_y: f64) -> Self {
        Self {
            origin_x,
            pixel_width: res_x,
            row_rotation: 0.0,
            origin_y,
            col_rotation: 0.0,
            pixel_height: -res_y,
        }
    }

    pub fn from_gdal(c: [f64; 6]) -> Self {
        Self {
            origin_x: c[0],
            pixel_width: c[1],
            row_rotation: c[2],
            origin_y: c[3],
            col_rotation: c[4],
            pixel_height: c[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            self.row_rotation,
            self.origin_y,
            self.col_rotation,
            self.pixel_height,
        ]
    }

    /// True for unrotated grids whose rows run north to south.
    pub fn is_north_up(&self) -> bool {
        self.row_rotation == 0.0
            && self.col_rotation == 0.0
            && self.pixel_width > 0.0
            && self.pixel_height < 0.0
    }

    /// Positive cell sizes `(x, y)`.
    pub fn resolution(&self) -> (f64, f64) {
        (self.pixel_width.abs(), self.pixel_height.abs())
    }

    /// World coordinates of the top-left corner of a (fractional) pixel position.
    pub fn pixel_to_world(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.pixel_width + row * self.row_rotation,
            self.origin_y + col * self.col_rotation + row * self.pixel_height,
        )
    }

    /// World coordinates of the centre of pixel `(col, row)`.
    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        self.pixel_to_world(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// Fractional pixel position of a world coordinate (north-up only).
    pub fn world_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin_x) / self.pixel_width,
            (y - self.origin_y) / self.pixel_height,
        )
    }

    /// Extent covered by a `width` x `height` grid.
    pub fn bounds(&self, width: usize, height: usize) -> BoundingBox {
        let a = self.pixel_to_world(0.0, 0.0);
        let b = self.pixel_to_world(width as f64, height as f64);
        BoundingBox::from_corners(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_north_up_bounds() {
        let t = GeoTransform::from_origin(500_000.0, 4_200_010.0, 1.0, 1.0);
        assert!(t.is_north_up());
        let bbox = t.bounds(20, 10);
        assert_eq!(bbox, BoundingBox::new(500_000.0, 4_200_000.0, 500_020.0, 4_200_010.0));
    }

    #[test]
    fn test_world_pixel_roundtrip() {
        let t = GeoTransform::from_origin(100.0, 200.0, 2.0, 2.0);
        let (x, y) = t.pixel_center(3, 4);
        assert_eq!((x, y), (107.0, 191.0));
        let (col, row) = t.world_to_pixel(x, y);
        assert_eq!((col.floor(), row.floor()), (3.0, 4.0));
    }

    #[test]
    fn test_gdal_order() {
        let t = GeoTransform::from_origin(10.0, 20.0, 0.5, 0.25);
        assert_eq!(t.to_gdal(), [10.0, 0.5, 0.0, 20.0, 0.0, -0.25]);
        assert_eq!(GeoTransform::from_gdal(t.to_gdal()), t);
        assert_eq!(t.resolution(), (0.5, 0.25));
    }
}
