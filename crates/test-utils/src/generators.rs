//! Point generators.
//!
//! Points are laid out at cell centres so a grid at `spacing` resolution
//! gets exactly one cell per generated column and row.

use crate::fixtures::TilePoint;

/// `cols` x `rows` points starting half a spacing inside `(min_x, min_y)`.
///
/// `z` receives the point's `(x, y)`.
pub fn grid_points(
    min_x: f64,
    min_y: f64,
    cols: usize,
    rows: usize,
    spacing: f64,
    classification: u8,
    z: impl Fn(f64, f64) -> f64,
) -> Vec<TilePoint> {
    let mut points = Vec::with_capacity(cols * rows);
    for row in 0..rows {
        for col in 0..cols {
            let x = min_x + (col as f64 + 0.5) * spacing;
            let y = min_y + (row as f64 + 0.5) * spacing;
            points.push(TilePoint::new(x, y, z(x, y), classification));
        }
    }
    points
}

/// Points with a constant elevation.
pub fn flat_points(
    min_x: f64,
    min_y: f64,
    cols: usize,
    rows: usize,
    classification: u8,
    z: f64,
) -> Vec<TilePoint> {
    grid_points(min_x, min_y, cols, rows, 1.0, classification, |_, _| z)
}

/// Same layout as [`grid_points`] with every point in another class.
pub fn reclassify(points: &[TilePoint], classification: u8) -> Vec<TilePoint> {
    points
        .iter()
        .map(|p| TilePoint {
            classification,
            ..*p
        })
        .collect()
}
