//! Bounding box types and operations.

use serde::{Deserialize, Serialize};

/// An axis-aligned extent in the units of a raster's spatial reference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Create a new bounding box from corner coordinates.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Build a box from two arbitrary corners, normalising the ordering.
    pub fn from_corners(a: (f64, f64), b: (f64, f64)) -> Self {
        Self {
            min_x: a.0.min(b.0),
            min_y: a.1.min(b.1),
            max_x: a.0.max(b.0),
            max_y: a.1.max(b.1),
        }
    }

    /// Width of the bounding box in coordinate units.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height of the bounding box in coordinate units.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Check if this bbox intersects another.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x < other.max_x
            && self.max_x > other.min_x
            && self.min_y < other.max_y
            && self.max_y > other.min_y
    }

    /// Compute the intersection of two bounding boxes.
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        if !self.intersects(other) {
            return None;
        }

        Some(BoundingBox {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        })
    }

    /// Smallest box covering both `self` and `other`.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Union of every box in the iterator, `None` when it is empty.
    pub fn union_all<'a, I>(boxes: I) -> Option<BoundingBox>
    where
        I: IntoIterator<Item = &'a BoundingBox>,
    {
        boxes
            .into_iter()
            .copied()
            .reduce(|acc, b| acc.union(&b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersection() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 5.0, 15.0, 15.0);
        let c = BoundingBox::new(20.0, 20.0, 30.0, 30.0);

        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));

        let intersection = a.intersection(&b).unwrap();
        assert_eq!(intersection, BoundingBox::new(5.0, 5.0, 10.0, 10.0));
        assert!(a.intersection(&c).is_none());
    }

    #[test]
    fn test_touching_boxes_do_not_intersect() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(10.0, 0.0, 20.0, 10.0);
        assert!(!a.intersects(&b));
    }

    #[test]
    fn test_union_all() {
        let boxes = [
            BoundingBox::new(100.0, 200.0, 110.0, 210.0),
            BoundingBox::new(90.0, 205.0, 95.0, 230.0),
        ];
        let union = BoundingBox::union_all(&boxes).unwrap();
        assert_eq!(union, BoundingBox::new(90.0, 200.0, 110.0, 230.0));
        assert!(BoundingBox::union_all(&[]).is_none());
    }

    #[test]
    fn test_from_corners_normalises() {
        let bbox = BoundingBox::from_corners((10.0, -5.0), (2.0, 7.0));
        assert_eq!(bbox, BoundingBox::new(2.0, -5.0, 10.0, 7.0));
        assert_eq!(bbox.width(), 8.0);
        assert_eq!(bbox.height(), 12.0);
    }
}
