//! External region extraction from a binary mask.
//!
//! Boundaries are traced with `imageproc`'s border follower (8-connected
//! foreground). Only outermost outer borders are kept: anything sitting in
//! another region's hole is dropped, and a region's size is the polygon area
//! of its traced boundary.

use image::GrayImage;
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::point::Point;

/// Axis-aligned bounding box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn area(&self) -> u32 {
        self.width * self.height
    }

    fn enclosing(points: &[Point<u32>]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Self {
            x: min_x,
            y: min_y,
            width: max_x - min_x + 1,
            height: max_y - min_y + 1,
        })
    }
}

/// One external region of the mask.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub bbox: BoundingBox,
    /// Area of the polygon through the boundary pixel centres. A solid
    /// `w`x`h` block measures `(w - 1) * (h - 1)`; single pixels and
    /// one-pixel lines measure 0.
    pub area: f64,
}

/// Find all external regions of `mask`, in border-following order.
pub fn external_regions(mask: &GrayImage) -> Vec<Region> {
    if mask.width() == 0 || mask.height() == 0 {
        return Vec::new();
    }
    find_contours::<u32>(mask)
        .into_iter()
        .filter(|c| c.parent.is_none() && c.border_type == BorderType::Outer)
        .filter_map(|c: Contour<u32>| {
            let bbox = BoundingBox::enclosing(&c.points)?;
            Some(Region {
                bbox,
                area: polygon_area(&c.points),
            })
        })
        .collect()
}

/// Shoelace formula over a closed polygon.
fn polygon_area(points: &[Point<u32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
        .sum();
    twice.abs() as f64 / 2.0
}
