//! Segment primitives used by collision detection.

use shared::Point;

///Represents a directed line segment from `a` to `b`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub a: Point,
    pub b: Point,
}

impl Segment {
    pub fn new(a: Point, b: Point) -> Self {
        Self { a, b }
    }

    ///Horizontal segment at height `y`.
    pub fn horizontal(y: f64, x_from: f64, x_to: f64) -> Self {
        Self::new(Point::new(x_from, y), Point::new(x_to, y))
    }

    ///Vertical segment at `x`.
    pub fn vertical(x: f64, y_from: f64, y_to: f64) -> Self {
        Self::new(Point::new(x, y_from), Point::new(x, y_to))
    }
}

///Sign of the turn `a -> b -> c`: positive counter-clockwise, negative clockwise, zero collinear.
fn orientation(a: Point, b: Point, c: Point) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

///Returns the point where two segments cross, or `None` when they are parallel
///or their extents do not overlap. Touching endpoints count as a crossing.
pub fn intersect(s1: &Segment, s2: &Segment) -> Option<Point> {
    let (p1, p2, p3, p4) = (s1.a, s1.b, s2.a, s2.b);

    let denominator = (p1.x - p2.x) * (p3.y - p4.y) - (p1.y - p2.y) * (p3.x - p4.x);
    if denominator == 0.0 {
        return None;
    }

    let d1 = orientation(p3, p4, p1);
    let d2 = orientation(p3, p4, p2);
    let d3 = orientation(p1, p2, p3);
    let d4 = orientation(p1, p2, p4);
    if d1 * d2 > 0.0 || d3 * d4 > 0.0 {
        return None;
    }

    let c12 = p1.x * p2.y - p1.y * p2.x;
    let c34 = p3.x * p4.y - p3.y * p4.x;
    Some(Point::new(
        (c12 * (p3.x - p4.x) - (p1.x - p2.x) * c34) / denominator,
        (c12 * (p3.y - p4.y) - (p1.y - p2.y) * c34) / denominator,
    ))
}

///Distance from `start` to `point`, with the vertical component divided by the
///aspect ratio so that vertical and horizontal travel are measured in the same unit.
pub fn distance_along(point: Point, start: Point, aspect_ratio: f64) -> f64 {
    let dx = point.x - start.x;
    let dy = (point.y - start.y) / aspect_ratio;
    (dx * dx + dy * dy).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_parallel_segments_do_not_intersect() {
        let s1 = Segment::horizontal(0.0, 0.0, 10.0);
        let s2 = Segment::horizontal(5.0, 0.0, 10.0);
        assert_eq!(intersect(&s1, &s2), None);
    }

    #[test]
    fn test_collinear_segments_do_not_intersect() {
        let s1 = Segment::horizontal(1.0, 0.0, 10.0);
        let s2 = Segment::horizontal(1.0, 5.0, 15.0);
        assert_eq!(intersect(&s1, &s2), None);
    }

    #[test]
    fn test_crossing_diagonals() {
        let s1 = Segment::new(Point::new(0.0, 0.0), Point::new(10.0, 10.0));
        let s2 = Segment::new(Point::new(0.0, 10.0), Point::new(10.0, 0.0));
        assert_eq!(intersect(&s1, &s2), Some(Point::new(5.0, 5.0)));
    }

    #[test]
    fn test_lines_cross_outside_segment_extent() {
        // The infinite lines meet at (5, 5) but the first segment stops at x = 4.
        let s1 = Segment::new(Point::new(0.0, 0.0), Point::new(4.0, 4.0));
        let s2 = Segment::new(Point::new(0.0, 10.0), Point::new(10.0, 0.0));
        assert_eq!(intersect(&s1, &s2), None);
    }

    #[test]
    fn test_touching_endpoint_counts() {
        let path = Segment::new(Point::new(50.0, 50.0), Point::new(50.0, 97.0));
        let wall = Segment::horizontal(97.0, -20.0, 120.0);
        let hit = intersect(&path, &wall).unwrap();
        assert_approx_eq!(hit.x, 50.0, 1e-12);
        assert_approx_eq!(hit.y, 97.0, 1e-12);
    }

    #[test]
    fn test_path_against_vertical_paddle_line() {
        let path = Segment::new(Point::new(20.0, 40.0), Point::new(0.0, 50.0));
        let paddle = Segment::vertical(4.5, 30.0, 60.0);
        let hit = intersect(&path, &paddle).unwrap();
        assert_approx_eq!(hit.x, 4.5, 1e-12);
        assert_approx_eq!(hit.y, 47.75, 1e-12);
    }

    #[test]
    fn test_distance_along_scales_vertical_component() {
        let start = Point::new(0.0, 0.0);
        assert_approx_eq!(distance_along(Point::new(3.0, 0.0), start, 4.0 / 3.0), 3.0, 1e-12);
        assert_approx_eq!(distance_along(Point::new(0.0, 4.0), start, 4.0 / 3.0), 3.0, 1e-12);
        assert_approx_eq!(distance_along(Point::new(3.0, 4.0), start, 1.0), 5.0, 1e-12);
    }
}
