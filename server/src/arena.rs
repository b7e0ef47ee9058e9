//! Fixed upper and lower walls of the playing field.

use crate::geometry::Segment;
use shared::{GameSettings, FIELD_SIZE, OVERSCAN};

/// One horizontal boundary: the y-limit the ball and paddles must respect, and
/// the line used for collision tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Wall {
    pub limit: f64,
    pub line: Segment,
}

impl Wall {
    fn at(limit: f64) -> Self {
        Self {
            limit,
            line: Segment::horizontal(limit, -OVERSCAN, FIELD_SIZE + OVERSCAN),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arena {
    pub upper: Wall,
    pub lower: Wall,
    aspect_ratio: f64,
}

impl Arena {
    /// Wall thickness is given in horizontal units and scaled into vertical ones.
    pub fn new(settings: &GameSettings) -> Self {
        let aspect_ratio = settings.aspect_ratio.ratio();
        let thickness = settings.wall_height * aspect_ratio;
        Self {
            upper: Wall::at(thickness),
            lower: Wall::at(FIELD_SIZE - thickness),
            aspect_ratio,
        }
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.aspect_ratio
    }

    pub fn mid_line(&self) -> f64 {
        (self.upper.limit + self.lower.limit) / 2.0
    }
}
