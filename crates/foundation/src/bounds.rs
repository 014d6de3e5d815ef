use crate::math::Vec2;

/// Axis-aligned screen rectangle in pixels. `y` grows downwards.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Rect { min, max }
    }

    pub fn from_origin_size(origin: Vec2, size: Vec2) -> Self {
        Rect::new(origin, origin + size)
    }

    /// Rectangle of `size` whose bottom edge is centred on `anchor`.
    pub fn anchored_bottom_center(anchor: Vec2, size: Vec2) -> Self {
        let min = Vec2::new(anchor.x - size.x * 0.5, anchor.y - size.y);
        Rect::new(min, min + size)
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(
            (self.min.x + self.max.x) * 0.5,
            (self.min.y + self.max.y) * 0.5,
        )
    }

    /// Edges are inclusive.
    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }
}
