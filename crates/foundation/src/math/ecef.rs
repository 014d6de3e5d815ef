use super::Vec3;

/// Earth-centered, Earth-fixed Cartesian coordinates (meters).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ecef {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Ecef {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Offset from `origin`, in the ECEF axes.
    pub fn delta_from(self, origin: Ecef) -> Vec3 {
        Vec3::new(self.x - origin.x, self.y - origin.y, self.z - origin.z)
    }

    pub fn offset_by(self, delta: Vec3) -> Ecef {
        Ecef::new(self.x + delta.x, self.y + delta.y, self.z + delta.z)
    }
}
