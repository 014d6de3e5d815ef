use super::{Cartographic, Ecef, Geodetic, Vec3, ecef_to_geodetic, geodetic_to_ecef};

/// East-North-Up frame tangent to the ellipsoid at a fixed origin.
///
/// Local points are `Vec3 { x: east, y: north, z: up }` in meters. This is the
/// spatial frame a project-local viewport works in.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LocalFrame {
    origin: Geodetic,
    origin_ecef: Ecef,
}

impl LocalFrame {
    pub fn new(origin: Cartographic) -> Self {
        let origin = origin.to_geodetic();
        Self {
            origin,
            origin_ecef: geodetic_to_ecef(origin),
        }
    }

    pub fn ecef_to_local(&self, point: Ecef) -> Vec3 {
        let d = point.delta_from(self.origin_ecef);
        let (sin_lat, cos_lat) = self.origin.lat_rad.sin_cos();
        let (sin_lon, cos_lon) = self.origin.lon_rad.sin_cos();

        Vec3::new(
            -sin_lon * d.x + cos_lon * d.y,
            -sin_lat * cos_lon * d.x - sin_lat * sin_lon * d.y + cos_lat * d.z,
            cos_lat * cos_lon * d.x + cos_lat * sin_lon * d.y + sin_lat * d.z,
        )
    }

    pub fn local_to_ecef(&self, local: Vec3) -> Ecef {
        let (sin_lat, cos_lat) = self.origin.lat_rad.sin_cos();
        let (sin_lon, cos_lon) = self.origin.lon_rad.sin_cos();
        let (east, north, up) = (local.x, local.y, local.z);

        self.origin_ecef.offset_by(Vec3::new(
            -sin_lon * east - sin_lat * cos_lon * north + cos_lat * cos_lon * up,
            cos_lon * east - sin_lat * sin_lon * north + cos_lat * sin_lon * up,
            cos_lat * north + sin_lat * up,
        ))
    }

    pub fn cartographic_to_local(&self, carto: Cartographic) -> Vec3 {
        self.ecef_to_local(geodetic_to_ecef(carto.to_geodetic()))
    }

    pub fn local_to_cartographic(&self, local: Vec3) -> Cartographic {
        Cartographic::from_geodetic(ecef_to_geodetic(self.local_to_ecef(local)))
    }
}
