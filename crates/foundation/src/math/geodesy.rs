use super::Ecef;

/// WGS84 semi-major axis (meters).
pub const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening.
pub const WGS84_F: f64 = 1.0 / 298.257_223_563;
/// WGS84 semi-minor axis (meters).
pub const WGS84_B: f64 = WGS84_A * (1.0 - WGS84_F);
/// WGS84 first eccentricity squared.
pub const WGS84_E2: f64 = WGS84_F * (2.0 - WGS84_F);
/// WGS84 second eccentricity squared.
pub const WGS84_EP2: f64 = (WGS84_A * WGS84_A - WGS84_B * WGS84_B) / (WGS84_B * WGS84_B);

/// Geodetic coordinates in radians and meters.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Geodetic {
    pub lat_rad: f64,
    pub lon_rad: f64,
    pub alt_m: f64,
}

impl Geodetic {
    pub fn new(lat_rad: f64, lon_rad: f64, alt_m: f64) -> Self {
        Self {
            lat_rad,
            lon_rad,
            alt_m,
        }
    }
}

/// Longitude/latitude in degrees plus height above the ellipsoid in meters.
///
/// This is the shape geographic data arrives in (feed rows, geocoder hits);
/// convert with [`Cartographic::to_geodetic`] before doing any math.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Cartographic {
    pub longitude_deg: f64,
    pub latitude_deg: f64,
    pub height_m: f64,
}

impl Cartographic {
    pub fn from_degrees(longitude_deg: f64, latitude_deg: f64, height_m: f64) -> Self {
        Self {
            longitude_deg,
            latitude_deg,
            height_m,
        }
    }

    pub fn with_height(self, height_m: f64) -> Self {
        Self { height_m, ..self }
    }

    /// Finite components and a latitude inside [-90, 90].
    pub fn is_valid(&self) -> bool {
        self.longitude_deg.is_finite()
            && self.latitude_deg.is_finite()
            && self.height_m.is_finite()
            && (-90.0..=90.0).contains(&self.latitude_deg)
    }

    pub fn to_geodetic(self) -> Geodetic {
        Geodetic::new(
            self.latitude_deg.to_radians(),
            self.longitude_deg.to_radians(),
            self.height_m,
        )
    }

    pub fn from_geodetic(geo: Geodetic) -> Self {
        Self::from_degrees(geo.lon_rad.to_degrees(), geo.lat_rad.to_degrees(), geo.alt_m)
    }
}

pub fn geodetic_to_ecef(geo: Geodetic) -> Ecef {
    let (sin_lat, cos_lat) = geo.lat_rad.sin_cos();
    let (sin_lon, cos_lon) = geo.lon_rad.sin_cos();

    let n = WGS84_A / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();
    Ecef::new(
        (n + geo.alt_m) * cos_lat * cos_lon,
        (n + geo.alt_m) * cos_lat * sin_lon,
        (n * (1.0 - WGS84_E2) + geo.alt_m) * sin_lat,
    )
}

/// Bowring's closed-form inverse; sub-millimetre near the surface.
pub fn ecef_to_geodetic(ecef: Ecef) -> Geodetic {
    let p = (ecef.x * ecef.x + ecef.y * ecef.y).sqrt();
    let lon = ecef.y.atan2(ecef.x);

    let theta = (ecef.z * WGS84_A).atan2(p * WGS84_B);
    let (sin_theta, cos_theta) = theta.sin_cos();

    let lat = (ecef.z + WGS84_EP2 * WGS84_B * sin_theta.powi(3))
        .atan2(p - WGS84_E2 * WGS84_A * cos_theta.powi(3));

    let sin_lat = lat.sin();
    let n = WGS84_A / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();
    let alt = p / lat.cos() - n;

    Geodetic::new(lat, lon, alt)
}

#[cfg(test)]
mod tests {
    use super::{Cartographic, WGS84_A, ecef_to_geodetic, geodetic_to_ecef};

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    #[test]
    fn equator_prime_meridian_sits_on_semi_major_axis() {
        let ecef = geodetic_to_ecef(Cartographic::from_degrees(0.0, 0.0, 0.0).to_geodetic());
        assert_close(ecef.x, WGS84_A, 1e-6);
        assert_close(ecef.y, 0.0, 1e-6);
        assert_close(ecef.z, 0.0, 1e-6);
    }

    #[test]
    fn cartographic_survives_ecef_round_trip() {
        let carto = Cartographic::from_degrees(-1.2, 52.77, 120.0);
        let back = Cartographic::from_geodetic(ecef_to_geodetic(geodetic_to_ecef(
            carto.to_geodetic(),
        )));
        assert_close(back.longitude_deg, carto.longitude_deg, 1e-9);
        assert_close(back.latitude_deg, carto.latitude_deg, 1e-9);
        assert_close(back.height_m, carto.height_m, 1e-6);
    }

    #[test]
    fn validity_rejects_out_of_range_latitude() {
        assert!(Cartographic::from_degrees(10.0, 45.0, 0.0).is_valid());
        assert!(!Cartographic::from_degrees(10.0, 91.0, 0.0).is_valid());
        assert!(!Cartographic::from_degrees(f64::NAN, 0.0, 0.0).is_valid());
    }
}
