//! Place-name lookup and the animated "travel to" flyover.

use std::collections::HashMap;

use foundation::math::Cartographic;
use tracing::{debug, info};

use crate::viewport::{BoxFuture, Viewport};

/// A resolved surface location. Height is in metres and may be refined from
/// terrain before the flyover.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GeoLocation {
    pub center: Cartographic,
}

impl GeoLocation {
    pub fn new(center: Cartographic) -> Self {
        Self { center }
    }

    pub fn with_height(self, height_m: f64) -> Self {
        Self {
            center: self.center.with_height(height_m),
        }
    }
}

/// Resolves free text to a location. A place that cannot be found is `None`,
/// never an error.
pub trait Geocoder: Send + Sync {
    fn lookup(&self, query: &str) -> BoxFuture<'_, Option<GeoLocation>>;

    /// Terrain height under `at` as seen by `viewport`, when known.
    fn elevation_at<'a>(
        &'a self,
        viewport: &'a dyn Viewport,
        at: Cartographic,
    ) -> BoxFuture<'a, Option<f64>>;
}

pub async fn resolve(geocoder: &dyn Geocoder, place: &str) -> Option<GeoLocation> {
    let place = place.trim();
    if place.is_empty() {
        return None;
    }
    geocoder.lookup(place).await
}

/// Flies `viewport` to `destination`. Returns `false`, leaving the camera
/// alone, when the destination does not resolve.
pub async fn travel_to(viewport: &dyn Viewport, geocoder: &dyn Geocoder, destination: &str) -> bool {
    let Some(mut location) = resolve(geocoder, destination).await else {
        info!(destination, "destination not found");
        return false;
    };

    match geocoder.elevation_at(viewport, location.center).await {
        Some(height) if height.is_finite() => location = location.with_height(height),
        _ => debug!(destination, "no terrain height, keeping geocoded height"),
    }

    info!(
        destination,
        lon = location.center.longitude_deg,
        lat = location.center.latitude_deg,
        "travelling"
    );
    viewport.fly_to(location).await;
    true
}

/// Fixed table of named places, matched case-insensitively.
#[derive(Debug, Default, Clone)]
pub struct Gazetteer {
    places: HashMap<String, Cartographic>,
    terrain_height: Option<f64>,
}

impl Gazetteer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_place(mut self, name: &str, at: Cartographic) -> Self {
        self.places.insert(name.trim().to_lowercase(), at);
        self
    }

    /// Flat terrain at `height_m` everywhere.
    pub fn with_terrain_height(mut self, height_m: f64) -> Self {
        self.terrain_height = Some(height_m);
        self
    }
}

impl Geocoder for Gazetteer {
    fn lookup(&self, query: &str) -> BoxFuture<'_, Option<GeoLocation>> {
        let found = self
            .places
            .get(&query.trim().to_lowercase())
            .copied()
            .map(GeoLocation::new);
        Box::pin(async move { found })
    }

    fn elevation_at<'a>(
        &'a self,
        _viewport: &'a dyn Viewport,
        _at: Cartographic,
    ) -> BoxFuture<'a, Option<f64>> {
        Box::pin(async move { self.terrain_height })
    }
}

#[cfg(test)]
mod tests {
    use super::{Gazetteer, GeoLocation, resolve, travel_to};
    use crate::viewport::{PlanarViewport, Viewport};
    use foundation::math::{Cartographic, Vec2};

    fn loughborough() -> Cartographic {
        Cartographic::from_degrees(-1.2, 52.77, 0.0)
    }

    fn viewport() -> PlanarViewport {
        PlanarViewport::new(loughborough(), Vec2::new(800.0, 600.0), 10.0)
    }

    #[tokio::test]
    async fn resolve_trims_and_ignores_case() {
        let places = Gazetteer::new().with_place("Loughborough", loughborough());
        assert_eq!(
            resolve(&places, "  LOUGHBOROUGH ").await,
            Some(GeoLocation::new(loughborough()))
        );
        assert_eq!(resolve(&places, "   ").await, None);
        assert_eq!(resolve(&places, "Atlantis").await, None);
    }

    #[tokio::test]
    async fn unresolvable_destination_leaves_camera_alone() {
        let vp = viewport();
        let before = vp.camera();
        let places = Gazetteer::new().with_place("Loughborough", loughborough());
        assert!(!travel_to(&vp, &places, "Atlantis").await);
        assert_eq!(vp.camera(), before);
    }

    #[tokio::test]
    async fn travel_uses_terrain_height() {
        let vp = viewport();
        let nottingham = Cartographic::from_degrees(-1.15, 52.95, 0.0);
        let places = Gazetteer::new()
            .with_place("Nottingham", nottingham)
            .with_terrain_height(45.0);

        assert!(travel_to(&vp, &places, "nottingham").await);
        let expected = vp.frame().cartographic_to_local(nottingham.with_height(45.0));
        assert_eq!(vp.camera().target, expected);
    }

    #[tokio::test]
    async fn travel_without_terrain_keeps_geocoded_height() {
        let vp = viewport();
        let peak = Cartographic::from_degrees(-1.1, 52.8, 120.0);
        let places = Gazetteer::new().with_place("Beacon Hill", peak);

        assert!(travel_to(&vp, &places, "beacon hill").await);
        assert_eq!(vp.camera().target, vp.frame().cartographic_to_local(peak));
    }
}
