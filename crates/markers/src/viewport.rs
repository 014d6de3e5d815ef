//! Viewport-side collaborators: projection, ray test, camera and the
//! geographic-to-local coordinate converter.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use foundation::Rect;
use foundation::math::{Cartographic, LocalFrame, Vec2, Vec3};
use parking_lot::RwLock;
use tracing::debug;

use crate::error::ConversionError;
use crate::geocode::GeoLocation;

/// Type alias for a boxed future that can be sent between threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Maps geographic coordinates into a viewport's local spatial frame.
///
/// Implementations must be idempotent and side-effect free from the caller's
/// point of view; the same input always yields the same point.
pub trait CoordinateConverter: Send + Sync {
    fn to_spatial(&self, at: Cartographic) -> BoxFuture<'_, Result<Vec3, ConversionError>>;
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CameraState {
    pub eye: Vec3,
    pub target: Vec3,
}

/// The 3D view markers are drawn into.
///
/// Screen coordinates are pixels with the origin at the top-left corner.
pub trait Viewport: Send + Sync {
    fn canvas_size(&self) -> Vec2;

    /// Projects a world point. `None` when the point cannot be shown
    /// (behind the camera, degenerate projection).
    fn world_to_screen(&self, world: Vec3) -> Option<Vec2>;

    /// Ray test from a screen point into the scene. `None` on a miss.
    fn screen_to_world(&self, screen: Vec2) -> Option<Vec3>;

    fn camera(&self) -> CameraState;

    fn converter(&self) -> Arc<dyn CoordinateConverter>;

    /// Animated camera transition to `location`.
    fn fly_to(&self, location: GeoLocation) -> BoxFuture<'_, ()>;
}

/// Converter backed by an East-North-Up frame.
#[derive(Debug, Clone)]
pub struct LocalFrameConverter {
    frame: LocalFrame,
}

impl LocalFrameConverter {
    pub fn new(frame: LocalFrame) -> Self {
        Self { frame }
    }
}

impl CoordinateConverter for LocalFrameConverter {
    fn to_spatial(&self, at: Cartographic) -> BoxFuture<'_, Result<Vec3, ConversionError>> {
        Box::pin(async move {
            if !at.is_valid() {
                return Err(ConversionError(format!(
                    "invalid cartographic ({}, {}, {})",
                    at.longitude_deg, at.latitude_deg, at.height_m
                )));
            }
            Ok(self.frame.cartographic_to_local(at))
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
struct PlanarCamera {
    center: Vec3,
    meters_per_px: f64,
}

/// Top-down orthographic viewport over the ground plane (`z = 0`) of a local
/// ENU frame.
///
/// Good enough to drive the marker pipeline headless: every point projects,
/// and the ray test only misses outside the canvas.
pub struct PlanarViewport {
    converter: Arc<LocalFrameConverter>,
    frame: LocalFrame,
    canvas_px: Vec2,
    camera: RwLock<PlanarCamera>,
    flyover: Duration,
    flyover_steps: u32,
}

impl PlanarViewport {
    pub fn new(origin: Cartographic, canvas_px: Vec2, meters_per_px: f64) -> Self {
        let frame = LocalFrame::new(origin);
        Self {
            converter: Arc::new(LocalFrameConverter::new(frame)),
            frame,
            canvas_px,
            camera: RwLock::new(PlanarCamera {
                center: Vec3::ZERO,
                meters_per_px,
            }),
            flyover: Duration::ZERO,
            flyover_steps: 1,
        }
    }

    /// Spread flyovers over `duration` in `steps` camera updates.
    pub fn with_flyover(mut self, duration: Duration, steps: u32) -> Self {
        self.flyover = duration;
        self.flyover_steps = steps.max(1);
        self
    }

    pub fn frame(&self) -> &LocalFrame {
        &self.frame
    }

    pub fn center(&self) -> Vec3 {
        self.camera.read().center
    }

    pub fn set_center(&self, center: Vec3) {
        self.camera.write().center = center;
    }
}

impl Viewport for PlanarViewport {
    fn canvas_size(&self) -> Vec2 {
        self.canvas_px
    }

    fn world_to_screen(&self, world: Vec3) -> Option<Vec2> {
        let cam = *self.camera.read();
        if cam.meters_per_px <= 0.0 {
            return None;
        }
        let screen = Vec2::new(
            self.canvas_px.x * 0.5 + (world.x - cam.center.x) / cam.meters_per_px,
            self.canvas_px.y * 0.5 - (world.y - cam.center.y) / cam.meters_per_px,
        );
        screen.is_finite().then_some(screen)
    }

    fn screen_to_world(&self, screen: Vec2) -> Option<Vec3> {
        let canvas = Rect::from_origin_size(Vec2::default(), self.canvas_px);
        if !canvas.contains(screen) {
            return None;
        }
        let cam = *self.camera.read();
        Some(Vec3::new(
            cam.center.x + (screen.x - self.canvas_px.x * 0.5) * cam.meters_per_px,
            cam.center.y - (screen.y - self.canvas_px.y * 0.5) * cam.meters_per_px,
            0.0,
        ))
    }

    fn camera(&self) -> CameraState {
        let cam = *self.camera.read();
        let altitude = cam.meters_per_px * self.canvas_px.y;
        CameraState {
            eye: cam.center + Vec3::new(0.0, 0.0, altitude),
            target: cam.center,
        }
    }

    fn converter(&self) -> Arc<dyn CoordinateConverter> {
        self.converter.clone()
    }

    fn fly_to(&self, location: GeoLocation) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let start = self.center();
            let target = self.frame.cartographic_to_local(location.center);
            let step_delay = self.flyover / self.flyover_steps;
            debug!(?target, steps = self.flyover_steps, "flyover started");

            for step in 1..=self.flyover_steps {
                if !step_delay.is_zero() {
                    tokio::time::sleep(step_delay).await;
                }
                let t = step as f64 / self.flyover_steps as f64;
                self.set_center(start.lerp(target, t));
            }
            self.set_center(target);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{PlanarViewport, Viewport};
    use crate::geocode::GeoLocation;
    use foundation::math::{Cartographic, Vec2, Vec3};
    use std::time::Duration;

    fn viewport() -> PlanarViewport {
        PlanarViewport::new(
            Cartographic::from_degrees(0.0, 0.0, 0.0),
            Vec2::new(800.0, 600.0),
            1.0,
        )
    }

    #[test]
    fn projection_and_ray_test_agree() {
        let vp = viewport();
        assert_eq!(vp.world_to_screen(Vec3::ZERO), Some(Vec2::new(400.0, 300.0)));
        let world = vp.screen_to_world(Vec2::new(450.0, 250.0)).expect("hit");
        assert_eq!(world, Vec3::new(50.0, 50.0, 0.0));
        assert_eq!(vp.world_to_screen(world), Some(Vec2::new(450.0, 250.0)));
    }

    #[test]
    fn ray_test_misses_outside_canvas() {
        let vp = viewport();
        assert!(vp.screen_to_world(Vec2::new(-1.0, 10.0)).is_none());
        assert!(vp.screen_to_world(Vec2::new(10.0, 601.0)).is_none());
    }

    #[test]
    fn projection_follows_camera() {
        let vp = viewport();
        let p = Vec3::new(10.0, 0.0, 0.0);
        let before = vp.world_to_screen(p).expect("projects");
        vp.set_center(Vec3::new(10.0, 0.0, 0.0));
        let after = vp.world_to_screen(p).expect("projects");
        assert_eq!(before, Vec2::new(410.0, 300.0));
        assert_eq!(after, Vec2::new(400.0, 300.0));
    }

    #[tokio::test]
    async fn converter_rejects_invalid_latitude() {
        let vp = viewport();
        let conv = vp.converter();
        assert!(
            conv.to_spatial(Cartographic::from_degrees(0.0, 95.0, 0.0))
                .await
                .is_err()
        );
        let origin = conv
            .to_spatial(Cartographic::from_degrees(0.0, 0.0, 0.0))
            .await
            .expect("converts");
        assert!(origin.length() < 1e-6);
    }

    #[tokio::test]
    async fn flyover_ends_on_target() {
        let vp = viewport().with_flyover(Duration::from_millis(4), 4);
        let dest = Cartographic::from_degrees(0.001, 0.0, 0.0);
        vp.fly_to(GeoLocation::new(dest)).await;
        let expected = vp.frame().cartographic_to_local(dest);
        assert_eq!(vp.center(), expected);
        assert_eq!(vp.camera().target, expected);
    }
}
