use std::sync::Arc;

use foundation::math::{Vec2, Vec3};
use parking_lot::RwLock;
use tracing::debug;

use crate::host::{Canvas, Decorator, Frame, ViewManager};
use crate::marker::{MarkerData, PinImageRef, SpatialMarker};
use crate::viewport::Viewport;

/// Whether a decorator is registered with the render/pick pipeline.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DecoratorState {
    Disabled,
    Enabled,
}

/// The only two ways the marker set changes.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkerUpdate {
    Replace(Vec<SpatialMarker>),
    Append(SpatialMarker),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PickedMarker {
    /// Position in the marker set at pick time.
    pub index: usize,
    pub marker: SpatialMarker,
    /// Projected tip of the pin.
    pub screen: Vec2,
}

/// Owns the marker set and draws/picks it every frame.
///
/// Readers take an `Arc` snapshot, so a render pass or pick never observes a
/// half-applied update; writers swap or copy-on-write under a short lock.
#[derive(Debug, Default)]
pub struct MarkerDecorator {
    markers: RwLock<Arc<Vec<SpatialMarker>>>,
}

impl MarkerDecorator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single mutation entry point.
    pub fn apply(&self, update: MarkerUpdate) {
        let mut markers = self.markers.write();
        match update {
            MarkerUpdate::Replace(next) => *markers = Arc::new(next),
            MarkerUpdate::Append(marker) => Arc::make_mut(&mut markers).push(marker),
        }
    }

    /// Replaces the whole set with `markers`, all drawn with `image`.
    ///
    /// Without an image this is a no-op and returns `false`.
    pub fn set_markers(&self, markers: &[MarkerData], image: Option<&PinImageRef>) -> bool {
        let Some(image) = image else {
            debug!(count = markers.len(), "set_markers without an image ignored");
            return false;
        };
        let next = markers
            .iter()
            .map(|m| SpatialMarker::new(m.point, image.clone()))
            .collect();
        self.apply(MarkerUpdate::Replace(next));
        true
    }

    /// Appends one marker. Without an image this is a no-op and returns `false`.
    pub fn add_point(&self, position: Vec3, image: Option<&PinImageRef>) -> bool {
        let Some(image) = image else {
            debug!(?position, "add_point without an image ignored");
            return false;
        };
        self.apply(MarkerUpdate::Append(SpatialMarker::new(
            position,
            image.clone(),
        )));
        true
    }

    pub fn markers(&self) -> Arc<Vec<SpatialMarker>> {
        self.markers.read().clone()
    }

    pub fn len(&self) -> usize {
        self.markers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn render(&self, viewport: &dyn Viewport, canvas: &mut dyn Canvas) {
        let markers = self.markers();
        for marker in markers.iter() {
            let Some(screen) = viewport.world_to_screen(marker.position()) else {
                continue;
            };
            canvas.draw_image(marker.image(), marker.hit_rect(screen));
        }
    }

    /// Topmost marker under `screen`. Later markers are drawn over earlier
    /// ones, so the search runs back to front.
    pub fn pick_test(&self, viewport: &dyn Viewport, screen: Vec2) -> Option<PickedMarker> {
        let markers = self.markers();
        markers.iter().enumerate().rev().find_map(|(index, marker)| {
            let tip = viewport.world_to_screen(marker.position())?;
            marker.hit_rect(tip).contains(screen).then(|| PickedMarker {
                index,
                marker: marker.clone(),
                screen: tip,
            })
        })
    }

    /// Registers with the render/pick pipeline. Idempotent.
    pub fn enable(self: &Arc<Self>, views: &ViewManager) -> DecoratorState {
        if views.add_decorator(self.clone()) {
            debug!("marker decorations enabled");
        }
        DecoratorState::Enabled
    }

    /// Unregisters from the render/pick pipeline. Idempotent.
    pub fn disable(self: &Arc<Self>, views: &ViewManager) -> DecoratorState {
        let this: Arc<dyn Decorator> = self.clone();
        if views.drop_decorator(&this) {
            debug!("marker decorations disabled");
        }
        DecoratorState::Disabled
    }

    pub fn state(self: &Arc<Self>, views: &ViewManager) -> DecoratorState {
        let this: Arc<dyn Decorator> = self.clone();
        if views.has_decorator(&this) {
            DecoratorState::Enabled
        } else {
            DecoratorState::Disabled
        }
    }
}

impl Decorator for MarkerDecorator {
    fn decorate(&self, _frame: Frame, viewport: &dyn Viewport, canvas: &mut dyn Canvas) {
        self.render(viewport, canvas);
    }

    fn test_decoration_hit(&self, viewport: &dyn Viewport, screen: Vec2) -> bool {
        self.pick_test(viewport, screen).is_some()
    }
}

/// Publishes whole marker lists into a decorator with one fixed pin image.
#[derive(Debug, Clone)]
pub struct MarkerPublisher {
    decorator: Arc<MarkerDecorator>,
    image: Option<PinImageRef>,
}

impl MarkerPublisher {
    pub fn new(decorator: Arc<MarkerDecorator>, image: Option<PinImageRef>) -> Self {
        Self { decorator, image }
    }

    pub fn publish(&self, markers: &[MarkerData]) -> bool {
        self.decorator.set_markers(markers, self.image.as_ref())
    }
}
