use std::sync::Arc;

use foundation::math::Vec2;
use tracing::{debug, info};

use crate::decorator::MarkerDecorator;
use crate::marker::PinImageRef;
use crate::tools::{InteractiveTool, ToolAdmin, ToolId, ToolOutcome};
use crate::viewport::Viewport;

pub const PLACE_MARKER_TOOL_ID: ToolId = "MarkerPin.PlaceMarker";

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PlacementState {
    Inactive,
    Armed,
}

/// Single-shot tool: the next primary click that hits the scene drops one pin.
pub struct PlaceMarkerTool {
    decorator: Arc<MarkerDecorator>,
    image: PinImageRef,
    state: PlacementState,
}

impl PlaceMarkerTool {
    pub fn new(decorator: Arc<MarkerDecorator>, image: PinImageRef) -> Self {
        Self {
            decorator,
            image,
            state: PlacementState::Inactive,
        }
    }

    pub fn state(&self) -> PlacementState {
        self.state
    }

    /// Installs the tool definition. A second call is a no-op returning `false`.
    pub fn register(admin: &ToolAdmin, decorator: Arc<MarkerDecorator>, image: PinImageRef) -> bool {
        admin.register(
            PLACE_MARKER_TOOL_ID,
            Arc::new(move || -> Box<dyn InteractiveTool> {
                Box::new(PlaceMarkerTool::new(decorator.clone(), image.clone()))
            }),
        )
    }

    pub fn unregister(admin: &ToolAdmin) -> bool {
        admin.unregister(PLACE_MARKER_TOOL_ID)
    }
}

impl InteractiveTool for PlaceMarkerTool {
    fn id(&self) -> ToolId {
        PLACE_MARKER_TOOL_ID
    }

    fn on_install(&mut self) {
        self.state = PlacementState::Armed;
    }

    fn on_cancel(&mut self) {
        if self.state == PlacementState::Armed {
            debug!("marker placement cancelled");
        }
        self.state = PlacementState::Inactive;
    }

    fn on_primary_click(&mut self, viewport: &dyn Viewport, screen: Vec2) -> ToolOutcome {
        if self.state != PlacementState::Armed {
            return ToolOutcome::Finished;
        }
        let Some(world) = viewport.screen_to_world(screen) else {
            debug!(?screen, "placement click missed the scene");
            return ToolOutcome::Continue;
        };
        self.decorator.add_point(world, Some(&self.image));
        self.state = PlacementState::Inactive;
        info!(?world, image = self.image.name(), "marker placed");
        ToolOutcome::Finished
    }
}
