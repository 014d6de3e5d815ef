//! Marker pins over a 3D viewport, kept in step with a live row feed.
//!
//! The crate is host-agnostic: the viewport, the feed transport, the geocoder
//! and the image store are traits. [`widget::MarkerPinWidget`] wires the
//! pieces together for one mounted view.

pub mod config;
pub mod decorator;
pub mod error;
pub mod feed;
pub mod geocode;
pub mod host;
pub mod images;
pub mod live_sync;
pub mod marker;
pub mod placement;
pub mod popup;
pub mod tools;
pub mod viewport;
pub mod widget;

pub use config::{MarkerPinConfig, PinSelection};
pub use decorator::{DecoratorState, MarkerDecorator, MarkerPublisher, MarkerUpdate, PickedMarker};
pub use error::*;
pub use feed::{FeedRow, LiveFeed, MemoryFeed, RowKey, Subscription, TableSelector};
pub use geocode::{Gazetteer, GeoLocation, Geocoder, resolve, travel_to};
pub use host::{Canvas, Decorator, DrawCommand, DrawList, Frame, ViewManager, ViewOpened};
pub use images::{DirImageSource, ImageRegistry, ImageSource, MemoryImageSource};
pub use live_sync::{LiveSyncController, LiveSyncHandle, SyncSummary};
pub use marker::{MarkerData, PinImage, PinImageRef, SpatialMarker};
pub use placement::{PLACE_MARKER_TOOL_ID, PlaceMarkerTool, PlacementState};
pub use popup::{PopupAction, PopupClick, PopupMenu};
pub use tools::{InteractiveTool, ToolAdmin, ToolId, ToolOutcome};
pub use viewport::{
    BoxFuture, CameraState, CoordinateConverter, LocalFrameConverter, PlanarViewport, Viewport,
};
pub use widget::{ClickOutcome, MarkerPinWidget, WidgetHost, WidgetServices};
