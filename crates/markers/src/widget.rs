//! The mounted marker-pin widget: images, decorator, placement tool, popup
//! and live sync wired to one host.

use std::sync::Arc;

use foundation::math::Vec2;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::MarkerPinConfig;
use crate::decorator::{DecoratorState, MarkerDecorator, MarkerPublisher};
use crate::error::MarkerPinError;
use crate::feed::LiveFeed;
use crate::geocode::{self, Geocoder};
use crate::host::ViewManager;
use crate::images::{ImageRegistry, ImageSource};
use crate::live_sync::{LiveSyncController, LiveSyncHandle, SyncSummary};
use crate::marker::PinImageRef;
use crate::placement::{PLACE_MARKER_TOOL_ID, PlaceMarkerTool};
use crate::popup::{PopupAction, PopupClick, PopupMenu};
use crate::tools::{ToolAdmin, ToolOutcome};

/// Host-owned services the widget plugs into.
#[derive(Clone)]
pub struct WidgetHost {
    pub views: Arc<ViewManager>,
    pub tools: Arc<ToolAdmin>,
}

/// Backends the widget reads from.
#[derive(Clone)]
pub struct WidgetServices {
    pub images: Arc<dyn ImageSource>,
    pub feed: Arc<dyn LiveFeed>,
    pub geocoder: Option<Arc<dyn Geocoder>>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// Nothing handled the click.
    Ignored,
    Tool(ToolOutcome),
    Popup(PopupClick),
    /// A marker was hit and the popup opened on it.
    MarkerPicked(usize),
}

pub struct MarkerPinWidget {
    config: MarkerPinConfig,
    host: WidgetHost,
    geocoder: Option<Arc<dyn Geocoder>>,
    images: ImageRegistry,
    decorator: Arc<MarkerDecorator>,
    active_pin: Option<PinImageRef>,
    show_markers: bool,
    popup: PopupMenu,
    popup_actions: mpsc::UnboundedReceiver<PopupAction>,
    errors: mpsc::UnboundedReceiver<MarkerPinError>,
    sync: Option<LiveSyncHandle>,
    mounted: bool,
}

impl MarkerPinWidget {
    /// Preloads pin images, enables the decorator, registers the placement
    /// tool and starts live sync.
    ///
    /// Must be called inside a tokio runtime.
    pub async fn mount(config: MarkerPinConfig, host: WidgetHost, services: WidgetServices) -> Self {
        let mut images = ImageRegistry::new();
        images
            .preload(services.images.as_ref(), &config.image_ids())
            .await;

        let decorator = Arc::new(MarkerDecorator::new());
        decorator.enable(&host.views);

        let active_pin = images.get(&config.default_pin);
        match &active_pin {
            Some(pin) => {
                PlaceMarkerTool::register(&host.tools, decorator.clone(), pin.clone());
            }
            None => warn!(
                pin = %config.default_pin,
                "default pin unavailable; placement disabled and feed markers hidden"
            ),
        }

        let publisher = MarkerPublisher::new(decorator.clone(), active_pin.clone());
        publisher.publish(&[]);

        let (error_tx, errors) = mpsc::unbounded_channel();
        let sync = LiveSyncController::new(
            services.feed.clone(),
            config.table(),
            publisher,
            host.views.on_view_open(),
            error_tx,
        )
        .spawn();

        let (popup, popup_actions) = PopupMenu::channel(config.popup_item_size());
        info!(table = %config.table(), images = images.len(), "marker pin widget mounted");

        Self {
            config,
            host,
            geocoder: services.geocoder,
            images,
            decorator,
            active_pin,
            show_markers: true,
            popup,
            popup_actions,
            errors,
            sync: Some(sync),
            mounted: true,
        }
    }

    pub fn config(&self) -> &MarkerPinConfig {
        &self.config
    }

    pub fn decorator(&self) -> &Arc<MarkerDecorator> {
        &self.decorator
    }

    pub fn images(&self) -> &ImageRegistry {
        &self.images
    }

    pub fn popup(&self) -> &PopupMenu {
        &self.popup
    }

    pub fn show_markers(&self) -> bool {
        self.show_markers
    }

    /// Visibility toggle: enables or disables the decorator.
    pub fn set_show_markers(&mut self, show: bool) -> DecoratorState {
        self.show_markers = show;
        if show {
            self.decorator.enable(&self.host.views)
        } else {
            self.popup.dismiss();
            self.decorator.disable(&self.host.views)
        }
    }

    pub fn decorator_state(&self) -> DecoratorState {
        self.decorator.state(&self.host.views)
    }

    pub fn active_pin(&self) -> Option<&PinImageRef> {
        self.active_pin.as_ref()
    }

    /// Retargets the placement tool to the pin named `name`.
    pub fn select_pin(&mut self, name: &str) -> Result<(), MarkerPinError> {
        let image = self
            .config
            .pin(name)
            .and_then(|pin| self.images.get(&pin.image))
            .ok_or_else(|| MarkerPinError::PinUnavailable(name.to_string()))?;

        PlaceMarkerTool::unregister(&self.host.tools);
        PlaceMarkerTool::register(&self.host.tools, self.decorator.clone(), image.clone());
        debug!(pin = name, "pin selected");
        self.active_pin = Some(image);
        Ok(())
    }

    /// Starts a placement. `false` when no pin image is available.
    pub fn arm_placement(&self) -> bool {
        self.host.tools.run(PLACE_MARKER_TOOL_ID)
    }

    /// Routes a primary click: open popup first, then the active tool, then
    /// marker picking.
    pub fn handle_click(&mut self, screen: Vec2) -> ClickOutcome {
        let outcome = self.route_click(screen);
        self.pump_popup_actions();
        outcome
    }

    fn route_click(&mut self, screen: Vec2) -> ClickOutcome {
        if self.popup.is_shown() {
            return ClickOutcome::Popup(self.popup.handle_click(screen));
        }
        let Some(viewport) = self.host.views.selected_view() else {
            return ClickOutcome::Ignored;
        };
        if let Some(outcome) = self.host.tools.on_primary_click(viewport.as_ref(), screen) {
            return ClickOutcome::Tool(outcome);
        }
        if !self.show_markers {
            return ClickOutcome::Ignored;
        }
        match self.decorator.pick_test(viewport.as_ref(), screen) {
            Some(picked) => {
                self.popup
                    .show(picked.screen, Some(picked.index), viewport.canvas_size());
                ClickOutcome::MarkerPicked(picked.index)
            }
            None => ClickOutcome::Ignored,
        }
    }

    fn pump_popup_actions(&mut self) {
        while let Ok(action) = self.popup_actions.try_recv() {
            match action {
                PopupAction::PlaceMarker => {
                    self.arm_placement();
                }
                PopupAction::Dismiss => debug!("popup closed"),
            }
        }
    }

    /// Next transport error reported by live sync, if any.
    pub fn try_next_error(&mut self) -> Option<MarkerPinError> {
        self.errors.try_recv().ok()
    }

    pub async fn next_error(&mut self) -> Option<MarkerPinError> {
        self.errors.recv().await
    }

    /// Flies the selected view to `destination`. `false` without a geocoder,
    /// without a view, or when the place does not resolve.
    pub async fn travel_to(&self, destination: &str) -> bool {
        let Some(geocoder) = self.geocoder.as_deref() else {
            warn!("travel requested without a geocoder");
            return false;
        };
        let Some(viewport) = self.host.views.selected_view() else {
            debug!("travel requested without an open view");
            return false;
        };
        geocode::travel_to(viewport.as_ref(), geocoder, destination).await
    }

    /// Stops live sync and releases host registrations.
    pub async fn unmount(mut self) -> Option<SyncSummary> {
        let summary = match self.sync.take() {
            Some(sync) => sync.stop().await,
            None => None,
        };
        self.teardown();
        summary
    }

    fn teardown(&mut self) {
        if !self.mounted {
            return;
        }
        self.mounted = false;
        // Dropping the handle aborts the task, which closes the subscription.
        self.sync = None;
        PlaceMarkerTool::unregister(&self.host.tools);
        self.decorator.disable(&self.host.views);
        self.popup.dismiss();
        info!("marker pin widget unmounted");
    }
}

impl Drop for MarkerPinWidget {
    fn drop(&mut self) {
        self.teardown();
    }
}
