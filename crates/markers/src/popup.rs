use foundation::Rect;
use foundation::math::Vec2;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PopupAction {
    /// Arm the placement tool.
    PlaceMarker,
    Dismiss,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PopupItem {
    pub label: &'static str,
    pub action: PopupAction,
}

pub const DEFAULT_ITEMS: [PopupItem; 2] = [
    PopupItem {
        label: "Place marker",
        action: PopupAction::PlaceMarker,
    },
    PopupItem {
        label: "Close",
        action: PopupAction::Dismiss,
    },
];

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum PopupState {
    Hidden,
    Shown {
        /// Top-left corner of the menu after clamping to the canvas.
        origin: Vec2,
        /// Index of the marker the menu was opened on.
        marker: Option<usize>,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PopupClick {
    /// The menu was hidden; the click is not ours.
    Ignored,
    Selected(PopupAction),
    /// Click outside the menu closed it.
    Dismissed,
}

/// Transient menu anchored to a screen point. Selections are emitted on the
/// action channel; the menu closes after any click while shown.
#[derive(Debug)]
pub struct PopupMenu {
    items: Vec<PopupItem>,
    item_size: Vec2,
    state: PopupState,
    actions: mpsc::UnboundedSender<PopupAction>,
}

impl PopupMenu {
    pub fn new(item_size: Vec2, actions: mpsc::UnboundedSender<PopupAction>) -> Self {
        Self {
            items: DEFAULT_ITEMS.to_vec(),
            item_size,
            state: PopupState::Hidden,
            actions,
        }
    }

    pub fn channel(item_size: Vec2) -> (Self, mpsc::UnboundedReceiver<PopupAction>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(item_size, tx), rx)
    }

    pub fn items(&self) -> &[PopupItem] {
        &self.items
    }

    pub fn state(&self) -> PopupState {
        self.state
    }

    pub fn is_shown(&self) -> bool {
        matches!(self.state, PopupState::Shown { .. })
    }

    /// Opens the menu at `anchor`, shifted as needed to stay inside `canvas`.
    pub fn show(&mut self, anchor: Vec2, marker: Option<usize>, canvas: Vec2) {
        let size = self.menu_size();
        let origin = Vec2::new(
            anchor.x.min(canvas.x - size.x).max(0.0),
            anchor.y.min(canvas.y - size.y).max(0.0),
        );
        self.state = PopupState::Shown { origin, marker };
        debug!(?origin, ?marker, "popup shown");
    }

    pub fn dismiss(&mut self) {
        self.state = PopupState::Hidden;
    }

    pub fn item_rects(&self) -> Vec<(PopupItem, Rect)> {
        let PopupState::Shown { origin, .. } = self.state else {
            return Vec::new();
        };
        self.items
            .iter()
            .enumerate()
            .map(|(row, item)| {
                let top = Vec2::new(origin.x, origin.y + row as f64 * self.item_size.y);
                (*item, Rect::from_origin_size(top, self.item_size))
            })
            .collect()
    }

    pub fn handle_click(&mut self, screen: Vec2) -> PopupClick {
        if !self.is_shown() {
            return PopupClick::Ignored;
        }
        let hit = self
            .item_rects()
            .into_iter()
            .find(|(_, rect)| rect.contains(screen))
            .map(|(item, _)| item.action);
        self.dismiss();

        match hit {
            Some(action) => {
                // Receiver gone means the widget is tearing down.
                let _ = self.actions.send(action);
                PopupClick::Selected(action)
            }
            None => PopupClick::Dismissed,
        }
    }

    fn menu_size(&self) -> Vec2 {
        Vec2::new(self.item_size.x, self.item_size.y * self.items.len() as f64)
    }
}
