//! The slice of the viewport host the marker subsystem talks to: decorator
//! registration, per-frame rendering and the one-shot "view opened" signal.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use foundation::Rect;
use foundation::math::Vec2;
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::marker::PinImageRef;
use crate::viewport::Viewport;

/// Render pass metadata.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Frame {
    /// 0-based render pass index.
    pub index: u64,
}

impl Frame {
    pub fn new(index: u64) -> Self {
        Self { index }
    }

    pub fn next(self) -> Self {
        Self::new(self.index + 1)
    }
}

/// Render target for decorations.
pub trait Canvas {
    fn draw_image(&mut self, image: &PinImageRef, rect: Rect);
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Image { image: String, rect: Rect },
}

/// Canvas that records draw calls instead of rasterizing them.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DrawList {
    pub commands: Vec<DrawCommand>,
}

impl DrawList {
    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

impl Canvas for DrawList {
    fn draw_image(&mut self, image: &PinImageRef, rect: Rect) {
        self.commands.push(DrawCommand::Image {
            image: image.name().to_string(),
            rect,
        });
    }
}

/// A renderable, pickable overlay.
pub trait Decorator: Send + Sync {
    fn decorate(&self, frame: Frame, viewport: &dyn Viewport, canvas: &mut dyn Canvas);

    fn test_decoration_hit(&self, viewport: &dyn Viewport, screen: Vec2) -> bool;
}

/// Resolves once, with the first view the host opens.
pub struct ViewOpened {
    rx: watch::Receiver<Option<Arc<dyn Viewport>>>,
}

impl ViewOpened {
    /// `None` if the host went away before any view opened.
    pub async fn opened(mut self) -> Option<Arc<dyn Viewport>> {
        let view = self.rx.wait_for(Option::is_some).await.ok()?.clone();
        view
    }

    pub fn is_open(&self) -> bool {
        self.rx.borrow().is_some()
    }
}

/// Decorator registry and render/pick pipeline for the host's views.
pub struct ViewManager {
    decorators: RwLock<Vec<Arc<dyn Decorator>>>,
    first_view: watch::Sender<Option<Arc<dyn Viewport>>>,
    selected: RwLock<Option<Arc<dyn Viewport>>>,
    next_frame: AtomicU64,
}

impl Default for ViewManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewManager {
    pub fn new() -> Self {
        let (first_view, _) = watch::channel(None);
        Self {
            decorators: RwLock::new(Vec::new()),
            first_view,
            selected: RwLock::new(None),
            next_frame: AtomicU64::new(0),
        }
    }

    /// Registers `decorator`. Returns `false` if it was already registered.
    pub fn add_decorator(&self, decorator: Arc<dyn Decorator>) -> bool {
        let mut decorators = self.decorators.write();
        if decorators.iter().any(|d| same_decorator(d, &decorator)) {
            return false;
        }
        decorators.push(decorator);
        true
    }

    /// Unregisters `decorator`. Returns `false` if it was not registered.
    pub fn drop_decorator(&self, decorator: &Arc<dyn Decorator>) -> bool {
        let mut decorators = self.decorators.write();
        let before = decorators.len();
        decorators.retain(|d| !same_decorator(d, decorator));
        decorators.len() != before
    }

    pub fn has_decorator(&self, decorator: &Arc<dyn Decorator>) -> bool {
        self.decorators
            .read()
            .iter()
            .any(|d| same_decorator(d, decorator))
    }

    pub fn decorator_count(&self) -> usize {
        self.decorators.read().len()
    }

    /// Makes `viewport` the selected view. The first call also resolves every
    /// outstanding and future [`ViewOpened`].
    pub fn open_view(&self, viewport: Arc<dyn Viewport>) {
        *self.selected.write() = Some(viewport.clone());
        let first = self.first_view.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(viewport);
            true
        });
        if first {
            info!("first view opened");
        }
    }

    pub fn selected_view(&self) -> Option<Arc<dyn Viewport>> {
        self.selected.read().clone()
    }

    pub fn on_view_open(&self) -> ViewOpened {
        ViewOpened {
            rx: self.first_view.subscribe(),
        }
    }

    /// Runs one render pass over the selected view. `None` without a view.
    pub fn render_frame(&self, canvas: &mut dyn Canvas) -> Option<Frame> {
        let viewport = self.selected_view()?;
        let frame = Frame::new(self.next_frame.fetch_add(1, Ordering::Relaxed));
        // Snapshot so decorators may (un)register from inside a pass.
        let decorators = self.decorators.read().clone();
        for decorator in &decorators {
            decorator.decorate(frame, viewport.as_ref(), canvas);
        }
        debug!(frame = frame.index, decorators = decorators.len(), "rendered");
        Some(frame)
    }

    /// True if any registered decoration is under `screen`.
    pub fn pick_decorations(&self, screen: Vec2) -> bool {
        let Some(viewport) = self.selected_view() else {
            return false;
        };
        let decorators = self.decorators.read().clone();
        decorators
            .iter()
            .any(|d| d.test_decoration_hit(viewport.as_ref(), screen))
    }
}

fn same_decorator(a: &Arc<dyn Decorator>, b: &Arc<dyn Decorator>) -> bool {
    // Compare data pointers only; vtable pointers are not unique.
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
