//! Host input-tool registry. At most one tool instance is active; a fresh
//! instance is built from the registered factory on every activation.

use std::collections::HashMap;
use std::sync::Arc;

use foundation::math::Vec2;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::viewport::Viewport;

pub type ToolId = &'static str;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    /// The tool stays active and wants more input.
    Continue,
    /// The tool is done; the admin drops it.
    Finished,
}

pub trait InteractiveTool: Send {
    fn id(&self) -> ToolId;

    /// Called once when the tool becomes the active tool.
    fn on_install(&mut self) {}

    /// Called when the tool is cancelled or replaced before finishing.
    fn on_cancel(&mut self) {}

    fn on_primary_click(&mut self, viewport: &dyn Viewport, screen: Vec2) -> ToolOutcome;
}

pub type ToolFactory = Arc<dyn Fn() -> Box<dyn InteractiveTool> + Send + Sync>;

#[derive(Default)]
struct ToolAdminInner {
    registry: HashMap<ToolId, ToolFactory>,
    active: Option<Box<dyn InteractiveTool>>,
}

#[derive(Default)]
pub struct ToolAdmin {
    inner: Mutex<ToolAdminInner>,
}

impl ToolAdmin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` (and keeps the existing definition) if `id` is taken.
    pub fn register(&self, id: ToolId, factory: ToolFactory) -> bool {
        let mut inner = self.inner.lock();
        if inner.registry.contains_key(id) {
            return false;
        }
        inner.registry.insert(id, factory);
        debug!(tool = id, "tool registered");
        true
    }

    /// Removes `id`, cancelling it first if it is the active tool.
    pub fn unregister(&self, id: ToolId) -> bool {
        let mut inner = self.inner.lock();
        if inner.active.as_ref().is_some_and(|t| t.id() == id)
            && let Some(mut tool) = inner.active.take()
        {
            tool.on_cancel();
        }
        let removed = inner.registry.remove(id).is_some();
        if removed {
            debug!(tool = id, "tool unregistered");
        }
        removed
    }

    pub fn is_registered(&self, id: ToolId) -> bool {
        self.inner.lock().registry.contains_key(id)
    }

    /// Activates a new instance of `id`, cancelling whatever was active.
    pub fn run(&self, id: ToolId) -> bool {
        let mut inner = self.inner.lock();
        let Some(factory) = inner.registry.get(id).cloned() else {
            warn!(tool = id, "cannot run unregistered tool");
            return false;
        };
        if let Some(mut previous) = inner.active.take() {
            previous.on_cancel();
        }
        let mut tool = factory();
        tool.on_install();
        inner.active = Some(tool);
        debug!(tool = id, "tool started");
        true
    }

    /// Cancels the active tool. Returns `false` if none was active.
    pub fn cancel(&self) -> bool {
        let Some(mut tool) = self.inner.lock().active.take() else {
            return false;
        };
        tool.on_cancel();
        debug!(tool = tool.id(), "tool cancelled");
        true
    }

    pub fn active_tool(&self) -> Option<ToolId> {
        self.inner.lock().active.as_ref().map(|t| t.id())
    }

    /// Routes a primary-button click to the active tool. `None` if idle.
    pub fn on_primary_click(&self, viewport: &dyn Viewport, screen: Vec2) -> Option<ToolOutcome> {
        let mut inner = self.inner.lock();
        let tool = inner.active.as_mut()?;
        let outcome = tool.on_primary_click(viewport, screen);
        if outcome == ToolOutcome::Finished {
            inner.active = None;
        }
        Some(outcome)
    }
}
