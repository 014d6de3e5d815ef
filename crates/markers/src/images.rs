//! Pin image loading and the per-widget image cache.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use foundation::math::Vec2;
use futures_util::future::join_all;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::ImageError;
use crate::marker::{PinImage, PinImageRef};
use crate::viewport::BoxFuture;

/// Where pin images come from.
pub trait ImageSource: Send + Sync {
    fn load_image(&self, id: &str) -> BoxFuture<'_, Result<PinImage, ImageError>>;
}

/// Images read from files under a root directory; `id` is the relative path.
pub struct DirImageSource {
    root: PathBuf,
    size_px: Vec2,
}

impl DirImageSource {
    pub fn new(root: impl AsRef<Path>, size_px: Vec2) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            size_px,
        }
    }
}

impl ImageSource for DirImageSource {
    fn load_image(&self, id: &str) -> BoxFuture<'_, Result<PinImage, ImageError>> {
        let path = self.root.join(id);
        let id = id.to_string();
        Box::pin(async move {
            let data = match tokio::fs::read(&path).await {
                Ok(data) => data,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(ImageError::NotFound(id));
                }
                Err(source) => return Err(ImageError::Io { name: id, source }),
            };
            if data.is_empty() {
                return Err(ImageError::Empty(id));
            }
            Ok(PinImage::new(id, Bytes::from(data), self.size_px))
        })
    }
}

/// Images held in memory, keyed by id.
#[derive(Default)]
pub struct MemoryImageSource {
    images: RwLock<HashMap<String, Bytes>>,
    size_px: Vec2,
}

impl MemoryImageSource {
    pub fn new(size_px: Vec2) -> Self {
        Self {
            images: RwLock::default(),
            size_px,
        }
    }

    pub fn with_image(self, id: &str, data: impl Into<Bytes>) -> Self {
        self.images.write().insert(id.to_string(), data.into());
        self
    }
}

impl ImageSource for MemoryImageSource {
    fn load_image(&self, id: &str) -> BoxFuture<'_, Result<PinImage, ImageError>> {
        let result = match self.images.read().get(id) {
            None => Err(ImageError::NotFound(id.to_string())),
            Some(data) if data.is_empty() => Err(ImageError::Empty(id.to_string())),
            Some(data) => Ok(PinImage::new(id, data.clone(), self.size_px)),
        };
        Box::pin(async move { result })
    }
}

/// Loaded pin images, scoped to one mounted widget.
///
/// An image that failed to load is simply absent; callers that need it get
/// `None` and no-op.
#[derive(Debug, Default)]
pub struct ImageRegistry {
    images: HashMap<String, PinImageRef>,
}

impl ImageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every id concurrently. Returns how many loaded.
    pub async fn preload(&mut self, source: &dyn ImageSource, ids: &[String]) -> usize {
        let results = join_all(ids.iter().map(|id| source.load_image(id))).await;
        let mut loaded = 0;
        for (id, result) in ids.iter().zip(results) {
            match result {
                Ok(image) => {
                    self.insert(image);
                    loaded += 1;
                }
                Err(err) => warn!(%err, image = %id, "pin image unavailable"),
            }
        }
        debug!(loaded, requested = ids.len(), "pin images preloaded");
        loaded
    }

    pub fn insert(&mut self, image: PinImage) -> PinImageRef {
        let image = Arc::new(image);
        self.images.insert(image.name().to_string(), image.clone());
        image
    }

    pub fn get(&self, id: &str) -> Option<PinImageRef> {
        self.images.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.images.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}
