use std::sync::Arc;

use bytes::Bytes;
use foundation::Rect;
use foundation::math::{Vec2, Vec3};

/// A loaded pin image. Shared between markers through [`PinImageRef`].
#[derive(Debug, Clone, PartialEq)]
pub struct PinImage {
    name: String,
    data: Bytes,
    size_px: Vec2,
}

pub type PinImageRef = Arc<PinImage>;

impl PinImage {
    pub fn new(name: impl Into<String>, data: Bytes, size_px: Vec2) -> Self {
        Self {
            name: name.into(),
            data,
            size_px,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn size_px(&self) -> Vec2 {
        self.size_px
    }
}

/// Image-less marker payload, as produced by feed conversion.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MarkerData {
    pub point: Vec3,
}

impl MarkerData {
    pub fn new(point: Vec3) -> Self {
        Self { point }
    }
}

/// A pin at a fixed world-space position.
///
/// Equality is positional: two markers at the same point are the same marker
/// as far as rendering and picking are concerned.
#[derive(Debug, Clone)]
pub struct SpatialMarker {
    position: Vec3,
    image: PinImageRef,
}

impl SpatialMarker {
    pub fn new(position: Vec3, image: PinImageRef) -> Self {
        Self { position, image }
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn image(&self) -> &PinImageRef {
        &self.image
    }

    /// Screen rectangle covered by the pin when its tip sits at `screen`.
    pub fn hit_rect(&self, screen: Vec2) -> Rect {
        Rect::anchored_bottom_center(screen, self.image.size_px())
    }
}

impl PartialEq for SpatialMarker {
    fn eq(&self, other: &Self) -> bool {
        self.position == other.position
    }
}

#[cfg(test)]
mod tests {
    use super::{PinImage, SpatialMarker};
    use bytes::Bytes;
    use foundation::math::{Vec2, Vec3};
    use std::sync::Arc;

    #[test]
    fn markers_compare_by_position_only() {
        let a = Arc::new(PinImage::new("a.svg", Bytes::from_static(b"a"), Vec2::new(30.0, 30.0)));
        let b = Arc::new(PinImage::new("b.svg", Bytes::from_static(b"b"), Vec2::new(10.0, 10.0)));
        let p = Vec3::new(1.0, 2.0, 3.0);
        assert_eq!(SpatialMarker::new(p, a.clone()), SpatialMarker::new(p, b));
        assert_ne!(
            SpatialMarker::new(p, a.clone()),
            SpatialMarker::new(Vec3::ZERO, a)
        );
    }

    #[test]
    fn hit_rect_uses_image_size() {
        let img = Arc::new(PinImage::new("a.svg", Bytes::new(), Vec2::new(20.0, 40.0)));
        let m = SpatialMarker::new(Vec3::ZERO, img);
        let r = m.hit_rect(Vec2::new(50.0, 50.0));
        assert_eq!(r.width(), 20.0);
        assert_eq!(r.height(), 40.0);
        assert!(r.contains(Vec2::new(50.0, 50.0)));
        assert!(r.contains(Vec2::new(50.0, 10.0)));
    }
}
