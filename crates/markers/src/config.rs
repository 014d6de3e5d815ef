//! Widget configuration: JSON file plus `MARKER_PIN_*` environment overrides.

use std::path::{Path, PathBuf};

use foundation::math::Vec2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::feed::TableSelector;

/// A named pin the user can place with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinSelection {
    pub name: String,
    /// Image id handed to the image source.
    pub image: String,
}

impl PinSelection {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MarkerPinConfig {
    pub feed_schema: String,
    pub feed_table: String,
    pub pins: Vec<PinSelection>,
    /// Image id the placement tool starts with.
    pub default_pin: String,
    pub image_root: PathBuf,
    pub pin_size_px: [f64; 2],
    pub popup_item_size_px: [f64; 2],
}

impl Default for MarkerPinConfig {
    fn default() -> Self {
        Self {
            feed_schema: "public".to_string(),
            feed_table: "coords2".to_string(),
            pins: vec![
                PinSelection::new("Google Pin", "pin_google_maps.svg"),
                PinSelection::new("Celery Pin", "pin_celery.svg"),
                PinSelection::new("Polo blue Pin", "pin_poloblue.svg"),
            ],
            default_pin: "pin_google_maps.svg".to_string(),
            image_root: PathBuf::from("assets/pins"),
            pin_size_px: [30.0, 30.0],
            popup_item_size_px: [140.0, 24.0],
        }
    }
}

impl MarkerPinConfig {
    /// Reads a JSON config. A missing file yields the defaults.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match tokio::fs::read_to_string(path).await {
            Ok(text) => {
                let config = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?;
                info!(path = %path.display(), "loaded marker pin config");
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies `MARKER_PIN_*` overrides looked up through `lookup`.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        self.feed_schema = var_string(&lookup, "MARKER_PIN_FEED_SCHEMA", self.feed_schema);
        self.feed_table = var_string(&lookup, "MARKER_PIN_FEED_TABLE", self.feed_table);
        self.default_pin = var_string(&lookup, "MARKER_PIN_DEFAULT_PIN", self.default_pin);
        if let Some(root) = lookup("MARKER_PIN_IMAGE_ROOT").filter(|v| !v.trim().is_empty()) {
            self.image_root = PathBuf::from(root);
        }
        if let Some(size) = var_f64(&lookup, "MARKER_PIN_PIN_SIZE_PX")
            .filter(|size| size.is_finite() && *size > 0.0)
        {
            self.pin_size_px = [size, size];
        }
        self
    }

    pub fn table(&self) -> TableSelector {
        TableSelector::new(&self.feed_schema, &self.feed_table)
    }

    /// Every image id to preload, default pin included.
    pub fn image_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.pins.iter().map(|p| p.image.clone()).collect();
        if !ids.contains(&self.default_pin) {
            ids.push(self.default_pin.clone());
        }
        ids
    }

    pub fn pin(&self, name: &str) -> Option<&PinSelection> {
        self.pins.iter().find(|p| p.name == name)
    }

    pub fn pin_size(&self) -> Vec2 {
        Vec2::new(self.pin_size_px[0], self.pin_size_px[1])
    }

    pub fn popup_item_size(&self) -> Vec2 {
        Vec2::new(self.popup_item_size_px[0], self.popup_item_size_px[1])
    }
}

fn var_string(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: String) -> String {
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(default)
}

fn var_f64(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<f64> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}
