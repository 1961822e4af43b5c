// THEORY:
// `EffectConfig` is the flat set of named parameters that steer one frame of the
// effect. It is owned by whatever drives the engine (a CLI, a UI, a test) and is
// handed to the pipeline as an immutable snapshot at the start of every frame,
// so a parameter change can never land halfway through a detection pass.
//
// The serialized names are the camelCase names the controls use (`maxBlobs`,
// `colorRGB`, ...). Every field has a default, so a partial JSON file only needs
// to mention what it changes.

use crate::error::{EffectError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::watch;

/// What a blob label shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelType {
    /// `ID:<id>`
    Id,
    /// Rectangle size relative to the frame, `x=0.031, y=0.055`.
    Size,
}

/// How the interior of a selected rectangle is painted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillMode {
    None,
    Solid,
    Lighten,
    /// Accepted for compatibility with saved settings; paints nothing.
    Multiply,
    Difference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DashStyle {
    Solid,
    Dashed,
}

/// An opaque overlay color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorRgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl ColorRgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_rgba(self) -> image::Rgba<u8> {
        image::Rgba([self.r, self.g, self.b, 255])
    }
}

/// The per-frame configuration snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EffectConfig {
    /// Brightness a downsampled pixel must exceed to belong to a blob.
    pub threshold: f64,
    /// Upper bound on blobs kept per frame, largest first.
    pub max_blobs: usize,
    /// Base rectangle edge in full-resolution pixels.
    pub blob_size: f64,
    /// Jitter amplitude in percent of `blob_size`.
    pub size_randomness: f64,
    /// Label text height in pixels.
    pub number_size: f32,
    pub label_type: LabelType,
    pub fill_mode: FillMode,
    /// Percentage of blobs (chosen by id) that receive the fill.
    pub fill_ratio: f64,
    #[serde(rename = "colorRGB")]
    pub color: ColorRgb,
    /// 0 draws a polygon, 100 draws fully rounded Catmull-Rom style curves.
    pub line_smoothness: f64,
    pub line_dash_style: DashStyle,
    pub show_numbers: bool,
    pub show_lines: bool,
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            threshold: 100.0,
            max_blobs: 5,
            blob_size: 40.0,
            size_randomness: 200.0,
            number_size: 18.0,
            label_type: LabelType::Size,
            fill_mode: FillMode::None,
            fill_ratio: 100.0,
            color: ColorRgb::new(250, 250, 250),
            line_smoothness: 0.0,
            line_dash_style: DashStyle::Solid,
            show_numbers: true,
            show_lines: true,
        }
    }
}

impl EffectConfig {
    /// Loads a configuration from a JSON file and validates it.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: EffectConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects non-finite numbers and percentages outside 0..=100.
    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() {
            return Err(EffectError::Config("threshold must be finite".to_string()));
        }
        if !self.blob_size.is_finite() || self.blob_size < 0.0 {
            return Err(EffectError::Config(
                "blobSize must be a non-negative number".to_string(),
            ));
        }
        if !self.size_randomness.is_finite() || self.size_randomness < 0.0 {
            return Err(EffectError::Config(
                "sizeRandomness must be a non-negative number".to_string(),
            ));
        }
        if !self.number_size.is_finite() || self.number_size <= 0.0 {
            return Err(EffectError::Config(
                "numberSize must be a positive number".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.fill_ratio) {
            return Err(EffectError::Config(
                "fillRatio must be between 0 and 100".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.line_smoothness) {
            return Err(EffectError::Config(
                "lineSmoothness must be between 0 and 100".to_string(),
            ));
        }
        Ok(())
    }
}

/// Shared, replaceable configuration. The controller side calls `update`; the
/// frame loop takes a snapshot per frame through a receiver.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    tx: watch::Sender<EffectConfig>,
}

impl ConfigHandle {
    pub fn new(initial: EffectConfig) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    pub fn update(&self, config: EffectConfig) {
        self.tx.send_replace(config);
    }

    /// Applies an in-place edit, the way a single slider changes one field.
    pub fn modify(&self, edit: impl FnOnce(&mut EffectConfig)) {
        self.tx.send_modify(edit);
    }

    pub fn snapshot(&self) -> EffectConfig {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<EffectConfig> {
        self.tx.subscribe()
    }
}
