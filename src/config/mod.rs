use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::operation::AdjustmentKind;
use crate::render::PixelLayout;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigPathError {
    MissingHomeDirectory,
}

const APP_DIR: &str = "retouch";
const PIPELINE_CONFIG_FILE: &str = "pipeline.json";
const DEFAULT_ADJUSTMENT_EPSILON: f32 = 0.003;
const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// Delta below which a point adjustment is treated as slider jitter and
/// skipped, one tolerance per adjustment kind.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct AdjustmentEpsilon {
    pub contrast: f32,
    pub brightness: f32,
    pub exposure: f32,
    pub hue: f32,
    pub saturation: f32,
    pub lightness: f32,
}

impl AdjustmentEpsilon {
    pub const fn uniform(epsilon: f32) -> Self {
        Self {
            contrast: epsilon,
            brightness: epsilon,
            exposure: epsilon,
            hue: epsilon,
            saturation: epsilon,
            lightness: epsilon,
        }
    }

    pub const fn for_kind(&self, kind: AdjustmentKind) -> f32 {
        match kind {
            AdjustmentKind::Contrast => self.contrast,
            AdjustmentKind::Brightness => self.brightness,
            AdjustmentKind::Exposure => self.exposure,
            AdjustmentKind::Hue => self.hue,
            AdjustmentKind::Saturation => self.saturation,
            AdjustmentKind::Lightness => self.lightness,
        }
    }
}

impl Default for AdjustmentEpsilon {
    fn default() -> Self {
        Self::uniform(DEFAULT_ADJUSTMENT_EPSILON)
    }
}

/// Pipeline settings from `pipeline.json`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Pending operations allowed per open image before new requests are
    /// rejected.
    pub queue_capacity: usize,
    pub initial_transfer_bytes: usize,
    pub renderer_layout: PixelLayout,
    pub exposure_black_point: f32,
    pub epsilon: AdjustmentEpsilon,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            initial_transfer_bytes: 0,
            renderer_layout: PixelLayout::default(),
            exposure_black_point: 0.0,
            epsilon: AdjustmentEpsilon::default(),
        }
    }
}

pub fn load_pipeline_config() -> PipelineConfig {
    let xdg_config_home = std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from);
    let home = std::env::var_os("HOME").map(PathBuf::from);
    load_pipeline_config_with(xdg_config_home.as_deref(), home.as_deref())
}

fn load_pipeline_config_with(xdg_config_home: Option<&Path>, home: Option<&Path>) -> PipelineConfig {
    let Ok(path) = pipeline_config_path(xdg_config_home, home) else {
        tracing::warn!("no config directory; using default pipeline settings");
        return PipelineConfig::default();
    };
    if !path.exists() {
        return PipelineConfig::default();
    }
    match std::fs::read_to_string(&path) {
        Ok(contents) => parse_pipeline_config(&contents).unwrap_or_else(|err| {
            tracing::warn!(?err, ?path, "failed to parse pipeline.json; using defaults");
            PipelineConfig::default()
        }),
        Err(err) => {
            tracing::warn!(?err, ?path, "failed to read pipeline.json; using defaults");
            PipelineConfig::default()
        }
    }
}

pub fn parse_pipeline_config(contents: &str) -> serde_json::Result<PipelineConfig> {
    let mut config: PipelineConfig = serde_json::from_str(contents)?;
    if config.queue_capacity == 0 {
        tracing::warn!("queue_capacity must be positive; using 1");
        config.queue_capacity = 1;
    }
    Ok(config)
}

/// `$XDG_CONFIG_HOME/retouch/pipeline.json`, or `~/.config/...` when the
/// XDG variable is unset or empty.
fn pipeline_config_path(
    xdg_config_home: Option<&Path>,
    home: Option<&Path>,
) -> Result<PathBuf, ConfigPathError> {
    let root = match xdg_config_home.filter(|dir| !dir.as_os_str().is_empty()) {
        Some(dir) => dir.to_path_buf(),
        None => home
            .ok_or(ConfigPathError::MissingHomeDirectory)?
            .join(".config"),
    };
    Ok(root.join(APP_DIR).join(PIPELINE_CONFIG_FILE))
}
