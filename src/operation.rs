//! Operation kinds the pipeline can dispatch against an image.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AdjustmentKind {
    Contrast,
    Brightness,
    Exposure,
    Hue,
    Saturation,
    Lightness,
}

impl AdjustmentKind {
    pub const ALL: [Self; 6] = [
        Self::Contrast,
        Self::Brightness,
        Self::Exposure,
        Self::Hue,
        Self::Saturation,
        Self::Lightness,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Contrast => "contrast",
            Self::Brightness => "brightness",
            Self::Exposure => "exposure",
            Self::Hue => "hue",
            Self::Saturation => "saturation",
            Self::Lightness => "lightness",
        }
    }

    pub const fn neutral_value(self) -> f32 {
        0.0
    }

    const fn index(self) -> usize {
        match self {
            Self::Contrast => 0,
            Self::Brightness => 1,
            Self::Exposure => 2,
            Self::Hue => 3,
            Self::Saturation => 4,
            Self::Lightness => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelKind {
    BoxBlur,
    GaussianBlur,
    MedianBlur,
    BilateralBlur,
    ContrastStretch,
}

impl KernelKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::BoxBlur => "box-blur",
            Self::GaussianBlur => "gaussian-blur",
            Self::MedianBlur => "median-blur",
            Self::BilateralBlur => "bilateral-blur",
            Self::ContrastStretch => "contrast-stretch",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformKind {
    /// Mirror top to bottom.
    Flip,
    /// Mirror left to right.
    Flop,
    Transpose,
}

impl TransformKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Flip => "flip",
            Self::Flop => "flop",
            Self::Transpose => "transpose",
        }
    }

    pub const fn swaps_dimensions(self) -> bool {
        matches!(self, Self::Transpose)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operation {
    Adjust { kind: AdjustmentKind, value: f32 },
    Kernel { kind: KernelKind, radius: u32 },
    Transform(TransformKind),
}

impl Operation {
    /// Whether undo can recompute the previous state from the live image
    /// instead of restoring a retained snapshot. Depends only on the kind.
    pub const fn trivial_undo(&self) -> bool {
        matches!(self, Self::Adjust { .. })
    }

    pub const fn label(&self) -> &'static str {
        match self {
            Self::Adjust { kind, .. } => kind.label(),
            Self::Kernel { kind, .. } => kind.label(),
            Self::Transform(kind) => kind.label(),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Adjust { kind, value } => write!(f, "{}={value}", kind.label()),
            Self::Kernel { kind, radius } => write!(f, "{}={radius}", kind.label()),
            Self::Transform(kind) => f.write_str(kind.label()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseOperationError {
    #[error("unknown operation: {0}")]
    Unknown(String),
    #[error("operation {name} requires a value")]
    MissingValue { name: String },
    #[error("operation {name} does not take a value")]
    UnexpectedValue { name: String },
    #[error("invalid value {value:?} for operation {name}")]
    InvalidValue { name: String, value: String },
}

impl FromStr for Operation {
    type Err = ParseOperationError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (name, value) = match input.split_once('=') {
            Some((name, value)) => (name.trim(), Some(value.trim())),
            None => (input.trim(), None),
        };
        let invalid = |value: &str| ParseOperationError::InvalidValue {
            name: name.to_string(),
            value: value.to_string(),
        };

        if let Some(kind) = AdjustmentKind::ALL
            .into_iter()
            .find(|kind| kind.label() == name)
        {
            let value = value.ok_or_else(|| ParseOperationError::MissingValue {
                name: name.to_string(),
            })?;
            let parsed = value
                .parse::<f32>()
                .ok()
                .filter(|value| value.is_finite())
                .ok_or_else(|| invalid(value))?;
            return Ok(Self::Adjust {
                kind,
                value: parsed,
            });
        }

        let kernel = match name {
            "box-blur" => Some(KernelKind::BoxBlur),
            "gaussian-blur" => Some(KernelKind::GaussianBlur),
            "median-blur" => Some(KernelKind::MedianBlur),
            "bilateral-blur" => Some(KernelKind::BilateralBlur),
            "contrast-stretch" => Some(KernelKind::ContrastStretch),
            _ => None,
        };
        if let Some(kind) = kernel {
            let value = value.ok_or_else(|| ParseOperationError::MissingValue {
                name: name.to_string(),
            })?;
            let radius = value.parse::<u32>().map_err(|_| invalid(value))?;
            return Ok(Self::Kernel { kind, radius });
        }

        let transform = match name {
            "flip" => TransformKind::Flip,
            "flop" => TransformKind::Flop,
            "transpose" => TransformKind::Transpose,
            _ => return Err(ParseOperationError::Unknown(name.to_string())),
        };
        if value.is_some() {
            return Err(ParseOperationError::UnexpectedValue {
                name: name.to_string(),
            });
        }
        Ok(Self::Transform(transform))
    }
}

/// Last applied value per point adjustment kind.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AdjustmentValues {
    values: [f32; 6],
}

impl AdjustmentValues {
    pub fn get(&self, kind: AdjustmentKind) -> f32 {
        self.values[kind.index()]
    }

    pub fn set(&mut self, kind: AdjustmentKind, value: f32) {
        self.values[kind.index()] = value;
    }

    pub fn is_neutral(&self) -> bool {
        AdjustmentKind::ALL
            .into_iter()
            .all(|kind| self.get(kind) == kind.neutral_value())
    }
}
