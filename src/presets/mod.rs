use crate::constants::{
    BITRATE_BASE_LEVEL, BITRATE_LEVEL_DELTA_MBPS, BITRATE_MAX_LEVEL, LONG_EDGE_HIGH,
    LONG_EDGE_LOW, LONG_EDGE_MEDIUM, MIN_BITRATE_MBPS,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LevelParseError {
    #[error("unknown preset level: {0}")]
    Preset(String),
    #[error("bitrate level must be 1..=5, got {0}")]
    BitRate(i32),
}

/// Resolution tier. Ordinal-ordered so that any level at or above `High`
/// resolves to the largest long-edge target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresetLevel {
    Low,
    Medium,
    High,
}

impl PresetLevel {
    pub fn ordinal(self) -> i32 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
        }
    }

    /// Long-edge cap in pixels for this tier.
    pub fn target_long_edge(self) -> f64 {
        match self.ordinal() {
            n if n >= 3 => LONG_EDGE_HIGH,
            2 => LONG_EDGE_MEDIUM,
            _ => LONG_EDGE_LOW,
        }
    }

    fn base_bitrate_mbps(self) -> f32 {
        match self {
            Self::High => 6.0,
            Self::Medium => 4.0,
            Self::Low => 3.0,
        }
    }
}

impl std::fmt::Display for PresetLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

impl FromStr for PresetLevel {
    type Err = LevelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(LevelParseError::Preset(other.to_string())),
        }
    }
}

/// Bitrate adjustment level, 1..=5. Level 3 is the neutral midpoint; each
/// step away from it shifts the table bitrate by half a megabit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BitRateLevel {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl BitRateLevel {
    pub fn ordinal(self) -> i32 {
        match self {
            Self::VeryLow => 1,
            Self::Low => 2,
            Self::Medium => 3,
            Self::High => 4,
            Self::VeryHigh => 5,
        }
    }

    pub fn from_ordinal(value: i32) -> Result<Self, LevelParseError> {
        match value {
            1 => Ok(Self::VeryLow),
            2 => Ok(Self::Low),
            3 => Ok(Self::Medium),
            4 => Ok(Self::High),
            5 => Ok(Self::VeryHigh),
            other => Err(LevelParseError::BitRate(other)),
        }
    }
}

impl std::fmt::Display for BitRateLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::VeryLow => write!(f, "very_low"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::VeryHigh => write!(f, "very_high"),
        }
    }
}

/// Output dimensions in pixels. Kept as exact reals; even-integer rounding
/// for the encoder happens when the scale filter is built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoSize {
    pub width: f64,
    pub height: f64,
}

/// Size and bitrate derived from a request, immutable once computed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedParameters {
    pub size: VideoSize,
    pub bitrate_mbps: f32,
}

/// Caps the long edge at the preset target and scales the short edge
/// proportionally. Never upscales: each output dimension is bounded by the
/// source dimension.
pub fn resolve_output_size(
    source_width: f64,
    source_height: f64,
    preset: PresetLevel,
) -> VideoSize {
    let target = preset.target_long_edge();
    if source_width > source_height {
        VideoSize {
            width: target.min(source_width),
            height: (target * source_height / source_width).min(source_height),
        }
    } else {
        VideoSize {
            width: (target * source_width / source_height).min(source_width),
            height: target.min(source_height),
        }
    }
}

/// Bitrate table:
///
/// | preset  | very_low | low | medium | high | very_high |
/// |---------|----------|-----|--------|------|-----------|
/// | low     | 2.0      | 2.5 | 3.0    | 3.5  | 4.0       |
/// | medium  | 3.0      | 3.5 | 4.0    | 4.5  | 5.0       |
/// | high    | 5.0      | 5.5 | 6.0    | 6.5  | 7.0       |
///
/// An explicit rate > 0 takes precedence over the table and is clamped to
/// `MIN_BITRATE_MBPS`. The table path carries no such clamp: only
/// caller-supplied rates are floored.
pub fn resolve_bitrate_mbps(
    preset: PresetLevel,
    level: BitRateLevel,
    explicit_mbps: Option<f32>,
) -> f32 {
    if let Some(rate) = explicit_mbps {
        if rate > 0.0 {
            return rate.max(MIN_BITRATE_MBPS);
        }
    }

    let mut bitrate = preset.base_bitrate_mbps();
    // Inherited from the original raw-integer levels; `BitRateLevel` ordinals
    // are always 1..=5, so the clamp and the zero guard never fire here.
    let level = level.ordinal().min(BITRATE_MAX_LEVEL);
    if level > 0 {
        bitrate += (level - BITRATE_BASE_LEVEL) as f32 * BITRATE_LEVEL_DELTA_MBPS;
    }
    bitrate
}

/// Resolves both output size and bitrate for a single request.
pub fn resolve_parameters(
    source_width: f64,
    source_height: f64,
    preset: PresetLevel,
    level: BitRateLevel,
    explicit_mbps: Option<f32>,
) -> ResolvedParameters {
    ResolvedParameters {
        size: resolve_output_size(source_width, source_height, preset),
        bitrate_mbps: resolve_bitrate_mbps(preset, level, explicit_mbps),
    }
}
