use crate::constants::{APP_NAME, DEFAULT_MAX_FRAME_RATE};
use crate::presets::{BitRateLevel, PresetLevel};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressorConfig {
    /// Override for the ffmpeg binary; `None` relies on PATH.
    pub ffmpeg_path: Option<PathBuf>,
    /// Override for the ffprobe binary; `None` relies on PATH.
    pub ffprobe_path: Option<PathBuf>,
    pub default_preset_level: PresetLevel,
    pub default_bit_rate_level: BitRateLevel,
    /// Output frame-rate cap passed to the encoder.
    pub max_frame_rate: f32,
    pub disable_audio: bool,
    /// Output duration cap in seconds when a request does not carry its own.
    /// `None` (the default) leaves the output uncapped; the stock tool's
    /// 120 s cap is available as an explicit opt-in.
    pub default_max_duration_secs: Option<u32>,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            ffprobe_path: None,
            default_preset_level: PresetLevel::Medium,
            default_bit_rate_level: BitRateLevel::Medium,
            max_frame_rate: DEFAULT_MAX_FRAME_RATE,
            disable_audio: false,
            default_max_duration_secs: None,
        }
    }
}

impl CompressorConfig {
    pub fn load() -> Self {
        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join(APP_NAME).join("config.json");

            if config_path.exists() {
                if let Ok(content) = std::fs::read_to_string(&config_path) {
                    if let Ok(config) = serde_json::from_str::<CompressorConfig>(&content) {
                        return config;
                    }
                    tracing::warn!("ignoring malformed config at {:?}", config_path);
                }
            }
        }

        Self::default()
    }

    pub fn save(&self) {
        if let Some(config_dir) = dirs::config_dir() {
            let app_config_dir = config_dir.join(APP_NAME);

            if let Ok(()) = std::fs::create_dir_all(&app_config_dir) {
                let config_path = app_config_dir.join("config.json");

                if let Ok(content) = serde_json::to_string_pretty(self) {
                    let _ = std::fs::write(&config_path, content);
                }
            }
        }
    }
}
