// App constants
pub const APP_NAME: &str = "lightpress";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// Bitrate policy (Mbps)
pub const MIN_BITRATE_MBPS: f32 = 2.0;
pub const BITRATE_BASE_LEVEL: i32 = 3;
pub const BITRATE_MAX_LEVEL: i32 = 5;
pub const BITRATE_LEVEL_DELTA_MBPS: f32 = 0.5;

// Long-edge targets per preset tier (pixels)
pub const LONG_EDGE_HIGH: f64 = 1920.0;
pub const LONG_EDGE_MEDIUM: f64 = 1280.0;
pub const LONG_EDGE_LOW: f64 = 960.0;

// Output caps inherited from the stock tool configuration
pub const DEFAULT_MAX_FRAME_RATE: f32 = 30.0;
pub const DEFAULT_MAX_DURATION_SECS: u32 = 120;

// Encoder supervision
pub const CANCELLATION_CHECK_INTERVAL_MS: u64 = 100;

// File handling
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "wmv", "flv", "webm", "m4v", "3gp", "ogv",
];
