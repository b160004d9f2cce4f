//! Preset-driven video compression front end.
//!
//! The crate computes a target resolution and bitrate from a small set of
//! preset levels, then delegates the actual transcoding to FFmpeg. The
//! first-party logic is deliberately small: an aspect-preserving resolution
//! clamp, a base-plus-delta bitrate table, and a facade that runs one job at
//! a time with progress events and best-effort cancellation.
//!
//! ```no_run
//! use lightpress::{CompressionRequest, Compressor, CompressorConfig, PresetLevel};
//!
//! # async fn demo() -> Result<(), lightpress::CompressionError> {
//! let compressor = Compressor::new(CompressorConfig::default());
//! let mut request = CompressionRequest::new("in.mp4".into(), "out.mp4".into());
//! request.preset_level = PresetLevel::High;
//! let (_handle, mut events) = compressor.start(request).await?;
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod compressor;
pub mod config;
pub mod constants;
pub mod events;
pub mod job;
pub mod presets;
pub mod probe;
pub mod state;
pub mod validate;

pub use compressor::{CompressionError, CompressionRequest, Compressor, JobHandle};
pub use config::CompressorConfig;
pub use events::{CompressionEvent, EventReceiver, EventSender, Outcome};
pub use job::Progress;
pub use presets::{
    resolve_bitrate_mbps, resolve_output_size, resolve_parameters, BitRateLevel, PresetLevel,
    ResolvedParameters, VideoSize,
};
pub use probe::{FfprobeInspector, MediaInspect, SourceInfo};
pub use state::JobState;
