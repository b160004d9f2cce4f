use crate::constants::CANCELLATION_CHECK_INTERVAL_MS;
use crate::presets::VideoSize;
use async_trait::async_trait;
use regex::Regex;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// Everything the external compressor needs for one file: resolved size and
/// bitrate plus the output caps.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub video_size: VideoSize,
    pub bitrate_mbps: f32,
    pub disable_audio: bool,
    pub max_frame_rate: f32,
    pub max_duration_secs: Option<u32>,
    pub source_duration_secs: Option<f64>,
}

impl JobSpec {
    /// Duration the encoder will actually produce, used as the progress
    /// denominator. Unknown when the source duration could not be probed.
    fn effective_duration_secs(&self) -> Option<f64> {
        match (self.source_duration_secs, self.max_duration_secs) {
            (Some(source), Some(cap)) => Some(source.min(cap as f64)),
            (Some(source), None) => Some(source),
            (None, Some(cap)) => Some(cap as f64),
            (None, None) => None,
        }
    }
}

/// Snapshot of one `-progress` block. `fraction` stays 0.0 when the output
/// duration is unknown; the remaining fields are still populated.
#[derive(Debug, Clone, Default)]
pub struct Progress {
    pub fraction: f32,
    pub frame: u64,
    pub fps: f32,
    pub speed: f32,
    pub bitrate: String,
    pub out_time: Duration,
    pub eta: Option<Duration>,
}

#[derive(Debug, Clone)]
pub enum JobStatus {
    Starting,
    Running(Progress),
    Completed { destination: PathBuf },
    Failed { error: String },
    Cancelled,
}

pub type StatusSender = tokio::sync::mpsc::UnboundedSender<JobStatus>;
pub type StatusReceiver = tokio::sync::mpsc::UnboundedReceiver<JobStatus>;

/// Seam over the external compressor. Implementations send `Starting`, zero
/// or more `Running` updates, and exactly one terminal status.
#[async_trait]
pub trait Encode: Send + Sync {
    async fn run(&self, spec: JobSpec, cancel: Arc<AtomicBool>, status: StatusSender);
}

/// Rounds a computed dimension to the nearest even pixel count; libx264
/// rejects odd frame sizes with yuv420p output.
fn even_dimension(value: f64) -> u32 {
    let px = value.round().max(2.0) as u32;
    let px = px - px % 2;
    px.max(2)
}

fn build_args(spec: &JobSpec) -> Vec<String> {
    let mut args: Vec<String> = [
        "-nostdin",
        "-y",
        "-hide_banner",
        "-loglevel",
        "error",
        "-progress",
        "pipe:1",
        "-i",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push(spec.source.to_string_lossy().to_string());

    if let Some(limit) = spec.max_duration_secs.filter(|limit| *limit > 0) {
        args.push("-t".to_string());
        args.push(limit.to_string());
    }

    let width = even_dimension(spec.video_size.width);
    let height = even_dimension(spec.video_size.height);
    args.push("-vf".to_string());
    args.push(format!("scale={}:{}", width, height));

    args.push("-r".to_string());
    args.push(format!("{}", spec.max_frame_rate));

    args.push("-c:v".to_string());
    args.push("libx264".to_string());
    args.push("-b:v".to_string());
    args.push(format!("{}M", spec.bitrate_mbps));

    if spec.disable_audio {
        args.push("-an".to_string());
    } else {
        args.push("-c:a".to_string());
        args.push("aac".to_string());
    }

    args.push(spec.destination.to_string_lossy().to_string());
    args
}

/// Accumulates `-progress pipe:1` key=value lines and emits a snapshot at
/// each block boundary (the `progress=` line).
pub struct ProgressParser {
    duration_secs: Option<f64>,
    current: Progress,
    out_time_regex: Regex,
}

impl ProgressParser {
    pub fn new(duration_secs: Option<f64>) -> Self {
        Self {
            duration_secs,
            current: Progress::default(),
            out_time_regex: Regex::new(r"^(\d+):(\d{2}):(\d{2}(?:\.\d+)?)$").unwrap(),
        }
    }

    pub fn push_line(&mut self, line: &str) -> Option<Progress> {
        let (key, value) = line.split_once('=')?;
        let (key, value) = (key.trim(), value.trim());
        match key {
            "frame" => self.current.frame = value.parse().unwrap_or(0),
            "fps" => self.current.fps = value.parse().unwrap_or(0.0),
            "bitrate" => self.current.bitrate = value.to_string(),
            "speed" => {
                self.current.speed = value.trim_end_matches('x').parse().unwrap_or(0.0);
            }
            "out_time" => {
                if let Some(secs) = self.parse_out_time(value) {
                    self.current.out_time = Duration::from_secs_f64(secs);
                }
            }
            "progress" => return Some(self.snapshot()),
            _ => {}
        }
        None
    }

    fn parse_out_time(&self, value: &str) -> Option<f64> {
        let caps = self.out_time_regex.captures(value)?;
        let hours: f64 = caps[1].parse().ok()?;
        let minutes: f64 = caps[2].parse().ok()?;
        let seconds: f64 = caps[3].parse().ok()?;
        Some(hours * 3600.0 + minutes * 60.0 + seconds)
    }

    fn snapshot(&self) -> Progress {
        let mut progress = self.current.clone();
        if let Some(total) = self.duration_secs.filter(|total| *total > 0.0) {
            let elapsed = progress.out_time.as_secs_f64();
            progress.fraction = ((elapsed / total) as f32).clamp(0.0, 1.0);
            if progress.speed > 0.0 {
                let remaining = (total - elapsed).max(0.0) / progress.speed as f64;
                progress.eta = Some(Duration::from_secs_f64(remaining));
            }
        }
        progress
    }
}

/// Invokes ffmpeg as a child process, forwarding progress and observing the
/// cancel flag.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    ffmpeg: PathBuf,
}

impl FfmpegEncoder {
    pub fn new() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
        }
    }

    pub fn with_binary(ffmpeg: PathBuf) -> Self {
        Self { ffmpeg }
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Encode for FfmpegEncoder {
    async fn run(&self, spec: JobSpec, cancel: Arc<AtomicBool>, status: StatusSender) {
        let _ = status.send(JobStatus::Starting);

        let args = build_args(&spec);
        tracing::debug!(?args, "spawning ffmpeg");

        let mut child = match Command::new(&self.ffmpeg)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                let error = if e.kind() == std::io::ErrorKind::NotFound {
                    "ffmpeg not found in PATH".to_string()
                } else {
                    format!("failed to start ffmpeg: {}", e)
                };
                let _ = status.send(JobStatus::Failed { error });
                return;
            }
        };

        let Some(stdout) = child.stdout.take() else {
            let _ = status.send(JobStatus::Failed {
                error: "ffmpeg spawned without a stdout pipe".to_string(),
            });
            return;
        };

        let mut parser = ProgressParser::new(spec.effective_duration_secs());
        let mut lines = BufReader::new(stdout).lines();
        let mut ticker =
            tokio::time::interval(Duration::from_millis(CANCELLATION_CHECK_INTERVAL_MS));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if cancel.load(Ordering::Relaxed) {
                        if let Err(e) = child.kill().await {
                            tracing::warn!("failed to kill ffmpeg: {}", e);
                        }
                        let _ = child.wait().await;
                        let _ = status.send(JobStatus::Cancelled);
                        return;
                    }
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if let Some(progress) = parser.push_line(&line) {
                            let _ = status.send(JobStatus::Running(progress));
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!("failed to read ffmpeg progress: {}", e);
                        break;
                    }
                },
            }
        }

        // The progress stream can close because of a kill issued elsewhere.
        if cancel.load(Ordering::Relaxed) {
            let _ = child.kill().await;
            let _ = child.wait().await;
            let _ = status.send(JobStatus::Cancelled);
            return;
        }

        let stderr = child.stderr.take();
        match child.wait().await {
            Ok(exit) if exit.success() => {
                let _ = status.send(JobStatus::Completed {
                    destination: spec.destination.clone(),
                });
            }
            Ok(exit) => {
                let detail = match stderr {
                    Some(stderr) => read_error_detail(stderr).await,
                    None => String::new(),
                };
                let error = if detail.is_empty() {
                    format!("ffmpeg exited with {}", exit)
                } else {
                    format!("ffmpeg exited with {}: {}", exit, detail)
                };
                let _ = status.send(JobStatus::Failed { error });
            }
            Err(e) => {
                let _ = status.send(JobStatus::Failed {
                    error: format!("failed to wait for ffmpeg: {}", e),
                });
            }
        }
    }
}

async fn read_error_detail(stderr: tokio::process::ChildStderr) -> String {
    let mut lines = BufReader::new(stderr).lines();
    let mut detail = String::new();
    let mut count = 0;
    while let Ok(Some(line)) = lines.next_line().await {
        if !detail.is_empty() {
            detail.push(' ');
        }
        detail.push_str(line.trim());
        count += 1;
        if count >= 5 {
            break;
        }
    }
    detail
}
