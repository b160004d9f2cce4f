use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("ffprobe not found in PATH")]
    ToolNotFound,
    #[error("no readable video stream in {path}")]
    NoVideoStream { path: String },
    #[error("unexpected ffprobe output: {output}")]
    Malformed { output: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Natural size and duration of a source's primary video stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceInfo {
    pub width: f64,
    pub height: f64,
    pub duration_secs: Option<f64>,
}

/// Seam over media inspection so the facade can be exercised without a real
/// ffprobe binary.
#[async_trait]
pub trait MediaInspect: Send + Sync {
    async fn inspect(&self, source: &Path) -> Result<SourceInfo, ProbeError>;
}

#[derive(Debug, Clone)]
pub struct FfprobeInspector {
    ffprobe: PathBuf,
}

impl FfprobeInspector {
    pub fn new() -> Self {
        Self {
            ffprobe: PathBuf::from("ffprobe"),
        }
    }

    pub fn with_binary(ffprobe: PathBuf) -> Self {
        Self { ffprobe }
    }
}

impl Default for FfprobeInspector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaInspect for FfprobeInspector {
    async fn inspect(&self, source: &Path) -> Result<SourceInfo, ProbeError> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height",
                "-show_entries",
                "format=duration",
                "-of",
                "csv=p=0",
            ])
            .arg(source)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ProbeError::ToolNotFound
                } else {
                    ProbeError::Io(e)
                }
            })?;

        if !output.status.success() {
            return Err(ProbeError::NoVideoStream {
                path: source.to_string_lossy().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return Err(ProbeError::NoVideoStream {
                path: source.to_string_lossy().to_string(),
            });
        }

        parse_probe_output(&stdout).ok_or_else(|| ProbeError::Malformed {
            output: stdout.trim().to_string(),
        })
    }
}

/// Parses `csv=p=0` output: one `width,height` line for the selected stream,
/// then a duration line that may read `N/A`.
fn parse_probe_output(text: &str) -> Option<SourceInfo> {
    let mut lines = text.lines().filter(|line| !line.trim().is_empty());

    let dimensions = lines.next()?;
    let mut parts = dimensions.split(',');
    let width: f64 = parts.next()?.trim().parse().ok()?;
    let height: f64 = parts.next()?.trim().parse().ok()?;
    if width <= 0.0 || height <= 0.0 {
        return None;
    }

    let duration_secs = lines
        .next()
        .and_then(|line| line.trim().parse::<f64>().ok())
        .filter(|secs| *secs > 0.0);

    Some(SourceInfo {
        width,
        height,
        duration_secs,
    })
}
