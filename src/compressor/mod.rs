use crate::config::CompressorConfig;
use crate::events::{self, CompressionEvent, EventReceiver, EventSender, Outcome};
use crate::job::{Encode, FfmpegEncoder, JobSpec, JobStatus, StatusReceiver};
use crate::presets::{resolve_parameters, BitRateLevel, PresetLevel};
use crate::probe::{FfprobeInspector, MediaInspect, ProbeError};
use crate::state::JobState;
use crate::validate::{self, ValidationError};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("cannot read source video dimensions: {0}")]
    SourceUnreadable(#[from] ProbeError),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("a compression job is already running: {job_id}")]
    AlreadyRunning { job_id: Uuid },
    #[error("compression failed: {0}")]
    Failed(String),
    #[error("compression ended without reporting a result")]
    Interrupted,
}

/// One transcode to submit: where to read, where to write, and the preset
/// inputs the resolvers turn into concrete parameters.
#[derive(Debug, Clone)]
pub struct CompressionRequest {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub preset_level: PresetLevel,
    pub bit_rate_level: BitRateLevel,
    /// Explicit bitrate in Mbps; values > 0 bypass the table and are clamped
    /// to the configured floor.
    pub bit_rate_mbps: Option<f32>,
    /// Output duration cap in seconds. `Some(0)` means no cap; `None` falls
    /// back to the configured default.
    pub max_duration_secs: Option<u32>,
}

impl CompressionRequest {
    pub fn new(source: PathBuf, destination: PathBuf) -> Self {
        Self {
            source,
            destination,
            preset_level: PresetLevel::Medium,
            bit_rate_level: BitRateLevel::Medium,
            bit_rate_mbps: None,
            max_duration_secs: None,
        }
    }
}

/// Identifies the in-flight job and carries its cancel flag. Cancellation is
/// best-effort: the terminal event may still be pending after `cancel`.
#[derive(Debug, Clone)]
pub struct JobHandle {
    id: Uuid,
    cancel: Arc<AtomicBool>,
}

impl JobHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}

struct ActiveJob {
    id: Uuid,
    cancel: Arc<AtomicBool>,
}

/// Caller-owned compression facade. Resolves output size and bitrate from
/// the preset inputs, then delegates the transcode to the encoder. At most
/// one job runs per instance; results arrive on the event channel returned
/// by [`Compressor::start`].
pub struct Compressor {
    config: CompressorConfig,
    inspector: Arc<dyn MediaInspect>,
    encoder: Arc<dyn Encode>,
    active: Arc<Mutex<Option<ActiveJob>>>,
    state: Arc<Mutex<JobState>>,
}

impl Compressor {
    pub fn new(config: CompressorConfig) -> Self {
        let inspector = match &config.ffprobe_path {
            Some(path) => FfprobeInspector::with_binary(path.clone()),
            None => FfprobeInspector::new(),
        };
        let encoder = match &config.ffmpeg_path {
            Some(path) => FfmpegEncoder::with_binary(path.clone()),
            None => FfmpegEncoder::new(),
        };
        Self::with_collaborators(config, Arc::new(inspector), Arc::new(encoder))
    }

    /// Injection point used by tests; production code goes through [`new`].
    ///
    /// [`new`]: Compressor::new
    pub fn with_collaborators(
        config: CompressorConfig,
        inspector: Arc<dyn MediaInspect>,
        encoder: Arc<dyn Encode>,
    ) -> Self {
        Self {
            config,
            inspector,
            encoder,
            active: Arc::new(Mutex::new(None)),
            state: Arc::new(Mutex::new(JobState::Idle)),
        }
    }

    /// Snapshot of the job lifecycle: `Running` while a job is in flight,
    /// `Idle` otherwise. Terminal results travel in the `Finished` event.
    pub async fn state(&self) -> JobState {
        self.state.lock().await.clone()
    }

    pub async fn is_running(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// Resolves parameters, claims the single job slot and starts the
    /// transcode. Returns the job handle and the event stream that delivers
    /// progress plus exactly one terminal [`Outcome`].
    pub async fn start(
        &self,
        request: CompressionRequest,
    ) -> Result<(JobHandle, EventReceiver), CompressionError> {
        let id = Uuid::new_v4();
        let cancel = Arc::new(AtomicBool::new(false));

        {
            let mut slot = self.active.lock().await;
            if let Some(job) = slot.as_ref() {
                return Err(CompressionError::AlreadyRunning { job_id: job.id });
            }
            *slot = Some(ActiveJob {
                id,
                cancel: Arc::clone(&cancel),
            });
        }

        let spec = match self.prepare(&request).await {
            Ok(spec) => spec,
            Err(e) => {
                self.active.lock().await.take();
                return Err(e);
            }
        };

        *self.state.lock().await = JobState::transition_to_running(id);
        tracing::info!(
            job_id = %id,
            source = %request.source.display(),
            "starting compression job"
        );

        let (event_tx, event_rx) = events::channel();
        let (status_tx, status_rx) = tokio::sync::mpsc::unbounded_channel();

        let encoder = Arc::clone(&self.encoder);
        let encoder_cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            encoder.run(spec, encoder_cancel, status_tx).await;
        });

        tokio::spawn(forward_status(
            id,
            status_rx,
            event_tx,
            Arc::clone(&self.active),
            Arc::clone(&self.state),
        ));

        Ok((JobHandle { id, cancel }, event_rx))
    }

    /// Requests cancellation of the running job; no-op when idle. The job is
    /// only finished once its `Cancelled` outcome arrives on the event
    /// channel.
    pub async fn cancel(&self) {
        let slot = self.active.lock().await;
        match slot.as_ref() {
            Some(job) => {
                job.cancel.store(true, Ordering::Relaxed);
                tracing::info!(job_id = %job.id, "cancellation requested");
            }
            None => tracing::debug!("cancel requested with no job running"),
        }
    }

    async fn prepare(&self, request: &CompressionRequest) -> Result<JobSpec, CompressionError> {
        validate::validate_request(&request.source, &request.destination).await?;

        let info = self.inspector.inspect(&request.source).await?;
        let resolved = resolve_parameters(
            info.width,
            info.height,
            request.preset_level,
            request.bit_rate_level,
            request.bit_rate_mbps,
        );
        tracing::debug!(
            width = resolved.size.width,
            height = resolved.size.height,
            bitrate_mbps = resolved.bitrate_mbps,
            "resolved compression parameters"
        );

        // An explicit cap of 0 disables the configured default.
        let max_duration_secs = match request.max_duration_secs {
            Some(0) => None,
            Some(cap) => Some(cap),
            None => self.config.default_max_duration_secs.filter(|cap| *cap > 0),
        };

        Ok(JobSpec {
            source: request.source.clone(),
            destination: request.destination.clone(),
            video_size: resolved.size,
            bitrate_mbps: resolved.bitrate_mbps,
            disable_audio: self.config.disable_audio,
            max_frame_rate: self.config.max_frame_rate,
            max_duration_secs,
            source_duration_secs: info.duration_secs,
        })
    }
}

/// Maps encoder statuses onto the public event stream, clears the job slot
/// at the first terminal status and guarantees exactly one `Finished` event.
async fn forward_status(
    job_id: Uuid,
    mut status_rx: StatusReceiver,
    events: EventSender,
    active: Arc<Mutex<Option<ActiveJob>>>,
    state: Arc<Mutex<JobState>>,
) {
    let mut outcome = None;
    while let Some(status) = status_rx.recv().await {
        match status {
            JobStatus::Starting => {
                let _ = events.send(CompressionEvent::Started { job_id });
            }
            JobStatus::Running(progress) => {
                let _ = events.send(CompressionEvent::Progress { job_id, progress });
            }
            JobStatus::Completed { destination } => {
                outcome = Some(Outcome::Succeeded { destination });
                break;
            }
            JobStatus::Failed { error } => {
                outcome = Some(Outcome::Failed {
                    error: CompressionError::Failed(error),
                });
                break;
            }
            JobStatus::Cancelled => {
                outcome = Some(Outcome::Cancelled);
                break;
            }
        }
    }
    let outcome = outcome.unwrap_or(Outcome::Failed {
        error: CompressionError::Interrupted,
    });

    // The machine settles Running -> terminal -> Idle in one step, before
    // the slot opens, so a newly admitted job cannot observe or clobber
    // this job's transition. The terminal result itself travels in the
    // Finished event below.
    {
        let mut state = state.lock().await;
        let previous = std::mem::take(&mut *state);
        let mut settled = match &outcome {
            Outcome::Succeeded { destination } => {
                previous.transition_to_succeeded(destination.clone())
            }
            Outcome::Failed { error } => previous.transition_to_failed(error.to_string()),
            Outcome::Cancelled => previous.transition_to_cancelled(),
        };
        tracing::debug!(terminal = ?settled, "compression job settled");
        settled.reset_to_idle();
        *state = settled;
    }
    active.lock().await.take();

    match &outcome {
        Outcome::Succeeded { destination } => {
            tracing::info!(%job_id, destination = %destination.display(), "compression succeeded");
        }
        Outcome::Failed { error } => tracing::error!(%job_id, %error, "compression failed"),
        Outcome::Cancelled => tracing::info!(%job_id, "compression cancelled"),
    }
    let _ = events.send(CompressionEvent::Finished { job_id, outcome });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{Progress, StatusSender};
    use crate::probe::SourceInfo;
    use async_trait::async_trait;
    use std::path::Path;
    use std::time::Duration;

    struct StubInspector {
        info: SourceInfo,
    }

    #[async_trait]
    impl MediaInspect for StubInspector {
        async fn inspect(&self, _source: &Path) -> Result<SourceInfo, ProbeError> {
            Ok(self.info)
        }
    }

    struct FailingInspector;

    #[async_trait]
    impl MediaInspect for FailingInspector {
        async fn inspect(&self, source: &Path) -> Result<SourceInfo, ProbeError> {
            Err(ProbeError::NoVideoStream {
                path: source.to_string_lossy().to_string(),
            })
        }
    }

    /// Records the spec it was handed, then completes immediately.
    struct CapturingEncoder {
        seen: Arc<Mutex<Option<JobSpec>>>,
    }

    #[async_trait]
    impl Encode for CapturingEncoder {
        async fn run(&self, spec: JobSpec, _cancel: Arc<AtomicBool>, status: StatusSender) {
            let destination = spec.destination.clone();
            *self.seen.lock().await = Some(spec);
            let _ = status.send(JobStatus::Completed { destination });
        }
    }

    /// Succeeds after one progress update unless cancelled first.
    struct StubEncoder {
        hold: Duration,
    }

    #[async_trait]
    impl Encode for StubEncoder {
        async fn run(&self, spec: JobSpec, cancel: Arc<AtomicBool>, status: StatusSender) {
            let _ = status.send(JobStatus::Starting);
            let _ = status.send(JobStatus::Running(Progress {
                fraction: 0.5,
                ..Progress::default()
            }));

            let deadline = tokio::time::Instant::now() + self.hold;
            while tokio::time::Instant::now() < deadline {
                if cancel.load(Ordering::Relaxed) {
                    let _ = status.send(JobStatus::Cancelled);
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            let _ = status.send(JobStatus::Completed {
                destination: spec.destination,
            });
        }
    }

    fn fake_request(dir: &Path) -> CompressionRequest {
        let source = dir.join("clip.mp4");
        std::fs::write(&source, b"\x00\x01\x02\x03 fake video bytes").unwrap();
        CompressionRequest::new(source, dir.join("out.mp4"))
    }

    fn compressor(inspector: Arc<dyn MediaInspect>, encoder: Arc<dyn Encode>) -> Compressor {
        Compressor::with_collaborators(CompressorConfig::default(), inspector, encoder)
    }

    fn stub_inspector() -> Arc<dyn MediaInspect> {
        Arc::new(StubInspector {
            info: SourceInfo {
                width: 3840.0,
                height: 2160.0,
                duration_secs: Some(10.0),
            },
        })
    }

    #[tokio::test]
    async fn test_successful_job_delivers_single_succeeded_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let compressor = compressor(
            stub_inspector(),
            Arc::new(StubEncoder {
                hold: Duration::from_millis(10),
            }),
        );

        let (handle, mut events) = compressor.start(fake_request(dir.path())).await.unwrap();

        let mut started = 0;
        let mut finished = Vec::new();
        while let Some(event) = events.recv().await {
            match event {
                CompressionEvent::Started { job_id } => {
                    assert_eq!(job_id, handle.id());
                    started += 1;
                }
                CompressionEvent::Progress { .. } => {}
                CompressionEvent::Finished { outcome, .. } => finished.push(outcome),
            }
        }

        assert_eq!(started, 1);
        assert_eq!(finished.len(), 1);
        assert!(matches!(finished[0], Outcome::Succeeded { .. }));
        assert!(!compressor.is_running().await);
        assert!(compressor.state().await.is_idle());
    }

    #[tokio::test]
    async fn test_cancel_delivers_exactly_one_terminal_with_no_error() {
        let dir = tempfile::tempdir().unwrap();
        let compressor = compressor(
            stub_inspector(),
            Arc::new(StubEncoder {
                hold: Duration::from_secs(30),
            }),
        );

        let (_handle, mut events) = compressor.start(fake_request(dir.path())).await.unwrap();
        compressor.cancel().await;

        let mut terminals = Vec::new();
        while let Some(event) = events.recv().await {
            if let CompressionEvent::Finished { outcome, .. } = event {
                terminals.push(outcome);
            }
        }

        // Exactly one terminal event, it is Cancelled, and it carries no
        // error payload by construction.
        assert_eq!(terminals.len(), 1);
        assert!(matches!(terminals[0], Outcome::Cancelled));
        assert!(compressor.state().await.is_idle());
    }

    #[tokio::test]
    async fn test_handle_cancel_is_equivalent_to_facade_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let compressor = compressor(
            stub_inspector(),
            Arc::new(StubEncoder {
                hold: Duration::from_secs(30),
            }),
        );

        let (handle, mut events) = compressor.start(fake_request(dir.path())).await.unwrap();
        handle.cancel();
        assert!(handle.is_cancelled());

        let outcome = events::next_outcome(&mut events).await.unwrap();
        assert!(matches!(outcome, Outcome::Cancelled));
    }

    #[tokio::test]
    async fn test_second_start_while_running_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let compressor = compressor(
            stub_inspector(),
            Arc::new(StubEncoder {
                hold: Duration::from_secs(30),
            }),
        );

        let (handle, mut events) = compressor.start(fake_request(dir.path())).await.unwrap();
        assert!(compressor.state().await.is_running());
        let err = compressor
            .start(fake_request(dir.path()))
            .await
            .err()
            .unwrap();
        match err {
            CompressionError::AlreadyRunning { job_id } => assert_eq!(job_id, handle.id()),
            other => panic!("expected AlreadyRunning, got {other:?}"),
        }

        compressor.cancel().await;
        let _ = events::next_outcome(&mut events).await;
    }

    #[tokio::test]
    async fn test_unreadable_source_fails_synchronously() {
        let dir = tempfile::tempdir().unwrap();
        let compressor = compressor(
            Arc::new(FailingInspector),
            Arc::new(StubEncoder {
                hold: Duration::from_millis(10),
            }),
        );

        let err = compressor
            .start(fake_request(dir.path()))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CompressionError::SourceUnreadable(_)));
        assert!(!compressor.is_running().await);
    }

    #[tokio::test]
    async fn test_missing_source_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let compressor = compressor(
            stub_inspector(),
            Arc::new(StubEncoder {
                hold: Duration::from_millis(10),
            }),
        );

        let request = CompressionRequest::new(
            dir.path().join("does-not-exist.mp4"),
            dir.path().join("out.mp4"),
        );
        let err = compressor.start(request).await.err().unwrap();
        assert!(matches!(err, CompressionError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_absent_max_duration_leaves_output_uncapped() {
        let dir = tempfile::tempdir().unwrap();
        let seen = Arc::new(Mutex::new(None));
        let compressor = compressor(
            stub_inspector(),
            Arc::new(CapturingEncoder {
                seen: Arc::clone(&seen),
            }),
        );

        // Absent cap under the default config: no cap at all.
        let (_handle, mut events) = compressor.start(fake_request(dir.path())).await.unwrap();
        let _ = events::next_outcome(&mut events).await;
        let spec = seen.lock().await.take().unwrap();
        assert_eq!(spec.max_duration_secs, None);

        // An explicit cap is passed through; an explicit 0 means no cap.
        let mut request = fake_request(dir.path());
        request.max_duration_secs = Some(45);
        let (_handle, mut events) = compressor.start(request).await.unwrap();
        let _ = events::next_outcome(&mut events).await;
        assert_eq!(seen.lock().await.take().unwrap().max_duration_secs, Some(45));

        let mut request = fake_request(dir.path());
        request.max_duration_secs = Some(0);
        let (_handle, mut events) = compressor.start(request).await.unwrap();
        let _ = events::next_outcome(&mut events).await;
        assert_eq!(seen.lock().await.take().unwrap().max_duration_secs, None);
    }

    #[tokio::test]
    async fn test_configured_default_cap_applies_to_absent_duration() {
        let dir = tempfile::tempdir().unwrap();
        let seen = Arc::new(Mutex::new(None));
        let mut config = CompressorConfig::default();
        config.default_max_duration_secs = Some(120);
        let compressor = Compressor::with_collaborators(
            config,
            stub_inspector(),
            Arc::new(CapturingEncoder {
                seen: Arc::clone(&seen),
            }),
        );

        let (_handle, mut events) = compressor.start(fake_request(dir.path())).await.unwrap();
        let _ = events::next_outcome(&mut events).await;
        assert_eq!(seen.lock().await.take().unwrap().max_duration_secs, Some(120));
    }

    #[tokio::test]
    async fn test_facade_accepts_new_job_after_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let compressor = compressor(
            stub_inspector(),
            Arc::new(StubEncoder {
                hold: Duration::from_millis(10),
            }),
        );

        let (_handle, mut events) = compressor.start(fake_request(dir.path())).await.unwrap();
        let outcome = events::next_outcome(&mut events).await.unwrap();
        assert!(matches!(outcome, Outcome::Succeeded { .. }));

        let (_handle, mut events) = compressor.start(fake_request(dir.path())).await.unwrap();
        let outcome = events::next_outcome(&mut events).await.unwrap();
        assert!(matches!(outcome, Outcome::Succeeded { .. }));
    }
}
