use std::path::PathBuf;
use uuid::Uuid;

/// Lifecycle of the facade's single job slot. A job passes through a terminal
/// variant and settles back to `Idle`; the terminal result reaches callers
/// through the event channel, not by polling this machine.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum JobState {
    #[default]
    Idle,
    Running {
        job_id: Uuid,
    },
    Succeeded {
        job_id: Uuid,
        destination: PathBuf,
    },
    Failed {
        job_id: Uuid,
        error: String,
    },
    Cancelled {
        job_id: Uuid,
    },
}

impl JobState {
    pub fn is_idle(&self) -> bool {
        matches!(self, JobState::Idle)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, JobState::Running { .. })
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded { .. } | JobState::Failed { .. } | JobState::Cancelled { .. }
        )
    }

    pub fn job_id(&self) -> Option<Uuid> {
        match self {
            JobState::Running { job_id }
            | JobState::Succeeded { job_id, .. }
            | JobState::Failed { job_id, .. }
            | JobState::Cancelled { job_id } => Some(*job_id),
            JobState::Idle => None,
        }
    }

    pub fn transition_to_running(job_id: Uuid) -> Self {
        JobState::Running { job_id }
    }

    pub fn transition_to_succeeded(self, destination: PathBuf) -> Self {
        match self {
            JobState::Running { job_id } => JobState::Succeeded {
                job_id,
                destination,
            },
            _ => self,
        }
    }

    pub fn transition_to_failed(self, error: String) -> Self {
        match self {
            JobState::Running { job_id } => JobState::Failed { job_id, error },
            _ => self,
        }
    }

    pub fn transition_to_cancelled(self) -> Self {
        match self {
            JobState::Running { job_id } => JobState::Cancelled { job_id },
            _ => self,
        }
    }

    pub fn reset_to_idle(&mut self) {
        *self = JobState::Idle;
    }
}
