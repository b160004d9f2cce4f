use crate::compressor::CompressionError;
use crate::job::Progress;
use std::path::PathBuf;
use uuid::Uuid;

/// Terminal result of one job, delivered exactly once. Cancellation carries
/// no error value on purpose.
#[derive(Debug)]
pub enum Outcome {
    Succeeded { destination: PathBuf },
    Failed { error: CompressionError },
    Cancelled,
}

#[derive(Debug)]
pub enum CompressionEvent {
    Started {
        job_id: Uuid,
    },
    Progress {
        job_id: Uuid,
        progress: Progress,
    },
    Finished {
        job_id: Uuid,
        outcome: Outcome,
    },
}

pub type EventSender = tokio::sync::mpsc::UnboundedSender<CompressionEvent>;
pub type EventReceiver = tokio::sync::mpsc::UnboundedReceiver<CompressionEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}

/// Drains events until the terminal one. `None` means the sender went away
/// without reporting a result.
pub async fn next_outcome(events: &mut EventReceiver) -> Option<Outcome> {
    while let Some(event) = events.recv().await {
        if let CompressionEvent::Finished { outcome, .. } = event {
            return Some(outcome);
        }
    }
    None
}
