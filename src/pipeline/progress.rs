use std::sync::mpsc::Sender;
use std::sync::Mutex;

use crate::pipeline::traits::ProgressSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Matching,
    Segmenting,
    Transcoding,
    Inference,
    Alignment,
    Writing,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Matching => "matching",
            Stage::Segmenting => "segmenting",
            Stage::Transcoding => "transcoding",
            Stage::Inference => "inference",
            Stage::Alignment => "alignment",
            Stage::Writing => "writing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemStatus {
    Started,
    Succeeded,
    Skipped,
    Failed(String),
}

/// One structured progress update for a single match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub stage: Stage,
    pub item: String,
    pub status: ItemStatus,
}

impl ProgressEvent {
    pub fn new(stage: Stage, item: impl Into<String>, status: ItemStatus) -> Self {
        Self {
            stage,
            item: item.into(),
            status,
        }
    }
}

/// Forwards events to `tracing`.
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn report(&self, event: &ProgressEvent) {
        match &event.status {
            ItemStatus::Failed(reason) => tracing::warn!(
                stage = event.stage.as_str(),
                item = event.item.as_str(),
                reason = reason.as_str(),
                "item failed"
            ),
            status => tracing::debug!(
                stage = event.stage.as_str(),
                item = event.item.as_str(),
                status = ?status,
                "progress"
            ),
        }
    }
}

/// Keeps every event; used by tests and callers that summarise afterwards.
#[derive(Default)]
pub struct CollectingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl CollectingProgress {
    pub fn events(&self) -> Vec<ProgressEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ProgressSink for CollectingProgress {
    fn report(&self, event: &ProgressEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}

/// Sends events over a channel; a dropped receiver silently stops delivery.
pub struct ChannelProgress {
    sender: Mutex<Sender<ProgressEvent>>,
}

impl ChannelProgress {
    pub fn new(sender: Sender<ProgressEvent>) -> Self {
        Self {
            sender: Mutex::new(sender),
        }
    }
}

impl ProgressSink for ChannelProgress {
    fn report(&self, event: &ProgressEvent) {
        if let Ok(sender) = self.sender.lock() {
            let _ = sender.send(event.clone());
        }
    }
}
