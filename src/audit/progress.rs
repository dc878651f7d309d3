//! Progress reporting and cooperative cancellation
//!
//! The orchestrator only sees the [`ProgressChannel`] trait; the caller (UI or
//! CLI) owns the receiving end and the cancel switch.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation switch, cloned into every check context of a run
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub trait ProgressChannel: Send + Sync {
    /// Called after each section closes; `index` is 1-based
    fn report_progress(&self, section_name: &str, index: usize, total: usize);

    fn is_cancelled(&self) -> bool;
}

/// Progress event payload delivered to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub section_name: String,
    pub index: usize,
    pub total: usize,
}

/// Channel that ignores progress and is never cancelled
pub struct NoopProgress;

impl ProgressChannel for NoopProgress {
    fn report_progress(&self, _section_name: &str, _index: usize, _total: usize) {}

    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Progress channel backed by an unbounded async channel
#[derive(Clone)]
pub struct ChannelProgress {
    tx: async_channel::Sender<ProgressEvent>,
    cancel: CancelFlag,
}

/// Caller side of a [`ChannelProgress`]
pub struct ProgressReceiver {
    pub events: async_channel::Receiver<ProgressEvent>,
    pub cancel: CancelFlag,
}

impl ChannelProgress {
    pub fn new() -> (Self, ProgressReceiver) {
        let (tx, rx) = async_channel::unbounded();
        let cancel = CancelFlag::new();
        (
            Self {
                tx,
                cancel: cancel.clone(),
            },
            ProgressReceiver { events: rx, cancel },
        )
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }
}

impl ProgressChannel for ChannelProgress {
    fn report_progress(&self, section_name: &str, index: usize, total: usize) {
        let event = ProgressEvent {
            section_name: section_name.to_string(),
            index,
            total,
        };
        // A caller that dropped its receiver no longer wants updates
        if self.tx.try_send(event).is_err() {
            tracing::debug!(section = section_name, "progress receiver closed");
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
