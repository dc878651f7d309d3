//! Audit execution: the run orchestrator and its progress/cancellation channel

pub mod orchestrator;
pub mod progress;

pub use orchestrator::{Orchestrator, RunOutcome, RunRequest, DEFAULT_SECTION_TIMEOUT};
pub use progress::{CancelFlag, ChannelProgress, NoopProgress, ProgressChannel, ProgressEvent, ProgressReceiver};
