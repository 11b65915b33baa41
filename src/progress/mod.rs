// ABOUTME: Transfer progress tracking: descriptor accumulation, status merge, reporting.
// ABOUTME: The reporter polls a status source and renders rows through a sink.

mod jobs;
pub mod render;
mod reporter;
mod sink;
mod status;
mod tracker;

pub use jobs::DescriptorSet;
pub use reporter::{DEFAULT_TICK_INTERVAL, ProgressReporter};
pub use sink::{EventLevel, NullSink, ProgressSink};
pub use status::{Direction, Lookup, MergeInput, StatusMerger, StatusRow, TransferState};
pub use tracker::PushTracker;
