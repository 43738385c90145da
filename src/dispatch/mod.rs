/// Per-event hand-off with failure isolation
pub mod dispatcher;
/// Submission sink trait and the process-backed sink
pub mod sink;

pub use dispatcher::{DispatchReport, SubmissionDispatcher};
pub use sink::{utf8_environment, LaunchSpec, ProcessSink, SubmissionSink};
