/// Row-to-event grouping
pub mod event_aggregator;

pub use event_aggregator::{EventAggregator, EventBatch};
