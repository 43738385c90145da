use crate::aggregator::EventBatch;
use crate::config::Settings;
use crate::dispatch::SubmissionSink;
use crate::error::DispatchError;
use log::{error, info};

/// Outcome of dispatching one batch
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Keys whose hand-off started, in batch order
    pub dispatched: Vec<String>,
    /// Keys whose hand-off could not start, in batch order
    pub failed: Vec<(String, DispatchError)>,
}

impl DispatchReport {
    /// Whether every event was handed off
    pub fn all_dispatched(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Hands every event of a batch to a submission sink
///
/// Each event is submitted independently: a failure is logged and recorded,
/// and the remaining events are still attempted. Nothing is retried.
pub struct SubmissionDispatcher<S: SubmissionSink> {
    sink: S,
}

impl<S: SubmissionSink> SubmissionDispatcher<S> {
    /// Create a dispatcher around a sink
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    /// Submit every event in batch order
    pub fn dispatch_all(&self, settings: &Settings, batch: &EventBatch) -> DispatchReport {
        let mut report = DispatchReport::default();

        for (key, event) in batch.iter() {
            info!("Calling submission sink for event {}", key);
            match self.sink.submit(settings, key, event) {
                Ok(()) => report.dispatched.push(key.to_string()),
                Err(e) => {
                    error!("Error creating event {}: {}", key, e);
                    report.failed.push((key.to_string(), e));
                }
            }
        }

        info!(
            "Dispatched {} of {} events",
            report.dispatched.len(),
            batch.len()
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::EventAggregator;
    use crate::dispatch::sink::MockSubmissionSink;
    use crate::events::Row;
    use mockall::predicate::{always, eq};
    use mockall::Sequence;

    fn settings() -> Settings {
        Settings {
            misp_url: "https://misp.example.org".to_string(),
            misp_key: "key".to_string(),
            ssl_check: false,
            event_key: "oneevent".to_string(),
            info: "notable event".to_string(),
            tags: None,
            analysis: 0,
            tlp: 2,
            threat_level: 4,
            distribution: 1,
        }
    }

    fn batch_with_keys(settings: &Settings, keys: &[&str]) -> EventBatch {
        let rows = keys.iter().map(|key| {
            Row::from_columns([("type", "md5"), ("value", "abc"), ("eventkey", *key)])
        });
        EventAggregator::aggregate(settings, rows)
    }

    #[test]
    fn test_dispatches_each_event_in_order() {
        let settings = settings();
        let batch = batch_with_keys(&settings, &["A", "B", "C"]);

        let mut sink = MockSubmissionSink::new();
        let mut seq = Sequence::new();
        for key in ["A", "B", "C"] {
            sink.expect_submit()
                .with(always(), eq(key), always())
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_, _, _| Ok(()));
        }

        let report = SubmissionDispatcher::new(sink).dispatch_all(&settings, &batch);

        assert_eq!(report.dispatched, vec!["A", "B", "C"]);
        assert!(report.all_dispatched());
    }

    #[test]
    fn test_failure_does_not_stop_remaining_events() {
        let settings = settings();
        let batch = batch_with_keys(&settings, &["A", "B", "C"]);

        let mut sink = MockSubmissionSink::new();
        sink.expect_submit()
            .times(3)
            .returning(|_, key, _| {
                if key == "B" {
                    Err(DispatchError::SpawnFailed("no interpreter".to_string()))
                } else {
                    Ok(())
                }
            });

        let report = SubmissionDispatcher::new(sink).dispatch_all(&settings, &batch);

        assert_eq!(report.dispatched, vec!["A", "C"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "B");
        assert!(!report.all_dispatched());
    }

    #[test]
    fn test_sink_receives_complete_event() {
        let settings = settings();
        let rows = vec![
            Row::from_columns([("type", "ip-dst"), ("value", "1.2.3.4")]),
            Row::from_columns([("type", "domain"), ("value", "evil.test")]),
        ];
        let batch = EventAggregator::aggregate(&settings, rows);

        let mut sink = MockSubmissionSink::new();
        sink.expect_submit()
            .withf(|settings, key, event| {
                settings.tlp == 2 && key == "oneevent" && event.attributes.len() == 2
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let report = SubmissionDispatcher::new(sink).dispatch_all(&settings, &batch);
        assert_eq!(report.dispatched, vec!["oneevent"]);
    }

    #[test]
    fn test_empty_batch_submits_nothing() {
        let settings = settings();
        let mut sink = MockSubmissionSink::new();
        sink.expect_submit().never();

        let report = SubmissionDispatcher::new(sink).dispatch_all(&settings, &EventBatch::new());

        assert!(report.dispatched.is_empty());
        assert!(report.all_dispatched());
    }
}
