//! Grouping of result rows into events
//!
//! This module provides the EventAggregator, which folds a stream of rows
//! into one event per event key, and the EventBatch it produces. The batch
//! keeps events in the order their keys were first seen.

use crate::config::Settings;
use crate::error::RowError;
use crate::events::{MispEvent, Row};
use log::{info, warn};
use std::collections::HashMap;

/// Events keyed by event key, in first-seen order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventBatch {
    /// Position of each key in `entries`
    index: HashMap<String, usize>,
    entries: Vec<(String, MispEvent)>,
}

impl EventBatch {
    /// Create an empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct events
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no event has been created
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up the event for a key
    pub fn get(&self, key: &str) -> Option<&MispEvent> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    /// Event keys in first-seen order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    /// `(key, event)` pairs in first-seen order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MispEvent)> {
        self.entries.iter().map(|(key, event)| (key.as_str(), event))
    }

    /// Return the event for `key`, creating it with `create` if the key is new
    fn entry_or_insert_with<F>(&mut self, key: &str, create: F) -> &mut MispEvent
    where
        F: FnOnce() -> MispEvent,
    {
        let position = match self.index.get(key) {
            Some(&position) => position,
            None => {
                let position = self.entries.len();
                self.entries.push((key.to_string(), create()));
                self.index.insert(key.to_string(), position);
                position
            }
        };
        &mut self.entries[position].1
    }
}

/// Folds result rows into events
///
/// Rows are consumed one at a time. The first row seen for a key fixes the
/// event's timestamp and description; later rows only append attributes.
pub struct EventAggregator<'a> {
    settings: &'a Settings,
    batch: EventBatch,
    /// Rows turned into attributes
    rows_added: usize,
    /// Rows rejected for lacking `type` or `value`
    rows_skipped: usize,
}

impl<'a> EventAggregator<'a> {
    /// Create an aggregator that resolves defaults against `settings`
    ///
    /// # Examples
    ///
    /// ```
    /// use misp_alert::aggregator::EventAggregator;
    /// use misp_alert::config::{AlertConfig, AppConfig, Settings};
    /// use misp_alert::events::Row;
    ///
    /// let alert = AlertConfig {
    ///     url: Some("https://misp.example.org".to_string()),
    ///     authkey: Some("key".to_string()),
    ///     analysis: Some("0".to_string()),
    ///     threatlevel: Some("4".to_string()),
    ///     distribution: Some("0".to_string()),
    ///     tlp: Some("1".to_string()),
    ///     ..Default::default()
    /// };
    /// let settings = Settings::resolve(&alert, &AppConfig::default()).unwrap();
    ///
    /// let mut aggregator = EventAggregator::new(&settings);
    /// aggregator
    ///     .add_row(&Row::from_columns([("type", "ip-dst"), ("value", "1.2.3.4")]))
    ///     .unwrap();
    /// let batch = aggregator.finish();
    /// assert_eq!(batch.get("oneevent").unwrap().attributes.len(), 1);
    /// ```
    pub fn new(settings: &'a Settings) -> Self {
        Self {
            settings,
            batch: EventBatch::new(),
            rows_added: 0,
            rows_skipped: 0,
        }
    }

    /// Fold one row into the batch
    ///
    /// # Errors
    ///
    /// Returns `RowError::MissingColumn` if the row lacks `type` or `value`.
    /// A rejected row creates no event and leaves the batch unchanged.
    pub fn add_row(&mut self, row: &Row) -> Result<(), RowError> {
        let attribute = match row.to_attribute() {
            Ok(attribute) => attribute,
            Err(e) => {
                self.rows_skipped += 1;
                return Err(e);
            }
        };

        let settings = self.settings;
        let key = row.event_key.as_deref().unwrap_or(&settings.event_key);

        let event = self.batch.entry_or_insert_with(key, || {
            MispEvent::new(
                row.time.clone(),
                row.info.clone().unwrap_or_else(|| settings.info.clone()),
            )
        });
        event.attributes.push(attribute);

        self.rows_added += 1;
        Ok(())
    }

    /// Number of rows turned into attributes so far
    pub fn rows_added(&self) -> usize {
        self.rows_added
    }

    /// Number of rows rejected so far
    pub fn rows_skipped(&self) -> usize {
        self.rows_skipped
    }

    /// Consume the aggregator and return the finished batch
    pub fn finish(self) -> EventBatch {
        info!(
            "Aggregated {} rows into {} events ({} rows skipped)",
            self.rows_added,
            self.batch.len(),
            self.rows_skipped
        );
        self.batch
    }

    /// Fold a whole row stream, skipping rows that cannot become attributes
    pub fn aggregate<I>(settings: &'a Settings, rows: I) -> EventBatch
    where
        I: IntoIterator<Item = Row>,
    {
        let mut aggregator = Self::new(settings);
        for (position, row) in rows.into_iter().enumerate() {
            if let Err(e) = aggregator.add_row(&row) {
                warn!("Skipping result row {}: {}", position + 1, e);
            }
        }
        aggregator.finish()
    }
}
