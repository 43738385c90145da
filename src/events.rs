//! Core data types for alert results and the events built from them
//!
//! A [`Row`] is one flat record from the alert results, an [`Attribute`] is
//! the observable derived from it, and a [`MispEvent`] groups the attributes
//! that share an event key.

use crate::error::RowError;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Column prefix the search platform uses for internal multivalue fields
pub const MULTIVALUE_PREFIX: &str = "__mv_";

/// `toids` value used when a row does not carry one
pub const DEFAULT_TOIDS: &str = "False";

/// `category` value used when a row does not carry one
pub const DEFAULT_CATEGORY: &str = "None";

/// One result row describing a single observable
///
/// Every optional column is an `Option`; absence is resolved against
/// defaults by the aggregator rather than by map lookups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    /// `eventkey` column: routes the row to a specific event.
    /// Defaults to the batch's default event key.
    pub event_key: Option<String>,
    /// `info` column: event description, only used by the row that creates the event.
    /// Defaults to the batch's default info text.
    pub info: Option<String>,
    /// `toids` column: "send to IDS" flag as text. Defaults to `"False"`.
    pub toids: Option<String>,
    /// `category` column: attribute classification. Defaults to `"None"`.
    pub category: Option<String>,
    /// `type` column: attribute kind (required)
    pub attr_type: Option<String>,
    /// `value` column: attribute content (required)
    pub value: Option<String>,
    /// `_time` column: timestamp of the result
    pub time: Option<String>,
}

impl Row {
    /// Build a row from `(column, value)` pairs
    ///
    /// Multivalue columns (prefixed with `__mv_`) are dropped, as are
    /// columns that carry no meaning for an attribute. An empty cell is how
    /// the results file encodes a missing field, so it counts as absent:
    /// `toids=""` resolves to `"False"` rather than keeping the empty text.
    ///
    /// # Examples
    ///
    /// ```
    /// use misp_alert::events::Row;
    ///
    /// let row = Row::from_columns([("type", "ip-dst"), ("value", "1.2.3.4"), ("__mv_value", "")]);
    /// assert_eq!(row.attr_type.as_deref(), Some("ip-dst"));
    /// assert_eq!(row.value.as_deref(), Some("1.2.3.4"));
    /// ```
    pub fn from_columns<I, K, V>(columns: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut row = Row::default();

        for (column, value) in columns {
            let column = column.as_ref();
            if column.starts_with(MULTIVALUE_PREFIX) {
                continue;
            }

            let value: String = value.into();
            if value.is_empty() {
                continue;
            }

            let slot = match column {
                "eventkey" => &mut row.event_key,
                "info" => &mut row.info,
                "toids" => &mut row.toids,
                "category" => &mut row.category,
                "type" => &mut row.attr_type,
                "value" => &mut row.value,
                "_time" => &mut row.time,
                _ => continue,
            };
            *slot = Some(value);
        }

        row
    }

    /// Derive the attribute this row describes
    ///
    /// # Errors
    ///
    /// Returns `RowError::MissingColumn` if the row lacks `type` or `value`.
    pub fn to_attribute(&self) -> Result<Attribute, RowError> {
        let attr_type = self
            .attr_type
            .clone()
            .ok_or(RowError::MissingColumn("type"))?;
        let value = self.value.clone().ok_or(RowError::MissingColumn("value"))?;

        Ok(Attribute {
            attr_type,
            value,
            toids: self
                .toids
                .clone()
                .unwrap_or_else(|| DEFAULT_TOIDS.to_string()),
            category: self
                .category
                .clone()
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
        })
    }
}

/// A single observable attached to an event
///
/// Serializes as `{"<type>": "<value>", "toids": ..., "category": ...}`,
/// the shape the submission script expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute kind (e.g. `ip-dst`, `md5`)
    pub attr_type: String,
    /// Attribute content
    pub value: String,
    /// "Send to IDS" flag as text
    pub toids: String,
    /// Attribute classification
    pub category: String,
}

impl Serialize for Attribute {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry(&self.attr_type, &self.value)?;
        map.serialize_entry("toids", &self.toids)?;
        map.serialize_entry("category", &self.category)?;
        map.end()
    }
}

/// An event grouping every attribute that shares one event key
///
/// `timestamp` and `info` are fixed by the row that created the event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MispEvent {
    /// `_time` of the first row seen for this key
    pub timestamp: Option<String>,
    /// Event description
    pub info: String,
    /// Attributes in the order their rows were consumed
    #[serde(rename = "attribute")]
    pub attributes: Vec<Attribute>,
}

impl MispEvent {
    /// Create an empty event from the row that first carries its key
    pub fn new(timestamp: Option<String>, info: String) -> Self {
        Self {
            timestamp,
            info,
            attributes: Vec::new(),
        }
    }
}
