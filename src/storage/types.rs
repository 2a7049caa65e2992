//! Core data types for the segment build pipeline
//!
//! This module defines the fundamental types used throughout the storage layer:
//! - `Row`: A single input event (timestamp, dimensions, raw metrics)
//! - `DimValue`: A dimension value (null, single or multi-valued)
//! - `Fact`: An aggregated entry of an index or segment
//! - `TimeRange`: A half-open time interval
//! - `Granularity`: Timestamp truncation used for rollup and query buckets

use crate::aggregation::{AggState, MetricRef, RowView};
use chrono::{Datelike, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Value of one dimension in a row or fact
///
/// Ordering is total: `Null` sorts first, then single values, then
/// multi-value lists, each compared lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DimValue {
    Null,
    Single(String),
    Multi(Vec<String>),
}

impl DimValue {
    /// The individual string values (empty for null)
    pub fn values(&self) -> &[String] {
        match self {
            DimValue::Null => &[],
            DimValue::Single(v) => std::slice::from_ref(v),
            DimValue::Multi(vs) => vs,
        }
    }

    pub fn is_null(&self) -> bool {
        self.values().is_empty()
    }
}

impl From<&str> for DimValue {
    fn from(value: &str) -> Self {
        DimValue::Single(value.to_string())
    }
}

impl From<String> for DimValue {
    fn from(value: String) -> Self {
        DimValue::Single(value)
    }
}

impl From<Vec<String>> for DimValue {
    fn from(mut values: Vec<String>) -> Self {
        match values.len() {
            0 => DimValue::Null,
            1 => DimValue::Single(values.remove(0)),
            _ => DimValue::Multi(values),
        }
    }
}

impl<T: Into<DimValue>> From<Option<T>> for DimValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(DimValue::Null)
    }
}

/// A single input row
///
/// Rows are immutable once generated; the index only reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
    /// Dimension values keyed by dimension name
    #[serde(default)]
    pub dimensions: BTreeMap<String, DimValue>,
    /// Raw metric inputs keyed by metric column name
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
}

impl Row {
    /// Create an empty row at a timestamp
    pub fn new(timestamp: i64) -> Self {
        Self {
            timestamp,
            dimensions: BTreeMap::new(),
            metrics: BTreeMap::new(),
        }
    }

    /// Builder method: set a dimension value
    pub fn dim(mut self, name: impl Into<String>, value: impl Into<DimValue>) -> Self {
        self.dimensions.insert(name.into(), value.into());
        self
    }

    /// Builder method: set a raw metric input
    pub fn metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }
}

impl RowView for Row {
    fn timestamp(&self) -> i64 {
        self.timestamp
    }

    fn dimension(&self, name: &str) -> Option<&DimValue> {
        self.dimensions.get(name)
    }

    fn metric(&self, name: &str) -> Option<MetricRef<'_>> {
        self.metrics.get(name).map(|v| MetricRef::Number(*v))
    }
}

/// An aggregated entry: truncated timestamp, dimension tuple, one state per
/// aggregator, all in schema order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub timestamp: i64,
    pub dims: Vec<DimValue>,
    pub metrics: Vec<AggState>,
}

impl Fact {
    /// Compare the rollup key (timestamp, dimension tuple) of two facts
    pub fn key_cmp(&self, other: &Fact) -> std::cmp::Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.dims.cmp(&other.dims))
    }
}

/// Time range (half-open interval: [start, end))
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start timestamp (inclusive), in milliseconds
    pub start: i64,
    /// End timestamp (exclusive), in milliseconds
    pub end: i64,
}

impl TimeRange {
    /// Create a new time range
    ///
    /// # Panics
    /// Panics if start >= end
    pub fn new(start: i64, end: i64) -> Self {
        assert!(start < end, "TimeRange: start must be less than end");
        Self { start, end }
    }

    /// Create a time range, returning None if invalid
    pub fn try_new(start: i64, end: i64) -> Option<Self> {
        if start < end {
            Some(Self { start, end })
        } else {
            None
        }
    }

    /// The range covering every representable timestamp
    pub fn eternity() -> Self {
        Self {
            start: i64::MIN,
            end: i64::MAX,
        }
    }

    /// Smallest range containing both timestamps (end is made exclusive)
    pub fn covering(min_timestamp: i64, max_timestamp: i64) -> Self {
        Self {
            start: min_timestamp,
            end: max_timestamp.saturating_add(1).max(min_timestamp.saturating_add(1)),
        }
    }

    /// Create a range for a specific day (UTC)
    pub fn day(year: i32, month: u32, day: u32) -> Option<Self> {
        use chrono::NaiveDate;
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        let start = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?);
        let end = start + chrono::Duration::days(1);
        Some(Self {
            start: start.timestamp_millis(),
            end: end.timestamp_millis(),
        })
    }

    /// Check if a timestamp falls within this range
    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start && timestamp < self.end
    }

    /// Check if this range overlaps with another
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && self.end > other.start
    }

    /// Get the duration in milliseconds
    pub fn duration_millis(&self) -> i64 {
        self.end.saturating_sub(self.start)
    }

    /// Get intersection with another range, if any
    pub fn intersection(&self, other: &TimeRange) -> Option<Self> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        Self::try_new(start, end)
    }

    /// Smallest range containing both ranges
    pub fn union(&self, other: &TimeRange) -> Self {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fmt_ts = |ts: i64| match Utc.timestamp_millis_opt(ts) {
            chrono::LocalResult::Single(dt) => dt.to_rfc3339(),
            _ => ts.to_string(),
        };
        write!(f, "{}/{}", fmt_ts(self.start), fmt_ts(self.end))
    }
}

/// Timestamp truncation granularity
///
/// Used both as the rollup granularity of an index and as the bucket size of
/// a timeseries query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// Keep the millisecond timestamp
    #[default]
    None,
    Second,
    Minute,
    Hour,
    Day,
    /// Weeks start on Monday
    Week,
    Month,
    /// A single bucket for all time
    All,
}

impl Granularity {
    /// Truncate a timestamp to the start of its bucket
    ///
    /// `All` truncates everything to `i64::MIN`.
    pub fn truncate(&self, timestamp: i64) -> i64 {
        match self {
            Self::None => return timestamp,
            Self::All => return i64::MIN,
            Self::Second => return timestamp - timestamp.rem_euclid(1000),
            Self::Minute => return timestamp - timestamp.rem_euclid(60 * 1000),
            _ => {}
        }

        let dt = match Utc.timestamp_millis_opt(timestamp) {
            chrono::LocalResult::Single(dt) => dt,
            _ => return timestamp,
        };

        let midnight = |d: chrono::DateTime<Utc>| {
            d.with_hour(0)
                .and_then(|d| d.with_minute(0))
                .and_then(|d| d.with_second(0))
                .and_then(|d| d.with_nanosecond(0))
                .unwrap_or(d)
        };

        let truncated = match self {
            Self::Hour => dt
                .with_minute(0)
                .and_then(|d| d.with_second(0))
                .and_then(|d| d.with_nanosecond(0))
                .unwrap_or(dt),
            Self::Day => midnight(dt),
            Self::Week => {
                let days_since_monday = dt.weekday().num_days_from_monday() as i64;
                midnight(dt - chrono::Duration::days(days_since_monday))
            }
            Self::Month => midnight(dt.with_day(1).unwrap_or(dt)),
            Self::None | Self::All | Self::Second | Self::Minute => dt,
        };

        truncated.timestamp_millis()
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" => Some(Self::None),
            "second" | "s" => Some(Self::Second),
            "minute" | "m" => Some(Self::Minute),
            "hour" | "h" => Some(Self::Hour),
            "day" | "d" => Some(Self::Day),
            "week" | "w" => Some(Self::Week),
            "month" => Some(Self::Month),
            "all" => Some(Self::All),
            _ => None,
        }
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Second => "second",
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::All => "all",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_builder() {
        let row = Row::new(1000)
            .dim("country", "nl")
            .dim("tags", vec!["a".to_string(), "b".to_string()])
            .metric("clicks", 3.0);

        assert_eq!(row.dimension("country"), Some(&DimValue::from("nl")));
        assert_eq!(row.dimension("tags").map(|v| v.values().len()), Some(2));
        assert!(matches!(RowView::metric(&row, "clicks"), Some(MetricRef::Number(v)) if v == 3.0));
        assert!(row.dimension("missing").is_none());
    }

    #[test]
    fn test_dim_value_ordering() {
        let mut values = vec![
            DimValue::from("b"),
            DimValue::Multi(vec!["a".into(), "b".into()]),
            DimValue::Null,
            DimValue::from("a"),
        ];
        values.sort();
        assert_eq!(values[0], DimValue::Null);
        assert_eq!(values[1], DimValue::from("a"));
        assert_eq!(values[2], DimValue::from("b"));
        assert!(DimValue::from(Vec::<String>::new()).is_null());
    }

    #[test]
    fn test_time_range_contains() {
        let range = TimeRange::new(1000, 2000);

        assert!(!range.contains(999));
        assert!(range.contains(1000));
        assert!(range.contains(1999));
        assert!(!range.contains(2000));
    }

    #[test]
    fn test_time_range_union_and_covering() {
        let a = TimeRange::covering(1000, 1999);
        assert_eq!(a, TimeRange::new(1000, 2000));

        let b = TimeRange::new(500, 1500);
        assert_eq!(a.union(&b), TimeRange::new(500, 2000));
        assert_eq!(a.intersection(&b), Some(TimeRange::new(1000, 1500)));
        assert!(TimeRange::new(0, 10).intersection(&TimeRange::new(10, 20)).is_none());
    }

    #[test]
    fn test_granularity_truncate() {
        // 2024-01-03T10:34:56.789Z (a Wednesday)
        let ts = 1_704_278_096_789;

        assert_eq!(Granularity::None.truncate(ts), ts);
        assert_eq!(Granularity::Second.truncate(ts), 1_704_278_096_000);
        assert_eq!(Granularity::Minute.truncate(ts), 1_704_278_040_000);
        assert_eq!(Granularity::Hour.truncate(ts), 1_704_276_000_000);
        assert_eq!(Granularity::Day.truncate(ts), 1_704_240_000_000);
        // Monday 2024-01-01
        assert_eq!(Granularity::Week.truncate(ts), 1_704_067_200_000);
        assert_eq!(Granularity::Month.truncate(ts), 1_704_067_200_000);
        assert_eq!(Granularity::All.truncate(ts), i64::MIN);
    }

    #[test]
    fn test_granularity_negative_timestamps() {
        assert_eq!(Granularity::Second.truncate(-1), -1000);
        assert_eq!(Granularity::Minute.truncate(-60_001), -120_000);
    }

    #[test]
    fn test_granularity_parse() {
        assert_eq!(Granularity::from_str("HOUR"), Some(Granularity::Hour));
        assert_eq!(Granularity::from_str("all"), Some(Granularity::All));
        assert_eq!(Granularity::from_str("fortnight"), None);
        assert_eq!(Granularity::Day.to_string(), "day");
    }
}
