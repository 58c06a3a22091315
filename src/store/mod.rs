//! Record store abstraction shared by ingestion and aggregation.

pub mod memory;
pub mod processed;

use chrono::{Datelike, NaiveDate};

use crate::error::Result;
use crate::models::{WeatherCategory, WeatherRecord};

pub use memory::InMemoryWeatherStore;
pub use processed::{InMemoryProcessedFiles, ProcessedFileRegistry};

/// Filter applied at the storage boundary by [`WeatherStore::search`].
///
/// Every bound is optional and inclusive. The month range is matched against
/// the month of year independently of the date range, so `start_month = 12`,
/// `end_month = 2` selects winters across all years.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    pub stations: Option<Vec<String>>,
    pub category: Option<WeatherCategory>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub start_month: Option<u32>,
    pub end_month: Option<u32>,
}

impl RecordFilter {
    pub fn matches(&self, record: &WeatherRecord) -> bool {
        if let Some(stations) = &self.stations {
            if !stations.iter().any(|s| s == &record.station) {
                return false;
            }
        }
        if self.category.is_some_and(|c| c != record.category) {
            return false;
        }
        if self.start_date.is_some_and(|d| record.date < d) {
            return false;
        }
        if self.end_date.is_some_and(|d| record.date > d) {
            return false;
        }
        self.matches_month(record.date.month())
    }

    fn matches_month(&self, month: u32) -> bool {
        match (self.start_month, self.end_month) {
            (None, None) => true,
            (Some(start), None) => month >= start,
            (None, Some(end)) => month <= end,
            (Some(start), Some(end)) if start <= end => (start..=end).contains(&month),
            // Wraps over the year end
            (Some(start), Some(end)) => month >= start || month <= end,
        }
    }
}

/// Persistence capabilities required by the ingestion pipeline and the
/// aggregation engine.
///
/// Implementations must make [`insert_if_absent`](WeatherStore::insert_if_absent)
/// atomic: concurrent workers rely on it instead of locking around a
/// lookup followed by an insert.
pub trait WeatherStore: Send + Sync {
    fn find_by_date_station_category(
        &self,
        date: NaiveDate,
        station: &str,
        category: WeatherCategory,
    ) -> Result<Option<WeatherRecord>>;

    /// Insert `record` unless its key is taken. Returns the stored record when
    /// one already existed, in which case nothing is written.
    fn insert_if_absent(&self, record: WeatherRecord) -> Result<Option<WeatherRecord>>;

    /// All records of a station ordered by date, then category.
    fn find_by_station(&self, station: &str) -> Result<Vec<WeatherRecord>>;

    fn find_by_station_and_date(&self, station: &str, date: NaiveDate) -> Result<Vec<WeatherRecord>>;

    /// Records matching `filter`, ordered by date, station and category.
    fn search(&self, filter: &RecordFilter) -> Result<Vec<WeatherRecord>>;

    /// Distinct station names in ascending order.
    fn stations(&self) -> Result<Vec<String>>;

    /// First and last recorded date of a station.
    fn date_range(&self, station: &str) -> Result<Option<(NaiveDate, NaiveDate)>>;

    /// Insert or replace every record by key.
    fn save_all(&self, records: Vec<WeatherRecord>) -> Result<()>;

    fn delete_all(&self) -> Result<()>;

    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Persist buffered state. Stores without durable backing do nothing.
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}
