use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

use crate::error::{ProcessingError, Result};
use crate::models::{RecordKey, WeatherCategory, WeatherRecord};
use crate::store::{RecordFilter, WeatherStore};
use crate::writers::ParquetWriter;

type RecordMap = BTreeMap<RecordKey, WeatherRecord>;

/// Record store held in memory, ordered by station, date and category.
///
/// Optionally backed by a Parquet snapshot that is loaded on open and
/// rewritten on [`flush`](WeatherStore::flush).
#[derive(Debug, Default)]
pub struct InMemoryWeatherStore {
    records: RwLock<RecordMap>,
    snapshot_path: Option<PathBuf>,
}

impl InMemoryWeatherStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a store backed by the snapshot at `path`. A missing file is an empty store.
    pub fn with_snapshot(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut records = RecordMap::new();

        if path.exists() {
            for record in ParquetWriter::new().read_records(&path)? {
                records.insert(record.key(), record);
            }
            info!(path = %path.display(), records = records.len(), "Loaded record snapshot");
        } else {
            debug!(path = %path.display(), "No record snapshot yet, starting empty");
        }

        Ok(Self {
            records: RwLock::new(records),
            snapshot_path: Some(path),
        })
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, RecordMap>> {
        self.records
            .read()
            .map_err(|_| ProcessingError::Store("record store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, RecordMap>> {
        self.records
            .write()
            .map_err(|_| ProcessingError::Store("record store lock poisoned".to_string()))
    }

    fn station_range<'a>(
        records: &'a RecordMap,
        station: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> impl Iterator<Item = &'a WeatherRecord> {
        let start = RecordKey::new(station, from, WeatherCategory::A);
        let end = RecordKey::new(station, to, WeatherCategory::L);
        records.range(start..=end).map(|(_, record)| record)
    }
}

impl WeatherStore for InMemoryWeatherStore {
    fn find_by_date_station_category(
        &self,
        date: NaiveDate,
        station: &str,
        category: WeatherCategory,
    ) -> Result<Option<WeatherRecord>> {
        let key = RecordKey::new(station, date, category);
        Ok(self.read()?.get(&key).cloned())
    }

    fn insert_if_absent(&self, record: WeatherRecord) -> Result<Option<WeatherRecord>> {
        let mut records = self.write()?;
        let key = record.key();
        if let Some(existing) = records.get(&key) {
            return Ok(Some(existing.clone()));
        }
        records.insert(key, record);
        Ok(None)
    }

    fn find_by_station(&self, station: &str) -> Result<Vec<WeatherRecord>> {
        let records = self.read()?;
        Ok(Self::station_range(&records, station, NaiveDate::MIN, NaiveDate::MAX)
            .cloned()
            .collect())
    }

    fn find_by_station_and_date(&self, station: &str, date: NaiveDate) -> Result<Vec<WeatherRecord>> {
        let records = self.read()?;
        Ok(Self::station_range(&records, station, date, date).cloned().collect())
    }

    fn search(&self, filter: &RecordFilter) -> Result<Vec<WeatherRecord>> {
        let mut matches: Vec<WeatherRecord> = self
            .read()?
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();
        matches.sort_by(|a, b| {
            a.date
                .cmp(&b.date)
                .then_with(|| a.station.cmp(&b.station))
                .then_with(|| a.category.cmp(&b.category))
        });
        Ok(matches)
    }

    fn stations(&self) -> Result<Vec<String>> {
        let records = self.read()?;
        let stations: BTreeSet<&str> = records.keys().map(|k| k.station.as_str()).collect();
        Ok(stations.into_iter().map(str::to_string).collect())
    }

    fn date_range(&self, station: &str) -> Result<Option<(NaiveDate, NaiveDate)>> {
        let records = self.read()?;
        let mut dates = Self::station_range(&records, station, NaiveDate::MIN, NaiveDate::MAX).map(|r| r.date);
        Ok(dates.next().map(|first| (first, dates.last().unwrap_or(first))))
    }

    fn save_all(&self, updated: Vec<WeatherRecord>) -> Result<()> {
        let mut records = self.write()?;
        for record in updated {
            records.insert(record.key(), record);
        }
        Ok(())
    }

    fn delete_all(&self) -> Result<()> {
        self.write()?.clear();
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    fn flush(&self) -> Result<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        let records: Vec<WeatherRecord> = self.read()?.values().cloned().collect();
        if records.is_empty() {
            if path.exists() {
                std::fs::remove_file(path)?;
            }
            return Ok(());
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        ParquetWriter::new().write_records(&records, path)?;
        info!(path = %path.display(), records = records.len(), "Saved record snapshot");
        Ok(())
    }
}
