use chrono::{DateTime, Duration, FixedOffset, NaiveDate};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::ops::AddAssign;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, trace, warn};

use crate::error::{ProcessingError, Result};
use crate::models::{WeatherCategory, WeatherRecord};
use crate::readers::{CsvSource, CsvTable};
use crate::store::{ProcessedFileRegistry, WeatherStore};
use crate::utils::constants::*;
use crate::utils::filename::{csv_name, station_name};
use crate::utils::progress::ProgressReporter;

/// Row counts of one fine-scale file.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FineScaleFileStats {
    pub good_records: usize,
    pub gap_records: usize,
    pub duplicates: usize,
    pub errors: usize,
}

impl AddAssign for FineScaleFileStats {
    fn add_assign(&mut self, other: Self) {
        self.good_records += other.good_records;
        self.gap_records += other.gap_records;
        self.duplicates += other.duplicates;
        self.errors += other.errors;
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct FineScaleReport {
    pub files: usize,
    pub totals: FineScaleFileStats,
    /// Records rewritten by the missing-percentage pass.
    pub records_updated: usize,
    /// Records that received a missing percentage above zero.
    pub records_with_missing: usize,
    /// Station days with more samples than a day can hold.
    pub over_counted_days: usize,
    /// Calendar days inserted by the backfill pass.
    pub backfilled_days: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StationDay {
    pub station: String,
    pub date: NaiveDate,
}

/// State shared by the workers of a single fine-scale run.
#[derive(Debug, Default)]
pub struct FineScaleRun {
    seen_timestamps: Mutex<HashSet<String>>,
    records_per_day: Mutex<HashMap<StationDay, u32>>,
}

impl FineScaleRun {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sample. Returns `false` when the same raw timestamp was
    /// already counted for the station during this run.
    fn record_sample(&self, station: &str, raw_timestamp: &str, date: NaiveDate) -> Result<bool> {
        let first_seen = self
            .seen_timestamps
            .lock()
            .map_err(|_| ProcessingError::Store("duplicate timestamp set lock poisoned".to_string()))?
            .insert(format!("{}_{}", station, raw_timestamp));
        if first_seen {
            let mut counts = self
                .records_per_day
                .lock()
                .map_err(|_| ProcessingError::Store("daily record count lock poisoned".to_string()))?;
            *counts
                .entry(StationDay {
                    station: station.to_string(),
                    date,
                })
                .or_insert(0) += 1;
        }
        Ok(first_seen)
    }

    pub fn into_counts(self) -> Result<HashMap<StationDay, u32>> {
        self.records_per_day
            .into_inner()
            .map_err(|_| ProcessingError::Store("daily record count lock poisoned".to_string()))
    }
}

/// Missing percentage for a day with `count` distinct samples, or `None`
/// when the day is complete.
pub fn missing_percent_for(count: u32) -> Option<f64> {
    (count < EXPECTED_RECORDS_PER_DAY).then(|| {
        let expected = EXPECTED_RECORDS_PER_DAY as f64;
        ((expected - count as f64) / expected * 100.0).round()
    })
}

/// Parse a zoned timestamp such as `2025-11-07T00:05:00+02:00`,
/// `2025-11-07T00:05Z` or `2025-11-07T00:05:00+02:00[Africa/Johannesburg]`.
pub fn parse_zoned_timestamp(raw: &str) -> Result<DateTime<FixedOffset>> {
    let trimmed = match raw.find('[') {
        Some(zone) => &raw[..zone],
        None => raw,
    };
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(timestamp);
    }

    let normalised = match trimmed.strip_suffix('Z') {
        Some(stripped) => format!("{}+00:00", stripped),
        None => trimmed.to_string(),
    };
    DateTime::parse_from_str(&normalised, "%Y-%m-%dT%H:%M:%S%.f%:z")
        .or_else(|_| DateTime::parse_from_str(&normalised, "%Y-%m-%dT%H:%M%:z"))
        .map_err(ProcessingError::from)
}

/// Derives per-day sample coverage from raw interval files and fills
/// calendar gaps in every station's history.
pub struct FineScaleFileProcessor {
    store: Arc<dyn WeatherStore>,
    processed: Arc<dyn ProcessedFileRegistry>,
    source: CsvSource,
    max_workers: usize,
}

impl FineScaleFileProcessor {
    pub fn new(store: Arc<dyn WeatherStore>, processed: Arc<dyn ProcessedFileRegistry>) -> Self {
        Self {
            store,
            processed,
            source: CsvSource::new(),
            max_workers: num_cpus::get(),
        }
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn with_source(mut self, source: CsvSource) -> Self {
        self.source = source;
        self
    }

    /// Count samples in `paths`, update missing percentages, then backfill
    /// absent days across all stations.
    pub fn process_files(
        &self,
        paths: &[PathBuf],
        progress: Option<&ProgressReporter>,
    ) -> Result<FineScaleReport> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.max_workers)
            .thread_name(|i| format!("{}{}", FINE_SCALE_THREAD_PREFIX, i))
            .build()?;

        let run = FineScaleRun::new();
        let file_stats: Vec<FineScaleFileStats> = pool.install(|| {
            paths
                .par_iter()
                .map(|path| {
                    let stats = self.process_file(path, &run);
                    if let Some(p) = progress {
                        p.increment(1);
                    }
                    stats
                })
                .collect()
        });

        let mut report = FineScaleReport {
            files: file_stats.len(),
            ..Default::default()
        };
        for stats in file_stats {
            report.totals += stats;
        }

        let counts = run.into_counts()?;
        if !counts.is_empty() {
            self.update_missing_percent(&counts, &mut report)?;
        }
        report.backfilled_days = self.backfill_missing_days()?;

        Ok(report)
    }

    /// Scan one file into `run`. The file is marked processed whatever happens.
    pub fn process_file(&self, path: &Path, run: &FineScaleRun) -> FineScaleFileStats {
        let file_id = csv_name(path);
        let station = station_name(path);
        let mut stats = FineScaleFileStats::default();
        debug!(file = %file_id, "Processing delayed file");

        match self.source.read_text(path) {
            Ok(text) => {
                let table = CsvTable::parse(&text);
                stats.errors += table.malformed_rows;
                let mut previous: Option<DateTime<FixedOffset>> = None;

                for record in &table.records {
                    let sample = table
                        .header
                        .get(record, DATE_COLUMN)
                        .and_then(|raw| parse_zoned_timestamp(raw).map(|timestamp| (raw, timestamp)));
                    let (raw, timestamp) = match sample {
                        Ok(sample) => sample,
                        Err(e) => {
                            debug!(file = %file_id, row = ?record, error = %e, "Unreadable timestamp");
                            stats.errors += 1;
                            continue;
                        }
                    };

                    match run.record_sample(&station, raw, timestamp.date_naive()) {
                        Ok(true) => {
                            if is_gap(previous, timestamp) {
                                trace!(previous = ?previous, current = %timestamp, "Large time gap");
                                stats.gap_records += 1;
                            } else {
                                stats.good_records += 1;
                            }
                        }
                        Ok(false) => {
                            trace!(station = %station, timestamp = raw, "Duplicate");
                            stats.duplicates += 1;
                        }
                        Err(e) => {
                            error!(file = %file_id, error = %e, "Could not count record");
                            stats.errors += 1;
                        }
                    }
                    previous = Some(timestamp);
                }
            }
            Err(e) => {
                error!(file = %file_id, error = %e, "Could not read CSV file");
                stats.errors += 1;
            }
        }

        info!(
            file = %file_id,
            good_records = stats.good_records,
            gap_records = stats.gap_records,
            duplicates = stats.duplicates,
            errors = stats.errors,
            "Processed delayed file"
        );
        if let Err(e) = self.processed.mark(&file_id) {
            error!(file = %file_id, error = %e, "Could not mark file as processed");
        }
        stats
    }

    /// Stamp the missing percentage of every under-sampled day onto all of its records.
    pub fn update_missing_percent(
        &self,
        counts: &HashMap<StationDay, u32>,
        report: &mut FineScaleReport,
    ) -> Result<()> {
        info!(days = counts.len(), "Updating records with the percentage of missing samples per day");

        let mut days: Vec<(&StationDay, &u32)> = counts.iter().collect();
        days.sort();

        for (day, &count) in days {
            if count > EXPECTED_RECORDS_PER_DAY {
                warn!(
                    station = %day.station,
                    date = %day.date,
                    counted = count,
                    expected = EXPECTED_RECORDS_PER_DAY,
                    "More records counted than expected"
                );
                report.over_counted_days += 1;
                continue;
            }
            let Some(missing) = missing_percent_for(count) else {
                continue;
            };

            let result = self.store.find_by_station_and_date(&day.station, day.date).and_then(|records| {
                let updated: Vec<WeatherRecord> = records
                    .into_iter()
                    .map(|record| record.with_missing_percent(missing))
                    .collect();
                let total = updated.len();
                self.store.save_all(updated)?;
                Ok(total)
            });

            match result {
                Ok(total) => {
                    report.records_updated += total;
                    if missing > 0.0 {
                        report.records_with_missing += total;
                    }
                }
                Err(e) => error!(station = %day.station, date = %day.date, error = %e, "Could not update missing percentage"),
            }
        }

        info!(
            updated = report.records_updated,
            with_missing = report.records_with_missing,
            "Missing percentages updated"
        );
        Ok(())
    }

    /// Insert fully-missing placeholder records for every calendar day absent
    /// between a station's first and last record. Returns the number of days added.
    pub fn backfill_missing_days(&self) -> Result<usize> {
        info!("Inserting completely missing days");
        let mut total_days = 0;

        for station in self.store.stations()? {
            let records = self.store.find_by_station(&station)?;
            let mut dates: Vec<NaiveDate> = records.iter().map(|r| r.date).collect();
            dates.dedup();

            let mut new_days = 0;
            for pair in dates.windows(2) {
                let (previous, current) = (pair[0], pair[1]);
                let gap = (current - previous).num_days();
                for offset in 1..gap {
                    let date = previous + Duration::days(offset);
                    for category in WeatherCategory::ALL {
                        if let Err(e) = self
                            .store
                            .insert_if_absent(WeatherRecord::placeholder(station.as_str(), date, category))
                        {
                            error!(station = %station, %date, %category, error = %e, "Could not insert missing day");
                        }
                    }
                    new_days += 1;
                }
            }

            info!(station = %station, missing_days = new_days, "Station backfilled");
            total_days += new_days;
        }

        Ok(total_days)
    }
}

fn is_gap(previous: Option<DateTime<FixedOffset>>, current: DateTime<FixedOffset>) -> bool {
    previous.is_some_and(|previous| previous - current > Duration::minutes(GAP_TOLERANCE_MINUTES))
}
