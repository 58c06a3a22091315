use chrono::NaiveDate;
use crossbeam::queue::SegQueue;
use csv::StringRecord;
use rayon::prelude::*;
use std::collections::HashSet;
use std::ops::AddAssign;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

use crate::error::Result;
use crate::models::{Measurements, WeatherCategory, WeatherRecord};
use crate::readers::{CsvSource, CsvTable, HeaderIndex};
use crate::store::{ProcessedFileRegistry, WeatherStore};
use crate::utils::constants::*;
use crate::utils::filename::{csv_name, station_name};
use crate::utils::progress::ProgressReporter;

/// Row counts of one summary file.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SummaryFileStats {
    pub new_records: usize,
    pub duplicates: usize,
    pub warnings: usize,
    pub errors: usize,
}

impl AddAssign for SummaryFileStats {
    fn add_assign(&mut self, other: Self) {
        self.new_records += other.new_records;
        self.duplicates += other.duplicates;
        self.warnings += other.warnings;
        self.errors += other.errors;
    }
}

/// Outcome of a summary batch.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SummaryBatchReport {
    pub summary_files: usize,
    pub totals: SummaryFileStats,
    /// Fine-scale files, in case-insensitive file-name order.
    pub deferred: Vec<PathBuf>,
}

enum RowOutcome {
    Skipped,
    New,
    Duplicate,
    Inconsistent(Box<WeatherRecord>),
}

/// Ingests pre-aggregated daily CSV files and defers everything else.
pub struct SummaryFileProcessor {
    store: Arc<dyn WeatherStore>,
    processed: Arc<dyn ProcessedFileRegistry>,
    source: CsvSource,
    max_workers: usize,
    known_bad_files: HashSet<String>,
}

impl SummaryFileProcessor {
    pub fn new(store: Arc<dyn WeatherStore>, processed: Arc<dyn ProcessedFileRegistry>) -> Self {
        Self {
            store,
            processed,
            source: CsvSource::new(),
            max_workers: num_cpus::get(),
            known_bad_files: HashSet::new(),
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

    pub fn with_known_bad_files(mut self, files: impl IntoIterator<Item = String>) -> Self {
        self.known_bad_files = files.into_iter().collect();
        self
    }

    /// Process `paths` on a dedicated worker pool and return the fine-scale files to defer.
    pub fn process_files(
        &self,
        paths: &[PathBuf],
        progress: Option<&ProgressReporter>,
    ) -> Result<SummaryBatchReport> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.max_workers)
            .thread_name(|i| format!("{}{}", SUMMARY_THREAD_PREFIX, i))
            .build()?;

        let deferred = SegQueue::new();
        let results: Vec<Result<Option<SummaryFileStats>>> = pool.install(|| {
            paths
                .par_iter()
                .map(|path| {
                    let result = self.process_summary_file(path);
                    if matches!(result, Ok(None)) {
                        deferred.push(path.clone());
                    }
                    if let Some(p) = progress {
                        p.increment(1);
                    }
                    result
                })
                .collect()
        });

        let mut report = SummaryBatchReport::default();
        for result in results {
            match result {
                Ok(Some(stats)) => {
                    report.summary_files += 1;
                    report.totals += stats;
                }
                Ok(None) => {}
                Err(e) => {
                    error!(error = %e, "Summary file worker failed");
                    report.totals.errors += 1;
                }
            }
        }

        let mut deferred: Vec<PathBuf> = std::iter::from_fn(|| deferred.pop()).collect();
        sort_by_file_name(&mut deferred);
        report.deferred = deferred;

        info!(
            files = report.summary_files,
            deferred = report.deferred.len(),
            new_records = report.totals.new_records,
            duplicates = report.totals.duplicates,
            warnings = report.totals.warnings,
            errors = report.totals.errors,
            "Summary files processed"
        );
        Ok(report)
    }

    /// Ingest one file. Returns `None`, leaving the file unmarked, when its
    /// header shows it is not a summary file.
    pub fn process_summary_file(&self, path: &Path) -> Result<Option<SummaryFileStats>> {
        let file_id = csv_name(path);
        let mut stats = SummaryFileStats::default();
        debug!(file = %file_id, "Processing file");

        match self.source.read_text(path) {
            Ok(text) => {
                let header = CsvTable::header_of(&text);
                if header.first() != Some(SUMMARY_MARKER_COLUMN) {
                    debug!(file = %file_id, "Delaying fine scale file until all summary files have been processed");
                    return Ok(None);
                }
                self.ingest_table(path, &file_id, &CsvTable::parse(&text), &mut stats);
            }
            Err(e) => {
                error!(file = %file_id, error = %e, "Could not read CSV file");
                stats.errors += 1;
            }
        }

        info!(
            file = %file_id,
            new_records = stats.new_records,
            duplicates = stats.duplicates,
            warnings = stats.warnings,
            errors = stats.errors,
            "Processed summary file"
        );
        self.processed.mark(&file_id)?;
        Ok(Some(stats))
    }

    fn ingest_table(&self, path: &Path, file_id: &str, table: &CsvTable, stats: &mut SummaryFileStats) {
        let station = station_name(path);
        let missing = if LOW_CONFIDENCE_MARKERS.iter().any(|marker| file_id.contains(marker)) {
            LOW_CONFIDENCE_MISSING_PERCENT
        } else {
            0.0
        };
        let known_bad = self.known_bad_files.contains(file_id);
        let quiet_inconsistencies = file_id.contains(WEATHER_UNDERGROUND_MARKER);

        stats.errors += table.malformed_rows;
        for record in &table.records {
            match self.ingest_row(&table.header, record, &station, missing) {
                Ok(RowOutcome::Skipped) => {}
                Ok(RowOutcome::New) => stats.new_records += 1,
                Ok(RowOutcome::Duplicate) => stats.duplicates += 1,
                Ok(RowOutcome::Inconsistent(existing)) => {
                    if !quiet_inconsistencies {
                        warn!(file = %file_id, stored = ?existing, row = ?record, "Inconsistent duplicate");
                    }
                    stats.warnings += 1;
                }
                Err(e) if e.is_field_parse_error() => {
                    if known_bad {
                        debug!(file = %file_id, row = ?record, error = %e, "Could not process record due to (known) number format error");
                    } else {
                        warn!(file = %file_id, row = ?record, error = %e, "Could not process record due to number format error");
                    }
                    trace!(headers = ?table.header.headers(), "Headers of failing file");
                    stats.warnings += 1;
                }
                Err(e) => {
                    error!(file = %file_id, headers = ?table.header.headers(), row = ?record, error = %e, "Could not process record");
                    stats.errors += 1;
                }
            }
        }
    }

    fn ingest_row(
        &self,
        header: &HeaderIndex,
        record: &StringRecord,
        station: &str,
        missing: f64,
    ) -> Result<RowOutcome> {
        let label = header.get(record, SUMMARY_MARKER_COLUMN)?;
        if label.contains(DATETIME_ROW_MARKER) {
            return Ok(RowOutcome::Skipped);
        }

        let category = WeatherCategory::from_label(label)?;
        let date = NaiveDate::parse_from_str(header.get(record, DATE_COLUMN)?, DATE_FIELD_FORMAT)?;
        let measurements = parse_measurements(header, record)?;

        let incoming = WeatherRecord::observed(station, date, category, measurements.clone(), missing);
        match self.store.insert_if_absent(incoming)? {
            None => Ok(RowOutcome::New),
            Some(existing) if existing.matches_any_field(&measurements) => {
                trace!(station, %date, %category, "Ignore duplicate");
                Ok(RowOutcome::Duplicate)
            }
            Some(existing) => Ok(RowOutcome::Inconsistent(Box::new(existing))),
        }
    }
}

fn number(header: &HeaderIndex, record: &StringRecord, column: &str) -> Result<f64> {
    Ok(header.get(record, column)?.parse::<f64>()?)
}

fn parse_measurements(header: &HeaderIndex, record: &StringRecord) -> Result<Measurements> {
    Ok(Measurements {
        temperature: number(header, record, TEMPERATURE_COLUMN)?,
        wind_speed: number(header, record, WIND_SPEED_COLUMN)?,
        wind_max: number(header, record, WIND_MAX_COLUMN)?,
        wind_direction: header.get(record, WIND_DIRECTION_COLUMN)?.to_string(),
        rain_rate: number(header, record, RAIN_RATE_COLUMN)?,
        rain_daily: number(header, record, RAIN_DAILY_COLUMN)?,
        pressure: number(header, record, PRESSURE_COLUMN)?,
        humidity: number(header, record, HUMIDITY_COLUMN)?,
        uv_index: number(header, record, UV_INDEX_COLUMN)?,
    })
}

/// Sort paths by file name, ignoring case.
pub fn sort_by_file_name(paths: &mut [PathBuf]) {
    paths.sort_by_cached_key(|path| {
        path.file_name()
            .map(|name| name.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    });
}
