use chrono::{Local, Months, NaiveDate};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::processors::fine_scale_processor::{FineScaleFileProcessor, FineScaleReport};
use crate::processors::summary_processor::{sort_by_file_name, SummaryBatchReport, SummaryFileProcessor};
use crate::readers::CsvSource;
use crate::settings::Settings;
use crate::store::{ProcessedFileRegistry, WeatherStore};
use crate::utils::constants::{CSV_EXTENSION, WEATHER_UNDERGROUND_MARKER};
use crate::utils::filename::{csv_name, month_stamp};
use crate::utils::progress::ProgressReporter;

/// Summary of one completed ingestion run.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestionReport {
    pub files_found: usize,
    pub summary: SummaryBatchReport,
    pub fine_scale: FineScaleReport,
    pub records_in_store: usize,
    pub elapsed: Duration,
}

impl IngestionReport {
    pub fn summary(&self) -> String {
        format!(
            "Ingestion Summary:\n\
            - CSV files found: {}\n\
            - Summary files: {} ({} new, {} duplicates, {} warnings, {} errors)\n\
            - Fine-scale files: {} ({} good, {} gaps, {} duplicates, {} errors)\n\
            - Records given a missing percentage: {}\n\
            - Missing days inserted: {}\n\
            - Records in store: {}\n\
            - Elapsed: {:.2}s",
            self.files_found,
            self.summary.summary_files,
            self.summary.totals.new_records,
            self.summary.totals.duplicates,
            self.summary.totals.warnings,
            self.summary.totals.errors,
            self.fine_scale.files,
            self.fine_scale.totals.good_records,
            self.fine_scale.totals.gap_records,
            self.fine_scale.totals.duplicates,
            self.fine_scale.totals.errors,
            self.fine_scale.records_with_missing,
            self.fine_scale.backfilled_days,
            self.records_in_store,
            self.elapsed.as_secs_f64()
        )
    }
}

/// Clears the running flag when a run ends, however it ends.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Walks the CSV tree and drives the summary and fine-scale phases.
///
/// At most one run is active per orchestrator; a call made while a run is in
/// progress returns immediately without doing anything.
pub struct IngestionOrchestrator {
    csv_root: PathBuf,
    store: Arc<dyn WeatherStore>,
    processed: Arc<dyn ProcessedFileRegistry>,
    running: AtomicBool,
    max_workers: usize,
    source: CsvSource,
    known_bad_files: Vec<String>,
    recent_window_source: String,
    show_progress: bool,
}

impl IngestionOrchestrator {
    pub fn new(
        csv_root: impl Into<PathBuf>,
        store: Arc<dyn WeatherStore>,
        processed: Arc<dyn ProcessedFileRegistry>,
    ) -> Self {
        Self {
            csv_root: csv_root.into(),
            store,
            processed,
            running: AtomicBool::new(false),
            max_workers: num_cpus::get(),
            source: CsvSource::new(),
            known_bad_files: Vec::new(),
            recent_window_source: WEATHER_UNDERGROUND_MARKER.to_string(),
            show_progress: false,
        }
    }

    pub fn from_settings(
        settings: &Settings,
        store: Arc<dyn WeatherStore>,
        processed: Arc<dyn ProcessedFileRegistry>,
    ) -> Self {
        Self::new(&settings.csv_root, store, processed)
            .with_max_workers(settings.max_workers)
            .with_source(CsvSource::with_mmap(settings.use_mmap))
            .with_known_bad_files(settings.known_bad_files.clone())
            .with_recent_window_source(settings.recent_window_source.clone())
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn with_source(mut self, source: CsvSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_known_bad_files(mut self, files: Vec<String>) -> Self {
        self.known_bad_files = files;
        self
    }

    pub fn with_recent_window_source(mut self, source: String) -> Self {
        self.recent_window_source = source;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn csv_root(&self) -> &Path {
        &self.csv_root
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ingest every unprocessed CSV file under the root.
    ///
    /// Returns `Ok(None)` when another run was already in progress.
    pub fn run(&self) -> Result<Option<IngestionReport>> {
        self.trigger(false)
    }

    fn run_phases(&self, started: Instant) -> Result<IngestionReport> {
        let files = self.discover_files()?;
        let progress = ProgressReporter::new(files.len() as u64, "Processing summary files...", !self.show_progress);

        let summary = SummaryFileProcessor::new(self.store.clone(), self.processed.clone())
            .with_max_workers(self.max_workers)
            .with_source(self.source)
            .with_known_bad_files(self.known_bad_files.iter().cloned())
            .process_files(&files, Some(&progress))?;

        progress.set_length(summary.deferred.len() as u64);
        progress.set_message("Processing fine-scale files...");
        let fine_scale = FineScaleFileProcessor::new(self.store.clone(), self.processed.clone())
            .with_max_workers(self.max_workers)
            .with_source(self.source)
            .process_files(&summary.deferred, Some(&progress))?;

        self.store.flush()?;
        let records_in_store = self.store.len()?;
        progress.finish_with_message(&format!("{} records in store", records_in_store));

        Ok(IngestionReport {
            files_found: files.len(),
            summary,
            fine_scale,
            records_in_store,
            elapsed: started.elapsed(),
        })
    }

    /// Unprocessed `.csv` files under the root, sorted by file name ignoring case.
    pub fn discover_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        collect_csv_files(&self.csv_root, &mut files)?;

        let mut pending = Vec::with_capacity(files.len());
        for file in files {
            if !self.processed.contains(&csv_name(&file))? {
                pending.push(file);
            }
        }
        sort_by_file_name(&mut pending);
        Ok(pending)
    }

    /// Delete all records and forget every processed file.
    ///
    /// Returns `false`, leaving everything in place, while a run is in progress.
    pub fn reset_all(&self) -> Result<bool> {
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            warn!("Ingestion in progress, reset ignored");
            return Ok(false);
        };
        self.clear_all()?;
        Ok(true)
    }

    fn clear_all(&self) -> Result<()> {
        info!("Clearing existing weather data");
        self.store.delete_all()?;
        self.processed.clear()?;
        self.store.flush()
    }

    /// Forget the processed files of the recent-window source for the month of
    /// `today` and the month before, so they are read again on the next run.
    pub fn reset_recent_window(&self, today: NaiveDate) -> Result<usize> {
        let current = month_stamp(today);
        let previous = today
            .checked_sub_months(Months::new(1))
            .map(month_stamp)
            .unwrap_or_else(|| current.clone());
        let source = self.recent_window_source.as_str();

        let removed = self.processed.remove_matching(&|file_id| {
            file_id.contains(source) && (file_id.contains(&current) || file_id.contains(&previous))
        })?;
        info!(source, current = %current, previous = %previous, removed, "Cleared latest two months of processed files");
        Ok(removed)
    }

    /// Administrative trigger. A full reload resets everything first. Both the
    /// reset and the run happen under the same run guard, so a call made while
    /// a run is in progress does nothing.
    pub fn trigger(&self, full_reload: bool) -> Result<Option<IngestionReport>> {
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            warn!("Already busy processing CSV files, the new request will be ignored");
            return Ok(None);
        };

        let started = Instant::now();
        if full_reload {
            self.clear_all()?;
        }
        info!(root = %self.csv_root.display(), "Looking for CSV files");
        let result = self.run_phases(started);
        match &result {
            Ok(report) => info!(
                root = %self.csv_root.display(),
                files = report.files_found,
                records = report.records_in_store,
                elapsed_secs = report.elapsed.as_secs_f64(),
                "Processed all CSV files"
            ),
            Err(e) => error!(root = %self.csv_root.display(), error = %e, "Ingestion run aborted"),
        }
        result.map(Some)
    }

    /// Start a run on the tokio blocking pool.
    pub fn spawn_run(self: &Arc<Self>) -> JoinHandle<Result<Option<IngestionReport>>> {
        let orchestrator = Arc::clone(self);
        tokio::task::spawn_blocking(move || orchestrator.run())
    }

    /// Run now, then every `interval` until `shutdown` completes. Scheduled
    /// runs re-read the recent window first.
    pub async fn watch(self: Arc<Self>, interval: Duration, shutdown: impl Future<Output = ()>) -> Result<()> {
        tokio::pin!(shutdown);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        log_run_outcome(self.spawn_run().await?);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.reset_recent_window(Local::now().date_naive()) {
                        error!(error = %e, "Could not reset the recent window");
                    }
                    log_run_outcome(self.spawn_run().await?);
                }
                _ = &mut shutdown => {
                    info!("Stopping scheduled ingestion");
                    return Ok(());
                }
            }
        }
    }
}

fn log_run_outcome(outcome: Result<Option<IngestionReport>>) {
    match outcome {
        Ok(Some(report)) => info!("{}", report.summary()),
        Ok(None) => {}
        Err(e) => error!(error = %e, "Scheduled ingestion failed"),
    }
}

fn collect_csv_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            if let Err(e) = collect_csv_files(&path, files) {
                warn!(dir = %path.display(), error = %e, "Skipping unreadable directory");
            }
        } else if path.is_file() && is_csv(&path) {
            files.push(path);
        }
    }
    Ok(())
}

fn is_csv(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().to_lowercase().ends_with(CSV_EXTENSION))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{WeatherCategory, WeatherRecord};
    use crate::store::{InMemoryProcessedFiles, InMemoryWeatherStore};
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn orchestrator(root: &Path) -> (Arc<InMemoryProcessedFiles>, IngestionOrchestrator) {
        let store = Arc::new(InMemoryWeatherStore::new());
        let processed = Arc::new(InMemoryProcessedFiles::new());
        let orchestrator = IngestionOrchestrator::new(root, store, processed.clone()).with_max_workers(2);
        (processed, orchestrator)
    }

    #[test]
    fn test_discover_files_filters_and_sorts() -> Result<()> {
        let dir = TempDir::new()?;
        let andante = dir.path().join("Andante");
        let corgi = dir.path().join("Corgi Corner").join("archive");
        fs::create_dir_all(&andante)?;
        fs::create_dir_all(&corgi)?;
        fs::write(andante.join("b.CSV"), "")?;
        fs::write(andante.join("notes.txt"), "")?;
        fs::write(corgi.join("A.csv"), "")?;
        fs::write(andante.join("c.csv"), "")?;

        let (processed, orchestrator) = orchestrator(dir.path());
        processed.mark("Andante -> c.csv")?;

        let names: Vec<String> = orchestrator
            .discover_files()?
            .iter()
            .map(|p| csv_name(p))
            .collect();
        assert_eq!(names, vec!["archive -> A.csv".to_string(), "Andante -> b.CSV".to_string()]);
        Ok(())
    }

    #[test]
    fn test_run_is_single_flight() -> Result<()> {
        let dir = TempDir::new()?;
        let (_, orchestrator) = orchestrator(dir.path());

        let guard = RunGuard::acquire(&orchestrator.running);
        assert!(guard.is_some());
        assert!(orchestrator.is_running());
        assert_eq!(orchestrator.run()?, None);
        assert!(orchestrator.is_running());

        drop(guard);
        assert!(!orchestrator.is_running());
        assert!(orchestrator.run()?.is_some());
        Ok(())
    }

    #[test]
    fn test_full_reload_leaves_an_active_run_alone() -> Result<()> {
        let dir = TempDir::new()?;
        let store = Arc::new(InMemoryWeatherStore::new());
        let processed = Arc::new(InMemoryProcessedFiles::new());
        let orchestrator = IngestionOrchestrator::new(dir.path(), store.clone(), processed.clone());
        let day = NaiveDate::from_ymd_opt(2025, 11, 7).unwrap();
        store.insert_if_absent(WeatherRecord::placeholder("Andante", day, WeatherCategory::A))?;
        processed.mark("Andante -> summary.csv")?;

        let guard = RunGuard::acquire(&orchestrator.running);
        assert!(guard.is_some());

        assert_eq!(orchestrator.trigger(true)?, None);
        assert!(!orchestrator.reset_all()?);
        assert_eq!(store.len()?, 1);
        assert_eq!(processed.len()?, 1);

        drop(guard);
        assert!(orchestrator.reset_all()?);
        assert_eq!(store.len()?, 0);
        assert_eq!(processed.len()?, 0);
        Ok(())
    }

    #[test]
    fn test_failed_run_releases_the_guard() {
        let (_, orchestrator) = orchestrator(Path::new("/no/such/csv/root"));

        assert!(orchestrator.run().is_err());
        assert!(!orchestrator.is_running());
    }

    #[test]
    fn test_reset_recent_window() -> Result<()> {
        let dir = TempDir::new()?;
        let (processed, orchestrator) = orchestrator(dir.path());
        for file_id in [
            "Andante -> api-weather-underground-high-lows-details-20260101-20260131.csv",
            "Andante -> api-weather-underground-high-lows-details-20251201-20251231.csv",
            "Andante -> api-weather-underground-high-lows-details-20251101-20251130.csv",
            "Andante -> ambient-weather-high-lows-details-20260101-20260131.csv",
        ] {
            processed.mark(file_id)?;
        }

        let today = NaiveDate::from_ymd_opt(2026, 1, 16).unwrap();
        assert_eq!(orchestrator.reset_recent_window(today)?, 2);

        assert_eq!(processed.len()?, 2);
        assert!(processed.contains("Andante -> api-weather-underground-high-lows-details-20251101-20251130.csv")?);
        assert!(processed.contains("Andante -> ambient-weather-high-lows-details-20260101-20260131.csv")?);
        Ok(())
    }

    #[tokio::test]
    async fn test_spawn_run_completes() -> Result<()> {
        let dir = TempDir::new()?;
        let (_, orchestrator) = orchestrator(dir.path());
        let orchestrator = Arc::new(orchestrator);

        let report = orchestrator.spawn_run().await??;

        assert_eq!(report.map(|r| r.files_found), Some(0));
        assert!(!orchestrator.is_running());
        Ok(())
    }
}
