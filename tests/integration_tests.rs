use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use wildweather_ingest::analyzers::{AggregateMode, AggregationEngine, Grouping, WeatherQuery};
use wildweather_ingest::models::{WeatherCategory, WeatherField, WeatherRecord};
use wildweather_ingest::processors::IngestionOrchestrator;
use wildweather_ingest::store::{
    InMemoryProcessedFiles, InMemoryWeatherStore, ProcessedFileRegistry, RecordFilter, WeatherStore,
};
use wildweather_ingest::writers::{DailySummary, SummaryCsvWriter, SummaryValues};
use wildweather_ingest::{Result, Settings};

const SUMMARY_HEADER: &str = ",Date,Outdoor Temperature (°C),Wind Speed (km/hr),Max Daily Gust (km/hr),Wind Direction (°),Rain Rate (mm/hr),Daily Rain (mm),Relative Pressure (hPa),Humidity (%),Ultra-Violet Radiation Index";

fn write_file(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    fs::write(&path, lines.join("\n")).unwrap();
    path
}

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 11, d).unwrap()
}

/// One summary file with an Average and a High row, and one fine-scale file
/// with three samples of which one repeats.
fn seed_station(root: &Path) {
    let station = root.join("stationA");
    write_file(
        &station,
        "summary.csv",
        &[
            SUMMARY_HEADER,
            "Average,2025-11-07,12.34,5.06,8,NE,0,1.2,1013.25,55,0",
            "High,2025-11-07,18.0,9,14,,0.4,1.2,1016.0,70,3",
        ],
    );
    write_file(
        &station,
        "full.csv",
        &[
            "Date,Simple Date,Outdoor Temperature (°C)",
            "2025-11-07T00:10:00+02:00,2025-11-07 00:10,12.1",
            "2025-11-07T00:05:00+02:00,2025-11-07 00:05,12.0",
            "2025-11-07T00:05:00+02:00,2025-11-07 00:05,12.0",
        ],
    );
}

fn new_orchestrator(
    root: &Path,
    store: Arc<dyn WeatherStore>,
    processed: Arc<dyn ProcessedFileRegistry>,
) -> IngestionOrchestrator {
    IngestionOrchestrator::new(root, store, processed).with_max_workers(2)
}

#[test]
fn test_end_to_end_ingestion_and_query() -> Result<()> {
    let dir = TempDir::new()?;
    seed_station(dir.path());
    let store = Arc::new(InMemoryWeatherStore::new());
    let processed = Arc::new(InMemoryProcessedFiles::new());
    let orchestrator = new_orchestrator(dir.path(), store.clone(), processed.clone());

    let report = orchestrator.run()?.expect("run was not already in progress");

    assert_eq!(report.files_found, 2);
    assert_eq!(report.summary.summary_files, 1);
    assert_eq!(report.summary.totals.new_records, 2);
    assert_eq!(report.fine_scale.files, 1);
    assert_eq!(report.fine_scale.totals.duplicates, 1);
    assert_eq!(report.fine_scale.records_updated, 2);
    assert_eq!(report.fine_scale.backfilled_days, 0);
    assert_eq!(store.len()?, 2);
    assert!(processed.contains("stationA -> full.csv")?);
    assert!(processed.contains("stationA -> summary.csv")?);

    // Two distinct samples out of 288
    for record in store.find_by_station_and_date("stationA", date(7))? {
        assert_eq!(record.missing_percent, 99.0);
    }

    let engine = AggregationEngine::new(store);
    let data = engine.query(&WeatherQuery {
        filter: RecordFilter {
            start_date: Some(date(7)),
            end_date: Some(date(7)),
            ..Default::default()
        },
        grouping: Grouping::Daily,
        aggregate: AggregateMode::Average,
        fields: None,
    })?;

    let value = |field, category| data.value("stationA", 2025, "2025-11-07", field, category);
    assert_eq!(value(WeatherField::Temperature, WeatherCategory::A), Some(Some(12.3)));
    assert_eq!(value(WeatherField::WindSpeed, WeatherCategory::A), Some(Some(5.1)));
    assert_eq!(value(WeatherField::Pressure, WeatherCategory::A), Some(Some(1013.3)));
    assert_eq!(value(WeatherField::WindDirection, WeatherCategory::A), Some(Some(45.0)));
    assert_eq!(value(WeatherField::Temperature, WeatherCategory::H), Some(Some(18.0)));
    assert_eq!(value(WeatherField::Missing, WeatherCategory::H), Some(Some(99.0)));
    assert_eq!(value(WeatherField::Temperature, WeatherCategory::L), None);
    Ok(())
}

#[test]
fn test_second_run_is_a_no_op() -> Result<()> {
    let dir = TempDir::new()?;
    seed_station(dir.path());
    let store = Arc::new(InMemoryWeatherStore::new());
    let processed = Arc::new(InMemoryProcessedFiles::new());
    let orchestrator = new_orchestrator(dir.path(), store.clone(), processed.clone());

    orchestrator.run()?;
    let records_before = store.find_by_station("stationA")?;
    let processed_before = processed.len()?;

    let report = orchestrator.run()?.expect("run was not already in progress");

    assert_eq!(report.files_found, 0);
    assert_eq!(store.find_by_station("stationA")?, records_before);
    assert_eq!(processed.len()?, processed_before);
    Ok(())
}

#[test]
fn test_full_reload_reprocesses_everything() -> Result<()> {
    let dir = TempDir::new()?;
    seed_station(dir.path());
    let store = Arc::new(InMemoryWeatherStore::new());
    let processed = Arc::new(InMemoryProcessedFiles::new());
    let orchestrator = new_orchestrator(dir.path(), store.clone(), processed.clone());
    orchestrator.run()?;

    let report = orchestrator.trigger(true)?.expect("run was not already in progress");

    assert_eq!(report.files_found, 2);
    assert_eq!(report.summary.totals.new_records, 2);
    assert_eq!(store.len()?, 2);
    Ok(())
}

#[test]
fn test_backfill_fills_calendar_gaps_per_category() -> Result<()> {
    let dir = TempDir::new()?;
    write_file(
        &dir.path().join("Andante"),
        "ambient-weather-high-lows-details-20251101-20251104.csv",
        &[
            SUMMARY_HEADER,
            "Average,2025-11-01,12,5,8,NE,0,1.2,1013.2,55,0",
            "Average,2025-11-04,13,5,8,NE,0,1.2,1013.2,55,0",
        ],
    );
    let store = Arc::new(InMemoryWeatherStore::new());
    let orchestrator = new_orchestrator(dir.path(), store.clone(), Arc::new(InMemoryProcessedFiles::new()));

    let report = orchestrator.run()?.expect("run was not already in progress");

    assert_eq!(report.fine_scale.backfilled_days, 2);
    assert_eq!(store.len()?, 2 + 2 * 3);
    let placeholders: Vec<WeatherRecord> = store
        .find_by_station("Andante")?
        .into_iter()
        .filter(WeatherRecord::is_fully_missing)
        .collect();
    assert_eq!(placeholders.len(), 6);
    assert!(placeholders.iter().all(|r| r.date == date(2) || r.date == date(3)));
    Ok(())
}

#[test]
fn test_fetched_summary_files_are_ingested() -> Result<()> {
    let dir = TempDir::new()?;
    let values = SummaryValues {
        temperature: 21.5,
        wind_speed: 7.0,
        wind_max: 30.0,
        wind_direction: 200.0,
        rain_rate: 0.0,
        rain_daily: 3.2,
        pressure: 1008.0,
        humidity: 77.0,
        uv_index: 6.0,
    };
    let station_dir = dir.path().join("Corgi Corner");
    fs::create_dir_all(&station_dir)?;
    SummaryCsvWriter::new("api-weather-underground").write(
        &station_dir,
        &[DailySummary {
            date: date(7),
            average: values,
            high: values,
            low: values,
        }],
    )?;
    let store = Arc::new(InMemoryWeatherStore::new());
    let orchestrator = new_orchestrator(dir.path(), store.clone(), Arc::new(InMemoryProcessedFiles::new()));

    orchestrator.run()?;

    let average = store
        .find_by_date_station_category(date(7), "Corgi Corner", WeatherCategory::A)?
        .expect("average row ingested");
    assert_eq!(average.wind_direction, "SSW");
    assert_eq!(average.missing_percent, 99.99);
    assert_eq!(store.find_by_station_and_date("Corgi Corner", date(7))?.len(), 3);
    Ok(())
}

#[test]
fn test_snapshot_is_shared_between_instances() -> Result<()> {
    let dir = TempDir::new()?;
    let csv_root = dir.path().join("csv");
    seed_station(&csv_root);
    let snapshot = dir.path().join("output").join("weather.parquet");

    let first_store = Arc::new(InMemoryWeatherStore::with_snapshot(&snapshot)?);
    new_orchestrator(&csv_root, first_store.clone(), Arc::new(InMemoryProcessedFiles::new())).run()?;
    assert!(snapshot.exists());

    let second_store = Arc::new(InMemoryWeatherStore::with_snapshot(&snapshot)?);
    assert_eq!(second_store.find_by_station("stationA")?, first_store.find_by_station("stationA")?);

    // A fresh registry re-reads the files but only finds duplicates
    let report = new_orchestrator(&csv_root, second_store.clone(), Arc::new(InMemoryProcessedFiles::new()))
        .run()?
        .expect("run was not already in progress");
    assert_eq!(report.summary.totals.new_records, 0);
    assert_eq!(report.summary.totals.duplicates, 2);
    assert_eq!(second_store.len()?, 2);
    Ok(())
}

#[test]
fn test_orchestrator_from_settings_file() -> Result<()> {
    let dir = TempDir::new()?;
    seed_station(&dir.path().join("csv"));
    let settings_path = dir.path().join("wildweather.toml");
    fs::write(
        &settings_path,
        format!(
            "csv_root = \"{}\"\nmax_workers = 2\nuse_mmap = true\n",
            dir.path().join("csv").display().to_string().replace('\\', "/")
        ),
    )?;

    let settings = Settings::load(Some(&settings_path))?;
    let store = Arc::new(InMemoryWeatherStore::new());
    let orchestrator =
        IngestionOrchestrator::from_settings(&settings, store.clone(), Arc::new(InMemoryProcessedFiles::new()));

    orchestrator.run()?;
    assert_eq!(store.len()?, 2);
    Ok(())
}

/// Store whose first insert waits until the test lets it continue.
struct GatedStore {
    inner: InMemoryWeatherStore,
    entered: Mutex<Option<Sender<()>>>,
    release: Mutex<Receiver<()>>,
}

impl WeatherStore for GatedStore {
    fn find_by_date_station_category(
        &self,
        date: NaiveDate,
        station: &str,
        category: WeatherCategory,
    ) -> Result<Option<WeatherRecord>> {
        self.inner.find_by_date_station_category(date, station, category)
    }

    fn insert_if_absent(&self, record: WeatherRecord) -> Result<Option<WeatherRecord>> {
        let entered = self.entered.lock().unwrap().take();
        if let Some(entered) = entered {
            entered.send(()).unwrap();
            self.release.lock().unwrap().recv().unwrap();
        }
        self.inner.insert_if_absent(record)
    }

    fn find_by_station(&self, station: &str) -> Result<Vec<WeatherRecord>> {
        self.inner.find_by_station(station)
    }

    fn find_by_station_and_date(&self, station: &str, date: NaiveDate) -> Result<Vec<WeatherRecord>> {
        self.inner.find_by_station_and_date(station, date)
    }

    fn search(&self, filter: &RecordFilter) -> Result<Vec<WeatherRecord>> {
        self.inner.search(filter)
    }

    fn stations(&self) -> Result<Vec<String>> {
        self.inner.stations()
    }

    fn date_range(&self, station: &str) -> Result<Option<(NaiveDate, NaiveDate)>> {
        self.inner.date_range(station)
    }

    fn save_all(&self, records: Vec<WeatherRecord>) -> Result<()> {
        self.inner.save_all(records)
    }

    fn delete_all(&self) -> Result<()> {
        self.inner.delete_all()
    }

    fn len(&self) -> Result<usize> {
        self.inner.len()
    }
}

#[test]
fn test_concurrent_trigger_is_ignored() -> Result<()> {
    let dir = TempDir::new()?;
    seed_station(dir.path());
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let store = Arc::new(GatedStore {
        inner: InMemoryWeatherStore::new(),
        entered: Mutex::new(Some(entered_tx)),
        release: Mutex::new(release_rx),
    });
    let orchestrator = Arc::new(new_orchestrator(
        dir.path(),
        store.clone(),
        Arc::new(InMemoryProcessedFiles::new()),
    ));

    let first = {
        let orchestrator = Arc::clone(&orchestrator);
        std::thread::spawn(move || orchestrator.run())
    };
    entered_rx
        .recv_timeout(Duration::from_secs(30))
        .expect("first run reached the store");

    assert!(orchestrator.is_running());
    assert_eq!(orchestrator.run()?, None);
    assert!(orchestrator.is_running());
    assert_eq!(store.len()?, 0);

    release_tx.send(()).unwrap();
    let report = first.join().unwrap()?.expect("first run completed");

    assert_eq!(report.summary.totals.new_records, 2);
    assert!(!orchestrator.is_running());
    assert_eq!(store.len()?, 2);
    Ok(())
}

#[tokio::test]
async fn test_watch_runs_at_start_up_and_stops_on_shutdown() -> Result<()> {
    let dir = TempDir::new()?;
    seed_station(dir.path());
    let store = Arc::new(InMemoryWeatherStore::new());
    let orchestrator = Arc::new(new_orchestrator(
        dir.path(),
        store.clone(),
        Arc::new(InMemoryProcessedFiles::new()),
    ));

    orchestrator
        .clone()
        .watch(Duration::from_secs(3600), tokio::time::sleep(Duration::from_millis(200)))
        .await?;

    assert_eq!(store.len()?, 2);
    assert!(!orchestrator.is_running());
    Ok(())
}
