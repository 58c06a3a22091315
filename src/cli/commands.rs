use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::analyzers::{AggregationEngine, WeatherQuery};
use crate::cli::args::{Cli, Commands};
use crate::error::Result;
use crate::processors::IngestionOrchestrator;
use crate::settings::Settings;
use crate::store::{InMemoryProcessedFiles, InMemoryWeatherStore, RecordFilter, WeatherStore};
use crate::writers::ParquetWriter;

pub async fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    info!(
        csv_root = %settings.csv_root.display(),
        snapshot = %settings.snapshot_path.display(),
        "Settings loaded"
    );

    match cli.command {
        Commands::Ingest {
            csv_root,
            full_reload,
            max_workers,
        } => {
            apply_overrides(&mut settings, csv_root, max_workers);
            let (store, orchestrator) = open_orchestrator(&settings)?;

            match orchestrator.with_progress(!cli.verbose).trigger(full_reload)? {
                Some(report) => println!("\n{}", report.summary()),
                None => println!("Ingestion already in progress, nothing done"),
            }

            if let Some(path) = store.snapshot_path().filter(|p| p.exists()) {
                let file_info = ParquetWriter::new().get_file_info(path)?;
                println!("{}", file_info.summary());
            }
        }

        Commands::Watch {
            csv_root,
            interval_secs,
            max_workers,
        } => {
            apply_overrides(&mut settings, csv_root, max_workers);
            let interval = Duration::from_secs(interval_secs.unwrap_or(settings.schedule_interval_secs).max(1));
            let (_, orchestrator) = open_orchestrator(&settings)?;

            info!(interval_secs = interval.as_secs(), "Watching for CSV files, press Ctrl-C to stop");
            Arc::new(orchestrator)
                .watch(interval, async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await?;
        }

        Commands::Query {
            stations,
            category,
            start_date,
            end_date,
            start_month,
            end_month,
            grouping,
            aggregate,
            fields,
            pretty,
        } => {
            let store = Arc::new(InMemoryWeatherStore::with_snapshot(&settings.snapshot_path)?);
            let engine = AggregationEngine::new(store);

            let query = WeatherQuery {
                filter: RecordFilter {
                    stations: (!stations.is_empty()).then_some(stations),
                    category,
                    start_date,
                    end_date,
                    start_month,
                    end_month,
                },
                grouping,
                aggregate,
                fields: (!fields.is_empty()).then(|| fields.into_iter().collect::<BTreeSet<_>>()),
            };

            let data = engine.query(&query)?;
            let json = if pretty {
                serde_json::to_string_pretty(&data)?
            } else {
                serde_json::to_string(&data)?
            };
            println!("{}", json);
        }

        Commands::Stations { json } => {
            let store = Arc::new(InMemoryWeatherStore::with_snapshot(&settings.snapshot_path)?);
            let statuses = AggregationEngine::new(store).station_status(&settings.home_stations)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&statuses)?);
            } else if statuses.is_empty() {
                println!("No stations recorded yet");
            } else {
                println!("{:<30} {:<12} {:<12} Home", "Station", "First", "Last");
                for status in &statuses {
                    println!(
                        "{:<30} {:<12} {:<12} {}",
                        status.station,
                        status.start_date,
                        status.end_date,
                        if status.is_home_station { "yes" } else { "" }
                    );
                }
            }
        }

        Commands::Reset => {
            let (store, orchestrator) = open_orchestrator(&settings)?;
            let removed = store.len()?;
            if orchestrator.reset_all()? {
                println!("Removed {} records", removed);
            } else {
                println!("Ingestion in progress, nothing removed");
            }
        }
    }

    Ok(())
}

fn apply_overrides(settings: &mut Settings, csv_root: Option<std::path::PathBuf>, max_workers: Option<usize>) {
    if let Some(csv_root) = csv_root {
        settings.csv_root = csv_root;
    }
    if let Some(max_workers) = max_workers {
        settings.max_workers = max_workers.max(1);
    }
}

fn open_orchestrator(settings: &Settings) -> Result<(Arc<InMemoryWeatherStore>, IngestionOrchestrator)> {
    let store = Arc::new(InMemoryWeatherStore::with_snapshot(&settings.snapshot_path)?);
    let processed = Arc::new(InMemoryProcessedFiles::new());
    let orchestrator = IngestionOrchestrator::from_settings(settings, store.clone(), processed);
    Ok((store, orchestrator))
}
