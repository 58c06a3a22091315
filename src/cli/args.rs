use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::analyzers::{AggregateMode, Grouping};
use crate::models::{WeatherCategory, WeatherField};

#[derive(Parser)]
#[command(name = "wildweather")]
#[command(about = "Weather station CSV ingestion and aggregation")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Settings file [default: ./wildweather.toml]")]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Log file path")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ingest every CSV file under the root once
    Ingest {
        #[arg(long, help = "Root of the <station>/<file>.csv tree")]
        csv_root: Option<PathBuf>,

        #[arg(long, help = "Clear all records before ingesting")]
        full_reload: bool,

        #[arg(long)]
        max_workers: Option<usize>,
    },

    /// Ingest at start-up and then on a fixed interval until interrupted
    Watch {
        #[arg(long, help = "Root of the <station>/<file>.csv tree")]
        csv_root: Option<PathBuf>,

        #[arg(long, help = "Seconds between scheduled runs")]
        interval_secs: Option<u64>,

        #[arg(long)]
        max_workers: Option<usize>,
    },

    /// Aggregate stored records and print them as JSON
    Query {
        #[arg(short, long = "station", help = "Station to include (repeatable, default: all)")]
        stations: Vec<String>,

        #[arg(long, help = "Only this category: A, H or L")]
        category: Option<WeatherCategory>,

        #[arg(long, help = "First date, YYYY-MM-DD")]
        start_date: Option<NaiveDate>,

        #[arg(long, help = "Last date, YYYY-MM-DD")]
        end_date: Option<NaiveDate>,

        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
        start_month: Option<u32>,

        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
        end_month: Option<u32>,

        #[arg(short, long, default_value_t = Grouping::Daily)]
        grouping: Grouping,

        #[arg(short, long, default_value_t = AggregateMode::Average)]
        aggregate: AggregateMode,

        #[arg(short, long = "field", help = "Field key such as tmp or rDy (repeatable, default: all)")]
        fields: Vec<WeatherField>,

        #[arg(long, help = "Pretty-print the JSON output")]
        pretty: bool,
    },

    /// List stations with their first and last recorded day
    Stations {
        #[arg(long, help = "Print JSON instead of a table")]
        json: bool,
    },

    /// Delete every stored record
    Reset,
}
