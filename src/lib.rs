//! Ingestion and aggregation engine for weather-station CSV exports.
//!
//! Station exports live in `<root>/<station>/<file>.csv`. Summary files (one
//! row per day and category) are upserted into a [`store::WeatherStore`];
//! fine-scale interval files only contribute sample counts, from which the
//! missing percentage of each day is derived. The
//! [`analyzers::AggregationEngine`] then serves grouped statistics over the store.

pub mod analyzers;
pub mod cli;
pub mod error;
pub mod models;
pub mod processors;
pub mod readers;
pub mod settings;
pub mod store;
pub mod utils;
pub mod writers;

pub use error::{ProcessingError, Result};
pub use settings::Settings;
