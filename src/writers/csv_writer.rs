use chrono::NaiveDate;
use csv::WriterBuilder;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::WeatherCategory;
use crate::utils::constants::DATE_FIELD_FORMAT;
use crate::utils::conversions::degrees_to_direction;
use crate::utils::filename::summary_csv_path;

const SUMMARY_HEADERS: [&str; 11] = [
    "",
    "Date",
    "Outdoor Temperature (°C)",
    "Wind Speed (km/hr)",
    "Max Daily Gust (km/hr)",
    "Wind Direction (°)",
    "Rain Rate (mm/hr)",
    "Daily Rain (mm)",
    "Relative Pressure (hPa)",
    "Humidity (%)",
    "Ultra-Violet Radiation Index",
];

/// One statistic row of a summary file. Wind direction is in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SummaryValues {
    pub temperature: f64,
    pub wind_speed: f64,
    pub wind_max: f64,
    pub wind_direction: f64,
    pub rain_rate: f64,
    pub rain_daily: f64,
    pub pressure: f64,
    pub humidity: f64,
    pub uv_index: f64,
}

/// Average, high and low statistics of one station day.
#[derive(Debug, Clone, PartialEq)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub average: SummaryValues,
    pub high: SummaryValues,
    pub low: SummaryValues,
}

/// Writes daily statistics in the summary CSV layout the ingestion pipeline
/// reads, for sources that are fetched rather than exported by a station.
#[derive(Debug, Clone)]
pub struct SummaryCsvWriter {
    source: String,
}

impl SummaryCsvWriter {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// Write `days` into `station_dir`, named after the first and last date.
    ///
    /// Returns `None` when a single-day file already exists; those are never
    /// overwritten. Multi-day files are rewritten.
    pub fn write(&self, station_dir: &Path, days: &[DailySummary]) -> Result<Option<PathBuf>> {
        let (Some(first), Some(last)) = (days.first(), days.last()) else {
            return Ok(None);
        };

        if days.len() == 1 {
            let path = summary_csv_path(&self.source, station_dir, first.date, None);
            if path.exists() {
                warn!(path = %path.display(), "CSV file already exists");
                return Ok(None);
            }
            self.write_rows(&path, days)?;
            return Ok(Some(path));
        }

        let path = summary_csv_path(&self.source, station_dir, first.date, Some(last.date));
        self.write_rows(&path, days)?;
        Ok(Some(path))
    }

    fn write_rows(&self, path: &Path, days: &[DailySummary]) -> Result<()> {
        debug!(path = %path.display(), days = days.len(), "Writing summary CSV file");
        let mut writer = WriterBuilder::new().from_path(path)?;
        writer.write_record(SUMMARY_HEADERS)?;

        for day in days {
            let date = day.date.format(DATE_FIELD_FORMAT).to_string();
            let average_direction = degrees_to_direction(day.average.wind_direction).unwrap_or("");
            for (category, values, direction) in [
                (WeatherCategory::A, &day.average, average_direction),
                (WeatherCategory::H, &day.high, ""),
                (WeatherCategory::L, &day.low, ""),
            ] {
                writer.write_record(Self::row(category.display_name(), &date, values, direction))?;
            }
        }

        writer.flush()?;
        Ok(())
    }

    fn row(label: &str, date: &str, values: &SummaryValues, direction: &str) -> Vec<String> {
        vec![
            label.to_string(),
            date.to_string(),
            values.temperature.to_string(),
            values.wind_speed.to_string(),
            values.wind_max.to_string(),
            direction.to_string(),
            values.rain_rate.to_string(),
            values.rain_daily.to_string(),
            values.pressure.to_string(),
            values.humidity.to_string(),
            values.uv_index.to_string(),
        ]
    }
}
