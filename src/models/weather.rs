use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

use crate::error::{ProcessingError, Result};
use crate::utils::constants::{FULLY_MISSING_PERCENT, PLACEHOLDER_WIND_DIRECTION};

/// Daily statistic a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WeatherCategory {
    /// Average
    A,
    /// High
    H,
    /// Low
    L,
}

impl WeatherCategory {
    pub const ALL: [WeatherCategory; 3] = [WeatherCategory::A, WeatherCategory::H, WeatherCategory::L];

    /// Parse the category from the leading character of a summary row label
    /// ("Average", "High", "Low" or the bare code).
    pub fn from_label(label: &str) -> Result<Self> {
        match label.chars().next() {
            Some('A') => Ok(WeatherCategory::A),
            Some('H') => Ok(WeatherCategory::H),
            Some('L') => Ok(WeatherCategory::L),
            _ => Err(ProcessingError::UnknownCategory(label.to_string())),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            WeatherCategory::A => "A",
            WeatherCategory::H => "H",
            WeatherCategory::L => "L",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            WeatherCategory::A => "Average",
            WeatherCategory::H => "High",
            WeatherCategory::L => "Low",
        }
    }
}

impl fmt::Display for WeatherCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl std::str::FromStr for WeatherCategory {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" | "AVERAGE" => Ok(WeatherCategory::A),
            "H" | "HIGH" => Ok(WeatherCategory::H),
            "L" | "LOW" => Ok(WeatherCategory::L),
            _ => Err(ProcessingError::UnknownCategory(s.to_string())),
        }
    }
}

/// Upsert key of the record store: at most one record per triple.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey {
    pub station: String,
    pub date: NaiveDate,
    pub category: WeatherCategory,
}

impl RecordKey {
    pub fn new(station: impl Into<String>, date: NaiveDate, category: WeatherCategory) -> Self {
        Self {
            station: station.into(),
            date,
            category,
        }
    }
}

/// The nine measurements carried by one summary CSV row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurements {
    pub temperature: f64,
    pub wind_speed: f64,
    pub wind_max: f64,
    pub wind_direction: String,
    pub rain_rate: f64,
    pub rain_daily: f64,
    pub pressure: f64,
    pub humidity: f64,
    pub uv_index: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct WeatherRecord {
    #[validate(length(min = 1))]
    pub station: String,
    pub date: NaiveDate,
    pub category: WeatherCategory,

    pub temperature: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_max: Option<f64>,
    pub wind_direction: String,
    pub rain_rate: Option<f64>,
    pub rain_daily: Option<f64>,
    pub pressure: Option<f64>,
    pub humidity: Option<f64>,
    pub uv_index: Option<f64>,

    #[validate(range(min = 0.0, max = 100.0))]
    pub missing_percent: f64,
}

impl WeatherRecord {
    /// Record built from an ingested summary row.
    pub fn observed(
        station: impl Into<String>,
        date: NaiveDate,
        category: WeatherCategory,
        measurements: Measurements,
        missing_percent: f64,
    ) -> Self {
        Self {
            station: station.into(),
            date,
            category,
            temperature: Some(measurements.temperature),
            wind_speed: Some(measurements.wind_speed),
            wind_max: Some(measurements.wind_max),
            wind_direction: measurements.wind_direction,
            rain_rate: Some(measurements.rain_rate),
            rain_daily: Some(measurements.rain_daily),
            pressure: Some(measurements.pressure),
            humidity: Some(measurements.humidity),
            uv_index: Some(measurements.uv_index),
            missing_percent,
        }
    }

    /// Record for a calendar day with no observations at all.
    pub fn placeholder(station: impl Into<String>, date: NaiveDate, category: WeatherCategory) -> Self {
        Self {
            station: station.into(),
            date,
            category,
            temperature: None,
            wind_speed: None,
            wind_max: None,
            wind_direction: PLACEHOLDER_WIND_DIRECTION.to_string(),
            rain_rate: None,
            rain_daily: None,
            pressure: None,
            humidity: None,
            uv_index: None,
            missing_percent: FULLY_MISSING_PERCENT,
        }
    }

    pub fn with_missing_percent(self, missing_percent: f64) -> Self {
        Self {
            missing_percent,
            ..self
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.station.clone(), self.date, self.category)
    }

    pub fn is_fully_missing(&self) -> bool {
        self.missing_percent >= FULLY_MISSING_PERCENT
    }

    /// Loose duplicate test used when a summary row collides with a stored record.
    ///
    /// A single equal field is enough to call the row a harmless duplicate. This
    /// is far weaker than an exact match and is kept because existing data sets
    /// were deduplicated with it; see `DESIGN.md`.
    pub fn matches_any_field(&self, incoming: &Measurements) -> bool {
        self.temperature == Some(incoming.temperature)
            || self.wind_speed == Some(incoming.wind_speed)
            || self.wind_max == Some(incoming.wind_max)
            || self.wind_direction == incoming.wind_direction
            || self.rain_rate == Some(incoming.rain_rate)
            || self.rain_daily == Some(incoming.rain_daily)
            || self.pressure == Some(incoming.pressure)
            || self.humidity == Some(incoming.humidity)
            || self.uv_index == Some(incoming.uv_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_measurements() -> Measurements {
        Measurements {
            temperature: 12.3,
            wind_speed: 5.0,
            wind_max: 8.0,
            wind_direction: "NE".to_string(),
            rain_rate: 0.1,
            rain_daily: 1.2,
            pressure: 1013.2,
            humidity: 55.0,
            uv_index: 0.0,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, 7).unwrap()
    }

    #[test]
    fn test_category_from_label() {
        assert_eq!(WeatherCategory::from_label("Average").unwrap(), WeatherCategory::A);
        assert_eq!(WeatherCategory::from_label("High").unwrap(), WeatherCategory::H);
        assert_eq!(WeatherCategory::from_label("L").unwrap(), WeatherCategory::L);
        assert!(WeatherCategory::from_label("Median").is_err());
        assert!(WeatherCategory::from_label("").is_err());
    }

    #[test]
    fn test_category_ordering_matches_store_order() {
        let mut categories = vec![WeatherCategory::L, WeatherCategory::A, WeatherCategory::H];
        categories.sort();
        assert_eq!(categories, WeatherCategory::ALL.to_vec());
    }

    #[test]
    fn test_placeholder_is_fully_missing() {
        let record = WeatherRecord::placeholder("stationA", date(), WeatherCategory::H);
        assert!(record.is_fully_missing());
        assert_eq!(record.wind_direction, "");
        assert_eq!(record.temperature, None);
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_with_missing_percent_keeps_measurements() {
        let record = WeatherRecord::observed("stationA", date(), WeatherCategory::A, sample_measurements(), 0.0);
        let updated = record.clone().with_missing_percent(50.0);
        assert_eq!(updated.missing_percent, 50.0);
        assert_eq!(updated.temperature, record.temperature);
        assert_eq!(updated.key(), record.key());
    }

    #[test]
    fn test_matches_any_field_is_an_or() {
        let stored = WeatherRecord::observed("stationA", date(), WeatherCategory::A, sample_measurements(), 0.0);

        let mut incoming = sample_measurements();
        incoming.temperature = 99.0;
        incoming.wind_speed = 99.0;
        incoming.wind_max = 99.0;
        incoming.wind_direction = "S".to_string();
        incoming.rain_rate = 99.0;
        incoming.rain_daily = 99.0;
        incoming.pressure = 99.0;
        incoming.uv_index = 99.0;
        // Only humidity still agrees
        assert!(stored.matches_any_field(&incoming));

        incoming.humidity = 99.0;
        assert!(!stored.matches_any_field(&incoming));
    }

    #[test]
    fn test_validation_rejects_out_of_range_missing() {
        let record = WeatherRecord::observed("stationA", date(), WeatherCategory::A, sample_measurements(), 120.0);
        assert!(record.validate().is_err());

        let unnamed = WeatherRecord::observed("", date(), WeatherCategory::A, sample_measurements(), 0.0);
        assert!(unnamed.validate().is_err());
    }
}
