use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ProcessingError, Result};
use crate::models::WeatherRecord;
use crate::utils::conversions::direction_to_degrees;

/// Measurement fields exposed by the aggregation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WeatherField {
    #[serde(rename = "tmp")]
    Temperature,
    #[serde(rename = "wSp")]
    WindSpeed,
    #[serde(rename = "wMx")]
    WindMax,
    #[serde(rename = "wDr")]
    WindDirection,
    #[serde(rename = "rRt")]
    RainRate,
    #[serde(rename = "rDy")]
    RainDaily,
    #[serde(rename = "prs")]
    Pressure,
    #[serde(rename = "hmd")]
    Humidity,
    #[serde(rename = "uvI")]
    UvIndex,
    #[serde(rename = "mis")]
    Missing,
}

pub type FieldExtractor = fn(&WeatherRecord) -> Option<f64>;

fn temperature(r: &WeatherRecord) -> Option<f64> {
    r.temperature
}

fn wind_speed(r: &WeatherRecord) -> Option<f64> {
    r.wind_speed
}

fn wind_max(r: &WeatherRecord) -> Option<f64> {
    r.wind_max
}

fn wind_direction(r: &WeatherRecord) -> Option<f64> {
    Some(direction_to_degrees(&r.wind_direction))
}

fn rain_rate(r: &WeatherRecord) -> Option<f64> {
    r.rain_rate
}

fn rain_daily(r: &WeatherRecord) -> Option<f64> {
    r.rain_daily
}

fn pressure(r: &WeatherRecord) -> Option<f64> {
    r.pressure
}

fn humidity(r: &WeatherRecord) -> Option<f64> {
    r.humidity
}

fn uv_index(r: &WeatherRecord) -> Option<f64> {
    r.uv_index
}

fn missing(r: &WeatherRecord) -> Option<f64> {
    Some(r.missing_percent)
}

/// Fixed extraction table, evaluated in this order for every record.
pub const FIELD_EXTRACTORS: [(WeatherField, FieldExtractor); 10] = [
    (WeatherField::Temperature, temperature),
    (WeatherField::WindSpeed, wind_speed),
    (WeatherField::WindMax, wind_max),
    (WeatherField::WindDirection, wind_direction),
    (WeatherField::RainRate, rain_rate),
    (WeatherField::RainDaily, rain_daily),
    (WeatherField::Pressure, pressure),
    (WeatherField::Humidity, humidity),
    (WeatherField::UvIndex, uv_index),
    (WeatherField::Missing, missing),
];

impl WeatherField {
    pub fn key(&self) -> &'static str {
        match self {
            WeatherField::Temperature => "tmp",
            WeatherField::WindSpeed => "wSp",
            WeatherField::WindMax => "wMx",
            WeatherField::WindDirection => "wDr",
            WeatherField::RainRate => "rRt",
            WeatherField::RainDaily => "rDy",
            WeatherField::Pressure => "prs",
            WeatherField::Humidity => "hmd",
            WeatherField::UvIndex => "uvI",
            WeatherField::Missing => "mis",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        FIELD_EXTRACTORS
            .iter()
            .map(|(field, _)| *field)
            .find(|field| field.key() == key)
    }
}

impl fmt::Display for WeatherField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl std::str::FromStr for WeatherField {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(field) = Self::from_key(s.trim()) {
            return Ok(field);
        }
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "temperature" => Ok(WeatherField::Temperature),
            "wind_speed" => Ok(WeatherField::WindSpeed),
            "wind_max" => Ok(WeatherField::WindMax),
            "wind_direction" => Ok(WeatherField::WindDirection),
            "rain_rate" => Ok(WeatherField::RainRate),
            "rain_daily" => Ok(WeatherField::RainDaily),
            "pressure" => Ok(WeatherField::Pressure),
            "humidity" => Ok(WeatherField::Humidity),
            "uv_index" | "uv_radiation_index" => Ok(WeatherField::UvIndex),
            "missing" => Ok(WeatherField::Missing),
            _ => Err(ProcessingError::InvalidFormat(format!(
                "Unknown weather field: '{}'",
                s
            ))),
        }
    }
}
