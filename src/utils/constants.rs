/// Nominal interval between fine-scale samples, in minutes.
pub const SAMPLE_INTERVAL_MINUTES: i64 = 5;

/// Largest spacing between consecutive fine-scale samples that is not a gap.
pub const GAP_TOLERANCE_MINUTES: i64 = 9;

/// One sample every 5 minutes over 24 hours.
pub const EXPECTED_RECORDS_PER_DAY: u32 = 24 * (60 / SAMPLE_INTERVAL_MINUTES as u32);

/// Missing percentage of a day without a single observation.
pub const FULLY_MISSING_PERCENT: f64 = 100.0;

/// Missing percentage stamped on rows from estimated or API-sourced files.
pub const LOW_CONFIDENCE_MISSING_PERCENT: f64 = 99.99;

/// File-name markers of lower-confidence sources.
pub const LOW_CONFIDENCE_MARKERS: [&str; 2] = ["estimates-", "api-"];

/// Inconsistent duplicates from this source are counted but not logged.
pub const WEATHER_UNDERGROUND_MARKER: &str = "api-weather-underground";

pub const PLACEHOLDER_WIND_DIRECTION: &str = "";

/// Column names (after header normalisation)
pub const SUMMARY_MARKER_COLUMN: &str = "COL0";
pub const DATETIME_ROW_MARKER: &str = "Datetime";
pub const DATE_COLUMN: &str = "Date";
pub const TEMPERATURE_COLUMN: &str = "Outdoor Temperature";
pub const WIND_SPEED_COLUMN: &str = "Wind Speed";
pub const WIND_MAX_COLUMN: &str = "Max Daily Gust";
pub const WIND_DIRECTION_COLUMN: &str = "Wind Direction";
pub const RAIN_RATE_COLUMN: &str = "Rain Rate";
pub const RAIN_DAILY_COLUMN: &str = "Daily Rain";
pub const PRESSURE_COLUMN: &str = "Relative Pressure";
pub const HUMIDITY_COLUMN: &str = "Humidity";
pub const UV_INDEX_COLUMN: &str = "Ultra-Violet Radiation Index";

/// Historical alias renamed during header normalisation.
pub const HOURLY_RAIN_ALIAS: &str = "Hourly Rain";

pub const CSV_EXTENSION: &str = ".csv";
pub const UNKNOWN_STATION: &str = "UNKNOWN";

/// Summary file naming: `{source}-high-lows-details-{yyyyMMdd}[-{yyyyMMdd}].csv`
pub const SUMMARY_CSV_INFIX: &str = "-high-lows-details-";
pub const CSV_NAME_DATE_FORMAT: &str = "%Y%m%d";
pub const DATE_FIELD_FORMAT: &str = "%Y-%m-%d";

/// Processing defaults
pub const DEFAULT_SCHEDULE_INTERVAL_SECS: u64 = 60 * 60;
pub const DEFAULT_ROW_GROUP_SIZE: usize = 10000;
pub const DEFAULT_SETTINGS_FILE: &str = "wildweather.toml";
pub const SETTINGS_ENV_PREFIX: &str = "WILDWEATHER";

/// Worker thread name prefixes
pub const SUMMARY_THREAD_PREFIX: &str = "s-csv-";
pub const FINE_SCALE_THREAD_PREFIX: &str = "f-csv-";
