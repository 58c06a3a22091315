use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use validator::Validate;

use crate::error::Result;
use crate::utils::constants::{
    DEFAULT_SCHEDULE_INTERVAL_SECS, DEFAULT_SETTINGS_FILE, SETTINGS_ENV_PREFIX,
    WEATHER_UNDERGROUND_MARKER,
};

/// Runtime settings: defaults, then an optional TOML file, then
/// `WILDWEATHER_*` environment variables.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Settings {
    /// Root of the `<station>/<file>.csv` tree.
    pub csv_root: PathBuf,

    /// Parquet snapshot of the record store shared between invocations.
    pub snapshot_path: PathBuf,

    #[validate(range(min = 1, max = 1024))]
    pub max_workers: usize,

    pub use_mmap: bool,

    #[validate(range(min = 1))]
    pub schedule_interval_secs: u64,

    /// Source marker of files whose latest two months are re-read nightly.
    #[validate(length(min = 1))]
    pub recent_window_source: String,

    /// Files with known number-format problems; their parse warnings drop to debug.
    #[serde(default)]
    pub known_bad_files: Vec<String>,

    #[serde(default)]
    pub home_stations: Vec<String>,
}

impl Settings {
    /// Load settings from `path`, or from `wildweather.toml` in the working
    /// directory when no path is given. A missing default file is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file_source = match path {
            Some(path) => File::from(path.to_path_buf()).required(true),
            None => File::with_name(DEFAULT_SETTINGS_FILE).required(false),
        };

        let settings: Settings = Config::builder()
            .set_default("csv_root", "csv")?
            .set_default("snapshot_path", "output/weather-snapshot.parquet")?
            .set_default("max_workers", num_cpus::get() as u64)?
            .set_default("use_mmap", false)?
            .set_default("schedule_interval_secs", DEFAULT_SCHEDULE_INTERVAL_SECS)?
            .set_default("recent_window_source", WEATHER_UNDERGROUND_MARKER)?
            .add_source(file_source)
            .add_source(
                Environment::with_prefix(SETTINGS_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("known_bad_files")
                    .with_list_parse_key("home_stations"),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            csv_root: PathBuf::from("csv"),
            snapshot_path: PathBuf::from("output/weather-snapshot.parquet"),
            max_workers: num_cpus::get(),
            use_mmap: false,
            schedule_interval_secs: DEFAULT_SCHEDULE_INTERVAL_SECS,
            recent_window_source: WEATHER_UNDERGROUND_MARKER.to_string(),
            known_bad_files: Vec::new(),
            home_stations: Vec::new(),
        }
    }
}
