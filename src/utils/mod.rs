pub mod constants;
pub mod conversions;
pub mod filename;
pub mod progress;

pub use constants::*;
pub use conversions::{degrees_to_direction, direction_to_degrees, round_one_decimal};
pub use filename::{csv_name, month_stamp, station_name, summary_csv_path};
pub use progress::ProgressReporter;
