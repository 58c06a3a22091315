use chrono::NaiveDate;
use std::path::{Path, PathBuf};

use crate::utils::constants::{CSV_NAME_DATE_FORMAT, SUMMARY_CSV_INFIX, UNKNOWN_STATION};

/// Station a file belongs to: the name of its immediate parent directory.
pub fn station_name(path: &Path) -> String {
    path.parent()
        .and_then(|parent| parent.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| UNKNOWN_STATION.to_string())
}

/// Identifier of a source file in the processed-file set: `"<station> -> <file>"`.
pub fn csv_name(path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{} -> {}", station_name(path), file_name)
}

/// Path of a summary CSV written by an external fetcher.
pub fn summary_csv_path(
    source: &str,
    station_dir: &Path,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
) -> PathBuf {
    let start_stamp = start_date.format(CSV_NAME_DATE_FORMAT);
    let file_name = match end_date {
        Some(end) => format!(
            "{}{}{}-{}.csv",
            source,
            SUMMARY_CSV_INFIX,
            start_stamp,
            end.format(CSV_NAME_DATE_FORMAT)
        ),
        None => format!("{}{}{}.csv", source, SUMMARY_CSV_INFIX, start_stamp),
    };
    station_dir.join(file_name)
}

/// `yyyyMM01` stamp of the month containing `date`.
pub fn month_stamp(date: NaiveDate) -> String {
    use chrono::Datelike;
    date.with_day(1)
        .unwrap_or(date)
        .format(CSV_NAME_DATE_FORMAT)
        .to_string()
}
