use csv::{ReaderBuilder, StringRecord, Trim};
use std::collections::HashMap;
use tracing::trace;

use crate::error::{ProcessingError, Result};
use crate::utils::constants::{HOURLY_RAIN_ALIAS, RAIN_RATE_COLUMN};

/// Normalise a raw CSV header line into canonical column names.
///
/// Quotes are stripped, blank columns become `COL<index>`, unit annotations
/// (`Wind Speed (km/hr)`) are cut at the first parenthesis, and the historical
/// `Hourly Rain` alias becomes `Rain Rate`. Never fails: an empty line yields
/// `["COL0"]`.
///
/// # Examples
/// ```
/// use wildweather_ingest::readers::normalize_headers;
///
/// let headers = normalize_headers("\"\",Outdoor Temperature (°C),Hourly Rain");
/// assert_eq!(headers, vec!["COL0", "Outdoor Temperature", "Rain Rate"]);
/// ```
pub fn normalize_headers(line: &str) -> Vec<String> {
    let line = line.trim_end_matches(['\r', '\n']);
    let headers: Vec<String> = line
        .split(',')
        .enumerate()
        .map(|(index, raw)| {
            let mut header = raw.replace('"', "");
            if header.trim().is_empty() {
                header = format!("COL{}", index);
            }
            if let Some(paren) = header.find('(') {
                header = header[..paren].trim().to_string();
            }
            if header == HOURLY_RAIN_ALIAS {
                header = RAIN_RATE_COLUMN.to_string();
            }
            header
        })
        .collect();
    trace!(?headers, "Normalised CSV headers");
    headers
}

/// Name-to-position lookup over a normalised header row.
#[derive(Debug, Clone)]
pub struct HeaderIndex {
    headers: Vec<String>,
    positions: HashMap<String, usize>,
}

impl HeaderIndex {
    pub fn new(headers: Vec<String>) -> Self {
        let mut positions = HashMap::with_capacity(headers.len());
        for (index, header) in headers.iter().enumerate() {
            positions.entry(header.clone()).or_insert(index);
        }
        Self { headers, positions }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn first(&self) -> Option<&str> {
        self.headers.first().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    /// Value of column `name` in `record`.
    pub fn get<'r>(&self, record: &'r StringRecord, name: &str) -> Result<&'r str> {
        let position = *self
            .positions
            .get(name)
            .ok_or_else(|| ProcessingError::MissingColumn(name.to_string()))?;
        record.get(position).ok_or_else(|| {
            ProcessingError::InvalidFormat(format!(
                "Column '{}' is at index {} but the row only has {} values",
                name,
                position,
                record.len()
            ))
        })
    }
}

/// A parsed CSV file: normalised header plus its data rows.
#[derive(Debug, Clone)]
pub struct CsvTable {
    pub header: HeaderIndex,
    pub records: Vec<StringRecord>,
    /// Rows the CSV parser rejected outright.
    pub malformed_rows: usize,
}

impl CsvTable {
    /// Read only the header of `text`.
    pub fn header_of(text: &str) -> HeaderIndex {
        let header_line = text.lines().next().unwrap_or("");
        HeaderIndex::new(normalize_headers(header_line))
    }

    /// Parse `text`: the first line is the header, the rest are data rows.
    /// Values are trimmed and blank lines skipped.
    pub fn parse(text: &str) -> Self {
        let (header_line, body) = match text.find('\n') {
            Some(newline) => (&text[..newline], &text[newline + 1..]),
            None => (text, ""),
        };
        let header = HeaderIndex::new(normalize_headers(header_line));

        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(body.as_bytes());

        let mut records = Vec::new();
        let mut malformed_rows = 0;
        for result in reader.records() {
            match result {
                Ok(record) => records.push(record),
                Err(e) => {
                    trace!(error = %e, "Skipping malformed CSV row");
                    malformed_rows += 1;
                }
            }
        }
        trace!(records = records.len(), "Parsed CSV rows");

        Self {
            header,
            records,
            malformed_rows,
        }
    }
}
