use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::error::{ProcessingError, Result};
use crate::models::{WeatherCategory, WeatherField, WeatherRecord, FIELD_EXTRACTORS};
use crate::store::{RecordFilter, WeatherStore};
use crate::utils::constants::DATE_FIELD_FORMAT;
use crate::utils::conversions::round_one_decimal;

/// Time bucket records are grouped into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grouping {
    #[default]
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Grouping {
    /// Bucket key of `date`: ISO date, zero-padded week of year, zero-padded month, or year.
    pub fn key(&self, date: NaiveDate) -> String {
        match self {
            Grouping::Daily => date.format(DATE_FIELD_FORMAT).to_string(),
            Grouping::Weekly => format!("{:02}", week_of_year(date)),
            Grouping::Monthly => format!("{:02}", date.month()),
            Grouping::Yearly => date.year().to_string(),
        }
    }
}

/// Week number within the calendar year of `date`, 0 to 53.
///
/// Weeks start on Monday. Week 1 is the first week with at least four days in
/// the year; days before it fall in week 0, and late-December days stay in
/// their own year instead of wrapping to week 1.
fn week_of_year(date: NaiveDate) -> u32 {
    let first_weekday = date
        .with_ordinal(1)
        .map(|first| first.weekday().num_days_from_monday())
        .unwrap_or(0);
    let week = (date.ordinal0() + first_weekday) / 7;
    if first_weekday <= 3 {
        week + 1
    } else {
        week
    }
}

impl fmt::Display for Grouping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Grouping::Daily => "daily",
            Grouping::Weekly => "weekly",
            Grouping::Monthly => "monthly",
            Grouping::Yearly => "yearly",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for Grouping {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" | "day" => Ok(Grouping::Daily),
            "weekly" | "week" => Ok(Grouping::Weekly),
            "monthly" | "month" => Ok(Grouping::Monthly),
            "yearly" | "year" => Ok(Grouping::Yearly),
            _ => Err(ProcessingError::InvalidFormat(format!("Unknown grouping: '{}'", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateMode {
    #[default]
    Average,
    Sum,
}

impl fmt::Display for AggregateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateMode::Average => write!(f, "average"),
            AggregateMode::Sum => write!(f, "sum"),
        }
    }
}

impl std::str::FromStr for AggregateMode {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "average" | "avg" => Ok(AggregateMode::Average),
            "sum" | "total" => Ok(AggregateMode::Sum),
            _ => Err(ProcessingError::InvalidFormat(format!("Unknown aggregate mode: '{}'", s))),
        }
    }
}

/// Parameters of an aggregation query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeatherQuery {
    pub filter: RecordFilter,
    pub grouping: Grouping,
    pub aggregate: AggregateMode,
    /// Fields to report; `None` or empty reports every field.
    pub fields: Option<BTreeSet<WeatherField>>,
}

impl WeatherQuery {
    fn wants(&self, field: WeatherField) -> bool {
        match &self.fields {
            Some(fields) if !fields.is_empty() => fields.contains(&field),
            _ => true,
        }
    }
}

pub type CategoryValues = BTreeMap<WeatherCategory, Option<f64>>;
pub type FieldValues = BTreeMap<WeatherField, CategoryValues>;
pub type GroupValues = BTreeMap<String, FieldValues>;
pub type YearValues = BTreeMap<i32, GroupValues>;

/// Query result: `weather[station][year][group][field][category]`.
///
/// A `None` value marks a slot that was requested but only saw fully
/// missing days. It serialises as JSON `null`, as do non-finite values.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WeatherData {
    pub weather: BTreeMap<String, YearValues>,
}

impl WeatherData {
    pub fn value(
        &self,
        station: &str,
        year: i32,
        group: &str,
        field: WeatherField,
        category: WeatherCategory,
    ) -> Option<Option<f64>> {
        self.weather
            .get(station)?
            .get(&year)?
            .get(group)?
            .get(&field)?
            .get(&category)
            .copied()
    }

    pub fn is_empty(&self) -> bool {
        self.weather.is_empty()
    }
}

/// First and last recorded day of a station.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StationStatus {
    pub station: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub is_home_station: bool,
}

#[derive(Debug, Default, Clone, Copy)]
struct DayCount {
    total: u32,
    with_data: u32,
}

/// Read-only grouped statistics over the record store.
pub struct AggregationEngine {
    store: Arc<dyn WeatherStore>,
}

impl AggregationEngine {
    pub fn new(store: Arc<dyn WeatherStore>) -> Self {
        Self { store }
    }

    pub fn query(&self, query: &WeatherQuery) -> Result<WeatherData> {
        let records = self.store.search(&query.filter)?;
        debug!(
            records = records.len(),
            grouping = %query.grouping,
            aggregate = %query.aggregate,
            "Aggregating weather records"
        );
        Ok(aggregate_records(&records, query))
    }

    pub fn stations(&self) -> Result<Vec<String>> {
        self.store.stations()
    }

    pub fn station_status(&self, home_stations: &[String]) -> Result<Vec<StationStatus>> {
        let mut statuses = Vec::new();
        for station in self.store.stations()? {
            if let Some((start_date, end_date)) = self.store.date_range(&station)? {
                statuses.push(StationStatus {
                    is_home_station: home_stations.contains(&station),
                    station,
                    start_date,
                    end_date,
                });
            }
        }
        Ok(statuses)
    }
}

/// Group, reduce and round `records` as described by `query`.
pub fn aggregate_records(records: &[WeatherRecord], query: &WeatherQuery) -> WeatherData {
    let averaging = query.aggregate == AggregateMode::Average;
    let mut data = WeatherData::default();
    let mut day_counts: HashMap<(String, i32, String), DayCount> = HashMap::new();

    for record in records {
        let year = record.date.year();
        let group = query.grouping.key(record.date);
        let fully_missing = record.is_fully_missing();

        let fields = data
            .weather
            .entry(record.station.clone())
            .or_default()
            .entry(year)
            .or_default()
            .entry(group.clone())
            .or_default();

        for (field, extract) in FIELD_EXTRACTORS {
            if !query.wants(field) {
                continue;
            }
            let slot = fields.entry(field).or_default().entry(record.category).or_insert(None);
            if fully_missing && field != WeatherField::Missing {
                continue;
            }
            if let Some(value) = extract(record) {
                *slot = Some(match *slot {
                    None => value,
                    Some(accumulated) => combine(record.category, query.aggregate, accumulated, value),
                });
            }
        }

        if averaging && record.category == WeatherCategory::A {
            let count = day_counts.entry((record.station.clone(), year, group)).or_default();
            count.total += 1;
            if !fully_missing {
                count.with_data += 1;
            }
        }
    }

    for (station, years) in data.weather.iter_mut() {
        for (year, groups) in years.iter_mut() {
            for (group, fields) in groups.iter_mut() {
                let days = day_counts
                    .get(&(station.clone(), *year, group.clone()))
                    .copied()
                    .unwrap_or_default();
                for (field, categories) in fields.iter_mut() {
                    for (category, value) in categories.iter_mut() {
                        if averaging && *category == WeatherCategory::A {
                            let denominator = if *field == WeatherField::Missing {
                                days.total
                            } else {
                                days.with_data
                            };
                            *value = match (*value, denominator) {
                                (Some(sum), d) if d > 0 => Some(sum / d as f64),
                                _ => None,
                            };
                        }
                        *value = value.map(round_one_decimal);
                    }
                }
            }
        }
    }

    data
}

/// Highs keep the maximum and lows the minimum when averaging; everything
/// else is summed (averages are divided afterwards).
fn combine(category: WeatherCategory, mode: AggregateMode, accumulated: f64, value: f64) -> f64 {
    match (category, mode) {
        (WeatherCategory::H, AggregateMode::Average) => accumulated.max(value),
        (WeatherCategory::L, AggregateMode::Average) => accumulated.min(value),
        _ => accumulated + value,
    }
}
