pub mod aggregation;

pub use aggregation::{
    aggregate_records, AggregateMode, AggregationEngine, Grouping, StationStatus, WeatherData, WeatherQuery,
};
