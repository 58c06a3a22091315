pub mod field;
pub mod weather;

pub use field::{FieldExtractor, WeatherField, FIELD_EXTRACTORS};
pub use weather::{Measurements, RecordKey, WeatherCategory, WeatherRecord};
