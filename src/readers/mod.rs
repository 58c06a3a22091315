pub mod csv_header;
pub mod source;

pub use csv_header::{normalize_headers, CsvTable, HeaderIndex};
pub use source::CsvSource;
