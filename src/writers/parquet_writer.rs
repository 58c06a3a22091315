use crate::error::{ProcessingError, Result};
use crate::models::{WeatherCategory, WeatherRecord};
use crate::utils::constants::DEFAULT_ROW_GROUP_SIZE;
use arrow::array::*;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{Datelike, NaiveDate};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// Days from 0001-01-01 (CE) to 1970-01-01, the Date32 origin.
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Columns that carry optional numeric measurements, in schema order.
const MEASUREMENT_COLUMNS: [&str; 8] = [
    "temperature",
    "wind_speed",
    "wind_max",
    "rain_rate",
    "rain_daily",
    "pressure",
    "humidity",
    "uv_index",
];

/// Reads and writes the record store snapshot.
pub struct ParquetWriter {
    compression: Compression,
    row_group_size: usize,
}

impl ParquetWriter {
    pub fn new() -> Self {
        Self {
            compression: Compression::SNAPPY,
            row_group_size: DEFAULT_ROW_GROUP_SIZE,
        }
    }

    pub fn with_compression(mut self, compression: &str) -> Result<Self> {
        self.compression = match compression.to_lowercase().as_str() {
            "snappy" => Compression::SNAPPY,
            "gzip" => Compression::GZIP(GzipLevel::default()),
            "lz4" => Compression::LZ4,
            "zstd" => Compression::ZSTD(ZstdLevel::default()),
            "none" => Compression::UNCOMPRESSED,
            _ => {
                return Err(ProcessingError::Config(format!(
                    "Unsupported compression: {}",
                    compression
                )))
            }
        };
        Ok(self)
    }

    pub fn with_row_group_size(mut self, size: usize) -> Self {
        self.row_group_size = size;
        self
    }

    /// Write weather records to a Parquet file, one row per record.
    pub fn write_records(&self, records: &[WeatherRecord], path: &Path) -> Result<()> {
        let schema = Self::schema();
        let file = File::create(path)?;
        let props = WriterProperties::builder()
            .set_compression(self.compression)
            .set_max_row_group_size(self.row_group_size)
            .build();

        let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(props))?;
        for chunk in records.chunks(self.row_group_size.max(1)) {
            let batch = Self::records_to_batch(chunk, schema.clone())?;
            writer.write(&batch)?;
        }
        writer.close()?;

        Ok(())
    }

    fn schema() -> Arc<Schema> {
        let mut fields = vec![
            Field::new("station", DataType::Utf8, false),
            Field::new("date", DataType::Date32, false),
            Field::new("category", DataType::Utf8, false),
            Field::new("wind_direction", DataType::Utf8, false),
            Field::new("missing_percent", DataType::Float64, false),
        ];
        fields.extend(
            MEASUREMENT_COLUMNS
                .iter()
                .map(|name| Field::new(*name, DataType::Float64, true)),
        );

        Arc::new(Schema::new(fields))
    }

    fn measurement_values(record: &WeatherRecord) -> [Option<f64>; 8] {
        [
            record.temperature,
            record.wind_speed,
            record.wind_max,
            record.rain_rate,
            record.rain_daily,
            record.pressure,
            record.humidity,
            record.uv_index,
        ]
    }

    fn records_to_batch(records: &[WeatherRecord], schema: Arc<Schema>) -> Result<RecordBatch> {
        let stations = StringArray::from_iter_values(records.iter().map(|r| r.station.as_str()));
        let dates = Date32Array::from_iter_values(
            records
                .iter()
                .map(|r| r.date.num_days_from_ce() - EPOCH_DAYS_FROM_CE),
        );
        let categories = StringArray::from_iter_values(records.iter().map(|r| r.category.code()));
        let directions = StringArray::from_iter_values(records.iter().map(|r| r.wind_direction.as_str()));
        let missing = Float64Array::from_iter_values(records.iter().map(|r| r.missing_percent));

        let mut columns: Vec<ArrayRef> = vec![
            Arc::new(stations),
            Arc::new(dates),
            Arc::new(categories),
            Arc::new(directions),
            Arc::new(missing),
        ];
        for index in 0..MEASUREMENT_COLUMNS.len() {
            let values: Float64Array = records
                .iter()
                .map(|r| Self::measurement_values(r)[index])
                .collect();
            columns.push(Arc::new(values));
        }

        Ok(RecordBatch::try_new(schema, columns)?)
    }

    /// Read every record back from a snapshot written by [`write_records`](Self::write_records).
    pub fn read_records(&self, path: &Path) -> Result<Vec<WeatherRecord>> {
        let file = File::open(path)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

        let mut records = Vec::new();
        for batch_result in reader {
            let batch = batch_result?;

            let stations = string_column(&batch, "station")?;
            let dates = batch
                .column_by_name("date")
                .and_then(|c| c.as_any().downcast_ref::<Date32Array>())
                .ok_or_else(|| invalid_column("date"))?;
            let categories = string_column(&batch, "category")?;
            let directions = string_column(&batch, "wind_direction")?;
            let missing = float_column(&batch, "missing_percent")?;
            let measurements = MEASUREMENT_COLUMNS
                .iter()
                .map(|name| float_column(&batch, name))
                .collect::<Result<Vec<_>>>()?;

            for row in 0..batch.num_rows() {
                let date = NaiveDate::from_num_days_from_ce_opt(dates.value(row) + EPOCH_DAYS_FROM_CE)
                    .ok_or_else(|| {
                        ProcessingError::InvalidFormat(format!("Date out of range: {}", dates.value(row)))
                    })?;
                let value = |column: usize| -> Option<f64> {
                    let array = measurements[column];
                    (!array.is_null(row)).then(|| array.value(row))
                };

                records.push(WeatherRecord {
                    station: stations.value(row).to_string(),
                    date,
                    category: categories.value(row).parse::<WeatherCategory>()?,
                    temperature: value(0),
                    wind_speed: value(1),
                    wind_max: value(2),
                    wind_direction: directions.value(row).to_string(),
                    rain_rate: value(3),
                    rain_daily: value(4),
                    pressure: value(5),
                    humidity: value(6),
                    uv_index: value(7),
                    missing_percent: missing.value(row),
                });
            }
        }

        Ok(records)
    }

    /// Get file metadata and statistics
    pub fn get_file_info(&self, path: &Path) -> Result<ParquetFileInfo> {
        use parquet::file::reader::{FileReader, SerializedFileReader};

        let file = File::open(path)?;
        let reader = SerializedFileReader::new(file)?;
        let metadata = reader.metadata();

        let row_groups = metadata.num_row_groups();
        let row_group_sizes = (0..row_groups)
            .map(|i| metadata.row_group(i).num_rows())
            .collect();

        Ok(ParquetFileInfo {
            total_rows: metadata.file_metadata().num_rows(),
            row_groups: row_groups as i32,
            row_group_sizes,
            file_size: std::fs::metadata(path)?.len(),
            compression: self.compression,
        })
    }
}

fn invalid_column(name: &str) -> ProcessingError {
    ProcessingError::InvalidFormat(format!("Invalid or missing '{}' column in snapshot", name))
}

fn string_column<'b>(batch: &'b RecordBatch, name: &str) -> Result<&'b StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| invalid_column(name))
}

fn float_column<'b>(batch: &'b RecordBatch, name: &str) -> Result<&'b Float64Array> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Float64Array>())
        .ok_or_else(|| invalid_column(name))
}

impl Default for ParquetWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct ParquetFileInfo {
    pub total_rows: i64,
    pub row_groups: i32,
    pub row_group_sizes: Vec<i64>,
    pub file_size: u64,
    pub compression: Compression,
}

impl ParquetFileInfo {
    pub fn summary(&self) -> String {
        format!(
            "Snapshot: {} records in {} row groups, {:.2} MB ({:?})",
            self.total_rows,
            self.row_groups,
            self.file_size as f64 / 1_048_576.0,
            self.compression,
        )
    }
}
