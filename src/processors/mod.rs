pub mod fine_scale_processor;
pub mod orchestrator;
pub mod summary_processor;

pub use fine_scale_processor::{
    missing_percent_for, parse_zoned_timestamp, FineScaleFileProcessor, FineScaleFileStats, FineScaleReport,
};
pub use orchestrator::{IngestionOrchestrator, IngestionReport};
pub use summary_processor::{SummaryBatchReport, SummaryFileProcessor, SummaryFileStats};
