pub mod reading_batch_file;
pub mod reading_csv_file;

pub use reading_batch_file::ReadingBatchFileSource;
pub use reading_csv_file::ReadingCsvFileSource;
