pub mod reading_batch_sink;

pub use reading_batch_sink::ReadingBatchSink;
