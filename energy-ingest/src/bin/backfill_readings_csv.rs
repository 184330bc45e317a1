use anyhow::{bail, Result};
use energy_client::domain::ReadingBatch;
use energy_ingest::{
    config::AppConfig,
    observability,
    pipeline::Pipeline,
    sinks::ReadingBatchSink,
    sources::ReadingCsvFileSource,
    transform,
};
use std::{env, sync::Arc};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: backfill_readings_csv <csv_file_path>");
    }
    let file_path = &args[1];

    // Point ENERGY_CONFIG at a backfill-specific file to tune batch sizes.
    let cfg = AppConfig::load()?;
    let (store, services) = cfg.services().await?;

    let sink = ReadingBatchSink::new(
        services,
        store.clone(),
        store,
        cfg.ingest.batch_size,
        cfg.ingest.max_retries,
        cfg.ingest.retry_backoff(),
    );

    let pipeline: Pipeline<_, ReadingBatch, _> = Pipeline {
        source: ReadingCsvFileSource::new(file_path, cfg.ingest.batch_size),
        transforms: vec![Arc::new(transform::ReadingValidation)],
        sink,
    };

    let summary = pipeline.run().await?;
    tracing::info!(
        file = %file_path,
        batches = summary.batches,
        batches_failed = summary.batches_failed,
        readings_stored = summary.readings_stored,
        energy_records = summary.energy_records,
        "csv backfill finished"
    );

    Ok(())
}
