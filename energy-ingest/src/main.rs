use anyhow::{bail, Result};
use energy_client::domain::ReadingBatch;
use energy_ingest::{
    config::AppConfig,
    metrics_server,
    observability,
    pipeline::Pipeline,
    sinks::ReadingBatchSink,
    sources::ReadingBatchFileSource,
    transform,
};
use std::{env, sync::Arc};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: energy-ingest <ndjson_file_path>");
    }
    let file_path = &args[1];

    let cfg = AppConfig::load()?;

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

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
        source: ReadingBatchFileSource::new(file_path),
        transforms: vec![Arc::new(transform::ReadingValidation)],
        sink,
    };

    let summary = pipeline.run().await?;
    tracing::info!(
        file = %file_path,
        batches = summary.batches,
        batches_failed = summary.batches_failed,
        readings_stored = summary.readings_stored,
        spikes = summary.spikes,
        energy_records = summary.energy_records,
        "ingest finished"
    );

    Ok(())
}
