use anyhow::{bail, Result};
use energy_client::services::default_week_start;
use energy_ingest::{config::AppConfig, jobs, observability};
use std::env;
use time::OffsetDateTime;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args = jobs::JobArgs::parse(env::args().skip(1))?;
    let week_start = args
        .week_start
        .unwrap_or_else(|| default_week_start(OffsetDateTime::now_utc()));

    let cfg = AppConfig::load()?;
    let (store, services) = cfg.services().await?;

    let devices = jobs::target_devices(store.as_ref(), args.device_id).await?;
    tracing::info!(%week_start, devices = devices.len(), "running weekly spike analysis");

    let summary = jobs::run_weekly_analysis(&services, &devices, week_start).await;
    tracing::info!(
        devices = summary.devices,
        failed = summary.failed,
        "weekly spike analysis finished"
    );

    if summary.devices > 0 && summary.failed == summary.devices {
        bail!("weekly spike analysis failed for every device");
    }
    Ok(())
}
