use anyhow::{bail, Result};
use energy_ingest::{config::AppConfig, jobs, observability};
use std::env;
use time::OffsetDateTime;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args = jobs::JobArgs::parse(env::args().skip(1))?;
    if args.week_start.is_some() {
        bail!("usage: rollup_aggregations [--device-id N] [--current-only]");
    }

    let cfg = AppConfig::load()?;
    let (store, services) = cfg.services().await?;

    let today = OffsetDateTime::now_utc().date();
    let devices = jobs::target_devices(store.as_ref(), args.device_id).await?;
    tracing::info!(%today, devices = devices.len(), current_only = args.current_only, "rolling up energy aggregations");

    let summary = jobs::run_rollups(&services, store.as_ref(), &devices, today, args.current_only).await;
    tracing::info!(
        devices = summary.devices,
        failed = summary.failed,
        "energy rollups finished"
    );

    if summary.devices > 0 && summary.failed == summary.devices {
        bail!("energy rollups failed for every device");
    }
    Ok(())
}
