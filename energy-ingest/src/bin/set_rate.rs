use anyhow::{bail, Context, Result};
use energy_client::domain::RateKind;
use energy_ingest::{config::AppConfig, observability};
use std::env;
use time::OffsetDateTime;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        bail!("usage: set_rate <cost|co2> <value>");
    }
    let Some(kind) = RateKind::parse(&args[1]) else {
        bail!("unknown rate kind '{}', expected cost or co2", args[1]);
    };
    let value: f64 = args[2]
        .parse()
        .with_context(|| format!("invalid rate value '{}'", args[2]))?;

    let cfg = AppConfig::load()?;
    let (_, services) = cfg.services().await?;

    let record = services
        .rates
        .set_new_rate(kind, value, OffsetDateTime::now_utc())
        .await?;

    for r in services.rates.history(kind).await? {
        tracing::info!(
            id = r.id,
            value = r.value,
            effective_from = %r.effective_from,
            ended_at = ?r.ended_at,
            "{kind} rate"
        );
    }
    tracing::info!(id = record.id, %kind, value = record.value, "new rate active");

    Ok(())
}
