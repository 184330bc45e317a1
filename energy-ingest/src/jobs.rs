//! Scheduled passes over the device registry: weekly spike analysis and
//! period rollups. One device failing never stops the pass.

use anyhow::{bail, Context};
use energy_client::{
    domain::{Device, DeviceId, DeviceStatus, PeriodType},
    store::{DeviceRegistry, ReadingStore},
    AnalyticsError, Services,
};
use time::{macros::format_description, Date};

/// Flags shared by the job binaries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobArgs {
    pub device_id: Option<DeviceId>,
    pub week_start: Option<Date>,
    pub current_only: bool,
}

impl JobArgs {
    /// Parses `--device-id N`, `--week-start YYYY-MM-DD` and `--current-only`.
    pub fn parse<I>(args: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut parsed = Self::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--device-id" => {
                    let raw = args.next().context("--device-id needs a value")?;
                    let id = raw
                        .parse()
                        .with_context(|| format!("invalid device id '{raw}'"))?;
                    parsed.device_id = Some(id);
                }
                "--week-start" => {
                    let raw = args.next().context("--week-start needs a value")?;
                    let date = Date::parse(&raw, format_description!("[year]-[month]-[day]"))
                        .with_context(|| format!("invalid week start '{raw}', expected YYYY-MM-DD"))?;
                    parsed.week_start = Some(date);
                }
                "--current-only" => parsed.current_only = true,
                other => bail!("unknown argument '{other}'"),
            }
        }
        Ok(parsed)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobSummary {
    pub devices: usize,
    pub failed: usize,
}

/// The requested device, or every active device when none is named.
pub async fn target_devices(
    registry: &dyn DeviceRegistry,
    device_id: Option<DeviceId>,
) -> Result<Vec<Device>, AnalyticsError> {
    match device_id {
        Some(id) => match registry.find_device(id).await? {
            Some(device) => Ok(vec![device]),
            None => Err(AnalyticsError::DeviceNotFound(id)),
        },
        None => Ok(registry.list_devices(Some(DeviceStatus::Active)).await?),
    }
}

pub async fn run_weekly_analysis(services: &Services, devices: &[Device], week_start: Date) -> JobSummary {
    let mut summary = JobSummary::default();
    for device in devices {
        summary.devices += 1;
        match services
            .spikes
            .generate_weekly_analysis(device.device_id, week_start)
            .await
        {
            Ok(analysis) => tracing::info!(
                device = %device.display_name(),
                %week_start,
                spike_count = analysis.spike_count,
                interpretation = %analysis.interpretation,
                "weekly analysis done"
            ),
            Err(e) => {
                summary.failed += 1;
                tracing::error!(error = %e, device = %device.display_name(), "weekly analysis failed");
            }
        }
    }
    summary
}

/// Upserts the monthly and yearly rollups of one device. With
/// `current_only` only the periods containing `today` are rebuilt,
/// otherwise every period since the device's first reading.
pub async fn rollup_device(
    services: &Services,
    readings: &dyn ReadingStore,
    device_id: DeviceId,
    today: Date,
    current_only: bool,
) -> Result<usize, AnalyticsError> {
    let from = if current_only {
        today
    } else {
        match readings.first_reading_date(device_id).await? {
            Some(first) => first,
            None => return Ok(0),
        }
    };

    let mut upserted = 0;
    for period_type in [PeriodType::Monthly, PeriodType::Yearly] {
        let mut cursor = from;
        while cursor <= today {
            if services
                .aggregator
                .rollup_period(device_id, period_type, cursor)
                .await?
                .is_some()
            {
                upserted += 1;
            }
            match period_type.bounds(cursor) {
                Some((_, next)) => cursor = next,
                None => break,
            }
        }
    }
    Ok(upserted)
}

pub async fn run_rollups(
    services: &Services,
    readings: &dyn ReadingStore,
    devices: &[Device],
    today: Date,
    current_only: bool,
) -> JobSummary {
    let mut summary = JobSummary::default();
    for device in devices {
        summary.devices += 1;
        match rollup_device(services, readings, device.device_id, today, current_only).await {
            Ok(periods) => tracing::info!(device = %device.display_name(), periods, "rollups done"),
            Err(e) => {
                summary.failed += 1;
                tracing::error!(error = %e, device = %device.display_name(), "rollups failed");
            }
        }
    }
    summary
}
