use std::sync::Arc;

use time::{Date, OffsetDateTime};

use crate::analytics::RateDefaults;
use crate::domain::{NewRate, RateKind, RateRecord, Rates};
use crate::error::{AnalyticsError, StoreError};
use crate::store::RateStore;

/// Instant used when comparing a calendar date against rate boundaries.
pub fn start_of_day(date: Date) -> OffsetDateTime {
    date.midnight().assume_utc()
}

/// Historical cost and CO2 rates.
#[derive(Clone)]
pub struct RateBook {
    store: Arc<dyn RateStore>,
    defaults: RateDefaults,
}

impl RateBook {
    pub fn new(store: Arc<dyn RateStore>, defaults: RateDefaults) -> Self {
        Self { store, defaults }
    }

    /// The record in effect at the start of `date`. When none covers it a
    /// default record is stored first: open-ended if the kind has no history,
    /// otherwise closed at the start of the earliest known record. The default
    /// starts at the Unix epoch, or at `date` for earlier dates.
    pub async fn rate_active_on(&self, kind: RateKind, date: Date) -> Result<RateRecord, AnalyticsError> {
        let at = start_of_day(date);
        if let Some(rate) = self.store.rate_active_at(kind, at).await? {
            return Ok(rate);
        }

        let ended_at = self
            .store
            .earliest_rate(kind)
            .await?
            .map(|first| first.effective_from);
        let value = self.default_value(kind);

        tracing::warn!(
            kind = %kind,
            %date,
            value,
            "no rate on record for date, storing default"
        );

        let inserted = self
            .store
            .insert_rate(NewRate {
                kind,
                value,
                effective_from: at.min(OffsetDateTime::UNIX_EPOCH),
                ended_at,
            })
            .await?;

        // Another writer may have stored the default first; its row wins.
        match self.store.rate_active_at(kind, at).await? {
            Some(rate) => Ok(rate),
            None => inserted.ok_or_else(|| {
                StoreError::Corrupt(format!("no {kind} rate covers {date} after storing a default")).into()
            }),
        }
    }

    pub async fn rates_on(&self, date: Date) -> Result<Rates, AnalyticsError> {
        let cost = self.rate_active_on(RateKind::Cost, date).await?;
        let co2 = self.rate_active_on(RateKind::Co2, date).await?;
        Ok(Rates {
            cost_per_kwh: cost.value,
            co2_factor: co2.value,
        })
    }

    /// Ends the active record at `as_of` and starts a new one with `value`.
    pub async fn set_new_rate(
        &self,
        kind: RateKind,
        value: f64,
        as_of: OffsetDateTime,
    ) -> Result<RateRecord, AnalyticsError> {
        if !value.is_finite() || value < 0.0 {
            return Err(AnalyticsError::InvalidRate(format!(
                "{kind} rate must be a non-negative number, got {value}"
            )));
        }

        let history = self.store.rate_history(kind).await?;
        if let Some(open) = history.iter().find(|r| r.ended_at.is_none()) {
            if as_of < open.effective_from {
                return Err(AnalyticsError::InvalidRate(format!(
                    "{kind} rate cannot start at {as_of}, before the active record started ({})",
                    open.effective_from
                )));
            }
        }

        let record = self.store.replace_active_rate(kind, value, as_of).await?;
        tracing::info!(kind = %kind, value, %as_of, "rate updated");
        Ok(record)
    }

    pub async fn history(&self, kind: RateKind) -> Result<Vec<RateRecord>, AnalyticsError> {
        Ok(self.store.rate_history(kind).await?)
    }

    fn default_value(&self, kind: RateKind) -> f64 {
        match kind {
            RateKind::Cost => self.defaults.default_cost_per_kwh,
            RateKind::Co2 => self.defaults.default_co2_factor,
        }
    }
}
