use time::{Date, Duration, Month};

use super::reading::DeviceId;

/// Daily energy summary for one device.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct EnergyRecord {
    pub device_id: DeviceId,
    pub date: Date,
    pub total_energy_kwh: f64,
    pub peak_power_w: f64,
    pub cost_estimate: f64,
    pub carbon_emission_kgco2: f64,
}

/// Energy, cost and CO2 totals over an arbitrary set of readings.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnergyMetrics {
    pub energy_kwh: f64,
    pub cost: f64,
    pub co2: f64,
}

impl std::ops::AddAssign for EnergyMetrics {
    fn add_assign(&mut self, rhs: Self) {
        self.energy_kwh += rhs.energy_kwh;
        self.cost += rhs.cost;
        self.co2 += rhs.co2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeriodType {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl PeriodType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "monthly" => Some(Self::Monthly),
            "yearly" => Some(Self::Yearly),
            _ => None,
        }
    }

    /// Half-open `[start, end)` date range of the period containing `date`.
    /// Weeks start on Monday.
    pub fn bounds(self, date: Date) -> Option<(Date, Date)> {
        match self {
            Self::Daily => Some((date, date.next_day()?)),
            Self::Weekly => {
                let start =
                    date - Duration::days(date.weekday().number_days_from_monday() as i64);
                Some((start, start + Duration::days(7)))
            }
            Self::Monthly => {
                let start = date.replace_day(1).ok()?;
                let (year, month) = match date.month() {
                    Month::December => (date.year() + 1, Month::January),
                    m => (date.year(), m.next()),
                };
                Some((start, Date::from_calendar_date(year, month, 1).ok()?))
            }
            Self::Yearly => Some((
                Date::from_calendar_date(date.year(), Month::January, 1).ok()?,
                Date::from_calendar_date(date.year() + 1, Month::January, 1).ok()?,
            )),
        }
    }
}

/// Rolled-up totals for one device over a calendar period.
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyAggregation {
    pub device_id: DeviceId,
    pub period_start: Date,
    pub period_type: PeriodType,
    pub total_energy_kwh: f64,
    pub peak_power_w: f64,
    pub total_cost: f64,
    pub total_co2: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn month_bounds_roll_over_the_year() {
        assert_eq!(
            PeriodType::Monthly.bounds(date!(2024 - 12 - 17)),
            Some((date!(2024 - 12 - 01), date!(2025 - 01 - 01)))
        );
        assert_eq!(
            PeriodType::Monthly.bounds(date!(2024 - 02 - 29)),
            Some((date!(2024 - 02 - 01), date!(2024 - 03 - 01)))
        );
    }

    #[test]
    fn week_bounds_start_on_monday() {
        // 2024-03-07 is a Thursday.
        assert_eq!(
            PeriodType::Weekly.bounds(date!(2024 - 03 - 07)),
            Some((date!(2024 - 03 - 04), date!(2024 - 03 - 11)))
        );
    }

    #[test]
    fn year_bounds() {
        assert_eq!(
            PeriodType::Yearly.bounds(date!(2023 - 06 - 15)),
            Some((date!(2023 - 01 - 01), date!(2024 - 01 - 01)))
        );
    }
}
