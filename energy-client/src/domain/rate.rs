use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateKind {
    /// Currency per kWh.
    Cost,
    /// kg CO2 per kWh.
    Co2,
}

impl RateKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cost => "cost",
            Self::Co2 => "co2",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cost" => Some(Self::Cost),
            "co2" => Some(Self::Co2),
            _ => None,
        }
    }
}

impl std::fmt::Display for RateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A time-bounded rate. `ended_at == None` marks the active record.
#[derive(Debug, Clone, PartialEq)]
pub struct RateRecord {
    pub id: i64,
    pub kind: RateKind,
    pub value: f64,
    pub effective_from: OffsetDateTime,
    pub ended_at: Option<OffsetDateTime>,
}

impl RateRecord {
    pub fn is_active_at(&self, at: OffsetDateTime) -> bool {
        self.effective_from <= at && self.ended_at.map_or(true, |end| end > at)
    }
}

/// A rate record that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRate {
    pub kind: RateKind,
    pub value: f64,
    pub effective_from: OffsetDateTime,
    pub ended_at: Option<OffsetDateTime>,
}

/// Cost and CO2 rates resolved for one date.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rates {
    pub cost_per_kwh: f64,
    pub co2_factor: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn end_bound_is_exclusive() {
        let r = RateRecord {
            id: 1,
            kind: RateKind::Cost,
            value: 10.0,
            effective_from: datetime!(2024-01-01 00:00:00 UTC),
            ended_at: Some(datetime!(2024-01-05 00:00:00 UTC)),
        };
        assert!(r.is_active_at(datetime!(2024-01-01 00:00:00 UTC)));
        assert!(r.is_active_at(datetime!(2024-01-04 23:59:59 UTC)));
        assert!(!r.is_active_at(datetime!(2024-01-05 00:00:00 UTC)));
        assert!(!r.is_active_at(datetime!(2023-12-31 00:00:00 UTC)));
    }

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!(RateKind::parse("CO2"), Some(RateKind::Co2));
        assert_eq!(RateKind::parse(" cost "), Some(RateKind::Cost));
        assert_eq!(RateKind::parse("tariff"), None);
    }
}
