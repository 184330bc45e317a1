pub mod config;
pub mod energy;
pub mod spike;
pub mod stats;

pub use config::{AnalyticsConfig, RateDefaults};
pub use spike::Baseline;
