pub mod device;
pub mod energy;
pub mod rate;
pub mod reading;
pub mod spike;
pub mod system_log;

pub use device::{Device, DeviceStatus};
pub use energy::{EnergyAggregation, EnergyMetrics, EnergyRecord, PeriodType};
pub use rate::{NewRate, RateKind, RateRecord, Rates};
pub use reading::{DeviceId, Reading, ReadingBatch};
pub use spike::{PowerSpike, WeeklySpikeAnalysis};
pub use system_log::{LogType, SystemLogEntry};
