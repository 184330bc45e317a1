use time::OffsetDateTime;

use super::reading::DeviceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogType {
    SpikeDetected,
    DataReceived,
}

impl LogType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SpikeDetected => "spike_detected",
            Self::DataReceived => "data_received",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SystemLogEntry {
    pub log_type: LogType,
    pub device_id: DeviceId,
    pub message: String,
    pub metadata: serde_json::Value,
    pub ts: OffsetDateTime,
}
