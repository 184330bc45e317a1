use sqlx::PgPool;

use crate::domain::{Device, DeviceId, DeviceStatus};
use crate::error::StoreError;

#[derive(Debug, sqlx::FromRow)]
struct DeviceRow {
    device_id: DeviceId,
    name: Option<String>,
    status: String,
}

impl TryFrom<DeviceRow> for Device {
    type Error = StoreError;

    fn try_from(row: DeviceRow) -> Result<Self, Self::Error> {
        let status = DeviceStatus::parse(&row.status)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown device status '{}'", row.status)))?;
        Ok(Device::new(row.device_id, row.name, status))
    }
}

pub async fn find_device(pool: &PgPool, device_id: DeviceId) -> Result<Option<Device>, StoreError> {
    let row = sqlx::query_as::<_, DeviceRow>(
        "SELECT device_id, name, status FROM devices WHERE device_id = $1",
    )
    .bind(device_id)
    .fetch_optional(pool)
    .await?;

    row.map(Device::try_from).transpose()
}

pub async fn list_devices(pool: &PgPool, status: Option<DeviceStatus>) -> Result<Vec<Device>, StoreError> {
    let rows = sqlx::query_as::<_, DeviceRow>(
        r#"
        SELECT device_id, name, status
        FROM devices
        WHERE $1::TEXT IS NULL OR status = $1
        ORDER BY device_id
        "#,
    )
    .bind(status.map(DeviceStatus::as_str))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Device::try_from).collect()
}
