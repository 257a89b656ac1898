use common::error::{AppError, Res};
use db::{
    dtos::{pickup::PickupSlotCreateRequest, settings::SettingsUpdateRequest},
    models::{pickup::PickupSlot, settings::SiteSettings},
};
use sqlx::PgPool;

/// Longest soft-close window an admin may configure.
const MAX_SOFT_CLOSE_SECONDS: i32 = 3_600;

pub fn validate_settings(data: &SettingsUpdateRequest) -> Res<()> {
    if let Some(seconds) = data.soft_close_seconds {
        if !(0..=MAX_SOFT_CLOSE_SECONDS).contains(&seconds) {
            return Err(AppError::BadRequest(format!(
                "Soft close must be between 0 and {} seconds",
                MAX_SOFT_CLOSE_SECONDS
            )));
        }
    }
    Ok(())
}

pub async fn update_settings(pool: &PgPool, data: SettingsUpdateRequest) -> Res<SiteSettings> {
    validate_settings(&data)?;
    let settings = db::settings::update_settings(pool, data).await?;
    log::info!(
        "Site settings updated: maintenance={} soft_close={}s",
        settings.maintenance_mode,
        settings.soft_close_seconds
    );
    Ok(settings)
}

pub fn validate_slot(data: &PickupSlotCreateRequest) -> Res<()> {
    if data.capacity <= 0 {
        return Err(AppError::BadRequest("Capacity must be positive".to_string()));
    }
    if data.ends_at <= data.starts_at {
        return Err(AppError::BadRequest("Slot must end after it starts".to_string()));
    }
    Ok(())
}

pub async fn create_pickup_slot(pool: &PgPool, data: PickupSlotCreateRequest) -> Res<PickupSlot> {
    validate_slot(&data)?;
    db::event::get_event_by_id(pool, data.event_id).await?;
    db::pickup::insert_slot(pool, data).await
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::*;

    #[test]
    fn soft_close_bounds() {
        let settings = |seconds| SettingsUpdateRequest {
            maintenance_mode: None,
            maintenance_message: None,
            soft_close_seconds: Some(seconds),
        };
        assert!(validate_settings(&settings(0)).is_ok());
        assert!(validate_settings(&settings(120)).is_ok());
        assert!(validate_settings(&settings(-1)).is_err());
        assert!(validate_settings(&settings(3_601)).is_err());
    }

    #[test]
    fn slot_needs_capacity_and_order() {
        let now = Utc::now();
        let mut slot = PickupSlotCreateRequest {
            event_id: Uuid::new_v4(),
            starts_at: now,
            ends_at: now + Duration::hours(2),
            capacity: 4,
        };
        assert!(validate_slot(&slot).is_ok());

        slot.capacity = 0;
        assert!(validate_slot(&slot).is_err());

        slot.capacity = 4;
        slot.ends_at = now - Duration::minutes(1);
        assert!(validate_slot(&slot).is_err());
    }
}
