use common::error::{AppError, Res};
use db::models::settings::SiteSettings;
use sqlx::PgPool;

const DEFAULT_MESSAGE: &str = "Bidding is paused for maintenance. Please try again shortly.";

/// Site settings, or 503 while maintenance mode is on.
pub async fn ensure_open(pool: &PgPool) -> Res<SiteSettings> {
    let settings = db::settings::get_settings(pool).await?;
    check_open(settings)
}

fn check_open(settings: SiteSettings) -> Res<SiteSettings> {
    if settings.maintenance_mode {
        let message = settings
            .maintenance_message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MESSAGE.to_string());
        return Err(AppError::ServiceUnavailable(message));
    }
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn settings(maintenance_mode: bool, message: Option<&str>) -> SiteSettings {
        SiteSettings {
            maintenance_mode,
            maintenance_message: message.map(str::to_string),
            soft_close_seconds: 120,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn open_site_passes_through() {
        let settings = check_open(settings(false, Some("ignored"))).unwrap();
        assert_eq!(settings.soft_close_seconds, 120);
    }

    #[test]
    fn maintenance_uses_custom_message() {
        match check_open(settings(true, Some("Back at 5pm"))) {
            Err(AppError::ServiceUnavailable(m)) => assert_eq!(m, "Back at 5pm"),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn maintenance_falls_back_to_default_message() {
        match check_open(settings(true, Some("  "))) {
            Err(AppError::ServiceUnavailable(m)) => assert_eq!(m, DEFAULT_MESSAGE),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }
}
