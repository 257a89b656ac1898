use std::collections::HashMap;

use chrono::Utc;
use common::{
    error::{AppError, Res},
    misc::{EventStatus, RegistrationStatus},
    payments::{Hold, HoldGateway, HoldRequest},
};
use db::{
    dtos::registration::RegistrationUpsert,
    models::{event::AuctionEvent, profile::Profile, registration::Registration},
};
use notifier::{Notifier, templates};
use sqlx::PgPool;
use uuid::Uuid;

use crate::services::{holds, maintenance, rules};

/// What to do with an existing registration when the user registers again.
#[derive(Debug, PartialEq)]
enum Existing {
    /// Nothing stored yet, or the old one was released.
    New,
    /// Still authorized and within hold validity.
    Keep,
    /// Authorized but the hold has lapsed. The old intent is released first.
    Renew(Option<String>),
}

fn classify(existing: Option<&Registration>) -> Res<Existing> {
    let Some(registration) = existing else {
        return Ok(Existing::New);
    };

    match RegistrationStatus::from_str(&registration.status)? {
        RegistrationStatus::Authorized if rules::registration_usable(registration, Utc::now()) => {
            Ok(Existing::Keep)
        }
        RegistrationStatus::Authorized => Ok(Existing::Renew(
            registration.stripe_payment_intent_id.clone(),
        )),
        RegistrationStatus::Released => Ok(Existing::New),
        RegistrationStatus::Captured | RegistrationStatus::Cancelled => Err(AppError::Forbidden(
            "Your registration for this event was closed. Please contact support.".to_string(),
        )),
    }
}

/// Distinguishes successive holds of the same user for the same event.
/// Derived from the previous authorization so a retried request reuses it.
fn attempt(existing: Option<&Registration>) -> i64 {
    existing
        .and_then(|r| r.authorized_at)
        .map(|at| at.timestamp())
        .unwrap_or(0)
}

fn ensure_open_for_registration(event: &AuctionEvent) -> Res<()> {
    match EventStatus::from_str(&event.status)? {
        EventStatus::Scheduled | EventStatus::Live => Ok(()),
        _ => Err(AppError::BadRequest(
            "This event is not open for registration".to_string(),
        )),
    }
}

/// Customer id and default card of the bidder.
pub async fn billing_details(gateway: &dyn HoldGateway, profile: &Profile) -> Res<(String, String)> {
    let customer_id = profile.stripe_customer_id.clone().ok_or_else(|| {
        AppError::BadRequest("Add a payment method before registering".to_string())
    })?;
    let payment_method_id = gateway
        .default_card(&customer_id)
        .await?
        .ok_or_else(|| AppError::BadRequest("Add a payment method before registering".to_string()))?;
    Ok((customer_id, payment_method_id))
}

async fn place_deposit(
    gateway: &dyn HoldGateway,
    event: &AuctionEvent,
    user_id: Uuid,
    customer_id: String,
    payment_method_id: String,
    attempt: i64,
) -> Res<Hold> {
    gateway
        .place_hold(HoldRequest {
            customer_id,
            payment_method_id,
            amount: event.deposit_amount,
            description: format!("Bidding deposit: {}", event.title),
            idempotency_key: format!("deposit:{}:{}:{}", event.id, user_id, attempt),
            metadata: HashMap::from([
                ("purpose".to_string(), "deposit".to_string()),
                ("event_id".to_string(), event.id.to_string()),
                ("user_id".to_string(), user_id.to_string()),
            ]),
        })
        .await
}

async fn release_quietly(gateway: &dyn HoldGateway, payment_intent_id: &str) {
    let key = holds::release_key(payment_intent_id);
    if let Err(e) = gateway.release_hold(payment_intent_id, &key).await {
        log::error!("Failed to release deposit hold {}: {}", payment_intent_id, e);
    }
}

/// Registers the user to bid in an event, placing the deposit hold.
pub async fn register_for_event(
    pool: &PgPool,
    gateway: &dyn HoldGateway,
    notifier: &Notifier,
    user_id: Uuid,
    event_id: Uuid,
) -> Res<Registration> {
    maintenance::ensure_open(pool).await?;

    let event = db::event::get_event_by_id(pool, event_id).await?;
    ensure_open_for_registration(&event)?;
    let profile = db::profile::get_profile_by_id(pool, user_id).await?;

    let existing = db::registration::get_registration(pool, event_id, user_id).await?;
    let previous_intent = match classify(existing.as_ref())? {
        Existing::Keep => {
            return existing.ok_or_else(|| AppError::Internal("Registration vanished".to_string()));
        }
        Existing::Renew(intent) => intent,
        Existing::New => None,
    };

    let billing = if event.deposit_amount > 0 {
        Some(billing_details(gateway, &profile).await?)
    } else {
        None
    };

    if let Some(intent) = previous_intent.as_deref() {
        release_quietly(gateway, intent).await;
    }

    let hold = match billing {
        Some((customer_id, payment_method_id)) => Some(
            place_deposit(
                gateway,
                &event,
                user_id,
                customer_id,
                payment_method_id,
                attempt(existing.as_ref()),
            )
            .await?,
        ),
        None => None,
    };

    let upsert = RegistrationUpsert {
        event_id,
        user_id,
        stripe_payment_intent_id: hold.as_ref().map(|h| h.payment_intent_id.clone()),
        deposit_amount: hold.as_ref().map(|h| h.amount).unwrap_or(0),
    };
    let registration = match db::registration::upsert_authorized(pool, upsert).await {
        Ok(registration) => registration,
        Err(e) => {
            if let Some(hold) = &hold {
                log::warn!(
                    "Registration write failed for {} in {}, releasing hold {}",
                    user_id,
                    event_id,
                    hold.payment_intent_id
                );
                release_quietly(gateway, &hold.payment_intent_id).await;
            }
            return Err(e);
        }
    };

    log::info!(
        "User {} registered for event {} with deposit {}",
        user_id,
        event_id,
        registration.deposit_amount
    );

    notifier
        .send(
            &profile.email,
            templates::registration_confirmed(
                &profile.first_name,
                &event.title,
                registration.deposit_amount,
                &event.starts_at,
                &notifier.url(&format!("events/{}", event.id)),
            ),
        )
        .await;

    Ok(registration)
}

pub async fn get_my_registration(
    pool: &PgPool,
    user_id: Uuid,
    event_id: Uuid,
) -> Res<Registration> {
    db::registration::get_registration(pool, event_id, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Registration not found".to_string()))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use common::payments::testing::FakeGateway;

    use super::*;
    use crate::testing;

    fn registration(status: RegistrationStatus, age_days: i64, deposit: i64) -> Registration {
        let now = Utc::now();
        Registration {
            id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            status: status.as_str().to_string(),
            stripe_payment_intent_id: (deposit > 0).then(|| "pi_old".to_string()),
            deposit_amount: deposit,
            authorized_at: Some(now - Duration::days(age_days)),
            created_at: now,
            updated_at: now,
        }
    }

    fn event(deposit_amount: i64, status: EventStatus) -> AuctionEvent {
        let now = Utc::now();
        AuctionEvent {
            id: Uuid::new_v4(),
            title: "Plant closure: Dayton".to_string(),
            description: None,
            location: None,
            starts_at: now,
            ends_at: now + Duration::days(2),
            deposit_amount,
            status: status.as_str().to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn fresh_authorization_is_kept() {
        let reg = registration(RegistrationStatus::Authorized, 1, 50_000);
        assert_eq!(classify(Some(&reg)).unwrap(), Existing::Keep);
        assert_eq!(classify(None).unwrap(), Existing::New);
    }

    #[test]
    fn expired_authorization_is_renewed() {
        let reg = registration(RegistrationStatus::Authorized, 8, 50_000);
        assert_eq!(
            classify(Some(&reg)).unwrap(),
            Existing::Renew(Some("pi_old".to_string()))
        );
    }

    #[test]
    fn zero_deposit_never_expires() {
        let reg = registration(RegistrationStatus::Authorized, 30, 0);
        assert_eq!(classify(Some(&reg)).unwrap(), Existing::Keep);
    }

    #[test]
    fn forfeited_registration_is_refused() {
        let reg = registration(RegistrationStatus::Captured, 1, 50_000);
        assert!(matches!(classify(Some(&reg)), Err(AppError::Forbidden(_))));
        let released = registration(RegistrationStatus::Released, 1, 50_000);
        assert_eq!(classify(Some(&released)).unwrap(), Existing::New);
    }

    #[test]
    fn attempt_changes_with_each_authorization() {
        let reg = registration(RegistrationStatus::Authorized, 8, 50_000);
        assert_eq!(attempt(None), 0);
        assert_ne!(attempt(Some(&reg)), 0);
    }

    #[test]
    fn only_scheduled_or_live_events_accept_registrations() {
        assert!(ensure_open_for_registration(&event(0, EventStatus::Scheduled)).is_ok());
        assert!(ensure_open_for_registration(&event(0, EventStatus::Live)).is_ok());
        for status in [EventStatus::Draft, EventStatus::Completed, EventStatus::Cancelled] {
            assert!(ensure_open_for_registration(&event(0, status)).is_err());
        }
    }

    #[tokio::test]
    async fn deposit_hold_uses_event_amount_and_key() {
        let gateway = FakeGateway::default();
        let event = event(75_000, EventStatus::Scheduled);
        let user_id = Uuid::new_v4();

        let hold = place_deposit(
            &gateway,
            &event,
            user_id,
            "cus_1".to_string(),
            "pm_1".to_string(),
            0,
        )
        .await
        .unwrap();

        assert_eq!(hold.amount, 75_000);
        let placed = gateway.placed.lock().unwrap();
        assert_eq!(
            placed[0].idempotency_key,
            format!("deposit:{}:{}:0", event.id, user_id)
        );
    }

    #[tokio::test]
    async fn missing_default_card_is_a_bad_request() {
        let gateway = FakeGateway {
            no_default_card: true,
            ..Default::default()
        };
        let now = Utc::now();
        let profile = Profile {
            id: Uuid::new_v4(),
            email: "buyer@example.com".to_string(),
            first_name: "Sam".to_string(),
            last_name: "Ortiz".to_string(),
            company_name: None,
            phone: None,
            role: "bidder".to_string(),
            stripe_customer_id: Some("cus_1".to_string()),
            email_verified: true,
            verified: true,
            created_at: now,
            updated_at: now,
        };

        assert!(matches!(
            billing_details(&gateway, &profile).await,
            Err(AppError::BadRequest(_))
        ));

        let without_customer = Profile {
            stripe_customer_id: None,
            ..profile
        };
        assert!(matches!(
            billing_details(&FakeGateway::default(), &without_customer).await,
            Err(AppError::BadRequest(_))
        ));
    }

    async fn open_event(pool: &PgPool, deposit_amount: i64) -> AuctionEvent {
        let now = Utc::now();
        testing::event(
            pool,
            EventStatus::Scheduled,
            deposit_amount,
            now + Duration::days(1),
            now + Duration::days(2),
        )
        .await
    }

    #[sqlx::test(migrations = "../db/migrations")]
    async fn deposit_is_held_once_per_authorization(pool: PgPool) {
        let event = open_event(&pool, 50_000).await;
        let profile = testing::bidder(&pool).await;
        let gateway = FakeGateway::default();
        let (notifier, mailer) = testing::notifier();

        let first = register_for_event(&pool, &gateway, &notifier, profile.id, event.id)
            .await
            .unwrap();
        assert_eq!(first.status, RegistrationStatus::Authorized.as_str());
        assert_eq!(first.deposit_amount, 50_000);
        assert_eq!(first.stripe_payment_intent_id.as_deref(), Some("pi_fake_1"));

        let again = register_for_event(&pool, &gateway, &notifier, profile.id, event.id)
            .await
            .unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(gateway.placed.lock().unwrap().len(), 1);
        assert_eq!(mailer.subjects().len(), 1);
    }

    #[sqlx::test(migrations = "../db/migrations")]
    async fn lapsed_deposit_is_replaced(pool: PgPool) {
        let event = open_event(&pool, 50_000).await;
        let profile = testing::bidder(&pool).await;
        let old = testing::registration(&pool, event.id, profile.id, Some("pi_old"), 50_000).await;
        sqlx::query("UPDATE event_registrations SET authorized_at = now() - interval '8 days' WHERE id = $1")
            .bind(old.id)
            .execute(&pool)
            .await
            .unwrap();
        let gateway = FakeGateway::default();
        let (notifier, _) = testing::notifier();

        let renewed = register_for_event(&pool, &gateway, &notifier, profile.id, event.id)
            .await
            .unwrap();

        assert_eq!(renewed.id, old.id);
        assert_eq!(renewed.stripe_payment_intent_id.as_deref(), Some("pi_fake_1"));
        assert_eq!(*gateway.released.lock().unwrap(), vec!["pi_old"]);
        assert!(!rules::hold_expired(renewed.authorized_at, Utc::now()));
    }

    #[sqlx::test(migrations = "../db/migrations")]
    async fn failed_write_gives_the_deposit_back(pool: PgPool) {
        let event = open_event(&pool, 50_000).await;
        let profile = testing::bidder(&pool).await;
        sqlx::query(
            r#"
            CREATE FUNCTION refuse_registration() RETURNS trigger AS $$
            BEGIN RAISE EXCEPTION 'registrations are read-only'; END
            $$ LANGUAGE plpgsql
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            r#"
            CREATE TRIGGER refuse_registration BEFORE INSERT OR UPDATE ON event_registrations
            FOR EACH ROW EXECUTE FUNCTION refuse_registration()
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();
        let gateway = FakeGateway::default();
        let (notifier, mailer) = testing::notifier();

        let result = register_for_event(&pool, &gateway, &notifier, profile.id, event.id).await;

        assert!(matches!(result, Err(AppError::Database(_))));
        assert_eq!(*gateway.released.lock().unwrap(), vec!["pi_fake_1"]);
        assert!(mailer.subjects().is_empty());
    }

    #[sqlx::test(migrations = "../db/migrations")]
    async fn maintenance_blocks_registration(pool: PgPool) {
        let event = open_event(&pool, 50_000).await;
        let profile = testing::bidder(&pool).await;
        sqlx::query("UPDATE site_settings SET maintenance_mode = TRUE WHERE id = 1")
            .execute(&pool)
            .await
            .unwrap();
        let gateway = FakeGateway::default();
        let (notifier, _) = testing::notifier();

        let result = register_for_event(&pool, &gateway, &notifier, profile.id, event.id).await;

        assert!(matches!(result, Err(AppError::ServiceUnavailable(_))));
        assert!(gateway.placed.lock().unwrap().is_empty());
    }
}
