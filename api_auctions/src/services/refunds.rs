//! Money movements an admin triggers after a sale or an event: refunds,
//! cancelling unpaid sales and settling deposits.

use common::{
    error::{AppError, Res},
    misc::{HoldStatus, RegistrationStatus, SaleStatus},
    payments::HoldGateway,
};
use db::models::{registration::Registration, sale::Sale};
use notifier::{Notifier, templates};
use sqlx::PgPool;
use uuid::Uuid;

use crate::services::{holds, rules};

fn refund_key(sale: &Sale, amount: i64) -> String {
    format!("refund:{}:{}:{}", sale.id, sale.refunded_amount, amount)
}

/// Refunds part or all of a paid sale.
pub async fn refund_sale(
    pool: &PgPool,
    gateway: &dyn HoldGateway,
    notifier: &Notifier,
    sale_id: Uuid,
    amount: Option<i64>,
) -> Res<Sale> {
    let sale = db::sale::get_sale_by_id(pool, sale_id).await?;
    let amount = rules::resolve_refund_amount(&sale, amount)?;
    let intent = sale.stripe_payment_intent_id.as_deref().ok_or_else(|| {
        AppError::BadRequest("Sale was paid offline and must be refunded manually".to_string())
    })?;

    let refund_id = gateway
        .refund(intent, amount, &refund_key(&sale, amount))
        .await?;

    let updated = db::sale::record_refund(pool, sale.id, sale.refunded_amount, amount)
        .await?
        .ok_or_else(|| {
            log::error!(
                "Refund {} of {} on sale {} was issued but the sale changed before it was recorded",
                refund_id,
                amount,
                sale.id
            );
            AppError::Conflict("Sale changed while refunding, please reload".to_string())
        })?;

    log::info!("Refunded {} on sale {} ({})", amount, sale.id, refund_id);

    let full = updated.status == SaleStatus::Refunded.as_str();
    notify_buyer_refund(pool, notifier, &updated, amount, full).await;
    Ok(updated)
}

async fn notify_buyer_refund(pool: &PgPool, notifier: &Notifier, sale: &Sale, amount: i64, full: bool) {
    let buyer = db::profile::get_profile_by_id(pool, sale.buyer_id).await;
    let lot = db::lot::get_lot_by_id(pool, sale.auction_id).await;
    match (buyer, lot) {
        (Ok(buyer), Ok(lot)) => {
            notifier
                .send(
                    &buyer.email,
                    templates::refund_issued(&buyer.first_name, &lot.title, amount, full),
                )
                .await
        }
        (Err(e), _) | (_, Err(e)) => {
            log::error!("Failed to load refund details for sale {}: {}", sale.id, e)
        }
    }
}

/// Cancels an unpaid sale and gives back the hold behind it.
pub async fn cancel_sale(pool: &PgPool, gateway: &dyn HoldGateway, sale_id: Uuid) -> Res<Sale> {
    let sale = db::sale::get_sale_by_id(pool, sale_id).await?;
    if sale.status != SaleStatus::Pending.as_str() {
        return Err(AppError::Conflict(format!(
            "Only pending sales can be cancelled, this one is {}",
            sale.status
        )));
    }

    if let Some(intent) = sale.stripe_payment_intent_id.as_deref() {
        gateway
            .release_hold(intent, &holds::release_key(intent))
            .await?;
        db::bid::set_hold_status_by_intents(pool, &[intent.to_string()], HoldStatus::Released)
            .await?;
    }

    let cancelled = db::sale::transition_sale(
        pool,
        sale.id,
        SaleStatus::Pending,
        SaleStatus::Cancelled,
        None,
    )
    .await?
    .ok_or_else(|| AppError::Conflict("Sale is no longer pending".to_string()))?;

    log::info!("Cancelled sale {}", sale.id);
    Ok(cancelled)
}

/// Records a payment collected outside the processor.
pub async fn mark_sale_paid(pool: &PgPool, sale_id: Uuid) -> Res<Sale> {
    let sale = db::sale::transition_sale(pool, sale_id, SaleStatus::Pending, SaleStatus::Paid, None)
        .await?;
    match sale {
        Some(sale) => {
            log::info!("Sale {} marked paid", sale.id);
            Ok(sale)
        }
        None => {
            // Distinguish a missing sale from one in the wrong state.
            let existing = db::sale::get_sale_by_id(pool, sale_id).await?;
            Err(AppError::Conflict(format!(
                "Only pending sales can be marked paid, this one is {}",
                existing.status
            )))
        }
    }
}

fn authorized(registration: &Registration) -> Res<()> {
    if registration.status != RegistrationStatus::Authorized.as_str() {
        return Err(AppError::Conflict(format!(
            "Deposit is not on hold, registration is {}",
            registration.status
        )));
    }
    Ok(())
}

/// Keeps the deposit of a bidder who walked away from a win.
pub async fn capture_deposit(
    pool: &PgPool,
    gateway: &dyn HoldGateway,
    registration_id: Uuid,
) -> Res<Registration> {
    let registration = db::registration::get_registration_by_id(pool, registration_id).await?;
    authorized(&registration)?;
    let intent = registration.stripe_payment_intent_id.as_deref().ok_or_else(|| {
        AppError::BadRequest("This registration has no deposit to capture".to_string())
    })?;

    gateway
        .capture_hold(intent, &format!("capture-deposit:{}", registration.id))
        .await?;

    let captured = transition(pool, registration.id, RegistrationStatus::Captured).await?;
    log::info!(
        "Captured deposit {} of registration {}",
        registration.deposit_amount,
        registration.id
    );
    Ok(captured)
}

pub async fn release_deposit(
    pool: &PgPool,
    gateway: &dyn HoldGateway,
    registration_id: Uuid,
) -> Res<Registration> {
    let registration = db::registration::get_registration_by_id(pool, registration_id).await?;
    authorized(&registration)?;

    if let Some(intent) = registration.stripe_payment_intent_id.as_deref() {
        gateway
            .release_hold(intent, &holds::release_key(intent))
            .await?;
    }

    let released = transition(pool, registration.id, RegistrationStatus::Released).await?;
    log::info!("Released deposit of registration {}", registration.id);
    Ok(released)
}

async fn transition(pool: &PgPool, registration_id: Uuid, to: RegistrationStatus) -> Res<Registration> {
    db::registration::transition_registration(
        pool,
        registration_id,
        RegistrationStatus::Authorized,
        to,
    )
    .await?
    .ok_or_else(|| AppError::Conflict("Registration changed, please reload".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::rules::fixtures;

    #[test]
    fn refund_key_changes_after_each_refund() {
        let mut sale = fixtures::sale(50_000, 0, SaleStatus::Paid);
        let first = refund_key(&sale, 10_000);
        assert_eq!(first, format!("refund:{}:0:10000", sale.id));

        sale.refunded_amount = 10_000;
        assert_ne!(first, refund_key(&sale, 10_000));
    }

    #[test]
    fn only_authorized_deposits_can_move() {
        let now = chrono::Utc::now();
        let mut registration = Registration {
            id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            status: RegistrationStatus::Authorized.as_str().to_string(),
            stripe_payment_intent_id: Some("pi_deposit".to_string()),
            deposit_amount: 50_000,
            authorized_at: Some(now),
            created_at: now,
            updated_at: now,
        };
        assert!(authorized(&registration).is_ok());

        registration.status = RegistrationStatus::Released.as_str().to_string();
        assert!(matches!(authorized(&registration), Err(AppError::Conflict(_))));
    }
}
