use common::{
    error::{AppError, Res},
    misc::SaleStatus,
};
use db::models::sale::{Sale, SaleWithLot};
use notifier::{Notifier, templates};
use sqlx::PgPool;
use uuid::Uuid;

use crate::dtos::auction::SlotView;

pub async fn list_slots(pool: &PgPool, event_id: Uuid) -> Res<Vec<SlotView>> {
    let slots = db::pickup::list_slots_by_event(pool, event_id).await?;
    Ok(slots.into_iter().map(SlotView::from).collect())
}

pub async fn my_purchases(pool: &PgPool, user_id: Uuid) -> Res<Vec<SaleWithLot>> {
    db::sale::sales_by_buyer(pool, user_id).await
}

fn ensure_bookable(sale: &Sale, user_id: Uuid) -> Res<()> {
    // Someone else's sale looks the same as a missing one.
    if sale.buyer_id != user_id {
        return Err(AppError::NotFound("Sale not found".to_string()));
    }
    if sale.status != SaleStatus::Paid.as_str() {
        return Err(AppError::Conflict(
            "Pickup can be scheduled once the purchase is paid".to_string(),
        ));
    }
    Ok(())
}

/// Books a pickup slot for a paid purchase, moving an earlier booking.
pub async fn book_pickup_slot(
    pool: &PgPool,
    notifier: &Notifier,
    user_id: Uuid,
    sale_id: Uuid,
    slot_id: Uuid,
) -> Res<Sale> {
    let sale = db::sale::get_sale_by_id(pool, sale_id).await?;
    ensure_bookable(&sale, user_id)?;
    if sale.pickup_slot_id == Some(slot_id) {
        return Ok(sale);
    }

    let mut tx = pool.begin().await?;
    // Locks the sale row. A concurrent booking that read the same slot
    // matches nothing once this commits.
    let updated = db::sale::move_pickup_slot(&mut *tx, sale.id, sale.pickup_slot_id, slot_id)
        .await?
        .ok_or_else(|| {
            AppError::Conflict("This purchase was just rescheduled. Please reload and try again.".to_string())
        })?;
    let slot = db::pickup::reserve_slot(&mut *tx, slot_id, sale.event_id)
        .await?
        .ok_or_else(|| {
            AppError::Conflict("That pickup slot is full or not available for this purchase".to_string())
        })?;
    if let Some(previous) = sale.pickup_slot_id {
        db::pickup::release_slot(&mut *tx, previous).await?;
    }
    tx.commit().await?;

    log::info!("Sale {} booked pickup slot {}", sale.id, slot.id);

    let profile = db::profile::get_profile_by_id(pool, user_id).await;
    let lot = db::lot::get_lot_by_id(pool, sale.auction_id).await;
    let event = db::event::get_event_by_id(pool, sale.event_id).await;
    match (profile, lot, event) {
        (Ok(profile), Ok(lot), Ok(event)) => {
            notifier
                .send(
                    &profile.email,
                    templates::pickup_confirmed(
                        &profile.first_name,
                        &lot.title,
                        &slot.starts_at,
                        &slot.ends_at,
                        event.location.as_deref(),
                    ),
                )
                .await
        }
        _ => log::error!("Failed to load pickup confirmation details for sale {}", sale.id),
    }

    Ok(updated)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use common::misc::LotStatus;

    use super::*;
    use crate::{services::rules::fixtures, testing};

    async fn paid_sale(pool: &PgPool) -> Sale {
        let event = testing::live_event(pool, 0).await;
        let lot = testing::lot(
            pool,
            event.id,
            LotStatus::Sold,
            10_000,
            Utc::now() - Duration::hours(1),
        )
        .await;
        let buyer = testing::bidder(pool).await;
        testing::sale(pool, &lot, buyer.id, SaleStatus::Paid).await
    }

    async fn booked(pool: &PgPool, event_id: Uuid) -> Vec<(Uuid, i32)> {
        db::pickup::list_slots_by_event(pool, event_id)
            .await
            .unwrap()
            .into_iter()
            .map(|slot| (slot.id, slot.booked_count))
            .collect()
    }

    #[sqlx::test(migrations = "../db/migrations")]
    async fn moving_a_booking_frees_the_old_place(pool: PgPool) {
        let sale = paid_sale(&pool).await;
        let first = testing::slot(&pool, sale.event_id, 1).await;
        let second = testing::slot(&pool, sale.event_id, 1).await;
        let (notifier, mailer) = testing::notifier();

        book_pickup_slot(&pool, &notifier, sale.buyer_id, sale.id, first.id)
            .await
            .unwrap();
        let moved = book_pickup_slot(&pool, &notifier, sale.buyer_id, sale.id, second.id)
            .await
            .unwrap();

        assert_eq!(moved.pickup_slot_id, Some(second.id));
        let counts = booked(&pool, sale.event_id).await;
        assert!(counts.contains(&(first.id, 0)));
        assert!(counts.contains(&(second.id, 1)));
        assert_eq!(mailer.subjects().len(), 2);
    }

    #[sqlx::test(migrations = "../db/migrations")]
    async fn concurrent_bookings_hold_one_place(pool: PgPool) {
        let sale = paid_sale(&pool).await;
        let first = testing::slot(&pool, sale.event_id, 1).await;
        let second = testing::slot(&pool, sale.event_id, 1).await;
        let (notifier, _) = testing::notifier();

        let (a, b) = tokio::join!(
            book_pickup_slot(&pool, &notifier, sale.buyer_id, sale.id, first.id),
            book_pickup_slot(&pool, &notifier, sale.buyer_id, sale.id, second.id),
        );
        assert!(a.is_ok() || b.is_ok());

        let counts = booked(&pool, sale.event_id).await;
        assert_eq!(counts.iter().map(|(_, n)| n).sum::<i32>(), 1);

        let stored = db::sale::get_sale_by_id(&pool, sale.id).await.unwrap();
        let (booked_slot, _) = counts.iter().find(|(_, n)| *n == 1).unwrap();
        assert_eq!(stored.pickup_slot_id, Some(*booked_slot));
    }

    #[sqlx::test(migrations = "../db/migrations")]
    async fn full_slot_is_refused(pool: PgPool) {
        let sale = paid_sale(&pool).await;
        let slot = testing::slot(&pool, sale.event_id, 1).await;
        db::pickup::reserve_slot(&pool, slot.id, sale.event_id)
            .await
            .unwrap()
            .unwrap();
        let (notifier, _) = testing::notifier();

        let result = book_pickup_slot(&pool, &notifier, sale.buyer_id, sale.id, slot.id).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));

        let stored = db::sale::get_sale_by_id(&pool, sale.id).await.unwrap();
        assert_eq!(stored.pickup_slot_id, None);
    }

    #[test]
    fn buyer_books_paid_sales_only() {
        let sale = fixtures::sale(10_000, 0, SaleStatus::Paid);
        assert!(ensure_bookable(&sale, sale.buyer_id).is_ok());
        assert!(matches!(
            ensure_bookable(&sale, Uuid::new_v4()),
            Err(AppError::NotFound(_))
        ));

        let pending = fixtures::sale(10_000, 0, SaleStatus::Pending);
        assert!(matches!(
            ensure_bookable(&pending, pending.buyer_id),
            Err(AppError::Conflict(_))
        ));
    }
}
