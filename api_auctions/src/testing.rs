//! Rows and doubles for workflow tests that run against a migrated
//! database (`#[sqlx::test(migrations = "../db/migrations")]`).

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use common::misc::{BidStatus, EventStatus, HoldStatus, LotStatus, SaleStatus};
use db::models::{
    bid::Bid, event::AuctionEvent, lot::Lot, pickup::PickupSlot, profile::Profile,
    registration::Registration, sale::Sale,
};
use notifier::{Notifier, testing::RecordingMailer};
use sqlx::PgPool;
use uuid::Uuid;

pub fn notifier() -> (Notifier, Arc<RecordingMailer>) {
    let mailer = Arc::new(RecordingMailer::default());
    (Notifier::new(mailer.clone(), "https://bid.example"), mailer)
}

/// A bidder with a Stripe customer and a verified card.
pub async fn bidder(pool: &PgPool) -> Profile {
    sqlx::query_as::<_, Profile>(
        r#"
        INSERT INTO profiles (email, first_name, last_name, stripe_customer_id, email_verified, verified)
        VALUES ($1, 'Sam', 'Ortiz', 'cus_test', TRUE, TRUE)
        RETURNING *
        "#,
    )
    .bind(format!("{}@example.com", Uuid::new_v4().simple()))
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn event(
    pool: &PgPool,
    status: EventStatus,
    deposit_amount: i64,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
) -> AuctionEvent {
    sqlx::query_as::<_, AuctionEvent>(
        r#"
        INSERT INTO auction_events (title, location, starts_at, ends_at, deposit_amount, status)
        VALUES ('Plant closure: Dayton', 'Dayton, OH', $1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(starts_at)
    .bind(ends_at)
    .bind(deposit_amount)
    .bind(status.as_str())
    .fetch_one(pool)
    .await
    .unwrap()
}

/// A live event that started an hour ago and runs for another day.
pub async fn live_event(pool: &PgPool, deposit_amount: i64) -> AuctionEvent {
    let now = Utc::now();
    event(
        pool,
        EventStatus::Live,
        deposit_amount,
        now - Duration::hours(1),
        now + Duration::days(1),
    )
    .await
}

pub async fn lot(
    pool: &PgPool,
    event_id: Uuid,
    status: LotStatus,
    starting_price: i64,
    ends_at: DateTime<Utc>,
) -> Lot {
    sqlx::query_as::<_, Lot>(
        r#"
        INSERT INTO auctions (event_id, lot_number, title, starting_price, current_price, status, ends_at)
        VALUES ($1, (SELECT COALESCE(MAX(lot_number), 0) + 1 FROM auctions WHERE event_id = $1),
                'CNC Lathe', $2, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(event_id)
    .bind(starting_price)
    .bind(status.as_str())
    .bind(ends_at)
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn registration(
    pool: &PgPool,
    event_id: Uuid,
    user_id: Uuid,
    payment_intent_id: Option<&str>,
    deposit_amount: i64,
) -> Registration {
    sqlx::query_as::<_, Registration>(
        r#"
        INSERT INTO event_registrations
            (event_id, user_id, status, stripe_payment_intent_id, deposit_amount, authorized_at)
        VALUES ($1, $2, 'authorized', $3, $4, now())
        RETURNING *
        "#,
    )
    .bind(event_id)
    .bind(user_id)
    .bind(payment_intent_id)
    .bind(deposit_amount)
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn bid(
    pool: &PgPool,
    lot_id: Uuid,
    bidder_id: Uuid,
    amount: i64,
    status: BidStatus,
    hold_status: HoldStatus,
    payment_intent_id: &str,
) -> Bid {
    sqlx::query_as::<_, Bid>(
        r#"
        INSERT INTO bids (auction_id, bidder_id, amount, status, stripe_payment_intent_id, hold_status)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(lot_id)
    .bind(bidder_id)
    .bind(amount)
    .bind(status.as_str())
    .bind(payment_intent_id)
    .bind(hold_status.as_str())
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn sale(pool: &PgPool, lot: &Lot, buyer_id: Uuid, status: SaleStatus) -> Sale {
    sqlx::query_as::<_, Sale>(
        r#"
        INSERT INTO sales (auction_id, event_id, buyer_id, amount, status, stripe_payment_intent_id)
        VALUES ($1, $2, $3, $4, $5, 'pi_sale')
        RETURNING *
        "#,
    )
    .bind(lot.id)
    .bind(lot.event_id)
    .bind(buyer_id)
    .bind(lot.current_price)
    .bind(status.as_str())
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn slot(pool: &PgPool, event_id: Uuid, capacity: i32) -> PickupSlot {
    let starts_at = Utc::now() + Duration::days(3);
    sqlx::query_as::<_, PickupSlot>(
        r#"
        INSERT INTO pickup_slots (event_id, starts_at, ends_at, capacity)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(event_id)
    .bind(starts_at)
    .bind(starts_at + Duration::hours(1))
    .bind(capacity)
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn reload_bid(pool: &PgPool, bid_id: Uuid) -> Bid {
    sqlx::query_as::<_, Bid>("SELECT * FROM bids WHERE id = $1")
        .bind(bid_id)
        .fetch_one(pool)
        .await
        .unwrap()
}
