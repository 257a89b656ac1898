use common::{
    error::{AppError, Res},
    misc::SaleStatus,
};
use sqlx::{Executor, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    dtos::sale::{SaleCreateRequest, SaleFilter},
    models::sale::{Sale, SaleWithLot},
};

/// Inserts the sale of a lot. A lot has at most one sale; a second insert
/// returns `None`.
pub async fn insert_sale<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    data: SaleCreateRequest,
) -> Res<Option<Sale>> {
    sqlx::query_as::<_, Sale>(
        r#"
        INSERT INTO sales (auction_id, event_id, buyer_id, amount, status, stripe_payment_intent_id, failure_reason)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (auction_id) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(data.auction_id)
    .bind(data.event_id)
    .bind(data.buyer_id)
    .bind(data.amount)
    .bind(data.status.as_str())
    .bind(data.stripe_payment_intent_id)
    .bind(data.failure_reason)
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)
}

pub async fn get_sale_by_id<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    sale_id: Uuid,
) -> Res<Sale> {
    sqlx::query_as::<_, Sale>("SELECT * FROM sales WHERE id = $1")
        .bind(sale_id)
        .fetch_one(executor)
        .await
        .map_err(|e| AppError::not_found_or(e.into(), "Sale"))
}

pub async fn get_sale_by_intent<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    payment_intent_id: &str,
) -> Res<Option<Sale>> {
    sqlx::query_as::<_, Sale>("SELECT * FROM sales WHERE stripe_payment_intent_id = $1")
        .bind(payment_intent_id)
        .fetch_optional(executor)
        .await
        .map_err(AppError::from)
}

pub async fn list_sales<'e, E>(executor: E, filter: SaleFilter) -> Res<Vec<Sale>>
where
    E: Executor<'e, Database = Postgres>,
{
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM sales WHERE 1 = 1");

    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status);
    }

    if let Some(event_id) = filter.event_id {
        qb.push(" AND event_id = ").push_bind(event_id);
    }

    if let Some(buyer_id) = filter.buyer_id {
        qb.push(" AND buyer_id = ").push_bind(buyer_id);
    }

    qb.push(" ORDER BY created_at DESC");

    if let Some(limit) = filter.limit {
        qb.push(" LIMIT ").push_bind(limit);
    }

    qb.build_query_as::<Sale>()
        .fetch_all(executor)
        .await
        .map_err(AppError::from)
}

pub async fn sales_by_buyer<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    buyer_id: Uuid,
) -> Res<Vec<SaleWithLot>> {
    sqlx::query_as::<_, SaleWithLot>(
        r#"
        SELECT s.*, a.title AS lot_title, a.lot_number
        FROM sales s
        JOIN auctions a ON a.id = s.auction_id
        WHERE s.buyer_id = $1
        ORDER BY s.created_at DESC
        "#,
    )
    .bind(buyer_id)
    .fetch_all(executor)
    .await
    .map_err(AppError::from)
}

/// Moves a sale from one status to another. `None` if it was not in `from`.
pub async fn transition_sale<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    sale_id: Uuid,
    from: SaleStatus,
    to: SaleStatus,
    failure_reason: Option<&str>,
) -> Res<Option<Sale>> {
    sqlx::query_as::<_, Sale>(
        r#"
        UPDATE sales SET status = $3, failure_reason = COALESCE($4, failure_reason), updated_at = now()
        WHERE id = $1 AND status = $2
        RETURNING *
        "#,
    )
    .bind(sale_id)
    .bind(from.as_str())
    .bind(to.as_str())
    .bind(failure_reason)
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)
}

pub async fn set_failure_reason<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    sale_id: Uuid,
    failure_reason: &str,
) -> Res<()> {
    sqlx::query("UPDATE sales SET failure_reason = $2, updated_at = now() WHERE id = $1")
        .bind(sale_id)
        .bind(failure_reason)
        .execute(executor)
        .await?;
    Ok(())
}

/// Adds a refund to a paid sale. Matches only if `refunded_so_far` is still
/// current and the amount fits; flips the sale to refunded once fully refunded.
pub async fn record_refund<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    sale_id: Uuid,
    refunded_so_far: i64,
    amount: i64,
) -> Res<Option<Sale>> {
    sqlx::query_as::<_, Sale>(
        r#"
        UPDATE sales SET
            refunded_amount = refunded_amount + $3,
            status = CASE WHEN refunded_amount + $3 >= amount THEN 'refunded' ELSE status END,
            updated_at = now()
        WHERE id = $1
          AND status = 'paid'
          AND refunded_amount = $2
          AND refunded_amount + $3 <= amount
        RETURNING *
        "#,
    )
    .bind(sale_id)
    .bind(refunded_so_far)
    .bind(amount)
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)
}

/// Points a paid sale at a new pickup slot, provided it still has the slot
/// the caller read. `None` when another booking changed it first.
pub async fn move_pickup_slot<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    sale_id: Uuid,
    from: Option<Uuid>,
    to: Uuid,
) -> Res<Option<Sale>> {
    sqlx::query_as::<_, Sale>(
        r#"
        UPDATE sales SET pickup_slot_id = $3, updated_at = now()
        WHERE id = $1 AND status = 'paid' AND pickup_slot_id IS NOT DISTINCT FROM $2
        RETURNING *
        "#,
    )
    .bind(sale_id)
    .bind(from)
    .bind(to)
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)
}
