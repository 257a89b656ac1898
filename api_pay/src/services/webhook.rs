use common::{
    error::{AppError, Res},
    misc::{HoldStatus, SaleStatus},
};
use sqlx::PgPool;
use stripe::{Event, EventObject, EventType, PaymentIntent, Webhook};

/// Creates an event for the webhook based on the request payload and signature.
/// Requires a webhook secret key.
pub fn construct_event(payload: &str, signature: &str, webhook_secret: &str) -> Res<Event> {
    match Webhook::construct_event(payload, signature, webhook_secret) {
        Ok(event) => Ok(event),
        Err(e) => {
            log::error!("Error constructing webhook event: {}", e);
            Err(AppError::BadRequest(format!("Webhook Error: {}", e)))
        }
    }
}

/// What a payment intent event means for our records.
#[derive(Debug, PartialEq)]
pub enum IntentUpdate {
    Succeeded(String),
    Canceled(String),
    Failed { intent_id: String, reason: String },
    Ignored,
}

pub fn classify(event_type: EventType, intent: &PaymentIntent) -> IntentUpdate {
    let intent_id = intent.id.to_string();
    match event_type {
        EventType::PaymentIntentSucceeded => IntentUpdate::Succeeded(intent_id),
        EventType::PaymentIntentCanceled => IntentUpdate::Canceled(intent_id),
        EventType::PaymentIntentPaymentFailed => IntentUpdate::Failed {
            intent_id,
            reason: intent
                .last_payment_error
                .as_ref()
                .and_then(|e| e.message.clone())
                .unwrap_or_else(|| "Payment failed".to_string()),
        },
        _ => IntentUpdate::Ignored,
    }
}

/// Processes the webhook event. Each update is a conditional write, so
/// replayed events change nothing.
pub async fn process_webhook_event(pool: &PgPool, event: Event) -> Res<()> {
    log::info!("Processing webhook event: {}", event.type_);

    let update = match event.data.object {
        EventObject::PaymentIntent(ref intent) => classify(event.type_, intent),
        _ => IntentUpdate::Ignored,
    };

    match update {
        IntentUpdate::Succeeded(intent_id) => {
            if let Some(sale) = db::sale::get_sale_by_intent(pool, &intent_id).await? {
                if db::sale::transition_sale(pool, sale.id, SaleStatus::Pending, SaleStatus::Paid, None)
                    .await?
                    .is_some()
                {
                    log::info!("Sale {} marked paid by processor", sale.id);
                }
            }
        }
        IntentUpdate::Canceled(intent_id) => {
            let ids = vec![intent_id.clone()];
            let bids = db::bid::set_hold_status_by_intents(pool, &ids, HoldStatus::Released).await?;
            let registrations = db::registration::release_by_intent(pool, &intent_id).await?;
            if bids + registrations > 0 {
                log::info!(
                    "Hold {} cancelled: {} bid(s), {} registration(s) updated",
                    intent_id,
                    bids,
                    registrations
                );
            }
        }
        IntentUpdate::Failed { intent_id, reason } => {
            if let Some(sale) = db::sale::get_sale_by_intent(pool, &intent_id).await? {
                db::sale::set_failure_reason(pool, sale.id, &reason).await?;
                log::warn!("Payment for sale {} failed: {}", sale.id, reason);
            }
        }
        IntentUpdate::Ignored => {
            log::debug!("Unhandled event type: {}", event.type_);
        }
    }

    Ok(())
}
