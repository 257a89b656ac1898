use std::collections::HashMap;

use async_trait::async_trait;
use common::{
    error::{AppError, Res},
    payments::{HoldGateway, HoldRequest},
    stripe::{self, CardSummary},
};
use sqlx::PgPool;
use ::stripe::{Client, SetupIntent};
use uuid::Uuid;

/// Stripe customer of the user, created on first use for accounts that
/// registered while Stripe was unavailable.
pub async fn ensure_customer(pool: &PgPool, client: &Client, user_id: Uuid) -> Res<String> {
    let profile = db::profile::get_profile_by_id(pool, user_id).await?;
    if let Some(customer_id) = profile.stripe_customer_id {
        return Ok(customer_id);
    }

    let customer = stripe::create_customer(client, &profile.email, &profile.full_name()).await?;
    let customer_id = customer.id.to_string();
    match db::profile::set_stripe_customer(pool, user_id, &customer_id).await {
        Ok(_) => Ok(customer_id),
        // Another request stored a customer first; keep that one.
        Err(AppError::Database(sqlx::Error::RowNotFound)) => db::profile::get_profile_by_id(pool, user_id)
            .await?
            .stripe_customer_id
            .ok_or_else(|| AppError::Internal("Customer vanished".to_string())),
        Err(e) => Err(e),
    }
}

pub async fn create_setup_intent(client: &Client, customer_id: &str) -> Res<SetupIntent> {
    stripe::create_setup_intent(client, customer_id).await
}

/// Places a small hold on the card and cancels it right away. A card that
/// cannot carry this hold would not carry a bid either.
pub async fn verify_card(
    gateway: &dyn HoldGateway,
    user_id: Uuid,
    customer_id: &str,
    payment_method_id: &str,
    amount: i64,
) -> Res<()> {
    let hold = gateway
        .place_hold(HoldRequest {
            customer_id: customer_id.to_string(),
            payment_method_id: payment_method_id.to_string(),
            amount,
            description: "Card verification".to_string(),
            idempotency_key: format!("verify:{}:{}", user_id, payment_method_id),
            metadata: HashMap::from([
                ("purpose".to_string(), "card_verification".to_string()),
                ("user_id".to_string(), user_id.to_string()),
            ]),
        })
        .await?;

    let release_key = format!("verify-release:{}", hold.payment_intent_id);
    if let Err(e) = gateway
        .release_hold(&hold.payment_intent_id, &release_key)
        .await
    {
        // The authorization lapses on its own; the card itself is fine.
        log::error!(
            "Failed to release verification hold {}: {}",
            hold.payment_intent_id,
            e
        );
    }
    Ok(())
}

/// Saved-card operations on the processor.
#[async_trait]
pub trait CardStore: Send + Sync {
    async fn attach(&self, customer_id: &str, payment_method_id: &str) -> Res<()>;
    async fn detach(&self, payment_method_id: &str) -> Res<()>;
    async fn set_default(&self, customer_id: &str, payment_method_id: &str) -> Res<()>;
}

#[async_trait]
impl CardStore for Client {
    async fn attach(&self, customer_id: &str, payment_method_id: &str) -> Res<()> {
        stripe::attach_payment_method(self, customer_id, payment_method_id).await?;
        Ok(())
    }

    async fn detach(&self, payment_method_id: &str) -> Res<()> {
        stripe::detach_payment_method(self, payment_method_id).await
    }

    async fn set_default(&self, customer_id: &str, payment_method_id: &str) -> Res<()> {
        stripe::set_default_payment_method(self, customer_id, payment_method_id).await
    }
}

/// Attaches a card and validates it. Only a validated card becomes the
/// default; a declined one is detached and the previous default stays.
pub async fn add_verified_card(
    cards: &dyn CardStore,
    gateway: &dyn HoldGateway,
    user_id: Uuid,
    customer_id: &str,
    payment_method_id: &str,
    verification_amount: i64,
) -> Res<()> {
    cards.attach(customer_id, payment_method_id).await?;

    if let Err(e) = verify_card(
        gateway,
        user_id,
        customer_id,
        payment_method_id,
        verification_amount,
    )
    .await
    {
        log::warn!("Card {} failed verification: {}", payment_method_id, e);
        if let Err(detach_err) = cards.detach(payment_method_id).await {
            log::error!(
                "Failed to detach unverified card {}: {}",
                payment_method_id,
                detach_err
            );
        }
        let reason = match e {
            AppError::PaymentDeclined(msg) => msg,
            _ => "The card could not be verified".to_string(),
        };
        return Err(AppError::BadRequest(reason));
    }

    cards.set_default(customer_id, payment_method_id).await
}

pub async fn attach_card(
    pool: &PgPool,
    client: &Client,
    gateway: &dyn HoldGateway,
    user_id: Uuid,
    payment_method_id: &str,
    verification_amount: i64,
) -> Res<()> {
    let customer_id = ensure_customer(pool, client, user_id).await?;
    add_verified_card(
        client,
        gateway,
        user_id,
        &customer_id,
        payment_method_id,
        verification_amount,
    )
    .await?;

    db::profile::set_verified(pool, user_id, true).await?;
    log::info!("User {} verified card {}", user_id, payment_method_id);
    Ok(())
}

pub async fn list_cards(
    pool: &PgPool,
    client: &Client,
    user_id: Uuid,
) -> Res<Vec<CardSummary>> {
    let customer_id = ensure_customer(pool, client, user_id).await?;
    stripe::list_card_payment_methods(client, &customer_id).await
}

fn owned_card<'a>(cards: &'a [CardSummary], payment_method_id: &str) -> Res<&'a CardSummary> {
    cards
        .iter()
        .find(|card| card.id == payment_method_id)
        .ok_or_else(|| AppError::NotFound("Card not found".to_string()))
}

pub async fn set_default_card(
    pool: &PgPool,
    client: &Client,
    user_id: Uuid,
    payment_method_id: &str,
) -> Res<()> {
    let customer_id = ensure_customer(pool, client, user_id).await?;
    let cards = stripe::list_card_payment_methods(client, &customer_id).await?;
    owned_card(&cards, payment_method_id)?;
    stripe::set_default_payment_method(client, &customer_id, payment_method_id).await
}

/// Removes a card. Losing the last card also drops the verified flag.
pub async fn detach_card(
    pool: &PgPool,
    client: &Client,
    user_id: Uuid,
    payment_method_id: &str,
) -> Res<()> {
    let customer_id = ensure_customer(pool, client, user_id).await?;
    let cards = stripe::list_card_payment_methods(client, &customer_id).await?;
    owned_card(&cards, payment_method_id)?;
    stripe::detach_payment_method(client, payment_method_id).await?;

    if cards.len() == 1 {
        db::profile::set_verified(pool, user_id, false).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use common::payments::testing::FakeGateway;

    use super::*;

    #[derive(Default)]
    struct RecordingCards {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingCards {
        fn record(&self, call: String) -> Res<()> {
            self.calls.lock().unwrap().push(call);
            Ok(())
        }
    }

    #[async_trait]
    impl CardStore for RecordingCards {
        async fn attach(&self, _customer_id: &str, payment_method_id: &str) -> Res<()> {
            self.record(format!("attach {}", payment_method_id))
        }

        async fn detach(&self, payment_method_id: &str) -> Res<()> {
            self.record(format!("detach {}", payment_method_id))
        }

        async fn set_default(&self, _customer_id: &str, payment_method_id: &str) -> Res<()> {
            self.record(format!("default {}", payment_method_id))
        }
    }

    #[tokio::test]
    async fn verified_card_becomes_the_default() {
        let cards = RecordingCards::default();
        let gateway = FakeGateway::default();

        add_verified_card(&cards, &gateway, Uuid::new_v4(), "cus_1", "pm_new", 100)
            .await
            .unwrap();

        assert_eq!(
            *cards.calls.lock().unwrap(),
            vec!["attach pm_new", "default pm_new"]
        );
        assert_eq!(gateway.placed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn declined_card_never_replaces_the_default() {
        let cards = RecordingCards::default();
        let gateway = FakeGateway {
            decline_holds: true,
            ..Default::default()
        };

        let result =
            add_verified_card(&cards, &gateway, Uuid::new_v4(), "cus_1", "pm_new", 100).await;

        assert!(matches!(result, Err(AppError::BadRequest(_))));
        assert_eq!(
            *cards.calls.lock().unwrap(),
            vec!["attach pm_new", "detach pm_new"]
        );
    }

    #[tokio::test]
    async fn verification_hold_is_placed_then_released() {
        let gateway = FakeGateway::default();
        let user_id = Uuid::new_v4();

        verify_card(&gateway, user_id, "cus_1", "pm_1", 100).await.unwrap();

        let placed = gateway.placed.lock().unwrap();
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].amount, 100);
        assert_eq!(placed[0].idempotency_key, format!("verify:{}:pm_1", user_id));
        assert_eq!(*gateway.released.lock().unwrap(), vec!["pi_fake_1"]);
    }

    #[tokio::test]
    async fn declined_card_fails_verification() {
        let gateway = FakeGateway {
            decline_holds: true,
            ..Default::default()
        };
        let result = verify_card(&gateway, Uuid::new_v4(), "cus_1", "pm_1", 100).await;
        assert!(matches!(result, Err(AppError::PaymentDeclined(_))));
        assert!(gateway.released.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_release_does_not_fail_verification() {
        let gateway = FakeGateway {
            failing: vec!["pi_fake_1".to_string()],
            ..Default::default()
        };
        assert!(verify_card(&gateway, Uuid::new_v4(), "cus_1", "pm_1", 100).await.is_ok());
    }

    #[test]
    fn foreign_cards_are_not_found() {
        let cards = vec![CardSummary {
            id: "pm_mine".to_string(),
            brand: "visa".to_string(),
            last4: "4242".to_string(),
            exp_month: 12,
            exp_year: 2030,
            is_default: true,
        }];
        assert!(owned_card(&cards, "pm_mine").is_ok());
        assert!(matches!(owned_card(&cards, "pm_other"), Err(AppError::NotFound(_))));
    }
}
