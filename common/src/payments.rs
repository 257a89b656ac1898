//! Card holds: manual-capture payment intents used for registration
//! deposits, bids and card verification.
//!
//! Workflows talk to the processor through [`HoldGateway`] so settlement
//! code can be exercised without Stripe.

use std::collections::HashMap;

use async_trait::async_trait;
use stripe::{
    CancelPaymentIntent, CapturePaymentIntent, Client, CreatePaymentIntent, CreateRefund,
    Currency, PaymentIntent, PaymentIntentCaptureMethod, PaymentIntentId, PaymentIntentStatus,
    Refund,
};

use crate::{
    error::{AppError, Res},
    stripe::{
        default_payment_method, idempotent, map_card_error, parse_customer_id,
        parse_payment_method_id,
    },
};

#[derive(Debug, Clone)]
pub struct HoldRequest {
    pub customer_id: String,
    pub payment_method_id: String,
    /// Amount in cents.
    pub amount: i64,
    pub description: String,
    pub idempotency_key: String,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hold {
    pub payment_intent_id: String,
    pub amount: i64,
}

#[async_trait]
pub trait HoldGateway: Send + Sync {
    /// Card that holds are placed on for this customer.
    async fn default_card(&self, customer_id: &str) -> Res<Option<String>>;

    /// Authorizes `amount` on the saved card without capturing it.
    async fn place_hold(&self, req: HoldRequest) -> Res<Hold>;

    /// Captures a previously placed hold in full.
    async fn capture_hold(&self, payment_intent_id: &str, idempotency_key: &str) -> Res<()>;

    /// Cancels a hold. Cancelling an already cancelled hold succeeds.
    async fn release_hold(&self, payment_intent_id: &str, idempotency_key: &str) -> Res<()>;

    /// Refunds part or all of a captured payment and returns the refund id.
    async fn refund(
        &self,
        payment_intent_id: &str,
        amount: i64,
        idempotency_key: &str,
    ) -> Res<String>;
}

pub struct StripeGateway {
    client: Client,
    currency: Currency,
}

impl StripeGateway {
    pub fn new(client: Client, currency: Currency) -> Self {
        Self { client, currency }
    }

    fn parse_intent_id(payment_intent_id: &str) -> Res<PaymentIntentId> {
        payment_intent_id.parse::<PaymentIntentId>().map_err(|e| {
            AppError::Internal(format!(
                "Failed to parse payment intent id: {}. {}",
                payment_intent_id, e
            ))
        })
    }

    async fn intent_status(&self, id: &PaymentIntentId) -> Res<PaymentIntentStatus> {
        let intent = PaymentIntent::retrieve(&self.client, id, &[])
            .await
            .map_err(AppError::from)?;
        Ok(intent.status)
    }
}

#[async_trait]
impl HoldGateway for StripeGateway {
    async fn default_card(&self, customer_id: &str) -> Res<Option<String>> {
        default_payment_method(&self.client, customer_id).await
    }

    async fn place_hold(&self, req: HoldRequest) -> Res<Hold> {
        if req.amount <= 0 {
            return Err(AppError::BadRequest("Hold amount must be positive".to_string()));
        }

        let mut params = CreatePaymentIntent::new(req.amount, self.currency);
        params.customer = Some(parse_customer_id(&req.customer_id)?);
        params.payment_method = Some(parse_payment_method_id(&req.payment_method_id)?);
        params.capture_method = Some(PaymentIntentCaptureMethod::Manual);
        params.confirm = Some(true);
        params.payment_method_types = Some(vec!["card".to_string()]);
        params.description = Some(req.description.as_str());
        params.metadata = Some(req.metadata.clone());

        let client = idempotent(&self.client, &req.idempotency_key);
        let intent = PaymentIntent::create(&client, params)
            .await
            .map_err(map_card_error)?;

        match intent.status {
            PaymentIntentStatus::RequiresCapture => Ok(Hold {
                payment_intent_id: intent.id.to_string(),
                amount: req.amount,
            }),
            status => {
                // Anything other than an authorized hold (3DS challenge, processing) cannot
                // complete without the cardholder, so give the authorization back.
                log::warn!(
                    "Hold {} ended in status {}, cancelling it",
                    intent.id,
                    status
                );
                let cancel_key = format!("{}:abort", req.idempotency_key);
                if let Err(e) = self.release_hold(intent.id.as_str(), &cancel_key).await {
                    log::error!("Failed to cancel incomplete hold {}: {}", intent.id, e);
                }
                Err(AppError::PaymentDeclined(
                    "Card requires additional authentication; please use another card".to_string(),
                ))
            }
        }
    }

    async fn capture_hold(&self, payment_intent_id: &str, idempotency_key: &str) -> Res<()> {
        let id = Self::parse_intent_id(payment_intent_id)?;
        let client = idempotent(&self.client, idempotency_key);
        match PaymentIntent::capture(&client, payment_intent_id, CapturePaymentIntent::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(err) => match self.intent_status(&id).await {
                Ok(PaymentIntentStatus::Succeeded) => Ok(()),
                _ => Err(map_card_error(err)),
            },
        }
    }

    async fn release_hold(&self, payment_intent_id: &str, idempotency_key: &str) -> Res<()> {
        let id = Self::parse_intent_id(payment_intent_id)?;
        let client = idempotent(&self.client, idempotency_key);
        match PaymentIntent::cancel(&client, payment_intent_id, CancelPaymentIntent::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(err) => match self.intent_status(&id).await {
                Ok(PaymentIntentStatus::Canceled) => Ok(()),
                _ => Err(AppError::from(err)),
            },
        }
    }

    async fn refund(
        &self,
        payment_intent_id: &str,
        amount: i64,
        idempotency_key: &str,
    ) -> Res<String> {
        let mut params = CreateRefund::new();
        params.payment_intent = Some(Self::parse_intent_id(payment_intent_id)?);
        params.amount = Some(amount);

        let client = idempotent(&self.client, idempotency_key);
        let refund = Refund::create(&client, params)
            .await
            .map_err(AppError::from)?;
        Ok(refund.id.to_string())
    }
}

/// A hold scheduled for release, keyed for idempotency.
#[derive(Debug, Clone)]
pub struct PendingRelease {
    pub payment_intent_id: String,
    pub idempotency_key: String,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReleaseReport {
    pub released: Vec<String>,
    pub failed: Vec<String>,
}

/// Releases every hold, continuing past failures. Callers record the
/// failed ones so a later sweep can retry them.
pub async fn release_holds(gateway: &dyn HoldGateway, holds: Vec<PendingRelease>) -> ReleaseReport {
    let mut report = ReleaseReport::default();
    for hold in holds {
        match gateway
            .release_hold(&hold.payment_intent_id, &hold.idempotency_key)
            .await
        {
            Ok(()) => report.released.push(hold.payment_intent_id),
            Err(e) => {
                log::error!(
                    "Failed to release hold {}: {}",
                    hold.payment_intent_id,
                    e
                );
                report.failed.push(hold.payment_intent_id);
            }
        }
    }
    report
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    //! In-memory gateway used by workflow tests across the workspace.

    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct FakeGateway {
        pub placed: Mutex<Vec<HoldRequest>>,
        pub captured: Mutex<Vec<String>>,
        pub released: Mutex<Vec<String>>,
        pub refunded: Mutex<Vec<(String, i64)>>,
        /// Payment intents whose release or capture fails.
        pub failing: Vec<String>,
        pub decline_holds: bool,
        pub no_default_card: bool,
    }

    #[async_trait]
    impl HoldGateway for FakeGateway {
        async fn default_card(&self, _customer_id: &str) -> Res<Option<String>> {
            Ok((!self.no_default_card).then(|| "pm_fake_default".to_string()))
        }

        async fn place_hold(&self, req: HoldRequest) -> Res<Hold> {
            if self.decline_holds {
                return Err(AppError::PaymentDeclined("Card was declined".to_string()));
            }
            let mut placed = self.placed.lock().unwrap();
            // Same key, same intent: the processor replays the first response.
            if let Some(pos) = placed
                .iter()
                .position(|p| p.idempotency_key == req.idempotency_key)
            {
                return Ok(Hold {
                    payment_intent_id: format!("pi_fake_{}", pos + 1),
                    amount: placed[pos].amount,
                });
            }
            let hold = Hold {
                payment_intent_id: format!("pi_fake_{}", placed.len() + 1),
                amount: req.amount,
            };
            placed.push(req);
            Ok(hold)
        }

        async fn capture_hold(&self, payment_intent_id: &str, _key: &str) -> Res<()> {
            if self.failing.iter().any(|id| id == payment_intent_id) {
                return Err(AppError::PaymentDeclined("Authorization expired".to_string()));
            }
            if self.released.lock().unwrap().iter().any(|id| id == payment_intent_id) {
                return Err(AppError::PaymentDeclined("Intent was canceled".to_string()));
            }
            self.captured
                .lock()
                .unwrap()
                .push(payment_intent_id.to_string());
            Ok(())
        }

        async fn release_hold(&self, payment_intent_id: &str, _key: &str) -> Res<()> {
            if self.failing.iter().any(|id| id == payment_intent_id) {
                return Err(AppError::Internal("processor unavailable".to_string()));
            }
            self.released
                .lock()
                .unwrap()
                .push(payment_intent_id.to_string());
            Ok(())
        }

        async fn refund(&self, payment_intent_id: &str, amount: i64, _key: &str) -> Res<String> {
            let mut refunded = self.refunded.lock().unwrap();
            refunded.push((payment_intent_id.to_string(), amount));
            Ok(format!("re_fake_{}", refunded.len()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeGateway;
    use super::*;

    fn pending(id: &str) -> PendingRelease {
        PendingRelease {
            payment_intent_id: id.to_string(),
            idempotency_key: format!("release:{}", id),
        }
    }

    #[tokio::test]
    async fn release_holds_continues_past_failures() {
        let gateway = FakeGateway {
            failing: vec!["pi_2".to_string()],
            ..Default::default()
        };

        let report = release_holds(
            &gateway,
            vec![pending("pi_1"), pending("pi_2"), pending("pi_3")],
        )
        .await;

        assert_eq!(report.released, vec!["pi_1", "pi_3"]);
        assert_eq!(report.failed, vec!["pi_2"]);
        assert_eq!(*gateway.released.lock().unwrap(), vec!["pi_1", "pi_3"]);
    }

    fn request(key: &str, amount: i64) -> HoldRequest {
        HoldRequest {
            customer_id: "cus_1".to_string(),
            payment_method_id: "pm_1".to_string(),
            amount,
            description: "Bid".to_string(),
            idempotency_key: key.to_string(),
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn fake_gateway_replays_repeated_keys() {
        let gateway = FakeGateway::default();
        let first = gateway.place_hold(request("bid:a", 10_000)).await.unwrap();
        let again = gateway.place_hold(request("bid:a", 10_000)).await.unwrap();
        let other = gateway.place_hold(request("bid:b", 10_000)).await.unwrap();

        assert_eq!(first, again);
        assert_ne!(first.payment_intent_id, other.payment_intent_id);

        gateway
            .release_hold(&first.payment_intent_id, "release:a")
            .await
            .unwrap();
        assert!(matches!(
            gateway.capture_hold(&first.payment_intent_id, "capture:a").await,
            Err(AppError::PaymentDeclined(_))
        ));
    }

    #[tokio::test]
    async fn release_holds_with_nothing_to_do() {
        let gateway = FakeGateway::default();
        let report = release_holds(&gateway, Vec::new()).await;
        assert_eq!(report, ReleaseReport::default());
    }
}
