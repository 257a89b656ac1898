use serde::Serialize;
use stripe::{
    AttachPaymentMethod, Client, CreateCustomer, CreateSetupIntent, Currency, Customer,
    CustomerId, CustomerInvoiceSettings, ErrorType, Expandable, ListPaymentMethods,
    PaymentMethod, PaymentMethodId, PaymentMethodTypeFilter, RequestStrategy, SetupIntent,
    StripeError, UpdateCustomer,
};

use crate::error::{AppError, Res};

pub fn create_client(secret_key: &str) -> Client {
    Client::new(secret_key)
}

/// Same client, but every request it sends carries the given idempotency key.
pub fn idempotent(client: &Client, key: &str) -> Client {
    client
        .clone()
        .with_strategy(RequestStrategy::Idempotent(key.to_string()))
}

pub fn parse_currency(code: &str) -> Res<Currency> {
    code.parse::<Currency>()
        .map_err(|_| AppError::Internal(format!("Unsupported currency: {}", code)))
}

pub fn parse_customer_id(customer_id: &str) -> Res<CustomerId> {
    customer_id.parse::<CustomerId>().map_err(|e| {
        AppError::Internal(format!(
            "Failed to parse customer id: {}. {}",
            customer_id, e
        ))
    })
}

pub fn parse_payment_method_id(payment_method_id: &str) -> Res<PaymentMethodId> {
    payment_method_id
        .parse::<PaymentMethodId>()
        .map_err(|e| AppError::BadRequest(format!("Invalid payment method id: {}", e)))
}

/// Card declines come back as Stripe `card_error`s; surface them as 402
/// with Stripe's message instead of a generic gateway failure.
pub fn map_card_error(err: StripeError) -> AppError {
    match err {
        StripeError::Stripe(ref request_error)
            if matches!(request_error.error_type, ErrorType::Card) =>
        {
            AppError::PaymentDeclined(
                request_error
                    .message
                    .clone()
                    .unwrap_or_else(|| "Card was declined".to_string()),
            )
        }
        other => AppError::from(other),
    }
}

pub async fn create_customer(client: &Client, email: &str, name: &str) -> Res<Customer> {
    let params = CreateCustomer {
        email: Some(email),
        name: Some(name),
        ..Default::default()
    };

    Customer::create(client, params)
        .await
        .map_err(AppError::from)
}

/// Creates a setup intent so the web app can collect a card for later
/// off-session holds.
pub async fn create_setup_intent(client: &Client, customer_id: &str) -> Res<SetupIntent> {
    let customer = parse_customer_id(customer_id)?;
    let params = CreateSetupIntent {
        customer: Some(customer),
        payment_method_types: Some(vec!["card".to_string()]),
        ..Default::default()
    };
    SetupIntent::create(client, params)
        .await
        .map_err(AppError::from)
}

pub async fn attach_payment_method(
    client: &Client,
    customer_id: &str,
    payment_method_id: &str,
) -> Res<PaymentMethod> {
    let customer = parse_customer_id(customer_id)?;
    let pm_id = parse_payment_method_id(payment_method_id)?;
    PaymentMethod::attach(client, &pm_id, AttachPaymentMethod { customer })
        .await
        .map_err(map_card_error)
}

pub async fn detach_payment_method(client: &Client, payment_method_id: &str) -> Res<()> {
    let pm_id = parse_payment_method_id(payment_method_id)?;
    PaymentMethod::detach(client, &pm_id)
        .await
        .map_err(AppError::from)?;
    Ok(())
}

pub async fn set_default_payment_method(
    client: &Client,
    customer_id: &str,
    payment_method_id: &str,
) -> Res<()> {
    let customer = parse_customer_id(customer_id)?;
    let params = UpdateCustomer {
        invoice_settings: Some(CustomerInvoiceSettings {
            default_payment_method: Some(payment_method_id.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    };
    Customer::update(client, &customer, params)
        .await
        .map_err(AppError::from)?;
    Ok(())
}

/// Default card of the customer, if one has been set.
pub async fn default_payment_method(client: &Client, customer_id: &str) -> Res<Option<String>> {
    let customer_id = parse_customer_id(customer_id)?;
    let customer = Customer::retrieve(client, &customer_id, &[])
        .await
        .map_err(AppError::from)?;

    Ok(customer
        .invoice_settings
        .and_then(|settings| settings.default_payment_method)
        .map(|pm| match pm {
            Expandable::Id(id) => id.to_string(),
            Expandable::Object(pm) => pm.id.to_string(),
        }))
}

#[derive(Debug, Clone, Serialize)]
pub struct CardSummary {
    pub id: String,
    pub brand: String,
    pub last4: String,
    pub exp_month: i64,
    pub exp_year: i64,
    pub is_default: bool,
}

pub async fn list_card_payment_methods(client: &Client, customer_id: &str) -> Res<Vec<CardSummary>> {
    let default_id = default_payment_method(client, customer_id).await?;
    let params = ListPaymentMethods {
        customer: Some(parse_customer_id(customer_id)?),
        type_: Some(PaymentMethodTypeFilter::Card),
        limit: Some(20),
        ..Default::default()
    };

    let methods = PaymentMethod::list(client, &params)
        .await
        .map_err(AppError::from)?;

    Ok(methods
        .data
        .into_iter()
        .filter_map(|pm| {
            let card = pm.card?;
            let id = pm.id.to_string();
            Some(CardSummary {
                is_default: default_id.as_deref() == Some(id.as_str()),
                id,
                brand: card.brand,
                last4: card.last4,
                exp_month: card.exp_month,
                exp_year: card.exp_year,
            })
        })
        .collect())
}
