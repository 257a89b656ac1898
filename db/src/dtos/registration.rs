use uuid::Uuid;

pub struct RegistrationUpsert {
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub stripe_payment_intent_id: Option<String>,
    pub deposit_amount: i64,
}
