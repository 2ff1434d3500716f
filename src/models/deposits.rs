use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct Deposit {
    pub id: String,
    pub user_id: String,
    pub amount_cents: i64,
    pub phone_number: String,
    pub status: String,
    pub checkout_id: String,
    pub mpesa_receipt: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewDeposit {
    pub user_id: String,
    pub amount_cents: i64,
    pub phone_number: String,
}
