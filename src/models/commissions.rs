use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionType {
    Order,
    Manual,
}

impl CommissionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommissionType::Order => "order",
            CommissionType::Manual => "manual",
        }
    }
}

/// Insert-only: a commission is never updated after creation.
#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct Commission {
    pub id: String,
    pub referrer_id: String,
    pub order_ref: Option<String>,
    pub amount_cents: i64,
    pub commission_type: String,
    pub description: String,
    pub created_at: NaiveDateTime,
}

/// Commission owed on a paid order, in basis points of the order amount,
/// rounded down.
pub fn commission_for_order(order_amount_cents: i64, rate_bps: i64) -> i64 {
    if order_amount_cents <= 0 || rate_bps <= 0 {
        return 0;
    }
    order_amount_cents * rate_bps / 10_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_percent_of_order() {
        assert_eq!(commission_for_order(100_000, 500), 5_000);
    }

    #[test]
    fn rounds_down_to_whole_cents() {
        assert_eq!(commission_for_order(999, 500), 49);
        assert_eq!(commission_for_order(19, 500), 0);
    }

    #[test]
    fn nothing_owed_on_degenerate_input() {
        assert_eq!(commission_for_order(0, 500), 0);
        assert_eq!(commission_for_order(-100, 500), 0);
        assert_eq!(commission_for_order(100_000, 0), 0);
    }
}
