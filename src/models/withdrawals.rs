use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Withdrawal payout lifecycle. `pending` is the only non-terminal state;
/// `b2c_failed` additionally admits a manual operator override to `completed`
/// when the payout is confirmed received out of band.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Pending,
    Completed,
    B2cFailed,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Completed => "completed",
            WithdrawalStatus::B2cFailed => "b2c_failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(WithdrawalStatus::Pending),
            "completed" => Some(WithdrawalStatus::Completed),
            "b2c_failed" => Some(WithdrawalStatus::B2cFailed),
            _ => None,
        }
    }

    pub fn can_transition_to(self, next: WithdrawalStatus) -> bool {
        matches!(
            (self, next),
            (WithdrawalStatus::Pending, WithdrawalStatus::Completed)
                | (WithdrawalStatus::Pending, WithdrawalStatus::B2cFailed)
                | (WithdrawalStatus::B2cFailed, WithdrawalStatus::Completed)
        )
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct Withdrawal {
    pub id: String,
    pub user_id: String,
    pub amount_cents: i64,
    pub phone_number: String,
    pub status: String,
    pub held_commission_cents: i64,
    pub held_deposited_cents: i64,
    pub conversation_id: Option<String>,
    pub transaction_id: Option<String>,
    pub failure_reason: Option<String>,
    pub requested_at: NaiveDateTime,
    pub paid_at: Option<NaiveDateTime>,
    pub updated_at: NaiveDateTime,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewWithdrawal {
    pub user_id: String,
    pub amount_cents: i64,
    pub phone_number: String,
    pub pin: String,
}

/// Outcome of the operator override on a failed payout.
#[derive(Debug)]
pub enum OverrideOutcome {
    Completed(Withdrawal),
    NotFailed,
    FundsUnavailable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_and_failure_transitions() {
        assert!(WithdrawalStatus::Pending.can_transition_to(WithdrawalStatus::Completed));
        assert!(WithdrawalStatus::Pending.can_transition_to(WithdrawalStatus::B2cFailed));
        assert!(WithdrawalStatus::B2cFailed.can_transition_to(WithdrawalStatus::Completed));
    }

    #[test]
    fn completed_is_terminal() {
        assert!(!WithdrawalStatus::Completed.can_transition_to(WithdrawalStatus::Pending));
        assert!(!WithdrawalStatus::Completed.can_transition_to(WithdrawalStatus::B2cFailed));
        assert!(!WithdrawalStatus::Completed.can_transition_to(WithdrawalStatus::Completed));
    }

    #[test]
    fn no_reentry_into_pending() {
        assert!(!WithdrawalStatus::B2cFailed.can_transition_to(WithdrawalStatus::Pending));
        assert!(!WithdrawalStatus::Pending.can_transition_to(WithdrawalStatus::Pending));
    }

    #[test]
    fn stuck_payout_recovers_through_manual_failure() {
        // When the provider result callback never arrives the row stays
        // pending with its hold in place. The operator fails it to refund
        // the hold, and completes it afterwards if the money turns out to
        // have been paid after all.
        assert!(WithdrawalStatus::Pending.can_transition_to(WithdrawalStatus::B2cFailed));
        assert!(WithdrawalStatus::B2cFailed.can_transition_to(WithdrawalStatus::Completed));
        // A settled payout is not recoverable material.
        assert!(!WithdrawalStatus::Completed.can_transition_to(WithdrawalStatus::B2cFailed));
    }

    #[test]
    fn status_round_trips_through_storage_form() {
        for status in [
            WithdrawalStatus::Pending,
            WithdrawalStatus::Completed,
            WithdrawalStatus::B2cFailed,
        ] {
            assert_eq!(WithdrawalStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(WithdrawalStatus::parse("processing"), None);
    }
}
