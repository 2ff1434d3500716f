use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Which balance components a withdrawal may draw from. Policy, not code:
/// selected by `wallet.withdrawal_source` in the configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalSource {
    Commission,
    Total,
}

#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct Wallet {
    pub user_id: String,
    pub deposited_cents: i64,
    pub commission_cents: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// The part of a withdrawal hold taken from each balance component.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DebitSplit {
    pub from_commission_cents: i64,
    pub from_deposited_cents: i64,
}

impl Wallet {
    /// The total is always derived from the components, never stored.
    pub fn balance_cents(&self) -> i64 {
        self.deposited_cents + self.commission_cents
    }

    pub fn withdrawable_cents(&self, source: WithdrawalSource) -> i64 {
        match source {
            WithdrawalSource::Commission => self.commission_cents,
            WithdrawalSource::Total => self.balance_cents(),
        }
    }

    pub fn can_withdraw(&self, amount_cents: i64, source: WithdrawalSource) -> bool {
        amount_cents > 0 && amount_cents <= self.withdrawable_cents(source)
    }

    /// Splits a debit across the components, draining commission first under
    /// the `Total` policy. Returns `None` when the wallet cannot cover it.
    pub fn split_debit(&self, amount_cents: i64, source: WithdrawalSource) -> Option<DebitSplit> {
        if !self.can_withdraw(amount_cents, source) {
            return None;
        }

        let from_commission = amount_cents.min(self.commission_cents);
        Some(DebitSplit {
            from_commission_cents: from_commission,
            from_deposited_cents: amount_cents - from_commission,
        })
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct BalanceSummary {
    pub user_id: String,
    pub deposited_cents: i64,
    pub commission_cents: i64,
    pub balance_cents: i64,
    pub withdrawable_cents: i64,
}

impl BalanceSummary {
    pub fn from_wallet(wallet: &Wallet, source: WithdrawalSource) -> Self {
        BalanceSummary {
            user_id: wallet.user_id.clone(),
            deposited_cents: wallet.deposited_cents,
            commission_cents: wallet.commission_cents,
            balance_cents: wallet.balance_cents(),
            withdrawable_cents: wallet.withdrawable_cents(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn wallet(deposited_cents: i64, commission_cents: i64) -> Wallet {
        let now = Utc::now().naive_utc();
        Wallet {
            user_id: "u1".to_string(),
            deposited_cents,
            commission_cents,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn balance_is_sum_of_components() {
        assert_eq!(wallet(2_500, 7_500).balance_cents(), 10_000);
        assert_eq!(wallet(0, 0).balance_cents(), 0);
    }

    #[test]
    fn commission_policy_ignores_deposits() {
        let w = wallet(50_000, 10_000);
        assert_eq!(w.withdrawable_cents(WithdrawalSource::Commission), 10_000);
        assert!(!w.can_withdraw(10_001, WithdrawalSource::Commission));
        assert!(w.can_withdraw(10_000, WithdrawalSource::Commission));
    }

    #[test]
    fn total_policy_covers_both_components() {
        let w = wallet(50_000, 10_000);
        assert_eq!(w.withdrawable_cents(WithdrawalSource::Total), 60_000);
        assert!(w.can_withdraw(60_000, WithdrawalSource::Total));
        assert!(!w.can_withdraw(60_001, WithdrawalSource::Total));
    }

    #[test]
    fn zero_and_negative_amounts_rejected() {
        let w = wallet(100, 100);
        assert!(!w.can_withdraw(0, WithdrawalSource::Total));
        assert!(!w.can_withdraw(-5, WithdrawalSource::Total));
    }

    #[test]
    fn split_drains_commission_first() {
        let w = wallet(5_000, 3_000);
        let split = w.split_debit(4_000, WithdrawalSource::Total).unwrap();
        assert_eq!(split.from_commission_cents, 3_000);
        assert_eq!(split.from_deposited_cents, 1_000);
    }

    #[test]
    fn split_fails_when_insufficient() {
        let w = wallet(0, 15_000);
        assert!(w.split_debit(20_000, WithdrawalSource::Total).is_none());
        // The worked ledger example: credit then drain exactly.
        let w = wallet(0, 15_000);
        let split = w.split_debit(15_000, WithdrawalSource::Commission).unwrap();
        assert_eq!(split.from_commission_cents, 15_000);
        assert_eq!(split.from_deposited_cents, 0);
    }
}
