use sqlx::PgPool;
use uuid::Uuid;

use crate::models::wallets::{Wallet, WithdrawalSource};
use crate::models::withdrawals::{OverrideOutcome, Withdrawal};

const FAIL_PENDING_BY_CONVERSATION: &str = r#"
    UPDATE withdrawals
    SET status = 'b2c_failed',
        failure_reason = $2,
        updated_at = CURRENT_TIMESTAMP
    WHERE conversation_id = $1 AND status = 'pending'
    RETURNING *
"#;

const FAIL_PENDING_BY_ID: &str = r#"
    UPDATE withdrawals
    SET status = 'b2c_failed',
        failure_reason = $2,
        updated_at = CURRENT_TIMESTAMP
    WHERE id = $1 AND status = 'pending'
    RETURNING *
"#;

#[derive(Clone)]
pub struct WithdrawalRepository {
    conn: PgPool,
}

impl WithdrawalRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }

    /// Holds the funds and records the pending withdrawal atomically. The
    /// wallet row is locked for the duration of the check-and-debit, so
    /// concurrent requests summing past the balance cannot all succeed.
    /// Returns `None` when the wallet cannot cover the amount.
    pub async fn create_pending(
        &self,
        user_id: &str,
        amount_cents: i64,
        phone_number: &str,
        source: WithdrawalSource,
    ) -> Result<Option<Withdrawal>, anyhow::Error> {
        let mut tx = self.conn.begin().await?;

        let wallet =
            sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE user_id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some(wallet) = wallet else {
            return Ok(None);
        };

        let Some(split) = wallet.split_debit(amount_cents, source) else {
            return Ok(None);
        };

        sqlx::query(
            r#"
            UPDATE wallets
            SET commission_cents = commission_cents - $2,
                deposited_cents = deposited_cents - $3,
                updated_at = CURRENT_TIMESTAMP
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(split.from_commission_cents)
        .bind(split.from_deposited_cents)
        .execute(&mut *tx)
        .await?;

        let withdrawal_id = Uuid::new_v4().hyphenated().to_string();
        let withdrawal = sqlx::query_as::<_, Withdrawal>(
            r#"
            INSERT INTO withdrawals
            (id, user_id, amount_cents, phone_number, status, held_commission_cents, held_deposited_cents)
            VALUES ($1, $2, $3, $4, 'pending', $5, $6)
            RETURNING *
            "#,
        )
        .bind(&withdrawal_id)
        .bind(user_id)
        .bind(amount_cents)
        .bind(phone_number)
        .bind(split.from_commission_cents)
        .bind(split.from_deposited_cents)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(withdrawal))
    }

    pub async fn attach_conversation(
        &self,
        withdrawal_id: &str,
        conversation_id: &str,
    ) -> Result<(), anyhow::Error> {
        sqlx::query(
            "UPDATE withdrawals SET conversation_id = $2, updated_at = CURRENT_TIMESTAMP WHERE id = $1",
        )
        .bind(withdrawal_id)
        .bind(conversation_id)
        .execute(&self.conn)
        .await?;

        Ok(())
    }

    /// `pending -> completed`, keyed by the provider conversation handle.
    /// Replayed callbacks find no pending row and return `None`.
    pub async fn complete_by_conversation(
        &self,
        conversation_id: &str,
        transaction_id: &str,
    ) -> Result<Option<Withdrawal>, anyhow::Error> {
        let withdrawal = sqlx::query_as::<_, Withdrawal>(
            r#"
            UPDATE withdrawals
            SET status = 'completed',
                transaction_id = $2,
                paid_at = CURRENT_TIMESTAMP,
                updated_at = CURRENT_TIMESTAMP
            WHERE conversation_id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(conversation_id)
        .bind(transaction_id)
        .fetch_optional(&self.conn)
        .await?;

        Ok(withdrawal)
    }

    /// `pending -> b2c_failed` with the hold refunded in the same transaction.
    pub async fn fail_by_conversation(
        &self,
        conversation_id: &str,
        reason: &str,
    ) -> Result<Option<Withdrawal>, anyhow::Error> {
        self.fail_pending(FAIL_PENDING_BY_CONVERSATION, conversation_id, reason)
            .await
    }

    /// Same transition keyed by our own id, used when the payout initiation
    /// itself fails before the provider hands back a conversation id, and by
    /// the operator override on a stuck pending payout.
    pub async fn fail_by_id(
        &self,
        withdrawal_id: &str,
        reason: &str,
    ) -> Result<Option<Withdrawal>, anyhow::Error> {
        self.fail_pending(FAIL_PENDING_BY_ID, withdrawal_id, reason).await
    }

    async fn fail_pending(
        &self,
        query: &str,
        key: &str,
        reason: &str,
    ) -> Result<Option<Withdrawal>, anyhow::Error> {
        let mut tx = self.conn.begin().await?;

        let withdrawal = sqlx::query_as::<_, Withdrawal>(query)
            .bind(key)
            .bind(reason)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(withdrawal) = withdrawal else {
            return Ok(None);
        };

        sqlx::query(
            r#"
            UPDATE wallets
            SET commission_cents = commission_cents + $2,
                deposited_cents = deposited_cents + $3,
                updated_at = CURRENT_TIMESTAMP
            WHERE user_id = $1
            "#,
        )
        .bind(&withdrawal.user_id)
        .bind(withdrawal.held_commission_cents)
        .bind(withdrawal.held_deposited_cents)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(withdrawal))
    }

    /// Operator override `b2c_failed -> completed`. The failure refunded the
    /// hold, so the money confirmed received out of band must be debited
    /// again; if the wallet no longer covers it the override is rejected and
    /// nothing changes.
    pub async fn mark_paid_manually(
        &self,
        withdrawal_id: &str,
        transaction_id: &str,
    ) -> Result<OverrideOutcome, anyhow::Error> {
        let mut tx = self.conn.begin().await?;

        let withdrawal = sqlx::query_as::<_, Withdrawal>(
            r#"
            UPDATE withdrawals
            SET status = 'completed',
                transaction_id = $2,
                paid_at = CURRENT_TIMESTAMP,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND status = 'b2c_failed'
            RETURNING *
            "#,
        )
        .bind(withdrawal_id)
        .bind(transaction_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(withdrawal) = withdrawal else {
            return Ok(OverrideOutcome::NotFailed);
        };

        let debited = sqlx::query(
            r#"
            UPDATE wallets
            SET commission_cents = commission_cents - $2,
                deposited_cents = deposited_cents - $3,
                updated_at = CURRENT_TIMESTAMP
            WHERE user_id = $1
              AND commission_cents >= $2
              AND deposited_cents >= $3
            "#,
        )
        .bind(&withdrawal.user_id)
        .bind(withdrawal.held_commission_cents)
        .bind(withdrawal.held_deposited_cents)
        .execute(&mut *tx)
        .await?;

        if debited.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(OverrideOutcome::FundsUnavailable);
        }

        tx.commit().await?;

        Ok(OverrideOutcome::Completed(withdrawal))
    }

    pub async fn get_withdrawal(&self, id: &str) -> Result<Option<Withdrawal>, anyhow::Error> {
        let withdrawal = sqlx::query_as::<_, Withdrawal>("SELECT * FROM withdrawals WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.conn)
            .await?;

        Ok(withdrawal)
    }

    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Withdrawal>, anyhow::Error> {
        let withdrawals = sqlx::query_as::<_, Withdrawal>(
            "SELECT * FROM withdrawals WHERE user_id = $1 ORDER BY requested_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.conn)
        .await?;

        Ok(withdrawals)
    }
}
