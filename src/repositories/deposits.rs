use sqlx::PgPool;
use uuid::Uuid;

use crate::models::deposits::Deposit;

#[derive(Clone)]
pub struct DepositRepository {
    conn: PgPool,
}

impl DepositRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }

    pub async fn create_pending(
        &self,
        user_id: &str,
        amount_cents: i64,
        phone_number: &str,
        checkout_id: &str,
    ) -> Result<Deposit, anyhow::Error> {
        let deposit_id = Uuid::new_v4().hyphenated().to_string();

        let deposit = sqlx::query_as::<_, Deposit>(
            r#"
            INSERT INTO deposits (id, user_id, amount_cents, phone_number, status, checkout_id)
            VALUES ($1, $2, $3, $4, 'pending', $5)
            RETURNING *
            "#,
        )
        .bind(&deposit_id)
        .bind(user_id)
        .bind(amount_cents)
        .bind(phone_number)
        .bind(checkout_id)
        .fetch_one(&self.conn)
        .await?;

        Ok(deposit)
    }

    /// Credits the deposited balance exactly once per checkout: the status
    /// guard makes a replayed callback a no-op. The wallet is credited with
    /// `collected_cents`, the amount the provider reports it collected,
    /// falling back to the requested amount only when the callback carried
    /// no amount.
    pub async fn complete_by_checkout(
        &self,
        checkout_id: &str,
        mpesa_receipt: &str,
        collected_cents: Option<i64>,
    ) -> Result<Option<Deposit>, anyhow::Error> {
        let mut tx = self.conn.begin().await?;

        let deposit = sqlx::query_as::<_, Deposit>(
            r#"
            UPDATE deposits
            SET status = 'completed',
                mpesa_receipt = $2,
                updated_at = CURRENT_TIMESTAMP
            WHERE checkout_id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(checkout_id)
        .bind(mpesa_receipt)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(deposit) = deposit else {
            return Ok(None);
        };

        sqlx::query(
            r#"
            UPDATE wallets
            SET deposited_cents = deposited_cents + $2,
                updated_at = CURRENT_TIMESTAMP
            WHERE user_id = $1
            "#,
        )
        .bind(&deposit.user_id)
        .bind(collected_cents.unwrap_or(deposit.amount_cents))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(deposit))
    }

    pub async fn fail_by_checkout(
        &self,
        checkout_id: &str,
    ) -> Result<Option<Deposit>, anyhow::Error> {
        let deposit = sqlx::query_as::<_, Deposit>(
            r#"
            UPDATE deposits
            SET status = 'failed',
                updated_at = CURRENT_TIMESTAMP
            WHERE checkout_id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(checkout_id)
        .fetch_optional(&self.conn)
        .await?;

        Ok(deposit)
    }

    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Deposit>, anyhow::Error> {
        let deposits = sqlx::query_as::<_, Deposit>(
            "SELECT * FROM deposits WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.conn)
        .await?;

        Ok(deposits)
    }
}
