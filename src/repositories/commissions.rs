use sqlx::PgPool;
use uuid::Uuid;

use crate::models::commissions::{Commission, CommissionType};

#[derive(Clone)]
pub struct CommissionRepository {
    conn: PgPool,
}

impl CommissionRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }

    /// Inserts the commission row and credits the referrer's commission
    /// balance in one transaction, so the ledger and the record can never
    /// disagree.
    pub async fn record(
        &self,
        referrer_id: &str,
        order_ref: Option<&str>,
        amount_cents: i64,
        commission_type: CommissionType,
        description: &str,
    ) -> Result<Commission, anyhow::Error> {
        let commission_id = Uuid::new_v4().hyphenated().to_string();
        let mut tx = self.conn.begin().await?;

        let commission = sqlx::query_as::<_, Commission>(
            r#"
            INSERT INTO commissions (id, referrer_id, order_ref, amount_cents, commission_type, description)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&commission_id)
        .bind(referrer_id)
        .bind(order_ref)
        .bind(amount_cents)
        .bind(commission_type.as_str())
        .bind(description)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE wallets
            SET commission_cents = commission_cents + $2,
                updated_at = CURRENT_TIMESTAMP
            WHERE user_id = $1
            "#,
        )
        .bind(referrer_id)
        .bind(amount_cents)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(commission)
    }

    pub async fn list_for_referrer(
        &self,
        referrer_id: &str,
    ) -> Result<Vec<Commission>, anyhow::Error> {
        let commissions = sqlx::query_as::<_, Commission>(
            "SELECT * FROM commissions WHERE referrer_id = $1 ORDER BY created_at DESC",
        )
        .bind(referrer_id)
        .fetch_all(&self.conn)
        .await?;

        Ok(commissions)
    }
}
