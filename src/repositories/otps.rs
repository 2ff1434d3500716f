use chrono::NaiveDateTime;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::otps::{Otp, OtpPurpose};

#[derive(Clone)]
pub struct OtpRepository {
    conn: PgPool,
}

impl OtpRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }

    /// Issues a fresh code, invalidating any unused codes for the same user
    /// and purpose so only the latest one can be consumed.
    pub async fn issue(
        &self,
        user_id: &str,
        email: &str,
        purpose: OtpPurpose,
        code: &str,
        expires_at: NaiveDateTime,
    ) -> Result<Otp, anyhow::Error> {
        let otp_id = Uuid::new_v4().hyphenated().to_string();
        let mut tx = self.conn.begin().await?;

        sqlx::query(
            "UPDATE otps SET is_used = TRUE WHERE user_id = $1 AND purpose = $2 AND is_used = FALSE",
        )
        .bind(user_id)
        .bind(purpose.as_str())
        .execute(&mut *tx)
        .await?;

        let otp = sqlx::query_as::<_, Otp>(
            r#"
            INSERT INTO otps (id, user_id, email, purpose, otp_code, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&otp_id)
        .bind(user_id)
        .bind(email)
        .bind(purpose.as_str())
        .bind(code)
        .bind(expires_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(otp)
    }

    /// Single-use consumption: the conditional UPDATE checks code, purpose,
    /// expiry and the used flag in one statement, so a replayed code can
    /// never be accepted twice.
    pub async fn consume(
        &self,
        email: &str,
        purpose: OtpPurpose,
        code: &str,
        now: NaiveDateTime,
    ) -> Result<Option<Otp>, anyhow::Error> {
        let otp = sqlx::query_as::<_, Otp>(
            r#"
            UPDATE otps
            SET is_used = TRUE
            WHERE email = $1
              AND purpose = $2
              AND otp_code = $3
              AND is_used = FALSE
              AND expires_at > $4
            RETURNING *
            "#,
        )
        .bind(email)
        .bind(purpose.as_str())
        .bind(code)
        .bind(now)
        .fetch_optional(&self.conn)
        .await?;

        Ok(otp)
    }
}
