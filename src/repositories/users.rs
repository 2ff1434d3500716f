use anyhow::bail;
use chrono::NaiveDateTime;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::users::{NewUser, User};
use crate::utils;

#[derive(Clone)]
pub struct UserRepository {
    conn: PgPool,
}

impl UserRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }

    /// Creates the user and their wallet row in one transaction. The
    /// `referred_by` linkage is resolved here, at write time, from the
    /// presented referral code; unknown codes leave the user unreferred.
    pub async fn insert_user(
        &self,
        new_user: &NewUser,
        password_hash: &str,
        referral_code: &str,
    ) -> Result<User, anyhow::Error> {
        let user_id = Uuid::new_v4().hyphenated().to_string();

        let referred_by: Option<String> = match &new_user.referral_code {
            Some(code) => {
                sqlx::query_scalar("SELECT id FROM users WHERE referral_code = $1")
                    .bind(code)
                    .fetch_optional(&self.conn)
                    .await?
            }
            None => None,
        };

        let mut tx = self.conn.begin().await?;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, phone_number, password_hash, referral_code, referred_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&user_id)
        .bind(&new_user.email)
        .bind(&new_user.phone_number)
        .bind(password_hash)
        .bind(referral_code)
        .bind(&referred_by)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO wallets (user_id) VALUES ($1)")
            .bind(&user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(user)
    }

    pub async fn get_user_by_id(&self, user_id: &str) -> Result<Option<User>, anyhow::Error> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.conn)
            .await?;

        Ok(user)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, anyhow::Error> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.conn)
            .await?;

        Ok(user)
    }

    pub async fn verify_email(&self, user_id: &str) -> Result<(), anyhow::Error> {
        let result = sqlx::query(
            "UPDATE users SET email_verified = TRUE, updated_at = CURRENT_TIMESTAMP WHERE id = $1",
        )
        .bind(user_id)
        .execute(&self.conn)
        .await?;

        if result.rows_affected() == 0 {
            bail!("user not found: {}", user_id);
        }

        Ok(())
    }

    /// Stores a new PIN hash and clears any attempt counters and lock.
    pub async fn set_wallet_pin(&self, user_id: &str, pin_hash: &str) -> Result<(), anyhow::Error> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET wallet_pin = $2,
                pin_attempts = 0,
                pin_locked_until = NULL,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(pin_hash)
        .execute(&self.conn)
        .await?;

        if result.rows_affected() == 0 {
            bail!("user not found: {}", user_id);
        }

        Ok(())
    }

    /// Returns the attempt count after the increment so the caller can apply
    /// the lockout policy.
    pub async fn record_failed_pin_attempt(
        &self,
        user_id: &str,
        now: NaiveDateTime,
    ) -> Result<i32, anyhow::Error> {
        let attempts: i32 = sqlx::query_scalar(
            r#"
            UPDATE users
            SET pin_attempts = pin_attempts + 1,
                last_pin_attempt = $2,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1
            RETURNING pin_attempts
            "#,
        )
        .bind(user_id)
        .bind(now)
        .fetch_one(&self.conn)
        .await?;

        Ok(attempts)
    }

    pub async fn lock_pin(&self, user_id: &str, until: NaiveDateTime) -> Result<(), anyhow::Error> {
        sqlx::query(
            "UPDATE users SET pin_locked_until = $2, updated_at = CURRENT_TIMESTAMP WHERE id = $1",
        )
        .bind(user_id)
        .bind(until)
        .execute(&self.conn)
        .await?;

        Ok(())
    }

    pub async fn reset_pin_attempts(
        &self,
        user_id: &str,
        now: NaiveDateTime,
    ) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            UPDATE users
            SET pin_attempts = 0,
                pin_locked_until = NULL,
                last_pin_attempt = $2,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(now)
        .execute(&self.conn)
        .await?;

        Ok(())
    }

    /// Generates a referral code that is not already taken. The unique index
    /// still backstops the race between the check and the insert.
    pub async fn unused_referral_code(&self) -> Result<String, anyhow::Error> {
        for _ in 0..5 {
            let code = utils::generate_referral_code(8);
            let taken: Option<String> =
                sqlx::query_scalar("SELECT id FROM users WHERE referral_code = $1")
                    .bind(&code)
                    .fetch_optional(&self.conn)
                    .await?;
            if taken.is_none() {
                return Ok(code);
            }
        }

        bail!("could not generate an unused referral code")
    }
}
