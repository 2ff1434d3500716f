use sqlx::PgPool;

use crate::models::wallets::Wallet;

#[derive(Clone)]
pub struct WalletRepository {
    conn: PgPool,
}

impl WalletRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }

    pub async fn get_wallet(&self, user_id: &str) -> Result<Option<Wallet>, anyhow::Error> {
        let wallet = sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.conn)
            .await?;

        Ok(wallet)
    }
}
