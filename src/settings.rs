use config::{Config, ConfigError, File};
use serde::Deserialize;

use crate::models::wallets::WithdrawalSource;

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Http {
    pub listen: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Mpesa {
    pub base_url: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub b2c_shortcode: String,
    pub initiator_name: String,
    pub security_credential: String,
    pub stk_shortcode: String,
    pub stk_passkey: String,
    pub result_url: String,
    pub timeout_url: String,
    pub stk_callback_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Email {
    pub api_url: String,
    pub api_key: String,
    pub sender_name: String,
    pub sender_address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletPolicy {
    pub withdrawal_source: WithdrawalSource,
    pub min_withdrawal_cents: i64,
    pub commission_rate_bps: i64,
    pub pin_max_attempts: i32,
    pub pin_lock_minutes: i64,
    pub otp_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub postgres: Postgres,
    pub http: Http,
    pub mpesa: Mpesa,
    pub email: Email,
    pub wallet: WalletPolicy,
}

impl Settings {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .build()?;

        config.try_deserialize()
    }
}
