use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::PgPool;
use tokio::sync::{mpsc, oneshot};

use super::email::EmailRequest;
use super::{RequestHandler, Service, ServiceError};
use crate::models::otps::OtpPurpose;
use crate::models::users::{PinPolicy, User};
use crate::models::wallets::BalanceSummary;
use crate::repositories::otps::OtpRepository;
use crate::repositories::users::UserRepository;
use crate::repositories::wallets::WalletRepository;
use crate::settings::WalletPolicy;
use crate::utils;

pub enum WalletRequest {
    GetBalance {
        user_id: String,
        response: oneshot::Sender<Result<BalanceSummary, ServiceError>>,
    },
    RequestOtp {
        user_id: String,
        purpose: OtpPurpose,
        response: oneshot::Sender<Result<(), ServiceError>>,
    },
    SetPin {
        user_id: String,
        pin: String,
        otp_code: String,
        response: oneshot::Sender<Result<(), ServiceError>>,
    },
    ChangePin {
        user_id: String,
        current_pin: String,
        new_pin: String,
        otp_code: String,
        response: oneshot::Sender<Result<(), ServiceError>>,
    },
    ResetPin {
        email: String,
        otp_code: String,
        new_pin: String,
        response: oneshot::Sender<Result<(), ServiceError>>,
    },
    /// Used by the withdrawal flow to gate payouts behind the PIN.
    CheckPin {
        user_id: String,
        pin: String,
        response: oneshot::Sender<Result<(), ServiceError>>,
    },
}

#[derive(Clone)]
pub struct WalletRequestHandler {
    users: UserRepository,
    wallets: WalletRepository,
    otps: OtpRepository,
    email_channel: mpsc::Sender<EmailRequest>,
    policy: WalletPolicy,
}

impl WalletRequestHandler {
    pub fn new(
        sql_conn: PgPool,
        email_channel: mpsc::Sender<EmailRequest>,
        policy: WalletPolicy,
    ) -> Self {
        WalletRequestHandler {
            users: UserRepository::new(sql_conn.clone()),
            wallets: WalletRepository::new(sql_conn.clone()),
            otps: OtpRepository::new(sql_conn),
            email_channel,
            policy,
        }
    }

    fn pin_policy(&self) -> PinPolicy {
        PinPolicy {
            max_attempts: self.policy.pin_max_attempts,
            lock_minutes: self.policy.pin_lock_minutes,
        }
    }

    async fn load_user(&self, user_id: &str) -> Result<User, ServiceError> {
        self.users
            .get_user_by_id(user_id)
            .await
            .map_err(|e| ServiceError::Database(e.to_string()))?
            .ok_or_else(|| ServiceError::NotFound(format!("user {}", user_id)))
    }

    async fn get_balance(&self, user_id: &str) -> Result<BalanceSummary, ServiceError> {
        let wallet = self
            .wallets
            .get_wallet(user_id)
            .await
            .map_err(|e| ServiceError::Database(e.to_string()))?
            .ok_or_else(|| ServiceError::NotFound(format!("wallet for user {}", user_id)))?;

        Ok(BalanceSummary::from_wallet(
            &wallet,
            self.policy.withdrawal_source,
        ))
    }

    async fn request_otp(&self, user_id: &str, purpose: OtpPurpose) -> Result<(), ServiceError> {
        let user = self.load_user(user_id).await?;

        let code = utils::generate_otp_code();
        let expires_at = Utc::now().naive_utc() + Duration::minutes(self.policy.otp_ttl_minutes);

        self.otps
            .issue(&user.id, &user.email, purpose, &code, expires_at)
            .await
            .map_err(|e| ServiceError::Database(e.to_string()))?;

        let email_channel = self.email_channel.clone();
        let recipient = user.email.clone();
        tokio::spawn(async move {
            let _ = email_channel
                .send(EmailRequest::SendOtp {
                    recipient,
                    purpose,
                    code,
                })
                .await;
        });

        Ok(())
    }

    fn validate_pin_format(pin: &str) -> Result<(), ServiceError> {
        if pin.len() != 4 || !pin.chars().all(|c| c.is_ascii_digit()) {
            return Err(ServiceError::Validation(
                "wallet PIN must be exactly 4 digits".to_string(),
            ));
        }
        Ok(())
    }

    async fn consume_otp(
        &self,
        email: &str,
        purpose: OtpPurpose,
        code: &str,
    ) -> Result<(), ServiceError> {
        let now = Utc::now().naive_utc();
        self.otps
            .consume(email, purpose, code, now)
            .await
            .map_err(|e| ServiceError::Database(e.to_string()))?
            .map(|_| ())
            .ok_or_else(|| ServiceError::Validation("invalid or expired code".to_string()))
    }

    async fn set_pin(&self, user_id: &str, pin: &str, otp_code: &str) -> Result<(), ServiceError> {
        Self::validate_pin_format(pin)?;
        let user = self.load_user(user_id).await?;

        if user.has_pin() {
            return Err(ServiceError::Conflict(
                "wallet PIN is already set".to_string(),
            ));
        }

        self.consume_otp(&user.email, OtpPurpose::PinChange, otp_code)
            .await?;

        self.users
            .set_wallet_pin(user_id, &utils::hash_secret(pin))
            .await
            .map_err(|e| ServiceError::Database(e.to_string()))
    }

    /// The attempt counter and time lock live on the user row; a successful
    /// check clears both.
    async fn check_pin(&self, user_id: &str, pin: &str) -> Result<(), ServiceError> {
        let user = self.load_user(user_id).await?;
        let now = Utc::now().naive_utc();

        let Some(stored) = &user.wallet_pin else {
            return Err(ServiceError::Validation(
                "wallet PIN has not been set".to_string(),
            ));
        };

        if let Some(until) = user.pin_locked_at(now) {
            return Err(ServiceError::WalletLocked { until });
        }

        if utils::verify_secret(pin, stored) {
            if user.pin_attempts > 0 || user.pin_locked_until.is_some() {
                self.users
                    .reset_pin_attempts(user_id, now)
                    .await
                    .map_err(|e| ServiceError::Database(e.to_string()))?;
            }
            return Ok(());
        }

        let attempts = self
            .users
            .record_failed_pin_attempt(user_id, now)
            .await
            .map_err(|e| ServiceError::Database(e.to_string()))?;

        if let Some(until) = self.pin_policy().lock_until(attempts, now) {
            self.users
                .lock_pin(user_id, until)
                .await
                .map_err(|e| ServiceError::Database(e.to_string()))?;
            return Err(ServiceError::WalletLocked { until });
        }

        Err(ServiceError::Validation("incorrect wallet PIN".to_string()))
    }

    async fn change_pin(
        &self,
        user_id: &str,
        current_pin: &str,
        new_pin: &str,
        otp_code: &str,
    ) -> Result<(), ServiceError> {
        Self::validate_pin_format(new_pin)?;

        self.check_pin(user_id, current_pin).await?;

        let user = self.load_user(user_id).await?;
        self.consume_otp(&user.email, OtpPurpose::PinChange, otp_code)
            .await?;

        self.users
            .set_wallet_pin(user_id, &utils::hash_secret(new_pin))
            .await
            .map_err(|e| ServiceError::Database(e.to_string()))
    }

    /// Reset does not require the old PIN, only possession of the emailed
    /// code; it also clears any active lock.
    async fn reset_pin(
        &self,
        email: &str,
        otp_code: &str,
        new_pin: &str,
    ) -> Result<(), ServiceError> {
        Self::validate_pin_format(new_pin)?;

        let now = Utc::now().naive_utc();
        let otp = self
            .otps
            .consume(email, OtpPurpose::PinReset, otp_code, now)
            .await
            .map_err(|e| ServiceError::Database(e.to_string()))?
            .ok_or_else(|| ServiceError::Validation("invalid or expired code".to_string()))?;

        self.users
            .set_wallet_pin(&otp.user_id, &utils::hash_secret(new_pin))
            .await
            .map_err(|e| ServiceError::Database(e.to_string()))
    }
}

#[async_trait]
impl RequestHandler<WalletRequest> for WalletRequestHandler {
    async fn handle_request(&self, request: WalletRequest) {
        match request {
            WalletRequest::GetBalance { user_id, response } => {
                let result = self.get_balance(&user_id).await;
                let _ = response.send(result);
            }
            WalletRequest::RequestOtp {
                user_id,
                purpose,
                response,
            } => {
                let result = self.request_otp(&user_id, purpose).await;
                let _ = response.send(result);
            }
            WalletRequest::SetPin {
                user_id,
                pin,
                otp_code,
                response,
            } => {
                let result = self.set_pin(&user_id, &pin, &otp_code).await;
                let _ = response.send(result);
            }
            WalletRequest::ChangePin {
                user_id,
                current_pin,
                new_pin,
                otp_code,
                response,
            } => {
                let result = self
                    .change_pin(&user_id, &current_pin, &new_pin, &otp_code)
                    .await;
                let _ = response.send(result);
            }
            WalletRequest::ResetPin {
                email,
                otp_code,
                new_pin,
                response,
            } => {
                let result = self.reset_pin(&email, &otp_code, &new_pin).await;
                let _ = response.send(result);
            }
            WalletRequest::CheckPin {
                user_id,
                pin,
                response,
            } => {
                let result = self.check_pin(&user_id, &pin).await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct WalletService;

impl WalletService {
    pub fn new() -> Self {
        WalletService {}
    }
}

#[async_trait]
impl Service<WalletRequest, WalletRequestHandler> for WalletService {}
