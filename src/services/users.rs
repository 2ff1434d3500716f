use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::PgPool;
use tokio::sync::{mpsc, oneshot};

use super::email::EmailRequest;
use super::{RequestHandler, Service, ServiceError};
use crate::models::otps::OtpPurpose;
use crate::models::users::{NewUser, User};
use crate::repositories::otps::OtpRepository;
use crate::repositories::users::UserRepository;
use crate::settings::WalletPolicy;
use crate::utils;

pub enum UserRequest {
    Register {
        new_user: NewUser,
        response: oneshot::Sender<Result<User, ServiceError>>,
    },
    VerifyEmail {
        email: String,
        code: String,
        response: oneshot::Sender<Result<(), ServiceError>>,
    },
    GetUser {
        id: String,
        response: oneshot::Sender<Result<Option<User>, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct UserRequestHandler {
    users: UserRepository,
    otps: OtpRepository,
    email_channel: mpsc::Sender<EmailRequest>,
    policy: WalletPolicy,
}

impl UserRequestHandler {
    pub fn new(
        sql_conn: PgPool,
        email_channel: mpsc::Sender<EmailRequest>,
        policy: WalletPolicy,
    ) -> Self {
        UserRequestHandler {
            users: UserRepository::new(sql_conn.clone()),
            otps: OtpRepository::new(sql_conn),
            email_channel,
            policy,
        }
    }

    async fn register(&self, new_user: NewUser) -> Result<User, ServiceError> {
        if !new_user.email.contains('@') {
            return Err(ServiceError::Validation(
                "a valid email address is required".to_string(),
            ));
        }
        if new_user.password.len() < 8 {
            return Err(ServiceError::Validation(
                "password must be at least 8 characters".to_string(),
            ));
        }

        if self
            .users
            .get_user_by_email(&new_user.email)
            .await
            .map_err(|e| ServiceError::Database(e.to_string()))?
            .is_some()
        {
            return Err(ServiceError::Conflict(
                "email is already registered".to_string(),
            ));
        }

        let password_hash = utils::hash_secret(&new_user.password);
        let referral_code = self
            .users
            .unused_referral_code()
            .await
            .map_err(|e| ServiceError::Database(e.to_string()))?;

        let user = self
            .users
            .insert_user(&new_user, &password_hash, &referral_code)
            .await
            .map_err(registration_conflict)?;

        self.send_otp(&user, OtpPurpose::EmailVerification).await?;

        Ok(user)
    }

    async fn send_otp(&self, user: &User, purpose: OtpPurpose) -> Result<(), ServiceError> {
        let code = utils::generate_otp_code();
        let expires_at =
            Utc::now().naive_utc() + Duration::minutes(self.policy.otp_ttl_minutes);

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

    async fn verify_email(&self, email: &str, code: &str) -> Result<(), ServiceError> {
        let now = Utc::now().naive_utc();
        let otp = self
            .otps
            .consume(email, OtpPurpose::EmailVerification, code, now)
            .await
            .map_err(|e| ServiceError::Database(e.to_string()))?;

        match otp {
            Some(otp) => self
                .users
                .verify_email(&otp.user_id)
                .await
                .map_err(|e| ServiceError::Database(e.to_string())),
            None => Err(ServiceError::Validation(
                "invalid or expired verification code".to_string(),
            )),
        }
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>, ServiceError> {
        self.users
            .get_user_by_id(id)
            .await
            .map_err(|e| ServiceError::Database(e.to_string()))
    }
}

/// Two concurrent registrations can both pass the email pre-check; the
/// unique constraint is the authority, so its violation surfaces as the
/// same conflict the pre-check reports.
fn registration_conflict(error: anyhow::Error) -> ServiceError {
    match error.downcast_ref::<sqlx::Error>() {
        Some(sqlx::Error::Database(db)) if db.constraint() == Some("users_email_key") => {
            ServiceError::Conflict("email is already registered".to_string())
        }
        _ => ServiceError::Database(error.to_string()),
    }
}

#[async_trait]
impl RequestHandler<UserRequest> for UserRequestHandler {
    async fn handle_request(&self, request: UserRequest) {
        match request {
            UserRequest::Register { new_user, response } => {
                let user = self.register(new_user).await;
                let _ = response.send(user);
            }
            UserRequest::VerifyEmail {
                email,
                code,
                response,
            } => {
                let result = self.verify_email(&email, &code).await;
                let _ = response.send(result);
            }
            UserRequest::GetUser { id, response } => {
                let user = self.get_user(&id).await;
                let _ = response.send(user);
            }
        }
    }
}

pub struct UserService;

impl UserService {
    pub fn new() -> Self {
        UserService {}
    }
}

#[async_trait]
impl Service<UserRequest, UserRequestHandler> for UserService {}

#[cfg(test)]
mod tests {
    use super::*;

    // Reproducing a live unique violation needs a Postgres connection; these
    // cover the classification fallbacks around it.

    #[test]
    fn plain_errors_stay_database_errors() {
        let error = anyhow::anyhow!("connection reset by peer");
        assert!(matches!(
            registration_conflict(error),
            ServiceError::Database(_)
        ));
    }

    #[test]
    fn sqlx_errors_without_a_constraint_stay_database_errors() {
        let error = anyhow::Error::new(sqlx::Error::RowNotFound);
        assert!(matches!(
            registration_conflict(error),
            ServiceError::Database(_)
        ));
    }
}
