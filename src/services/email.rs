use std::sync::Arc;

use async_trait::async_trait;

use super::{RequestHandler, Service};
use crate::models::otps::OtpPurpose;
use crate::repositories::email::BrevoApi;
use crate::settings;

/// Fire-and-forget delivery: callers never wait on the provider, failures
/// are logged and the OTP simply expires unused.
pub enum EmailRequest {
    SendOtp {
        recipient: String,
        purpose: OtpPurpose,
        code: String,
    },
}

#[derive(Clone)]
pub struct EmailRequestHandler {
    api: Arc<BrevoApi>,
    otp_ttl_minutes: i64,
}

impl EmailRequestHandler {
    pub fn new(settings: settings::Email, otp_ttl_minutes: i64) -> Self {
        EmailRequestHandler {
            api: Arc::new(BrevoApi::new(settings)),
            otp_ttl_minutes,
        }
    }
}

#[async_trait]
impl RequestHandler<EmailRequest> for EmailRequestHandler {
    async fn handle_request(&self, request: EmailRequest) {
        match request {
            EmailRequest::SendOtp {
                recipient,
                purpose,
                code,
            } => {
                if let Err(e) = self
                    .api
                    .send_otp_email(&recipient, purpose, &code, self.otp_ttl_minutes)
                    .await
                {
                    log::error!("Failed to deliver OTP email to {}: {}", recipient, e);
                }
            }
        }
    }
}

pub struct EmailService;

impl EmailService {
    pub fn new() -> Self {
        EmailService {}
    }
}

#[async_trait]
impl Service<EmailRequest, EmailRequestHandler> for EmailService {}
