use anyhow::bail;
use serde_json::json;

use crate::models::otps::OtpPurpose;
use crate::settings;

/// Brevo transactional-email client. The contract is "send OTP to address,
/// given purpose and code"; templates live here, delivery lives with the
/// provider.
pub struct BrevoApi {
    settings: settings::Email,
    client: reqwest::Client,
}

impl BrevoApi {
    pub fn new(settings: settings::Email) -> Self {
        Self {
            settings,
            client: reqwest::Client::new(),
        }
    }

    pub async fn send_otp_email(
        &self,
        recipient: &str,
        purpose: OtpPurpose,
        code: &str,
        ttl_minutes: i64,
    ) -> Result<(), anyhow::Error> {
        let subject = match purpose {
            OtpPurpose::EmailVerification => "Verify your email address",
            OtpPurpose::PinReset => "Reset your wallet PIN",
            OtpPurpose::PinChange => "Confirm your wallet PIN change",
        };

        let payload = json!({
            "sender": {
                "name": self.settings.sender_name,
                "email": self.settings.sender_address,
            },
            "to": [{"email": recipient}],
            "subject": subject,
            "textContent": format!(
                "Your verification code is {}. It expires in {} minutes.",
                code, ttl_minutes
            ),
        });

        let response = self
            .client
            .post(format!("{}/v3/smtp/email", self.settings.api_url))
            .header("api-key", &self.settings.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            bail!("Brevo: send failed with {}", response.status());
        }

        Ok(())
    }
}
