use anyhow::bail;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;

use crate::models::mpesa;
use crate::settings;

/// Thin client for the Daraja REST API: OAuth token fetch, B2C payout
/// initiation and STK push initiation. Results arrive later on the
/// asynchronous callback endpoints, not here.
pub struct DarajaApi {
    settings: settings::Mpesa,
    client: reqwest::Client,
}

impl DarajaApi {
    pub fn new(settings: settings::Mpesa) -> Self {
        Self {
            settings,
            client: reqwest::Client::new(),
        }
    }

    async fn access_token(&self) -> Result<String, anyhow::Error> {
        let response = self
            .client
            .get(format!(
                "{}/oauth/v1/generate?grant_type=client_credentials",
                self.settings.base_url
            ))
            .basic_auth(
                &self.settings.consumer_key,
                Some(&self.settings.consumer_secret),
            )
            .send()
            .await?;

        if !response.status().is_success() {
            bail!("Daraja: token request failed with {}", response.status());
        }

        let token: mpesa::TokenResponse = response.json().await?;
        Ok(token.access_token)
    }

    pub async fn b2c_payment(
        &self,
        amount_cents: i64,
        phone_number: &str,
        remarks: &str,
    ) -> Result<mpesa::B2cPaymentResponse, anyhow::Error> {
        let Some(amount) = mpesa::shillings(amount_cents) else {
            bail!("Daraja: {} cents is not a whole shilling amount", amount_cents);
        };

        let token = self.access_token().await?;

        let payload = mpesa::B2cPaymentRequest {
            initiator_name: self.settings.initiator_name.clone(),
            security_credential: self.settings.security_credential.clone(),
            command_id: "BusinessPayment".to_string(),
            amount,
            party_a: self.settings.b2c_shortcode.clone(),
            party_b: phone_number.to_string(),
            remarks: remarks.to_string(),
            queue_timeout_url: self.settings.timeout_url.clone(),
            result_url: self.settings.result_url.clone(),
            occasion: String::new(),
        };

        let response = self
            .client
            .post(format!(
                "{}/mpesa/b2c/v1/paymentrequest",
                self.settings.base_url
            ))
            .bearer_auth(&token)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            bail!("Daraja: B2C request failed with {}", response.status());
        }

        let b2c: mpesa::B2cPaymentResponse = response.json().await?;
        if b2c.response_code != "0" {
            bail!("Daraja: B2C rejected: {}", b2c.response_description);
        }

        Ok(b2c)
    }

    pub async fn stk_push(
        &self,
        amount_cents: i64,
        phone_number: &str,
        account_reference: &str,
    ) -> Result<mpesa::StkPushResponse, anyhow::Error> {
        let Some(amount) = mpesa::shillings(amount_cents) else {
            bail!("Daraja: {} cents is not a whole shilling amount", amount_cents);
        };

        let token = self.access_token().await?;

        let timestamp = Utc::now().format("%Y%m%d%H%M%S").to_string();
        let password = BASE64.encode(format!(
            "{}{}{}",
            self.settings.stk_shortcode, self.settings.stk_passkey, timestamp
        ));

        let payload = mpesa::StkPushRequest {
            business_short_code: self.settings.stk_shortcode.clone(),
            password,
            timestamp,
            transaction_type: "CustomerPayBillOnline".to_string(),
            amount,
            party_a: phone_number.to_string(),
            party_b: self.settings.stk_shortcode.clone(),
            phone_number: phone_number.to_string(),
            callback_url: self.settings.stk_callback_url.clone(),
            account_reference: account_reference.to_string(),
            transaction_desc: "Wallet deposit".to_string(),
        };

        let response = self
            .client
            .post(format!(
                "{}/mpesa/stkpush/v1/processrequest",
                self.settings.base_url
            ))
            .bearer_auth(&token)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            bail!("Daraja: STK push failed with {}", response.status());
        }

        let stk: mpesa::StkPushResponse = response.json().await?;
        if stk.response_code != "0" {
            bail!("Daraja: STK push rejected: {}", stk.response_description);
        }

        Ok(stk)
    }
}
