use serde::{Deserialize, Serialize};

// Daraja wire formats. Field names are controlled by the provider, so every
// struct carries explicit renames rather than a blanket rename_all.

/// Daraja amounts are whole shillings while the ledger keeps cents. Returns
/// `None` for amounts that do not convert exactly, so no caller can silently
/// truncate a sub-shilling remainder.
pub fn shillings(amount_cents: i64) -> Option<i64> {
    if amount_cents > 0 && amount_cents % 100 == 0 {
        Some(amount_cents / 100)
    } else {
        None
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct B2cPaymentRequest {
    #[serde(rename = "InitiatorName")]
    pub initiator_name: String,
    #[serde(rename = "SecurityCredential")]
    pub security_credential: String,
    #[serde(rename = "CommandID")]
    pub command_id: String,
    #[serde(rename = "Amount")]
    pub amount: i64,
    #[serde(rename = "PartyA")]
    pub party_a: String,
    #[serde(rename = "PartyB")]
    pub party_b: String,
    #[serde(rename = "Remarks")]
    pub remarks: String,
    #[serde(rename = "QueueTimeOutURL")]
    pub queue_timeout_url: String,
    #[serde(rename = "ResultURL")]
    pub result_url: String,
    #[serde(rename = "Occasion")]
    pub occasion: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct B2cPaymentResponse {
    #[serde(rename = "ConversationID")]
    pub conversation_id: String,
    #[serde(rename = "OriginatorConversationID")]
    pub originator_conversation_id: String,
    #[serde(rename = "ResponseCode")]
    pub response_code: String,
    #[serde(rename = "ResponseDescription")]
    pub response_description: String,
}

/// Body of both the result and the queue-timeout callbacks.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct B2cCallback {
    #[serde(rename = "Result")]
    pub result: B2cResult,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct B2cResult {
    #[serde(rename = "ResultType")]
    pub result_type: i32,
    #[serde(rename = "ResultCode")]
    pub result_code: i32,
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
    #[serde(rename = "OriginatorConversationID")]
    pub originator_conversation_id: String,
    #[serde(rename = "ConversationID")]
    pub conversation_id: String,
    #[serde(rename = "TransactionID", default)]
    pub transaction_id: Option<String>,
}

impl B2cResult {
    pub fn succeeded(&self) -> bool {
        self.result_code == 0
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct StkPushRequest {
    #[serde(rename = "BusinessShortCode")]
    pub business_short_code: String,
    #[serde(rename = "Password")]
    pub password: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "TransactionType")]
    pub transaction_type: String,
    #[serde(rename = "Amount")]
    pub amount: i64,
    #[serde(rename = "PartyA")]
    pub party_a: String,
    #[serde(rename = "PartyB")]
    pub party_b: String,
    #[serde(rename = "PhoneNumber")]
    pub phone_number: String,
    #[serde(rename = "CallBackURL")]
    pub callback_url: String,
    #[serde(rename = "AccountReference")]
    pub account_reference: String,
    #[serde(rename = "TransactionDesc")]
    pub transaction_desc: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct StkPushResponse {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResponseCode")]
    pub response_code: String,
    #[serde(rename = "ResponseDescription")]
    pub response_description: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StkCallbackBody {
    #[serde(rename = "Body")]
    pub body: StkCallbackEnvelope,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StkCallbackEnvelope {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResultCode")]
    pub result_code: i32,
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
    #[serde(rename = "CallbackMetadata", default)]
    pub callback_metadata: Option<StkCallbackMetadata>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StkCallbackMetadata {
    #[serde(rename = "Item")]
    pub items: Vec<StkCallbackItem>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StkCallbackItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value", default)]
    pub value: Option<serde_json::Value>,
}

impl StkCallback {
    pub fn succeeded(&self) -> bool {
        self.result_code == 0
    }

    pub fn mpesa_receipt(&self) -> Option<String> {
        let metadata = self.callback_metadata.as_ref()?;
        metadata
            .items
            .iter()
            .find(|item| item.name == "MpesaReceiptNumber")
            .and_then(|item| item.value.as_ref())
            .and_then(|value| value.as_str().map(str::to_string))
    }

    /// The amount the provider actually collected, in cents. The metadata
    /// reports whole or fractional shillings as a JSON number.
    pub fn amount_cents(&self) -> Option<i64> {
        let metadata = self.callback_metadata.as_ref()?;
        metadata
            .items
            .iter()
            .find(|item| item.name == "Amount")
            .and_then(|item| item.value.as_ref())
            .and_then(|value| value.as_f64())
            .map(|kes| (kes * 100.0).round() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn b2c_result_callback_parses() {
        let body = r#"{
            "Result": {
                "ResultType": 0,
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully.",
                "OriginatorConversationID": "10571-7910404-1",
                "ConversationID": "AG_20191219_00005797af5d7d75f652",
                "TransactionID": "NLJ41HAY6Q"
            }
        }"#;

        let callback: B2cCallback = serde_json::from_str(body).unwrap();
        assert!(callback.result.succeeded());
        assert_eq!(callback.result.transaction_id.as_deref(), Some("NLJ41HAY6Q"));
    }

    #[test]
    fn b2c_timeout_callback_has_no_transaction() {
        let body = r#"{
            "Result": {
                "ResultType": 1,
                "ResultCode": 1,
                "ResultDesc": "The service request timed out.",
                "OriginatorConversationID": "10571-7910404-1",
                "ConversationID": "AG_20191219_00005797af5d7d75f652"
            }
        }"#;

        let callback: B2cCallback = serde_json::from_str(body).unwrap();
        assert!(!callback.result.succeeded());
        assert!(callback.result.transaction_id.is_none());
    }

    #[test]
    fn shilling_conversion_never_truncates() {
        assert_eq!(shillings(10_000), Some(100));
        assert_eq!(shillings(100), Some(1));
        // 10_050 cents is not payable as whole shillings; truncating it to
        // 100 would pay out less than the ledger was debited.
        assert_eq!(shillings(10_050), None);
        assert_eq!(shillings(99), None);
        assert_eq!(shillings(0), None);
        assert_eq!(shillings(-100), None);
    }

    #[test]
    fn stk_callback_receipt_extraction() {
        let body = r#"{
            "Body": {
                "stkCallback": {
                    "MerchantRequestID": "29115-34620561-1",
                    "CheckoutRequestID": "ws_CO_191220191020363925",
                    "ResultCode": 0,
                    "ResultDesc": "The service request is processed successfully.",
                    "CallbackMetadata": {
                        "Item": [
                            {"Name": "Amount", "Value": 1.00},
                            {"Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV"},
                            {"Name": "PhoneNumber", "Value": 254708374149}
                        ]
                    }
                }
            }
        }"#;

        let callback: StkCallbackBody = serde_json::from_str(body).unwrap();
        let stk = callback.body.stk_callback;
        assert!(stk.succeeded());
        assert_eq!(stk.mpesa_receipt().as_deref(), Some("NLJ7RT61SV"));
        assert_eq!(stk.amount_cents(), Some(100));
    }

    #[test]
    fn stk_failure_carries_no_metadata() {
        let body = r#"{
            "Body": {
                "stkCallback": {
                    "MerchantRequestID": "29115-34620561-1",
                    "CheckoutRequestID": "ws_CO_191220191020363925",
                    "ResultCode": 1032,
                    "ResultDesc": "Request cancelled by user."
                }
            }
        }"#;

        let callback: StkCallbackBody = serde_json::from_str(body).unwrap();
        let stk = callback.body.stk_callback;
        assert!(!stk.succeeded());
        assert_eq!(stk.mpesa_receipt(), None);
        assert_eq!(stk.amount_cents(), None);
    }
}
