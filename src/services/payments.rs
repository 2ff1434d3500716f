use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::oneshot;

use super::{RequestHandler, Service, ServiceError};
use crate::models::deposits::Deposit;
use crate::models::mpesa::{self, StkCallback};
use crate::repositories::deposits::DepositRepository;
use crate::repositories::mpesa::DarajaApi;
use crate::settings;

pub enum PaymentRequest {
    /// Initiates a B2C payout and hands back the provider conversation id
    /// the asynchronous result will be keyed on.
    B2cPayout {
        amount_cents: i64,
        phone_number: String,
        remarks: String,
        response: oneshot::Sender<Result<String, ServiceError>>,
    },
    RequestDeposit {
        user_id: String,
        amount_cents: i64,
        phone_number: String,
        response: oneshot::Sender<Result<Deposit, ServiceError>>,
    },
    HandleStkCallback { callback: StkCallback },
    ListDeposits {
        user_id: String,
        response: oneshot::Sender<Result<Vec<Deposit>, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct PaymentRequestHandler {
    api: Arc<DarajaApi>,
    deposits: DepositRepository,
}

impl PaymentRequestHandler {
    pub fn new(mpesa_settings: settings::Mpesa, sql_conn: PgPool) -> Self {
        PaymentRequestHandler {
            api: Arc::new(DarajaApi::new(mpesa_settings)),
            deposits: DepositRepository::new(sql_conn),
        }
    }

    async fn b2c_payout(
        &self,
        amount_cents: i64,
        phone_number: &str,
        remarks: &str,
    ) -> Result<String, ServiceError> {
        let payment = self
            .api
            .b2c_payment(amount_cents, phone_number, remarks)
            .await
            .map_err(|e| ServiceError::ExternalService("Daraja".to_string(), e.to_string()))?;

        Ok(payment.conversation_id)
    }

    async fn request_deposit(
        &self,
        user_id: &str,
        amount_cents: i64,
        phone_number: &str,
    ) -> Result<Deposit, ServiceError> {
        if mpesa::shillings(amount_cents).is_none() {
            return Err(ServiceError::Validation(
                "deposit amount must be a positive whole shilling amount".to_string(),
            ));
        }

        let stk = self
            .api
            .stk_push(amount_cents, phone_number, user_id)
            .await
            .map_err(|e| ServiceError::ExternalService("Daraja".to_string(), e.to_string()))?;

        self.deposits
            .create_pending(user_id, amount_cents, phone_number, &stk.checkout_request_id)
            .await
            .map_err(|e| ServiceError::Database(e.to_string()))
    }

    async fn handle_stk_callback(&self, callback: StkCallback) {
        let checkout_id = callback.checkout_request_id.clone();

        let outcome = if callback.succeeded() {
            let receipt = callback.mpesa_receipt().unwrap_or_default();
            let collected = callback.amount_cents();
            match self
                .deposits
                .complete_by_checkout(&checkout_id, &receipt, collected)
                .await
            {
                Ok(Some(deposit)) => {
                    if let Some(collected) = collected {
                        if collected != deposit.amount_cents {
                            log::warn!(
                                "Deposit {} requested {} cents but the provider collected {}",
                                deposit.id,
                                deposit.amount_cents,
                                collected
                            );
                        }
                    }
                    Ok(Some(deposit))
                }
                other => other,
            }
        } else {
            self.deposits.fail_by_checkout(&checkout_id).await
        };

        match outcome {
            Ok(Some(deposit)) => {
                log::info!("Deposit {} moved to {}", deposit.id, deposit.status);
            }
            Ok(None) => {
                log::warn!(
                    "Ignoring STK callback for unknown or settled checkout {}",
                    checkout_id
                );
            }
            Err(e) => {
                log::error!("Failed to apply STK callback for checkout {}: {}", checkout_id, e);
            }
        }
    }
}

#[async_trait]
impl RequestHandler<PaymentRequest> for PaymentRequestHandler {
    async fn handle_request(&self, request: PaymentRequest) {
        match request {
            PaymentRequest::B2cPayout {
                amount_cents,
                phone_number,
                remarks,
                response,
            } => {
                let result = self.b2c_payout(amount_cents, &phone_number, &remarks).await;
                let _ = response.send(result);
            }
            PaymentRequest::RequestDeposit {
                user_id,
                amount_cents,
                phone_number,
                response,
            } => {
                let result = self
                    .request_deposit(&user_id, amount_cents, &phone_number)
                    .await;
                let _ = response.send(result);
            }
            PaymentRequest::HandleStkCallback { callback } => {
                self.handle_stk_callback(callback).await;
            }
            PaymentRequest::ListDeposits { user_id, response } => {
                let result = self
                    .deposits
                    .list_for_user(&user_id)
                    .await
                    .map_err(|e| ServiceError::Database(e.to_string()));
                let _ = response.send(result);
            }
        }
    }
}

pub struct PaymentService;

impl PaymentService {
    pub fn new() -> Self {
        PaymentService {}
    }
}

#[async_trait]
impl Service<PaymentRequest, PaymentRequestHandler> for PaymentService {}
