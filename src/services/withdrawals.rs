use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::{mpsc, oneshot};

use super::payments::PaymentRequest;
use super::wallets::WalletRequest;
use super::{RequestHandler, Service, ServiceError};
use crate::models::mpesa::{self, B2cResult};
use crate::models::withdrawals::{OverrideOutcome, Withdrawal, WithdrawalStatus};
use crate::repositories::wallets::WalletRepository;
use crate::repositories::withdrawals::WithdrawalRepository;
use crate::settings::WalletPolicy;

pub enum WithdrawalRequest {
    Request {
        user_id: String,
        amount_cents: i64,
        phone_number: String,
        pin: String,
        response: oneshot::Sender<Result<Withdrawal, ServiceError>>,
    },
    /// Provider result callback; fire-and-forget, replays are no-ops.
    HandleResult { result: B2cResult },
    /// Provider queue-timeout callback.
    HandleTimeout { result: B2cResult },
    MarkPaidManually {
        withdrawal_id: String,
        transaction_id: String,
        response: oneshot::Sender<Result<Withdrawal, ServiceError>>,
    },
    /// Operator override for a payout stuck in `pending`, e.g. when the
    /// provider result callback never arrived. Refunds the hold.
    MarkFailedManually {
        withdrawal_id: String,
        reason: String,
        response: oneshot::Sender<Result<Withdrawal, ServiceError>>,
    },
    List {
        user_id: String,
        response: oneshot::Sender<Result<Vec<Withdrawal>, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct WithdrawalRequestHandler {
    withdrawals: WithdrawalRepository,
    wallets: WalletRepository,
    wallet_channel: mpsc::Sender<WalletRequest>,
    payment_channel: mpsc::Sender<PaymentRequest>,
    policy: WalletPolicy,
}

impl WithdrawalRequestHandler {
    pub fn new(
        sql_conn: PgPool,
        wallet_channel: mpsc::Sender<WalletRequest>,
        payment_channel: mpsc::Sender<PaymentRequest>,
        policy: WalletPolicy,
    ) -> Self {
        WithdrawalRequestHandler {
            withdrawals: WithdrawalRepository::new(sql_conn.clone()),
            wallets: WalletRepository::new(sql_conn),
            wallet_channel,
            payment_channel,
            policy,
        }
    }

    async fn check_pin(&self, user_id: &str, pin: &str) -> Result<(), ServiceError> {
        let (pin_tx, pin_rx) = oneshot::channel();

        self.wallet_channel
            .send(WalletRequest::CheckPin {
                user_id: user_id.to_string(),
                pin: pin.to_string(),
                response: pin_tx,
            })
            .await
            .map_err(|e| ServiceError::Communication(e.to_string()))?;

        pin_rx
            .await
            .map_err(|e| ServiceError::Communication(e.to_string()))?
    }

    /// Eligibility is checked and the funds are held in a single atomic
    /// step; the payout is only initiated once the hold is in place.
    async fn request_withdrawal(
        &self,
        user_id: &str,
        amount_cents: i64,
        phone_number: &str,
        pin: &str,
    ) -> Result<Withdrawal, ServiceError> {
        if amount_cents < self.policy.min_withdrawal_cents {
            return Err(ServiceError::Validation(format!(
                "minimum withdrawal is {} cents",
                self.policy.min_withdrawal_cents
            )));
        }
        // The provider pays out whole shillings; a sub-shilling remainder
        // would debit the ledger more than is paid out.
        if mpesa::shillings(amount_cents).is_none() {
            return Err(ServiceError::Validation(
                "withdrawal amount must be a whole shilling amount".to_string(),
            ));
        }
        if phone_number.is_empty() {
            return Err(ServiceError::Validation(
                "a payout phone number is required".to_string(),
            ));
        }

        self.check_pin(user_id, pin).await?;

        let held = self
            .withdrawals
            .create_pending(
                user_id,
                amount_cents,
                phone_number,
                self.policy.withdrawal_source,
            )
            .await
            .map_err(|e| ServiceError::Database(e.to_string()))?;

        let Some(withdrawal) = held else {
            let available = self
                .wallets
                .get_wallet(user_id)
                .await
                .map_err(|e| ServiceError::Database(e.to_string()))?
                .map(|w| w.withdrawable_cents(self.policy.withdrawal_source))
                .unwrap_or(0);

            return Err(ServiceError::InsufficientFunds {
                requested_cents: amount_cents,
                available_cents: available,
            });
        };

        match self.initiate_payout(&withdrawal).await {
            Ok(conversation_id) => {
                self.withdrawals
                    .attach_conversation(&withdrawal.id, &conversation_id)
                    .await
                    .map_err(|e| ServiceError::Database(e.to_string()))?;
                Ok(withdrawal)
            }
            Err(e) => {
                // Initiation never reached the provider queue: release the
                // hold immediately instead of waiting for a callback.
                if let Err(refund_err) = self
                    .withdrawals
                    .fail_by_id(&withdrawal.id, "payout initiation failed")
                    .await
                {
                    log::error!(
                        "Could not refund failed withdrawal {}: {}",
                        withdrawal.id,
                        refund_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn initiate_payout(&self, withdrawal: &Withdrawal) -> Result<String, ServiceError> {
        let (payment_tx, payment_rx) = oneshot::channel();

        self.payment_channel
            .send(PaymentRequest::B2cPayout {
                amount_cents: withdrawal.amount_cents,
                phone_number: withdrawal.phone_number.clone(),
                remarks: format!("Wallet withdrawal {}", withdrawal.id),
                response: payment_tx,
            })
            .await
            .map_err(|e| ServiceError::Communication(e.to_string()))?;

        payment_rx
            .await
            .map_err(|e| ServiceError::Communication(e.to_string()))?
    }

    async fn handle_result(&self, result: B2cResult) {
        let conversation_id = result.conversation_id.clone();

        let outcome = if result.succeeded() {
            let transaction_id = result.transaction_id.unwrap_or_default();
            self.withdrawals
                .complete_by_conversation(&conversation_id, &transaction_id)
                .await
        } else {
            self.withdrawals
                .fail_by_conversation(&conversation_id, &result.result_desc)
                .await
        };

        match outcome {
            Ok(Some(withdrawal)) => {
                log::info!(
                    "Withdrawal {} moved to {} (conversation {})",
                    withdrawal.id,
                    withdrawal.status,
                    conversation_id
                );
            }
            Ok(None) => {
                log::warn!(
                    "Ignoring B2C callback for unknown or settled conversation {}",
                    conversation_id
                );
            }
            Err(e) => {
                log::error!(
                    "Failed to apply B2C callback for conversation {}: {}",
                    conversation_id,
                    e
                );
            }
        }
    }

    async fn handle_timeout(&self, result: B2cResult) {
        let conversation_id = result.conversation_id.clone();

        match self
            .withdrawals
            .fail_by_conversation(&conversation_id, "payout timed out in the provider queue")
            .await
        {
            Ok(Some(withdrawal)) => {
                log::warn!("Withdrawal {} timed out and was refunded", withdrawal.id);
            }
            Ok(None) => {
                log::warn!(
                    "Ignoring timeout callback for unknown or settled conversation {}",
                    conversation_id
                );
            }
            Err(e) => {
                log::error!(
                    "Failed to apply timeout callback for conversation {}: {}",
                    conversation_id,
                    e
                );
            }
        }
    }

    async fn mark_paid_manually(
        &self,
        withdrawal_id: &str,
        transaction_id: &str,
    ) -> Result<Withdrawal, ServiceError> {
        let outcome = self
            .withdrawals
            .mark_paid_manually(withdrawal_id, transaction_id)
            .await
            .map_err(|e| ServiceError::Database(e.to_string()))?;

        match outcome {
            OverrideOutcome::Completed(withdrawal) => Ok(withdrawal),
            OverrideOutcome::NotFailed => Err(ServiceError::Conflict(
                "withdrawal is not in the failed state".to_string(),
            )),
            OverrideOutcome::FundsUnavailable => Err(ServiceError::Conflict(
                "refunded balance has already been spent".to_string(),
            )),
        }
    }

    async fn mark_failed_manually(
        &self,
        withdrawal_id: &str,
        reason: &str,
    ) -> Result<Withdrawal, ServiceError> {
        let failed = self
            .withdrawals
            .fail_by_id(withdrawal_id, reason)
            .await
            .map_err(|e| ServiceError::Database(e.to_string()))?;

        if let Some(withdrawal) = failed {
            log::warn!(
                "Withdrawal {} failed by operator and refunded: {}",
                withdrawal.id,
                reason
            );
            return Ok(withdrawal);
        }

        match self
            .withdrawals
            .get_withdrawal(withdrawal_id)
            .await
            .map_err(|e| ServiceError::Database(e.to_string()))?
        {
            None => Err(ServiceError::NotFound("withdrawal".to_string())),
            Some(withdrawal) => {
                let status = WithdrawalStatus::parse(&withdrawal.status)
                    .map(|status| status.as_str())
                    .unwrap_or("in an unknown state");
                Err(ServiceError::Conflict(format!(
                    "withdrawal is already {}",
                    status
                )))
            }
        }
    }

    async fn list(&self, user_id: &str) -> Result<Vec<Withdrawal>, ServiceError> {
        self.withdrawals
            .list_for_user(user_id)
            .await
            .map_err(|e| ServiceError::Database(e.to_string()))
    }
}

#[async_trait]
impl RequestHandler<WithdrawalRequest> for WithdrawalRequestHandler {
    async fn handle_request(&self, request: WithdrawalRequest) {
        match request {
            WithdrawalRequest::Request {
                user_id,
                amount_cents,
                phone_number,
                pin,
                response,
            } => {
                let result = self
                    .request_withdrawal(&user_id, amount_cents, &phone_number, &pin)
                    .await;
                let _ = response.send(result);
            }
            WithdrawalRequest::HandleResult { result } => {
                self.handle_result(result).await;
            }
            WithdrawalRequest::HandleTimeout { result } => {
                self.handle_timeout(result).await;
            }
            WithdrawalRequest::MarkPaidManually {
                withdrawal_id,
                transaction_id,
                response,
            } => {
                let result = self.mark_paid_manually(&withdrawal_id, &transaction_id).await;
                let _ = response.send(result);
            }
            WithdrawalRequest::MarkFailedManually {
                withdrawal_id,
                reason,
                response,
            } => {
                let result = self.mark_failed_manually(&withdrawal_id, &reason).await;
                let _ = response.send(result);
            }
            WithdrawalRequest::List { user_id, response } => {
                let result = self.list(&user_id).await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct WithdrawalService;

impl WithdrawalService {
    pub fn new() -> Self {
        WithdrawalService {}
    }
}

#[async_trait]
impl Service<WithdrawalRequest, WithdrawalRequestHandler> for WithdrawalService {}
