use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tower_http::trace::TraceLayer;

use super::commissions::CommissionRequest;
use super::payments::PaymentRequest;
use super::users::UserRequest;
use super::wallets::WalletRequest;
use super::withdrawals::WithdrawalRequest;
use super::ServiceError;
use crate::models::deposits::NewDeposit;
use crate::models::mpesa::{B2cCallback, StkCallbackBody};
use crate::models::otps::OtpPurpose;
use crate::models::users::NewUser;
use crate::models::withdrawals::NewWithdrawal;

#[derive(Clone)]
struct AppState {
    user_channel: mpsc::Sender<UserRequest>,
    wallet_channel: mpsc::Sender<WalletRequest>,
    withdrawal_channel: mpsc::Sender<WithdrawalRequest>,
    commission_channel: mpsc::Sender<CommissionRequest>,
    payment_channel: mpsc::Sender<PaymentRequest>,
}

fn error_response(error: ServiceError) -> (StatusCode, Json<Value>) {
    let status = match &error {
        ServiceError::Validation(_) | ServiceError::InsufficientFunds { .. } => {
            StatusCode::BAD_REQUEST
        }
        ServiceError::WalletLocked { .. } => StatusCode::LOCKED,
        ServiceError::Conflict(_) => StatusCode::CONFLICT,
        ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::ExternalService(_, _) => StatusCode::BAD_GATEWAY,
        ServiceError::Database(_) | ServiceError::Communication(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    (status, Json(json!({"description": error.to_string()})))
}

fn channel_closed() -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"description": "Service unavailable."})),
    )
}

/// Collapses the send/await/match dance every handler repeats.
async fn settle<T: Serialize>(
    sent: Result<(), impl std::error::Error>,
    receiver: oneshot::Receiver<Result<T, ServiceError>>,
    success: StatusCode,
) -> (StatusCode, Json<Value>) {
    if sent.is_err() {
        return channel_closed();
    }

    match receiver.await {
        Ok(Ok(body)) => (success, Json(json!(body))),
        Ok(Err(service_error)) => error_response(service_error),
        Err(_) => channel_closed(),
    }
}

async fn register_user(
    State(state): State<AppState>,
    Json(req): Json<NewUser>,
) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    let sent = state
        .user_channel
        .send(UserRequest::Register {
            new_user: req,
            response: tx,
        })
        .await;

    settle(sent, rx, StatusCode::CREATED).await
}

#[derive(Deserialize)]
struct VerifyEmailBody {
    email: String,
    code: String,
}

async fn verify_email(
    State(state): State<AppState>,
    Json(req): Json<VerifyEmailBody>,
) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    let sent = state
        .user_channel
        .send(UserRequest::VerifyEmail {
            email: req.email,
            code: req.code,
            response: tx,
        })
        .await;

    settle(sent, rx, StatusCode::OK).await
}

async fn get_user(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    let sent = state
        .user_channel
        .send(UserRequest::GetUser { id, response: tx })
        .await;

    if sent.is_err() {
        return channel_closed();
    }

    match rx.await {
        Ok(Ok(Some(user))) => (StatusCode::OK, Json(json!(user))),
        Ok(Ok(None)) => (
            StatusCode::NOT_FOUND,
            Json(json!({"description": "User not found."})),
        ),
        Ok(Err(service_error)) => error_response(service_error),
        Err(_) => channel_closed(),
    }
}

async fn get_balance(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    let sent = state
        .wallet_channel
        .send(WalletRequest::GetBalance {
            user_id,
            response: tx,
        })
        .await;

    settle(sent, rx, StatusCode::OK).await
}

#[derive(Deserialize)]
struct OtpRequestBody {
    user_id: String,
    purpose: OtpPurpose,
}

async fn request_otp(
    State(state): State<AppState>,
    Json(req): Json<OtpRequestBody>,
) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    let sent = state
        .wallet_channel
        .send(WalletRequest::RequestOtp {
            user_id: req.user_id,
            purpose: req.purpose,
            response: tx,
        })
        .await;

    settle(sent, rx, StatusCode::ACCEPTED).await
}

#[derive(Deserialize)]
struct SetPinBody {
    user_id: String,
    pin: String,
    otp_code: String,
}

async fn set_pin(State(state): State<AppState>, Json(req): Json<SetPinBody>) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    let sent = state
        .wallet_channel
        .send(WalletRequest::SetPin {
            user_id: req.user_id,
            pin: req.pin,
            otp_code: req.otp_code,
            response: tx,
        })
        .await;

    settle(sent, rx, StatusCode::OK).await
}

#[derive(Deserialize)]
struct ChangePinBody {
    user_id: String,
    current_pin: String,
    new_pin: String,
    otp_code: String,
}

async fn change_pin(
    State(state): State<AppState>,
    Json(req): Json<ChangePinBody>,
) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    let sent = state
        .wallet_channel
        .send(WalletRequest::ChangePin {
            user_id: req.user_id,
            current_pin: req.current_pin,
            new_pin: req.new_pin,
            otp_code: req.otp_code,
            response: tx,
        })
        .await;

    settle(sent, rx, StatusCode::OK).await
}

#[derive(Deserialize)]
struct ResetPinBody {
    email: String,
    otp_code: String,
    new_pin: String,
}

async fn reset_pin(
    State(state): State<AppState>,
    Json(req): Json<ResetPinBody>,
) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    let sent = state
        .wallet_channel
        .send(WalletRequest::ResetPin {
            email: req.email,
            otp_code: req.otp_code,
            new_pin: req.new_pin,
            response: tx,
        })
        .await;

    settle(sent, rx, StatusCode::OK).await
}

async fn request_withdrawal(
    State(state): State<AppState>,
    Json(req): Json<NewWithdrawal>,
) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    let sent = state
        .withdrawal_channel
        .send(WithdrawalRequest::Request {
            user_id: req.user_id,
            amount_cents: req.amount_cents,
            phone_number: req.phone_number,
            pin: req.pin,
            response: tx,
        })
        .await;

    settle(sent, rx, StatusCode::CREATED).await
}

async fn list_withdrawals(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    let sent = state
        .withdrawal_channel
        .send(WithdrawalRequest::List {
            user_id,
            response: tx,
        })
        .await;

    settle(sent, rx, StatusCode::OK).await
}

#[derive(Deserialize)]
struct MarkPaidBody {
    transaction_id: String,
}

async fn mark_withdrawal_paid(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<MarkPaidBody>,
) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    let sent = state
        .withdrawal_channel
        .send(WithdrawalRequest::MarkPaidManually {
            withdrawal_id: id,
            transaction_id: req.transaction_id,
            response: tx,
        })
        .await;

    settle(sent, rx, StatusCode::OK).await
}

#[derive(Deserialize)]
struct MarkFailedBody {
    reason: String,
}

async fn mark_withdrawal_failed(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<MarkFailedBody>,
) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    let sent = state
        .withdrawal_channel
        .send(WithdrawalRequest::MarkFailedManually {
            withdrawal_id: id,
            reason: req.reason,
            response: tx,
        })
        .await;

    settle(sent, rx, StatusCode::OK).await
}

async fn request_deposit(
    State(state): State<AppState>,
    Json(req): Json<NewDeposit>,
) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    let sent = state
        .payment_channel
        .send(PaymentRequest::RequestDeposit {
            user_id: req.user_id,
            amount_cents: req.amount_cents,
            phone_number: req.phone_number,
            response: tx,
        })
        .await;

    settle(sent, rx, StatusCode::CREATED).await
}

async fn list_deposits(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    let sent = state
        .payment_channel
        .send(PaymentRequest::ListDeposits {
            user_id,
            response: tx,
        })
        .await;

    settle(sent, rx, StatusCode::OK).await
}

#[derive(Deserialize)]
struct OrderPaidBody {
    order_ref: String,
    buyer_id: String,
    order_amount_cents: i64,
}

async fn order_paid(
    State(state): State<AppState>,
    Json(req): Json<OrderPaidBody>,
) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    let sent = state
        .commission_channel
        .send(CommissionRequest::OrderPaid {
            order_ref: req.order_ref,
            buyer_id: req.buyer_id,
            order_amount_cents: req.order_amount_cents,
            response: tx,
        })
        .await;

    settle(sent, rx, StatusCode::CREATED).await
}

#[derive(Deserialize)]
struct ManualCommissionBody {
    referrer_id: String,
    amount_cents: i64,
    description: String,
}

async fn manual_commission(
    State(state): State<AppState>,
    Json(req): Json<ManualCommissionBody>,
) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    let sent = state
        .commission_channel
        .send(CommissionRequest::Manual {
            referrer_id: req.referrer_id,
            amount_cents: req.amount_cents,
            description: req.description,
            response: tx,
        })
        .await;

    settle(sent, rx, StatusCode::CREATED).await
}

async fn list_commissions(
    State(state): State<AppState>,
    Path(referrer_id): Path<String>,
) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    let sent = state
        .commission_channel
        .send(CommissionRequest::List {
            referrer_id,
            response: tx,
        })
        .await;

    settle(sent, rx, StatusCode::OK).await
}

// The provider retries callbacks it considers undelivered, so these always
// acknowledge; deduplication happens in the guarded status transitions.

fn callback_ack() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({"ResultCode": 0, "ResultDesc": "Accepted"})),
    )
}

async fn b2c_result_callback(
    State(state): State<AppState>,
    Json(callback): Json<B2cCallback>,
) -> impl IntoResponse {
    let _ = state
        .withdrawal_channel
        .send(WithdrawalRequest::HandleResult {
            result: callback.result,
        })
        .await;

    callback_ack()
}

async fn b2c_timeout_callback(
    State(state): State<AppState>,
    Json(callback): Json<B2cCallback>,
) -> impl IntoResponse {
    let _ = state
        .withdrawal_channel
        .send(WithdrawalRequest::HandleTimeout {
            result: callback.result,
        })
        .await;

    callback_ack()
}

async fn stk_callback(
    State(state): State<AppState>,
    Json(callback): Json<StkCallbackBody>,
) -> impl IntoResponse {
    let _ = state
        .payment_channel
        .send(PaymentRequest::HandleStkCallback {
            callback: callback.body.stk_callback,
        })
        .await;

    callback_ack()
}

pub async fn start_http_server(
    listen: &str,
    user_channel: mpsc::Sender<UserRequest>,
    wallet_channel: mpsc::Sender<WalletRequest>,
    withdrawal_channel: mpsc::Sender<WithdrawalRequest>,
    commission_channel: mpsc::Sender<CommissionRequest>,
    payment_channel: mpsc::Sender<PaymentRequest>,
) -> Result<(), anyhow::Error> {
    let app_state = AppState {
        user_channel,
        wallet_channel,
        withdrawal_channel,
        commission_channel,
        payment_channel,
    };

    let app = Router::new()
        .route("/users", post(register_user))
        .route("/users/verify-email", post(verify_email))
        .route("/users/{id}", get(get_user))
        .route("/wallet/{user_id}/balance", get(get_balance))
        .route("/wallet/otp", post(request_otp))
        .route("/wallet/pin", post(set_pin).put(change_pin))
        .route("/wallet/pin/reset", post(reset_pin))
        .route("/withdrawals", post(request_withdrawal))
        .route("/withdrawals/user/{user_id}", get(list_withdrawals))
        .route("/withdrawals/{id}/mark-paid", post(mark_withdrawal_paid))
        .route("/withdrawals/{id}/mark-failed", post(mark_withdrawal_failed))
        .route("/deposits", post(request_deposit))
        .route("/deposits/user/{user_id}", get(list_deposits))
        .route("/commissions/order-paid", post(order_paid))
        .route("/commissions/manual", post(manual_commission))
        .route("/commissions/{referrer_id}", get(list_commissions))
        .route("/callbacks/b2c/result", post(b2c_result_callback))
        .route("/callbacks/b2c/timeout", post(b2c_timeout_callback))
        .route("/callbacks/stk", post(stk_callback))
        .route("/health", get(|| async { "OK" }))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(listen).await?;
    println!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
