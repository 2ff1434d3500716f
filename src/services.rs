use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::mpsc;

use crate::settings::Settings;

mod commissions;
mod email;
mod http;
mod payments;
mod users;
mod wallets;
mod withdrawals;

/// Typed failure kinds, propagated to the API boundary as typed responses.
/// Callers match on the variant, never on message text.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Insufficient funds: requested {requested_cents}, withdrawable {available_cents}")]
    InsufficientFunds {
        requested_cents: i64,
        available_cents: i64,
    },
    #[error("Wallet PIN locked until {until}")]
    WalletLocked { until: chrono::NaiveDateTime },
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("External service error: {0} => {1}")]
    ExternalService(String, String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Communication error: {0}")]
    Communication(String),
}

#[async_trait]
pub trait RequestHandler<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    async fn handle_request(&self, request: T);
}

#[async_trait]
pub trait Service<T, H>: Send + Sync + 'static
where
    T: Send + 'static,
    H: RequestHandler<T> + Clone + Send,
{
    async fn run(&mut self, handler: H, receiver: &mut mpsc::Receiver<T>) {
        while let Some(request) = receiver.recv().await {
            let handler = handler.clone();

            tokio::spawn(async move {
                handler.handle_request(request).await;
            });
        }
    }
}

pub async fn start_services(pool: PgPool, settings: Settings) -> Result<(), anyhow::Error> {
    let (user_tx, mut user_rx) = mpsc::channel(512);
    let (wallet_tx, mut wallet_rx) = mpsc::channel(512);
    let (withdrawal_tx, mut withdrawal_rx) = mpsc::channel(512);
    let (commission_tx, mut commission_rx) = mpsc::channel(512);
    let (payment_tx, mut payment_rx) = mpsc::channel(512);
    let (email_tx, mut email_rx) = mpsc::channel(512);

    let mut user_service = users::UserService::new();
    let mut wallet_service = wallets::WalletService::new();
    let mut withdrawal_service = withdrawals::WithdrawalService::new();
    let mut commission_service = commissions::CommissionService::new();
    let mut payment_service = payments::PaymentService::new();
    let mut email_service = email::EmailService::new();

    println!("[*] Starting email service.");
    let email_settings = settings.email.clone();
    let email_ttl = settings.wallet.otp_ttl_minutes;
    tokio::spawn(async move {
        let handler = email::EmailRequestHandler::new(email_settings, email_ttl);
        email_service.run(handler, &mut email_rx).await;
    });

    println!("[*] Starting user service.");
    let user_pool = pool.clone();
    let user_email_tx = email_tx.clone();
    let user_policy = settings.wallet.clone();
    tokio::spawn(async move {
        user_service
            .run(
                users::UserRequestHandler::new(user_pool, user_email_tx, user_policy),
                &mut user_rx,
            )
            .await;
    });

    println!("[*] Starting wallet service.");
    let wallet_pool = pool.clone();
    let wallet_email_tx = email_tx.clone();
    let wallet_policy = settings.wallet.clone();
    tokio::spawn(async move {
        wallet_service
            .run(
                wallets::WalletRequestHandler::new(wallet_pool, wallet_email_tx, wallet_policy),
                &mut wallet_rx,
            )
            .await;
    });

    log::info!("Starting withdrawal service.");
    let withdrawal_pool = pool.clone();
    let withdrawal_wallet_tx = wallet_tx.clone();
    let withdrawal_payment_tx = payment_tx.clone();
    let withdrawal_policy = settings.wallet.clone();
    tokio::spawn(async move {
        withdrawal_service
            .run(
                withdrawals::WithdrawalRequestHandler::new(
                    withdrawal_pool,
                    withdrawal_wallet_tx,
                    withdrawal_payment_tx,
                    withdrawal_policy,
                ),
                &mut withdrawal_rx,
            )
            .await;
    });

    log::info!("Starting commission service.");
    let commission_pool = pool.clone();
    let commission_rate = settings.wallet.commission_rate_bps;
    tokio::spawn(async move {
        commission_service
            .run(
                commissions::CommissionRequestHandler::new(commission_pool, commission_rate),
                &mut commission_rx,
            )
            .await;
    });

    println!("[*] Starting payment service.");
    let payment_pool = pool.clone();
    let mpesa_settings = settings.mpesa.clone();
    tokio::spawn(async move {
        payment_service
            .run(
                payments::PaymentRequestHandler::new(mpesa_settings, payment_pool),
                &mut payment_rx,
            )
            .await;
    });

    println!("[*] Starting HTTP server.");
    http::start_http_server(
        &settings.http.listen,
        user_tx,
        wallet_tx,
        withdrawal_tx,
        commission_tx,
        payment_tx,
    )
    .await?;

    Ok(())
}
