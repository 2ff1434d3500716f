use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::oneshot;

use super::{RequestHandler, Service, ServiceError};
use crate::models::commissions::{commission_for_order, Commission, CommissionType};
use crate::repositories::commissions::CommissionRepository;
use crate::repositories::users::UserRepository;

pub enum CommissionRequest {
    /// Raised when a referred user's order reaches the paid state. Returns
    /// `None` when the buyer has no referrer or nothing is owed.
    OrderPaid {
        order_ref: String,
        buyer_id: String,
        order_amount_cents: i64,
        response: oneshot::Sender<Result<Option<Commission>, ServiceError>>,
    },
    Manual {
        referrer_id: String,
        amount_cents: i64,
        description: String,
        response: oneshot::Sender<Result<Commission, ServiceError>>,
    },
    List {
        referrer_id: String,
        response: oneshot::Sender<Result<Vec<Commission>, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct CommissionRequestHandler {
    commissions: CommissionRepository,
    users: UserRepository,
    rate_bps: i64,
}

impl CommissionRequestHandler {
    pub fn new(sql_conn: PgPool, rate_bps: i64) -> Self {
        CommissionRequestHandler {
            commissions: CommissionRepository::new(sql_conn.clone()),
            users: UserRepository::new(sql_conn),
            rate_bps,
        }
    }

    async fn order_paid(
        &self,
        order_ref: &str,
        buyer_id: &str,
        order_amount_cents: i64,
    ) -> Result<Option<Commission>, ServiceError> {
        let buyer = self
            .users
            .get_user_by_id(buyer_id)
            .await
            .map_err(|e| ServiceError::Database(e.to_string()))?
            .ok_or_else(|| ServiceError::NotFound(format!("user {}", buyer_id)))?;

        let Some(referrer_id) = buyer.referred_by else {
            return Ok(None);
        };

        // A user can never earn commission on their own order.
        if referrer_id == buyer.id {
            log::warn!("User {} is recorded as their own referrer, skipping", buyer.id);
            return Ok(None);
        }

        let amount_cents = commission_for_order(order_amount_cents, self.rate_bps);
        if amount_cents == 0 {
            return Ok(None);
        }

        let commission = self
            .commissions
            .record(
                &referrer_id,
                Some(order_ref),
                amount_cents,
                CommissionType::Order,
                &format!("Commission on order {}", order_ref),
            )
            .await
            .map_err(|e| ServiceError::Database(e.to_string()))?;

        Ok(Some(commission))
    }

    async fn manual(
        &self,
        referrer_id: &str,
        amount_cents: i64,
        description: &str,
    ) -> Result<Commission, ServiceError> {
        if amount_cents <= 0 {
            return Err(ServiceError::Validation(
                "commission amount must be positive".to_string(),
            ));
        }

        self.users
            .get_user_by_id(referrer_id)
            .await
            .map_err(|e| ServiceError::Database(e.to_string()))?
            .ok_or_else(|| ServiceError::NotFound(format!("user {}", referrer_id)))?;

        self.commissions
            .record(
                referrer_id,
                None,
                amount_cents,
                CommissionType::Manual,
                description,
            )
            .await
            .map_err(|e| ServiceError::Database(e.to_string()))
    }

    async fn list(&self, referrer_id: &str) -> Result<Vec<Commission>, ServiceError> {
        self.commissions
            .list_for_referrer(referrer_id)
            .await
            .map_err(|e| ServiceError::Database(e.to_string()))
    }
}

#[async_trait]
impl RequestHandler<CommissionRequest> for CommissionRequestHandler {
    async fn handle_request(&self, request: CommissionRequest) {
        match request {
            CommissionRequest::OrderPaid {
                order_ref,
                buyer_id,
                order_amount_cents,
                response,
            } => {
                let result = self.order_paid(&order_ref, &buyer_id, order_amount_cents).await;
                let _ = response.send(result);
            }
            CommissionRequest::Manual {
                referrer_id,
                amount_cents,
                description,
                response,
            } => {
                let result = self.manual(&referrer_id, amount_cents, &description).await;
                let _ = response.send(result);
            }
            CommissionRequest::List {
                referrer_id,
                response,
            } => {
                let result = self.list(&referrer_id).await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct CommissionService;

impl CommissionService {
    pub fn new() -> Self {
        CommissionService {}
    }
}

#[async_trait]
impl Service<CommissionRequest, CommissionRequestHandler> for CommissionService {}
