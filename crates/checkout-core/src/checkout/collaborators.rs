//! External collaborators the orchestrator calls after an order exists.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::error::CheckoutResult;
use crate::logger::Logger;
use crate::money::Currency;
use crate::order::Order;

/// Order confirmation delivery (email, push, ...).
///
/// Called fire-and-forget; a failure never changes the checkout result.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn order_confirmed(&self, order: &Order) -> CheckoutResult<()>;
}

/// Default notifier: records the confirmation in the log
pub struct LoggingNotifier {
    logger: Logger,
}

impl LoggingNotifier {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger: logger.for_component("notifier"),
        }
    }
}

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn order_confirmed(&self, order: &Order) -> CheckoutResult<()> {
        self.logger.info_with(
            "order confirmation queued",
            json!({
                "order_id": order.id,
                "order_number": order.order_number,
                "email": order.customer_email,
                "total": order.total.to_string(),
            }),
        );
        Ok(())
    }
}

/// A charge that has no order behind it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationAlert {
    pub transaction_id: String,
    pub provider: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub user_id: String,
    /// Order id the charge was made for
    pub draft_id: String,
    pub reason: String,
    pub raised_at: DateTime<Utc>,
}

/// Operator-visible queue of charges needing manual reconciliation
#[async_trait]
pub trait ReconciliationQueue: Send + Sync {
    async fn push(&self, alert: ReconciliationAlert) -> CheckoutResult<()>;

    /// Alerts not yet handled, oldest first
    async fn pending(&self) -> CheckoutResult<Vec<ReconciliationAlert>>;
}

#[derive(Default)]
pub struct InMemoryReconciliationQueue {
    alerts: Mutex<Vec<ReconciliationAlert>>,
}

impl InMemoryReconciliationQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReconciliationQueue for InMemoryReconciliationQueue {
    async fn push(&self, alert: ReconciliationAlert) -> CheckoutResult<()> {
        self.alerts.lock().push(alert);
        Ok(())
    }

    async fn pending(&self) -> CheckoutResult<Vec<ReconciliationAlert>> {
        Ok(self.alerts.lock().clone())
    }
}

pub type SharedNotifier = Arc<dyn Notifier>;
pub type SharedReconciliationQueue = Arc<dyn ReconciliationQueue>;
