//! Validates, then settles exactly once.

use serde_json::json;
use std::sync::Arc;

use super::{PaymentAttempt, PaymentData, PaymentMethodFactory, PaymentResult, ProviderInfo};
use crate::error::{CheckoutError, CheckoutResult};
use crate::logger::Logger;

#[derive(Clone)]
pub struct PaymentProcessor {
    factory: Arc<PaymentMethodFactory>,
    logger: Logger,
}

impl PaymentProcessor {
    pub fn new(factory: Arc<PaymentMethodFactory>, logger: Logger) -> Self {
        Self {
            factory,
            logger: logger.for_component("payment"),
        }
    }

    pub fn factory(&self) -> &PaymentMethodFactory {
        &self.factory
    }

    pub fn providers(&self) -> Vec<ProviderInfo> {
        self.factory.provider_info()
    }

    /// Run the provider's shape checks without settling.
    pub fn validate(&self, provider: &str, data: &PaymentData) -> CheckoutResult<bool> {
        Ok(self.factory.create(provider)?.validate(data))
    }

    /// Resolve the provider, reject invalid data, then call `settle` once.
    pub async fn process(&self, attempt: &PaymentAttempt) -> CheckoutResult<PaymentResult> {
        let method = self.factory.create(&attempt.provider)?;

        if !attempt.data.is_empty() && !method.validate(&attempt.data) {
            self.logger.warn_with(
                "payment data rejected before settlement",
                json!({ "provider": method.name(), "order_ref": attempt.order_ref }),
            );
            return Err(CheckoutError::InvalidPaymentData {
                provider: method.name().to_string(),
            });
        }

        self.logger.info_with(
            "settling payment",
            json!({
                "provider": method.name(),
                "order_ref": attempt.order_ref,
                "amount": attempt.amount.to_string(),
                "currency": attempt.currency.as_str(),
            }),
        );

        match method.settle(attempt).await {
            Ok(result) if result.success => {
                self.logger.info_with(
                    "payment settled",
                    json!({
                        "provider": method.name(),
                        "order_ref": attempt.order_ref,
                        "transaction_id": result.transaction_id,
                    }),
                );
                Ok(result)
            }
            Ok(result) => {
                self.logger.warn_with(
                    "payment declined",
                    json!({
                        "provider": method.name(),
                        "order_ref": attempt.order_ref,
                        "error": result.error,
                    }),
                );
                Ok(result)
            }
            Err(e) => {
                self.logger.error_with(
                    "payment infrastructure failure",
                    json!({
                        "provider": method.name(),
                        "order_ref": attempt.order_ref,
                        "error": e.to_string(),
                    }),
                );
                Err(e)
            }
        }
    }
}
