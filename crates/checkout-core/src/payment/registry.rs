//! Name → provider registry.

use std::collections::BTreeMap;

use super::{BoxedPaymentMethod, ProviderInfo};
use crate::error::{CheckoutError, CheckoutResult};

/// Provider lookup by case-insensitive key.
///
/// There is no default provider: an unknown key is always an error that
/// lists what is registered.
#[derive(Clone, Default)]
pub struct PaymentMethodFactory {
    methods: BTreeMap<String, BoxedPaymentMethod>,
}

impl PaymentMethodFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its own name. Returns the provider it
    /// replaced, if any.
    pub fn register(&mut self, method: BoxedPaymentMethod) -> Option<BoxedPaymentMethod> {
        let key = method.name().to_ascii_lowercase();
        self.methods.insert(key, method)
    }

    /// Register with builder pattern
    pub fn with_method(mut self, method: BoxedPaymentMethod) -> Self {
        self.register(method);
        self
    }

    /// Resolve a provider by key
    pub fn create(&self, key: &str) -> CheckoutResult<BoxedPaymentMethod> {
        self.methods
            .get(&key.trim().to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| CheckoutError::UnsupportedPaymentMethod {
                requested: key.to_string(),
                supported: self.supported(),
            })
    }

    /// Registered keys, sorted
    pub fn supported(&self) -> Vec<String> {
        self.methods.keys().cloned().collect()
    }

    pub fn has_provider(&self, key: &str) -> bool {
        self.methods.contains_key(&key.trim().to_ascii_lowercase())
    }

    /// Provider metadata, sorted by key
    pub fn provider_info(&self) -> Vec<ProviderInfo> {
        self.methods.values().map(|m| m.provider_info()).collect()
    }
}
