//! Store errors

use checkout_core::CheckoutError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Duplicate id in {table}: {id}")]
    Duplicate { table: String, id: String },

    /// Stored document is not a JSON object
    #[error("Corrupt document {table}/{id}: {message}")]
    Corrupt {
        table: String,
        id: String,
        message: String,
    },

    #[error("Too many concurrent writes to {table}/{id}")]
    Contended { table: String, id: String },

    #[error("Invalid field name: {0}")]
    InvalidField(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for CheckoutError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidField(field) => {
                CheckoutError::InvalidRequest(format!("invalid field name: {}", field))
            }
            other => CheckoutError::Storage(other.to_string()),
        }
    }
}
