//! # checkout-store
//!
//! SQLite implementation of the `checkout_core::Datastore` contract.
//!
//! ```rust,ignore
//! let store = SqliteDatastore::connect("sqlite://data/checkout.db").await?;
//! let repos = RepositoryFactory::new(Arc::new(store));
//! ```

pub mod error;
mod sql;
pub mod sqlite;

pub use error::{StoreError, StoreResult};
pub use sqlite::SqliteDatastore;
