//! Pluggable counter storage for the servicebox demo service.
//!
//! The service exposes a handful of toy HTTP endpoints plus one stateful one: `sum`, which adds a
//! delta to a named counter and returns the new total. Where that counter lives is decided at
//! start-up by the backend type name handed to the [`BackendFactory`]:
//!
//! - `memory`: a process-local map, always available.
//! - `redis`, `redis-cluster`, `redis-sentinel`: Redis `INCRBY` (feature `redis`, on by default).
//! - `cassandra`: a Cassandra counter table (feature `cassandra`).
//! - `dynamodb`: a DynamoDB table with atomic `UpdateItem` (feature `dynamodb`).
//!
//! Every backend implements the [`Backend`] trait. Before a backend serves its first request it
//! must be bound: it connects to its store, then health checks it by incrementing a reserved
//! counter by zero and reading it back. A store that accepts connections but lacks its table or
//! keyspace therefore fails at start-up rather than on the first user request.
//!
//! Distributed stores only need to provide the handful of primitives in
//! [`CounterStore`](storage::common::CounterStore);
//! [`DistributedCounterBackend`](storage::distributed::DistributedCounterBackend) turns any of
//! them into a [`Backend`] with the bind protocol built in.
//!
//! # Example
//!
//! ```ignore
//! use servicebox::{Backend, BackendFactory};
//!
//! #[tokio::main]
//! async fn main() -> servicebox::Result<()> {
//!     let backend = BackendFactory::create("memory", serde_json::Value::Null).await?;
//!
//!     assert_eq!(backend.add_and_get("0", 1).await?, 1);
//!     assert_eq!(backend.add_and_get("0", 2).await?, 3);
//!     assert_eq!(backend.get("0").await?, Some(3));
//!     assert_eq!(backend.get("missing-key").await?, None);
//!
//!     backend.unbind().await;
//!     Ok(())
//! }
//! ```

pub mod architecture;
pub mod config;
pub mod factory;
pub mod service;
pub mod storage;
pub mod types;

#[cfg(test)]
mod mock;

pub use factory::BackendFactory;
pub use storage::{Backend, BindState};
pub use types::{BackendError, StoreError};

pub type Result<T, E = BackendError> = std::result::Result<T, E>;
