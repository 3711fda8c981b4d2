// common.rs

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::error;

use crate::types::{BackendError, StoreError};

/// Reserved counter id exercised by the bind health check.
///
/// Kept apart from user ids so a freshly bound backend still reports every user counter as
/// absent.
pub const HEALTH_CHECK_KEY: &str = "__servicebox_health__";

/// Prefix of every counter key written to a key-value store.
pub const KEY_PREFIX: &str = "servicebox:calc:sum:";

/// Represents the primitives a distributed counter store must offer.
///
/// A `CounterStore` knows how to talk to one store technology and nothing else: it has no
/// notion of bind state, health checks or which backend type name it is registered under.
/// [`DistributedCounterBackend`](super::distributed::DistributedCounterBackend) wraps any
/// implementation into a full [`Backend`](super::Backend).
#[async_trait]
pub trait CounterStore: Send + Sync + 'static {
	/// Live client handle, owned by the backend while bound.
	type Connection: Send + Sync;

	/// Opens the transport-level connection(s) to the store.
	async fn connect(&self) -> Result<Self::Connection, StoreError>;

	/// Applies `delta` to counter `id` and returns the resulting value.
	///
	/// Must return [`StoreError::EmptyResult`] if the value cannot be read back after a
	/// successful write.
	async fn add_and_get(
		&self,
		conn: &Self::Connection,
		id: &str,
		delta: i64,
	) -> Result<i64, StoreError>;

	/// Reads counter `id`, `None` if it does not exist.
	async fn get(&self, conn: &Self::Connection, id: &str) -> Result<Option<i64>, StoreError>;

	/// Drops and recreates the schema object holding the counters.
	async fn reset(&self, conn: &Self::Connection) -> Result<(), StoreError>;

	/// Closes the connection. Must not fail.
	async fn disconnect(&self, conn: Self::Connection);
}

/// Deserializes adapter options, treating `null` as "all defaults".
pub(crate) fn parse_options<O: DeserializeOwned + Default>(
	backend: &'static str,
	options: serde_json::Value,
) -> crate::Result<O> {
	if options.is_null() {
		return Ok(O::default())
	}

	serde_json::from_value(options).map_err(|e| {
		error!(backend, "failed to parse backend options: {}", e);
		BackendError::InvalidOptions { backend, reason: e.to_string() }
	})
}

