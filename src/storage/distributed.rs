use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

use crate::types::{BackendError, StoreError};

use super::{
	common::{CounterStore, HEALTH_CHECK_KEY},
	Backend, BindState, StateCell,
};

/// Marks a bind as failed if its future is dropped before reaching `Bound` or `Failed`.
struct PendingBind<'a>(&'a StateCell);

impl Drop for PendingBind<'_> {
	fn drop(&mut self) {
		if matches!(self.0.get(), BindState::Connecting | BindState::HealthChecking) {
			warn!("bind cancelled before completion");
			self.0.set(BindState::Failed);
		}
	}
}

/// [`Backend`] over any [`CounterStore`].
///
/// Drives the bind protocol for the store:
///
/// 1. `Unbound -> Connecting`: [`CounterStore::connect`]. On failure the backend goes to
///    `Failed` and the error is reported as [`BackendError::Connect`].
/// 2. `Connecting -> HealthChecking`: `add_and_get(HEALTH_CHECK_KEY, 0)` followed by a `get` of
///    the same key. This proves the schema exists and the increment path works end to end.
/// 3. `HealthChecking -> Bound` on success. On failure the fresh connection is closed before
///    [`BackendError::HealthCheck`] is returned.
///
/// While a bind or unbind holds the connection slot, counter operations fail with
/// [`BackendError::NotConnected`] instead of waiting for it. A `bind` on a bound backend returns
/// without touching the slot. A `bind` whose future is dropped half way leaves the backend
/// `Failed`; the connection it opened is dropped with it.
pub struct DistributedCounterBackend<S: CounterStore> {
	name: &'static str,
	store: S,
	state: StateCell,
	connection: RwLock<Option<S::Connection>>,
}

impl<S: CounterStore> DistributedCounterBackend<S> {
	/// Creates an unbound backend registered as `name`.
	pub fn new(name: &'static str, store: S) -> Self {
		Self { name, store, state: StateCell::new(), connection: RwLock::new(None) }
	}

	/// The wrapped store.
	pub fn store(&self) -> &S {
		&self.store
	}

	async fn health_check(&self, conn: &S::Connection) -> Result<i64, StoreError> {
		let value = self.store.add_and_get(conn, HEALTH_CHECK_KEY, 0).await?;
		debug!(backend = self.name, value, "health check increment succeeded");

		match self.store.get(conn, HEALTH_CHECK_KEY).await? {
			Some(read_back) => Ok(read_back),
			None => Err(StoreError::EmptyResult),
		}
	}

	fn not_connected(&self) -> BackendError {
		warn!(backend = self.name, state = %self.state.get(), "operation on unbound backend");
		BackendError::NotConnected { backend: self.name }
	}

	fn operation_error(&self, id: &str, e: StoreError) -> BackendError {
		error!(backend = self.name, id, "counter operation failed: {}", e);
		match e {
			StoreError::EmptyResult =>
				BackendError::EmptyResult { backend: self.name, id: id.to_string() },
			source => BackendError::Operation { backend: self.name, source },
		}
	}
}

#[async_trait]
impl<S: CounterStore> Backend for DistributedCounterBackend<S> {
	fn name(&self) -> &'static str {
		self.name
	}

	fn state(&self) -> BindState {
		self.state.get()
	}

	#[instrument(skip(self), fields(backend = self.name))]
	async fn bind(&self) -> crate::Result<()> {
		// Waiting for the write lock would block new operations behind in-flight ones.
		if self.connection.try_read().is_ok_and(|slot| slot.is_some()) {
			debug!("already bound");
			return Ok(())
		}

		let mut slot = self.connection.write().await;
		if slot.is_some() {
			debug!("already bound");
			return Ok(())
		}

		let _pending = PendingBind(&self.state);
		self.state.set(BindState::Connecting);
		info!("connecting");

		let conn = self.store.connect().await.map_err(|e| {
			error!("failed to connect: {}", e);
			self.state.set(BindState::Failed);
			BackendError::Connect { backend: self.name, source: e }
		})?;

		self.state.set(BindState::HealthChecking);
		info!("testing backend with an add_and_get('{}', 0) request", HEALTH_CHECK_KEY);

		match self.health_check(&conn).await {
			Ok(counter) => {
				*slot = Some(conn);
				self.state.set(BindState::Bound);
				info!(counter, "backend test passed");
				Ok(())
			},
			Err(e) => {
				error!("backend test failed, closing connection: {}", e);
				self.store.disconnect(conn).await;
				self.state.set(BindState::Failed);
				Err(BackendError::HealthCheck { backend: self.name, source: e })
			},
		}
	}

	async fn add_and_get(&self, id: &str, delta: i64) -> crate::Result<i64> {
		let slot = self.connection.try_read().map_err(|_| self.not_connected())?;
		let conn = slot.as_ref().ok_or_else(|| self.not_connected())?;

		let value =
			self.store.add_and_get(conn, id, delta).await.map_err(|e| self.operation_error(id, e))?;
		debug!(backend = self.name, id, delta, value, "add_and_get");

		Ok(value)
	}

	async fn get(&self, id: &str) -> crate::Result<Option<i64>> {
		let slot = self.connection.try_read().map_err(|_| self.not_connected())?;
		let conn = slot.as_ref().ok_or_else(|| self.not_connected())?;

		let value = self.store.get(conn, id).await.map_err(|e| self.operation_error(id, e))?;
		debug!(backend = self.name, id, ?value, "get");

		Ok(value)
	}

	async fn unbind(&self) {
		let mut slot = self.connection.write().await;
		if let Some(conn) = slot.take() {
			self.store.disconnect(conn).await;
			info!(backend = self.name, "disconnected");
		}
		self.state.set(BindState::Unbound);
	}

	#[instrument(skip(self), fields(backend = self.name))]
	async fn provision(&self) -> crate::Result<()> {
		info!("dropping and recreating counter schema");

		let conn = self.store.connect().await.map_err(|e| {
			error!("failed to connect for provisioning: {}", e);
			BackendError::Connect { backend: self.name, source: e }
		})?;

		let result = self.store.reset(&conn).await;
		self.store.disconnect(conn).await;

		result.map_err(|e| {
			error!("failed to provision: {}", e);
			BackendError::Operation { backend: self.name, source: e }
		})?;

		info!("counter schema provisioned");

		Ok(())
	}
}
