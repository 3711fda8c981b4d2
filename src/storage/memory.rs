use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::types::{BackendError, StoreError};

use super::{common::HEALTH_CHECK_KEY, Backend, BindState, StateCell};

/// Process-local counters.
///
/// The counter map only exists once [`Backend::bind`] has been called, so an unbound
/// `MemoryBackend` fails exactly like a real store would. Every read-modify-write happens under
/// one mutex, which makes `add_and_get` linearizable within the process.
///
/// State is lost on restart and is not shared between instances of the service.
pub struct MemoryBackend {
	state: StateCell,
	counters: Mutex<Option<HashMap<String, i64>>>,
}

impl MemoryBackend {
	pub const NAME: &'static str = "memory";

	pub fn new() -> Self {
		Self { state: StateCell::new(), counters: Mutex::new(None) }
	}

	fn not_connected(&self) -> BackendError {
		warn!(backend = Self::NAME, "operation on unbound backend");
		BackendError::NotConnected { backend: Self::NAME }
	}
}

impl Default for MemoryBackend {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl Backend for MemoryBackend {
	fn name(&self) -> &'static str {
		Self::NAME
	}

	fn state(&self) -> BindState {
		self.state.get()
	}

	async fn bind(&self) -> crate::Result<()> {
		let mut counters = self.counters.lock().await;
		if counters.is_some() {
			debug!(backend = Self::NAME, "already bound");
			return Ok(())
		}

		self.state.set(BindState::Connecting);
		let mut map = HashMap::new();

		self.state.set(BindState::HealthChecking);
		let counter = *map.entry(HEALTH_CHECK_KEY.to_string()).or_insert(0);

		*counters = Some(map);
		self.state.set(BindState::Bound);
		info!(backend = Self::NAME, counter, "backend test passed");

		Ok(())
	}

	async fn add_and_get(&self, id: &str, delta: i64) -> crate::Result<i64> {
		let mut counters = self.counters.lock().await;
		let map = counters.as_mut().ok_or_else(|| self.not_connected())?;

		let counter = map.entry(id.to_string()).or_insert(0);
		*counter = counter.checked_add(delta).ok_or(BackendError::Operation {
			backend: Self::NAME,
			source: StoreError::Overflow,
		})?;
		debug!(backend = Self::NAME, id, delta, value = *counter, "add_and_get");

		Ok(*counter)
	}

	async fn get(&self, id: &str) -> crate::Result<Option<i64>> {
		let counters = self.counters.lock().await;
		let map = counters.as_ref().ok_or_else(|| self.not_connected())?;

		Ok(map.get(id).copied())
	}

	async fn unbind(&self) {
		self.counters.lock().await.take();
		self.state.set(BindState::Unbound);
	}

	async fn provision(&self) -> crate::Result<()> {
		if let Some(map) = self.counters.lock().await.as_mut() {
			map.clear();
			info!(backend = Self::NAME, "counters cleared");
		}

		Ok(())
	}
}
