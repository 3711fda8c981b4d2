use std::{
	fmt::{self, Display},
	sync::atomic::{AtomicU8, Ordering},
};

use async_trait::async_trait;

pub mod common;
pub mod distributed;
pub mod memory;

#[cfg(feature = "cassandra")]
pub mod cassandra;
#[cfg(feature = "dynamodb")]
pub mod dynamodb;
#[cfg(feature = "redis")]
pub mod redis;

/// A counter storage adapter.
///
/// One handle is created per process by the [`BackendFactory`](crate::BackendFactory), bound
/// once at start-up and then shared by every in-flight request. All methods take `&self`; the
/// adapter is responsible for its own interior synchronization.
///
/// # Lifecycle
///
/// A backend starts [`BindState::Unbound`]. [`Backend::bind`] walks it through
/// [`BindState::Connecting`] and [`BindState::HealthChecking`] to [`BindState::Bound`], or to
/// [`BindState::Failed`] with every connection it opened already closed. Counter operations on a
/// backend that is not bound fail immediately with
/// [`BackendError::NotConnected`](crate::BackendError::NotConnected) and never reach the store.
#[async_trait]
pub trait Backend: Send + Sync {
	/// The registered type name of this backend, e.g. `"memory"`.
	fn name(&self) -> &'static str;

	/// Current position in the bind state machine.
	fn state(&self) -> BindState;

	/// Connect to the store, then health check it with a synthetic `add_and_get` of 0.
	///
	/// Calling `bind` on a backend that is already bound is a no-op returning `Ok(())`. Dropping
	/// the future before it completes leaves the backend [`BindState::Failed`].
	async fn bind(&self) -> crate::Result<()>;

	/// Add `delta` to the counter `id` and return the value after the addition.
	///
	/// `delta` may be zero or negative. The returned value is the counter total as observed right
	/// after this call's write; depending on the store, writes from concurrent callers on the
	/// same `id` may already be included in it.
	async fn add_and_get(&self, id: &str, delta: i64) -> crate::Result<i64>;

	/// Read the counter `id`.
	///
	/// Returns `Ok(None)` if the counter has never been incremented.
	async fn get(&self, id: &str) -> crate::Result<Option<i64>>;

	/// Release the underlying connection. Safe to call on a backend that is not bound.
	async fn unbind(&self);

	/// Drop and recreate the backing schema object, losing every counter.
	///
	/// Administrative operation for test and provisioning tooling. It does not require the
	/// backend to be bound and does not change its [`BindState`].
	async fn provision(&self) -> crate::Result<()>;
}

/// States of the bind protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BindState {
	Unbound = 0,
	Connecting = 1,
	HealthChecking = 2,
	Bound = 3,
	Failed = 4,
}

impl BindState {
	fn from_u8(value: u8) -> Self {
		match value {
			1 => Self::Connecting,
			2 => Self::HealthChecking,
			3 => Self::Bound,
			4 => Self::Failed,
			_ => Self::Unbound,
		}
	}
}

impl Display for BindState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Unbound => write!(f, "unbound"),
			Self::Connecting => write!(f, "connecting"),
			Self::HealthChecking => write!(f, "health-checking"),
			Self::Bound => write!(f, "bound"),
			Self::Failed => write!(f, "failed"),
		}
	}
}

/// Lock-free holder for a [`BindState`], readable while a bind is in progress.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
	pub(crate) fn new() -> Self {
		Self(AtomicU8::new(BindState::Unbound as u8))
	}

	pub(crate) fn get(&self) -> BindState {
		BindState::from_u8(self.0.load(Ordering::Acquire))
	}

	pub(crate) fn set(&self, state: BindState) {
		self.0.store(state as u8, Ordering::Release);
	}
}
