use std::fmt::Display;

/// Errors surfaced by a [`Backend`](crate::Backend) or by the
/// [`BackendFactory`](crate::BackendFactory).
///
/// Every variant that originates from a concrete adapter carries the backend type name so the
/// caller can tell which store failed without additional context.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
	/// The factory was asked for a type name that is not registered.
	UnknownBackendType { name: String, valid: Vec<&'static str> },
	/// The adapter-specific options could not be understood.
	InvalidOptions { backend: &'static str, reason: String },
	/// Transport-level failure while opening the connection to the store.
	Connect {
		backend: &'static str,
		#[source]
		source: StoreError,
	},
	/// Connected, but the synthetic increment-and-read self test failed.
	HealthCheck {
		backend: &'static str,
		#[source]
		source: StoreError,
	},
	/// A counter operation was attempted while the backend is not bound.
	NotConnected { backend: &'static str },
	/// A counter operation failed after the backend was bound.
	Operation {
		backend: &'static str,
		#[source]
		source: StoreError,
	},
	/// The read-back half of `add_and_get` found no row right after a successful write.
	EmptyResult { backend: &'static str, id: String },
}

impl BackendError {
	/// Name of the backend type the error relates to, if any.
	pub fn backend(&self) -> Option<&str> {
		match self {
			Self::UnknownBackendType { .. } => None,
			Self::InvalidOptions { backend, .. } |
			Self::Connect { backend, .. } |
			Self::HealthCheck { backend, .. } |
			Self::NotConnected { backend } |
			Self::Operation { backend, .. } |
			Self::EmptyResult { backend, .. } => Some(*backend),
		}
	}
}

impl Display for BackendError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::UnknownBackendType { name, valid } => write!(
				f,
				"invalid backend type: '{}', valid values are '{}'",
				name,
				valid.join("', '")
			),
			Self::InvalidOptions { backend, reason } =>
				write!(f, "{} backend: invalid options: {}", backend, reason),
			Self::Connect { backend, source } =>
				write!(f, "{} backend: failed to connect: {}", backend, source),
			Self::HealthCheck { backend, source } =>
				write!(f, "{} backend: health check failed: {}", backend, source),
			Self::NotConnected { backend } => write!(
				f,
				"{} backend is not properly initialized. Have you called bind()?",
				backend
			),
			Self::Operation { backend, source } =>
				write!(f, "{} backend: operation failed: {}", backend, source),
			Self::EmptyResult { backend, id } =>
				write!(f, "{} backend: no counter row for '{}' after a successful write", backend, id),
		}
	}
}

/// Failures reported by a [`CounterStore`](crate::storage::common::CounterStore).
///
/// These are store-level and carry no knowledge of which bootstrap phase or operation raised
/// them; [`DistributedCounterBackend`](crate::storage::distributed::DistributedCounterBackend)
/// turns them into a [`BackendError`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	/// Error raised by the underlying store client.
	Driver(#[source] Box<dyn std::error::Error + Send + Sync>),
	/// A read found no row where one was expected.
	EmptyResult,
	/// The increment would overflow a signed 64-bit counter.
	Overflow,
	/// A value returned by the store could not be interpreted as a counter.
	Parsing(String),
}

impl StoreError {
	/// Box any client error into [`StoreError::Driver`].
	pub fn driver<E>(e: E) -> Self
	where
		E: std::error::Error + Send + Sync + 'static,
	{
		Self::Driver(Box::new(e))
	}
}

impl Display for StoreError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Driver(e) => write!(f, "{}", e),
			Self::EmptyResult => write!(f, "empty result"),
			Self::Overflow => write!(f, "increment or decrement would overflow"),
			Self::Parsing(value) => write!(f, "parsing error: {}", value),
		}
	}
}
