use std::sync::Arc;

use tracing::{error, info, instrument};

use crate::{storage::memory::MemoryBackend, Backend, BackendError};

#[cfg(feature = "cassandra")]
use crate::storage::cassandra::CassandraStore;
#[cfg(any(feature = "redis", feature = "cassandra", feature = "dynamodb"))]
use crate::storage::distributed::DistributedCounterBackend;
#[cfg(feature = "dynamodb")]
use crate::storage::dynamodb::DynamoDbStore;
#[cfg(feature = "redis")]
use crate::storage::redis::{RedisClusterStore, RedisSentinelStore, RedisStore};

/// Builds an unbound backend from its JSON options.
type Constructor = fn(serde_json::Value) -> crate::Result<Arc<dyn Backend>>;

/// Registered backend types, in the order reported by [`BackendFactory::list`].
static REGISTRY: &[(&str, Constructor)] = &[
	(MemoryBackend::NAME, memory as Constructor),
	#[cfg(feature = "redis")]
	(RedisStore::NAME, redis as Constructor),
	#[cfg(feature = "redis")]
	(RedisClusterStore::NAME, redis_cluster as Constructor),
	#[cfg(feature = "redis")]
	(RedisSentinelStore::NAME, redis_sentinel as Constructor),
	#[cfg(feature = "cassandra")]
	(CassandraStore::NAME, cassandra as Constructor),
	#[cfg(feature = "dynamodb")]
	(DynamoDbStore::NAME, dynamodb as Constructor),
];

fn memory(_options: serde_json::Value) -> crate::Result<Arc<dyn Backend>> {
	Ok(Arc::new(MemoryBackend::new()))
}

#[cfg(feature = "redis")]
fn redis(options: serde_json::Value) -> crate::Result<Arc<dyn Backend>> {
	let store = RedisStore::from_options(options)?;
	Ok(Arc::new(DistributedCounterBackend::new(RedisStore::NAME, store)))
}

#[cfg(feature = "redis")]
fn redis_cluster(options: serde_json::Value) -> crate::Result<Arc<dyn Backend>> {
	let store = RedisClusterStore::from_options(options)?;
	Ok(Arc::new(DistributedCounterBackend::new(RedisClusterStore::NAME, store)))
}

#[cfg(feature = "redis")]
fn redis_sentinel(options: serde_json::Value) -> crate::Result<Arc<dyn Backend>> {
	let store = RedisSentinelStore::from_options(options)?;
	Ok(Arc::new(DistributedCounterBackend::new(RedisSentinelStore::NAME, store)))
}

#[cfg(feature = "cassandra")]
fn cassandra(options: serde_json::Value) -> crate::Result<Arc<dyn Backend>> {
	let store = CassandraStore::from_options(options)?;
	Ok(Arc::new(DistributedCounterBackend::new(CassandraStore::NAME, store)))
}

#[cfg(feature = "dynamodb")]
fn dynamodb(options: serde_json::Value) -> crate::Result<Arc<dyn Backend>> {
	let store = DynamoDbStore::from_options(options)?;
	Ok(Arc::new(DistributedCounterBackend::new(DynamoDbStore::NAME, store)))
}

/// Maps a backend type name to a ready-to-use [`Backend`].
///
/// The set of types depends on the enabled cargo features; `memory` is always available.
pub struct BackendFactory;

impl BackendFactory {
	/// Registered backend type names, `memory` first.
	pub fn list() -> Vec<&'static str> {
		REGISTRY.iter().map(|(name, _)| *name).collect()
	}

	/// Builds the backend registered as `kind` without binding it.
	///
	/// Fails with [`BackendError::UnknownBackendType`] or [`BackendError::InvalidOptions`] before
	/// any connection is attempted.
	pub fn instantiate(kind: &str, options: serde_json::Value) -> crate::Result<Arc<dyn Backend>> {
		let (_, constructor) =
			REGISTRY.iter().find(|(name, _)| *name == kind).ok_or_else(|| {
				error!("invalid backend type: {}", kind);
				BackendError::UnknownBackendType { name: kind.to_string(), valid: Self::list() }
			})?;

		constructor(options)
	}

	/// Builds the backend registered as `kind` and binds it.
	///
	/// A backend whose bind fails has already released its connection, so the error is returned
	/// as is.
	#[instrument(skip(options))]
	pub async fn create(kind: &str, options: serde_json::Value) -> crate::Result<Arc<dyn Backend>> {
		let backend = Self::instantiate(kind, options)?;

		backend.bind().await?;
		info!(backend = backend.name(), "backend ready");

		Ok(backend)
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;
	use crate::BindState;

	#[test]
	fn memory_is_listed_first() {
		let names = BackendFactory::list();

		assert_eq!(names[0], "memory");
		#[cfg(feature = "redis")]
		assert_eq!(&names[1..4], &["redis", "redis-cluster", "redis-sentinel"]);
	}

	#[tokio::test]
	async fn unknown_type_lists_valid_names() {
		let result = BackendFactory::create("bogus-type", json!({})).await;

		match result {
			Err(BackendError::UnknownBackendType { name, valid }) => {
				assert_eq!(name, "bogus-type");
				assert_eq!(valid, BackendFactory::list());
				assert_eq!(valid[0], "memory");
			},
			Err(e) => panic!("unexpected error: {}", e),
			Ok(_) => panic!("bogus-type must not be created"),
		}
	}

	#[tokio::test]
	async fn memory_backend_is_bound() {
		let backend = BackendFactory::create("memory", json!({})).await.unwrap();

		assert_eq!(backend.name(), "memory");
		assert_eq!(backend.state(), BindState::Bound);
		assert_eq!(backend.add_and_get("0", 1).await.unwrap(), 1);
	}

	#[test]
	fn instantiated_backends_start_unbound() {
		let backend = BackendFactory::instantiate("memory", serde_json::Value::Null).unwrap();

		assert_eq!(backend.state(), BindState::Unbound);
	}

	#[cfg(feature = "redis")]
	#[tokio::test]
	async fn invalid_options_fail_before_connecting() {
		let result = BackendFactory::create("redis-cluster", json!({ "contactPoints": 6379 })).await;

		assert!(matches!(
			result,
			Err(BackendError::InvalidOptions { backend: "redis-cluster", .. })
		));
	}

	#[cfg(feature = "redis")]
	#[tokio::test]
	async fn bind_errors_propagate() {
		let result =
			BackendFactory::create("redis", json!({ "url": "redis://127.0.0.1:1" })).await;

		let e = result.err().expect("nothing listens on port 1");
		assert_eq!(e.backend(), Some("redis"));
		assert!(matches!(e, BackendError::Connect { .. }));
	}
}
