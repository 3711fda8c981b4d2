use async_trait::async_trait;
use scylla::{frame::value::Counter, Session, SessionBuilder};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::types::{BackendError, StoreError};

use super::common::{parse_options, CounterStore};

/// Options of the `cassandra` backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct CassandraOptions {
	/// `host:port` of the nodes used to discover the cluster.
	pub contact_points: Vec<String>,
	pub keyspace: String,
	/// Table with an `id text` primary key and a `sum counter` column.
	pub table: String,
}

impl Default for CassandraOptions {
	fn default() -> Self {
		Self {
			contact_points: vec!["localhost:9042".to_string()],
			keyspace: "calc".to_string(),
			table: "sum".to_string(),
		}
	}
}

/// Cassandra (or ScyllaDB) counter table.
///
/// Counter columns cannot return their new value from the `UPDATE` itself, so `add_and_get`
/// takes two round trips: apply the delta, then read the row back. A concurrent writer on the
/// same id can land between the two, in which case the returned value includes its delta too.
pub struct CassandraStore {
	options: CassandraOptions,
}

impl CassandraStore {
	pub const NAME: &'static str = "cassandra";

	pub fn new(options: CassandraOptions) -> crate::Result<Self> {
		for name in [&options.keyspace, &options.table] {
			if !is_identifier(name) {
				return Err(BackendError::InvalidOptions {
					backend: Self::NAME,
					reason: format!("'{}' is not a valid CQL identifier", name),
				})
			}
		}

		Ok(Self { options })
	}

	pub fn from_options(options: serde_json::Value) -> crate::Result<Self> {
		Self::new(parse_options(Self::NAME, options)?)
	}

	fn table(&self) -> String {
		format!("{}.{}", self.options.keyspace, self.options.table)
	}
}

#[async_trait]
impl CounterStore for CassandraStore {
	type Connection = Session;

	#[instrument(skip(self), fields(contact_points = ?self.options.contact_points))]
	async fn connect(&self) -> Result<Self::Connection, StoreError> {
		debug!("Contacting Cassandra");
		SessionBuilder::new()
			.known_nodes(&self.options.contact_points)
			.build()
			.await
			.map_err(StoreError::driver)
	}

	async fn add_and_get(
		&self,
		conn: &Self::Connection,
		id: &str,
		delta: i64,
	) -> Result<i64, StoreError> {
		let update = format!("UPDATE {} SET sum = sum + ? WHERE id = ?", self.table());
		debug!("CQL query: {} [{}, {}]", update, delta, id);
		conn.query_unpaged(update, (Counter(delta), id)).await.map_err(StoreError::driver)?;

		self.get(conn, id).await?.ok_or(StoreError::EmptyResult)
	}

	async fn get(&self, conn: &Self::Connection, id: &str) -> Result<Option<i64>, StoreError> {
		let select = format!("SELECT sum FROM {} WHERE id = ?", self.table());
		debug!("CQL query: {} [{}]", select, id);
		let result = conn.query_unpaged(select, (id,)).await.map_err(StoreError::driver)?;

		let row = result.maybe_first_row_typed::<(Counter,)>().map_err(StoreError::driver)?;
		debug!("CQL result: {:?}", row);

		Ok(row.map(|(Counter(sum),)| sum))
	}

	async fn reset(&self, conn: &Self::Connection) -> Result<(), StoreError> {
		let statements = [
			format!("DROP KEYSPACE IF EXISTS {}", self.options.keyspace),
			format!(
				"CREATE KEYSPACE {} WITH replication = {{'class': 'SimpleStrategy', 'replication_factor': 1}}",
				self.options.keyspace
			),
			format!("CREATE TABLE {} (id text PRIMARY KEY, sum counter)", self.table()),
		];

		for statement in statements {
			debug!("CQL query: {}", statement);
			conn.query_unpaged(statement, ()).await.map_err(StoreError::driver)?;
		}

		Ok(())
	}

	async fn disconnect(&self, conn: Self::Connection) {
		drop(conn);
	}
}

fn is_identifier(name: &str) -> bool {
	!name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;
	use crate::{storage::distributed::DistributedCounterBackend, Backend, BindState};

	#[test]
	fn defaults_match_calc_sum() {
		let store = CassandraStore::from_options(json!({})).unwrap();

		assert_eq!(store.options.contact_points, vec!["localhost:9042"]);
		assert_eq!(store.table(), "calc.sum");
	}

	#[test]
	fn contact_points_are_read() {
		let store = CassandraStore::from_options(json!({
			"contactPoints": ["46.101.16.49", "178.62.108.56"]
		}))
		.unwrap();

		assert_eq!(store.options.contact_points, vec!["46.101.16.49", "178.62.108.56"]);
	}

	#[test]
	fn table_names_must_be_identifiers() {
		let result = CassandraStore::from_options(json!({ "table": "sum; DROP KEYSPACE calc" }));

		assert!(matches!(result, Err(BackendError::InvalidOptions { backend: "cassandra", .. })));
	}

	fn live_backend(keyspace: &str) -> DistributedCounterBackend<CassandraStore> {
		let store = CassandraStore::new(CassandraOptions {
			keyspace: keyspace.to_string(),
			..CassandraOptions::default()
		})
		.unwrap();
		DistributedCounterBackend::new(CassandraStore::NAME, store)
	}

	#[tokio::test]
	#[ignore = "requires Cassandra on localhost:9042"]
	async fn live_provision_then_sum() {
		let backend = live_backend("servicebox_test");
		backend.provision().await.unwrap();
		backend.bind().await.unwrap();

		assert_eq!(backend.add_and_get("0", 1).await.unwrap(), 1);
		assert_eq!(backend.add_and_get("0", 2).await.unwrap(), 3);
		assert_eq!(backend.get("0").await.unwrap(), Some(3));
		assert_eq!(backend.get("missing-key").await.unwrap(), None);

		backend.unbind().await;
	}

	#[tokio::test]
	#[ignore = "requires Cassandra on localhost:9042"]
	async fn live_missing_keyspace_fails_health_check() {
		let keyspace = format!("missing_{}", uuid::Uuid::new_v4().simple());
		let backend = live_backend(&keyspace);

		let e = backend.bind().await.unwrap_err();

		assert!(matches!(e, BackendError::HealthCheck { backend: "cassandra", .. }));
		assert_eq!(backend.state(), BindState::Failed);
		assert!(matches!(backend.get("0").await, Err(BackendError::NotConnected { .. })));
	}
}
