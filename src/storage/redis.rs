use async_trait::async_trait;
use redis::{
	aio::{ConnectionLike, MultiplexedConnection},
	cluster::ClusterClient,
	cluster_async::ClusterConnection,
	sentinel::{SentinelClient, SentinelServerType},
	AsyncCommands, Client,
};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::types::StoreError;

use super::common::{parse_options, CounterStore, KEY_PREFIX};

/// Options of the `redis` backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct RedisOptions {
	/// Connection URL, `redis://[:password@]host:port[/db]`.
	pub url: String,
}

impl Default for RedisOptions {
	fn default() -> Self {
		Self { url: "redis://localhost:6379".to_string() }
	}
}

/// Options of the `redis-cluster` backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct RedisClusterOptions {
	/// Seed nodes, either `host:port` or full `redis://` URLs.
	pub contact_points: Vec<String>,
}

impl Default for RedisClusterOptions {
	fn default() -> Self {
		Self { contact_points: vec!["localhost:6379".to_string()] }
	}
}

/// Address of one Redis Sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SentinelAddress {
	pub host: String,
	pub port: u16,
}

/// Options of the `redis-sentinel` backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct RedisSentinelOptions {
	pub sentinels: Vec<SentinelAddress>,
	/// Name of the monitored master group.
	pub name: String,
}

impl Default for RedisSentinelOptions {
	fn default() -> Self {
		Self {
			sentinels: vec![SentinelAddress { host: "localhost".to_string(), port: 26379 }],
			name: "mymaster".to_string(),
		}
	}
}

/// Single Redis server.
///
/// `INCRBY` returns the new value in the same round trip, so `add_and_get` is atomic here.
pub struct RedisStore {
	options: RedisOptions,
}

impl RedisStore {
	pub const NAME: &'static str = "redis";

	pub fn new(options: RedisOptions) -> Self {
		Self { options }
	}

	pub fn from_options(options: serde_json::Value) -> crate::Result<Self> {
		Ok(Self::new(parse_options(Self::NAME, options)?))
	}
}

#[async_trait]
impl CounterStore for RedisStore {
	type Connection = MultiplexedConnection;

	#[instrument(skip(self), fields(url = %self.options.url))]
	async fn connect(&self) -> Result<Self::Connection, StoreError> {
		debug!("Contacting Redis");
		let client = Client::open(self.options.url.as_str()).map_err(StoreError::driver)?;
		client.get_multiplexed_async_connection().await.map_err(StoreError::driver)
	}

	async fn add_and_get(
		&self,
		conn: &Self::Connection,
		id: &str,
		delta: i64,
	) -> Result<i64, StoreError> {
		incr_by(conn.clone(), id, delta).await
	}

	async fn get(&self, conn: &Self::Connection, id: &str) -> Result<Option<i64>, StoreError> {
		read(conn.clone(), id).await
	}

	async fn reset(&self, conn: &Self::Connection) -> Result<(), StoreError> {
		flush(conn.clone()).await
	}

	async fn disconnect(&self, conn: Self::Connection) {
		drop(conn);
	}
}

/// Redis Cluster, addressed through a set of seed nodes.
pub struct RedisClusterStore {
	options: RedisClusterOptions,
}

impl RedisClusterStore {
	pub const NAME: &'static str = "redis-cluster";

	pub fn new(options: RedisClusterOptions) -> Self {
		Self { options }
	}

	pub fn from_options(options: serde_json::Value) -> crate::Result<Self> {
		Ok(Self::new(parse_options(Self::NAME, options)?))
	}

	fn node_urls(&self) -> Vec<String> {
		self.options
			.contact_points
			.iter()
			.map(|point| match point.contains("://") {
				true => point.clone(),
				false => format!("redis://{}", point),
			})
			.collect()
	}
}

#[async_trait]
impl CounterStore for RedisClusterStore {
	type Connection = ClusterConnection;

	#[instrument(skip(self), fields(nodes = ?self.options.contact_points))]
	async fn connect(&self) -> Result<Self::Connection, StoreError> {
		debug!("Contacting Redis Cluster");
		// Fail requests straight away while the cluster is unreachable instead of retrying.
		let client =
			ClusterClient::builder(self.node_urls()).retries(0).build().map_err(StoreError::driver)?;
		client.get_async_connection().await.map_err(StoreError::driver)
	}

	async fn add_and_get(
		&self,
		conn: &Self::Connection,
		id: &str,
		delta: i64,
	) -> Result<i64, StoreError> {
		incr_by(conn.clone(), id, delta).await
	}

	async fn get(&self, conn: &Self::Connection, id: &str) -> Result<Option<i64>, StoreError> {
		read(conn.clone(), id).await
	}

	async fn reset(&self, conn: &Self::Connection) -> Result<(), StoreError> {
		// FLUSHDB is routed to every primary.
		flush(conn.clone()).await
	}

	async fn disconnect(&self, conn: Self::Connection) {
		drop(conn);
	}
}

/// Redis master discovered through Sentinel.
pub struct RedisSentinelStore {
	options: RedisSentinelOptions,
}

impl RedisSentinelStore {
	pub const NAME: &'static str = "redis-sentinel";

	pub fn new(options: RedisSentinelOptions) -> Self {
		Self { options }
	}

	pub fn from_options(options: serde_json::Value) -> crate::Result<Self> {
		Ok(Self::new(parse_options(Self::NAME, options)?))
	}

	fn sentinel_urls(&self) -> Vec<String> {
		self.options
			.sentinels
			.iter()
			.map(|s| format!("redis://{}:{}", s.host, s.port))
			.collect()
	}
}

#[async_trait]
impl CounterStore for RedisSentinelStore {
	type Connection = MultiplexedConnection;

	#[instrument(skip(self), fields(name = %self.options.name))]
	async fn connect(&self) -> Result<Self::Connection, StoreError> {
		debug!("Contacting Redis Sentinels {:?}", self.options.sentinels);
		let mut client = SentinelClient::build(
			self.sentinel_urls(),
			self.options.name.clone(),
			None,
			SentinelServerType::Master,
		)
		.map_err(StoreError::driver)?;
		client.get_async_connection().await.map_err(StoreError::driver)
	}

	async fn add_and_get(
		&self,
		conn: &Self::Connection,
		id: &str,
		delta: i64,
	) -> Result<i64, StoreError> {
		incr_by(conn.clone(), id, delta).await
	}

	async fn get(&self, conn: &Self::Connection, id: &str) -> Result<Option<i64>, StoreError> {
		read(conn.clone(), id).await
	}

	async fn reset(&self, conn: &Self::Connection) -> Result<(), StoreError> {
		flush(conn.clone()).await
	}

	async fn disconnect(&self, conn: Self::Connection) {
		drop(conn);
	}
}

fn counter_key(id: &str) -> String {
	format!("{}{}", KEY_PREFIX, id)
}

async fn incr_by<C>(mut con: C, id: &str, delta: i64) -> Result<i64, StoreError>
where
	C: ConnectionLike + Send + Sync,
{
	let key = counter_key(id);
	debug!("Executing INCRBY {} {}", key, delta);
	con.incr(&key, delta).await.map_err(StoreError::driver)
}

async fn read<C>(mut con: C, id: &str) -> Result<Option<i64>, StoreError>
where
	C: ConnectionLike + Send + Sync,
{
	let key = counter_key(id);
	debug!("Executing GET {}", key);
	con.get(&key).await.map_err(StoreError::driver)
}

async fn flush<C>(mut con: C) -> Result<(), StoreError>
where
	C: ConnectionLike + Send + Sync,
{
	debug!("Executing FLUSHDB");
	redis::cmd("FLUSHDB").query_async(&mut con).await.map_err(StoreError::driver)
}
