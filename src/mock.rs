use std::{
	collections::HashMap,
	io,
	sync::{
		atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
		Mutex,
	},
	time::Duration,
};

use async_trait::async_trait;

use crate::{storage::common::CounterStore, types::StoreError};

/// In-process [`CounterStore`] with switchable failure modes.
///
/// Counts open connections and store round trips so tests can check that nothing leaks and that
/// unbound backends never reach the store.
#[derive(Default)]
pub struct MockStore {
	fail_connect: AtomicBool,
	missing_schema: AtomicBool,
	empty_reads: AtomicBool,
	write_delay_ms: AtomicU64,
	open: AtomicUsize,
	ops: AtomicUsize,
	counters: Mutex<HashMap<String, i64>>,
}

pub struct MockConnection;

impl MockStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Refuses every connection attempt.
	pub fn unreachable() -> Self {
		let store = Self::new();
		store.fail_connect.store(true, Ordering::SeqCst);
		store
	}

	/// Accepts connections but fails every counter operation, like a store without its table.
	pub fn without_schema() -> Self {
		let store = Self::new();
		store.missing_schema.store(true, Ordering::SeqCst);
		store
	}

	/// Makes reads find no row, even right after a write.
	pub fn set_empty_reads(&self, empty: bool) {
		self.empty_reads.store(empty, Ordering::SeqCst);
	}

	/// Makes every `add_and_get` take at least `delay`.
	pub fn set_write_delay(&self, delay: Duration) {
		self.write_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
	}

	/// Connections opened and not yet closed.
	pub fn open_connections(&self) -> usize {
		self.open.load(Ordering::SeqCst)
	}

	/// Number of `add_and_get`/`get` calls that reached the store.
	pub fn operations(&self) -> usize {
		self.ops.load(Ordering::SeqCst)
	}

	fn check_schema(&self) -> Result<(), StoreError> {
		self.ops.fetch_add(1, Ordering::SeqCst);
		match self.missing_schema.load(Ordering::SeqCst) {
			true => Err(StoreError::driver(io::Error::new(
				io::ErrorKind::NotFound,
				"unconfigured table sum",
			))),
			false => Ok(()),
		}
	}
}

#[async_trait]
impl CounterStore for MockStore {
	type Connection = MockConnection;

	async fn connect(&self) -> Result<Self::Connection, StoreError> {
		if self.fail_connect.load(Ordering::SeqCst) {
			return Err(StoreError::driver(io::Error::new(
				io::ErrorKind::ConnectionRefused,
				"connection refused",
			)))
		}

		self.open.fetch_add(1, Ordering::SeqCst);
		Ok(MockConnection)
	}

	async fn add_and_get(
		&self,
		_conn: &Self::Connection,
		id: &str,
		delta: i64,
	) -> Result<i64, StoreError> {
		self.check_schema()?;

		let delay = self.write_delay_ms.load(Ordering::SeqCst);
		if delay > 0 {
			tokio::time::sleep(Duration::from_millis(delay)).await;
		}

		let mut counters = self.counters.lock().unwrap();
		let counter = counters.entry(id.to_string()).or_insert(0);
		*counter += delta;

		match self.empty_reads.load(Ordering::SeqCst) {
			true => Err(StoreError::EmptyResult),
			false => Ok(*counter),
		}
	}

	async fn get(&self, _conn: &Self::Connection, id: &str) -> Result<Option<i64>, StoreError> {
		self.check_schema()?;

		match self.empty_reads.load(Ordering::SeqCst) {
			true => Ok(None),
			false => Ok(self.counters.lock().unwrap().get(id).copied()),
		}
	}

	async fn reset(&self, _conn: &Self::Connection) -> Result<(), StoreError> {
		self.counters.lock().unwrap().clear();
		self.missing_schema.store(false, Ordering::SeqCst);
		Ok(())
	}

	async fn disconnect(&self, _conn: Self::Connection) {
		self.open.fetch_sub(1, Ordering::SeqCst);
	}
}
