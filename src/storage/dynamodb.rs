use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_dynamodb::{
	config::{Credentials, Region},
	types::{
		AttributeDefinition, AttributeValue, BillingMode, KeySchemaElement, KeyType,
		ReturnValue, ScalarAttributeType, TableStatus,
	},
	Client,
};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::types::StoreError;

use super::common::{parse_options, CounterStore};

/// Counter attribute of each item.
const COUNTER_ATTRIBUTE: &str = "n";
/// Hash key attribute of each item.
const ID_ATTRIBUTE: &str = "id";
/// Number of `DescribeTable` polls while waiting for a recreated table to become active.
const TABLE_ACTIVE_POLLS: usize = 30;

/// Options of the `dynamodb` backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct DynamoDbOptions {
	pub region: String,
	/// Endpoint override, e.g. a DynamoDB Local instance. `None` uses the regional AWS endpoint.
	pub endpoint: Option<String>,
	pub table: String,
	/// Static credentials. When absent the default AWS credential chain is used.
	pub access_key_id: Option<String>,
	pub secret_access_key: Option<String>,
}

impl Default for DynamoDbOptions {
	fn default() -> Self {
		Self {
			region: "localhost".to_string(),
			endpoint: Some("http://localhost:8000".to_string()),
			table: "servicebox".to_string(),
			access_key_id: None,
			secret_access_key: None,
		}
	}
}

/// DynamoDB table keyed by `id`.
///
/// `UpdateItem` with `ReturnValues = ALL_NEW` applies the delta and returns the new value in a
/// single call, so `add_and_get` is atomic here.
pub struct DynamoDbStore {
	options: DynamoDbOptions,
}

impl DynamoDbStore {
	pub const NAME: &'static str = "dynamodb";

	pub fn new(options: DynamoDbOptions) -> Self {
		Self { options }
	}

	pub fn from_options(options: serde_json::Value) -> crate::Result<Self> {
		Ok(Self::new(parse_options(Self::NAME, options)?))
	}

	async fn wait_until_active(&self, client: &Client) -> Result<(), StoreError> {
		for _ in 0..TABLE_ACTIVE_POLLS {
			let output = client
				.describe_table()
				.table_name(&self.options.table)
				.send()
				.await
				.map_err(StoreError::driver)?;

			let status = output.table().and_then(|table| table.table_status());
			if status == Some(&TableStatus::Active) {
				return Ok(())
			}

			debug!("Table {} is {:?}, waiting", self.options.table, status);
			tokio::time::sleep(Duration::from_millis(500)).await;
		}

		Err(StoreError::driver(std::io::Error::new(
			std::io::ErrorKind::TimedOut,
			format!("table {} never became active", self.options.table),
		)))
	}
}

#[async_trait]
impl CounterStore for DynamoDbStore {
	type Connection = Client;

	#[instrument(skip(self), fields(region = %self.options.region, endpoint = ?self.options.endpoint))]
	async fn connect(&self) -> Result<Self::Connection, StoreError> {
		let mut loader = aws_config::from_env().region(Region::new(self.options.region.clone()));
		if let Some(endpoint) = &self.options.endpoint {
			loader = loader.endpoint_url(endpoint);
		}
		if let (Some(key), Some(secret)) =
			(&self.options.access_key_id, &self.options.secret_access_key)
		{
			loader = loader.credentials_provider(Credentials::new(
				key.clone(),
				secret.clone(),
				None,
				None,
				"servicebox",
			));
		}

		let client = Client::new(&loader.load().await);

		// The client is lazy; ListTables proves the endpoint answers and accepts the credentials.
		debug!("Contacting DynamoDB");
		let tables = client.list_tables().send().await.map_err(StoreError::driver)?;
		debug!("reply: {:?}", tables.table_names());

		Ok(client)
	}

	async fn add_and_get(
		&self,
		conn: &Self::Connection,
		id: &str,
		delta: i64,
	) -> Result<i64, StoreError> {
		debug!("DynamoDB UpdateItem {} += {}", id, delta);
		let output = conn
			.update_item()
			.table_name(&self.options.table)
			.key(ID_ATTRIBUTE, AttributeValue::S(id.to_string()))
			.update_expression(format!(
				"SET {0} = if_not_exists({0}, :start) + :num",
				COUNTER_ATTRIBUTE
			))
			.expression_attribute_values(":num", AttributeValue::N(delta.to_string()))
			.expression_attribute_values(":start", AttributeValue::N("0".to_string()))
			.return_values(ReturnValue::AllNew)
			.send()
			.await
			.map_err(StoreError::driver)?;

		let attributes = output.attributes().ok_or(StoreError::EmptyResult)?;
		counter_value(attributes.get(COUNTER_ATTRIBUTE))?.ok_or(StoreError::EmptyResult)
	}

	async fn get(&self, conn: &Self::Connection, id: &str) -> Result<Option<i64>, StoreError> {
		debug!("DynamoDB GetItem {}", id);
		let output = conn
			.get_item()
			.table_name(&self.options.table)
			.key(ID_ATTRIBUTE, AttributeValue::S(id.to_string()))
			.consistent_read(true)
			.send()
			.await
			.map_err(StoreError::driver)?;

		match output.item() {
			Some(item) => counter_value(item.get(COUNTER_ATTRIBUTE)),
			None => Ok(None),
		}
	}

	async fn reset(&self, conn: &Self::Connection) -> Result<(), StoreError> {
		let table = &self.options.table;

		match conn.delete_table().table_name(table).send().await {
			Ok(_) => info!("Deleted DynamoDB table {}", table),
			Err(e) if e.as_service_error().is_some_and(|e| e.is_resource_not_found_exception()) =>
				debug!("DynamoDB table {} did not exist", table),
			Err(e) => return Err(StoreError::driver(e)),
		}

		// Deletion is asynchronous on real DynamoDB; the create call fails until it completes.
		let mut attempts = 0;
		loop {
			let created = conn
				.create_table()
				.table_name(table)
				.attribute_definitions(
					AttributeDefinition::builder()
						.attribute_name(ID_ATTRIBUTE)
						.attribute_type(ScalarAttributeType::S)
						.build()
						.map_err(StoreError::driver)?,
				)
				.key_schema(
					KeySchemaElement::builder()
						.attribute_name(ID_ATTRIBUTE)
						.key_type(KeyType::Hash)
						.build()
						.map_err(StoreError::driver)?,
				)
				.billing_mode(BillingMode::PayPerRequest)
				.send()
				.await;

			match created {
				Ok(_) => break,
				Err(e) if attempts < TABLE_ACTIVE_POLLS &&
					e.as_service_error().is_some_and(|e| e.is_resource_in_use_exception()) =>
				{
					attempts += 1;
					warn!("DynamoDB table {} still being deleted, retrying", table);
					tokio::time::sleep(Duration::from_millis(500)).await;
				},
				Err(e) => return Err(StoreError::driver(e)),
			}
		}

		self.wait_until_active(conn).await
	}

	async fn disconnect(&self, conn: Self::Connection) {
		drop(conn);
	}
}

fn counter_value(value: Option<&AttributeValue>) -> Result<Option<i64>, StoreError> {
	match value {
		None => Ok(None),
		Some(AttributeValue::N(n)) =>
			n.parse::<i64>().map(Some).map_err(|_| StoreError::Parsing(n.clone())),
		Some(other) => Err(StoreError::Parsing(format!("{:?}", other))),
	}
}
