/// The following diagram shows a high level overview of how a request to the `sum` endpoint
/// reaches a counter store, and how the store was bound at start-up.
///
/// Only the Cassandra and Redis stores are expanded; the remaining stores plug in the same way.
#[cfg_attr(doc, aquamarine::aquamarine)]
/// ```mermaid
/// graph TB
///     subgraph Start-up
///         main[main]-- type name + options --> factory[BackendFactory]
///         factory-- instantiate --> backend_trait
///         factory-- bind --> backend_trait
///     end
///     subgraph HTTP
///         sum["GET /api/v2/calc/sum/{id}/{n}"]-- add_and_get --> backend_trait
///     end
///     subgraph Servicebox
///         backend_trait>Backend]
///         memory[MemoryBackend]-. impl .- backend_trait
///         distributed["DistributedCounterBackend&lt;S&gt;"]-. impl .- backend_trait
///         counter_store>CounterStore]
///         distributed-- connect, health check, add_and_get, get --> counter_store
///         redis_store[RedisStore]-. impl .- counter_store
///         cassandra_store[CassandraStore]-. impl .- counter_store
///     end
///     redis_store --> redis[(Redis)]
///     cassandra_store --> cassandra[(Cassandra)]
/// ```
///
/// A [`Backend`](crate::Backend) is created once by the [`BackendFactory`](crate::BackendFactory)
/// and shared by every request. Binding moves it through the
/// [`BindState`](crate::BindState) machine:
///
/// ```mermaid
/// stateDiagram-v2
///     [*] --> Unbound
///     Unbound --> Connecting: bind()
///     Connecting --> HealthChecking: connected
///     Connecting --> Failed: connect error
///     HealthChecking --> Bound: add_and_get(key, 0) + get(key)
///     HealthChecking --> Failed: connection closed, health check error
///     Failed --> Connecting: bind()
///     Bound --> Unbound: unbind()
/// ```
///
/// New stores only implement
/// [`CounterStore`](crate::storage::common::CounterStore); the bind protocol, the
/// `NotConnected` guard and error wrapping come from
/// [`DistributedCounterBackend`](crate::storage::distributed::DistributedCounterBackend).
pub struct Diagram;
