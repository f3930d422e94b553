//! Core multiplexed client for the Db2-on-IBM-i SQL gateway protocol.
//!
//! This crate implements the framed request/response multiplexer over one
//! secure WebSocket channel, the cursor/query state machine, the bounded
//! connection pool, and the TLS context/certificate cache. It does not
//! implement a SQL parser, a PEP-249-shaped cursor API, or credential
//! loading from files/environment beyond the minimal INI reader on
//! [`Endpoint`].

mod channel;
mod endpoint;
mod error;
mod net;
mod pool;
mod query;
mod request;
mod tls;

pub mod blocking;

pub use channel::{Channel, ChannelOptions, ChannelStatus};
pub use endpoint::{CredentialProducer, Endpoint, StaticPassword};
pub use error::{DatabaseError, Error, Result};
pub use pool::{Pool, PoolOptions, PoolStats, PoolStatsSnapshot};
pub use query::correlation::is_correlation_expired;
pub use query::params::{normalize, normalize_many, Parameters};
pub use query::result::{ColumnMetadata, QueryMetadata, QueryResult};
pub use query::{Query, QueryOptions, QueryState};
pub use tls::{CacheStats, CacheStatsSnapshot, CertificateCache, TlsContext, TlsContextCache};
