//! Synchronous facade over the async core (spec §5, §9 "single internal
//! implementation ... with a synchronous facade that blocks a calling
//! thread").
//!
//! A Channel's receive loop and a Pool's cleanup task are both spawned via
//! `tokio::spawn` onto whichever runtime is driving execution at the time —
//! dropping that `Runtime` aborts them outright. A facade that built and
//! tore down a fresh `Runtime` per call would kill its own background
//! plumbing the instant the call that created it returned. So
//! [`BlockingChannel`] and [`BlockingPool`] each keep one current-thread
//! `Runtime` alive for as long as the handle is in use, and every
//! subsequent blocking call is driven through that same instance.

use std::sync::Arc;

use tokio::runtime::Runtime;

use crate::channel::{Channel, ChannelOptions};
use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::pool::{Pool, PoolOptions, PoolStatsSnapshot};
use crate::query::params::Parameters;
use crate::query::result::QueryResult;
use crate::query::{Query, QueryOptions, QueryState};
use crate::tls::TlsContextCache;

fn new_runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(crate::error::Error::Io)
}

/// Blocking equivalent of [`Channel`]. Holds the Runtime its receive loop
/// was spawned on for as long as this handle is alive.
pub struct BlockingChannel {
    channel: Arc<Channel>,
    runtime: Arc<Runtime>,
}

impl BlockingChannel {
    /// Blocking equivalent of [`Channel::open`].
    pub fn open(endpoint: Endpoint, options: ChannelOptions, tls_cache: &TlsContextCache) -> Result<Self> {
        let runtime = Arc::new(new_runtime()?);
        let channel = runtime.block_on(Channel::open(endpoint, options, tls_cache))?;
        Ok(BlockingChannel { channel, runtime })
    }

    /// The underlying async handle, for callers that want to drive it from
    /// async code sharing this facade's runtime.
    pub fn handle(&self) -> Arc<Channel> {
        self.channel.clone()
    }

    /// Builds a [`BlockingQuery`] bound to this Channel and its Runtime.
    pub fn query(&self, sql: impl Into<String>, parameters: Option<Parameters>, options: QueryOptions) -> BlockingQuery {
        BlockingQuery {
            inner: Query::new(self.channel.clone(), sql, parameters, options),
            runtime: self.runtime.clone(),
        }
    }

    /// Blocking equivalent of [`Channel::close`].
    pub fn close(&self) -> Result<()> {
        self.runtime.block_on(self.channel.close())
    }
}

/// Blocking equivalent of [`Pool`]. Every Channel the pool opens, warmed or
/// on-demand, has its receive loop spawned during a `block_on` on this same
/// Runtime, so it stays alive alongside them.
pub struct BlockingPool {
    pool: Arc<Pool>,
    runtime: Arc<Runtime>,
}

impl BlockingPool {
    /// Blocking equivalent of [`Pool::new`].
    pub fn open(endpoint: Endpoint, options: PoolOptions, tls_cache: Arc<TlsContextCache>) -> Result<Self> {
        let runtime = Arc::new(new_runtime()?);
        let pool = runtime.block_on(Pool::new(endpoint, options, tls_cache))?;
        Ok(BlockingPool { pool, runtime })
    }

    /// Blocking equivalent of [`Pool::get`].
    pub fn get(&self) -> Result<Arc<Channel>> {
        self.runtime.block_on(self.pool.get())
    }

    /// Blocking equivalent of [`Pool::wait_for`].
    pub fn wait_for(&self, force_new: bool) -> Result<Arc<Channel>> {
        self.runtime.block_on(self.pool.wait_for(force_new))
    }

    /// Blocking equivalent of [`Pool::pop`].
    pub fn pop(&self) -> Result<Arc<Channel>> {
        self.runtime.block_on(self.pool.pop())
    }

    /// Builds a [`BlockingQuery`] over a Channel obtained from this pool,
    /// sharing this facade's Runtime.
    pub fn query(&self, channel: Arc<Channel>, sql: impl Into<String>, parameters: Option<Parameters>, options: QueryOptions) -> BlockingQuery {
        BlockingQuery {
            inner: Query::new(channel, sql, parameters, options),
            runtime: self.runtime.clone(),
        }
    }

    /// Blocking equivalent of [`Pool::shutdown`].
    pub fn shutdown(&self) {
        self.runtime.block_on(self.pool.shutdown());
    }

    pub fn stats(&self) -> PoolStatsSnapshot {
        self.pool.stats()
    }
}

/// Wraps a [`Query`], driving every call through the same Runtime its
/// parent Channel (or pool) was opened with.
pub struct BlockingQuery {
    inner: Query,
    runtime: Arc<Runtime>,
}

impl BlockingQuery {
    pub fn run(&self, rows_to_fetch: Option<i64>) -> Result<QueryResult> {
        self.runtime.block_on(self.inner.run(rows_to_fetch))
    }

    pub fn prepare_sql_execute(&self) -> Result<QueryResult> {
        self.runtime.block_on(self.inner.prepare_sql_execute())
    }

    pub fn fetch_more(&self, rows_to_fetch: Option<i64>) -> Result<QueryResult> {
        self.runtime.block_on(self.inner.fetch_more(rows_to_fetch))
    }

    pub fn fetch_all(&self) -> Result<QueryResult> {
        self.runtime.block_on(self.inner.fetch_all())
    }

    pub fn close(&self) -> Result<()> {
        self.runtime.block_on(self.inner.close())
    }

    pub fn state(&self) -> QueryState {
        self.inner.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_runtime_builds_successfully() {
        assert!(new_runtime().is_ok());
    }
}
