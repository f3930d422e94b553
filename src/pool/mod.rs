//! Channel pool (spec §4.H): amortizes channel setup across many callers
//! by maintaining a fixed-bounded population of Channels and dispatching
//! them under load with heap-based least-busy selection.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::Mutex as AsyncMutex;
use tokio::task::{JoinHandle, JoinSet};

use crate::channel::{Channel, ChannelOptions, ChannelStatus};
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::tls::TlsContextCache;

/// Over how many in-flight requests a channel is considered loaded enough
/// to justify opening a fresh one instead (spec §4.H "the tie-break that
/// prevents runaway pile-up on a small warm set when capacity exists").
const LOAD_THRESHOLD: usize = 2;

const METRICS_FRESHNESS: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub starting_size: usize,
    pub max_size: usize,
    pub pre_warm: bool,
    /// Zero disables the background cleanup task.
    pub health_check_interval: Duration,
    /// Client-application identifier used when opening new Channels.
    pub application: String,
}

impl PoolOptions {
    pub fn new(starting_size: usize, max_size: usize) -> Self {
        PoolOptions {
            starting_size,
            max_size: max_size.max(starting_size),
            pre_warm: false,
            health_check_interval: Duration::from_secs(30),
            application: "ibmigw-core".to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct PoolStats {
    jobs_created: AtomicU64,
    jobs_destroyed: AtomicU64,
    ready_queue_hits: AtomicU64,
    busy_selections: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStatsSnapshot {
    pub jobs_created: u64,
    pub jobs_destroyed: u64,
    pub ready_queue_hits: u64,
    pub busy_selections: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl PoolStats {
    fn snapshot(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            jobs_created: self.jobs_created.load(Ordering::Relaxed),
            jobs_destroyed: self.jobs_destroyed.load(Ordering::Relaxed),
            ready_queue_hits: self.ready_queue_hits.load(Ordering::Relaxed),
            busy_selections: self.busy_selections.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
        }
    }
}

#[derive(Default)]
struct PoolInner {
    ready: VecDeque<u64>,
    busy_heap: BinaryHeap<Reverse<(usize, u64)>>,
    by_id: HashMap<u64, Arc<Channel>>,
    metrics_cache: HashMap<u64, (usize, Instant)>,
}

/// A fixed-bounded population of Channels sharing one endpoint (spec §3
/// "Pool", §4.H).
pub struct Pool {
    endpoint: Endpoint,
    options: PoolOptions,
    tls_cache: Arc<TlsContextCache>,
    inner: AsyncMutex<PoolInner>,
    creation_lock: AsyncMutex<()>,
    stats: PoolStats,
    cleanup_task: Mutex<Option<JoinHandle<()>>>,
}

impl Pool {
    pub async fn new(endpoint: Endpoint, options: PoolOptions, tls_cache: Arc<TlsContextCache>) -> Result<Arc<Pool>> {
        let pool = Arc::new(Pool {
            endpoint,
            options: options.clone(),
            tls_cache,
            inner: AsyncMutex::new(PoolInner::default()),
            creation_lock: AsyncMutex::new(()),
            stats: PoolStats::default(),
            cleanup_task: Mutex::new(None),
        });

        pool.initialize().await;

        if !options.health_check_interval.is_zero() {
            let background = pool.clone();
            let interval = options.health_check_interval;
            let task = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    ticker.tick().await;
                    background.cleanup().await;
                }
            });
            *pool.cleanup_task.lock().unwrap() = Some(task);
        }

        Ok(pool)
    }

    async fn initialize(&self) {
        let channels: Vec<Arc<Channel>> = if self.options.pre_warm {
            let mut set = JoinSet::new();
            for _ in 0..self.options.starting_size {
                let endpoint = self.endpoint.clone();
                let application = self.options.application.clone();
                let tls_cache = self.tls_cache.clone();
                set.spawn(async move {
                    Channel::open(endpoint, ChannelOptions::new(application), &tls_cache).await
                });
            }
            let mut channels = Vec::new();
            while let Some(result) = set.join_next().await {
                if let Ok(Ok(channel)) = result {
                    channels.push(channel);
                }
            }
            channels
        } else {
            let mut channels = Vec::new();
            for _ in 0..self.options.starting_size {
                if let Ok(channel) = self.create_channel().await {
                    channels.push(channel);
                }
            }
            channels
        };

        let mut inner = self.inner.lock().await;
        for channel in channels {
            inner.ready.push_back(channel.id());
            inner.by_id.insert(channel.id(), channel);
            self.stats.jobs_created.fetch_add(1, Ordering::Relaxed);
        }
    }

    async fn create_channel(&self) -> Result<Arc<Channel>> {
        let _guard = self.creation_lock.lock().await;
        let options = ChannelOptions::new(self.options.application.clone());
        Channel::open(self.endpoint.clone(), options, &self.tls_cache).await
    }

    /// O(1) preferred-path dispatch (spec §4.H `get`).
    pub async fn get(&self) -> Result<Arc<Channel>> {
        let mut inner = self.inner.lock().await;

        if let Some(id) = inner.ready.pop_front() {
            let channel = inner.by_id.get(&id).cloned().ok_or(Error::NoCapacity)?;
            let count = channel.running_count();
            inner.busy_heap.push(Reverse((count, id)));
            self.stats.ready_queue_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(channel);
        }

        self.refresh_locked(&mut inner);

        if let Some(id) = inner.ready.pop_front() {
            let channel = inner.by_id.get(&id).cloned().ok_or(Error::NoCapacity)?;
            let count = channel.running_count();
            inner.busy_heap.push(Reverse((count, id)));
            self.stats.ready_queue_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(channel);
        }

        if let Some(&Reverse((count, id))) = inner.busy_heap.peek() {
            if count > LOAD_THRESHOLD && inner.by_id.len() < self.options.max_size {
                drop(inner);
                return self.open_and_track(false).await;
            }

            let channel = inner.by_id.get(&id).cloned().ok_or(Error::NoCapacity)?;
            self.stats.busy_selections.fetch_add(1, Ordering::Relaxed);
            return Ok(channel);
        }

        if inner.by_id.len() >= self.options.max_size {
            return Err(Error::NoCapacity);
        }

        drop(inner);
        self.open_and_track(false).await
    }

    /// Like `get`, but when `force_new` is true and the pool has space,
    /// always opens a fresh Channel (spec §4.H `wait_for`).
    pub async fn wait_for(&self, force_new: bool) -> Result<Arc<Channel>> {
        if force_new {
            let has_space = self.inner.lock().await.by_id.len() < self.options.max_size;
            if has_space {
                return self.open_and_track(false).await;
            }
        }
        self.get().await
    }

    /// Detaches a Channel from the pool's tracking structures; opens an
    /// untracked one-shot Channel if none is ready (spec §4.H `pop`).
    pub async fn pop(&self) -> Result<Arc<Channel>> {
        {
            let mut inner = self.inner.lock().await;
            if let Some(id) = inner.ready.pop_front() {
                if let Some(channel) = inner.by_id.remove(&id) {
                    inner.metrics_cache.remove(&id);
                    return Ok(channel);
                }
            }
        }
        self.create_channel().await
    }

    async fn open_and_track(&self, mark_ready: bool) -> Result<Arc<Channel>> {
        let channel = self.create_channel().await?;
        let mut inner = self.inner.lock().await;
        let count = channel.running_count();
        if mark_ready {
            inner.ready.push_back(channel.id());
        } else {
            inner.busy_heap.push(Reverse((count, channel.id())));
        }
        inner.by_id.insert(channel.id(), channel.clone());
        self.stats.jobs_created.fetch_add(1, Ordering::Relaxed);
        Ok(channel)
    }

    /// Moves now-idle Channels back onto `ready`; refreshes `busy_heap`'s
    /// counts from `metrics_cache`, treating entries younger than ~1s as
    /// fresh (spec §4.H).
    fn refresh_locked(&self, inner: &mut PoolInner) {
        let mut ids = HashSet::new();
        for Reverse((_, id)) in inner.busy_heap.drain() {
            ids.insert(id);
        }

        let now = Instant::now();
        let mut still_busy = BinaryHeap::new();

        for id in ids {
            let Some(channel) = inner.by_id.get(&id) else { continue };

            let count = match inner.metrics_cache.get(&id) {
                Some((count, at)) if now.duration_since(*at) < METRICS_FRESHNESS => {
                    self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
                    *count
                }
                _ => {
                    self.stats.cache_misses.fetch_add(1, Ordering::Relaxed);
                    let count = channel.running_count();
                    inner.metrics_cache.insert(id, (count, now));
                    count
                }
            };

            if count == 0 && channel.status() == ChannelStatus::Ready {
                inner.ready.push_back(id);
            } else {
                still_busy.push(Reverse((count, id)));
            }
        }

        inner.busy_heap = still_busy;
    }

    /// Removes Channels in `{Ended, NotStarted}` from all structures
    /// (spec §4.H "Background cleanup").
    async fn cleanup(&self) {
        let mut inner = self.inner.lock().await;

        let dead: Vec<u64> = inner
            .by_id
            .iter()
            .filter(|(_, channel)| matches!(channel.status(), ChannelStatus::Ended | ChannelStatus::NotStarted))
            .map(|(id, _)| *id)
            .collect();

        if dead.is_empty() {
            return;
        }

        let dead_set: HashSet<u64> = dead.iter().copied().collect();
        for id in &dead {
            inner.by_id.remove(id);
            inner.metrics_cache.remove(id);
        }
        inner.ready.retain(|id| !dead_set.contains(id));
        let remaining: Vec<_> = inner
            .busy_heap
            .drain()
            .filter(|Reverse((_, id))| !dead_set.contains(id))
            .collect();
        inner.busy_heap = remaining.into_iter().collect();

        self.stats.jobs_destroyed.fetch_add(dead.len() as u64, Ordering::Relaxed);
    }

    /// Cancels the cleanup task, closes every Channel, and clears all
    /// structures (spec §4.H "On pool shutdown").
    pub async fn shutdown(&self) {
        if let Some(task) = self.cleanup_task.lock().unwrap().take() {
            task.abort();
        }

        let channels: Vec<Arc<Channel>> = {
            let mut inner = self.inner.lock().await;
            let channels = inner.by_id.values().cloned().collect();
            inner.by_id.clear();
            inner.ready.clear();
            inner.busy_heap.clear();
            inner.metrics_cache.clear();
            channels
        };

        for channel in channels {
            let _ = channel.close().await;
            self.stats.jobs_destroyed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub async fn get_active_job_count(&self) -> usize {
        self.inner.lock().await.by_id.len()
    }

    pub fn stats(&self) -> PoolStatsSnapshot {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_clamps_max_size_to_starting_size() {
        let options = PoolOptions::new(5, 2);
        assert_eq!(options.max_size, 5);
    }
}
