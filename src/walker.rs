//! Worker pools driving many zone walks at once.
//!
//! Seeds arrive on one queue and are served by the seed pool. Every step
//! that uncovers a further name hands the rest of the walk to a second,
//! recursive queue, so a long zone does not pin the worker that started it
//! and walks of different zones interleave. When the recursive queue is
//! full the worker simply keeps walking inline.
//!
//! The walk ends once the seed pool has drained and no handed-off work is
//! left, or earlier if the cancellation token fires.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::WalkConfig;
use crate::query::Exchange;
use crate::range::Zone;
use crate::resolvers::ResolverPool;
use crate::retry::{walk_step, StepOutcome};

/// Where a walk picks up: the zone and the last label seen in it.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub zone: Arc<Zone>,
    /// Empty at the start of a zone.
    pub seed: String,
}

impl WorkItem {
    pub fn start(zone: Zone) -> Self {
        Self {
            zone: Arc::new(zone),
            seed: String::new(),
        }
    }
}

/// A name proven to exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    pub zone: String,
    pub name: String,
}

/// Counters gathered over a whole run.
#[derive(Debug, Default)]
struct Counters {
    names: AtomicU64,
    completed: AtomicU64,
    unwalkable: AtomicU64,
    abandoned: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    /// Names sent to the sink.
    pub names: u64,
    /// Walks that wrapped around to the apex.
    pub completed: u64,
    /// Walks that found no usable NSEC record.
    pub unwalkable: u64,
    /// Walks given up after exhausting retries.
    pub abandoned: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PoolKind {
    Seed,
    /// Items in this pool are counted in `Shared::outstanding`.
    Recursive,
}

struct Shared<E> {
    exchange: E,
    config: WalkConfig,
    pool: ResolverPool,
    sink: mpsc::Sender<Discovery>,
    recursive: mpsc::Sender<WorkItem>,
    /// Handed-off items not finished yet.
    outstanding: AtomicUsize,
    idle: Notify,
    cancel: CancellationToken,
    counters: Counters,
}

pub struct Walker<E> {
    shared: Arc<Shared<E>>,
    seeds: mpsc::Receiver<WorkItem>,
    recursive: mpsc::Receiver<WorkItem>,
}

impl<E> Walker<E>
where
    E: Exchange + 'static,
{
    /// Builds a walker that reports names to `sink`. Zones to walk go into
    /// the returned sender; dropping it tells the walker no more will come.
    pub fn new(
        exchange: E,
        pool: ResolverPool,
        config: WalkConfig,
        sink: mpsc::Sender<Discovery>,
    ) -> (Self, mpsc::Sender<WorkItem>) {
        let capacity = config.queue_capacity.max(1);
        let (seed_tx, seed_rx) = mpsc::channel(capacity);
        let (recursive_tx, recursive_rx) = mpsc::channel(capacity);

        let shared = Arc::new(Shared {
            exchange,
            config,
            pool,
            sink,
            recursive: recursive_tx,
            outstanding: AtomicUsize::new(0),
            idle: Notify::new(),
            cancel: CancellationToken::new(),
            counters: Counters::default(),
        });

        let walker = Self {
            shared,
            seeds: seed_rx,
            recursive: recursive_rx,
        };
        (walker, seed_tx)
    }

    /// Cancelling stops workers from taking new items. Queries in flight
    /// finish first.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shared.cancel.clone()
    }

    pub async fn run(self) -> WalkStats {
        let Self {
            shared,
            seeds,
            recursive,
        } = self;
        let workers = shared.config.concurrency.max(1);
        let seeds = Arc::new(Mutex::new(seeds));
        let recursive = Arc::new(Mutex::new(recursive));

        let mut seed_pool = JoinSet::new();
        for id in 0..workers {
            seed_pool.spawn(Arc::clone(&shared).worker(PoolKind::Seed, id, Arc::clone(&seeds)));
        }
        let mut recursive_pool = JoinSet::new();
        for id in 0..workers {
            recursive_pool.spawn(Arc::clone(&shared).worker(
                PoolKind::Recursive,
                id,
                Arc::clone(&recursive),
            ));
        }
        info!(workers, resolvers = shared.pool.addrs().len(), "walk started");

        join_all(&mut seed_pool, "seed").await;
        debug!("seed queue drained");

        shared.wait_idle().await;
        shared.cancel.cancel();
        join_all(&mut recursive_pool, "recursive").await;
        recursive.lock().await.close();

        let stats = shared.counters.snapshot();
        info!(
            names = stats.names,
            completed = stats.completed,
            unwalkable = stats.unwalkable,
            abandoned = stats.abandoned,
            "walk finished"
        );
        stats
    }
}

impl<E> Shared<E>
where
    E: Exchange + 'static,
{
    async fn worker(
        self: Arc<Self>,
        kind: PoolKind,
        id: usize,
        queue: Arc<Mutex<mpsc::Receiver<WorkItem>>>,
    ) {
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            let item = {
                let mut rx = queue.lock().await;
                tokio::select! {
                    _ = self.cancel.cancelled() => None,
                    item = rx.recv() => item,
                }
            };
            let Some(item) = item else {
                break;
            };

            debug!(worker = id, ?kind, zone = %item.zone, seed = %item.seed, "took work");
            self.walk(item).await;
            if kind == PoolKind::Recursive {
                self.finish_one();
            }
        }
        debug!(worker = id, ?kind, "worker done");
    }

    /// Walks `item.zone` from `item.seed` until the zone ends, the walk
    /// fails, or the remainder is handed off.
    async fn walk(&self, item: WorkItem) {
        let WorkItem { zone, mut seed } = item;

        loop {
            if self.cancel.is_cancelled() {
                return;
            }

            let range = match walk_step(&self.exchange, &self.config, &self.pool, &zone, &seed).await {
                StepOutcome::Found(range) => range,
                StepOutcome::NotFound => {
                    debug!(%zone, "zone does not support NSEC walking");
                    self.counters.unwalkable.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                StepOutcome::Exhausted => {
                    warn!(%zone, %seed, "giving up on walk");
                    self.counters.abandoned.fetch_add(1, Ordering::Relaxed);
                    return;
                }
            };

            if !range.prev.is_empty() && !self.emit(&zone, &range.prev).await {
                return;
            }
            if range.is_last() {
                debug!(%zone, "reached end of zone");
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
                return;
            }

            let next = WorkItem {
                zone: Arc::clone(&zone),
                seed: range.next,
            };
            match self.hand_off(next) {
                Ok(()) => return,
                Err(next) => seed = next.seed,
            }
        }
    }

    /// Reports a name. Returns `false` once nobody listens any more, in
    /// which case the whole run is cancelled.
    async fn emit(&self, zone: &Zone, label: &str) -> bool {
        let discovery = Discovery {
            zone: zone.name().to_owned(),
            name: zone.fqdn(label),
        };
        if self.sink.send(discovery).await.is_err() {
            if !self.cancel.is_cancelled() {
                warn!(%zone, "output closed, stopping");
                self.cancel.cancel();
            }
            return false;
        }
        self.counters.names.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Queues the rest of a walk for the recursive pool. Gives the item
    /// back when the queue is full or the walk is being cancelled.
    fn hand_off(&self, item: WorkItem) -> Result<(), WorkItem> {
        if self.cancel.is_cancelled() {
            return Err(item);
        }
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        match self.recursive.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(item) | TrySendError::Closed(item)) => {
                self.finish_one();
                Err(item)
            }
        }
    }

    fn finish_one(&self) {
        if self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    /// Resolves once no handed-off work remains, or on cancellation.
    async fn wait_idle(&self) {
        loop {
            let idle = self.idle.notified();
            if self.outstanding.load(Ordering::SeqCst) == 0 {
                return;
            }
            tokio::select! {
                _ = idle => {}
                _ = self.cancel.cancelled() => return,
            }
        }
    }
}

impl Counters {
    fn snapshot(&self) -> WalkStats {
        WalkStats {
            names: self.names.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            unwalkable: self.unwalkable.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }
}

async fn join_all(pool: &mut JoinSet<()>, kind: &str) {
    while let Some(res) = pool.join_next().await {
        if let Err(e) = res {
            error!(pool = kind, "worker failed: {e}");
        }
    }
}
