//! Backoff and resolver rotation around a single walk step.

use std::net::SocketAddr;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::WalkConfig;
use crate::error::SearchError;
use crate::query::Exchange;
use crate::range::{NsecRange, Zone};
use crate::resolvers::ResolverPool;
use crate::search::search_range;

/// How a walk step ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Found(NsecRange),
    /// The zone offers no NSEC chain to follow from this point.
    NotFound,
    /// Every retry failed at the transport level.
    Exhausted,
}

/// Retry budget of one step. Carries the resolver in use so that rotation
/// stays local to the worker.
#[derive(Debug, Clone)]
pub struct RetryState {
    attempts_left: u32,
    backoff: Duration,
    resolver: SocketAddr,
}

impl RetryState {
    pub fn new(config: &WalkConfig, pool: &ResolverPool) -> Self {
        Self {
            attempts_left: config.max_retries.max(1),
            backoff: config.backoff,
            resolver: pool.pick(),
        }
    }

    pub fn resolver(&self) -> SocketAddr {
        self.resolver
    }

    /// Spends one attempt. Returns how long to wait before the next one,
    /// or `None` once the budget is gone.
    pub fn fail(&mut self) -> Option<Duration> {
        self.attempts_left = self.attempts_left.saturating_sub(1);
        if self.attempts_left == 0 {
            return None;
        }
        let delay = self.backoff;
        self.backoff = self.backoff.saturating_mul(2);
        Some(delay)
    }

    /// Moves to another resolver unless the pool is pinned to one.
    pub fn rotate(&mut self, pool: &ResolverPool) {
        if !pool.is_fixed() {
            self.resolver = pool.pick();
        }
    }
}

/// Runs one step of the walk of `zone` after `seed`, retrying transport
/// failures with exponential backoff.
pub async fn walk_step<E>(
    exchange: &E,
    config: &WalkConfig,
    pool: &ResolverPool,
    zone: &Zone,
    seed: &str,
) -> StepOutcome
where
    E: Exchange + ?Sized,
{
    let mut state = RetryState::new(config, pool);

    loop {
        let resolver = state.resolver();
        match search_range(exchange, resolver, seed, zone, config.search_attempts).await {
            Ok(range) => return StepOutcome::Found(range),
            Err(SearchError::NotFound) => {
                debug!(%zone, seed, "NSEC record not found");
                return StepOutcome::NotFound;
            }
            Err(SearchError::Transport(e)) => {
                warn!(%zone, seed, %resolver, "query failed: {e}");
                let Some(delay) = state.fail() else {
                    warn!(%zone, seed, "max retries reached");
                    return StepOutcome::Exhausted;
                };
                tokio::time::sleep(delay).await;
                state.rotate(pool);
            }
        }
    }
}
