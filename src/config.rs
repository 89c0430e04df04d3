use std::time::Duration;

use crate::error::ConfigError;

/// Knobs for a walk. Built once by the caller and handed down to every
/// worker; nothing in the core reads process-wide state.
#[derive(Debug, Clone)]
pub struct WalkConfig {
    /// Workers per pool. There are two pools, seeds and continuations.
    pub concurrency: usize,
    /// Port used for resolvers given without one.
    pub port: u16,
    /// Transport failures tolerated per walk step.
    pub max_retries: u32,
    /// First backoff delay; doubled after every failed attempt.
    pub backoff: Duration,
    /// Attempts against one resolver before a transport error surfaces.
    pub search_attempts: u32,
    pub timeout: Duration,
    /// EDNS0 UDP payload size advertised in queries.
    pub udp_payload: u16,
    pub queue_capacity: usize,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            concurrency: 20,
            port: 53,
            max_retries: 5,
            backoff: Duration::from_secs(1),
            search_attempts: 3,
            timeout: Duration::from_secs(5),
            udp_payload: 4096,
            queue_capacity: 500,
        }
    }
}

impl WalkConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        Ok(())
    }
}
