use std::io;

use thiserror::Error;
use trust_dns_proto::error::ProtoError;

/// A failure to get a usable answer out of a resolver.
///
/// These are worth retrying, possibly against another resolver.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Io(#[from] io::Error),

    #[error("query timed out")]
    Timeout,

    #[error("malformed DNS message: {0}")]
    Proto(#[from] ProtoError),

    #[error("response id {got} does not match query id {expected}")]
    IdMismatch { expected: u16, got: u16 },

    #[error("message of {0} bytes does not fit a TCP frame")]
    Oversized(usize),
}

#[derive(Debug, Error)]
pub enum SearchError {
    /// No NSEC record in the response brackets the probe. Either the zone
    /// is not NSEC-signed or the chain cannot be followed from here.
    #[error("NSEC record not found")]
    NotFound,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid resolver address {0:?}")]
    InvalidResolver(String),

    #[error("resolver {0:?} did not resolve to any address")]
    UnresolvedResolver(String),

    #[error("resolver pool is empty")]
    EmptyPool,

    #[error("concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("cannot read resolver list {path}: {source}")]
    ResolverFile { path: String, source: io::Error },
}

#[derive(Debug, Error)]
#[error("failed to read input: {0}")]
pub struct InputError(#[from] pub io::Error);

#[derive(Debug, Error)]
#[error("invalid zone name {0:?}")]
pub struct InvalidZone(pub String);
