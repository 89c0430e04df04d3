//! Zone enumeration by NSEC walking.
//!
//! A DNSSEC-signed zone that uses NSEC answers every query for a missing
//! name with a record naming the existing names on either side of the gap.
//! Asking for a name just past each known one therefore reveals the next,
//! until the chain wraps back to the apex.

pub mod config;
pub mod error;
pub mod input;
pub mod probe;
pub mod query;
pub mod range;
pub mod resolvers;
pub mod retry;
pub mod search;
pub mod walker;

pub use config::WalkConfig;
pub use query::{DnsClient, Exchange};
pub use range::{NsecRange, Zone};
pub use resolvers::ResolverPool;
pub use walker::{Discovery, WalkStats, Walker, WorkItem};
