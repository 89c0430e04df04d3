//! Where queries go: either one resolver chosen by the user or a pool of
//! resolvers rotated at random on failure.

use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use rand::seq::SliceRandom;
use tracing::{debug, warn};
use trust_dns_resolver::config::ResolverConfig;
use trust_dns_resolver::system_conf::read_system_conf;

use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct ResolverPool {
    /// Never empty.
    addrs: Vec<SocketAddr>,
    /// A fixed pool holds one resolver and never rotates away from it.
    fixed: bool,
}

impl ResolverPool {
    /// Resolves a user supplied `IP`, `IP:PORT` or `HOST[:PORT]`.
    pub async fn fixed(addr: &str, port: u16) -> Result<Self, ConfigError> {
        if let Ok(sa) = addr.parse::<SocketAddr>() {
            return Ok(Self::single(sa));
        }
        if let Ok(ip) = addr.trim_matches(|c| c == '[' || c == ']').parse::<IpAddr>() {
            return Ok(Self::single(SocketAddr::new(ip, port)));
        }

        let (host, port) = match addr.rsplit_once(':') {
            Some((host, p)) => (
                host,
                p.parse()
                    .map_err(|_| ConfigError::InvalidResolver(addr.to_owned()))?,
            ),
            None => (addr, port),
        };
        if host.is_empty() {
            return Err(ConfigError::InvalidResolver(addr.to_owned()));
        }
        let sa = tokio::net::lookup_host((host, port))
            .await
            .map_err(|_| ConfigError::UnresolvedResolver(addr.to_owned()))?
            .next()
            .ok_or_else(|| ConfigError::UnresolvedResolver(addr.to_owned()))?;
        Ok(Self::single(sa))
    }

    pub fn single(addr: SocketAddr) -> Self {
        Self {
            addrs: vec![addr],
            fixed: true,
        }
    }

    pub fn rotating(addrs: impl IntoIterator<Item = IpAddr>, port: u16) -> Result<Self, ConfigError> {
        let mut pool: Vec<SocketAddr> = Vec::new();
        for ip in addrs {
            let sa = SocketAddr::new(ip, port);
            if !pool.contains(&sa) {
                pool.push(sa);
            }
        }
        if pool.is_empty() {
            return Err(ConfigError::EmptyPool);
        }
        Ok(Self {
            addrs: pool,
            fixed: false,
        })
    }

    /// Reads one resolver IP per line. Blank lines, `#` comments and
    /// unparsable entries are skipped.
    pub fn from_file(path: &Path, port: u16) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::ResolverFile {
            path: path.display().to_string(),
            source,
        })?;
        Self::rotating(parse_list(&text), port)
    }

    /// Resolvers from the system configuration, or well-known public
    /// resolvers when there is none.
    pub fn system(port: u16) -> Result<Self, ConfigError> {
        let ips = match read_system_conf() {
            Ok((config, _)) => config_ips(&config),
            Err(e) => {
                debug!("no system resolver configuration: {e}");
                Vec::new()
            }
        };
        if !ips.is_empty() {
            return Self::rotating(ips, port);
        }
        Self::public(port)
    }

    pub fn public(port: u16) -> Result<Self, ConfigError> {
        let configs = [
            ResolverConfig::google(),
            ResolverConfig::cloudflare(),
            ResolverConfig::quad9(),
        ];
        Self::rotating(configs.iter().flat_map(config_ips), port)
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    /// A resolver to use next. Random for rotating pools.
    pub fn pick(&self) -> SocketAddr {
        if self.fixed {
            return self.addrs[0];
        }
        self.addrs
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(self.addrs[0])
    }

    pub fn addrs(&self) -> &[SocketAddr] {
        &self.addrs
    }
}

fn config_ips(config: &ResolverConfig) -> Vec<IpAddr> {
    config
        .name_servers()
        .iter()
        .map(|ns| ns.socket_addr.ip())
        .collect()
}

fn parse_list(text: &str) -> Vec<IpAddr> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| match line.parse() {
            Ok(ip) => Some(ip),
            Err(_) => {
                warn!("ignoring resolver entry {line:?}");
                None
            }
        })
        .collect()
}
