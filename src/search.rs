use std::net::SocketAddr;

use tracing::{debug, trace};
use trust_dns_proto::op::Message;
use trust_dns_proto::rr::dnssec::rdata::DNSSECRData;
use trust_dns_proto::rr::RData;

use crate::error::SearchError;
use crate::probe::probe_label;
use crate::query::Exchange;
use crate::range::{NsecRange, Zone};

/// Finds the NSEC range that follows `seed` in `zone`.
///
/// Transport failures are retried up to `attempts` times against the same
/// resolver. A response without a fitting NSEC record is final.
pub async fn search_range<E>(
    exchange: &E,
    resolver: SocketAddr,
    seed: &str,
    zone: &Zone,
    attempts: u32,
) -> Result<NsecRange, SearchError>
where
    E: Exchange + ?Sized,
{
    let probe = probe_label(seed);
    let qname = format!("{probe}.{zone}");

    let mut attempt = 1;
    let response = loop {
        match exchange.exchange(resolver, &qname).await {
            Ok(response) => break response,
            Err(e) if attempt < attempts => {
                trace!(%resolver, %qname, attempt, "query failed: {e}");
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    };

    for (owner, next) in nsec_pairs(&response) {
        match zone.range(&owner, &next, &probe) {
            Some(range) => return Ok(range),
            None => debug!(%owner, %next, %probe, "skipping NSEC record"),
        }
    }
    Err(SearchError::NotFound)
}

/// Owner and next-domain names of every NSEC record in the authority
/// section.
fn nsec_pairs(response: &Message) -> impl Iterator<Item = (String, String)> + '_ {
    response
        .name_servers()
        .iter()
        .filter_map(|record| match record.data() {
            Some(RData::DNSSEC(DNSSECRData::NSEC(nsec))) => Some((
                record.name().to_string(),
                nsec.next_domain_name().to_string(),
            )),
            _ => None,
        })
}
