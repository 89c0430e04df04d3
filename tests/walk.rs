use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use nsecwalk::error::TransportError;
use nsecwalk::{Discovery, Exchange, ResolverPool, WalkConfig, WalkStats, Walker, WorkItem, Zone};
use tokio::sync::mpsc;
use trust_dns_proto::op::{Message, MessageType};
use trust_dns_proto::rr::dnssec::rdata::{DNSSECRData, NSEC};
use trust_dns_proto::rr::{Name, RData, Record, RecordType};

/// Serves NSEC denials for a fixed set of zones. Zones without a chain get
/// empty answers; `broken` zones fail at the transport level.
#[derive(Default)]
struct Chains {
    zones: BTreeMap<String, Vec<String>>,
    broken: HashSet<String>,
    calls: Arc<AtomicU32>,
}

impl Chains {
    fn zone(mut self, zone: &str, labels: &[&str]) -> Self {
        let mut chain: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        chain.push(String::new());
        chain.sort();
        self.zones.insert(zone.to_owned(), chain);
        self
    }

    fn unsigned(mut self, zone: &str) -> Self {
        self.zones.insert(zone.to_owned(), Vec::new());
        self
    }

    fn broken(mut self, zone: &str) -> Self {
        self.broken.insert(zone.to_owned());
        self
    }

    fn denial(zone: &str, chain: &[String], probe: &str) -> Message {
        let mut msg = Message::new();
        msg.set_message_type(MessageType::Response);
        if chain.is_empty() {
            return msg;
        }

        let idx = chain.iter().rposition(|l| l.as_str() < probe).unwrap_or(0);
        let fqdn = |label: &str| {
            let text = if label.is_empty() {
                format!("{zone}.")
            } else {
                format!("{label}.{zone}.")
            };
            Name::from_ascii(text).unwrap()
        };
        let next = chain.get(idx + 1).map_or("", String::as_str);
        let nsec = NSEC::new(fqdn(next), vec![RecordType::A, RecordType::RRSIG]);
        msg.add_name_server(Record::from_rdata(
            fqdn(&chain[idx]),
            3600,
            RData::DNSSEC(DNSSECRData::NSEC(nsec)),
        ));
        msg
    }
}

#[async_trait]
impl Exchange for Chains {
    async fn exchange(&self, _: SocketAddr, qname: &str) -> Result<Message, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;

        for (zone, chain) in &self.zones {
            if let Some(probe) = qname.strip_suffix(&format!(".{zone}")) {
                if self.broken.contains(zone) {
                    return Err(TransportError::Timeout);
                }
                return Ok(Self::denial(zone, chain, probe));
            }
        }
        Err(TransportError::Timeout)
    }
}

fn pool() -> ResolverPool {
    ResolverPool::single("192.0.2.53:53".parse().unwrap())
}

async fn walk(chains: Chains, zones: &[&str], config: WalkConfig) -> (Vec<Discovery>, WalkStats) {
    let (sink, mut names) = mpsc::channel(8);
    let (walker, seeds) = Walker::new(chains, pool(), config, sink);
    let run = tokio::spawn(walker.run());

    let collect = tokio::spawn(async move {
        let mut found = Vec::new();
        while let Some(d) = names.recv().await {
            found.push(d);
        }
        found
    });

    for zone in zones {
        seeds
            .send(WorkItem::start(Zone::new(zone).unwrap()))
            .await
            .unwrap();
    }
    drop(seeds);

    let stats = run.await.unwrap();
    (collect.await.unwrap(), stats)
}

fn names(found: &[Discovery]) -> Vec<&str> {
    found.iter().map(|d| d.name.as_str()).collect()
}

/// Labels found per zone, in discovery order.
fn by_zone(found: &[Discovery]) -> HashMap<&str, Vec<&str>> {
    let mut zones: HashMap<&str, Vec<&str>> = HashMap::new();
    for d in found {
        let label = &d.name[..d.name.len() - d.zone.len() - 1];
        zones.entry(d.zone.as_str()).or_default().push(label);
    }
    zones
}

fn sample() -> Chains {
    Chains::default()
        .zone("example.com", &["alpha", "bravo", "charlie", "delta"])
        .zone("example.net", &["mail", "ns1", "ns2", "www"])
        .zone("example.org", &["0day", "a", "a-b", "zulu"])
}

#[tokio::test]
async fn walks_a_zone_to_its_end() {
    let chains = Chains::default().zone("example.com", &["alpha", "bravo", "charlie", "delta"]);
    let calls = Arc::clone(&chains.calls);

    let (found, stats) = walk(chains, &["example.com"], WalkConfig::default()).await;

    assert_eq!(
        names(&found),
        [
            "alpha.example.com",
            "bravo.example.com",
            "charlie.example.com",
            "delta.example.com"
        ]
    );
    assert_eq!(stats.names, 4);
    assert_eq!(stats.completed, 1);
    // apex plus one query per name
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn repeated_walks_agree() {
    let zones = ["example.com"];
    let (first, _) = walk(sample(), &zones, WalkConfig::default()).await;
    let (second, _) = walk(sample(), &zones, WalkConfig::default()).await;
    assert_eq!(first, second);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrency_does_not_change_results() {
    let zones = ["example.com", "example.net", "example.org"];
    let narrow = WalkConfig {
        concurrency: 1,
        ..WalkConfig::default()
    };
    let wide = WalkConfig {
        concurrency: 50,
        ..WalkConfig::default()
    };

    let (serial, _) = walk(sample(), &zones, narrow).await;
    let (parallel, stats) = walk(sample(), &zones, wide).await;

    let serial_set: HashSet<_> = names(&serial).into_iter().collect();
    let parallel_set: HashSet<_> = names(&parallel).into_iter().collect();
    assert_eq!(serial_set, parallel_set);
    assert_eq!(parallel_set.len(), 12);
    assert_eq!(stats.completed, 3);

    for (zone, labels) in by_zone(&parallel) {
        assert!(
            labels.windows(2).all(|w| w[0] < w[1]),
            "{zone} out of order: {labels:?}"
        );
    }
}

#[tokio::test]
async fn full_queue_keeps_walking_inline() {
    let config = WalkConfig {
        concurrency: 2,
        queue_capacity: 1,
        ..WalkConfig::default()
    };
    let zones = ["example.com", "example.net", "example.org"];
    let (found, stats) = walk(sample(), &zones, config).await;

    assert_eq!(found.len(), 12);
    assert_eq!(stats.completed, 3);
}

#[tokio::test]
async fn unsigned_zone_yields_nothing() {
    let chains = sample().unsigned("example.edu");
    let (found, stats) = walk(chains, &["example.edu", "example.net"], WalkConfig::default()).await;

    assert_eq!(
        names(&found),
        [
            "mail.example.net",
            "ns1.example.net",
            "ns2.example.net",
            "www.example.net"
        ]
    );
    assert_eq!(stats.unwalkable, 1);
}

#[tokio::test(start_paused = true)]
async fn failing_resolver_abandons_the_walk() {
    let chains = sample().broken("example.com");
    let calls = Arc::clone(&chains.calls);

    let (found, stats) = walk(chains, &["example.com"], WalkConfig::default()).await;

    assert!(found.is_empty());
    assert_eq!(stats.abandoned, 1);
    // five steps of the retry policy, three queries each
    assert_eq!(calls.load(Ordering::SeqCst), 15);
}

#[tokio::test]
async fn cancelled_walker_stops() {
    let (sink, mut names) = mpsc::channel(8);
    let (walker, seeds) = Walker::new(sample(), pool(), WalkConfig::default(), sink);
    walker.cancellation_token().cancel();
    let run = tokio::spawn(walker.run());

    // The walker no longer takes work; this send may or may not land.
    let _ = seeds.try_send(WorkItem::start(Zone::new("example.com").unwrap()));

    let stats = run.await.unwrap();
    assert_eq!(stats, WalkStats::default());
    assert!(names.recv().await.is_none());
}

#[tokio::test]
async fn closed_output_stops_the_walk() {
    let labels: Vec<String> = (0..200).map(|i| format!("n{i:03}")).collect();
    let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
    let chains = Chains::default().zone("example.com", &labels);
    let calls = Arc::clone(&chains.calls);

    let (sink, names) = mpsc::channel(8);
    drop(names);
    let (walker, seeds) = Walker::new(chains, pool(), WalkConfig::default(), sink);
    let cancel = walker.cancellation_token();
    seeds
        .send(WorkItem::start(Zone::new("example.com").unwrap()))
        .await
        .unwrap();
    drop(seeds);

    let stats = walker.run().await;
    assert_eq!(stats.names, 0);
    assert_eq!(stats.completed, 0);
    assert!(cancel.is_cancelled());
    // the apex step, then the step whose first name found no reader
    let calls = calls.load(Ordering::SeqCst);
    assert!(calls <= 2, "kept querying after output closed: {calls}");
}
