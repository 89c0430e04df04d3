//! One-shot DNSSEC queries over UDP, falling back to TCP on truncation.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::trace;
use trust_dns_proto::op::{Edns, Message, MessageType, OpCode, Query};
use trust_dns_proto::rr::{Name, RecordType};

use crate::config::WalkConfig;
use crate::error::TransportError;

/// Something that can answer a DNS question. Exists so the walker can be
/// driven by canned responses in tests.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Sends an `A` query for `qname` to `resolver` and returns the reply.
    /// Never retries.
    async fn exchange(&self, resolver: SocketAddr, qname: &str) -> Result<Message, TransportError>;
}

/// Talks to real resolvers.
#[derive(Debug, Clone)]
pub struct DnsClient {
    timeout: Duration,
    udp_payload: u16,
}

impl DnsClient {
    pub fn new(config: &WalkConfig) -> Self {
        Self {
            timeout: config.timeout,
            udp_payload: config.udp_payload,
        }
    }

    /// Reads datagrams until one answers query `id`. Stray or late replies
    /// are skipped; the timeout covers the whole wait.
    async fn udp(&self, resolver: SocketAddr, id: u16, wire: &[u8]) -> Result<Message, TransportError> {
        let local: SocketAddr = if resolver.is_ipv4() {
            ([0u8; 4], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(resolver).await?;
        socket.send(wire).await?;

        let mut buf = vec![0u8; usize::from(self.udp_payload).max(512)];
        let read = async {
            loop {
                let len = socket.recv(&mut buf).await?;
                match Message::from_vec(&buf[..len]) {
                    Ok(msg) if msg.id() == id => return Ok::<_, TransportError>(msg),
                    Ok(msg) => trace!(%resolver, expected = id, got = msg.id(), "ignoring stray response"),
                    Err(e) => trace!(%resolver, "ignoring malformed response: {e}"),
                }
            }
        };
        timeout(self.timeout, read)
            .await
            .map_err(|_| TransportError::Timeout)?
    }

    async fn tcp(&self, resolver: SocketAddr, wire: &[u8]) -> Result<Message, TransportError> {
        let len = u16::try_from(wire.len()).map_err(|_| TransportError::Oversized(wire.len()))?;
        let mut stream = timeout(self.timeout, TcpStream::connect(resolver))
            .await
            .map_err(|_| TransportError::Timeout)??;

        let mut frame = Vec::with_capacity(wire.len() + 2);
        frame.extend_from_slice(&len.to_be_bytes());
        frame.extend_from_slice(wire);
        stream.write_all(&frame).await?;

        let read = async {
            let mut len_buf = [0u8; 2];
            stream.read_exact(&mut len_buf).await?;
            let mut buf = vec![0u8; usize::from(u16::from_be_bytes(len_buf))];
            stream.read_exact(&mut buf).await?;
            Ok::<_, std::io::Error>(buf)
        };
        let buf = timeout(self.timeout, read)
            .await
            .map_err(|_| TransportError::Timeout)??;
        Ok(Message::from_vec(&buf)?)
    }
}

#[async_trait]
impl Exchange for DnsClient {
    async fn exchange(&self, resolver: SocketAddr, qname: &str) -> Result<Message, TransportError> {
        let query = build_query(qname, self.udp_payload)?;
        let wire = query.to_vec()?;

        let mut response = self.udp(resolver, query.id(), &wire).await?;
        if response.truncated() {
            trace!(%resolver, qname, "truncated response, retrying over TCP");
            response = self.tcp(resolver, &wire).await?;
        }

        if response.id() != query.id() {
            return Err(TransportError::IdMismatch {
                expected: query.id(),
                got: response.id(),
            });
        }
        Ok(response)
    }
}

/// Recursive `A` query with the DO bit set, so that negative answers carry
/// their NSEC proofs in the authority section.
pub fn build_query(qname: &str, udp_payload: u16) -> Result<Message, TransportError> {
    let mut name = Name::from_ascii(qname)?;
    name.set_fqdn(true);

    let mut edns = Edns::new();
    edns.set_dnssec_ok(true);
    edns.set_max_payload(udp_payload);

    let mut msg = Message::new();
    msg.set_id(rand::random())
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true)
        .set_authentic_data(false)
        .set_checking_disabled(false)
        .add_query(Query::query(name, RecordType::A))
        .set_edns(edns);
    Ok(msg)
}
