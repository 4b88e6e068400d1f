//! Outbound exchanges with authoritative servers.
//!
//! UDP first with the EDNS payload we advertise; a truncated reply is
//! retried over TCP with the usual two-byte length framing. Responses must
//! echo our transaction ID and question or they are discarded.

use crate::{ResolveError, Result};
use skein_proto::{Message, EDNS_UDP_SIZE};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::{debug, trace};

/// Sends `query` to `server` and returns a validated response.
pub async fn exchange(server: SocketAddr, query: &Message, hop: Duration) -> Result<Message> {
    let response = match timeout(hop, exchange_udp(server, query)).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => return Err(e),
        Err(_) => return Err(ResolveError::Timeout),
    };

    if response.header.truncated() {
        trace!(server = %server, "response truncated, retrying over TCP");
        return match timeout(hop, exchange_tcp(server, query)).await {
            Ok(result) => result,
            Err(_) => Err(ResolveError::Timeout),
        };
    }
    check_echo(query, &response)?;
    Ok(response)
}

async fn exchange_udp(server: SocketAddr, query: &Message) -> Result<Message> {
    let bind = if server.is_ipv4() {
        SocketAddr::from(([0, 0, 0, 0], 0))
    } else {
        SocketAddr::from((std::net::Ipv6Addr::UNSPECIFIED, 0))
    };
    let socket = UdpSocket::bind(bind).await.map_err(io_failure)?;
    socket.connect(server).await.map_err(io_failure)?;
    socket.send(&query.to_wire()).await.map_err(io_failure)?;

    let mut buf = vec![0u8; EDNS_UDP_SIZE as usize];
    let len = socket.recv(&mut buf).await.map_err(io_failure)?;
    Message::parse(&buf[..len]).map_err(|e| ResolveError::WireMalformed(e.to_string()))
}

async fn exchange_tcp(server: SocketAddr, query: &Message) -> Result<Message> {
    let mut stream = TcpStream::connect(server).await.map_err(io_failure)?;

    let wire = query.to_wire();
    stream
        .write_all(&(wire.len() as u16).to_be_bytes())
        .await
        .map_err(io_failure)?;
    stream.write_all(&wire).await.map_err(io_failure)?;

    let mut len_buf = [0u8; 2];
    stream.read_exact(&mut len_buf).await.map_err(io_failure)?;
    let len = u16::from_be_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await.map_err(io_failure)?;

    let response =
        Message::parse(&buf).map_err(|e| ResolveError::WireMalformed(e.to_string()))?;
    check_echo(query, &response)?;
    Ok(response)
}

/// A response that does not echo our ID and question is treated like a
/// transport failure: the caller moves on to the next authority.
fn check_echo(query: &Message, response: &Message) -> Result<()> {
    if response.id() != query.id() || !response.header.is_response() {
        debug!("response ID/QR mismatch, discarding");
        return Err(ResolveError::ServFail);
    }
    match (query.question(), response.question()) {
        (Some(asked), Some(echoed)) if asked.matches(echoed) => Ok(()),
        _ => {
            debug!("response question mismatch, discarding");
            Err(ResolveError::ServFail)
        }
    }
}

fn io_failure(e: std::io::Error) -> ResolveError {
    debug!(error = %e, "exchange I/O failure");
    ResolveError::ServFail
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_proto::{Name, Question, Record, RecordType};
    use std::net::Ipv4Addr;
    use std::str::FromStr;

    /// One-shot mock authority on loopback UDP.
    async fn spawn_authority<F>(respond: F) -> SocketAddr
    where
        F: FnOnce(Message) -> Message + Send + 'static,
    {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            let (len, peer) = socket.recv_from(&mut buf).await.unwrap();
            let query = Message::parse(&buf[..len]).unwrap();
            let response = respond(query);
            socket.send_to(&response.to_wire(), peer).await.unwrap();
        });
        addr
    }

    fn a_query(name: &str) -> Message {
        Message::query(Question::new(Name::from_str(name).unwrap(), RecordType::A))
    }

    #[tokio::test]
    async fn udp_exchange_round_trip() {
        let addr = spawn_authority(|query| {
            let mut response = Message::reply_to(&query);
            response.push_answer(Record::a(
                Name::from_str("example.com").unwrap(),
                300,
                Ipv4Addr::new(192, 0, 2, 1),
            ));
            response
        })
        .await;

        let query = a_query("example.com");
        let response = exchange(addr, &query, Duration::from_secs(1)).await.unwrap();
        assert_eq!(response.id(), query.id());
        assert_eq!(response.answers.len(), 1);
    }

    #[tokio::test]
    async fn mismatched_id_discarded() {
        let addr = spawn_authority(|query| {
            let mut response = Message::reply_to(&query);
            response.header.id = query.id().wrapping_add(1);
            response
        })
        .await;

        let err = exchange(addr, &a_query("example.com"), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err, ResolveError::ServFail);
    }

    #[tokio::test]
    async fn mismatched_question_discarded() {
        let addr = spawn_authority(|query| {
            let mut response = Message::reply_to(&query);
            response.questions = vec![Question::new(
                Name::from_str("other.example").unwrap(),
                RecordType::A,
            )];
            response
        })
        .await;

        let err = exchange(addr, &a_query("example.com"), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err, ResolveError::ServFail);
    }

    #[tokio::test]
    async fn black_hole_times_out() {
        // bound but never answered
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let err = exchange(addr, &a_query("example.com"), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(err, ResolveError::Timeout);
        drop(socket);
    }
}
