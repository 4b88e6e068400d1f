//! # skein-server
//!
//! The transport surface: UDP and TCP on the DNS port, DNS-over-TLS and
//! DNS-over-QUIC in front of the same resolver core. Listeners own the
//! framing and the request/response contract; resolution itself lives
//! behind the [`handler::QueryHandler`] trait.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dot;
pub mod doq;
pub mod handler;
pub mod tcp;
pub mod tls;
pub mod udp;

pub use dot::DotListener;
pub use doq::DoqListener;
pub use handler::{QueryContext, QueryHandler, ResolverHandler};
pub use tcp::TcpListener;
pub use udp::UdpListener;

use skein_proto::{Flags, Header, Message, Rcode};
use thiserror::Error;

/// Result alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Listener-side failures.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Socket-level failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS material or handshake failure.
    #[error("tls error: {0}")]
    Tls(String),

    /// Protocol violation on a connection or stream.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Transport a query arrived over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    /// Plain UDP.
    Udp,
    /// Plain TCP.
    Tcp,
    /// DNS over TLS.
    Dot,
    /// DNS over QUIC.
    Doq,
}

impl Transport {
    /// Short name for logs.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Udp => "udp",
            Self::Tcp => "tcp",
            Self::Dot => "dot",
            Self::Doq => "doq",
        }
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Builds a FORMERR reply for bytes that failed to parse as a message, if
/// at least the header survived; otherwise there is nothing to answer.
pub fn formerr_for(raw: &[u8]) -> Option<Message> {
    let header = Header::parse(raw).ok()?;
    if header.is_response() {
        return None;
    }
    let mut reply = Header::reply_to(&header);
    reply.qdcount = 0;
    reply.rcode = Rcode::FormErr;
    reply.set(Flags::RA, true);
    Some(Message {
        header: reply,
        questions: Vec::new(),
        answers: Vec::new(),
        authority: Vec::new(),
        additional: Vec::new(),
        edns: None,
    })
}
