//! Plain UDP listener.

use crate::handler::{QueryContext, QueryHandler};
use crate::{formerr_for, Result, Transport};
use skein_proto::{Message, MAX_PLAIN_UDP};
use socket2::{Domain, Socket, Type};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, error, info, trace};

/// UDP DNS listener.
pub struct UdpListener {
    socket: Arc<UdpSocket>,
    handler: Arc<dyn QueryHandler>,
    local_addr: SocketAddr,
}

impl UdpListener {
    /// Binds to `addr`.
    pub async fn bind(addr: SocketAddr, handler: Arc<dyn QueryHandler>) -> Result<Self> {
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };
        let socket = Socket::new(domain, Type::DGRAM, None)?;
        socket.set_reuse_address(true)?;
        #[cfg(unix)]
        socket.set_reuse_port(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;

        let socket = UdpSocket::from_std(socket.into())?;
        let local_addr = socket.local_addr()?;
        info!(addr = %local_addr, "udp listener up");

        Ok(Self {
            socket: Arc::new(socket),
            handler,
            local_addr,
        })
    }

    /// The bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves datagrams until the task is cancelled.
    pub async fn run(&self) -> Result<()> {
        let mut buf = vec![0u8; 65535];
        loop {
            match self.socket.recv_from(&mut buf).await {
                Ok((len, peer)) => {
                    let data = buf[..len].to_vec();
                    let socket = self.socket.clone();
                    let handler = self.handler.clone();
                    tokio::spawn(async move {
                        serve_one(socket, handler, data, peer).await;
                    });
                }
                Err(e) => error!(error = %e, "udp receive failed"),
            }
        }
    }
}

async fn serve_one(
    socket: Arc<UdpSocket>,
    handler: Arc<dyn QueryHandler>,
    data: Vec<u8>,
    peer: SocketAddr,
) {
    let query = match Message::parse(&data) {
        Ok(query) => query,
        Err(e) => {
            trace!(client = %peer, error = %e, "unparsable datagram");
            if let Some(reply) = formerr_for(&data) {
                let _ = socket.send_to(&reply.to_wire(), peer).await;
            }
            return;
        }
    };

    // payload ceiling: EDNS-advertised, else the classic 512
    let max_size = query
        .edns
        .as_ref()
        .map(|e| usize::from(e.udp_size.max(MAX_PLAIN_UDP as u16)))
        .unwrap_or(MAX_PLAIN_UDP);

    let ctx = QueryContext::new(peer, Transport::Udp);
    let mut response = handler.handle(query, ctx).await;

    response.truncate_to(max_size);
    if let Err(e) = socket.send_to(&response.to_wire(), peer).await {
        debug!(client = %peer, error = %e, "udp send failed");
    }
}
