//! Plain TCP listener with two-byte length framing.

use crate::handler::{QueryContext, QueryHandler};
use crate::{formerr_for, Result, Transport};
use skein_proto::Message;
use socket2::{Domain, Socket, Type};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, error, info, trace};

/// Seconds a quiet connection is kept open.
const IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// TCP DNS listener.
pub struct TcpListener {
    listener: tokio::net::TcpListener,
    handler: Arc<dyn QueryHandler>,
    local_addr: SocketAddr,
}

impl TcpListener {
    /// Binds to `addr`.
    pub async fn bind(addr: SocketAddr, handler: Arc<dyn QueryHandler>) -> Result<Self> {
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };
        let socket = Socket::new(domain, Type::STREAM, None)?;
        socket.set_reuse_address(true)?;
        #[cfg(unix)]
        socket.set_reuse_port(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(1024)?;

        let listener = tokio::net::TcpListener::from_std(socket.into())?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "tcp listener up");

        Ok(Self {
            listener,
            handler,
            local_addr,
        })
    }

    /// The bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections until the task is cancelled.
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let handler = self.handler.clone();
                    tokio::spawn(async move {
                        if let Err(e) =
                            serve_connection_as(stream, peer, handler, Transport::Tcp).await
                        {
                            debug!(client = %peer, error = %e, "tcp connection ended");
                        }
                    });
                }
                Err(e) => error!(error = %e, "tcp accept failed"),
            }
        }
    }
}

/// Serves pipelined queries on one length-framed stream. Shared with the
/// DoT listener, which runs the same contract inside TLS.
pub(crate) async fn serve_connection_as<S>(
    mut stream: S,
    peer: SocketAddr,
    handler: Arc<dyn QueryHandler>,
    transport: Transport,
) -> std::io::Result<()>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    loop {
        let frame = match timeout(IDLE_TIMEOUT, read_frame(&mut stream)).await {
            Ok(Ok(frame)) => frame,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                trace!(client = %peer, "connection closed");
                return Ok(());
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                trace!(client = %peer, "idle timeout");
                return Ok(());
            }
        };

        let response = match Message::parse(&frame) {
            Ok(query) => {
                let ctx = QueryContext::new(peer, transport);
                handler.handle(query, ctx).await
            }
            Err(e) => {
                trace!(client = %peer, error = %e, "unparsable tcp frame");
                match formerr_for(&frame) {
                    Some(reply) => reply,
                    None => return Ok(()),
                }
            }
        };
        write_frame(&mut stream, &response.to_wire()).await?;
    }
}

async fn read_frame<S: tokio::io::AsyncRead + Unpin>(stream: &mut S) -> std::io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 2];
    stream.read_exact(&mut len_buf).await?;
    let len = u16::from_be_bytes(len_buf) as usize;
    if len == 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "zero-length frame",
        ));
    }
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;
    Ok(buf)
}

async fn write_frame<S: tokio::io::AsyncWrite + Unpin>(
    stream: &mut S,
    data: &[u8],
) -> std::io::Result<()> {
    stream.write_all(&(data.len() as u16).to_be_bytes()).await?;
    stream.write_all(data).await?;
    stream.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::testing::StaticResolver;
    use crate::handler::ResolverHandler;
    use skein_proto::{Name, Question, Rcode, RecordType};
    use std::str::FromStr;
    use tokio::net::TcpStream;

    async fn start() -> SocketAddr {
        let name = Name::from_str("example.com").unwrap();
        let handler = Arc::new(ResolverHandler::new(Arc::new(StaticResolver::answering(
            &name,
        ))));
        let listener = TcpListener::bind("127.0.0.1:0".parse().unwrap(), handler)
            .await
            .unwrap();
        let addr = listener.local_addr();
        tokio::spawn(async move { listener.run().await });
        addr
    }

    #[tokio::test]
    async fn pipelined_queries_on_one_connection() {
        let server = start().await;
        let mut stream = TcpStream::connect(server).await.unwrap();

        for _ in 0..3 {
            let query = Message::query(Question::new(
                Name::from_str("example.com").unwrap(),
                RecordType::A,
            ));
            write_frame(&mut stream, &query.to_wire()).await.unwrap();
            let raw = read_frame(&mut stream).await.unwrap();
            let response = Message::parse(&raw).unwrap();
            assert_eq!(response.id(), query.id());
            assert_eq!(response.rcode(), Rcode::NoError);
            assert_eq!(response.answers.len(), 1);
        }
    }

    #[tokio::test]
    async fn garbage_frame_answered_with_formerr() {
        let server = start().await;
        let mut stream = TcpStream::connect(server).await.unwrap();

        let mut raw = vec![0u8; 12];
        raw[1] = 0x42;
        raw[5] = 1; // qdcount without a question
        write_frame(&mut stream, &raw).await.unwrap();
        let reply = Message::parse(&read_frame(&mut stream).await.unwrap()).unwrap();
        assert_eq!(reply.rcode(), Rcode::FormErr);
        assert_eq!(reply.id(), 0x42);
    }
}
