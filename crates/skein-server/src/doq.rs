//! DNS over QUIC.
//!
//! One query per bidirectional stream; the stream FIN delimits both the
//! query and the response, so no length prefix is used. A query must carry
//! at least a DNS header and at most [`MAX_DOQ_MESSAGE`] bytes. The
//! resolver call itself runs under its own two-second deadline, separate
//! from any transport timing.
//!
//! TLS: 1.3 only, ALPN `doq`, AES-GCM suites, session tickets disabled.

use crate::handler::{QueryContext, QueryHandler};
use crate::{tls, Result, ServerError, Transport};
use quinn::crypto::rustls::QuicServerConfig;
use quinn::{Connection, Endpoint, RecvStream, SendStream, ServerConfig as QuinnServerConfig};
use rustls::CipherSuite;
use skein_proto::Message;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, trace};

/// ALPN identifier, per RFC 9250.
const ALPN_DOQ: &[u8] = b"doq";

/// Cap on a single DoQ message.
pub const MAX_DOQ_MESSAGE: usize = 4096;

/// Deadline for the resolver call behind one stream.
const RESOLVE_DEADLINE: Duration = Duration::from_secs(2);

/// DoQ listener.
pub struct DoqListener {
    endpoint: Endpoint,
    handler: Arc<dyn QueryHandler>,
    local_addr: SocketAddr,
}

impl DoqListener {
    /// Builds the QUIC server configuration: TLS 1.3, ALPN `doq`, AES-GCM
    /// suites only, no session tickets.
    pub fn quic_config(cert_path: &Path, key_path: &Path) -> Result<QuinnServerConfig> {
        let certs = tls::load_certs(cert_path)?;
        let key = tls::load_key(key_path)?;

        let mut provider = rustls::crypto::ring::default_provider();
        provider.cipher_suites.retain(|s| {
            matches!(
                s.suite(),
                CipherSuite::TLS13_AES_128_GCM_SHA256 | CipherSuite::TLS13_AES_256_GCM_SHA384
            )
        });

        let mut crypto = rustls::ServerConfig::builder_with_provider(Arc::new(provider))
            .with_protocol_versions(&[&rustls::version::TLS13])
            .map_err(|e| ServerError::Tls(format!("cannot select TLS 1.3: {e}")))?
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| ServerError::Tls(format!("cannot build TLS config: {e}")))?;
        crypto.alpn_protocols = vec![ALPN_DOQ.to_vec()];
        crypto.send_tls13_tickets = 0;
        crypto.max_early_data_size = 0;

        let quic_crypto = QuicServerConfig::try_from(crypto)
            .map_err(|e| ServerError::Tls(format!("cannot build QUIC crypto: {e}")))?;
        Ok(QuinnServerConfig::with_crypto(Arc::new(quic_crypto)))
    }

    /// Binds a QUIC endpoint on `addr`.
    pub fn bind(
        addr: SocketAddr,
        config: QuinnServerConfig,
        handler: Arc<dyn QueryHandler>,
    ) -> Result<Self> {
        let endpoint = Endpoint::server(config, addr)
            .map_err(|e| ServerError::Io(std::io::Error::other(e)))?;
        let local_addr = endpoint.local_addr()?;
        info!(addr = %local_addr, "doq listener up");
        Ok(Self {
            endpoint,
            handler,
            local_addr,
        })
    }

    /// The bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections until the endpoint closes.
    pub async fn run(&self) -> Result<()> {
        while let Some(incoming) = self.endpoint.accept().await {
            let handler = self.handler.clone();
            tokio::spawn(async move {
                match incoming.await {
                    Ok(connection) => serve_connection(connection, handler).await,
                    Err(e) => debug!(error = %e, "quic handshake failed"),
                }
            });
        }
        Ok(())
    }
}

async fn serve_connection(connection: Connection, handler: Arc<dyn QueryHandler>) {
    let peer = connection.remote_address();
    trace!(client = %peer, "doq connection accepted");
    loop {
        match connection.accept_bi().await {
            Ok((send, recv)) => {
                let handler = handler.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve_stream(send, recv, peer, handler).await {
                        debug!(client = %peer, error = %e, "doq stream ended");
                    }
                });
            }
            Err(e) => {
                trace!(client = %peer, error = %e, "doq connection closed");
                return;
            }
        }
    }
}

async fn serve_stream(
    mut send: SendStream,
    mut recv: RecvStream,
    peer: SocketAddr,
    handler: Arc<dyn QueryHandler>,
) -> Result<()> {
    // the client's FIN ends the query; the size limit is enforced by the read
    let raw = recv
        .read_to_end(MAX_DOQ_MESSAGE)
        .await
        .map_err(|e| ServerError::Protocol(format!("stream read: {e}")))?;
    if raw.len() < skein_proto::header::HEADER_LEN {
        return Err(ServerError::Protocol(format!(
            "query of {} bytes is shorter than a DNS header",
            raw.len()
        )));
    }

    let query = match Message::parse(&raw) {
        Ok(query) => query,
        Err(e) => {
            trace!(client = %peer, error = %e, "unparsable doq query");
            if let Some(reply) = crate::formerr_for(&raw) {
                send.write_all(&reply.to_wire())
                    .await
                    .map_err(|e| ServerError::Protocol(format!("stream write: {e}")))?;
            }
            let _ = send.finish();
            return Ok(());
        }
    };

    // the resolver gets its own deadline, independent of stream timing
    let ctx = QueryContext::new(peer, Transport::Doq);
    let response = match timeout(RESOLVE_DEADLINE, handler.handle(query.clone(), ctx)).await {
        Ok(response) => response,
        Err(_) => {
            debug!(client = %peer, "resolver deadline exceeded on doq stream");
            let mut reply = Message::reply_to(&query);
            reply.set_rcode(skein_proto::Rcode::ServFail);
            reply
        }
    };

    send.write_all(&response.to_wire())
        .await
        .map_err(|e| ServerError::Protocol(format!("stream write: {e}")))?;
    send.finish()
        .map_err(|e| ServerError::Protocol(format!("stream finish: {e}")))?;
    Ok(())
}
