//! DNS over TLS (RFC 7858).
//!
//! TLS 1.2 or newer on top of TCP; inside the stream the framing is the
//! same two-byte length prefix as plain TCP, and connections may pipeline
//! queries.

use crate::handler::QueryHandler;
use crate::{tcp, tls, Result, ServerError, Transport};
use rustls::ServerConfig;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info};

/// DoT listener.
pub struct DotListener {
    listener: TcpListener,
    acceptor: TlsAcceptor,
    handler: Arc<dyn QueryHandler>,
    local_addr: SocketAddr,
}

impl DotListener {
    /// Builds the TLS server configuration from PEM files. The default
    /// provider covers TLS 1.2 and 1.3.
    pub fn tls_config(cert_path: &Path, key_path: &Path) -> Result<Arc<ServerConfig>> {
        let certs = tls::load_certs(cert_path)?;
        let key = tls::load_key(key_path)?;
        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| ServerError::Tls(format!("cannot build TLS config: {e}")))?;
        Ok(Arc::new(config))
    }

    /// Binds to `addr` with the given TLS configuration.
    pub async fn bind(
        addr: SocketAddr,
        config: Arc<ServerConfig>,
        handler: Arc<dyn QueryHandler>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "dot listener up");
        Ok(Self {
            listener,
            acceptor: TlsAcceptor::from(config),
            handler,
            local_addr,
        })
    }

    /// The bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts TLS connections until the task is cancelled.
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let acceptor = self.acceptor.clone();
                    let handler = self.handler.clone();
                    tokio::spawn(async move {
                        let tls_stream = match acceptor.accept(stream).await {
                            Ok(s) => s,
                            Err(e) => {
                                debug!(client = %peer, error = %e, "tls handshake failed");
                                return;
                            }
                        };
                        if let Err(e) = serve_tls(tls_stream, peer, handler).await {
                            debug!(client = %peer, error = %e, "dot connection ended");
                        }
                    });
                }
                Err(e) => error!(error = %e, "dot accept failed"),
            }
        }
    }
}

async fn serve_tls<S>(stream: S, peer: SocketAddr, handler: Arc<dyn QueryHandler>) -> std::io::Result<()>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    // identical contract to plain TCP, tagged with the DoT transport
    tcp::serve_connection_as(stream, peer, handler, Transport::Dot).await
}
