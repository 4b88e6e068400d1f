//! skein: a recursive, caching, DNSSEC-validating DNS resolver.
//!
//! The binary owns process concerns only: CLI, logging, loading the three
//! config inputs, assembling the resolver stack, and running the
//! configured listeners until shutdown. Every component is built through
//! plain constructors; a config failure is reported here and turns into a
//! non-zero exit, nothing deeper in the stack ever exits the process.

use anyhow::{bail, Context, Result};
use clap::Parser;
use skein_cache::{AnswerCache, KeyCache};
use skein_config::{load_root_servers, load_trust_anchor, Settings};
use skein_dnssec::Validator;
use skein_resolver::{Bounds, Engine, EngineConfig, Timeouts};
use skein_server::{DoqListener, DotListener, ResolverHandler, TcpListener, UdpListener};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "skein", version, about = "Recursive DNSSEC-validating DNS resolver")]
struct Cli {
    /// Runtime settings file (key = value).
    #[arg(long, default_value = "skein.conf")]
    settings: PathBuf,

    /// Root server hints file.
    #[arg(long, default_value = "root.conf")]
    roots: PathBuf,

    /// Root trust anchor file (DNSKEY presentation format).
    #[arg(long, default_value = "root.key")]
    anchor: PathBuf,

    /// Log filter, e.g. `info` or `skein_resolver=debug`.
    #[arg(long, default_value = "info")]
    log: String,
}

fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log);

    if let Err(e) = run(cli).await {
        error!(error = %format!("{e:#}"), "startup failed");
        eprintln!("skein: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        // another component installed a provider first; that is fine
    }

    let settings = Settings::load(&cli.settings).context("loading settings")?;
    let roots = load_root_servers(&cli.roots).context("loading root servers")?;
    let anchor = load_trust_anchor(&cli.anchor).context("loading trust anchor")?;
    info!(
        roots = roots.len(),
        anchor_tag = anchor.key_tag(),
        enforce = settings.dnssec_enforce,
        "configuration loaded"
    );

    // the resolver stack, wired explicitly from the outside in
    let answers = Arc::new(AnswerCache::new(settings.cache_max_entries));
    let keys = Arc::new(KeyCache::new());
    let validator = Arc::new(Validator::new(
        Some(anchor.key.clone()),
        keys.clone(),
        settings.dnssec_enforce,
    ));
    let engine = Arc::new(Engine::new(
        &roots,
        answers,
        validator,
        EngineConfig {
            bounds: Bounds::default(),
            timeouts: Timeouts {
                deadline: settings.resolver_deadline,
                hop: settings.hop_timeout,
            },
            ns_port: 53,
        },
    ));
    let handler = Arc::new(ResolverHandler::new(engine));

    let mut listeners = JoinSet::new();

    if let Some(addr) = settings.listen_udp {
        let listener = UdpListener::bind(addr, handler.clone())
            .await
            .context("binding udp listener")?;
        listeners.spawn(async move { listener.run().await.map_err(anyhow::Error::from) });
    }
    if let Some(addr) = settings.listen_tcp {
        let listener = TcpListener::bind(addr, handler.clone())
            .await
            .context("binding tcp listener")?;
        listeners.spawn(async move { listener.run().await.map_err(anyhow::Error::from) });
    }
    if let Some(addr) = settings.listen_tls {
        let (cert, key) = tls_paths(&settings)?;
        let config = DotListener::tls_config(&cert, &key).context("building DoT TLS config")?;
        let listener = DotListener::bind(addr, config, handler.clone())
            .await
            .context("binding dot listener")?;
        listeners.spawn(async move { listener.run().await.map_err(anyhow::Error::from) });
    }
    if let Some(addr) = settings.listen_quic {
        let (cert, key) = tls_paths(&settings)?;
        let config = DoqListener::quic_config(&cert, &key).context("building DoQ config")?;
        let listener =
            DoqListener::bind(addr, config, handler.clone()).context("binding doq listener")?;
        listeners.spawn(async move { listener.run().await.map_err(anyhow::Error::from) });
    }

    if listeners.is_empty() {
        bail!("no listeners configured");
    }
    info!("resolver running");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
        Some(finished) = listeners.join_next() => {
            match finished {
                Ok(Ok(())) => bail!("listener exited unexpectedly"),
                Ok(Err(e)) => return Err(e).context("listener failed"),
                Err(e) => return Err(e).context("listener task panicked"),
            }
        }
    }

    listeners.shutdown().await;
    Ok(())
}

fn tls_paths(settings: &Settings) -> Result<(PathBuf, PathBuf)> {
    match (&settings.tls_cert, &settings.tls_key) {
        (Some(cert), Some(key)) => Ok((cert.clone(), key.clone())),
        _ => bail!("tls.cert and tls.key are required for TLS/QUIC listeners"),
    }
}
