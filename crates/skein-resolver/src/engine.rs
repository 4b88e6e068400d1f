//! The iterative resolution engine.
//!
//! One [`Engine`] is shared by every listener. A resolution is an explicit
//! loop over delegation steps — no self-recursion for CNAMEs — carrying
//! the depth, CNAME and fanout budgets plus the query deadline. Identical
//! concurrent queries coalesce on an in-flight table so a cold cache costs
//! one upstream walk, not one per client.
//!
//! Nested lookups (glue that arrived without addresses) re-enter the
//! engine through a boxed future with the parent's deadline and a small
//! fresh depth budget.

use crate::net;
use crate::{Bounds, Lookup, Resolve, ResolveError, Result, Timeouts};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt};
use skein_cache::{AnswerCache, CacheKey};
use skein_config::RootServer;
use skein_dnssec::Validator;
use skein_proto::{Edns, Message, Name, Question, RType, Record, RecordType, EDNS_UDP_SIZE};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, instrument, trace, warn};

/// Engine construction parameters.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Resolution bounds.
    pub bounds: Bounds,
    /// Timing knobs.
    pub timeouts: Timeouts,
    /// Port queried on authorities learned from referrals. The DNS port in
    /// production; tests point it at mock authorities on high ports.
    pub ns_port: u16,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bounds: Bounds::default(),
            timeouts: Timeouts::default(),
            ns_port: 53,
        }
    }
}

type Outcome = Result<Lookup>;
type Slot = watch::Receiver<Option<Outcome>>;

/// The resolver core shared across transports.
pub struct Engine {
    roots: Vec<SocketAddr>,
    cache: Arc<AnswerCache>,
    validator: Arc<Validator>,
    inflight: DashMap<CacheKey, Slot>,
    config: EngineConfig,
}

impl Engine {
    /// Builds an engine over the configured root set.
    ///
    /// Root order is preserved from configuration, IPv4 entries ahead of
    /// IPv6 ones.
    pub fn new(
        roots: &[RootServer],
        cache: Arc<AnswerCache>,
        validator: Arc<Validator>,
        config: EngineConfig,
    ) -> Self {
        let mut ordered: Vec<SocketAddr> = roots
            .iter()
            .filter(|r| r.address.is_ipv4())
            .map(RootServer::socket_addr)
            .collect();
        ordered.extend(
            roots
                .iter()
                .filter(|r| !r.address.is_ipv4())
                .map(RootServer::socket_addr),
        );
        Self {
            roots: ordered,
            cache,
            validator,
            inflight: DashMap::new(),
            config,
        }
    }

    /// The shared answer cache.
    pub fn cache(&self) -> &Arc<AnswerCache> {
        &self.cache
    }

    /// The validator (for enforcement state).
    pub fn validator(&self) -> &Arc<Validator> {
        &self.validator
    }

    /// Resolves with an explicit deadline and delegation budget; the glue
    /// path re-enters here with the parent deadline and a fresh small
    /// budget.
    #[instrument(skip(self), fields(name = %name, qtype = %qtype))]
    pub async fn resolve_with(
        &self,
        name: &Name,
        qtype: RecordType,
        deadline: Instant,
        depth_budget: usize,
    ) -> Outcome {
        let key = CacheKey::new(name, RType::Known(qtype));

        loop {
            if let Some(records) = self.cache.get_or_mirror(&key).await {
                trace!("answer cache hit");
                return Ok(Lookup {
                    records,
                    authenticated: false,
                });
            }

            enum Role {
                Leader(watch::Sender<Option<Outcome>>),
                Follower(Slot),
            }

            let role = match self.inflight.entry(key.clone()) {
                Entry::Occupied(slot) => Role::Follower(slot.get().clone()),
                Entry::Vacant(slot) => {
                    let (tx, rx) = watch::channel(None);
                    slot.insert(rx);
                    Role::Leader(tx)
                }
            };

            match role {
                Role::Leader(tx) => {
                    // removes the in-flight entry before `tx` drops, so
                    // followers woken by a cancelled leader re-claim a
                    // vacant slot
                    let _slot = InflightGuard { engine: self, key: &key };

                    let outcome =
                        match timeout_at(deadline, self.iterate(name, qtype, depth_budget, deadline))
                            .await
                        {
                            Ok(outcome) => outcome,
                            Err(_) => Err(ResolveError::Timeout),
                        };

                    if let Ok(lookup) = &outcome {
                        self.store(&key, &lookup.records).await;
                    }
                    let _ = tx.send(Some(outcome.clone()));
                    return outcome;
                }
                Role::Follower(mut rx) => {
                    trace!("coalescing onto in-flight resolution");
                    let joined = timeout_at(deadline, async {
                        loop {
                            let settled = rx.borrow().clone();
                            if let Some(outcome) = settled {
                                return Some(outcome);
                            }
                            if rx.changed().await.is_err() {
                                return None;
                            }
                        }
                    })
                    .await;
                    match joined {
                        Ok(Some(outcome)) => return outcome,
                        Ok(None) => continue, // leader cancelled; try again
                        Err(_) => return Err(ResolveError::Timeout),
                    }
                }
            }
        }
    }

    /// Caches a completed answer under the original question. A set with
    /// any zero TTL is not cached.
    async fn store(&self, key: &CacheKey, records: &[Record]) {
        let Some(min_ttl) = records.iter().map(|r| r.ttl).min() else {
            return;
        };
        if min_ttl == 0 {
            debug!(key = %key.name(), "zero TTL in set, not caching");
            return;
        }
        self.cache
            .put(key.clone(), records, Duration::from_secs(u64::from(min_ttl)))
            .await;
    }

    /// The delegation walk itself.
    async fn iterate(
        &self,
        qname: &Name,
        qtype: RecordType,
        depth_budget: usize,
        deadline: Instant,
    ) -> Outcome {
        let mut current = qname.clone();
        let mut servers = self.roots.clone();
        let mut depth = 0usize;
        let mut cnames = 0usize;
        let mut contacted = 0usize;
        let mut chain: Vec<Record> = Vec::new();

        loop {
            if depth > depth_budget {
                warn!(name = %current, "delegation depth exhausted");
                return Err(ResolveError::LoopOrBound("delegation depth"));
            }

            let question = Question::new(current.clone(), qtype);
            let response = self
                .query_step(&question, &servers, &mut contacted, deadline)
                .await?;

            if response.rcode().is_nxdomain() {
                return Err(ResolveError::Nxdomain);
            }

            if !response.answers.is_empty() {
                let authenticated = if self.validator.enforcing() {
                    let verdict = self.validator.validate_keyset(&response, &question.qname).await;
                    if !verdict.is_verified() {
                        warn!(name = %question.qname, ?verdict, "rejecting unverified answer");
                        return Err(ResolveError::ValidationFailed);
                    }
                    true
                } else {
                    false
                };

                let answers_final = qtype == RecordType::ANY
                    || response
                        .answers
                        .iter()
                        .any(|r| r.rtype == RType::Known(qtype));
                if answers_final {
                    chain.extend(response.answers);
                    return Ok(Lookup {
                        records: chain,
                        authenticated,
                    });
                }

                let alias = response
                    .answers
                    .iter()
                    .find(|r| r.name == current)
                    .and_then(|r| r.rdata.as_cname().cloned());
                if let Some(target) = alias {
                    if cnames >= self.config.bounds.max_cnames {
                        return Err(ResolveError::LoopOrBound("cname chain"));
                    }
                    trace!(from = %current, to = %target, "following alias");
                    chain.extend(response.answers);
                    cnames += 1;
                    current = target;
                    servers = self.roots.clone();
                    depth = 0;
                    continue;
                }

                // answers for neither the question type nor an alias;
                // hand back what the authority gave us
                chain.extend(response.answers);
                return Ok(Lookup {
                    records: chain,
                    authenticated,
                });
            }

            if response.is_referral() {
                if self.validator.enforcing() {
                    let verdict = self.validator.validate_keyset(&response, &question.qname).await;
                    if !verdict.is_verified() {
                        warn!(name = %question.qname, ?verdict, "rejecting unverified delegation");
                        return Err(ResolveError::ValidationFailed);
                    }
                }
                servers = self.referral_servers(&response, deadline).await;
                if servers.is_empty() {
                    debug!(name = %current, "referral without usable nameservers");
                    return Err(ResolveError::ServFail);
                }
                depth += 1;
                continue;
            }

            // NODATA or an otherwise unusable authority response
            debug!(name = %current, "cannot make progress from response");
            return Err(ResolveError::ServFail);
        }
    }

    /// Queries the authorities for one delegation step. Order is respected,
    /// each authority is retried at most once, and the per-query fanout
    /// budget is charged per attempt.
    async fn query_step(
        &self,
        question: &Question,
        servers: &[SocketAddr],
        contacted: &mut usize,
        deadline: Instant,
    ) -> Result<Message> {
        let mut query = Message::query(question.clone());
        query.edns = Some(if self.validator.enforcing() {
            Edns::with_dnssec_ok(EDNS_UDP_SIZE)
        } else {
            Edns::new(EDNS_UDP_SIZE)
        });

        let mut last = ResolveError::ServFail;
        for round in 0..2 {
            for &server in servers {
                if *contacted >= self.config.bounds.max_authorities {
                    warn!("authority fanout budget exhausted");
                    return Err(ResolveError::LoopOrBound("authority fanout"));
                }
                let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                    return Err(ResolveError::Timeout);
                };
                let hop = self.config.timeouts.hop.min(remaining);
                *contacted += 1;

                match net::exchange(server, &query, hop).await {
                    Ok(response) if response.rcode().is_servfail() => {
                        debug!(server = %server, "authority answered SERVFAIL");
                        last = ResolveError::ServFail;
                    }
                    Ok(response) => return Ok(response),
                    Err(e) => {
                        debug!(server = %server, round, error = %e, "authority failed");
                        last = e;
                    }
                }
            }
        }
        Err(last)
    }

    /// Turns a referral into the next authority list: NS targets in
    /// response order, glue from the additional section, IPv4 ahead of
    /// IPv6, missing glue resolved through the engine itself.
    async fn referral_servers(&self, response: &Message, deadline: Instant) -> Vec<SocketAddr> {
        let mut servers: Vec<SocketAddr> = Vec::new();
        let mut push = |servers: &mut Vec<SocketAddr>, ip: IpAddr| {
            let addr = SocketAddr::new(ip, self.config.ns_port);
            if !servers.contains(&addr) {
                servers.push(addr);
            }
        };

        for ns in response.authority.iter().filter_map(|r| r.rdata.as_ns()) {
            let mut v4: Vec<IpAddr> = Vec::new();
            let mut v6: Vec<IpAddr> = Vec::new();
            for extra in &response.additional {
                if &extra.name != ns {
                    continue;
                }
                match &extra.rdata {
                    skein_proto::RData::A(ip) => v4.push(IpAddr::V4(*ip)),
                    skein_proto::RData::Aaaa(ip) => v6.push(IpAddr::V6(*ip)),
                    _ => {}
                }
            }

            if v4.is_empty() && v6.is_empty() {
                trace!(ns = %ns, "no glue, resolving nameserver address");
                for ip in self.resolve_glue(ns, deadline).await {
                    push(&mut servers, ip);
                }
                continue;
            }
            for ip in v4.into_iter().chain(v6) {
                push(&mut servers, ip);
            }
        }
        servers
    }

    /// Resolves a glue-less nameserver name to addresses: A first, AAAA as
    /// the fallback, parent deadline, fresh small depth budget. Boxed to
    /// break the async recursion cycle.
    fn resolve_glue<'a>(&'a self, name: &'a Name, deadline: Instant) -> BoxFuture<'a, Vec<IpAddr>> {
        async move {
            let budget = self.config.bounds.glue_depth;
            let mut addrs: Vec<IpAddr> = Vec::new();
            if let Ok(lookup) = self.resolve_with(name, RecordType::A, deadline, budget).await {
                addrs.extend(lookup.records.iter().filter_map(|r| r.rdata.as_a().map(IpAddr::V4)));
            }
            if addrs.is_empty() {
                if let Ok(lookup) = self
                    .resolve_with(name, RecordType::AAAA, deadline, budget)
                    .await
                {
                    addrs.extend(
                        lookup.records.iter().filter_map(|r| r.rdata.as_aaaa().map(IpAddr::V6)),
                    );
                }
            }
            if addrs.is_empty() {
                debug!(ns = %name, "nameserver address resolution came up empty");
            }
            addrs
        }
        .boxed()
    }
}

#[async_trait]
impl Resolve for Engine {
    async fn resolve(&self, name: &Name, qtype: RecordType) -> Outcome {
        let deadline = Instant::now() + self.config.timeouts.deadline;
        self.resolve_with(name, qtype, deadline, self.config.bounds.max_depth)
            .await
    }
}

/// Removes the in-flight slot when the leader finishes or is dropped.
struct InflightGuard<'a> {
    engine: &'a Engine,
    key: &'a CacheKey,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.engine.inflight.remove(self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_cache::KeyCache;
    use std::net::Ipv4Addr;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::UdpSocket;

    /// A scripted authority: answers every incoming query with
    /// `respond(query)` and counts queries received.
    struct MockAuthority {
        addr: SocketAddr,
        hits: Arc<AtomicUsize>,
    }

    async fn spawn_authority<F>(respond: F) -> MockAuthority
    where
        F: Fn(&Message) -> Option<Message> + Send + Sync + 'static,
    {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            loop {
                let Ok((len, peer)) = socket.recv_from(&mut buf).await else {
                    break;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let Ok(query) = Message::parse(&buf[..len]) else {
                    continue;
                };
                if let Some(response) = respond(&query) {
                    let _ = socket.send_to(&response.to_wire(), peer).await;
                }
            }
        });
        MockAuthority { addr, hits }
    }

    fn engine_for(root: SocketAddr, enforce: bool) -> Engine {
        let roots = vec![RootServer {
            address: root.ip(),
            name: "mock-root".into(),
            port: root.port(),
            ttl: 3600,
        }];
        let validator = Arc::new(Validator::new(None, Arc::new(KeyCache::new()), enforce));
        let config = EngineConfig {
            timeouts: Timeouts {
                deadline: Duration::from_secs(3),
                hop: Duration::from_millis(250),
            },
            ..EngineConfig::default()
        };
        Engine::new(&roots, Arc::new(AnswerCache::new(1000)), validator, config)
    }

    fn name(s: &str) -> Name {
        Name::from_str(s).unwrap()
    }

    #[tokio::test]
    async fn direct_answer_resolves_and_caches() {
        let authority = spawn_authority(|query| {
            let mut response = Message::reply_to(query);
            response.push_answer(Record::a(
                name("example.com"),
                300,
                Ipv4Addr::new(93, 184, 216, 34),
            ));
            Some(response)
        })
        .await;

        let engine = engine_for(authority.addr, false);
        let lookup = engine.resolve(&name("example.com"), RecordType::A).await.unwrap();
        assert_eq!(lookup.records.len(), 1);
        assert!(!lookup.authenticated);

        // second resolve is served from cache: no new upstream traffic
        let before = authority.hits.load(Ordering::SeqCst);
        let again = engine.resolve(&name("example.com"), RecordType::A).await.unwrap();
        assert_eq!(
            again.records.iter().map(ToString::to_string).collect::<Vec<_>>(),
            lookup.records.iter().map(ToString::to_string).collect::<Vec<_>>()
        );
        assert_eq!(authority.hits.load(Ordering::SeqCst), before);
    }

    #[tokio::test]
    async fn referral_chain_followed() {
        // leaf authority answers the A query
        let leaf = spawn_authority(|query| {
            let mut response = Message::reply_to(query);
            response.push_answer(Record::a(
                name("example.com"),
                300,
                Ipv4Addr::new(93, 184, 216, 34),
            ));
            Some(response)
        })
        .await;

        // root refers to the leaf with glue
        let leaf_ip = match leaf.addr.ip() {
            IpAddr::V4(ip) => ip,
            IpAddr::V6(_) => unreachable!(),
        };
        let root = spawn_authority(move |query| {
            let mut response = Message::reply_to(query);
            response
                .authority
                .push(Record::ns(name("com"), 172800, name("a.gtld-servers.net")));
            response
                .additional
                .push(Record::a(name("a.gtld-servers.net"), 172800, leaf_ip));
            Some(response)
        })
        .await;

        let mut engine = engine_for(root.addr, false);
        engine.config.ns_port = leaf.addr.port();

        let lookup = engine.resolve(&name("example.com"), RecordType::A).await.unwrap();
        assert_eq!(lookup.records.len(), 1);
        assert_eq!(
            lookup.records[0].rdata.as_a(),
            Some(Ipv4Addr::new(93, 184, 216, 34))
        );
        assert_eq!(root.hits.load(Ordering::SeqCst), 1);
        assert_eq!(leaf.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cname_chain_combines_records() {
        let authority = spawn_authority(|query| {
            let question = query.question()?;
            let mut response = Message::reply_to(query);
            if question.qname == name("www.example.com") {
                response.push_answer(Record::cname(
                    name("www.example.com"),
                    300,
                    name("example.com"),
                ));
            } else {
                response.push_answer(Record::a(
                    name("example.com"),
                    300,
                    Ipv4Addr::new(93, 184, 216, 34),
                ));
            }
            Some(response)
        })
        .await;

        let engine = engine_for(authority.addr, false);
        let lookup = engine
            .resolve(&name("www.example.com"), RecordType::A)
            .await
            .unwrap();

        assert_eq!(lookup.records.len(), 2);
        assert!(lookup.records[0].is_type(RecordType::CNAME));
        assert!(lookup.records[1].is_type(RecordType::A));
    }

    #[tokio::test]
    async fn cname_loop_bounded() {
        // a -> b -> a, forever
        let authority = spawn_authority(|query| {
            let question = query.question()?;
            let mut response = Message::reply_to(query);
            let target = if question.qname == name("a.example.com") {
                name("b.example.com")
            } else {
                name("a.example.com")
            };
            response.push_answer(Record::cname(question.qname.clone(), 300, target));
            Some(response)
        })
        .await;

        let engine = engine_for(authority.addr, false);
        let err = engine
            .resolve(&name("a.example.com"), RecordType::A)
            .await
            .unwrap_err();
        assert_eq!(err, ResolveError::LoopOrBound("cname chain"));
    }

    #[tokio::test]
    async fn self_referral_terminates() {
        // the zone names itself as its own delegation, with glue pointing
        // back at the same server
        let slot: Arc<std::sync::Mutex<Option<(Ipv4Addr, u16)>>> =
            Arc::new(std::sync::Mutex::new(None));
        let slot_reader = slot.clone();
        let authority = spawn_authority(move |query| {
            let (ip, _port) = (*slot_reader.lock().unwrap())?;
            let mut response = Message::reply_to(query);
            response
                .authority
                .push(Record::ns(name("loop.test"), 300, name("ns.loop.test")));
            response
                .additional
                .push(Record::a(name("ns.loop.test"), 300, ip));
            Some(response)
        })
        .await;
        let IpAddr::V4(ip) = authority.addr.ip() else {
            unreachable!()
        };
        *slot.lock().unwrap() = Some((ip, authority.addr.port()));

        let mut engine = engine_for(authority.addr, false);
        engine.config.ns_port = authority.addr.port();

        let err = engine
            .resolve(&name("host.loop.test"), RecordType::A)
            .await
            .unwrap_err();
        assert_eq!(err, ResolveError::LoopOrBound("delegation depth"));
        // one query per delegation step, depth bound is 16
        assert!(authority.hits.load(Ordering::SeqCst) <= 17 * 2);
    }

    #[tokio::test]
    async fn nxdomain_surfaces() {
        let authority = spawn_authority(|query| {
            let mut response = Message::reply_to(query);
            response.set_rcode(skein_proto::Rcode::NxDomain);
            Some(response)
        })
        .await;

        let engine = engine_for(authority.addr, false);
        let err = engine
            .resolve(&name("missing.example.com"), RecordType::A)
            .await
            .unwrap_err();
        assert_eq!(err, ResolveError::Nxdomain);
    }

    #[tokio::test]
    async fn black_holed_authorities_time_out_without_caching() {
        let authority = spawn_authority(|_| None).await;
        let mut engine = engine_for(authority.addr, false);
        engine.config.timeouts = Timeouts {
            deadline: Duration::from_millis(300),
            hop: Duration::from_millis(100),
        };

        let err = engine
            .resolve(&name("example.com"), RecordType::A)
            .await
            .unwrap_err();
        assert_eq!(err, ResolveError::Timeout);
        assert!(engine.cache().is_empty());
    }

    #[tokio::test]
    async fn validation_required_when_enforcing() {
        // plain answer with no DNSKEY/RRSIG material at all
        let authority = spawn_authority(|query| {
            let mut response = Message::reply_to(query);
            response.push_answer(Record::a(
                name("example.com"),
                300,
                Ipv4Addr::new(93, 184, 216, 34),
            ));
            Some(response)
        })
        .await;

        let engine = engine_for(authority.addr, true);
        let err = engine
            .resolve(&name("example.com"), RecordType::A)
            .await
            .unwrap_err();
        assert_eq!(err, ResolveError::ValidationFailed);
    }

    #[tokio::test]
    async fn outbound_queries_carry_do_bit_when_enforcing() {
        let saw_do = Arc::new(AtomicUsize::new(0));
        let saw = saw_do.clone();
        let authority = spawn_authority(move |query| {
            if query.dnssec_ok() {
                saw.fetch_add(1, Ordering::SeqCst);
            }
            let mut response = Message::reply_to(query);
            response.push_answer(Record::a(
                name("example.com"),
                300,
                Ipv4Addr::new(192, 0, 2, 1),
            ));
            Some(response)
        })
        .await;

        let engine = engine_for(authority.addr, true);
        let _ = engine.resolve(&name("example.com"), RecordType::A).await;
        assert!(saw_do.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn identical_queries_coalesce() {
        let authority = spawn_authority(|query| {
            // answer slowly enough that all clients pile up
            std::thread::sleep(Duration::from_millis(50));
            let mut response = Message::reply_to(query);
            response.push_answer(Record::a(
                name("example.com"),
                300,
                Ipv4Addr::new(192, 0, 2, 7),
            ));
            Some(response)
        })
        .await;

        let engine = Arc::new(engine_for(authority.addr, false));
        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let engine = engine.clone();
                tokio::spawn(async move {
                    engine.resolve(&name("example.com"), RecordType::A).await
                })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }
        assert_eq!(authority.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_ttl_answers_not_cached() {
        let authority = spawn_authority(|query| {
            let mut response = Message::reply_to(query);
            response.push_answer(Record::a(
                name("volatile.example.com"),
                0,
                Ipv4Addr::new(192, 0, 2, 9),
            ));
            Some(response)
        })
        .await;

        let engine = engine_for(authority.addr, false);
        engine
            .resolve(&name("volatile.example.com"), RecordType::A)
            .await
            .unwrap();
        engine
            .resolve(&name("volatile.example.com"), RecordType::A)
            .await
            .unwrap();
        assert_eq!(authority.hits.load(Ordering::SeqCst), 2);
    }
}
