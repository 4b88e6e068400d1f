//! The request/response contract between transports and the resolver.

use crate::Transport;
use async_trait::async_trait;
use skein_proto::{Flags, Message, Rcode};
use skein_resolver::{Resolve, ResolveError};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, trace};

/// Per-query transport context.
#[derive(Debug, Clone)]
pub struct QueryContext {
    /// Client address.
    pub client: SocketAddr,
    /// Transport the query arrived over.
    pub transport: Transport,
}

impl QueryContext {
    /// Creates a context.
    pub fn new(client: SocketAddr, transport: Transport) -> Self {
        Self { client, transport }
    }
}

/// Turns parsed queries into responses. Listeners depend on this trait,
/// not on the engine, so they are testable with a canned handler.
#[async_trait]
pub trait QueryHandler: Send + Sync {
    /// Produces the response for `query`.
    async fn handle(&self, query: Message, ctx: QueryContext) -> Message;
}

/// The production handler: validates the request shape, runs the resolver,
/// maps the outcome onto the wire contract.
pub struct ResolverHandler {
    resolver: Arc<dyn Resolve>,
}

impl ResolverHandler {
    /// Wraps a resolver.
    pub fn new(resolver: Arc<dyn Resolve>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl QueryHandler for ResolverHandler {
    async fn handle(&self, query: Message, ctx: QueryContext) -> Message {
        let mut response = Message::reply_to(&query);
        response.header.set(Flags::RA, true);

        // only actual queries with exactly one question are served
        if query.header.is_response() || query.questions.len() != 1 {
            debug!(client = %ctx.client, "rejecting message with bad shape");
            response.set_rcode(Rcode::FormErr);
            return response;
        }
        let question = &query.questions[0];
        let Some(qtype) = question.qtype.known() else {
            response.set_rcode(Rcode::NotImp);
            return response;
        };

        trace!(
            client = %ctx.client,
            transport = %ctx.transport,
            name = %question.qname,
            qtype = %qtype,
            "query received"
        );

        match self.resolver.resolve(&question.qname, qtype).await {
            Ok(lookup) => {
                response.header.set(Flags::AD, lookup.authenticated);
                for record in lookup.records {
                    response.push_answer(record);
                }
            }
            Err(ResolveError::Nxdomain) => {
                response.set_rcode(Rcode::NxDomain);
            }
            Err(e) => {
                debug!(name = %question.qname, error = %e, "resolution failed");
                response.set_rcode(Rcode::ServFail);
            }
        }
        response
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use skein_proto::{Name, Record, RecordType};
    use skein_resolver::{Lookup, Result};
    use std::net::Ipv4Addr;

    /// Canned resolver used by listener tests.
    pub struct StaticResolver {
        pub outcome: std::result::Result<Lookup, ResolveError>,
    }

    impl StaticResolver {
        pub fn answering(name: &Name) -> Self {
            Self {
                outcome: Ok(Lookup {
                    records: vec![Record::a(name.clone(), 300, Ipv4Addr::new(192, 0, 2, 1))],
                    authenticated: false,
                }),
            }
        }

        pub fn failing(error: ResolveError) -> Self {
            Self {
                outcome: Err(error),
            }
        }
    }

    #[async_trait]
    impl Resolve for StaticResolver {
        async fn resolve(&self, _name: &Name, _qtype: RecordType) -> Result<Lookup> {
            self.outcome.clone()
        }
    }
}
