// Request dispatch and reply construction
use std::sync::Arc;

use nfp_core::{
    EngineConfig, Family, Limits, Namespace, NamespaceGuard, NamespaceStatus, NftError, PortId,
    RequestObserver, Result,
};
use nfp_nl::consts::NLM_F_REQUEST;
use nfp_nl::reply::{encode_done, encode_error, encode_object};
use nfp_nl::{Header, NfMessage, NlError, Reply, split_messages};
use tracing::{debug, warn};

use crate::command::{Command, ObjectKind, Request, RequestFlags, Verb};
use crate::response::{self, ObjectReply, Outcome};
use crate::{chain, rule, table};

/// Shared nf_tables control plane; cheap to clone.
#[derive(Clone)]
pub struct Engine {
    namespace: Arc<Namespace>,
    config: Arc<EngineConfig>,
    observer: Option<Arc<dyn RequestObserver>>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            namespace: Arc::new(Namespace::new()),
            config: Arc::new(config),
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn RequestObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Open a connection with an automatically assigned port id.
    pub fn connect(&self) -> Connection {
        let port = self.namespace.allocate_port();
        self.open(port)
    }

    /// Open a connection bound to `port`; fails while another connection holds it.
    pub fn connect_with_port(&self, port: PortId) -> Result<Connection> {
        let port = self.namespace.bind_port(port)?;
        Ok(self.open(port))
    }

    fn open(&self, port: PortId) -> Connection {
        debug!(port = port.0, "connection opened");
        Connection {
            engine: self.clone(),
            port,
        }
    }

    pub fn status(&self) -> NamespaceStatus {
        self.namespace.status()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// One client socket. Dropping it releases the owner tables it created.
pub struct Connection {
    engine: Engine,
    port: PortId,
}

impl Connection {
    pub fn port(&self) -> PortId {
        self.port
    }

    /// Process every request in `buf` in order and return the encoded replies.
    ///
    /// Only framing errors fail the whole buffer; every other failure becomes an
    /// error reply for the message that caused it.
    pub fn send(&self, buf: &[u8]) -> std::result::Result<Vec<Vec<u8>>, NlError> {
        let mut replies = vec![];
        for raw in split_messages(buf)? {
            let header = raw.header;
            if header.flags & NLM_F_REQUEST == 0 {
                debug!(seq = header.seq, "ignoring message without the request flag");
                continue;
            }

            let label = Command::from_message_type(header.message_type)
                .map(|c| c.label())
                .unwrap_or("unknown");
            let result = NfMessage::decode(&raw)
                .map_err(NftError::from)
                .and_then(|msg| self.dispatch(&msg));

            let errno = match &result {
                Ok(_) => 0,
                Err(e) => e.errno(),
            };
            match result {
                Ok((outcome, generation)) => {
                    self.encode_outcome(&header, outcome, generation, &mut replies)
                }
                Err(e) => {
                    match &e {
                        NftError::InvalidArgument(_) | NftError::OutOfRange(_) => {
                            warn!(command = label, seq = header.seq, error = %e, "rejected request")
                        }
                        _ => debug!(command = label, seq = header.seq, error = %e, "request failed"),
                    }
                    replies.push(encode_error(&header, e.errno()));
                }
            }
            if let Some(observer) = &self.engine.observer {
                observer.request_completed(label, errno);
            }
        }
        Ok(replies)
    }

    /// Send `buf` and return the object messages of the replies, or the first error.
    pub fn execute(&self, buf: &[u8]) -> Result<Vec<NfMessage>> {
        let mut objects = vec![];
        for reply in self.send(buf)? {
            for reply in Reply::parse_all(&reply)? {
                match reply {
                    Reply::Error { errno, .. } => return Err(NftError::from_errno(errno)),
                    Reply::Object(msg) => objects.push(msg),
                    Reply::Ack { .. } | Reply::Done { .. } => {}
                }
            }
        }
        Ok(objects)
    }

    fn dispatch(&self, msg: &NfMessage) -> Result<(Outcome, u32)> {
        let command = Command::from_message_type(msg.header.message_type)?;
        let family = Family::try_from(msg.family)?;
        let req = Request {
            command,
            family,
            flags: RequestFlags(msg.header.flags),
            header: &msg.header,
            port: self.port,
            attrs: &msg.attrs,
        };
        debug!(command = command.label(), %family, seq = msg.header.seq, port = self.port.0, "dispatching");

        let mut ns = self.engine.namespace.lock();
        let outcome = route(&mut ns, &req, &self.engine.config.limits)?;
        Ok((outcome, ns.generation()))
    }

    fn encode_outcome(
        &self,
        header: &Header,
        outcome: Outcome,
        generation: u32,
        replies: &mut Vec<Vec<u8>>,
    ) {
        let ack = RequestFlags(header.flags).ack();
        let res_id = generation as u16;
        let object = |reply: &ObjectReply, multi: bool| {
            encode_object(reply.msg, multi, header, reply.family.as_u8(), res_id, &reply.attrs)
        };
        match outcome {
            Outcome::Ack => {
                if ack {
                    replies.push(encode_error(header, 0));
                }
            }
            Outcome::Object(reply) => {
                replies.push(object(&reply, false));
                if ack {
                    replies.push(encode_error(header, 0));
                }
            }
            Outcome::Dump(objects) => {
                replies.extend(objects.iter().map(|reply| object(reply, true)));
                replies.push(encode_done(header));
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        debug!(port = self.port.0, "connection closed");
        self.engine.namespace.release_port(self.port);
    }
}

fn route(ns: &mut NamespaceGuard<'_>, req: &Request<'_>, limits: &Limits) -> Result<Outcome> {
    match (req.command.kind, req.command.verb) {
        (ObjectKind::Table, Verb::New) => table::create(ns, req, limits),
        (ObjectKind::Table, Verb::Get) => table::get(ns, req, limits),
        (ObjectKind::Table, Verb::Delete | Verb::Destroy) => table::delete(ns, req, limits),
        (ObjectKind::Chain, Verb::New) => chain::create(ns, req, limits),
        (ObjectKind::Chain, Verb::Get) => chain::get(ns, req, limits),
        (ObjectKind::Chain, Verb::Delete | Verb::Destroy) => chain::delete(ns, req, limits),
        (ObjectKind::Rule, Verb::New) => rule::create(ns, req, limits),
        (ObjectKind::Rule, Verb::Get) => rule::get(ns, req, limits),
        (ObjectKind::Rule, Verb::Delete | Verb::Destroy) => rule::delete(ns, req, limits),
        (ObjectKind::Generation, Verb::Get) => Ok(Outcome::Object(response::generation(ns))),
        (ObjectKind::Generation, _) => Err(NftError::unsupported("generation updates")),
    }
}
