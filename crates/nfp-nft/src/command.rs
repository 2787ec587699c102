use nfp_core::{Family, NftError, PortId, Result};
use nfp_nl::consts::*;
use nfp_nl::{Attributes, Header, NftMsg};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Table,
    Chain,
    Rule,
    Generation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    New,
    Get,
    Delete,
    Destroy,
}

/// Decoded (object kind, verb) of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub msg: NftMsg,
    pub kind: ObjectKind,
    pub verb: Verb,
}

impl Command {
    pub fn from_message_type(message_type: u16) -> Result<Self> {
        let msg = NftMsg::from_message_type(message_type).ok_or_else(|| {
            NftError::unsupported(format!("message type {:#06x}", message_type))
        })?;
        let (kind, verb) = match msg {
            NftMsg::NewTable => (ObjectKind::Table, Verb::New),
            NftMsg::GetTable => (ObjectKind::Table, Verb::Get),
            NftMsg::DelTable => (ObjectKind::Table, Verb::Delete),
            NftMsg::DestroyTable => (ObjectKind::Table, Verb::Destroy),
            NftMsg::NewChain => (ObjectKind::Chain, Verb::New),
            NftMsg::GetChain => (ObjectKind::Chain, Verb::Get),
            NftMsg::DelChain => (ObjectKind::Chain, Verb::Delete),
            NftMsg::DestroyChain => (ObjectKind::Chain, Verb::Destroy),
            NftMsg::NewRule => (ObjectKind::Rule, Verb::New),
            NftMsg::GetRule => (ObjectKind::Rule, Verb::Get),
            NftMsg::DelRule => (ObjectKind::Rule, Verb::Delete),
            NftMsg::DestroyRule => (ObjectKind::Rule, Verb::Destroy),
            NftMsg::GetGen => (ObjectKind::Generation, Verb::Get),
            NftMsg::NewGen => {
                return Err(NftError::unsupported("generation updates"));
            }
        };
        Ok(Self { msg, kind, verb })
    }

    pub fn label(&self) -> &'static str {
        self.msg.name()
    }
}

/// Header flags; the high bits mean different things for NEW and GET.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestFlags(pub u16);

impl RequestFlags {
    pub fn ack(self) -> bool {
        self.0 & NLM_F_ACK != 0
    }

    pub fn dump(self) -> bool {
        self.0 & NLM_F_DUMP != 0
    }

    pub fn replace(self) -> bool {
        self.0 & NLM_F_REPLACE != 0
    }

    pub fn excl(self) -> bool {
        self.0 & NLM_F_EXCL != 0
    }

    pub fn create(self) -> bool {
        self.0 & NLM_F_CREATE != 0
    }

    pub fn append(self) -> bool {
        self.0 & NLM_F_APPEND != 0
    }
}

/// Everything a handler needs to know about the request it serves.
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    pub command: Command,
    pub family: Family,
    pub flags: RequestFlags,
    pub header: &'a Header,
    pub port: PortId,
    pub attrs: &'a Attributes,
}

impl Request<'_> {
    pub fn is_destroy(&self) -> bool {
        self.command.verb == Verb::Destroy
    }
}
