use crate::attr::Attr;
use crate::consts::{NLM_F_REQUEST, NftMsg};
use crate::message::encode_message;

/// Client-side request construction.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    message_type: u16,
    family: u8,
    flags: u16,
    seq: u32,
    port: u32,
    res_id: u16,
    attrs: Vec<Attr>,
}

impl MessageBuilder {
    /// nf_tables request with `NLM_F_REQUEST` already set.
    pub fn new(msg: NftMsg, family: u8) -> Self {
        Self::raw(msg.message_type(), family)
    }

    /// Request with an arbitrary message type.
    pub fn raw(message_type: u16, family: u8) -> Self {
        Self {
            message_type,
            family,
            flags: NLM_F_REQUEST,
            seq: 0,
            port: 0,
            res_id: 0,
            attrs: vec![],
        }
    }

    /// Add flags on top of the request flag.
    pub fn flags(mut self, flags: u16) -> Self {
        self.flags |= flags;
        self
    }

    /// Overwrite every header flag, request flag included.
    pub fn raw_flags(mut self, flags: u16) -> Self {
        self.flags = flags;
        self
    }

    pub fn seq(mut self, seq: u32) -> Self {
        self.seq = seq;
        self
    }

    pub fn port(mut self, port: u32) -> Self {
        self.port = port;
        self
    }

    pub fn res_id(mut self, res_id: u16) -> Self {
        self.res_id = res_id;
        self
    }

    pub fn attr(mut self, attr: Attr) -> Self {
        self.attrs.push(attr);
        self
    }

    pub fn attrs(mut self, attrs: impl IntoIterator<Item = Attr>) -> Self {
        self.attrs.extend(attrs);
        self
    }

    pub fn message_type(&self) -> u16 {
        self.message_type
    }

    pub fn build(&self) -> Vec<u8> {
        encode_message(
            self.message_type,
            self.flags,
            self.seq,
            self.port,
            self.family,
            self.res_id,
            &self.attrs,
        )
    }
}
