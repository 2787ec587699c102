use netlink_packet_core::NetlinkBuffer;

use crate::attr::{Attr, Attributes, emit_attributes};
use crate::consts::{NFGENMSG_LEN, NLMSG_HDRLEN, NftMsg};
use crate::error::NlError;

/// Fixed netlink message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    pub length: u32,
    pub message_type: u16,
    pub flags: u16,
    pub seq: u32,
    pub port: u32,
}

impl Header {
    pub fn emit(&self, buf: &mut [u8]) {
        let mut nl = NetlinkBuffer::new(buf);
        nl.set_length(self.length);
        nl.set_message_type(self.message_type);
        nl.set_flags(self.flags);
        nl.set_sequence_number(self.seq);
        nl.set_port_number(self.port);
    }

    pub fn to_bytes(&self) -> [u8; NLMSG_HDRLEN] {
        let mut buf = [0u8; NLMSG_HDRLEN];
        self.emit(&mut buf);
        buf
    }
}

/// A framed message whose payload has not been decoded yet.
#[derive(Debug, Clone, Copy)]
pub struct RawMessage<'a> {
    pub header: Header,
    pub payload: &'a [u8],
}

fn align4(len: usize) -> usize {
    (len + 3) & !3
}

/// Split a datagram into netlink messages. Any framing error rejects the whole buffer.
pub fn split_messages(buf: &[u8]) -> Result<Vec<RawMessage<'_>>, NlError> {
    let mut messages = Vec::new();
    let mut offset = 0;
    while offset < buf.len() {
        let nl = NetlinkBuffer::new_checked(&buf[offset..])
            .map_err(|e| NlError::Framing(e.to_string()))?;
        let length = nl.length() as usize;
        let header = Header {
            length: nl.length(),
            message_type: nl.message_type(),
            flags: nl.flags(),
            seq: nl.sequence_number(),
            port: nl.port_number(),
        };
        messages.push(RawMessage {
            header,
            payload: &buf[offset + NLMSG_HDRLEN..offset + length],
        });
        offset += align4(length);
    }
    Ok(messages)
}

/// An nfnetlink message: header, nfgenmsg block and top-level attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NfMessage {
    pub header: Header,
    pub family: u8,
    pub version: u8,
    pub res_id: u16,
    pub attrs: Attributes,
}

impl NfMessage {
    pub fn decode(raw: &RawMessage<'_>) -> Result<Self, NlError> {
        let payload = raw.payload;
        if payload.len() < NFGENMSG_LEN {
            return Err(NlError::TruncatedHeader(payload.len()));
        }
        Ok(Self {
            header: raw.header,
            family: payload[0],
            version: payload[1],
            res_id: u16::from_be_bytes([payload[2], payload[3]]),
            attrs: Attributes::parse(&payload[NFGENMSG_LEN..])?,
        })
    }

    pub fn msg(&self) -> Option<NftMsg> {
        NftMsg::from_message_type(self.header.message_type)
    }
}

/// Serialize header + nfgenmsg + attributes, filling in the length.
pub fn encode_message(
    message_type: u16,
    flags: u16,
    seq: u32,
    port: u32,
    family: u8,
    res_id: u16,
    attrs: &[Attr],
) -> Vec<u8> {
    let body = emit_attributes(attrs);
    let length = NLMSG_HDRLEN + NFGENMSG_LEN + body.len();
    let mut buf = vec![0u8; length];
    Header {
        length: length as u32,
        message_type,
        flags,
        seq,
        port,
    }
    .emit(&mut buf[..NLMSG_HDRLEN]);
    buf[NLMSG_HDRLEN] = family;
    buf[NLMSG_HDRLEN + 1] = crate::consts::NFNETLINK_V0;
    buf[NLMSG_HDRLEN + 2..NLMSG_HDRLEN + NFGENMSG_LEN].copy_from_slice(&res_id.to_be_bytes());
    buf[NLMSG_HDRLEN + NFGENMSG_LEN..].copy_from_slice(&body);
    buf
}
