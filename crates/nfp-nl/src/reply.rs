use crate::attr::Attr;
use crate::consts::{NLM_F_MULTI, NLMSG_DONE, NLMSG_ERROR, NLMSG_HDRLEN, NftMsg};
use crate::error::NlError;
use crate::message::{Header, NfMessage, encode_message, split_messages};

/// A message sent back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ack { seq: u32 },
    /// `errno` is positive.
    Error { seq: u32, errno: i32 },
    Done { seq: u32 },
    Object(NfMessage),
}

impl Reply {
    pub fn parse_all(buf: &[u8]) -> Result<Vec<Reply>, NlError> {
        let mut replies = Vec::new();
        for raw in split_messages(buf)? {
            let seq = raw.header.seq;
            let reply = match raw.header.message_type {
                NLMSG_ERROR => {
                    let code: [u8; 4] = raw
                        .payload
                        .get(..4)
                        .and_then(|b| b.try_into().ok())
                        .ok_or(NlError::TruncatedHeader(raw.payload.len()))?;
                    match i32::from_ne_bytes(code) {
                        0 => Reply::Ack { seq },
                        code => Reply::Error { seq, errno: -code },
                    }
                }
                NLMSG_DONE => Reply::Done { seq },
                _ => Reply::Object(NfMessage::decode(&raw)?),
            };
            replies.push(reply);
        }
        Ok(replies)
    }
}

/// Object message answering a get or dump.
pub fn encode_object(
    msg: NftMsg,
    multi: bool,
    request: &Header,
    family: u8,
    res_id: u16,
    attrs: &[Attr],
) -> Vec<u8> {
    let flags = if multi { NLM_F_MULTI } else { 0 };
    encode_message(
        msg.message_type(),
        flags,
        request.seq,
        request.port,
        family,
        res_id,
        attrs,
    )
}

/// `NLMSG_ERROR` carrying `-errno` (zero for an ack) and the request header.
pub fn encode_error(request: &Header, errno: i32) -> Vec<u8> {
    let length = NLMSG_HDRLEN + 4 + NLMSG_HDRLEN;
    let mut buf = vec![0u8; length];
    Header {
        length: length as u32,
        message_type: NLMSG_ERROR,
        flags: 0,
        seq: request.seq,
        port: request.port,
    }
    .emit(&mut buf[..NLMSG_HDRLEN]);
    buf[NLMSG_HDRLEN..NLMSG_HDRLEN + 4].copy_from_slice(&(-errno).to_ne_bytes());
    request.emit(&mut buf[NLMSG_HDRLEN + 4..]);
    buf
}

pub fn encode_done(request: &Header) -> Vec<u8> {
    let length = NLMSG_HDRLEN + 4;
    let mut buf = vec![0u8; length];
    Header {
        length: length as u32,
        message_type: NLMSG_DONE,
        flags: NLM_F_MULTI,
        seq: request.seq,
        port: request.port,
    }
    .emit(&mut buf[..NLMSG_HDRLEN]);
    buf
}
