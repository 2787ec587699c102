use nfp_core::NftError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NlError {
    #[error("malformed netlink framing: {0}")]
    Framing(String),

    #[error("truncated nfgenmsg header ({0} bytes)")]
    TruncatedHeader(usize),

    #[error("malformed attribute: {0}")]
    Attribute(String),

    #[error("attribute {kind} has {actual} bytes, expected {expected}")]
    Width {
        kind: u16,
        expected: usize,
        actual: usize,
    },

    #[error("attribute {0} is not a valid string")]
    InvalidString(u16),
}

impl From<netlink_packet_utils::DecodeError> for NlError {
    fn from(err: netlink_packet_utils::DecodeError) -> Self {
        NlError::Attribute(err.to_string())
    }
}

impl From<NlError> for NftError {
    fn from(err: NlError) -> Self {
        NftError::invalid(err.to_string())
    }
}
