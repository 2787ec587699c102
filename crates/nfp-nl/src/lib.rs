pub mod attr;
pub mod builder;
pub mod consts;
pub mod error;
pub mod message;
pub mod reply;

pub use attr::{Attr, Attribute, Attributes, emit_attributes};
pub use builder::MessageBuilder;
pub use consts::NftMsg;
pub use error::NlError;
pub use message::{Header, NfMessage, RawMessage, split_messages};
pub use reply::Reply;

// nfnetlink framing and attribute codec for the nf_tables subsystem
