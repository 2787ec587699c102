// nf_tables request handling over the in-memory object store
mod chain;
pub mod command;
mod expr;
pub mod engine;
pub mod response;
mod rule;
pub mod ruleset;
mod table;
mod validate;

pub use command::{Command, ObjectKind, RequestFlags, Verb};
pub use engine::{Connection, Engine};
pub use response::{ObjectReply, Outcome};
pub use ruleset::*;
