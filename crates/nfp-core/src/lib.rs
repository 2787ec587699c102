pub mod config;
pub mod error;
pub mod expr;
pub mod family;
pub mod model;
pub mod namespace;
pub mod observer;
pub mod ownership;
pub mod registry;
pub mod status;
pub mod store;

pub use config::*;
pub use error::{NftError, Result};
pub use expr::*;
pub use family::*;
pub use model::*;
pub use namespace::*;
pub use observer::*;
pub use registry::ChainType;
pub use status::*;
pub use store::*;
