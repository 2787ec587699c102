use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{NftError, Result};
use crate::expr::Expression;
use crate::family::Family;
use crate::registry::ChainType;

/// Netlink port id identifying a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PortId(pub u32);

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableFlags(u32);

impl TableFlags {
    pub const DORMANT: u32 = 1 << 0;
    pub const OWNER: u32 = 1 << 1;
    pub const PERSIST: u32 = 1 << 2;
    pub const MASK: u32 = Self::DORMANT | Self::OWNER | Self::PERSIST;

    /// Reserved bits are rejected as unsupported.
    pub fn from_bits(bits: u32) -> Result<Self> {
        if bits & !Self::MASK != 0 {
            return Err(NftError::unsupported(format!("table flags {:#x}", bits)));
        }
        Ok(Self(bits))
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, flag: u32) -> bool {
        self.0 & flag == flag
    }

    pub fn without(self, flag: u32) -> Self {
        Self(self.0 & !flag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChainFlags(u32);

impl ChainFlags {
    pub const BASE: u32 = 1 << 0;
    pub const HW_OFFLOAD: u32 = 1 << 1;
    pub const BINDING: u32 = 1 << 2;
    pub const MASK: u32 = Self::BASE | Self::HW_OFFLOAD | Self::BINDING;

    pub fn from_bits(bits: u32) -> Result<Self> {
        if bits & !Self::MASK != 0 {
            return Err(NftError::unsupported(format!("chain flags {:#x}", bits)));
        }
        Ok(Self(bits))
    }

    /// Raw bits without the reserved-bit check.
    pub fn from_bits_retain(bits: u32) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, flag: u32) -> bool {
        self.0 & flag == flag
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    Drop,
    Accept,
}

impl Policy {
    pub const NF_DROP: u32 = 0;
    pub const NF_ACCEPT: u32 = 1;

    pub fn from_code(code: u32) -> Result<Self> {
        match code {
            Self::NF_DROP => Ok(Policy::Drop),
            Self::NF_ACCEPT => Ok(Policy::Accept),
            other => Err(NftError::invalid(format!("chain policy {}", other))),
        }
    }

    pub fn code(self) -> u32 {
        match self {
            Policy::Drop => Self::NF_DROP,
            Policy::Accept => Self::NF_ACCEPT,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Policy::Drop => "drop",
            Policy::Accept => "accept",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub handle: u64,
    pub family: Family,
    pub name: String,
    pub flags: TableFlags,
    pub owner: Option<PortId>,
    pub userdata: Option<Vec<u8>>,
    /// Chain handles in creation order.
    pub chains: Vec<u64>,
}

impl Table {
    pub fn new(handle: u64, family: Family, name: &str, flags: TableFlags) -> Self {
        Self {
            handle,
            family,
            name: name.to_string(),
            flags,
            owner: None,
            userdata: None,
            chains: vec![],
        }
    }

    pub fn chain_count(&self) -> u32 {
        self.chains.len() as u32
    }

    pub fn is_owned(&self) -> bool {
        self.flags.contains(TableFlags::OWNER)
    }
}

/// Hook attachment of a base chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseChain {
    pub hooknum: u32,
    pub priority: i32,
    pub policy: Policy,
    pub chain_type: ChainType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chain {
    pub handle: u64,
    pub table: u64,
    pub name: Option<String>,
    pub id: Option<u32>,
    pub flags: ChainFlags,
    pub base: Option<BaseChain>,
    pub use_count: u32,
    pub userdata: Option<Vec<u8>>,
    /// Rule handles in evaluation order.
    pub rules: Vec<u64>,
    /// Rule owning this chain once a binding chain is referenced.
    pub bound_to: Option<u64>,
}

impl Chain {
    pub fn new(handle: u64, table: u64, name: Option<String>, flags: ChainFlags) -> Self {
        Self {
            handle,
            table,
            name,
            id: None,
            flags,
            base: None,
            use_count: 0,
            userdata: None,
            rules: vec![],
            bound_to: None,
        }
    }

    pub fn is_base(&self) -> bool {
        self.base.is_some()
    }

    pub fn is_binding(&self) -> bool {
        self.flags.contains(ChainFlags::BINDING)
    }

    pub fn is_bound(&self) -> bool {
        self.bound_to.is_some()
    }

    /// Human-readable label for anonymous chains.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("__chain{}", self.handle),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub handle: u64,
    pub chain: u64,
    pub userdata: Option<Vec<u8>>,
    pub expressions: Vec<Expression>,
}

impl Rule {
    /// Chains this rule jumps or goes to.
    pub fn chain_references(&self) -> impl Iterator<Item = u64> + '_ {
        self.expressions.iter().filter_map(Expression::chain_reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_flags_reject_reserved_bits() {
        assert!(TableFlags::from_bits(TableFlags::DORMANT | TableFlags::OWNER).is_ok());
        let err = TableFlags::from_bits(0xFFFF_FFFF).unwrap_err();
        assert!(matches!(err, NftError::NotSupported(_)));
    }

    #[test]
    fn chain_flags_reject_reserved_bits() {
        let err = ChainFlags::from_bits(1 << 3).unwrap_err();
        assert!(matches!(err, NftError::NotSupported(_)));
        let flags = ChainFlags::from_bits(ChainFlags::BINDING).unwrap();
        assert!(flags.contains(ChainFlags::BINDING));
        assert!(!flags.contains(ChainFlags::BASE));
    }

    #[test]
    fn policy_only_accepts_accept_and_drop() {
        assert_eq!(Policy::from_code(0).unwrap(), Policy::Drop);
        assert_eq!(Policy::from_code(1).unwrap(), Policy::Accept);
        assert!(matches!(
            Policy::from_code(8),
            Err(NftError::InvalidArgument(_))
        ));
    }

    #[test]
    fn anonymous_chain_label_uses_handle() {
        let chain = Chain::new(42, 1, None, ChainFlags::from_bits_retain(ChainFlags::BINDING));
        assert_eq!(chain.label(), "__chain42");
        assert!(chain.is_binding());
        assert!(!chain.is_bound());
    }
}
