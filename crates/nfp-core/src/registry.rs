// Hook and chain-type registry for base chains
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{NftError, Result};
use crate::family::Family;

pub const NF_INET_PRE_ROUTING: u32 = 0;
pub const NF_INET_LOCAL_IN: u32 = 1;
pub const NF_INET_FORWARD: u32 = 2;
pub const NF_INET_LOCAL_OUT: u32 = 3;
pub const NF_INET_POST_ROUTING: u32 = 4;
pub const NF_INET_INGRESS: u32 = 5;

pub const NF_ARP_IN: u32 = 0;
pub const NF_ARP_OUT: u32 = 1;
pub const NF_ARP_FORWARD: u32 = 2;

pub const NF_NETDEV_INGRESS: u32 = 0;
pub const NF_NETDEV_EGRESS: u32 = 1;

/// NAT chains must run after connection tracking.
pub const NF_IP_PRI_CONNTRACK: i32 = -200;

const fn bit(hook: u32) -> u32 {
    1 << hook
}

/// Hooks that exist at all for a family, whether or not any chain type may use them.
pub fn known_hooks(family: Family) -> u32 {
    let inet = bit(NF_INET_PRE_ROUTING)
        | bit(NF_INET_LOCAL_IN)
        | bit(NF_INET_FORWARD)
        | bit(NF_INET_LOCAL_OUT)
        | bit(NF_INET_POST_ROUTING);
    match family {
        Family::Inet => inet | bit(NF_INET_INGRESS),
        Family::Ipv4 | Family::Ipv6 | Family::Bridge => inet,
        Family::Arp => bit(NF_ARP_IN) | bit(NF_ARP_OUT) | bit(NF_ARP_FORWARD),
        Family::Netdev => bit(NF_NETDEV_INGRESS) | bit(NF_NETDEV_EGRESS),
        Family::Unspec => 0,
    }
}

/// Parse a hook name as written in rulesets for the given family.
pub fn hook_from_name(family: Family, name: &str) -> Option<u32> {
    match (family, name) {
        (Family::Arp, "input") => Some(NF_ARP_IN),
        (Family::Arp, "output") => Some(NF_ARP_OUT),
        (Family::Arp, "forward") => Some(NF_ARP_FORWARD),
        (Family::Netdev, "ingress") => Some(NF_NETDEV_INGRESS),
        (Family::Netdev, "egress") => Some(NF_NETDEV_EGRESS),
        (Family::Arp | Family::Netdev, _) => None,
        (_, "prerouting") => Some(NF_INET_PRE_ROUTING),
        (_, "input") => Some(NF_INET_LOCAL_IN),
        (_, "forward") => Some(NF_INET_FORWARD),
        (_, "output") => Some(NF_INET_LOCAL_OUT),
        (_, "postrouting") => Some(NF_INET_POST_ROUTING),
        (_, "ingress") => Some(NF_INET_INGRESS),
        _ => None,
    }
}

pub fn hook_name(family: Family, hooknum: u32) -> &'static str {
    match (family, hooknum) {
        (Family::Arp, NF_ARP_IN) => "input",
        (Family::Arp, NF_ARP_OUT) => "output",
        (Family::Arp, NF_ARP_FORWARD) => "forward",
        (Family::Netdev, NF_NETDEV_INGRESS) => "ingress",
        (Family::Netdev, NF_NETDEV_EGRESS) => "egress",
        (Family::Arp | Family::Netdev, _) => "unknown",
        (_, NF_INET_PRE_ROUTING) => "prerouting",
        (_, NF_INET_LOCAL_IN) => "input",
        (_, NF_INET_FORWARD) => "forward",
        (_, NF_INET_LOCAL_OUT) => "output",
        (_, NF_INET_POST_ROUTING) => "postrouting",
        (_, NF_INET_INGRESS) => "ingress",
        _ => "unknown",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainType {
    Filter,
    Nat,
    Route,
}

impl ChainType {
    /// Unknown names fail as a lookup, not as malformed input.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "filter" => Ok(ChainType::Filter),
            "nat" => Ok(ChainType::Nat),
            "route" => Ok(ChainType::Route),
            other => Err(NftError::not_found(format!("chain type {:?}", other))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ChainType::Filter => "filter",
            ChainType::Nat => "nat",
            ChainType::Route => "route",
        }
    }

    /// Hooks this type may attach to in `family`; zero means the pairing is unsupported.
    pub fn hook_mask(self, family: Family) -> u32 {
        let inet = bit(NF_INET_PRE_ROUTING)
            | bit(NF_INET_LOCAL_IN)
            | bit(NF_INET_FORWARD)
            | bit(NF_INET_LOCAL_OUT)
            | bit(NF_INET_POST_ROUTING);
        match (self, family) {
            (ChainType::Filter, Family::Ipv4 | Family::Ipv6 | Family::Inet | Family::Bridge) => {
                inet
            }
            (ChainType::Filter, Family::Arp) => bit(NF_ARP_IN) | bit(NF_ARP_OUT),
            (ChainType::Nat, Family::Ipv4 | Family::Ipv6 | Family::Inet) => {
                bit(NF_INET_PRE_ROUTING)
                    | bit(NF_INET_LOCAL_IN)
                    | bit(NF_INET_LOCAL_OUT)
                    | bit(NF_INET_POST_ROUTING)
            }
            (ChainType::Route, Family::Ipv4 | Family::Ipv6 | Family::Inet) => {
                bit(NF_INET_LOCAL_OUT)
            }
            _ => 0,
        }
    }

    /// Check a base chain's (family, hook, priority) against this type.
    pub fn validate_hook(self, family: Family, hooknum: u32, priority: i32) -> Result<()> {
        let mask = self.hook_mask(family);
        if mask == 0 {
            return Err(NftError::unsupported(format!(
                "chain type {} in family {}",
                self, family
            )));
        }
        if hooknum >= 32 || known_hooks(family) & bit(hooknum) == 0 {
            return Err(NftError::not_found(format!(
                "hook {} in family {}",
                hooknum, family
            )));
        }
        if mask & bit(hooknum) == 0 {
            return Err(NftError::unsupported(format!(
                "{} chains on hook {} in family {}",
                self,
                hook_name(family, hooknum),
                family
            )));
        }
        if self == ChainType::Nat && priority <= NF_IP_PRI_CONNTRACK {
            return Err(NftError::unsupported(format!(
                "nat chain priority {} must be above {}",
                priority, NF_IP_PRI_CONNTRACK
            )));
        }
        Ok(())
    }
}

impl fmt::Display for ChainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_type_name_is_a_lookup_failure() {
        let err = ChainType::from_name("test_chain_type_invalid").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn route_is_not_valid_for_arp() {
        let err = ChainType::Route
            .validate_hook(Family::Arp, NF_ARP_IN, 0)
            .unwrap_err();
        assert!(matches!(err, NftError::NotSupported(_)));
    }

    #[test]
    fn netdev_filter_is_unsupported() {
        let err = ChainType::Filter
            .validate_hook(Family::Netdev, NF_NETDEV_INGRESS, 0)
            .unwrap_err();
        assert!(matches!(err, NftError::NotSupported(_)));
    }

    #[test]
    fn inet_ingress_is_known_but_unsupported() {
        let err = ChainType::Filter
            .validate_hook(Family::Inet, NF_INET_INGRESS, 0)
            .unwrap_err();
        assert!(matches!(err, NftError::NotSupported(_)));
    }

    #[test]
    fn unknown_hook_number_is_a_lookup_failure() {
        let err = ChainType::Filter
            .validate_hook(Family::Ipv4, 9, 0)
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(ChainType::Filter.validate_hook(Family::Ipv4, 40, 0).is_err());
    }

    #[test]
    fn nat_priority_bound_is_exclusive() {
        assert!(
            ChainType::Nat
                .validate_hook(Family::Ipv4, NF_INET_PRE_ROUTING, -250)
                .is_err()
        );
        assert!(
            ChainType::Nat
                .validate_hook(Family::Ipv4, NF_INET_PRE_ROUTING, -200)
                .is_err()
        );
        assert!(
            ChainType::Nat
                .validate_hook(Family::Ipv4, NF_INET_PRE_ROUTING, -100)
                .is_ok()
        );
    }

    #[test]
    fn filter_accepts_every_inet_hook() {
        for hook in NF_INET_PRE_ROUTING..=NF_INET_POST_ROUTING {
            assert!(ChainType::Filter.validate_hook(Family::Inet, hook, 0).is_ok());
        }
    }

    #[test]
    fn hook_names_resolve_per_family() {
        assert_eq!(hook_from_name(Family::Arp, "output"), Some(NF_ARP_OUT));
        assert_eq!(hook_from_name(Family::Ipv4, "output"), Some(NF_INET_LOCAL_OUT));
        assert_eq!(hook_from_name(Family::Netdev, "input"), None);
        assert_eq!(hook_name(Family::Inet, NF_INET_FORWARD), "forward");
    }
}
