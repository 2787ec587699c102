use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::NftError;

/// Address family scoping a table and everything below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Family {
    Unspec = 0,
    Inet = 1,
    Ipv4 = 2,
    Arp = 3,
    Netdev = 5,
    Bridge = 7,
    Ipv6 = 10,
}

impl Family {
    pub const ALL: [Family; 6] = [
        Family::Inet,
        Family::Ipv4,
        Family::Arp,
        Family::Netdev,
        Family::Bridge,
        Family::Ipv6,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_unspec(self) -> bool {
        self == Family::Unspec
    }

    /// True when `self` used as a filter selects objects of `family`.
    pub fn matches(self, family: Family) -> bool {
        self.is_unspec() || self == family
    }

    pub fn name(self) -> &'static str {
        match self {
            Family::Unspec => "unspec",
            Family::Inet => "inet",
            Family::Ipv4 => "ip",
            Family::Arp => "arp",
            Family::Netdev => "netdev",
            Family::Bridge => "bridge",
            Family::Ipv6 => "ip6",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "unspec" => Some(Family::Unspec),
            "inet" => Some(Family::Inet),
            "ip" | "ipv4" => Some(Family::Ipv4),
            "arp" => Some(Family::Arp),
            "netdev" => Some(Family::Netdev),
            "bridge" => Some(Family::Bridge),
            "ip6" | "ipv6" => Some(Family::Ipv6),
            _ => None,
        }
    }
}

impl TryFrom<u8> for Family {
    type Error = NftError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Family::Unspec),
            1 => Ok(Family::Inet),
            2 => Ok(Family::Ipv4),
            3 => Ok(Family::Arp),
            5 => Ok(Family::Netdev),
            7 => Ok(Family::Bridge),
            10 => Ok(Family::Ipv6),
            other => Err(NftError::unsupported(format!("address family {}", other))),
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
