// nfnetlink / nf_tables protocol numbers

pub const NFNL_SUBSYS_NFTABLES: u8 = 10;
pub const NFNETLINK_V0: u8 = 0;

pub const NLMSG_HDRLEN: usize = 16;
pub const NFGENMSG_LEN: usize = 4;

pub const NLMSG_ERROR: u16 = 2;
pub const NLMSG_DONE: u16 = 3;

pub const NLM_F_REQUEST: u16 = 0x1;
pub const NLM_F_MULTI: u16 = 0x2;
pub const NLM_F_ACK: u16 = 0x4;
pub const NLM_F_ECHO: u16 = 0x8;
// GET modifiers
pub const NLM_F_ROOT: u16 = 0x100;
pub const NLM_F_MATCH: u16 = 0x200;
pub const NLM_F_DUMP: u16 = NLM_F_ROOT | NLM_F_MATCH;
// NEW modifiers
pub const NLM_F_REPLACE: u16 = 0x100;
pub const NLM_F_EXCL: u16 = 0x200;
pub const NLM_F_CREATE: u16 = 0x400;
pub const NLM_F_APPEND: u16 = 0x800;

pub const NFTA_TABLE_NAME: u16 = 1;
pub const NFTA_TABLE_FLAGS: u16 = 2;
pub const NFTA_TABLE_USE: u16 = 3;
pub const NFTA_TABLE_HANDLE: u16 = 4;
pub const NFTA_TABLE_PAD: u16 = 5;
pub const NFTA_TABLE_USERDATA: u16 = 6;
pub const NFTA_TABLE_OWNER: u16 = 7;

pub const NFTA_CHAIN_TABLE: u16 = 1;
pub const NFTA_CHAIN_HANDLE: u16 = 2;
pub const NFTA_CHAIN_NAME: u16 = 3;
pub const NFTA_CHAIN_HOOK: u16 = 4;
pub const NFTA_CHAIN_POLICY: u16 = 5;
pub const NFTA_CHAIN_USE: u16 = 6;
pub const NFTA_CHAIN_TYPE: u16 = 7;
pub const NFTA_CHAIN_COUNTERS: u16 = 8;
pub const NFTA_CHAIN_PAD: u16 = 9;
pub const NFTA_CHAIN_FLAGS: u16 = 10;
pub const NFTA_CHAIN_ID: u16 = 11;
pub const NFTA_CHAIN_USERDATA: u16 = 12;

pub const NFTA_HOOK_HOOKNUM: u16 = 1;
pub const NFTA_HOOK_PRIORITY: u16 = 2;
pub const NFTA_HOOK_DEV: u16 = 3;
pub const NFTA_HOOK_DEVS: u16 = 4;

pub const NFTA_RULE_TABLE: u16 = 1;
pub const NFTA_RULE_CHAIN: u16 = 2;
pub const NFTA_RULE_HANDLE: u16 = 3;
pub const NFTA_RULE_EXPRESSIONS: u16 = 4;
pub const NFTA_RULE_COMPAT: u16 = 5;
pub const NFTA_RULE_POSITION: u16 = 6;
pub const NFTA_RULE_USERDATA: u16 = 7;
pub const NFTA_RULE_PAD: u16 = 8;
pub const NFTA_RULE_ID: u16 = 9;
pub const NFTA_RULE_POSITION_ID: u16 = 10;
pub const NFTA_RULE_CHAIN_ID: u16 = 11;

pub const NFTA_LIST_ELEM: u16 = 1;

pub const NFTA_EXPR_NAME: u16 = 1;
pub const NFTA_EXPR_DATA: u16 = 2;

pub const NFTA_IMMEDIATE_DREG: u16 = 1;
pub const NFTA_IMMEDIATE_DATA: u16 = 2;

pub const NFTA_DATA_VALUE: u16 = 1;
pub const NFTA_DATA_VERDICT: u16 = 2;

pub const NFTA_VERDICT_CODE: u16 = 1;
pub const NFTA_VERDICT_CHAIN: u16 = 2;
pub const NFTA_VERDICT_CHAIN_ID: u16 = 3;

pub const NFTA_GEN_ID: u16 = 1;

/// nf_tables message ids (low byte of the netlink message type).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NftMsg {
    NewTable = 0,
    GetTable = 1,
    DelTable = 2,
    NewChain = 3,
    GetChain = 4,
    DelChain = 5,
    NewRule = 6,
    GetRule = 7,
    DelRule = 8,
    NewGen = 15,
    GetGen = 16,
    DestroyTable = 26,
    DestroyChain = 27,
    DestroyRule = 28,
}

impl NftMsg {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => NftMsg::NewTable,
            1 => NftMsg::GetTable,
            2 => NftMsg::DelTable,
            3 => NftMsg::NewChain,
            4 => NftMsg::GetChain,
            5 => NftMsg::DelChain,
            6 => NftMsg::NewRule,
            7 => NftMsg::GetRule,
            8 => NftMsg::DelRule,
            15 => NftMsg::NewGen,
            16 => NftMsg::GetGen,
            26 => NftMsg::DestroyTable,
            27 => NftMsg::DestroyChain,
            28 => NftMsg::DestroyRule,
            _ => return None,
        })
    }

    /// Full netlink message type including the subsystem id.
    pub fn message_type(self) -> u16 {
        (u16::from(NFNL_SUBSYS_NFTABLES) << 8) | self as u16
    }

    /// Split a netlink message type into subsystem and message id.
    pub fn from_message_type(message_type: u16) -> Option<Self> {
        if (message_type >> 8) as u8 != NFNL_SUBSYS_NFTABLES {
            return None;
        }
        Self::from_u8((message_type & 0xff) as u8)
    }

    pub fn name(self) -> &'static str {
        match self {
            NftMsg::NewTable => "newtable",
            NftMsg::GetTable => "gettable",
            NftMsg::DelTable => "deltable",
            NftMsg::NewChain => "newchain",
            NftMsg::GetChain => "getchain",
            NftMsg::DelChain => "delchain",
            NftMsg::NewRule => "newrule",
            NftMsg::GetRule => "getrule",
            NftMsg::DelRule => "delrule",
            NftMsg::NewGen => "newgen",
            NftMsg::GetGen => "getgen",
            NftMsg::DestroyTable => "destroytable",
            NftMsg::DestroyChain => "destroychain",
            NftMsg::DestroyRule => "destroyrule",
        }
    }
}
