// Object encoders for get/dump replies
use nfp_core::{Chain, Family, Rule, Store, Table};
use nfp_nl::consts::*;
use nfp_nl::{Attr, NftMsg};

use crate::expr;

/// One object message to send back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectReply {
    pub msg: NftMsg,
    pub family: Family,
    pub attrs: Vec<Attr>,
}

/// What a handler produced for its request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Mutation done; acked only on request.
    Ack,
    Object(ObjectReply),
    Dump(Vec<ObjectReply>),
}

pub(crate) fn table(table: &Table) -> ObjectReply {
    let mut attrs = vec![
        Attr::string(NFTA_TABLE_NAME, &table.name),
        Attr::u32(NFTA_TABLE_FLAGS, table.flags.bits()),
        Attr::u32(NFTA_TABLE_USE, table.chain_count()),
        Attr::u64(NFTA_TABLE_HANDLE, table.handle),
    ];
    if let Some(userdata) = &table.userdata {
        attrs.push(Attr::bytes(NFTA_TABLE_USERDATA, userdata.clone()));
    }
    if let (true, Some(owner)) = (table.is_owned(), table.owner) {
        attrs.push(Attr::u32(NFTA_TABLE_OWNER, owner.0));
    }
    ObjectReply {
        msg: NftMsg::NewTable,
        family: table.family,
        attrs,
    }
}

pub(crate) fn chain(table: &Table, chain: &Chain) -> ObjectReply {
    let mut attrs = vec![Attr::string(NFTA_CHAIN_TABLE, &table.name)];
    if let Some(name) = &chain.name {
        attrs.push(Attr::string(NFTA_CHAIN_NAME, name));
    }
    attrs.push(Attr::u64(NFTA_CHAIN_HANDLE, chain.handle));
    if let Some(base) = &chain.base {
        attrs.push(Attr::nested(
            NFTA_CHAIN_HOOK,
            vec![
                Attr::u32(NFTA_HOOK_HOOKNUM, base.hooknum),
                Attr::i32(NFTA_HOOK_PRIORITY, base.priority),
            ],
        ));
        attrs.push(Attr::u32(NFTA_CHAIN_POLICY, base.policy.code()));
        attrs.push(Attr::string(NFTA_CHAIN_TYPE, base.chain_type.name()));
    }
    attrs.push(Attr::u32(NFTA_CHAIN_USE, chain.use_count));
    attrs.push(Attr::u32(NFTA_CHAIN_FLAGS, chain.flags.bits()));
    if let Some(id) = chain.id {
        attrs.push(Attr::u32(NFTA_CHAIN_ID, id));
    }
    if let Some(userdata) = &chain.userdata {
        attrs.push(Attr::bytes(NFTA_CHAIN_USERDATA, userdata.clone()));
    }
    ObjectReply {
        msg: NftMsg::NewChain,
        family: table.family,
        attrs,
    }
}

pub(crate) fn rule(store: &Store, table: &Table, chain: &Chain, rule: &Rule) -> ObjectReply {
    let mut attrs = vec![Attr::string(NFTA_RULE_TABLE, &table.name)];
    match &chain.name {
        Some(name) => attrs.push(Attr::string(NFTA_RULE_CHAIN, name)),
        None => {
            if let Some(id) = chain.id {
                attrs.push(Attr::u32(NFTA_RULE_CHAIN_ID, id));
            }
        }
    }
    attrs.push(Attr::u64(NFTA_RULE_HANDLE, rule.handle));
    if let Some(prev) = store.previous_rule(chain.handle, rule.handle) {
        attrs.push(Attr::u64(NFTA_RULE_POSITION, prev));
    }
    attrs.push(expr::encode_list(store, &rule.expressions));
    if let Some(userdata) = &rule.userdata {
        attrs.push(Attr::bytes(NFTA_RULE_USERDATA, userdata.clone()));
    }
    ObjectReply {
        msg: NftMsg::NewRule,
        family: table.family,
        attrs,
    }
}

pub(crate) fn generation(store: &Store) -> ObjectReply {
    ObjectReply {
        msg: NftMsg::NewGen,
        family: Family::Unspec,
        attrs: vec![Attr::u32(NFTA_GEN_ID, store.generation())],
    }
}
