// NEWCHAIN / GETCHAIN / DELCHAIN / DESTROYCHAIN
use nfp_core::{
    BaseChain, Chain, ChainFlags, ChainType, Family, Limits, NamespaceGuard, NftError, Policy,
    Result, Table, TableKey, ownership,
};
use nfp_nl::consts::*;
use nfp_nl::Attributes;
use tracing::info;

use crate::command::Request;
use crate::response::{self, Outcome};
use crate::validate;

// Chain type may also travel inside the hook nest.
const NFTA_HOOK_TYPE: u16 = NFTA_CHAIN_TYPE;

/// Resolve `NFTA_CHAIN_TABLE`: absence is malformed, an unknown name a lookup failure.
fn table_of<'a>(
    ns: &'a NamespaceGuard<'_>,
    req: &Request<'_>,
    limits: &Limits,
) -> Result<&'a Table> {
    let name = validate::required_name(req.attrs, NFTA_CHAIN_TABLE, limits, "table")?;
    ns.lookup_table(req.family, TableKey::Name(&name), req.port)
}

pub(crate) fn create(
    ns: &mut NamespaceGuard<'_>,
    req: &Request<'_>,
    limits: &Limits,
) -> Result<Outcome> {
    let attrs = req.attrs;
    let (table, family, table_name) = {
        let table = table_of(ns, req, limits)?;
        (table.handle, table.family, table.name.clone())
    };
    let name = validate::name(attrs, NFTA_CHAIN_NAME, limits, "chain")?;

    let existing = match attrs.u64(NFTA_CHAIN_HANDLE)? {
        Some(handle) => Some(
            ns.find_chain_by_handle(table, handle)
                .ok_or_else(|| NftError::not_found(format!("chain handle {}", handle)))?,
        ),
        None => name.as_deref().and_then(|n| ns.find_chain(table, n)),
    };

    let raw_flags = attrs.u32(NFTA_CHAIN_FLAGS)?.unwrap_or(0);
    if name.is_none() && existing.is_none() && raw_flags & ChainFlags::BINDING == 0 {
        return Err(NftError::invalid("chain needs a name or the binding flag"));
    }

    let policy = match attrs.u32(NFTA_CHAIN_POLICY)? {
        None => None,
        Some(_) if existing.is_some_and(|c| !c.is_base()) => {
            return Err(NftError::unsupported("policy on a regular chain"));
        }
        Some(_)
            if existing.is_none()
                && raw_flags & ChainFlags::BASE == 0
                && !attrs.contains(NFTA_CHAIN_HOOK) =>
        {
            return Err(NftError::unsupported("policy on a chain without a hook"));
        }
        Some(code) => Some(Policy::from_code(code)?),
    };

    let flags = ChainFlags::from_bits(raw_flags)?;
    if let Some(chain) = existing {
        if req.flags.excl() {
            return Err(NftError::exists(format!("chain {}", chain.label())));
        }
        return Err(NftError::unsupported(format!("updating chain {}", chain.label())));
    }

    if attrs.contains(NFTA_CHAIN_COUNTERS) {
        return Err(NftError::unsupported("chain counters"));
    }
    if flags.contains(ChainFlags::HW_OFFLOAD) {
        return Err(NftError::unsupported("hardware offload"));
    }
    if flags.contains(ChainFlags::BINDING) && attrs.contains(NFTA_CHAIN_HOOK) {
        return Err(NftError::unsupported("binding base chain"));
    }

    let base = if flags.contains(ChainFlags::BASE) || attrs.contains(NFTA_CHAIN_HOOK) {
        Some(base_chain(family, attrs, flags, policy)?)
    } else {
        None
    };

    let userdata = validate::userdata(attrs, NFTA_CHAIN_USERDATA, limits)?;
    let id = attrs.u32(NFTA_CHAIN_ID)?;

    let mut chain = Chain::new(ns.next_handle(), table, name, flags);
    chain.base = base;
    chain.id = id;
    chain.userdata = userdata;
    let label = chain.label();
    let handle = ns.insert_chain(chain)?;
    info!(table = %table_name, chain = %label, handle, base = base.is_some(), "created chain");
    Ok(Outcome::Ack)
}

/// Hook, priority, policy and type of a base chain.
fn base_chain(
    family: Family,
    attrs: &Attributes,
    flags: ChainFlags,
    policy: Option<Policy>,
) -> Result<BaseChain> {
    if !flags.contains(ChainFlags::BASE) {
        return Err(NftError::invalid("hook given without the base chain flag"));
    }
    let hook = attrs
        .nested(NFTA_CHAIN_HOOK)
        .map_err(|e| NftError::invalid(format!("malformed hook: {}", e)))?
        .ok_or_else(|| NftError::invalid("base chain without a hook"))?;

    let hooknum = hook
        .u32(NFTA_HOOK_HOOKNUM)?
        .ok_or_else(|| NftError::not_found("hook number"))?;
    let priority = hook
        .get(NFTA_HOOK_PRIORITY)
        .ok_or_else(|| NftError::not_found("hook priority"))?
        .as_i32()?;
    if hook.contains(NFTA_HOOK_DEV) || hook.contains(NFTA_HOOK_DEVS) {
        return Err(NftError::unsupported("device hooks"));
    }

    let policy = policy.ok_or_else(|| NftError::invalid("base chain without a policy"))?;
    let type_name = match attrs.string(NFTA_CHAIN_TYPE)? {
        Some(name) => name,
        None => hook
            .string(NFTA_HOOK_TYPE)?
            .ok_or_else(|| NftError::invalid("base chain without a type"))?,
    };
    let chain_type = ChainType::from_name(type_name)?;
    chain_type.validate_hook(family, hooknum, priority)?;

    Ok(BaseChain {
        hooknum,
        priority,
        policy,
        chain_type,
    })
}

pub(crate) fn get(
    ns: &NamespaceGuard<'_>,
    req: &Request<'_>,
    limits: &Limits,
) -> Result<Outcome> {
    let attrs = req.attrs;
    if req.flags.dump() {
        if attrs.contains(NFTA_CHAIN_NAME) {
            return Err(NftError::unsupported("dump of a single chain"));
        }
        let table_filter = validate::name(attrs, NFTA_CHAIN_TABLE, limits, "table")?;
        let mut chains = vec![];
        for table in ns.tables().filter(|t| {
            req.family.matches(t.family)
                && ownership::is_visible(t, req.port)
                && table_filter.as_deref().is_none_or(|n| n == t.name)
        }) {
            chains.extend(ns.chains_of(table.handle).map(|c| response::chain(table, c)));
        }
        return Ok(Outcome::Dump(chains));
    }

    let table = table_of(ns, req, limits)?;
    let name = validate::required_name(attrs, NFTA_CHAIN_NAME, limits, "chain")?;
    let chain = ns
        .find_chain(table.handle, &name)
        .ok_or_else(|| NftError::not_found(format!("chain {} in table {}", name, table.name)))?;
    Ok(Outcome::Object(response::chain(table, chain)))
}

pub(crate) fn delete(
    ns: &mut NamespaceGuard<'_>,
    req: &Request<'_>,
    limits: &Limits,
) -> Result<Outcome> {
    let attrs = req.attrs;
    let table = table_of(ns, req, limits)?.handle;

    let found = match (attrs.u64(NFTA_CHAIN_HANDLE)?, attrs.string(NFTA_CHAIN_NAME)?) {
        (Some(handle), _) => ns.find_chain_by_handle(table, handle),
        (None, Some(name)) => ns.find_chain(table, name),
        (None, None) => return Err(NftError::invalid("chain delete without name or handle")),
    };
    let chain = match found {
        Some(chain) => chain,
        None if req.is_destroy() => return Ok(Outcome::Ack),
        None => return Err(NftError::not_found("chain")),
    };

    if chain.is_binding() {
        return Err(NftError::unsupported(format!(
            "binding chain {} is released with its rule",
            chain.label()
        )));
    }
    if chain.use_count > 0 {
        return Err(NftError::busy(format!(
            "chain {} is referenced {} times",
            chain.label(),
            chain.use_count
        )));
    }

    let handle = chain.handle;
    if let Some(chain) = ns.remove_chain(handle) {
        info!(chain = %chain.label(), handle, rules = chain.rules.len(), "deleted chain");
    }
    Ok(Outcome::Ack)
}
