// NEWRULE / GETRULE / DELRULE / DESTROYRULE
use nfp_core::{Chain, Limits, NamespaceGuard, NftError, Placement, Result, Rule, TableKey};
use nfp_nl::consts::*;
use tracing::{debug, info};

use crate::command::Request;
use crate::expr::{self, TableScope};
use crate::response::{self, Outcome};
use crate::validate;

fn table_handle(ns: &NamespaceGuard<'_>, req: &Request<'_>, limits: &Limits) -> Result<u64> {
    let name = validate::required_name(req.attrs, NFTA_RULE_TABLE, limits, "table")?;
    Ok(ns.lookup_table(req.family, TableKey::Name(&name), req.port)?.handle)
}

/// Chain named by `NFTA_RULE_CHAIN` or `NFTA_RULE_CHAIN_ID`, if the request names one.
fn named_chain<'a>(
    ns: &'a NamespaceGuard<'_>,
    table: u64,
    req: &Request<'_>,
) -> Result<Option<&'a Chain>> {
    let attrs = req.attrs;
    if let Some(name) = attrs.string(NFTA_RULE_CHAIN)? {
        let chain = ns
            .find_chain(table, name)
            .ok_or_else(|| NftError::not_found(format!("chain {}", name)))?;
        return Ok(Some(chain));
    }
    if let Some(id) = attrs.u32(NFTA_RULE_CHAIN_ID)? {
        let chain = ns
            .find_chain_by_id(table, id)
            .ok_or_else(|| NftError::not_found(format!("chain id {}", id)))?;
        return Ok(Some(chain));
    }
    Ok(None)
}

fn required_chain<'a>(
    ns: &'a NamespaceGuard<'_>,
    table: u64,
    req: &Request<'_>,
) -> Result<&'a Chain> {
    named_chain(ns, table, req)?.ok_or_else(|| NftError::invalid("rule without a chain"))
}

pub(crate) fn create(
    ns: &mut NamespaceGuard<'_>,
    req: &Request<'_>,
    limits: &Limits,
) -> Result<Outcome> {
    let attrs = req.attrs;
    let table = table_handle(ns, req, limits)?;
    let chain = required_chain(ns, table, req)?;
    if chain.is_binding() && chain.is_bound() {
        return Err(NftError::unsupported(format!(
            "chain {} is bound to a rule",
            chain.label()
        )));
    }
    let (chain, chain_label) = (chain.handle, chain.label());

    if req.flags.replace() {
        return Err(NftError::unsupported("rule replace"));
    }

    let placement = if let Some(handle) = attrs.u64(NFTA_RULE_HANDLE)? {
        if ns.find_rule(chain, handle).is_none() {
            return Err(NftError::not_found(format!("rule handle {}", handle)));
        }
        if req.flags.excl() {
            return Err(NftError::exists(format!("rule handle {}", handle)));
        }
        return Err(NftError::unsupported("rule update"));
    } else if let Some(position) = attrs.u64(NFTA_RULE_POSITION)? {
        if ns.find_rule(chain, position).is_none() {
            return Err(NftError::not_found(format!("rule position {}", position)));
        }
        if req.flags.append() {
            Placement::After(position)
        } else {
            Placement::Before(position)
        }
    } else if req.flags.create() || req.flags.append() {
        Placement::Tail
    } else {
        return Err(NftError::invalid("rule without handle or position needs create or append"));
    };

    let expressions = match attrs.get(NFTA_RULE_EXPRESSIONS) {
        Some(list) => {
            let scope = TableScope {
                store: &**ns,
                table,
                chain,
            };
            expr::compile_list(list, &scope, limits)?
        }
        None => vec![],
    };
    let userdata = validate::userdata(attrs, NFTA_RULE_USERDATA, limits)?;

    let rule = Rule {
        handle: ns.next_handle(),
        chain,
        userdata,
        expressions,
    };
    let exprs = rule.expressions.len();
    let handle = ns.insert_rule(rule, placement)?;
    info!(chain = %chain_label, handle, ?placement, exprs, "created rule");
    Ok(Outcome::Ack)
}

pub(crate) fn get(
    ns: &NamespaceGuard<'_>,
    req: &Request<'_>,
    limits: &Limits,
) -> Result<Outcome> {
    let table = table_handle(ns, req, limits)?;
    let Some(table) = ns.table(table) else {
        return Err(NftError::not_found("table"));
    };

    if req.flags.dump() {
        let chains: Vec<&Chain> = match named_chain(ns, table.handle, req)? {
            Some(chain) => vec![chain],
            None => ns.chains_of(table.handle).collect(),
        };
        let rules = chains
            .into_iter()
            .flat_map(|chain| {
                ns.rules_of(chain.handle)
                    .map(move |rule| response::rule(ns, table, chain, rule))
            })
            .collect();
        return Ok(Outcome::Dump(rules));
    }

    let chain = required_chain(ns, table.handle, req)?;
    let handle = req
        .attrs
        .u64(NFTA_RULE_HANDLE)?
        .ok_or_else(|| NftError::invalid("rule get without a handle"))?;
    let rule = ns
        .find_rule(chain.handle, handle)
        .ok_or_else(|| NftError::not_found(format!("rule handle {}", handle)))?;
    Ok(Outcome::Object(response::rule(ns, table, chain, rule)))
}

pub(crate) fn delete(
    ns: &mut NamespaceGuard<'_>,
    req: &Request<'_>,
    limits: &Limits,
) -> Result<Outcome> {
    let attrs = req.attrs;
    let table = table_handle(ns, req, limits)?;

    let chain = match named_chain(ns, table, req) {
        Ok(chain) => chain,
        Err(e) if e.is_not_found() && req.is_destroy() => return Ok(Outcome::Ack),
        Err(e) => return Err(e),
    };
    if let Some(chain) = chain {
        if chain.is_binding() && chain.is_bound() {
            return Err(NftError::unsupported(format!(
                "rules of bound chain {}",
                chain.label()
            )));
        }
    }
    let chain = chain.map(|c| c.handle);

    match (chain, attrs.u64(NFTA_RULE_HANDLE)?) {
        (Some(chain), Some(handle)) => {
            if ns.find_rule(chain, handle).is_none() {
                if req.is_destroy() {
                    return Ok(Outcome::Ack);
                }
                return Err(NftError::not_found(format!("rule handle {}", handle)));
            }
            ns.remove_rule(handle);
            info!(handle, "deleted rule");
        }
        (None, Some(_)) => return Err(NftError::invalid("rule delete by handle without a chain")),
        (Some(chain), None) => {
            let removed = ns.flush_chain(chain);
            debug!(chain, removed, "flushed chain");
        }
        (None, None) => {
            let chains: Vec<u64> = ns
                .chains_of(table)
                .filter(|c| !(c.is_binding() && c.is_bound()))
                .map(|c| c.handle)
                .collect();
            let removed: usize = chains.into_iter().map(|c| ns.flush_chain(c)).sum();
            debug!(table, removed, "flushed table rules");
        }
    }
    Ok(Outcome::Ack)
}
