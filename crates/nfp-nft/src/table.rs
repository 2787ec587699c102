// NEWTABLE / GETTABLE / DELTABLE / DESTROYTABLE
use nfp_core::{
    Limits, NamespaceGuard, NftError, Result, Table, TableFilter, TableFlags, TableKey,
    ownership,
};
use nfp_nl::consts::*;
use tracing::info;

use crate::command::Request;
use crate::response::{self, Outcome};
use crate::validate;

pub(crate) fn create(
    ns: &mut NamespaceGuard<'_>,
    req: &Request<'_>,
    limits: &Limits,
) -> Result<Outcome> {
    if req.family.is_unspec() {
        return Err(NftError::unsupported("tables need a concrete family"));
    }
    let name = validate::required_name(req.attrs, NFTA_TABLE_NAME, limits, "table")?;

    if let Some(existing) = ns.find_table(req.family, TableKey::Name(&name)) {
        ownership::check_access(existing, req.port)?;
        if req.flags.replace() {
            return Err(NftError::unsupported("table replace"));
        }
        if req.flags.excl() {
            return Err(NftError::exists(format!("table {} {}", req.family, name)));
        }
        let (handle, was_owned) = (existing.handle, existing.is_owned());
        let flags = match req.attrs.u32(NFTA_TABLE_FLAGS)? {
            Some(bits) => TableFlags::from_bits(bits)?,
            None => existing.flags,
        };
        if flags.contains(TableFlags::OWNER) != was_owned {
            return Err(NftError::unsupported("changing table ownership"));
        }
        let userdata = validate::userdata(req.attrs, NFTA_TABLE_USERDATA, limits)?;
        ns.update_table(handle, flags, userdata)?;
        info!(table = %name, family = %req.family, flags = flags.bits(), "updated table");
        return Ok(Outcome::Ack);
    }

    if req.flags.replace() {
        return Err(NftError::unsupported("table replace"));
    }
    let flags = TableFlags::from_bits(req.attrs.u32(NFTA_TABLE_FLAGS)?.unwrap_or(0))?;
    let userdata = validate::userdata(req.attrs, NFTA_TABLE_USERDATA, limits)?;

    let mut table = Table::new(ns.next_handle(), req.family, &name, flags);
    table.userdata = userdata;
    if flags.contains(TableFlags::OWNER) {
        table.owner = Some(req.port);
    }
    let handle = ns.insert_table(table);
    info!(table = %name, family = %req.family, handle, "created table");
    Ok(Outcome::Ack)
}

pub(crate) fn get(
    ns: &NamespaceGuard<'_>,
    req: &Request<'_>,
    limits: &Limits,
) -> Result<Outcome> {
    if req.flags.dump() {
        let tables = ns
            .tables()
            .filter(|t| req.family.matches(t.family) && ownership::is_visible(t, req.port))
            .map(response::table)
            .collect();
        return Ok(Outcome::Dump(tables));
    }

    let name = validate::required_name(req.attrs, NFTA_TABLE_NAME, limits, "table")?;
    let table = ns.lookup_table(req.family, TableKey::Name(&name), req.port)?;
    Ok(Outcome::Object(response::table(table)))
}

pub(crate) fn delete(
    ns: &mut NamespaceGuard<'_>,
    req: &Request<'_>,
    limits: &Limits,
) -> Result<Outcome> {
    let name = validate::name(req.attrs, NFTA_TABLE_NAME, limits, "table")?;
    let handle = req.attrs.u64(NFTA_TABLE_HANDLE)?;

    if req.family.is_unspec() || (name.is_none() && handle.is_none()) {
        let filter = TableFilter {
            family: req.family,
            name: name.as_deref(),
            handle,
        };
        let removed = ns.remove_tables(filter, req.port);
        info!(family = %req.family, removed, "flushed tables");
        return Ok(Outcome::Ack);
    }

    let key = match (handle, name.as_deref()) {
        (Some(handle), _) => TableKey::Handle(handle),
        (None, Some(name)) => TableKey::Name(name),
        (None, None) => return Err(NftError::invalid("table delete without name or handle")),
    };
    let handle = match ns.lookup_table(req.family, key, req.port) {
        Ok(table) => table.handle,
        Err(e) if e.is_not_found() && req.is_destroy() => return Ok(Outcome::Ack),
        Err(e) => return Err(e),
    };
    if let Some(table) = ns.remove_table(handle) {
        info!(table = %table.name, family = %table.family, handle, "deleted table");
    }
    Ok(Outcome::Ack)
}
