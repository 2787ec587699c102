use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{NftError, Result};
use crate::family::Family;
use crate::model::{Chain, PortId, Rule, Table, TableFlags};
use crate::ownership;
use crate::registry::hook_name;
use crate::status::{ChainStatus, NamespaceStatus, TableStatus};

/// How a request names a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKey<'a> {
    Name(&'a str),
    Handle(u64),
}

/// Selection for table flushes; `None` fields match everything.
#[derive(Debug, Clone, Copy)]
pub struct TableFilter<'a> {
    pub family: Family,
    pub name: Option<&'a str>,
    pub handle: Option<u64>,
}

impl TableFilter<'_> {
    fn matches(&self, table: &Table) -> bool {
        self.family.matches(table.family)
            && self.name.is_none_or(|name| name == table.name)
            && self.handle.is_none_or(|handle| handle == table.handle)
    }
}

/// Where a new rule lands in its chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Tail,
    Before(u64),
    After(u64),
}

/// Tables, chains and rules keyed by handle.
///
/// Handles double as keys, so iteration order is creation order. Cross
/// references (table -> chains, chain -> rules) hold handles and are kept
/// consistent by the mutation methods below.
#[derive(Debug, Default)]
pub struct Store {
    tables: BTreeMap<u64, Table>,
    chains: BTreeMap<u64, Chain>,
    rules: BTreeMap<u64, Rule>,
    generation: u32,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    fn bump(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    // Tables

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    pub fn table(&self, handle: u64) -> Option<&Table> {
        self.tables.get(&handle)
    }

    pub fn find_table(&self, family: Family, key: TableKey<'_>) -> Option<&Table> {
        if family.is_unspec() {
            return None;
        }
        match key {
            TableKey::Handle(handle) => self.tables.get(&handle).filter(|t| t.family == family),
            TableKey::Name(name) => self
                .tables
                .values()
                .find(|t| t.family == family && t.name == name),
        }
    }

    /// Existence check followed by the ownership gate.
    pub fn lookup_table(&self, family: Family, key: TableKey<'_>, port: PortId) -> Result<&Table> {
        let table = self.find_table(family, key).ok_or_else(|| match key {
            TableKey::Name(name) => NftError::not_found(format!("table {} {}", family, name)),
            TableKey::Handle(handle) => {
                NftError::not_found(format!("table {} handle {}", family, handle))
            }
        })?;
        ownership::check_access(table, port)?;
        Ok(table)
    }

    pub fn insert_table(&mut self, table: Table) -> u64 {
        let handle = table.handle;
        debug!(handle, name = %table.name, family = %table.family, "insert table");
        self.tables.insert(handle, table);
        self.bump();
        handle
    }

    /// Replace mutable table attributes in place.
    pub fn update_table(
        &mut self,
        handle: u64,
        flags: TableFlags,
        userdata: Option<Vec<u8>>,
    ) -> Result<()> {
        let table = self
            .tables
            .get_mut(&handle)
            .ok_or_else(|| NftError::not_found(format!("table handle {}", handle)))?;
        table.flags = flags;
        if userdata.is_some() {
            table.userdata = userdata;
        }
        self.bump();
        Ok(())
    }

    /// Delete a table with all of its chains and rules.
    pub fn remove_table(&mut self, handle: u64) -> Option<Table> {
        let chains = self.tables.get(&handle)?.chains.clone();
        for chain in chains {
            self.remove_chain(chain);
        }
        let table = self.tables.remove(&handle);
        if let Some(table) = &table {
            debug!(handle, name = %table.name, "remove table");
            self.bump();
        }
        table
    }

    /// Delete every table matching `filter` that `port` may touch.
    pub fn remove_tables(&mut self, filter: TableFilter<'_>, port: PortId) -> usize {
        let doomed: Vec<u64> = self
            .tables
            .values()
            .filter(|t| filter.matches(t) && ownership::is_visible(t, port))
            .map(|t| t.handle)
            .collect();
        for handle in &doomed {
            self.remove_table(*handle);
        }
        doomed.len()
    }

    /// Forget a closed connection: drop its owner tables unless they persist.
    pub fn release_port(&mut self, port: PortId) -> usize {
        let owned: Vec<u64> = self
            .tables
            .values()
            .filter(|t| t.is_owned() && t.owner == Some(port))
            .map(|t| t.handle)
            .collect();
        for handle in &owned {
            let persist = self
                .tables
                .get(handle)
                .is_some_and(|t| t.flags.contains(TableFlags::PERSIST));
            if persist {
                if let Some(table) = self.tables.get_mut(handle) {
                    table.flags = table.flags.without(TableFlags::OWNER);
                    table.owner = None;
                }
                self.bump();
            } else {
                self.remove_table(*handle);
            }
        }
        owned.len()
    }

    // Chains

    pub fn chain(&self, handle: u64) -> Option<&Chain> {
        self.chains.get(&handle)
    }

    pub fn chains_of(&self, table: u64) -> impl Iterator<Item = &Chain> {
        self.tables
            .get(&table)
            .into_iter()
            .flat_map(|t| t.chains.iter())
            .filter_map(|handle| self.chains.get(handle))
    }

    pub fn find_chain(&self, table: u64, name: &str) -> Option<&Chain> {
        self.chains_of(table)
            .find(|c| c.name.as_deref() == Some(name))
    }

    pub fn find_chain_by_handle(&self, table: u64, handle: u64) -> Option<&Chain> {
        self.chains.get(&handle).filter(|c| c.table == table)
    }

    pub fn find_chain_by_id(&self, table: u64, id: u32) -> Option<&Chain> {
        self.chains_of(table).find(|c| c.id == Some(id))
    }

    pub fn insert_chain(&mut self, chain: Chain) -> Result<u64> {
        let handle = chain.handle;
        let table = self
            .tables
            .get_mut(&chain.table)
            .ok_or_else(|| NftError::not_found(format!("table handle {}", chain.table)))?;
        table.chains.push(handle);
        debug!(handle, table = chain.table, name = %chain.label(), "insert chain");
        self.chains.insert(handle, chain);
        self.bump();
        Ok(handle)
    }

    /// Delete a chain after flushing its rules.
    pub fn remove_chain(&mut self, handle: u64) -> Option<Chain> {
        if !self.chains.contains_key(&handle) {
            return None;
        }
        self.flush_chain(handle);
        let chain = self.chains.remove(&handle)?;
        if let Some(table) = self.tables.get_mut(&chain.table) {
            table.chains.retain(|c| *c != handle);
        }
        debug!(handle, name = %chain.label(), "remove chain");
        self.bump();
        Some(chain)
    }

    // Rules

    pub fn rule(&self, handle: u64) -> Option<&Rule> {
        self.rules.get(&handle)
    }

    pub fn rules_of(&self, chain: u64) -> impl Iterator<Item = &Rule> {
        self.chains
            .get(&chain)
            .into_iter()
            .flat_map(|c| c.rules.iter())
            .filter_map(|handle| self.rules.get(handle))
    }

    pub fn find_rule(&self, chain: u64, handle: u64) -> Option<&Rule> {
        self.rules.get(&handle).filter(|r| r.chain == chain)
    }

    /// Handle of the rule evaluated just before `handle`, if any.
    pub fn previous_rule(&self, chain: u64, handle: u64) -> Option<u64> {
        let rules = &self.chains.get(&chain)?.rules;
        let index = rules.iter().position(|r| *r == handle)?;
        index.checked_sub(1).map(|prev| rules[prev])
    }

    /// Link a rule into its chain and take references on the chains it jumps to.
    pub fn insert_rule(&mut self, rule: Rule, placement: Placement) -> Result<u64> {
        let handle = rule.handle;
        let chain = self
            .chains
            .get_mut(&rule.chain)
            .ok_or_else(|| NftError::not_found(format!("chain handle {}", rule.chain)))?;
        let index = match placement {
            Placement::Tail => chain.rules.len(),
            Placement::Before(anchor) | Placement::After(anchor) => {
                let at = chain
                    .rules
                    .iter()
                    .position(|r| *r == anchor)
                    .ok_or_else(|| NftError::not_found(format!("rule handle {}", anchor)))?;
                if matches!(placement, Placement::After(_)) {
                    at + 1
                } else {
                    at
                }
            }
        };
        chain.rules.insert(index, handle);

        let targets: Vec<u64> = rule.chain_references().collect();
        for target in targets {
            if let Some(target) = self.chains.get_mut(&target) {
                target.use_count += 1;
                if target.is_binding() {
                    target.bound_to = Some(handle);
                }
            }
        }
        debug!(handle, chain = rule.chain, ?placement, "insert rule");
        self.rules.insert(handle, rule);
        self.bump();
        Ok(handle)
    }

    /// Unlink a rule, dropping its chain references and any binding chain it owned.
    pub fn remove_rule(&mut self, handle: u64) -> Option<Rule> {
        let rule = self.rules.remove(&handle)?;
        if let Some(chain) = self.chains.get_mut(&rule.chain) {
            chain.rules.retain(|r| *r != handle);
        }
        for target in rule.chain_references() {
            let owned = match self.chains.get_mut(&target) {
                Some(chain) => {
                    chain.use_count = chain.use_count.saturating_sub(1);
                    chain.bound_to == Some(handle)
                }
                None => false,
            };
            if owned {
                self.remove_chain(target);
            }
        }
        debug!(handle, chain = rule.chain, "remove rule");
        self.bump();
        Some(rule)
    }

    /// Remove every rule of a chain, returning how many were removed.
    pub fn flush_chain(&mut self, chain: u64) -> usize {
        let rules = match self.chains.get(&chain) {
            Some(chain) => chain.rules.clone(),
            None => return 0,
        };
        for rule in &rules {
            self.remove_rule(*rule);
        }
        rules.len()
    }

    pub fn status(&self) -> NamespaceStatus {
        let tables = self
            .tables
            .values()
            .map(|table| TableStatus {
                name: table.name.clone(),
                family: table.family.to_string(),
                handle: table.handle,
                flags: table.flags.bits(),
                owner: table.owner.map(|p| p.0),
                chains: self
                    .chains_of(table.handle)
                    .map(|chain| ChainStatus {
                        name: chain.label(),
                        handle: chain.handle,
                        hook: chain
                            .base
                            .map(|b| hook_name(table.family, b.hooknum).to_string()),
                        policy: chain.base.map(|b| b.policy.name().to_string()),
                        use_count: chain.use_count,
                        rules: chain.rules.len(),
                    })
                    .collect(),
            })
            .collect();

        NamespaceStatus {
            generation: self.generation,
            tables,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{Expression, Immediate, ImmediateData, Register, Verdict};
    use crate::model::ChainFlags;

    fn table(store: &mut Store, handle: u64, family: Family, name: &str) -> u64 {
        store.insert_table(Table::new(handle, family, name, TableFlags::default()))
    }

    fn chain(store: &mut Store, handle: u64, table: u64, name: Option<&str>, flags: u32) -> u64 {
        store
            .insert_chain(Chain::new(
                handle,
                table,
                name.map(str::to_string),
                ChainFlags::from_bits_retain(flags),
            ))
            .unwrap()
    }

    fn rule(handle: u64, chain: u64, verdict: Verdict) -> Rule {
        Rule {
            handle,
            chain,
            userdata: None,
            expressions: vec![Expression::Immediate(Immediate {
                dreg: Register::Verdict,
                data: ImmediateData::Verdict(verdict),
            })],
        }
    }

    #[test]
    fn find_table_never_matches_unspec() {
        let mut store = Store::new();
        table(&mut store, 1, Family::Ipv4, "t");
        assert!(store.find_table(Family::Ipv4, TableKey::Name("t")).is_some());
        assert!(store.find_table(Family::Unspec, TableKey::Name("t")).is_none());
        assert!(store.find_table(Family::Ipv6, TableKey::Handle(1)).is_none());
    }

    #[test]
    fn remove_tables_by_name_across_families() {
        let mut store = Store::new();
        table(&mut store, 1, Family::Ipv4, "t");
        table(&mut store, 2, Family::Ipv6, "t");
        table(&mut store, 3, Family::Ipv6, "other");

        let filter = TableFilter {
            family: Family::Unspec,
            name: Some("t"),
            handle: None,
        };
        assert_eq!(store.remove_tables(filter, PortId(1)), 2);
        assert_eq!(store.tables().count(), 1);
        assert!(store.find_table(Family::Ipv6, TableKey::Name("other")).is_some());
    }

    #[test]
    fn remove_table_cascades() {
        let mut store = Store::new();
        let t = table(&mut store, 1, Family::Inet, "t");
        let c = chain(&mut store, 2, t, Some("c"), 0);
        store.insert_rule(rule(3, c, Verdict::Accept), Placement::Tail).unwrap();

        store.remove_table(t);
        assert!(store.chain(c).is_none());
        assert!(store.rule(3).is_none());
    }

    #[test]
    fn rule_placement_before_and_after() {
        let mut store = Store::new();
        let t = table(&mut store, 1, Family::Inet, "t");
        let c = chain(&mut store, 2, t, Some("c"), 0);
        store.insert_rule(rule(10, c, Verdict::Accept), Placement::Tail).unwrap();
        store.insert_rule(rule(11, c, Verdict::Drop), Placement::Before(10)).unwrap();
        store.insert_rule(rule(12, c, Verdict::Drop), Placement::After(10)).unwrap();

        let order: Vec<u64> = store.rules_of(c).map(|r| r.handle).collect();
        assert_eq!(order, vec![11, 10, 12]);
        assert_eq!(store.previous_rule(c, 10), Some(11));
        assert_eq!(store.previous_rule(c, 11), None);
        assert!(store.insert_rule(rule(13, c, Verdict::Drop), Placement::After(99)).is_err());
    }

    #[test]
    fn jump_takes_reference_and_binds() {
        let mut store = Store::new();
        let t = table(&mut store, 1, Family::Inet, "t");
        let base = chain(&mut store, 2, t, Some("input"), 0);
        let bound = chain(&mut store, 3, t, None, ChainFlags::BINDING);
        store.insert_rule(rule(4, bound, Verdict::Accept), Placement::Tail).unwrap();
        store.insert_rule(rule(5, base, Verdict::Jump(bound)), Placement::Tail).unwrap();

        let target = store.chain(bound).unwrap();
        assert_eq!(target.use_count, 1);
        assert_eq!(target.bound_to, Some(5));

        store.remove_rule(5);
        assert!(store.chain(bound).is_none());
        assert!(store.rule(4).is_none());
    }

    #[test]
    fn regular_jump_target_survives_rule_removal() {
        let mut store = Store::new();
        let t = table(&mut store, 1, Family::Inet, "t");
        let from = chain(&mut store, 2, t, Some("from"), 0);
        let to = chain(&mut store, 3, t, Some("to"), 0);
        store.insert_rule(rule(4, from, Verdict::Goto(to)), Placement::Tail).unwrap();
        assert_eq!(store.chain(to).unwrap().use_count, 1);

        store.flush_chain(from);
        assert_eq!(store.chain(to).unwrap().use_count, 0);
    }

    #[test]
    fn release_port_keeps_persistent_tables() {
        let mut store = Store::new();
        let owned = TableFlags::from_bits(TableFlags::OWNER).unwrap();
        let persistent = TableFlags::from_bits(TableFlags::OWNER | TableFlags::PERSIST).unwrap();

        let mut gone = Table::new(1, Family::Inet, "gone", owned);
        gone.owner = Some(PortId(9));
        let mut kept = Table::new(2, Family::Inet, "kept", persistent);
        kept.owner = Some(PortId(9));
        store.insert_table(gone);
        store.insert_table(kept);

        assert_eq!(store.release_port(PortId(9)), 2);
        assert!(store.table(1).is_none());
        let kept = store.table(2).unwrap();
        assert!(!kept.is_owned());
        assert_eq!(kept.owner, None);
    }

    #[test]
    fn generation_advances_on_mutation() {
        let mut store = Store::new();
        let before = store.generation();
        table(&mut store, 1, Family::Inet, "t");
        assert!(store.generation() > before);
    }
}
