// Declarative YAML rulesets compiled into nf_tables requests
use anyhow::{Context, Result, anyhow, bail};
use nfp_core::{
    ChainFlags, ChainType, Family, NF_ACCEPT, NF_DROP, NFT_BREAK, NFT_CONTINUE, NFT_GOTO,
    NFT_JUMP, NFT_REG_VERDICT, NFT_RETURN, Policy, TableFlags, registry,
};
use nfp_nl::consts::*;
use nfp_nl::{Attr, MessageBuilder, NftMsg};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ruleset {
    pub tables: Vec<TableSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: String,
    #[serde(default = "default_family")]
    pub family: String,
    /// Owned tables vanish when the applying connection closes unless `persist` is set.
    #[serde(default)]
    pub owner: bool,
    #[serde(default)]
    pub persist: bool,
    #[serde(default)]
    pub dormant: bool,
    #[serde(default)]
    pub chains: Vec<ChainSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSpec {
    pub name: String,
    pub r#type: Option<String>,
    pub hook: Option<String>,
    #[serde(default)]
    pub priority: i32,
    pub policy: Option<Policy>,
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSpec {
    /// accept, drop, continue, break or return
    pub verdict: Option<String>,
    pub jump: Option<String>,
    pub goto: Option<String>,
    /// Immediate data loads run before the verdict.
    #[serde(default)]
    pub load: Vec<LoadSpec>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadSpec {
    pub register: u32,
    /// Hex encoded bytes, e.g. "0a000001".
    pub data: String,
}

fn default_family() -> String {
    "inet".to_string()
}

/// One request of an apply plan.
#[derive(Debug, Clone)]
pub struct PlannedRequest {
    pub description: String,
    pub message: Vec<u8>,
}

impl fmt::Display for PlannedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes)", self.description, self.message.len())
    }
}

impl Ruleset {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse ruleset YAML")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read ruleset from {:?}", path))?;
        Self::from_yaml(&content)
    }

    /// Requests that build this ruleset: tables, then chains, then rules.
    pub fn requests(&self) -> Result<Vec<PlannedRequest>> {
        let mut planned = vec![];
        let mut seq = 1u32;
        let mut push = |description: String, builder: MessageBuilder| {
            planned.push(PlannedRequest {
                description,
                message: builder.seq(seq).flags(NLM_F_ACK).build(),
            });
            seq += 1;
        };

        for table in &self.tables {
            let family = Family::from_name(&table.family)
                .ok_or_else(|| anyhow!("Unknown family '{}' for table {}", table.family, table.name))?;
            if family.is_unspec() {
                bail!("Table {} needs a concrete family", table.name);
            }

            push(
                format!("Create table {} {}", family, table.name),
                table_request(table, family),
            );

            for chain in &table.chains {
                push(
                    format!("Create chain {} in {} {}", chain.name, family, table.name),
                    chain_request(table, chain, family)?,
                );
            }

            for chain in &table.chains {
                for (i, rule) in chain.rules.iter().enumerate() {
                    push(
                        format!("Append rule {} to {} {}", i + 1, table.name, chain.name),
                        rule_request(table, chain, rule, family).with_context(|| {
                            format!("Invalid rule {} in chain {}", i + 1, chain.name)
                        })?,
                    );
                }
            }
        }

        Ok(planned)
    }

    pub fn display(&self) -> Result<()> {
        let requests = self.requests()?;
        println!("Plan ({} requests):", requests.len());
        for (i, request) in requests.iter().enumerate() {
            println!("  {}. {}", i + 1, request);
        }
        Ok(())
    }
}

fn table_request(table: &TableSpec, family: Family) -> MessageBuilder {
    let mut flags = 0;
    if table.dormant {
        flags |= TableFlags::DORMANT;
    }
    if table.owner {
        flags |= TableFlags::OWNER;
    }
    if table.persist {
        flags |= TableFlags::PERSIST;
    }
    MessageBuilder::new(NftMsg::NewTable, family.as_u8())
        .flags(NLM_F_CREATE)
        .attr(Attr::string(NFTA_TABLE_NAME, &table.name))
        .attr(Attr::u32(NFTA_TABLE_FLAGS, flags))
}

fn chain_request(table: &TableSpec, chain: &ChainSpec, family: Family) -> Result<MessageBuilder> {
    let builder = MessageBuilder::new(NftMsg::NewChain, family.as_u8())
        .flags(NLM_F_CREATE)
        .attr(Attr::string(NFTA_CHAIN_TABLE, &table.name))
        .attr(Attr::string(NFTA_CHAIN_NAME, &chain.name));

    let Some(hook) = &chain.hook else {
        if chain.policy.is_some() || chain.r#type.is_some() {
            bail!("Chain {} sets a policy or type without a hook", chain.name);
        }
        return Ok(builder);
    };

    let hooknum = registry::hook_from_name(family, hook)
        .ok_or_else(|| anyhow!("Unknown hook '{}' for family {}", hook, family))?;
    let chain_type = ChainType::from_name(chain.r#type.as_deref().unwrap_or("filter"))
        .map_err(|e| anyhow!("Chain {}: {}", chain.name, e))?;
    let policy = chain.policy.unwrap_or(Policy::Accept);

    Ok(builder
        .attr(Attr::u32(NFTA_CHAIN_FLAGS, ChainFlags::BASE))
        .attr(Attr::nested(
            NFTA_CHAIN_HOOK,
            vec![
                Attr::u32(NFTA_HOOK_HOOKNUM, hooknum),
                Attr::i32(NFTA_HOOK_PRIORITY, chain.priority),
            ],
        ))
        .attr(Attr::u32(NFTA_CHAIN_POLICY, policy.code()))
        .attr(Attr::string(NFTA_CHAIN_TYPE, chain_type.name())))
}

fn rule_request(
    table: &TableSpec,
    chain: &ChainSpec,
    rule: &RuleSpec,
    family: Family,
) -> Result<MessageBuilder> {
    let mut exprs = vec![];
    for load in &rule.load {
        let data = hex::decode(&load.data)
            .with_context(|| format!("Invalid hex data '{}'", load.data))?;
        exprs.push(immediate(load.register, Attr::bytes(NFTA_DATA_VALUE, data)));
    }
    if let Some(verdict) = verdict_attrs(rule)? {
        exprs.push(immediate(
            NFT_REG_VERDICT,
            Attr::nested(NFTA_DATA_VERDICT, verdict),
        ));
    }

    let mut builder = MessageBuilder::new(NftMsg::NewRule, family.as_u8())
        .flags(NLM_F_CREATE | NLM_F_APPEND)
        .attr(Attr::string(NFTA_RULE_TABLE, &table.name))
        .attr(Attr::string(NFTA_RULE_CHAIN, &chain.name))
        .attr(Attr::nested(NFTA_RULE_EXPRESSIONS, exprs));
    if let Some(comment) = &rule.comment {
        builder = builder.attr(Attr::bytes(NFTA_RULE_USERDATA, comment.as_bytes()));
    }
    Ok(builder)
}

fn verdict_attrs(rule: &RuleSpec) -> Result<Option<Vec<Attr>>> {
    let attrs = match (&rule.verdict, &rule.jump, &rule.goto) {
        (None, None, None) => return Ok(None),
        (Some(name), None, None) => {
            let code = match name.as_str() {
                "accept" => NF_ACCEPT,
                "drop" => NF_DROP,
                "continue" => NFT_CONTINUE,
                "break" => NFT_BREAK,
                "return" => NFT_RETURN,
                other => bail!("Unknown verdict '{}'", other),
            };
            vec![Attr::i32(NFTA_VERDICT_CODE, code)]
        }
        (None, Some(target), None) => vec![
            Attr::i32(NFTA_VERDICT_CODE, NFT_JUMP),
            Attr::string(NFTA_VERDICT_CHAIN, target),
        ],
        (None, None, Some(target)) => vec![
            Attr::i32(NFTA_VERDICT_CODE, NFT_GOTO),
            Attr::string(NFTA_VERDICT_CHAIN, target),
        ],
        _ => bail!("A rule takes only one of verdict, jump and goto"),
    };
    Ok(Some(attrs))
}

fn immediate(dreg: u32, data: Attr) -> Attr {
    Attr::nested(
        NFTA_LIST_ELEM,
        vec![
            Attr::string(NFTA_EXPR_NAME, "immediate"),
            Attr::nested(
                NFTA_EXPR_DATA,
                vec![
                    Attr::u32(NFTA_IMMEDIATE_DREG, dreg),
                    Attr::nested(NFTA_IMMEDIATE_DATA, vec![data]),
                ],
            ),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Engine;

    const RULESET: &str = r#"
tables:
  - name: filter
    family: inet
    chains:
      - name: input
        type: filter
        hook: input
        priority: 0
        policy: drop
        rules:
          - load:
              - register: 1
                data: "0a000001"
            jump: allowed
            comment: "loopback"
          - verdict: accept
      - name: allowed
        rules:
          - verdict: accept
"#;

    #[test]
    fn parses_and_plans_in_dependency_order() {
        let ruleset = Ruleset::from_yaml(RULESET).unwrap();
        let requests = ruleset.requests().unwrap();
        let descriptions: Vec<&str> = requests.iter().map(|r| r.description.as_str()).collect();
        assert_eq!(
            descriptions,
            vec![
                "Create table inet filter",
                "Create chain input in inet filter",
                "Create chain allowed in inet filter",
                "Append rule 1 to filter input",
                "Append rule 2 to filter input",
                "Append rule 1 to filter allowed",
            ]
        );
    }

    #[test]
    fn planned_requests_apply_cleanly() {
        let engine = Engine::default();
        let conn = engine.connect();
        for request in Ruleset::from_yaml(RULESET).unwrap().requests().unwrap() {
            conn.execute(&request.message)
                .unwrap_or_else(|e| panic!("{}: {}", request.description, e));
        }

        let status = engine.status();
        assert_eq!(status.tables.len(), 1);
        let chains = &status.tables[0].chains;
        assert_eq!(chains[0].hook.as_deref(), Some("input"));
        assert_eq!(chains[0].rules, 2);
        assert_eq!(chains[1].use_count, 1);
    }

    #[test]
    fn rejects_conflicting_verdicts() {
        let rule = RuleSpec {
            verdict: Some("accept".into()),
            jump: Some("x".into()),
            ..RuleSpec::default()
        };
        assert!(verdict_attrs(&rule).is_err());
    }

    #[test]
    fn rejects_bad_hex() {
        let yaml = r#"
tables:
  - name: t
    chains:
      - name: c
        rules:
          - load:
              - register: 1
                data: "zz"
"#;
        assert!(Ruleset::from_yaml(yaml).unwrap().requests().is_err());
    }

    #[test]
    fn unknown_hook_is_reported() {
        let yaml = r#"
tables:
  - name: t
    family: arp
    chains:
      - name: c
        hook: prerouting
"#;
        let err = Ruleset::from_yaml(yaml).unwrap().requests().unwrap_err();
        assert!(err.to_string().contains("Unknown hook"));
    }
}
