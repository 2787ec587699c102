// Rule expression compiler: wire expression lists <-> typed expressions
use nfp_core::{
    Chain, Expression, Immediate, ImmediateData, Limits, NftError, Register, Result, Store,
    Verdict, VerdictCode,
};
use nfp_nl::consts::*;
use nfp_nl::{Attr, Attribute, Attributes};

/// Resolves jump/goto targets within the rule's table.
pub(crate) trait ChainLookup {
    fn chain(&self, handle: u64) -> Option<&Chain>;
    fn chain_by_name(&self, name: &str) -> Option<&Chain>;
    fn chain_by_id(&self, id: u32) -> Option<&Chain>;
    /// Handle of the chain the rule being compiled is added to.
    fn rule_chain(&self) -> u64;
}

pub(crate) struct TableScope<'a> {
    pub store: &'a Store,
    pub table: u64,
    pub chain: u64,
}

impl ChainLookup for TableScope<'_> {
    fn chain(&self, handle: u64) -> Option<&Chain> {
        self.store.find_chain_by_handle(self.table, handle)
    }

    fn chain_by_name(&self, name: &str) -> Option<&Chain> {
        self.store.find_chain(self.table, name)
    }

    fn chain_by_id(&self, id: u32) -> Option<&Chain> {
        self.store.find_chain_by_id(self.table, id)
    }

    fn rule_chain(&self) -> u64 {
        self.chain
    }
}

/// Expression kinds this engine can compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExprKind {
    Immediate,
}

impl ExprKind {
    fn from_name(name: &str) -> Result<Self> {
        match name {
            Expression::IMMEDIATE => Ok(ExprKind::Immediate),
            other => Err(NftError::not_found(format!("expression type {:?}", other))),
        }
    }
}

/// Payload of a data container before chain targets are resolved.
enum Payload {
    Value(Vec<u8>),
    Verdict {
        code: VerdictCode,
        chain: Option<String>,
        chain_id: Option<u32>,
    },
}

/// Compile an `NFTA_RULE_EXPRESSIONS` list.
pub(crate) fn compile_list(
    list: &Attribute,
    scope: &dyn ChainLookup,
    limits: &Limits,
) -> Result<Vec<Expression>> {
    let elems = list.nested()?;
    if elems.len() > limits.max_rule_expressions {
        return Err(NftError::invalid(format!(
            "{} expressions exceed the limit of {}",
            elems.len(),
            limits.max_rule_expressions
        )));
    }

    let mut claimed: Vec<u64> = vec![];
    let mut exprs = Vec::with_capacity(elems.len());
    for elem in elems.iter() {
        if elem.kind() != NFTA_LIST_ELEM {
            return Err(NftError::invalid(format!(
                "expression list element of type {}",
                elem.kind()
            )));
        }
        let expr = compile_expression(&elem.nested()?, scope)?;
        if let Some(target) = expr.chain_reference() {
            let binding = scope.chain(target).is_some_and(|c| c.is_binding());
            if binding && claimed.contains(&target) {
                return Err(NftError::invalid("binding chain referenced twice"));
            }
            claimed.push(target);
        }
        exprs.push(expr);
    }
    Ok(exprs)
}

fn compile_expression(attrs: &Attributes, scope: &dyn ChainLookup) -> Result<Expression> {
    let name = attrs
        .string(NFTA_EXPR_NAME)?
        .ok_or_else(|| NftError::invalid("expression without a name"))?;
    let data = attrs.nested(NFTA_EXPR_DATA)?.unwrap_or_default();
    match ExprKind::from_name(name)? {
        ExprKind::Immediate => compile_immediate(&data, scope).map(Expression::Immediate),
    }
}

fn compile_immediate(attrs: &Attributes, scope: &dyn ChainLookup) -> Result<Immediate> {
    let dreg = attrs
        .u32(NFTA_IMMEDIATE_DREG)?
        .ok_or_else(|| NftError::invalid("immediate without a destination register"))?;
    let data = attrs
        .get(NFTA_IMMEDIATE_DATA)
        .ok_or_else(|| NftError::invalid("immediate without data"))?;
    let data = data.nested()?;
    let payload = parse_data(&data)?;
    let dreg = Register::parse(dreg)?;

    let data = match payload {
        Payload::Value(bytes) => ImmediateData::Value(bytes),
        Payload::Verdict { .. } if !dreg.is_verdict() => {
            return Err(NftError::invalid(format!(
                "verdict loaded into data register {}",
                dreg.id()
            )));
        }
        Payload::Verdict {
            code,
            chain,
            chain_id,
        } => ImmediateData::Verdict(resolve_verdict(code, chain.as_deref(), chain_id, scope)?),
    };
    Immediate::new(dreg, data)
}

fn parse_data(attrs: &Attributes) -> Result<Payload> {
    if let Some(unknown) = attrs
        .iter()
        .find(|a| a.kind() != NFTA_DATA_VALUE && a.kind() != NFTA_DATA_VERDICT)
    {
        return Err(NftError::invalid(format!(
            "unknown data attribute {}",
            unknown.kind()
        )));
    }

    match (attrs.get(NFTA_DATA_VALUE), attrs.get(NFTA_DATA_VERDICT)) {
        (Some(value), None) => Ok(Payload::Value(value.payload().to_vec())),
        (None, Some(verdict)) => parse_verdict(verdict),
        (None, None) => Err(NftError::invalid("data without a value or verdict")),
        (Some(_), Some(_)) => Err(NftError::invalid("data with both a value and a verdict")),
    }
}

fn parse_verdict(attr: &Attribute) -> Result<Payload> {
    let nest = attr.nested()?;
    if let Some(unknown) = nest.iter().find(|a| {
        !matches!(
            a.kind(),
            NFTA_VERDICT_CODE | NFTA_VERDICT_CHAIN | NFTA_VERDICT_CHAIN_ID
        )
    }) {
        return Err(NftError::invalid(format!(
            "unknown verdict attribute {}",
            unknown.kind()
        )));
    }
    let code = nest
        .get(NFTA_VERDICT_CODE)
        .ok_or_else(|| NftError::invalid("verdict without a code"))?
        .as_i32()?;
    let code = VerdictCode::parse(code)?;
    let chain_id = nest.u32(NFTA_VERDICT_CHAIN_ID)?;
    let chain = nest.string(NFTA_VERDICT_CHAIN)?.map(str::to_string);
    Ok(Payload::Verdict {
        code,
        chain,
        chain_id,
    })
}

fn resolve_verdict(
    code: VerdictCode,
    chain: Option<&str>,
    chain_id: Option<u32>,
    scope: &dyn ChainLookup,
) -> Result<Verdict> {
    if !code.needs_chain() {
        return Verdict::from_code(code, None);
    }

    let target = match (chain, chain_id) {
        (Some(name), _) => scope
            .chain_by_name(name)
            .ok_or_else(|| NftError::not_found(format!("jump target chain {}", name)))?,
        (None, Some(id)) => scope
            .chain_by_id(id)
            .ok_or_else(|| NftError::not_found(format!("jump target chain id {}", id)))?,
        (None, None) => return Err(NftError::invalid("jump verdict without a target chain")),
    };

    if target.is_base() {
        return Err(NftError::unsupported(format!(
            "jump to base chain {}",
            target.label()
        )));
    }
    if target.handle == scope.rule_chain() {
        return Err(NftError::invalid(format!(
            "chain {} jumps to itself",
            target.label()
        )));
    }
    if target.is_binding() && target.is_bound() {
        return Err(NftError::invalid(format!(
            "binding chain {} is already bound",
            target.label()
        )));
    }
    Verdict::from_code(code, Some(target.handle))
}

/// Encode expressions for a rule response.
pub(crate) fn encode_list(store: &Store, exprs: &[Expression]) -> Attr {
    Attr::nested(
        NFTA_RULE_EXPRESSIONS,
        exprs
            .iter()
            .map(|expr| Attr::nested(NFTA_LIST_ELEM, encode_expression(store, expr)))
            .collect(),
    )
}

fn encode_expression(store: &Store, expr: &Expression) -> Vec<Attr> {
    match expr {
        Expression::Immediate(imm) => {
            let data = match &imm.data {
                ImmediateData::Value(bytes) => Attr::bytes(NFTA_DATA_VALUE, bytes.clone()),
                ImmediateData::Verdict(verdict) => {
                    Attr::nested(NFTA_DATA_VERDICT, encode_verdict(store, verdict))
                }
            };
            vec![
                Attr::string(NFTA_EXPR_NAME, expr.name()),
                Attr::nested(
                    NFTA_EXPR_DATA,
                    vec![
                        Attr::u32(NFTA_IMMEDIATE_DREG, imm.dreg.id()),
                        Attr::nested(NFTA_IMMEDIATE_DATA, vec![data]),
                    ],
                ),
            ]
        }
    }
}

fn encode_verdict(store: &Store, verdict: &Verdict) -> Vec<Attr> {
    let mut attrs = vec![Attr::i32(NFTA_VERDICT_CODE, verdict.code())];
    if let Some(chain) = verdict.target().and_then(|t| store.chain(t)) {
        match (&chain.name, chain.id) {
            (Some(name), _) => attrs.push(Attr::string(NFTA_VERDICT_CHAIN, name)),
            (None, Some(id)) => attrs.push(Attr::u32(NFTA_VERDICT_CHAIN_ID, id)),
            (None, None) => {}
        }
    }
    attrs
}

#[cfg(test)]
mod tests {
    use super::*;
    use nfp_core::{ChainFlags, NFT_GOTO, NFT_JUMP, NF_ACCEPT};
    use nfp_nl::emit_attributes;

    struct FakeTable {
        chains: Vec<Chain>,
        own: u64,
    }

    impl ChainLookup for FakeTable {
        fn chain(&self, handle: u64) -> Option<&Chain> {
            self.chains.iter().find(|c| c.handle == handle)
        }

        fn chain_by_name(&self, name: &str) -> Option<&Chain> {
            self.chains.iter().find(|c| c.name.as_deref() == Some(name))
        }

        fn chain_by_id(&self, id: u32) -> Option<&Chain> {
            self.chains.iter().find(|c| c.id == Some(id))
        }

        fn rule_chain(&self) -> u64 {
            self.own
        }
    }

    fn table() -> FakeTable {
        let regular = Chain::new(10, 1, Some("regular".into()), ChainFlags::default());
        let mut binding = Chain::new(11, 1, None, ChainFlags::from_bits_retain(ChainFlags::BINDING));
        binding.id = Some(77);
        let mut bound = Chain::new(12, 1, None, ChainFlags::from_bits_retain(ChainFlags::BINDING));
        bound.id = Some(78);
        bound.bound_to = Some(99);
        FakeTable {
            chains: vec![regular, binding, bound],
            own: 500,
        }
    }

    fn immediate(dreg: u32, data: Vec<Attr>) -> Attr {
        Attr::nested(
            NFTA_LIST_ELEM,
            vec![
                Attr::string(NFTA_EXPR_NAME, "immediate"),
                Attr::nested(
                    NFTA_EXPR_DATA,
                    vec![
                        Attr::u32(NFTA_IMMEDIATE_DREG, dreg),
                        Attr::nested(NFTA_IMMEDIATE_DATA, data),
                    ],
                ),
            ],
        )
    }

    fn verdict(code: i32, extra: Vec<Attr>) -> Vec<Attr> {
        let mut attrs = vec![Attr::i32(NFTA_VERDICT_CODE, code)];
        attrs.extend(extra);
        vec![Attr::nested(NFTA_DATA_VERDICT, attrs)]
    }

    fn compile(elems: Vec<Attr>) -> Result<Vec<Expression>> {
        compile_in(&table(), elems)
    }

    fn compile_in(scope: &FakeTable, elems: Vec<Attr>) -> Result<Vec<Expression>> {
        let buf = emit_attributes(&[Attr::nested(NFTA_RULE_EXPRESSIONS, elems)]);
        let attrs = Attributes::parse(&buf).unwrap();
        let list = attrs.get(NFTA_RULE_EXPRESSIONS).unwrap();
        compile_list(list, scope, &Limits::default())
    }

    #[test]
    fn accept_verdict_compiles() {
        let exprs = compile(vec![immediate(0, verdict(NF_ACCEPT, vec![]))]).unwrap();
        assert_eq!(
            exprs,
            vec![Expression::Immediate(Immediate {
                dreg: Register::Verdict,
                data: ImmediateData::Verdict(Verdict::Accept),
            })]
        );
    }

    #[test]
    fn value_into_wide_register_compiles() {
        let exprs = compile(vec![immediate(
            1,
            vec![Attr::bytes(NFTA_DATA_VALUE, vec![10, 0, 0, 1])],
        )])
        .unwrap();
        assert_eq!(exprs.len(), 1);
        assert_eq!(exprs[0].chain_reference(), None);
    }

    #[test]
    fn register_and_payload_must_agree() {
        let value_in_verdict = compile(vec![immediate(
            0,
            vec![Attr::bytes(NFTA_DATA_VALUE, vec![1, 2, 3, 4])],
        )]);
        assert!(matches!(value_in_verdict, Err(NftError::InvalidArgument(_))));

        let verdict_in_data = compile(vec![immediate(1, verdict(NF_ACCEPT, vec![]))]);
        assert!(matches!(verdict_in_data, Err(NftError::InvalidArgument(_))));
    }

    #[test]
    fn register_out_of_range() {
        let err = compile(vec![immediate(1000, verdict(NF_ACCEPT, vec![]))]).unwrap_err();
        assert!(matches!(err, NftError::OutOfRange(_)));
    }

    #[test]
    fn unknown_data_attribute_is_malformed() {
        let err = compile(vec![immediate(1, vec![Attr::u32(20, 1)])]).unwrap_err();
        assert!(matches!(err, NftError::InvalidArgument(_)));
    }

    #[test]
    fn both_payloads_are_malformed() {
        let mut data = verdict(NF_ACCEPT, vec![]);
        data.push(Attr::bytes(NFTA_DATA_VALUE, vec![1]));
        assert!(matches!(
            compile(vec![immediate(0, data)]),
            Err(NftError::InvalidArgument(_))
        ));
    }

    #[test]
    fn missing_register_or_data_is_malformed() {
        let no_dreg = Attr::nested(
            NFTA_LIST_ELEM,
            vec![
                Attr::string(NFTA_EXPR_NAME, "immediate"),
                Attr::nested(
                    NFTA_EXPR_DATA,
                    vec![Attr::nested(NFTA_IMMEDIATE_DATA, verdict(NF_ACCEPT, vec![]))],
                ),
            ],
        );
        assert!(matches!(compile(vec![no_dreg]), Err(NftError::InvalidArgument(_))));

        let no_data = Attr::nested(
            NFTA_LIST_ELEM,
            vec![
                Attr::string(NFTA_EXPR_NAME, "immediate"),
                Attr::nested(NFTA_EXPR_DATA, vec![Attr::u32(NFTA_IMMEDIATE_DREG, 0)]),
            ],
        );
        assert!(matches!(compile(vec![no_data]), Err(NftError::InvalidArgument(_))));
    }

    #[test]
    fn unknown_expression_name_is_a_lookup_failure() {
        let elem = Attr::nested(NFTA_LIST_ELEM, vec![Attr::string(NFTA_EXPR_NAME, "payload")]);
        assert!(matches!(compile(vec![elem]), Err(NftError::NotFound(_))));
    }

    #[test]
    fn wrong_list_element_type_is_malformed() {
        let elem = Attr::nested(0, vec![Attr::string(NFTA_EXPR_NAME, "immediate")]);
        assert!(matches!(compile(vec![elem]), Err(NftError::InvalidArgument(_))));
    }

    #[test]
    fn too_many_expressions() {
        let elems = (0..129)
            .map(|_| immediate(0, verdict(NF_ACCEPT, vec![])))
            .collect();
        assert!(matches!(compile(elems), Err(NftError::InvalidArgument(_))));
    }

    #[test]
    fn jump_resolves_by_name_and_id() {
        let by_name = compile(vec![immediate(
            0,
            verdict(NFT_JUMP, vec![Attr::string(NFTA_VERDICT_CHAIN, "regular")]),
        )])
        .unwrap();
        assert_eq!(by_name[0].chain_reference(), Some(10));

        let by_id = compile(vec![immediate(
            0,
            verdict(NFT_JUMP, vec![Attr::u32(NFTA_VERDICT_CHAIN_ID, 77)]),
        )])
        .unwrap();
        assert_eq!(by_id[0].chain_reference(), Some(11));
    }

    #[test]
    fn jump_target_errors() {
        let missing = compile(vec![immediate(
            0,
            verdict(NFT_JUMP, vec![Attr::string(NFTA_VERDICT_CHAIN, "nope")]),
        )]);
        assert!(matches!(missing, Err(NftError::NotFound(_))));

        let already_bound = compile(vec![immediate(
            0,
            verdict(NFT_JUMP, vec![Attr::u32(NFTA_VERDICT_CHAIN_ID, 78)]),
        )]);
        assert!(matches!(already_bound, Err(NftError::InvalidArgument(_))));

        let no_target = compile(vec![immediate(0, verdict(NFT_JUMP, vec![]))]);
        assert!(matches!(no_target, Err(NftError::InvalidArgument(_))));
    }

    #[test]
    fn jump_to_own_chain_is_rejected() {
        let mut scope = table();
        scope.own = 10;
        for code in [NFT_JUMP, NFT_GOTO] {
            let looped = compile_in(
                &scope,
                vec![immediate(
                    0,
                    verdict(code, vec![Attr::string(NFTA_VERDICT_CHAIN, "regular")]),
                )],
            );
            assert!(matches!(looped, Err(NftError::InvalidArgument(_))));
        }

        scope.own = 11;
        let self_bound = compile_in(
            &scope,
            vec![immediate(
                0,
                verdict(NFT_JUMP, vec![Attr::u32(NFTA_VERDICT_CHAIN_ID, 77)]),
            )],
        );
        assert!(matches!(self_bound, Err(NftError::InvalidArgument(_))));
    }

    #[test]
    fn binding_chain_cannot_be_claimed_twice() {
        let jump = || {
            immediate(
                0,
                verdict(NFT_JUMP, vec![Attr::u32(NFTA_VERDICT_CHAIN_ID, 77)]),
            )
        };
        assert!(matches!(
            compile(vec![jump(), jump()]),
            Err(NftError::InvalidArgument(_))
        ));
    }
}
