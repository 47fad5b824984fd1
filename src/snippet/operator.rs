// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Operators, declared and derived.
//!
//! A declared operator names (or rides) a function. A *synthetic*
//! operator is derived from a declared one along a chain of commutator
//! and negator references; the derivation also synthesizes the function
//! it calls — same name with reversed parameters for `TWIN`, or a new
//! name — as a [`Transformed`] function snippet.
//!
//! The reachability walk that assigns derivation paths lives in
//! [`crate::synth`]; this module resolves the selected path during
//! characterize.

use std::collections::BTreeSet;

use proc_macro2::Span;

use crate::{
    attrs::OperatorAttrs,
    dbtype::DbType,
    emit::e_quote,
    ident::{Operator as OpName, Qualified, Simple},
    report::Reporter,
    snippet::{
        Ctx, FunctionFacts, OperatorFacts, Snippet, explicit_tags, is_boolean, resolve_comment,
        resolve_implementor
    },
    tag::DependTag
};

use super::function::{FnRender, render_create, render_drop};

/// A reference to another operator in `commutator =` / `negator =`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpRef {
    /// The operator is its own commutator.
    Self_,
    /// The commutator is this operator's twin (same name, operands
    /// reversed).
    Twin,
    /// Another operator by name.
    Named(Qualified<OpName>),
}

/// What `synthetic =` asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntheticTarget {
    /// Derive the base function's twin under the same name.
    Twin,
    /// Derive a function with this name.
    Function(String),
}

/// The commutation/negation transforms along a derivation path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformSet {
    /// Arguments reversed.
    pub commute: bool,
    /// Boolean result negated.
    pub negate: bool,
}

impl TransformSet {
    /// The set containing only the commutation transform.
    #[must_use]
    pub fn commutation() -> Self {
        Self {
            commute: true,
            negate: false
        }
    }

    /// The set containing only the negation transform.
    #[must_use]
    pub fn negation() -> Self {
        Self {
            commute: false,
            negate: true
        }
    }

    /// Symmetric difference; double application cancels.
    #[must_use]
    pub fn xor(self, other: Self) -> Self {
        Self {
            commute: self.commute ^ other.commute,
            negate: self.negate ^ other.negate
        }
    }

    /// Number of transforms in the set.
    #[must_use]
    pub fn count(self) -> usize {
        usize::from(self.commute) + usize::from(self.negate)
    }

    /// Human wording for diagnostics and derived comments.
    #[must_use]
    pub fn describe(self) -> &'static str {
        match (self.commute, self.negate) {
            (true, true) => "commutation and negation",
            (true, false) => "commutation",
            (false, true) => "negation",
            (false, false) => "no transforms"
        }
    }
}

/// One way to derive a synthetic operator.
#[derive(Debug, Clone)]
pub struct DerivationPath {
    /// The declared operator the chain starts from.
    pub base: Qualified<OpName>,
    /// The operator whose commutator/negator reference reached us.
    pub proximate: Qualified<OpName>,
    /// Transforms accumulated from the base.
    pub from_base: TransformSet,
    /// The single transform from the proximate operator.
    pub from_proximate: TransformSet,
}

/// Carrier for one `#[operator(...)]`.
#[derive(Debug)]
pub struct Operator {
    /// The parsed payload.
    pub attrs: OperatorAttrs,
    /// The annotated fn's element path.
    pub element_path: String,
    /// Doc-comment first sentence.
    pub doc: Option<String>,
    /// Location for diagnostics.
    pub span: Span,
    /// The operator name.
    pub qname: Qualified<OpName>,
    /// Parsed commutator reference.
    pub commutator_ref: Option<OpRef>,
    /// Parsed negator reference.
    pub negator_ref: Option<OpRef>,
    /// Parsed synthesis request; `None` for a declared operator.
    pub synthetic: Option<SyntheticTarget>,
    /// Derivation paths accumulated by the synthesizer.
    pub paths: Vec<DerivationPath>,
    /// Resolved implementor-block name.
    pub implementor: Option<String>,
    /// Tags provided.
    pub provides: BTreeSet<DependTag>,
    /// Tags required.
    pub requires: BTreeSet<DependTag>,
    /// Install commands.
    pub deploy: Vec<String>,
    /// Remove commands.
    pub undeploy: Vec<String>,
}

/// Parse `op` or `schema.op`.
pub(crate) fn parse_operator_name(text: &str) -> Result<Qualified<OpName>, String> {
    match text.rfind('.') {
        Some(dot) if dot + 1 < text.len() => {
            let (schema, op) = (&text[..dot], &text[dot + 1..]);
            let op = OpName::from_str(op)?;
            let schema = Simple::from_sql(schema)?;
            Ok(op.with_qualifier(Some(schema)))
        }
        _ => Ok(OpName::from_str(text)?.with_qualifier(None))
    }
}

fn parse_op_ref(text: &str) -> Result<OpRef, String> {
    match text {
        "SELF" => Ok(OpRef::Self_),
        "TWIN" => Ok(OpRef::Twin),
        other => Ok(OpRef::Named(parse_operator_name(other)?))
    }
}

impl Operator {
    /// Wrap a freshly parsed payload, resolving the operator name and
    /// references immediately (the synthesizer matches on them).
    pub fn new(
        attrs: OperatorAttrs,
        element_path: String,
        doc: Option<String>,
        span: Span,
        reporter: &mut Reporter
    ) -> Option<Self> {
        let qname = match parse_operator_name(&attrs.name) {
            Ok(q) => q,
            Err(e) => {
                reporter.error_span(span, e);
                return None;
            }
        };
        let commutator_ref = match attrs.commutator.as_deref().map(parse_op_ref) {
            None => None,
            Some(Ok(r)) => Some(r),
            Some(Err(e)) => {
                reporter.error_span(span, e);
                return None;
            }
        };
        let negator_ref = match attrs.negator.as_deref().map(parse_op_ref) {
            None => None,
            Some(Ok(r)) => Some(r),
            Some(Err(e)) => {
                reporter.error_span(span, e);
                return None;
            }
        };
        let synthetic = attrs.synthetic.as_deref().map(|s| {
            if s == "TWIN" {
                SyntheticTarget::Twin
            } else {
                SyntheticTarget::Function(s.to_owned())
            }
        });
        Some(Self {
            attrs,
            element_path,
            doc,
            span,
            qname,
            commutator_ref,
            negator_ref,
            synthetic,
            paths: Vec::new(),
            implementor: None,
            provides: BTreeSet::new(),
            requires: BTreeSet::new(),
            deploy: Vec::new(),
            undeploy: Vec::new()
        })
    }

    pub(crate) fn characterize(&mut self, ctx: &mut Ctx<'_>) -> bool {
        let span = self.span;
        self.implementor = resolve_implementor(
            self.attrs.implementor.as_deref(),
            ctx.default_implementor.as_ref(),
            ctx.reporter,
            span
        );
        if self.synthetic.is_some() && self.attrs.function.is_some() {
            ctx.reporter
                .error_span(span, "function= and synthetic= are mutually exclusive");
            return false;
        }
        let resolved = if self.synthetic.is_some() {
            self.resolve_synthetic(ctx)
        } else {
            self.resolve_declared(ctx)
        };
        let Some((operands, func, func_sig, fn_facts)) = resolved else {
            return false;
        };

        if !self.validate_refs(ctx, &operands, fn_facts.as_ref()) {
            return false;
        }

        self.provides
            .insert(DependTag::Operator(self.qname.clone(), operands.clone()));
        explicit_tags(&self.attrs.provides, &mut self.provides);
        for op in operands.iter().flatten() {
            if let Some(tag) = op.depend_tag() {
                self.requires.insert(tag);
            }
        }
        self.requires
            .insert(DependTag::Function(func.clone(), func_sig.clone()));
        explicit_tags(&self.attrs.requires, &mut self.requires);

        let commutator = self.commutator_ref.as_ref().map(|r| match r {
            OpRef::Self_ => "SELF".to_owned(),
            OpRef::Twin => "TWIN".to_owned(),
            OpRef::Named(n) => n.deparse_header()
        });
        ctx.operators.insert(
            (self.element_path.clone(), self.qname.deparse_header()),
            OperatorFacts {
                qname: self.qname.clone(),
                operands: operands.clone(),
                func: func.clone(),
                func_sig: func_sig.clone(),
                commutator
            }
        );

        self.render(&operands, &func);
        true
    }

    /// Resolve operands and function for a declared operator.
    #[allow(clippy::type_complexity)]
    fn resolve_declared(
        &mut self,
        ctx: &mut Ctx<'_>
    ) -> Option<([Option<DbType>; 2], Qualified<Simple>, Vec<DbType>, Option<FunctionFacts>)> {
        let span = self.span;
        let facts = ctx.facts.get(&self.element_path).cloned();
        let explicit_operands = self.attrs.left.is_some() || self.attrs.right.is_some();
        let operands: [Option<DbType>; 2] = if explicit_operands {
            [
                self.attrs.left.as_deref().map(DbType::from_annotation),
                self.attrs.right.as_deref().map(DbType::from_annotation)
            ]
        } else if let Some(f) = &facts {
            match f.params.len() {
                1 => [None, Some(f.params[0].clone())],
                2 => [Some(f.params[0].clone()), Some(f.params[1].clone())],
                n => {
                    ctx.reporter.error_span(
                        span,
                        format!("an operator function takes one or two parameters, not {n}")
                    );
                    return None;
                }
            }
        } else {
            ctx.reporter.error_span(
                span,
                "operand types are needed: left=/right=, or a #[function] on the same fn"
            );
            return None;
        };
        if operands.iter().all(Option::is_none) {
            ctx.reporter
                .error_span(span, "an operator needs at least one operand");
            return None;
        }

        let func = match self.attrs.function.as_deref() {
            Some(text) => match Qualified::from_sql(text) {
                Ok(q) => q,
                Err(e) => {
                    ctx.reporter.error_span(span, e);
                    return None;
                }
            },
            None => match &facts {
                Some(f) => f.qname.clone(),
                None => {
                    ctx.reporter.error_span(
                        span,
                        "an operator needs function= or a #[function] on the same fn"
                    );
                    return None;
                }
            }
        };
        let func_sig: Vec<DbType> = operands.iter().flatten().cloned().collect();
        Some((operands, func, func_sig, facts))
    }

    /// Resolve a synthetic operator through its selected derivation path.
    #[allow(clippy::type_complexity)]
    fn resolve_synthetic(
        &mut self,
        ctx: &mut Ctx<'_>
    ) -> Option<([Option<DbType>; 2], Qualified<Simple>, Vec<DbType>, Option<FunctionFacts>)> {
        let span = self.span;
        let target = self.synthetic.clone().expect("synthetic target present");
        if self.attrs.left.is_some() || self.attrs.right.is_some() {
            ctx.reporter.error_span(
                span,
                "a synthetic operator takes its operand types from its base"
            );
            return None;
        }
        if self.paths.is_empty() {
            ctx.reporter.error_span(
                span,
                format!(
                    "no derivation path reaches synthetic operator {}",
                    self.qname.deparse_header()
                )
            );
            return None;
        }
        let viable: Vec<&DerivationPath> = self
            .paths
            .iter()
            .filter(|p| match target {
                // a twin is exactly the commuted base function
                SyntheticTarget::Twin => p.from_base.commute && !p.from_base.negate,
                SyntheticTarget::Function(_) => true
            })
            .filter(|p| {
                ctx.operators
                    .contains_key(&(self.element_path.clone(), p.base.deparse_header()))
            })
            .collect();
        let Some(path) = viable.into_iter().min_by(|a, b| {
            a.from_base
                .count()
                .cmp(&b.from_base.count())
                .then_with(|| a.base.deparse_header().cmp(&b.base.deparse_header()))
                .then_with(|| a.proximate.deparse_header().cmp(&b.proximate.deparse_header()))
        }) else {
            ctx.reporter.error_span(
                span,
                format!(
                    "no usable derivation path for synthetic operator {}",
                    self.qname.deparse_header()
                )
            );
            return None;
        };
        let path = path.clone();

        // the operator we were derived from is our commutator/negator
        // unless the annotation already says otherwise
        if self.commutator_ref.is_none() && path.from_proximate.commute {
            self.commutator_ref = Some(OpRef::Named(path.proximate.clone()));
        }
        if self.negator_ref.is_none() && path.from_proximate.negate {
            self.negator_ref = Some(OpRef::Named(path.proximate.clone()));
        }

        let base = ctx
            .operators
            .get(&(self.element_path.clone(), path.base.deparse_header()))
            .expect("filtered on presence")
            .clone();
        let mut operands = base.operands.clone();
        if path.from_base.commute {
            operands.swap(0, 1);
        }

        // the base operator's function must be declared here, since the
        // derived function is rendered from its facts
        let Some(base_fn) = ctx
            .facts
            .values()
            .find(|f| f.qname == base.func && f.params == base.func_sig)
            .cloned()
        else {
            ctx.reporter.error_span(
                span,
                format!(
                    "cannot derive from {}: its function is not declared in this compilation",
                    path.base.deparse_header()
                )
            );
            return None;
        };
        if path.from_base.negate && !is_boolean(&base_fn.returns) {
            ctx.reporter
                .error_span(span, "negation can only derive from a boolean function");
            return None;
        }

        let func = match &target {
            SyntheticTarget::Twin => base.func.clone(),
            SyntheticTarget::Function(name) => match Qualified::from_sql(name) {
                Ok(q) => q,
                Err(e) => {
                    ctx.reporter.error_span(span, e);
                    return None;
                }
            }
        };

        let transformed = Transformed::derive(&base_fn, func.clone(), path.from_base);
        let func_sig = transformed.params.clone();
        ctx.extra.push(Snippet::Transformed(transformed));

        Some((operands, func, func_sig, Some(base_fn)))
    }

    /// Shared reference checks: self-reference, SELF/TWIN conditions,
    /// commutator symmetry, HASHES/MERGES preconditions.
    fn validate_refs(
        &mut self,
        ctx: &mut Ctx<'_>,
        operands: &[Option<DbType>; 2],
        fn_facts: Option<&FunctionFacts>
    ) -> bool {
        let span = self.span;
        let mut ok = true;
        let operands_equal =
            operands[0].is_some() && operands[1].is_some() && operands[0] == operands[1];

        match &self.commutator_ref {
            Some(OpRef::Named(n)) if *n == self.qname => {
                ctx.reporter.error_span(
                    span,
                    "an operator cannot name itself as commutator; use SELF"
                );
                ok = false;
            }
            Some(OpRef::Self_) if !operands_equal => {
                ctx.reporter
                    .error_span(span, "SELF commutation needs matching operand types");
                ok = false;
            }
            Some(OpRef::Twin) if operands_equal => {
                ctx.reporter
                    .error_span(span, "TWIN commutation needs differing operand types");
                ok = false;
            }
            _ => {}
        }
        match &self.negator_ref {
            Some(OpRef::Named(n)) if *n == self.qname => {
                ctx.reporter
                    .error_span(span, "an operator cannot be its own negator");
                ok = false;
            }
            Some(OpRef::Self_ | OpRef::Twin) => {
                ctx.reporter
                    .error_span(span, "a negator must be a different operator, by name");
                ok = false;
            }
            _ => {}
        }

        // commutator symmetry against already-characterized operators
        if let Some(OpRef::Named(c)) = &self.commutator_ref
            && let Some(other) = ctx
                .operators
                .get(&(self.element_path.clone(), c.deparse_header()))
            && let Some(back) = &other.commutator
            && *back != "TWIN"
            && *back != self.qname.deparse_header()
        {
            ctx.reporter.error_span(
                span,
                format!(
                    "commutators must be symmetric: {} names {}, which names {back}",
                    self.qname.deparse_header(),
                    c.deparse_header()
                )
            );
            ok = false;
        }

        if self.attrs.hashes || self.attrs.merges {
            let which = if self.attrs.hashes { "HASHES" } else { "MERGES" };
            if operands.iter().any(Option::is_none) {
                ctx.reporter
                    .error_span(span, format!("{which} needs a binary operator"));
                ok = false;
            }
            if self.commutator_ref.is_none() {
                ctx.reporter
                    .error_span(span, format!("{which} needs a commutator"));
                ok = false;
            }
            if operands_equal && !matches!(self.commutator_ref, Some(OpRef::Self_)) {
                ctx.reporter.error_span(
                    span,
                    format!("{which} with equal operand types needs SELF commutation")
                );
                ok = false;
            }
            if let Some(f) = fn_facts {
                if !is_boolean(&f.returns) {
                    ctx.reporter
                        .error_span(span, format!("{which} needs a boolean operator"));
                    ok = false;
                }
                if f.effects == crate::attrs::Effects::Volatile {
                    ctx.reporter
                        .error_span(span, format!("{which} needs a non-volatile function"));
                    ok = false;
                }
            }
        }
        ok
    }

    /// Render an operator reference for COMMUTATOR/NEGATOR options.
    fn render_ref(&self, r: &OpRef) -> String {
        match r {
            // SELF and TWIN both resolve to this operator's own name;
            // the twin is the overload with reversed operands
            OpRef::Self_ | OpRef::Twin => self.qname.to_string(),
            OpRef::Named(n) => n.to_string()
        }
    }

    fn render(&mut self, operands: &[Option<DbType>; 2], func: &Qualified<Simple>) {
        let mut opts = vec![format!("PROCEDURE = {}", func.deparse())];
        if let Some(l) = &operands[0] {
            opts.push(format!("LEFTARG = {}", l.to_sql(false)));
        }
        if let Some(r) = &operands[1] {
            opts.push(format!("RIGHTARG = {}", r.to_sql(false)));
        }
        if let Some(c) = &self.commutator_ref {
            opts.push(format!("COMMUTATOR = {}", self.render_ref(c)));
        }
        if let Some(n) = &self.negator_ref {
            opts.push(format!("NEGATOR = {}", self.render_ref(n)));
        }
        if let Some(r) = &self.attrs.restrict {
            opts.push(format!("RESTRICT = {r}"));
        }
        if let Some(j) = &self.attrs.join {
            opts.push(format!("JOIN = {j}"));
        }
        if self.attrs.hashes {
            opts.push("HASHES".to_owned());
        }
        if self.attrs.merges {
            opts.push("MERGES".to_owned());
        }
        self.deploy.push(format!(
            "CREATE OPERATOR {} (\n\t{}\n)",
            self.qname.deparse_header(),
            opts.join(",\n\t")
        ));

        let side = |s: &Option<DbType>| {
            s.as_ref()
                .map_or_else(|| "NONE".to_owned(), |t| t.to_sql(false))
        };
        let signature = format!("({}, {})", side(&operands[0]), side(&operands[1]));
        if let Some(c) = resolve_comment(self.attrs.comment.as_deref(), self.doc.as_ref()) {
            self.deploy.push(format!(
                "COMMENT ON OPERATOR {} {} IS {}",
                self.qname.deparse_header(),
                signature,
                e_quote(&c)
            ));
        }
        self.undeploy.push(format!(
            "DROP OPERATOR {} {}",
            self.qname.deparse_header(),
            signature
        ));
    }
}

/// A function derived from a declared one by commutation/negation.
#[derive(Debug)]
pub struct Transformed {
    /// The derived function's name (the base's for a twin).
    pub qname: Qualified<Simple>,
    /// Parameter signature, reversed when commuted.
    pub params: Vec<DbType>,
    /// Resolved implementor-block name.
    pub implementor: Option<String>,
    /// Tags provided.
    pub provides: BTreeSet<DependTag>,
    /// Tags required: exactly what the base function requires.
    pub requires: BTreeSet<DependTag>,
    /// Install commands.
    pub deploy: Vec<String>,
    /// Remove commands.
    pub undeploy: Vec<String>,
}

impl Transformed {
    /// Derive from the base function's facts.
    fn derive(base: &FunctionFacts, qname: Qualified<Simple>, transforms: TransformSet) -> Self {
        let mut params = base.params.clone();
        let mut names = base.param_names.clone();
        if transforms.commute {
            params.reverse();
            names.reverse();
        }
        let mut provides = BTreeSet::new();
        provides.insert(DependTag::Function(qname.clone(), params.clone()));

        let decls: Vec<String> = names
            .iter()
            .zip(&params)
            .map(|(n, t)| format!("{} {}", n.deparse_quoted(), t.to_sql(false)))
            .collect();
        let mut markers = Vec::new();
        if transforms.commute {
            markers.push("commuted");
        }
        if transforms.negate {
            markers.push("negated");
        }
        let as_ref = if markers.is_empty() {
            base.rust_path.clone()
        } else {
            format!("{}[{}]", base.rust_path, markers.join(","))
        };
        let create = render_create(&FnRender {
            qname: &qname,
            param_decls: &decls,
            setof: false,
            returns: &base.returns,
            language: &base.language,
            markers: &format!(" {}", base.effects.sql()),
            settings: &[],
            as_ref: &as_ref
        });
        let comment = format!(
            "COMMENT ON FUNCTION {}({}) IS {}",
            qname.deparse(),
            super::function::join_sig(&decls),
            e_quote(&format!(
                "derived by {} from {}",
                transforms.describe(),
                base.qname.deparse()
            ))
        );
        let drop = render_drop(&qname, &decls);
        Self {
            qname,
            params,
            implementor: None,
            provides,
            requires: base.requires.clone(),
            deploy: vec![create, comment],
            undeploy: vec![drop]
        }
    }
}
