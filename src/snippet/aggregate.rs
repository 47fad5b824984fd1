// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Aggregates.
//!
//! The annotated fn is either the accumulator (no `accumulate =` in the
//! plan) or the finisher (an `accumulate =` names another function and
//! `finish =` is absent). Everything else — state type, argument list,
//! moving plan, ordered-set shape — is declared or inferred, then run
//! through the long list of consistency rules before anything renders.

use std::collections::BTreeSet;

use proc_macro2::Span;

use crate::{
    attrs::{AggregateAttrs, PlanAttrs},
    dbtype::DbType,
    emit::e_quote,
    ident::{Qualified, Simple},
    snippet::{
        Ctx, explicit_tags, parse_name_type, resolve_comment, resolve_implementor, resolve_qname
    },
    tag::DependTag
};

use super::operator::parse_operator_name;

/// One declared aggregate argument.
#[derive(Debug, Clone)]
struct AggArg {
    name: Option<Simple>,
    ty: DbType,
}

/// Carrier for one `#[aggregate(...)]`.
#[derive(Debug)]
pub struct Aggregate {
    /// The parsed payload.
    pub attrs: AggregateAttrs,
    /// The annotated fn's element path.
    pub element_path: String,
    /// The annotated fn's bare name, the default aggregate name.
    pub element_name: String,
    /// Doc-comment first sentence.
    pub doc: Option<String>,
    /// Location for diagnostics.
    pub span: Span,
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

impl Aggregate {
    /// Wrap a freshly parsed payload.
    #[must_use]
    pub fn new(
        attrs: AggregateAttrs,
        element_path: String,
        element_name: String,
        doc: Option<String>,
        span: Span
    ) -> Self {
        Self {
            attrs,
            element_path,
            element_name,
            doc,
            span,
            implementor: None,
            provides: BTreeSet::new(),
            requires: BTreeSet::new(),
            deploy: Vec::new(),
            undeploy: Vec::new()
        }
    }

    #[allow(clippy::too_many_lines)]
    pub(crate) fn characterize(&mut self, ctx: &mut Ctx<'_>) -> bool {
        let span = self.span;
        let mut ok = true;
        self.implementor = resolve_implementor(
            self.attrs.implementor.as_deref(),
            ctx.default_implementor.as_ref(),
            ctx.reporter,
            span
        );
        let Some(qname) = resolve_qname(
            self.attrs.name.as_deref(),
            self.attrs.schema.as_deref(),
            &self.element_name,
            ctx.reporter,
            span
        ) else {
            return false;
        };

        let plan = self.attrs.plan.clone().unwrap_or_default();
        let own_facts = ctx.facts.get(&self.element_path).cloned();

        // the annotated fn is the accumulator or the finisher
        let (accumulate, finish, own_is_accumulator) =
            match (plan.accumulate.as_deref(), plan.finish.as_deref()) {
                (None, f) => match &own_facts {
                    Some(own) => (own.qname.clone(), parse_fn_name(f, ctx, span, &mut ok), true),
                    None => {
                        ctx.reporter.error_span(
                            span,
                            "an aggregate's accumulator fn needs a #[function] annotation"
                        );
                        return false;
                    }
                },
                (Some(a), None) => match &own_facts {
                    Some(own) => (
                        match Qualified::from_sql(a) {
                            Ok(q) => q,
                            Err(e) => {
                                ctx.reporter.error_span(span, e);
                                return false;
                            }
                        },
                        Some(own.qname.clone()),
                        false
                    ),
                    None => {
                        ctx.reporter.error_span(
                            span,
                            "an aggregate's finisher fn needs a #[function] annotation"
                        );
                        return false;
                    }
                },
                (Some(_), Some(_)) => {
                    ctx.reporter.error_span(
                        span,
                        "the annotated fn must be the accumulator or the finisher, \
                         but the plan names both"
                    );
                    return false;
                }
            };

        // state type: explicit, or the accumulator's first parameter
        let state = match plan.state_type.as_deref() {
            Some(text) => DbType::from_annotation(text),
            None if own_is_accumulator => {
                let own = own_facts.as_ref().expect("checked above");
                match own.params.first() {
                    Some(t) => t.clone(),
                    None => {
                        ctx.reporter.error_span(
                            span,
                            "the accumulator needs at least a state parameter"
                        );
                        return false;
                    }
                }
            }
            None => {
                ctx.reporter.error_span(
                    span,
                    "state_type is needed unless the annotated fn is the accumulator"
                );
                return false;
            }
        };

        // aggregated arguments: declared, or the accumulator's tail
        let mut agg_args: Vec<AggArg> = Vec::new();
        if self.attrs.arguments.is_empty() {
            if own_is_accumulator {
                let own = own_facts.as_ref().expect("checked above");
                for (i, ty) in own.params.iter().enumerate().skip(1) {
                    agg_args.push(AggArg {
                        name: own.param_names.get(i).cloned(),
                        ty: ty.clone()
                    });
                }
            }
        } else {
            for entry in self.attrs.arguments.iter() {
                match parse_name_type(entry) {
                    Ok((name, ty)) => agg_args.push(AggArg {
                        name,
                        ty
                    }),
                    Err(e) => {
                        ctx.reporter.error_span(span, e);
                        ok = false;
                    }
                }
            }
        }

        // direct arguments: presence (even empty) means ordered-set
        let ordered_set = self.attrs.direct_arguments.is_some();
        let mut direct_args: Vec<AggArg> = Vec::new();
        if let Some(list) = &self.attrs.direct_arguments {
            for entry in list.iter() {
                match parse_name_type(entry) {
                    Ok((name, ty)) => direct_args.push(AggArg {
                        name,
                        ty
                    }),
                    Err(e) => {
                        ctx.reporter.error_span(span, e);
                        ok = false;
                    }
                }
            }
        }

        // consistency rules
        if ordered_set && agg_args.is_empty() {
            ctx.reporter.error_span(
                span,
                "an ordered-set aggregate needs aggregated arguments"
            );
            ok = false;
        }
        if self.attrs.hypothetical {
            if !ordered_set {
                ctx.reporter
                    .error_span(span, "hypothetical needs an ordered-set aggregate");
                ok = false;
            } else {
                let tail = direct_args
                    .iter()
                    .rev()
                    .take(agg_args.len())
                    .rev()
                    .map(|a| &a.ty)
                    .collect::<Vec<_>>();
                let agg_tys = agg_args.iter().map(|a| &a.ty).collect::<Vec<_>>();
                if tail != agg_tys {
                    ctx.reporter.error_span(
                        span,
                        "a hypothetical aggregate's trailing direct arguments must \
                         match its aggregated arguments"
                    );
                    ok = false;
                }
            }
        }
        match self.attrs.variadic.0.len() {
            0 | 1 => {}
            2 => {
                if !ordered_set {
                    ctx.reporter.error_span(
                        span,
                        "two variadic flags describe an ordered-set aggregate"
                    );
                    ok = false;
                }
            }
            n => {
                ctx.reporter
                    .error_span(span, format!("variadic takes one or two flags, not {n}"));
                ok = false;
            }
        }
        let is_variadic = self.attrs.variadic.0.iter().any(|b| *b);
        if self.attrs.sort_operator.is_some()
            && (agg_args.len() != 1 || ordered_set || is_variadic)
        {
            ctx.reporter.error_span(
                span,
                "sort_operator needs a unary, non-ordered-set, non-variadic aggregate"
            );
            ok = false;
        }
        let internal = DbType::catalog("internal");
        if (plan.serialize.is_some() || plan.deserialize.is_some())
            && (plan.combine.is_none() || state != internal)
        {
            ctx.reporter.error_span(
                span,
                "serialize/deserialize need combine= and an internal state type"
            );
            ok = false;
        }
        let moving = self.attrs.moving_plan.clone();
        if let Some(m) = &moving
            && m.remove.is_none()
        {
            ctx.reporter
                .error_span(span, "a moving plan needs a remove function");
            ok = false;
        }
        if finish.is_none() && !direct_args.is_empty() {
            ctx.reporter.error_span(
                span,
                "direct arguments without a finisher cannot be consumed"
            );
            ok = false;
        }
        if !ok {
            return false;
        }

        // dependency tags
        if let Some(tag) = state.depend_tag() {
            self.requires.insert(tag);
        }
        for arg in agg_args.iter().chain(&direct_args) {
            if let Some(tag) = arg.ty.depend_tag() {
                self.requires.insert(tag);
            }
        }
        let accumulate_sig: Vec<DbType> = std::iter::once(state.clone())
            .chain(agg_args.iter().map(|a| a.ty.clone()))
            .collect();
        self.requires
            .insert(DependTag::Function(accumulate.clone(), accumulate_sig.clone()));
        if let Some(c) = parse_fn_name(plan.combine.as_deref(), ctx, span, &mut ok) {
            self.requires
                .insert(DependTag::Function(c.clone(), vec![state.clone(), state.clone()]));
        }
        if let Some(f) = &finish
            && !plan.polymorphic
        {
            self.requires
                .insert(DependTag::Function(f.clone(), vec![state.clone()]));
        }
        if let Some(m) = &moving {
            if let Some(r) = parse_fn_name(m.remove.as_deref(), ctx, span, &mut ok) {
                let mstate = m
                    .state_type
                    .as_deref()
                    .map_or_else(|| state.clone(), DbType::from_annotation);
                let msig: Vec<DbType> = std::iter::once(mstate)
                    .chain(agg_args.iter().map(|a| a.ty.clone()))
                    .collect();
                self.requires.insert(DependTag::Function(r, msig));
            }
        }
        let sortop = match self.attrs.sort_operator.as_deref() {
            None => None,
            Some(text) => match parse_operator_name(text) {
                Ok(q) => {
                    let arg = agg_args.first().map(|a| a.ty.clone());
                    self.requires
                        .insert(DependTag::Operator(q.clone(), [arg.clone(), arg]));
                    Some(q)
                }
                Err(e) => {
                    ctx.reporter.error_span(span, e);
                    return false;
                }
            }
        };
        explicit_tags(&self.attrs.requires, &mut self.requires);
        explicit_tags(&self.attrs.provides, &mut self.provides);
        if !ok {
            return false;
        }

        // rendering
        let render_args = |args: &[AggArg], variadic: bool| -> String {
            args.iter()
                .enumerate()
                .map(|(i, a)| {
                    let mut s = String::new();
                    if variadic && i + 1 == args.len() {
                        s.push_str("VARIADIC ");
                    }
                    if let Some(n) = &a.name {
                        s.push_str(&n.deparse_quoted());
                        s.push(' ');
                    }
                    s.push_str(&a.ty.to_sql(false));
                    s
                })
                .collect::<Vec<_>>()
                .join(", ")
        };
        let (direct_variadic, agg_variadic) = match self.attrs.variadic.0.as_slice() {
            [d, a] => (*d, *a),
            [a] => (false, *a),
            _ => (false, false)
        };
        let header_args = if ordered_set {
            format!(
                "{} ORDER BY {}",
                render_args(&direct_args, direct_variadic),
                render_args(&agg_args, agg_variadic)
            )
        } else if agg_args.is_empty() {
            "*".to_owned()
        } else {
            render_args(&agg_args, agg_variadic)
        };

        let mut clauses: Vec<String> = Vec::new();
        clauses.push(format!("STYPE = {}", state.to_sql(false)));
        if let Some(n) = plan.state_size {
            clauses.push(format!("SSPACE = {n}"));
        }
        if let Some(init) = plan.initial_state.as_deref() {
            clauses.push(format!("INITCOND = {}", e_quote(init)));
        }
        clauses.push(format!("SFUNC = {}", accumulate.deparse()));
        push_plan_clauses(&mut clauses, &plan, finish.as_ref(), "");
        if let Some(m) = &moving {
            let mstate = m
                .state_type
                .as_deref()
                .map_or_else(|| state.clone(), DbType::from_annotation);
            clauses.push(format!("MSTYPE = {}", mstate.to_sql(false)));
            if let Some(n) = m.state_size {
                clauses.push(format!("MSSPACE = {n}"));
            }
            if let Some(init) = m.initial_state.as_deref() {
                clauses.push(format!("MINITCOND = {}", e_quote(init)));
            }
            let maccum = m
                .accumulate
                .as_deref()
                .and_then(|t| Qualified::from_sql(t).ok())
                .unwrap_or_else(|| accumulate.clone());
            clauses.push(format!("MSFUNC = {}", maccum.deparse()));
            if let Some(r) = m.remove.as_deref()
                && let Ok(q) = Qualified::from_sql(r)
            {
                clauses.push(format!("MINVFUNC = {}", q.deparse()));
            }
            let mfinish = m.finish.as_deref().and_then(|t| Qualified::from_sql(t).ok());
            push_plan_clauses(&mut clauses, m, mfinish.as_ref(), "M");
        }
        if let Some(op) = &sortop {
            clauses.push(format!("SORTOP = {op}"));
        }
        if let Some(p) = self.attrs.parallel {
            clauses.push(format!("PARALLEL = {}", p.sql()));
        }
        if self.attrs.hypothetical {
            clauses.push("HYPOTHETICAL".to_owned());
        }

        self.deploy.push(format!(
            "CREATE AGGREGATE {}({}) (\n\t{}\n)",
            qname.deparse(),
            header_args,
            clauses.join(",\n\t")
        ));
        if let Some(c) = resolve_comment(self.attrs.comment.as_deref(), self.doc.as_ref()) {
            self.deploy.push(format!(
                "COMMENT ON AGGREGATE {}({}) IS {}",
                qname.deparse(),
                header_args,
                e_quote(&c)
            ));
        }
        self.undeploy
            .push(format!("DROP AGGREGATE {}({})", qname.deparse(), header_args));
        true
    }
}

/// Parse an optional function name, reporting but tolerating failure.
fn parse_fn_name(
    text: Option<&str>,
    ctx: &mut Ctx<'_>,
    span: Span,
    ok: &mut bool
) -> Option<Qualified<Simple>> {
    match text {
        None => None,
        Some(t) => match Qualified::from_sql(t) {
            Ok(q) => Some(q),
            Err(e) => {
                ctx.reporter.error_span(span, e);
                *ok = false;
                None
            }
        }
    }
}

/// Append the FINALFUNC/COMBINEFUNC/SERIALFUNC clause family, with an
/// `M` prefix for the moving plan.
fn push_plan_clauses(
    clauses: &mut Vec<String>,
    plan: &PlanAttrs,
    finish: Option<&Qualified<Simple>>,
    prefix: &str
) {
    if let Some(f) = finish {
        clauses.push(format!("{prefix}FINALFUNC = {}", f.deparse()));
    }
    if plan.polymorphic {
        clauses.push(format!("{prefix}FINALFUNC_EXTRA"));
    }
    if let Some(e) = plan.finish_effect {
        clauses.push(format!("{prefix}FINALFUNC_MODIFY = {}", e.sql()));
    }
    if prefix.is_empty() {
        if let Some(c) = plan.combine.as_deref()
            && let Ok(q) = Qualified::from_sql(c)
        {
            clauses.push(format!("COMBINEFUNC = {}", q.deparse()));
        }
        if let Some(s) = plan.serialize.as_deref()
            && let Ok(q) = Qualified::from_sql(s)
        {
            clauses.push(format!("SERIALFUNC = {}", q.deparse()));
        }
        if let Some(d) = plan.deserialize.as_deref()
            && let Ok(q) = Qualified::from_sql(d)
        {
            clauses.push(format!("DESERIALFUNC = {}", q.deparse()));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use darling::FromMeta;
    use syn::parse_quote;

    use super::*;
    use crate::{
        attrs::Effects,
        report::Reporter,
        snippet::FunctionFacts,
        typemap::TypeMapper
    };

    fn accumulator_facts() -> FunctionFacts {
        FunctionFacts {
            qname: Qualified::from_sql("acc").unwrap(),
            params: vec![DbType::catalog("float8"), DbType::catalog("float8")],
            param_names: vec![
                Simple::from_host("state").unwrap(),
                Simple::from_host("x").unwrap()
            ],
            returns: DbType::catalog("float8"),
            effects: Effects::Immutable,
            language: "rust".into(),
            rust_path: "acc".into(),
            requires: BTreeSet::new()
        }
    }

    fn run(attr: syn::Attribute) -> (Aggregate, Reporter, bool) {
        let parsed = AggregateAttrs::from_meta(&attr.meta).unwrap();
        let mut agg = Aggregate::new(
            parsed,
            "acc".to_owned(),
            "acc".to_owned(),
            None,
            Span::call_site()
        );
        let mut mapper = TypeMapper::new();
        mapper.freeze();
        let mut reporter = Reporter::new();
        let mut facts = BTreeMap::new();
        facts.insert("acc".to_owned(), accumulator_facts());
        let mut operators = BTreeMap::new();
        let ok = {
            let mut ctx = Ctx {
                mapper: &mapper,
                reporter: &mut reporter,
                facts: &mut facts,
                operators: &mut operators,
                default_implementor: None,
                trusted: "rust".into(),
                untrusted: "rustU".into(),
                extra: Vec::new()
            };
            agg.characterize(&mut ctx)
        };
        (agg, reporter, ok)
    }

    #[test]
    fn accumulator_infers_state_and_args() {
        let (agg, r, ok) = run(parse_quote!(#[aggregate(name = "my_avg")]));
        assert!(ok, "{:?}", r.diagnostics());
        let create = &agg.deploy[0];
        assert!(create.starts_with("CREATE AGGREGATE my_avg(\"x\" pg_catalog.float8) (\n\t"));
        assert!(create.contains("STYPE = pg_catalog.float8"));
        assert!(create.contains("SFUNC = acc"));
        assert_eq!(
            agg.undeploy,
            vec!["DROP AGGREGATE my_avg(\"x\" pg_catalog.float8)".to_owned()]
        );
    }

    #[test]
    fn requires_accumulator_with_signature() {
        let (agg, _, ok) = run(parse_quote!(#[aggregate()]));
        assert!(ok);
        assert!(
            agg.requires
                .iter()
                .any(|t| t.to_string()
                    == "(Function)acc(pg_catalog.float8,pg_catalog.float8)")
        );
    }

    #[test]
    fn finisher_form_uses_plan_accumulate() {
        let (agg, r, ok) = run(parse_quote!(#[aggregate(
            arguments = ["x pg_catalog.float8"],
            plan(accumulate = "other_acc", state_type = "pg_catalog.float8")
        )]));
        assert!(ok, "{:?}", r.diagnostics());
        let create = &agg.deploy[0];
        assert!(create.contains("SFUNC = other_acc"));
        assert!(create.contains("FINALFUNC = acc"));
    }

    #[test]
    fn plan_naming_both_rejected() {
        let (_, r, ok) = run(parse_quote!(#[aggregate(
            plan(accumulate = "a", finish = "f", state_type = "pg_catalog.int4")
        )]));
        assert!(!ok);
        assert!(r.has_errors());
    }

    #[test]
    fn moving_plan_requires_remove() {
        let (_, r, ok) = run(parse_quote!(#[aggregate(moving_plan(state_type = "pg_catalog.float8"))]));
        assert!(!ok);
        assert!(r.has_errors());
    }

    #[test]
    fn moving_plan_renders_m_clauses() {
        let (agg, r, ok) = run(parse_quote!(#[aggregate(
            moving_plan(remove = "acc_remove")
        )]));
        assert!(ok, "{:?}", r.diagnostics());
        let create = &agg.deploy[0];
        assert!(create.contains("MSTYPE = pg_catalog.float8"));
        assert!(create.contains("MSFUNC = acc"));
        assert!(create.contains("MINVFUNC = acc_remove"));
    }

    #[test]
    fn serialize_needs_combine_and_internal_state() {
        let (_, r, ok) = run(parse_quote!(#[aggregate(plan(serialize = "ser"))]));
        assert!(!ok);
        assert!(r.has_errors());
    }

    #[test]
    fn hypothetical_needs_ordered_set() {
        let (_, r, ok) = run(parse_quote!(#[aggregate(hypothetical)]));
        assert!(!ok);
        assert!(r.has_errors());
    }

    #[test]
    fn ordered_set_renders_order_by() {
        let (agg, r, ok) = run(parse_quote!(#[aggregate(
            arguments = ["x pg_catalog.float8"],
            direct_arguments = ["frac pg_catalog.float8"],
            plan(state_type = "pg_catalog.internal", accumulate = "osacc")
        )]));
        assert!(ok, "{:?}", r.diagnostics());
        assert!(
            agg.deploy[0].contains(
                "(\"frac\" pg_catalog.float8 ORDER BY \"x\" pg_catalog.float8)"
            ),
            "{}",
            agg.deploy[0]
        );
    }

    #[test]
    fn sort_operator_restrictions() {
        let (agg, r, ok) = run(parse_quote!(#[aggregate(sort_operator = ">")]));
        assert!(ok, "{:?}", r.diagnostics());
        assert!(agg.deploy[0].contains("SORTOP = >"));
        assert!(
            agg.requires
                .iter()
                .any(|t| t.to_string().starts_with("(Operator)>"))
        );

        let (_, r2, ok2) = run(parse_quote!(#[aggregate(variadic, sort_operator = ">")]));
        assert!(!ok2);
        assert!(r2.has_errors());
        let _ = r;
    }

    #[test]
    fn direct_args_without_finisher_rejected() {
        let (_, r, ok) = run(parse_quote!(#[aggregate(
            arguments = ["x pg_catalog.float8"],
            direct_arguments = ["d pg_catalog.int4"]
        )]));
        assert!(!ok);
        assert!(r.has_errors());
    }
}
