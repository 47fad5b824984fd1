// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Casts.
//!
//! A cast either annotates a conversion function (the usual case: source
//! type from the first parameter, target from the return) or stands
//! alone with explicit `from`/`to` types and a BINARY or INOUT path.
//! A standalone FUNCTION-path cast would need a way to name a function
//! that is not in this compilation; that remains unsupported.

use std::collections::BTreeSet;

use proc_macro2::Span;

use crate::{
    attrs::{CastApplication, CastAttrs, CastPath},
    dbtype::DbType,
    emit::e_quote,
    snippet::{Ctx, explicit_tags, is_boolean, resolve_comment, resolve_implementor},
    tag::DependTag
};

/// Carrier for one `#[cast(...)]`.
#[derive(Debug)]
pub struct Cast {
    /// The parsed payload.
    pub attrs: CastAttrs,
    /// The annotated fn's element path, when the cast rides a function.
    pub element_path: Option<String>,
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

impl Cast {
    /// Wrap a freshly parsed payload.
    #[must_use]
    pub fn new(
        attrs: CastAttrs,
        element_path: Option<String>,
        doc: Option<String>,
        span: Span
    ) -> Self {
        Self {
            attrs,
            element_path,
            doc,
            span,
            implementor: None,
            provides: BTreeSet::new(),
            requires: BTreeSet::new(),
            deploy: Vec::new(),
            undeploy: Vec::new()
        }
    }

    pub(crate) fn characterize(&mut self, ctx: &mut Ctx<'_>) -> bool {
        let span = self.span;
        self.implementor = resolve_implementor(
            self.attrs.implementor.as_deref(),
            ctx.default_implementor.as_ref(),
            ctx.reporter,
            span
        );

        let facts = self
            .element_path
            .as_ref()
            .and_then(|p| ctx.facts.get(p));

        // resolve the conversion route
        let with_clause: String;
        let from: DbType;
        let to: DbType;
        match facts {
            Some(f) => {
                if !(1..=3).contains(&f.params.len()) {
                    ctx.reporter.error_span(
                        span,
                        "a cast function takes the value and at most a typmod and a bool"
                    );
                    return false;
                }
                if f.params.len() >= 2
                    && f.params[1] != DbType::catalog("int4")
                    && f.params[1] != DbType::reserved("integer")
                {
                    ctx.reporter
                        .error_span(span, "a cast function's second parameter must be integer");
                    return false;
                }
                if f.params.len() == 3 && !is_boolean(&f.params[2]) {
                    ctx.reporter
                        .error_span(span, "a cast function's third parameter must be boolean");
                    return false;
                }
                if self.attrs.path.is_some_and(|p| p != CastPath::Function) {
                    ctx.reporter.error_span(
                        span,
                        "a cast annotating a function cannot choose another path"
                    );
                    return false;
                }
                from = match self.attrs.from.as_deref() {
                    Some(t) => DbType::from_annotation(t),
                    None => f.params[0].clone()
                };
                to = match self.attrs.to.as_deref() {
                    Some(t) => DbType::from_annotation(t),
                    None => f.returns.clone()
                };
                if from == to && f.params.len() == 1 {
                    ctx.reporter.error_span(
                        span,
                        "a cast between a type and itself needs modifier parameters"
                    );
                    return false;
                }
                let sig: Vec<String> = f.params.iter().map(|t| t.to_sql(false)).collect();
                with_clause = format!("WITH FUNCTION {}({})", f.qname.deparse(), sig.join(", "));
                self.requires
                    .insert(DependTag::Function(f.qname.clone(), f.params.clone()));
            }
            None => {
                if self.element_path.is_some() {
                    ctx.reporter.error_span(
                        span,
                        "a cast on a fn needs a #[function] on the same fn"
                    );
                    return false;
                }
                let (Some(from_text), Some(to_text)) =
                    (self.attrs.from.as_deref(), self.attrs.to.as_deref())
                else {
                    ctx.reporter.error_span(
                        span,
                        "a standalone cast needs explicit from and to types"
                    );
                    return false;
                };
                from = DbType::from_annotation(from_text);
                to = DbType::from_annotation(to_text);
                with_clause = match self.attrs.path {
                    Some(CastPath::Binary) => "WITHOUT FUNCTION".to_owned(),
                    Some(CastPath::Inout) => "WITH INOUT".to_owned(),
                    Some(CastPath::Function) => {
                        ctx.reporter.error_span(
                            span,
                            "a standalone FUNCTION-path cast is not yet supported"
                        );
                        return false;
                    }
                    None => {
                        ctx.reporter
                            .error_span(span, "a standalone cast needs a path");
                        return false;
                    }
                };
                if from == to {
                    ctx.reporter.error_span(
                        span,
                        "a cast between a type and itself needs modifier parameters"
                    );
                    return false;
                }
            }
        }

        if let Some(tag) = from.depend_tag() {
            self.requires.insert(tag);
        }
        if let Some(tag) = to.depend_tag() {
            self.requires.insert(tag);
        }
        explicit_tags(&self.attrs.requires, &mut self.requires);
        explicit_tags(&self.attrs.provides, &mut self.provides);

        let pair = format!("({} AS {})", from.to_sql(false), to.to_sql(false));
        let mut create = format!("CREATE CAST {pair}\n\t{with_clause}");
        match self.attrs.application.unwrap_or_default() {
            CastApplication::Explicit => {}
            CastApplication::Assignment => create.push_str("\n\tAS ASSIGNMENT"),
            CastApplication::Implicit => create.push_str("\n\tAS IMPLICIT")
        }
        self.deploy.push(create);
        if let Some(c) = resolve_comment(self.attrs.comment.as_deref(), self.doc.as_ref()) {
            self.deploy
                .push(format!("COMMENT ON CAST {pair} IS {}", e_quote(&c)));
        }
        self.undeploy.push(format!("DROP CAST {pair}"));
        true
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
        ident::Qualified,
        report::Reporter,
        snippet::FunctionFacts,
        typemap::TypeMapper
    };

    fn facts_to_int() -> FunctionFacts {
        FunctionFacts {
            qname: Qualified::from_sql("toI").unwrap(),
            params: vec![DbType::catalog("varchar")],
            param_names: vec![],
            returns: DbType::catalog("int4"),
            effects: Effects::Immutable,
            language: "rust".into(),
            rust_path: "toI".into(),
            requires: BTreeSet::new()
        }
    }

    fn run(attr: syn::Attribute, with_facts: bool) -> (Cast, Reporter, bool) {
        let parsed = CastAttrs::from_meta(&attr.meta).unwrap();
        let element = with_facts.then(|| "toI".to_owned());
        let mut cast = Cast::new(parsed, element.clone(), None, Span::call_site());
        let mut mapper = TypeMapper::new();
        mapper.freeze();
        let mut reporter = Reporter::new();
        let mut facts = BTreeMap::new();
        if with_facts {
            facts.insert("toI".to_owned(), facts_to_int());
        }
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
            cast.characterize(&mut ctx)
        };
        (cast, reporter, ok)
    }

    #[test]
    fn method_cast_renders_with_function() {
        let (cast, r, ok) = run(parse_quote!(#[cast(application = "implicit")]), true);
        assert!(ok, "{:?}", r.diagnostics());
        assert_eq!(
            cast.deploy[0],
            "CREATE CAST (pg_catalog.varchar AS pg_catalog.int4)\
             \n\tWITH FUNCTION toI(pg_catalog.varchar)\
             \n\tAS IMPLICIT"
        );
        assert_eq!(
            cast.undeploy,
            vec!["DROP CAST (pg_catalog.varchar AS pg_catalog.int4)".to_owned()]
        );
        assert!(
            cast.requires
                .iter()
                .any(|t| t.to_string() == "(Function)toI(pg_catalog.varchar)")
        );
    }

    #[test]
    fn standalone_binary_cast() {
        let (cast, _, ok) = run(
            parse_quote!(#[cast(from = "pg_catalog.int4", to = "pg_catalog.oid", path = "binary")]),
            false
        );
        assert!(ok);
        assert!(cast.deploy[0].contains("\n\tWITHOUT FUNCTION"));
    }

    #[test]
    fn standalone_inout_cast() {
        let (cast, _, ok) = run(
            parse_quote!(#[cast(from = "a.t1", to = "a.t2", path = "inout", application = "assignment")]),
            false
        );
        assert!(ok);
        assert!(cast.deploy[0].contains("\n\tWITH INOUT\n\tAS ASSIGNMENT"));
    }

    #[test]
    fn standalone_without_types_rejected() {
        let (_, r, ok) = run(parse_quote!(#[cast(path = "binary")]), false);
        assert!(!ok);
        assert!(r.has_errors());
    }

    #[test]
    fn standalone_function_path_unsupported() {
        let (_, r, ok) = run(
            parse_quote!(#[cast(from = "a.t1", to = "a.t2", path = "function")]),
            false
        );
        assert!(!ok);
        assert!(
            r.diagnostics()[0].message.contains("not yet supported"),
            "{:?}",
            r.diagnostics()
        );
    }

    #[test]
    fn self_cast_needs_modifiers() {
        let (_, r, ok) = run(
            parse_quote!(#[cast(from = "pg_catalog.int4", to = "pg_catalog.int4", path = "binary")]),
            false
        );
        assert!(!ok);
        assert!(r.has_errors());
    }
}
