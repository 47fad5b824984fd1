// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Declared functions.
//!
//! The richest carrier: return-shape classification against the bridge's
//! marker types, contravariant parameter mapping, OUT-parameter
//! reconciliation, trigger ownership, and the `AS` reference string that
//! tells the runtime which Rust item to invoke.
//!
//! # Return shapes
//!
//! | Rust signature | SQL shape |
//! |----------------|-----------|
//! | `fn(..) -> T` | scalar `T` |
//! | `fn(.., &mut Record) -> bool` | may-be-composite (record) |
//! | `fn(..) -> SetOf<T>` | `SETOF` scalar `T` |
//! | `fn(..) -> SetOfRecords` | `SETOF` record |
//! | `fn(TriggerData)` | trigger |
//!
//! The `type =` and `out =` annotation elements are reconciled against
//! the shape; impossible combinations are reported and the snippet is
//! dropped from emission.

use std::collections::BTreeSet;

use crate::{
    attrs::{FunctionAttrs, OnNullInput, Security, Trust},
    dbtype::DbType,
    emit::e_quote,
    ident::{Qualified, Simple},
    snippet::{
        Ctx, FnElement, FunctionFacts, explicit_tags, parse_name_type, resolve_comment,
        resolve_implementor, resolve_qname
    },
    tag::DependTag,
    typemap::{SqlTypeSpec, canonical_type}
};

use super::trigger::Trigger;

/// How the Rust signature shapes the SQL declaration.
#[derive(Debug, Clone, PartialEq)]
enum ReturnShape {
    /// Plain scalar (or void) return.
    Scalar,
    /// Trailing `&mut Record` sink with a `bool` return.
    MaybeComposite,
    /// `SetOf<T>`: SETOF over a scalar element.
    SetOfScalar(syn::Type),
    /// `SetOfRecords`: SETOF over a composite.
    SetOfRecords,
    /// A trigger function.
    Trigger,
}

/// Carrier for one `#[function(...)]`.
#[derive(Debug)]
pub struct Function {
    /// The parsed payload.
    pub attrs: FunctionAttrs,
    /// The annotated fn item.
    pub element: FnElement,
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
    triggers: Vec<Trigger>,
}

impl Function {
    /// Wrap a freshly parsed payload.
    #[must_use]
    pub fn new(attrs: FunctionAttrs, element: FnElement) -> Self {
        Self {
            attrs,
            element,
            implementor: None,
            provides: BTreeSet::new(),
            requires: BTreeSet::new(),
            deploy: Vec::new(),
            undeploy: Vec::new(),
            triggers: Vec::new()
        }
    }

    pub(crate) fn characterize(&mut self, ctx: &mut Ctx<'_>) -> bool {
        let span = self.element.span;
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
            &self.element.name,
            ctx.reporter,
            span
        ) else {
            return false;
        };

        if self.attrs.trust.is_some() && self.attrs.language.is_some() {
            ctx.reporter
                .error_span(span, "trust and language are mutually exclusive");
            ok = false;
        }
        let language = match (&self.attrs.language, self.attrs.trust) {
            (Some(l), _) => l.clone(),
            (None, Some(Trust::Unsandboxed)) => ctx.untrusted.clone(),
            (None, _) => ctx.trusted.clone()
        };

        let shape = classify(&self.element);

        if !self.attrs.triggers.is_empty() && shape != ReturnShape::Trigger {
            ctx.reporter.error_span(
                span,
                "only a trigger function (one TriggerData parameter, no return) can have triggers"
            );
            ok = false;
        }
        if shape == ReturnShape::Trigger
            && (self.attrs.return_type.is_some() || !self.attrs.out.is_empty())
        {
            ctx.reporter
                .error_span(span, "a trigger function cannot declare type= or out=");
            ok = false;
        }

        // SQL-visible parameters: the record sink and the trigger data
        // parameter belong to the bridge, not the declaration
        let sql_params: Vec<(String, syn::Type)> = match shape {
            ReturnShape::Trigger => Vec::new(),
            ReturnShape::MaybeComposite => {
                self.element.params[..self.element.params.len() - 1].to_vec()
            }
            _ => self.element.params.clone()
        };

        // attach param(...) entries by name
        let mut specs: Vec<Option<SqlTypeSpec>> = vec![None; sql_params.len()];
        for entry in &self.attrs.params {
            match sql_params.iter().position(|(n, _)| *n == entry.name) {
                Some(i) => {
                    specs[i] = Some(SqlTypeSpec {
                        sql_type: entry.sql_type.clone(),
                        defaults: entry.default.0.clone(),
                        optional: entry.optional
                    });
                }
                None => {
                    ctx.reporter.error_span(
                        span,
                        format!("param entry {} matches no parameter", entry.name)
                    );
                    ok = false;
                }
            }
        }

        let mut param_names = Vec::with_capacity(sql_params.len());
        let mut param_types = Vec::with_capacity(sql_params.len());
        for ((name, ty), spec) in sql_params.iter().zip(&specs) {
            let pname = match Simple::from_host(name) {
                Ok(p) => p,
                Err(e) => {
                    ctx.reporter.error_span(span, e);
                    ok = false;
                    continue;
                }
            };
            match ctx.mapper.sql_type(ty, spec.as_ref(), true, true) {
                Ok(t) => {
                    param_names.push(pname);
                    param_types.push(t);
                }
                Err(e) => {
                    ctx.reporter.error_span(span, e);
                    ok = false;
                }
            }
        }

        // OUT parameters
        let mut out_params: Vec<(Simple, DbType)> = Vec::new();
        for entry in self.attrs.out.iter() {
            match parse_name_type(entry) {
                Ok((Some(n), t)) => out_params.push((n, t)),
                Ok((None, _)) => {
                    ctx.reporter
                        .error_span(span, format!("OUT parameter needs a name: {entry}"));
                    ok = false;
                }
                Err(e) => {
                    ctx.reporter.error_span(span, e);
                    ok = false;
                }
            }
        }

        let setof = matches!(
            shape,
            ReturnShape::SetOfScalar(_) | ReturnShape::SetOfRecords
        );
        let returns = self.resolve_returns(ctx, &shape, &out_params, &mut ok);

        if self.attrs.variadic && !param_types.last().is_some_and(DbType::is_array) {
            ctx.reporter
                .error_span(span, "a variadic function needs a trailing array parameter");
            ok = false;
        }
        if self.attrs.rows.is_some() && !setof {
            ctx.reporter
                .error_span(span, "rows= applies only to set-returning functions");
            ok = false;
        }

        let plain_sig: Vec<DbType> = param_types.iter().map(|t| t.strip_default().clone()).collect();
        self.provides
            .insert(DependTag::Function(qname.clone(), plain_sig.clone()));
        explicit_tags(&self.attrs.provides, &mut self.provides);

        if let Some(tag) = returns.depend_tag() {
            self.requires.insert(tag);
        }
        for t in &param_types {
            if let Some(tag) = t.depend_tag() {
                self.requires.insert(tag);
            }
        }
        for (_, t) in &out_params {
            if let Some(tag) = t.depend_tag() {
                self.requires.insert(tag);
            }
        }
        explicit_tags(&self.attrs.requires, &mut self.requires);

        // triggers
        self.triggers = self
            .attrs
            .triggers
            .iter()
            .cloned()
            .map(Trigger::new)
            .collect();
        for t in &mut self.triggers {
            if !t.characterize(&qname, ctx.reporter, span) {
                ok = false;
            }
        }

        if !ok {
            return false;
        }

        // rendering
        let effects = self.attrs.effects.unwrap_or_default();
        let mut decls: Vec<String> = Vec::new();
        let mut drop_sig: Vec<String> = Vec::new();
        for (i, (n, t)) in param_names.iter().zip(&param_types).enumerate() {
            let variadic = self.attrs.variadic && i + 1 == param_types.len();
            let prefix = if variadic { "VARIADIC " } else { "" };
            decls.push(format!("{prefix}{} {}", n.deparse_quoted(), t.to_sql(true)));
            drop_sig.push(format!("{prefix}{} {}", n.deparse_quoted(), t.to_sql(false)));
        }
        for (n, t) in &out_params {
            decls.push(format!("OUT {} {}", n.deparse_quoted(), t.to_sql(false)));
        }

        let mut markers = format!(" {}", effects.sql());
        match self.attrs.leakproof {
            Some(true) => markers.push_str(" LEAKPROOF"),
            Some(false) => markers.push_str(" NOT LEAKPROOF"),
            None => {}
        }
        if self.attrs.on_null_input == Some(OnNullInput::ReturnsNull) {
            markers.push_str(" RETURNS NULL ON NULL INPUT");
        }
        if self.attrs.security == Some(Security::Definer) {
            markers.push_str(" SECURITY DEFINER");
        }
        if let Some(p) = self.attrs.parallel {
            markers.push_str(" PARALLEL ");
            markers.push_str(p.sql());
        }
        if let Some(cost) = self.attrs.cost {
            markers.push_str(&format!(" COST {cost}"));
        }
        if let Some(rows) = self.attrs.rows {
            markers.push_str(&format!(" ROWS {rows}"));
        }

        let ret_rust = self
            .element
            .ret
            .as_ref()
            .map_or_else(|| "()".to_owned(), canonical_type);
        let args_rust: Vec<String> = self
            .element
            .params
            .iter()
            .map(|(_, t)| canonical_type(t))
            .collect();
        let as_ref = format!("{ret_rust}={}({})", self.element.path, args_rust.join(","));

        let create = render_create(&FnRender {
            qname: &qname,
            param_decls: &decls,
            setof,
            returns: &returns,
            language: &language,
            markers: &markers,
            settings: &self.attrs.settings.0,
            as_ref: &as_ref
        });
        self.deploy.push(create);

        let comment = resolve_comment(self.attrs.comment.as_deref(), self.element.doc.as_ref());
        if let Some(c) = comment {
            self.deploy.push(format!(
                "COMMENT ON FUNCTION {}({}) IS {}",
                qname.deparse(),
                join_sig(&drop_sig),
                e_quote(&c)
            ));
        }
        for t in &self.triggers {
            self.deploy.push(t.deploy_string().to_owned());
            if let Some(c) = t.comment_string() {
                self.deploy.push(c.to_owned());
            }
        }

        for t in &self.triggers {
            self.undeploy.push(t.undeploy_string().to_owned());
        }
        self.undeploy.push(render_drop(&qname, &drop_sig));

        ctx.facts.insert(
            self.element.path.clone(),
            FunctionFacts {
                qname,
                params: plain_sig,
                param_names,
                returns,
                effects,
                language,
                rust_path: self.element.path.clone(),
                requires: self.requires.clone()
            }
        );
        true
    }

    /// Reconcile `out=` and `type=` against the return shape.
    fn resolve_returns(
        &self,
        ctx: &mut Ctx<'_>,
        shape: &ReturnShape,
        out_params: &[(Simple, DbType)],
        ok: &mut bool
    ) -> DbType {
        let span = self.element.span;
        let record = DbType::reserved("record");
        let type_anno = self.attrs.return_type.as_deref();
        let is_record_kw = type_anno.is_some_and(|t| t.trim().eq_ignore_ascii_case("record"));

        if *shape == ReturnShape::Trigger {
            return DbType::catalog("trigger");
        }
        match (out_params.len(), type_anno) {
            (0, None) => match shape {
                ReturnShape::MaybeComposite | ReturnShape::SetOfRecords => record,
                ReturnShape::SetOfScalar(elem) => {
                    match ctx.mapper.sql_type(elem, None, false, false) {
                        Ok(t) => t,
                        Err(e) => {
                            ctx.reporter.error_span(span, e);
                            *ok = false;
                            record
                        }
                    }
                }
                _ => match &self.element.ret {
                    None => DbType::catalog("void"),
                    Some(ret) => match ctx.mapper.sql_type(ret, None, false, false) {
                        Ok(t) => t,
                        Err(e) => {
                            ctx.reporter.error_span(span, e);
                            *ok = false;
                            record
                        }
                    }
                }
            },
            (0, Some(_)) if is_record_kw => record,
            (0, Some(t)) => DbType::from_annotation(t),
            (1, None) => {
                if *shape == ReturnShape::MaybeComposite {
                    ctx.reporter.error_span(
                        span,
                        "a record-sink function with one OUT parameter needs type=RECORD"
                    );
                    *ok = false;
                }
                out_params[0].1.clone()
            }
            (1, Some(_)) if is_record_kw => {
                ctx.reporter.warn_span(
                    span,
                    "single OUT parameter with type=RECORD relies on backend support"
                );
                record
            }
            (1, Some(_)) => {
                ctx.reporter
                    .error_span(span, "a single OUT parameter carries its own type");
                *ok = false;
                record
            }
            (_, None) => record,
            (_, Some(_)) => {
                ctx.reporter
                    .error_span(span, "type= cannot combine with multiple OUT parameters");
                *ok = false;
                record
            }
        }
    }
}

/// Classify the Rust signature against the bridge's marker types.
fn classify(element: &FnElement) -> ReturnShape {
    match &element.ret {
        None => {
            if element.params.len() == 1 && canonical_type(&element.params[0].1) == "TriggerData" {
                ReturnShape::Trigger
            } else {
                ReturnShape::Scalar
            }
        }
        Some(ret) => {
            let ret_canon = canonical_type(ret);
            if ret_canon == "bool" && has_record_sink(element) {
                return ReturnShape::MaybeComposite;
            }
            if ret_canon == "SetOfRecords" {
                return ReturnShape::SetOfRecords;
            }
            if let Some(elem) = set_of_element(ret) {
                return ReturnShape::SetOfScalar(elem.clone());
            }
            ReturnShape::Scalar
        }
    }
}

/// Whether the last parameter is a `&mut Record` sink.
fn has_record_sink(element: &FnElement) -> bool {
    let Some((_, ty)) = element.params.last() else {
        return false;
    };
    match ty {
        syn::Type::Reference(r) => r.mutability.is_some() && canonical_type(&r.elem) == "Record",
        _ => false
    }
}

/// The `T` of a `SetOf<T>` return.
fn set_of_element(ty: &syn::Type) -> Option<&syn::Type> {
    let syn::Type::Path(p) = ty else {
        return None;
    };
    let seg = p.path.segments.last()?;
    if seg.ident != "SetOf" {
        return None;
    }
    let syn::PathArguments::AngleBracketed(ab) = &seg.arguments else {
        return None;
    };
    ab.args.iter().find_map(|a| match a {
        syn::GenericArgument::Type(t) => Some(t),
        _ => None
    })
}

/// Everything needed to render one CREATE FUNCTION.
pub(crate) struct FnRender<'a> {
    pub qname: &'a Qualified<Simple>,
    pub param_decls: &'a [String],
    pub setof: bool,
    pub returns: &'a DbType,
    pub language: &'a str,
    pub markers: &'a str,
    pub settings: &'a [String],
    pub as_ref: &'a str,
}

/// Render a CREATE OR REPLACE FUNCTION command.
pub(crate) fn render_create(r: &FnRender<'_>) -> String {
    let mut s = format!("CREATE OR REPLACE FUNCTION {}(", r.qname.deparse());
    s.push_str(&join_sig(r.param_decls));
    s.push_str(")\n\tRETURNS ");
    if r.setof {
        s.push_str("SETOF ");
    }
    s.push_str(&r.returns.to_sql(false));
    s.push_str("\n\tLANGUAGE ");
    s.push_str(r.language);
    s.push_str(r.markers);
    for setting in r.settings {
        s.push_str("\n\tSET ");
        s.push_str(setting);
    }
    s.push_str("\n\tAS ");
    s.push_str(&e_quote(r.as_ref));
    s
}

/// Render a DROP FUNCTION command over the IN-parameter signature.
pub(crate) fn render_drop(qname: &Qualified<Simple>, sig: &[String]) -> String {
    format!("DROP FUNCTION {}({})", qname.deparse(), join_sig(sig))
}

/// Join parameter declarations in the descriptor's one-per-line style.
pub(crate) fn join_sig(decls: &[String]) -> String {
    decls
        .iter()
        .map(|d| format!("\n\t{d}"))
        .collect::<Vec<_>>()
        .join(",")
}
