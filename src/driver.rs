// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! The driver: rounds in, descriptor out.
//!
//! Each call to [`Driver::add_source`] is one processing round. The
//! round walks the file's items, populates a carrier for every
//! recognized attribute, then characterizes the round's carriers in
//! dependency-friendly order (functions first, so casts, operators, and
//! aggregates can look their facts up). Characterized snippets
//! accumulate across rounds; [`Driver::finish`] schedules them and
//! renders the descriptor.
//!
//! Fatal diagnostics never stop a round early — everything is validated
//! so everything is reported — but they do suppress emission.

use std::collections::BTreeMap;

use proc_macro2::Span;
use quote::ToTokens;
use syn::spanned::Spanned;

use crate::{
    attrs::{
        AggregateAttrs, BaseUdtAttrs, CastAttrs, FunctionAttrs, MappedUdtAttrs, OperatorAttrs,
        SqlActionAttrs
    },
    dbtype::DbType,
    emit,
    report::Reporter,
    schedule,
    snippet::{
        Aggregate, BaseUdt, Cast, Ctx, FnElement, Function, FunctionFacts, MappedUdt, Operator,
        OperatorFacts, Snippet, SqlAction, base_udt::IoRole
    },
    synth,
    typemap::TypeMapper,
    utils::extract_doc_summary
};

/// Driver configuration, mirroring the original processor option keys.
#[derive(Debug, Clone)]
pub struct Options {
    /// Name of the trusted language binding (`ddr.name.trusted`).
    pub trusted_language: String,
    /// Name of the untrusted binding (`ddr.name.untrusted`).
    pub untrusted_language: String,
    /// Default implementor name (`ddr.implementor`); `None` disables
    /// wrapping by default.
    pub implementor: Option<String>,
    /// Output file name (`ddr.output`).
    pub output: String,
    /// Deterministic tie-breaking (`ddr.reproducible`).
    pub reproducible: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            trusted_language: "rust".to_owned(),
            untrusted_language: "rustU".to_owned(),
            implementor: Some("PostgreSQL".to_owned()),
            output: "deployment.ddr".to_owned(),
            reproducible: false
        }
    }
}

impl Options {
    /// Build options from textual key/value pairs.
    ///
    /// # Errors
    ///
    /// Returns a message for an unrecognized key or a malformed value.
    pub fn from_pairs<I>(pairs: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = (String, String)>
    {
        let mut options = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "ddr.name.trusted" => options.trusted_language = value,
                "ddr.name.untrusted" => options.untrusted_language = value,
                "ddr.implementor" => {
                    options.implementor = if value == "-" { None } else { Some(value) };
                }
                "ddr.output" => options.output = value,
                "ddr.reproducible" => {
                    options.reproducible = value
                        .parse()
                        .map_err(|_| format!("ddr.reproducible needs true or false, got {value}"))?;
                }
                other => return Err(format!("unrecognized option {other}"))
            }
        }
        Ok(options)
    }
}

/// The finished descriptor plus everything worth telling the caller.
#[derive(Debug)]
pub struct Output {
    /// The full descriptor text.
    pub descriptor: String,
    /// Warnings collected along the way.
    pub warnings: Vec<String>,
    /// The configured output file name.
    pub file_name: String,
}

impl Output {
    /// Write the descriptor through any sink.
    ///
    /// # Errors
    ///
    /// Propagates the sink's I/O errors.
    pub fn write_to<W: std::io::Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(self.descriptor.as_bytes())
    }
}

/// Methods found in impl blocks, waiting to be matched to a base type.
#[derive(Default)]
struct PendingImpls {
    /// type name → role index → paths of candidate methods
    methods: BTreeMap<String, [Vec<String>; 4]>,
}

/// Orchestrates populate → characterize → synthesize → schedule → emit.
pub struct Driver {
    options: Options,
    mapper: TypeMapper,
    reporter: Reporter,
    round: Vec<Snippet>,
    scheduled: Vec<Snippet>,
    facts: BTreeMap<String, FunctionFacts>,
    operators: BTreeMap<(String, String), OperatorFacts>,
}

impl Driver {
    /// A fresh driver.
    #[must_use]
    pub fn new(options: Options) -> Self {
        Self {
            options,
            mapper: TypeMapper::new(),
            reporter: Reporter::new(),
            round: Vec::new(),
            scheduled: Vec::new(),
            facts: BTreeMap::new(),
            operators: BTreeMap::new()
        }
    }

    /// Process one batch of annotated source (one round).
    pub fn add_source(&mut self, file: &syn::File) {
        let mut pending = PendingImpls::default();
        self.walk_items(&file.items, "", &mut pending);
        self.end_round(pending);
    }

    /// Warnings collected so far.
    #[must_use]
    pub fn warnings(&self) -> Vec<String> {
        self.reporter.warnings()
    }

    /// Schedule everything and render the descriptor.
    ///
    /// # Errors
    ///
    /// Returns every collected diagnostic as one accumulated error when
    /// anything fatal was reported, when scheduling fails, or when a
    /// produced command would not survive the descriptor lexer.
    pub fn finish(mut self) -> Result<Output, darling::Error> {
        if self.reporter.has_errors() {
            return Err(self.reporter.into_error().expect("has errors"));
        }
        let Some((install, remove)) = schedule::schedule(
            &mut self.scheduled,
            self.options.reproducible,
            self.options.implementor.as_deref(),
            &mut self.reporter
        ) else {
            return Err(self.reporter.into_error().expect("schedule reported"));
        };

        for item in install.iter().chain(&remove) {
            if let Err(e) = emit::check_lexable(&item.sql) {
                self.reporter
                    .error(format!("{e}, in command starting {:.40}", item.sql));
            }
        }
        if self.reporter.has_errors() {
            return Err(self.reporter.into_error().expect("has errors"));
        }

        let descriptor = emit::render(&install, &remove);
        let warnings = self.reporter.warnings();
        Ok(Output {
            descriptor,
            warnings,
            file_name: self.options.output
        })
    }

    fn walk_items(&mut self, items: &[syn::Item], module: &str, pending: &mut PendingImpls) {
        for item in items {
            match item {
                syn::Item::Fn(f) => self.visit_fn(f, module),
                syn::Item::Struct(s) => self.visit_struct(s, module),
                syn::Item::Impl(i) => visit_impl(i, module, pending),
                syn::Item::Mod(m) => {
                    self.visit_sql_actions(&m.attrs);
                    if let Some((_, items)) = &m.content {
                        let inner = if module.is_empty() {
                            m.ident.to_string()
                        } else {
                            format!("{module}::{}", m.ident)
                        };
                        self.walk_items(items, &inner, pending);
                    }
                }
                _ => {}
            }
        }
    }

    /// Collect `#[sql_action]`s from any item's attributes.
    fn visit_sql_actions(&mut self, attrs: &[syn::Attribute]) {
        for attr in attrs {
            if attr.path().is_ident("sql_action") {
                if let Some(parsed) = self.parse_payload::<SqlActionAttrs>(attr) {
                    self.round
                        .push(Snippet::SqlAction(SqlAction::new(parsed, attr.span())));
                }
            }
        }
    }

    fn visit_fn(&mut self, item: &syn::ItemFn, module: &str) {
        self.visit_sql_actions(&item.attrs);
        let name = item.sig.ident.to_string();
        let path = if module.is_empty() {
            name.clone()
        } else {
            format!("{module}::{name}")
        };
        let element = FnElement {
            path: path.clone(),
            name,
            params: item
                .sig
                .inputs
                .iter()
                .filter_map(|arg| match arg {
                    syn::FnArg::Typed(pt) => {
                        let pname = match &*pt.pat {
                            syn::Pat::Ident(id) => id.ident.to_string(),
                            other => other.to_token_stream().to_string()
                        };
                        Some((pname, (*pt.ty).clone()))
                    }
                    syn::FnArg::Receiver(_) => None
                })
                .collect(),
            ret: match &item.sig.output {
                syn::ReturnType::Default => None,
                syn::ReturnType::Type(_, ty) => Some((**ty).clone())
            },
            doc: extract_doc_summary(&item.attrs),
            span: item.sig.ident.span()
        };

        let mut function_seen = false;
        for attr in &item.attrs {
            if attr.path().is_ident("function") {
                if function_seen {
                    self.reporter
                        .error_span(attr.span(), "only one #[function] per fn");
                    continue;
                }
                function_seen = true;
                if let Some(parsed) = self.parse_payload::<FunctionAttrs>(attr) {
                    self.round
                        .push(Snippet::Function(Box::new(Function::new(
                            parsed,
                            element.clone()
                        ))));
                }
            } else if attr.path().is_ident("cast") {
                if let Some(parsed) = self.parse_payload::<CastAttrs>(attr) {
                    self.round.push(Snippet::Cast(Cast::new(
                        parsed,
                        Some(path.clone()),
                        element.doc.clone(),
                        attr.span()
                    )));
                }
            } else if attr.path().is_ident("operator") {
                if let Some(parsed) = self.parse_payload::<OperatorAttrs>(attr)
                    && let Some(op) = Operator::new(
                        parsed,
                        path.clone(),
                        element.doc.clone(),
                        attr.span(),
                        &mut self.reporter
                    )
                {
                    self.round.push(Snippet::Operator(Box::new(op)));
                }
            } else if attr.path().is_ident("aggregate")
                && let Some(parsed) = self.parse_payload::<AggregateAttrs>(attr)
            {
                self.round.push(Snippet::Aggregate(Box::new(Aggregate::new(
                    parsed,
                    path.clone(),
                    element.name.clone(),
                    element.doc.clone(),
                    attr.span()
                ))));
            }
        }
    }

    fn visit_struct(&mut self, item: &syn::ItemStruct, module: &str) {
        self.visit_sql_actions(&item.attrs);
        let type_name = item.ident.to_string();
        let path = if module.is_empty() {
            type_name.clone()
        } else {
            format!("{module}::{type_name}")
        };
        let doc = extract_doc_summary(&item.attrs);
        for attr in &item.attrs {
            let is_base = attr.path().is_ident("base_udt");
            let is_mapped = attr.path().is_ident("mapped_udt");
            if !is_base && !is_mapped {
                continue;
            }
            if !matches!(item.vis, syn::Visibility::Public(_)) {
                self.reporter.error_span(
                    item.ident.span(),
                    format!("{type_name} must be public to be a user-defined type")
                );
                continue;
            }
            if is_base {
                if let Some(parsed) = self.parse_payload::<BaseUdtAttrs>(attr)
                    && let Some(udt) = BaseUdt::new(
                        parsed,
                        &type_name,
                        path.clone(),
                        doc.clone(),
                        item.ident.span(),
                        &mut self.reporter
                    )
                {
                    self.register_udt(&type_name, &udt.qname, item.ident.span());
                    self.round.push(Snippet::BaseUdt(Box::new(udt)));
                }
            } else if let Some(parsed) = self.parse_payload::<MappedUdtAttrs>(attr)
                && let Some(udt) = MappedUdt::new(
                    parsed,
                    &type_name,
                    path.clone(),
                    doc.clone(),
                    item.ident.span(),
                    &mut self.reporter
                )
            {
                self.register_udt(&type_name, &udt.qname, item.ident.span());
                self.round.push(Snippet::MappedUdt(udt));
            }
        }
    }

    /// Teach the type mapper about a newly declared UDT.
    fn register_udt(
        &mut self,
        type_name: &str,
        qname: &crate::ident::Qualified<crate::ident::Simple>,
        span: Span
    ) {
        if let Err(e) = self
            .mapper
            .add_mapping(type_name, DbType::named(qname.clone()))
        {
            self.reporter.error_span(span, e);
        }
    }

    fn parse_payload<T: darling::FromMeta>(&mut self, attr: &syn::Attribute) -> Option<T> {
        let result = match &attr.meta {
            // a bare `#[thing]` is a payload with every element defaulted
            syn::Meta::Path(_) => T::from_meta(&syn::parse_quote!(x())),
            other => T::from_meta(other)
        };
        match result {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                self.reporter.error_span(e.span(), e.to_string());
                None
            }
        }
    }

    /// Close out a round: match I/O methods, freeze the mapper, run the
    /// operator synthesizer, characterize everything.
    fn end_round(&mut self, pending: PendingImpls) {
        // match base types to their I/O methods
        for snippet in &mut self.round {
            let Snippet::BaseUdt(udt) = snippet else {
                continue;
            };
            let terminal = udt
                .rust_path
                .rsplit("::")
                .next()
                .unwrap_or(&udt.rust_path)
                .to_owned();
            if let Some(found) = pending.methods.get(&terminal) {
                for (slot, (role, candidates)) in udt
                    .io_paths
                    .iter_mut()
                    .zip(IoRole::ALL.iter().zip(found))
                {
                    match candidates.as_slice() {
                        [] => {}
                        [one] => *slot = Some(one.clone()),
                        many => {
                            self.reporter.error_span(
                                udt.span,
                                format!(
                                    "{} methods match the {} conversion of {terminal}",
                                    many.len(),
                                    role.method()
                                )
                            );
                        }
                    }
                }
            }
        }

        self.mapper.freeze();

        // operator synthesis, one element's group at a time
        let element_paths: Vec<String> = {
            let mut paths: Vec<String> = self
                .round
                .iter()
                .filter_map(|s| match s {
                    Snippet::Operator(o) => Some(o.element_path.clone()),
                    _ => None
                })
                .collect();
            paths.sort();
            paths.dedup();
            paths
        };
        for path in element_paths {
            let mut group: Vec<&mut Operator> = self
                .round
                .iter_mut()
                .filter_map(|s| match s {
                    Snippet::Operator(o) if o.element_path == path => Some(&mut **o),
                    _ => None
                })
                .collect();
            synth::pre_synthesize(&mut group);
        }

        // characterize, functions first so everyone can see their facts,
        // declared operators before synthetic ones
        let round = std::mem::take(&mut self.round);
        let mut buckets: [Vec<Snippet>; 8] = Default::default();
        for s in round {
            let rank = match &s {
                Snippet::Function(_) => 0,
                Snippet::SqlAction(_) => 1,
                Snippet::MappedUdt(_) => 2,
                Snippet::BaseUdt(_) => 3,
                Snippet::Cast(_) => 4,
                Snippet::Operator(o) if o.synthetic.is_none() => 5,
                Snippet::Operator(_) => 6,
                _ => 7
            };
            buckets[rank].push(s);
        }
        for bucket in buckets {
            for mut s in bucket {
                let mut ctx = Ctx {
                    mapper: &self.mapper,
                    reporter: &mut self.reporter,
                    facts: &mut self.facts,
                    operators: &mut self.operators,
                    default_implementor: self.options.implementor.clone(),
                    trusted: self.options.trusted_language.clone(),
                    untrusted: self.options.untrusted_language.clone(),
                    extra: Vec::new()
                };
                let keep = s.characterize(&mut ctx);
                let extra = ctx.extra;
                if keep {
                    self.scheduled.push(s);
                }
                self.scheduled.extend(extra);
            }
        }
    }
}

/// Record potential I/O methods from an impl block.
fn visit_impl(item: &syn::ItemImpl, module: &str, pending: &mut PendingImpls) {
    let syn::Type::Path(self_ty) = &*item.self_ty else {
        return;
    };
    let Some(type_name) = self_ty.path.segments.last().map(|s| s.ident.to_string()) else {
        return;
    };
    for impl_item in &item.items {
        let syn::ImplItem::Fn(method) = impl_item else {
            continue;
        };
        let mname = method.sig.ident.to_string();
        let Some(role_idx) = IoRole::ALL.iter().position(|r| r.method() == mname) else {
            continue;
        };
        let path = if module.is_empty() {
            format!("{type_name}::{mname}")
        } else {
            format!("{module}::{type_name}::{mname}")
        };
        pending.methods.entry(type_name.clone()).or_default()[role_idx].push(path);
    }
}
