// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Mapped (composite) user-defined types.
//!
//! A mapped type pairs an existing or newly declared SQL type with a
//! Rust struct. With a `structure` list the carrier emits the
//! `CREATE TYPE name AS (...)` itself and provides the type tag;
//! without one, the type is assumed to exist already and only the
//! runtime mapping registration is emitted.

use std::collections::BTreeSet;

use convert_case::{Case, Casing};
use proc_macro2::Span;

use crate::{
    attrs::MappedUdtAttrs,
    emit::e_quote,
    ident::{Qualified, Simple},
    report::Reporter,
    snippet::{Ctx, explicit_tags, parse_name_type, resolve_comment, resolve_implementor},
    tag::DependTag
};

/// Carrier for one `#[mapped_udt(...)]` struct.
#[derive(Debug)]
pub struct MappedUdt {
    /// The parsed payload.
    pub attrs: MappedUdtAttrs,
    /// The SQL type name, resolved at populate time for the type mapper.
    pub qname: Qualified<Simple>,
    /// The annotated Rust struct's path.
    pub rust_path: String,
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

impl MappedUdt {
    /// Wrap a freshly parsed payload, resolving the type name at once.
    pub fn new(
        attrs: MappedUdtAttrs,
        type_name: &str,
        rust_path: String,
        doc: Option<String>,
        span: Span,
        reporter: &mut Reporter
    ) -> Option<Self> {
        let fallback = type_name.to_case(Case::Snake);
        let local = match attrs.name.as_deref() {
            Some(text) => Simple::from_sql(text),
            None => Simple::from_sql(&fallback)
        };
        let local = match local {
            Ok(l) => l,
            Err(e) => {
                reporter.error_span(span, e);
                return None;
            }
        };
        let qualifier = match attrs.schema.as_deref().map(Simple::from_sql) {
            None => None,
            Some(Ok(s)) => Some(s),
            Some(Err(e)) => {
                reporter.error_span(span, e);
                return None;
            }
        };
        Some(Self {
            attrs,
            qname: local.with_qualifier(qualifier),
            rust_path,
            doc,
            span,
            implementor: None,
            provides: BTreeSet::new(),
            requires: BTreeSet::new(),
            deploy: Vec::new(),
            undeploy: Vec::new()
        })
    }

    pub(crate) fn characterize(&mut self, ctx: &mut Ctx<'_>) -> bool {
        let span = self.span;
        let mut ok = true;
        self.implementor = resolve_implementor(
            self.attrs.implementor.as_deref(),
            ctx.default_implementor.as_ref(),
            ctx.reporter,
            span
        );

        let mut attributes: Vec<String> = Vec::new();
        for entry in self.attrs.structure.iter() {
            match parse_name_type(entry) {
                Ok((Some(name), ty)) => {
                    if let Some(tag) = ty.depend_tag() {
                        self.requires.insert(tag);
                    }
                    attributes.push(format!("{} {}", name.deparse(), ty.to_sql(false)));
                }
                Ok((None, _)) => {
                    ctx.reporter.error_span(
                        span,
                        format!("structure attribute needs a name: {entry}")
                    );
                    ok = false;
                }
                Err(e) => {
                    ctx.reporter.error_span(span, e);
                    ok = false;
                }
            }
        }
        explicit_tags(&self.attrs.requires, &mut self.requires);
        if self.attrs.structure.is_empty() {
            // the type must already exist for the mapping to make sense
            self.requires.insert(DependTag::Type(self.qname.clone()));
        } else {
            self.provides.insert(DependTag::Type(self.qname.clone()));
        }
        explicit_tags(&self.attrs.provides, &mut self.provides);
        if !ok {
            return false;
        }

        if !attributes.is_empty() {
            self.deploy.push(format!(
                "CREATE TYPE {} AS (\n\t{}\n)",
                self.qname.deparse(),
                attributes.join(",\n\t")
            ));
        }
        self.deploy.push(format!(
            "SELECT sqlj.add_type_mapping({}, {})",
            e_quote(&self.qname.deparse()),
            e_quote(&self.rust_path)
        ));
        if let Some(c) = resolve_comment(self.attrs.comment.as_deref(), self.doc.as_ref())
            && !attributes.is_empty()
        {
            self.deploy.push(format!(
                "COMMENT ON TYPE {} IS {}",
                self.qname.deparse(),
                e_quote(&c)
            ));
        }

        self.undeploy.push(format!(
            "SELECT sqlj.drop_type_mapping({})",
            e_quote(&self.qname.deparse())
        ));
        if !attributes.is_empty() {
            self.undeploy
                .push(format!("DROP TYPE {}", self.qname.deparse()));
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use darling::FromMeta;
    use syn::parse_quote;

    use super::*;
    use crate::typemap::TypeMapper;

    fn run(attr: syn::Attribute) -> (MappedUdt, Reporter, bool) {
        let parsed = MappedUdtAttrs::from_meta(&attr.meta).unwrap();
        let mut reporter = Reporter::new();
        let mut u = MappedUdt::new(
            parsed,
            "TimeOfDay",
            "demo::TimeOfDay".to_owned(),
            None,
            Span::call_site(),
            &mut reporter
        )
        .unwrap();
        let mut mapper = TypeMapper::new();
        mapper.freeze();
        let mut facts = BTreeMap::new();
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
            u.characterize(&mut ctx)
        };
        (u, reporter, ok)
    }

    #[test]
    fn structure_emits_create_type_and_mapping() {
        let (u, r, ok) = run(parse_quote!(#[mapped_udt(
            schema = "demo",
            structure = ["hours pg_catalog.int4", "minutes pg_catalog.int4"]
        )]));
        assert!(ok, "{:?}", r.diagnostics());
        assert_eq!(
            u.deploy[0],
            "CREATE TYPE demo.time_of_day AS (\n\thours pg_catalog.int4,\n\tminutes pg_catalog.int4\n)"
        );
        assert_eq!(
            u.deploy[1],
            "SELECT sqlj.add_type_mapping(e'demo.time_of_day', e'demo::TimeOfDay')"
        );
        assert!(u.provides.contains(&DependTag::Type(u.qname.clone())));
        assert_eq!(
            u.undeploy,
            vec![
                "SELECT sqlj.drop_type_mapping(e'demo.time_of_day')".to_owned(),
                "DROP TYPE demo.time_of_day".to_owned()
            ]
        );
    }

    #[test]
    fn no_structure_only_maps() {
        let (u, _, ok) = run(parse_quote!(#[mapped_udt(name = "point")]));
        assert!(ok);
        assert_eq!(u.deploy.len(), 1);
        assert!(u.deploy[0].starts_with("SELECT sqlj.add_type_mapping"));
        // without a declared structure the type must come from elsewhere
        assert!(u.provides.is_empty());
        assert!(u.requires.contains(&DependTag::Type(u.qname.clone())));
    }

    #[test]
    fn structure_entry_without_name_rejected() {
        let (_, r, ok) = run(parse_quote!(#[mapped_udt(structure = ["pg_catalog.int4"])]));
        assert!(!ok);
        assert!(r.has_errors());
    }
}
