// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Base (scalar) user-defined types.
//!
//! A base type and its four I/O functions need each other: the functions
//! mention the type in their signatures, and `CREATE TYPE` names the
//! functions. The scheduler cannot order that, so this carrier is the
//! one snippet with cycle-breaking behavior:
//!
//! - installing, a *shell* declaration (`CREATE TYPE name` with no
//!   attributes) is inserted ahead of the functions, and the full
//!   definition fills the shell afterwards;
//! - removing, a single `DROP TYPE ... CASCADE` covers the functions,
//!   whose own `DROP FUNCTION`s are subsumed away.
//!
//! The carrier synthesizes its I/O function snippets during
//! characterize, one per associated `input`/`output`/`receive`/`send`
//! method on the annotated struct.

use std::collections::BTreeSet;

use convert_case::{Case, Casing};
use proc_macro2::Span;

use crate::{
    attrs::{BaseUdtAttrs, Storage},
    dbtype::DbType,
    emit::e_quote,
    ident::{Qualified, Simple},
    report::Reporter,
    snippet::{
        Ctx, Snippet, explicit_tags, resolve_comment, resolve_implementor
    },
    tag::DependTag
};

use super::function::{FnRender, render_create, render_drop};

/// Which of the four I/O roles a synthesized function fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoRole {
    /// Text input: `(cstring) RETURNS t`.
    Input,
    /// Text output: `(t) RETURNS cstring`.
    Output,
    /// Binary input: `(internal) RETURNS t`.
    Receive,
    /// Binary output: `(t) RETURNS bytea`.
    Send,
}

impl IoRole {
    /// All four roles, in declaration order.
    pub const ALL: [IoRole; 4] = [Self::Input, Self::Output, Self::Receive, Self::Send];

    /// The function-name suffix for this role.
    #[must_use]
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Input => "_in",
            Self::Output => "_out",
            Self::Receive => "_recv",
            Self::Send => "_send"
        }
    }

    /// The associated method name expected on the Rust type.
    #[must_use]
    pub fn method(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
            Self::Receive => "receive",
            Self::Send => "send"
        }
    }

    /// The CREATE TYPE clause keyword naming this role's function.
    #[must_use]
    pub fn clause(self) -> &'static str {
        match self {
            Self::Input => "INPUT",
            Self::Output => "OUTPUT",
            Self::Receive => "RECEIVE",
            Self::Send => "SEND"
        }
    }
}

/// Carrier for one `#[base_udt(...)]` struct.
#[derive(Debug)]
pub struct BaseUdt {
    /// The parsed payload.
    pub attrs: BaseUdtAttrs,
    /// The SQL type name, resolved at populate time so the type mapper
    /// learns the mapping before any function characterizes.
    pub qname: Qualified<Simple>,
    /// The annotated Rust struct's path.
    pub rust_path: String,
    /// Rust paths of the I/O methods, keyed by [`IoRole::ALL`] order;
    /// the driver fills these while scanning impl blocks.
    pub io_paths: [Option<String>; 4],
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

impl BaseUdt {
    /// Wrap a freshly parsed payload, resolving the type name at once.
    ///
    /// The default name is the Rust type name in snake case.
    pub fn new(
        attrs: BaseUdtAttrs,
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
            io_paths: [None, None, None, None],
            doc,
            span,
            implementor: None,
            provides: BTreeSet::new(),
            requires: BTreeSet::new(),
            deploy: Vec::new(),
            undeploy: Vec::new()
        })
    }

    /// The function name of one I/O role, e.g. `schema.complex_in`.
    fn io_fn_name(&self, role: IoRole) -> Result<Qualified<Simple>, String> {
        let local = Simple::from_raw(&format!("{}{}", self.qname.local.folded(), role.suffix()))?;
        Ok(Qualified {
            qualifier: self.qname.qualifier.clone(),
            local
        })
    }

    /// The parameter/return signature of one I/O role.
    fn io_signature(&self, role: IoRole) -> (Vec<DbType>, DbType) {
        let owner = DbType::named(self.qname.clone());
        match role {
            IoRole::Input => (vec![DbType::catalog("cstring")], owner),
            IoRole::Output => (vec![owner], DbType::catalog("cstring")),
            IoRole::Receive => (vec![DbType::catalog("internal")], owner),
            IoRole::Send => (vec![owner], DbType::catalog("bytea"))
        }
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

        if let Some(cat) = self.attrs.category.as_deref() {
            let mut chars = cat.chars();
            let first = chars.next();
            let single = first.is_some() && chars.next().is_none();
            let printable = first.is_some_and(|c| c.is_ascii() && !c.is_ascii_control());
            if !(single && printable) {
                ctx.reporter.error_span(
                    span,
                    format!("category must be one printable ASCII character, got {cat:?}")
                );
                ok = false;
            }
        }
        if let Some(delim) = self.attrs.delimiter.as_deref()
            && delim.chars().count() != 1
        {
            ctx.reporter
                .error_span(span, format!("delimiter must be one character, got {delim:?}"));
            ok = false;
        }
        let fixed_length = self.attrs.internal_length.filter(|l| *l > 0);
        if self.attrs.passed_by_value {
            if !matches!(fixed_length, Some(1 | 2 | 4 | 8)) {
                ctx.reporter.error_span(
                    span,
                    "a by-value type needs internal_length of 1, 2, 4, or 8"
                );
                ok = false;
            }
            if let Some(align) = self.attrs.alignment
                && let Some(len) = fixed_length
                && align.bytes() < len
            {
                ctx.reporter.error_span(
                    span,
                    "a by-value type cannot be wider than its alignment"
                );
                ok = false;
            }
        }
        if fixed_length.is_some()
            && self.attrs.storage.is_some_and(|s| s != Storage::Plain)
        {
            ctx.reporter
                .error_span(span, "a fixed-length type must use plain storage");
            ok = false;
        }

        // synthesize the four I/O function snippets; they join the
        // schedule only if the whole type checks out
        let mut io_fn_names: Vec<Qualified<Simple>> = Vec::with_capacity(4);
        let mut io_fns: Vec<UdtIoFunction> = Vec::with_capacity(4);
        for (role, path) in IoRole::ALL.iter().zip(&self.io_paths) {
            let Some(path) = path else {
                ctx.reporter.error_span(
                    span,
                    format!(
                        "{} has no associated fn {} for its {} conversion",
                        self.rust_path,
                        role.method(),
                        role.clause()
                    )
                );
                ok = false;
                continue;
            };
            let fqname = match self.io_fn_name(*role) {
                Ok(q) => q,
                Err(e) => {
                    ctx.reporter.error_span(span, e);
                    ok = false;
                    continue;
                }
            };
            let (params, returns) = self.io_signature(*role);
            let io = UdtIoFunction::synthesize(
                fqname.clone(),
                self.qname.clone(),
                params,
                returns,
                ctx.trusted.clone(),
                path.clone(),
                self.implementor.clone()
            );
            self.requires
                .extend(io.provides.iter().cloned());
            io_fn_names.push(fqname);
            io_fns.push(io);
        }
        if !ok || io_fn_names.len() != 4 {
            return false;
        }

        self.provides.insert(DependTag::Type(self.qname.clone()));
        explicit_tags(&self.attrs.provides, &mut self.provides);

        let support = [
            (
                self.attrs.type_modifier_input.as_deref(),
                vec![DbType::catalog("cstring").as_array()]
            ),
            (
                self.attrs.type_modifier_output.as_deref(),
                vec![DbType::catalog("int4")]
            ),
            (self.attrs.analyze.as_deref(), vec![DbType::catalog("internal")])
        ];
        let mut support_names: Vec<Option<Qualified<Simple>>> = Vec::with_capacity(3);
        for (name, sig) in support {
            match name {
                None => support_names.push(None),
                Some(text) => match Qualified::from_sql(text) {
                    Ok(q) => {
                        self.requires
                            .insert(DependTag::Function(q.clone(), sig));
                        support_names.push(Some(q));
                    }
                    Err(e) => {
                        ctx.reporter.error_span(span, e);
                        ok = false;
                        support_names.push(None);
                    }
                }
            }
        }
        explicit_tags(&self.attrs.requires, &mut self.requires);
        if !ok {
            return false;
        }
        ctx.extra
            .extend(io_fns.into_iter().map(Snippet::UdtIoFunction));

        // CREATE TYPE with the full attribute list
        let mut clauses: Vec<String> = Vec::new();
        if let Some(len) = self.attrs.internal_length {
            let value = if len < 0 {
                "VARIABLE".to_owned()
            } else {
                len.to_string()
            };
            clauses.push(format!("INTERNALLENGTH = {value}"));
        }
        for (role, fqname) in IoRole::ALL.iter().zip(&io_fn_names) {
            clauses.push(format!("{} = {}", role.clause(), fqname.deparse()));
        }
        for (keyword, name) in ["TYPMOD_IN", "TYPMOD_OUT", "ANALYZE"].iter().zip(&support_names) {
            if let Some(q) = name {
                clauses.push(format!("{keyword} = {}", q.deparse()));
            }
        }
        if self.attrs.passed_by_value {
            clauses.push("PASSEDBYVALUE".to_owned());
        }
        if let Some(a) = self.attrs.alignment {
            clauses.push(format!("ALIGNMENT = {}", a.sql()));
        }
        if let Some(s) = self.attrs.storage {
            clauses.push(format!("STORAGE = {}", s.sql()));
        }
        if let Some(c) = self.attrs.category.as_deref() {
            clauses.push(format!("CATEGORY = {}", e_quote(c)));
        }
        if self.attrs.preferred {
            clauses.push("PREFERRED".to_owned());
        }
        if let Some(d) = self.attrs.default.as_deref() {
            clauses.push(format!("DEFAULT = {}", e_quote(d)));
        }
        if let Some(elem) = self.attrs.element.as_deref() {
            clauses.push(format!(
                "ELEMENT = {}",
                DbType::from_annotation(elem).to_sql(false)
            ));
        }
        if let Some(d) = self.attrs.delimiter.as_deref() {
            clauses.push(format!("DELIMITER = {}", e_quote(d)));
        }
        if self.attrs.collatable {
            clauses.push("COLLATABLE".to_owned());
        }
        self.deploy.push(format!(
            "CREATE TYPE {} (\n\t{}\n)",
            self.qname.deparse(),
            clauses.join(",\n\t")
        ));
        if let Some(c) = resolve_comment(self.attrs.comment.as_deref(), self.doc.as_ref()) {
            self.deploy.push(format!(
                "COMMENT ON TYPE {} IS {}",
                self.qname.deparse(),
                e_quote(&c)
            ));
        }
        self.undeploy
            .push(format!("DROP TYPE {} CASCADE", self.qname.deparse()));
        true
    }
}

/// One synthesized I/O function of a base type.
#[derive(Debug)]
pub struct UdtIoFunction {
    /// The function name.
    pub qname: Qualified<Simple>,
    /// The owning type's name, used by the cycle breaker to recognize
    /// its own functions.
    pub owner: Qualified<Simple>,
    /// Resolved implementor-block name.
    pub implementor: Option<String>,
    /// Tags provided.
    pub provides: BTreeSet<DependTag>,
    /// Tags required.
    pub requires: BTreeSet<DependTag>,
    /// Install commands.
    pub deploy: Vec<String>,
    /// Set by the cycle breaker in the remove direction: the owning
    /// type's `DROP TYPE ... CASCADE` covers this function.
    pub subsumed: bool,
    undeploy: Vec<String>,
}

impl UdtIoFunction {
    #[allow(clippy::too_many_arguments)]
    fn synthesize(
        qname: Qualified<Simple>,
        owner: Qualified<Simple>,
        params: Vec<DbType>,
        returns: DbType,
        language: String,
        rust_path: String,
        implementor: Option<String>
    ) -> Self {
        let mut provides = BTreeSet::new();
        provides.insert(DependTag::Function(qname.clone(), params.clone()));
        let mut requires = BTreeSet::new();
        requires.insert(DependTag::Type(owner.clone()));

        let decls: Vec<String> = params.iter().map(|t| t.to_sql(false)).collect();
        let create = render_create(&FnRender {
            qname: &qname,
            param_decls: &decls,
            setof: false,
            returns: &returns,
            language: &language,
            markers: " IMMUTABLE STRICT",
            settings: &[],
            as_ref: &rust_path
        });
        let drop = render_drop(&qname, &decls);
        Self {
            qname,
            owner,
            implementor,
            provides,
            requires,
            deploy: vec![create],
            subsumed: false,
            undeploy: vec![drop]
        }
    }

    /// Remove commands; empty once subsumed by the owning type's DROP.
    #[must_use]
    pub fn undeploy_strings(&self) -> Vec<String> {
        if self.subsumed {
            Vec::new()
        } else {
            self.undeploy.clone()
        }
    }
}

/// The shell declaration inserted by the deploy-direction cycle breaker.
#[derive(Debug)]
pub struct UdtShell {
    /// The type name.
    pub qname: Qualified<Simple>,
    /// Resolved implementor-block name (copied from the owning type).
    pub implementor: Option<String>,
    /// Tags provided (none; the shell is pure ordering).
    pub provides: BTreeSet<DependTag>,
    /// Tags required (none).
    pub requires: BTreeSet<DependTag>,
    /// Install commands.
    pub deploy: Vec<String>,
}

impl UdtShell {
    /// A shell declaration for `qname`.
    #[must_use]
    pub fn new(qname: Qualified<Simple>, implementor: Option<String>) -> Self {
        let deploy = vec![format!("CREATE TYPE {}", qname.deparse())];
        Self {
            qname,
            implementor,
            provides: BTreeSet::new(),
            requires: BTreeSet::new(),
            deploy
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use darling::FromMeta;
    use syn::parse_quote;

    use super::*;
    use crate::{attrs::BaseUdtAttrs, typemap::TypeMapper};

    fn udt(attr: syn::Attribute) -> BaseUdt {
        let parsed = BaseUdtAttrs::from_meta(&attr.meta).unwrap();
        let mut reporter = Reporter::new();
        let mut u = BaseUdt::new(
            parsed,
            "Complex",
            "Complex".to_owned(),
            None,
            Span::call_site(),
            &mut reporter
        )
        .unwrap();
        u.io_paths = [
            Some("Complex::input".to_owned()),
            Some("Complex::output".to_owned()),
            Some("Complex::receive".to_owned()),
            Some("Complex::send".to_owned())
        ];
        u
    }

    fn run(mut u: BaseUdt) -> (BaseUdt, Vec<Snippet>, Reporter, bool) {
        let mut mapper = TypeMapper::new();
        mapper.freeze();
        let mut reporter = Reporter::new();
        let mut facts = BTreeMap::new();
        let mut operators = BTreeMap::new();
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
        let ok = u.characterize(&mut ctx);
        let extra = std::mem::take(&mut ctx.extra);
        (u, extra, reporter, ok)
    }

    #[test]
    fn default_name_is_snake_case() {
        let u = udt(parse_quote!(#[base_udt(schema = "javatest")]));
        assert_eq!(u.qname.deparse(), "javatest.complex");
    }

    #[test]
    fn synthesizes_four_io_functions() {
        let (u, extra, r, ok) = run(udt(parse_quote!(#[base_udt(schema = "js")])));
        assert!(ok, "{:?}", r.diagnostics());
        assert_eq!(extra.len(), 4);
        let Snippet::UdtIoFunction(input) = &extra[0] else {
            panic!("expected an I/O function");
        };
        assert_eq!(input.qname.deparse(), "js.complex_in");
        assert_eq!(
            input.deploy[0],
            "CREATE OR REPLACE FUNCTION js.complex_in(\n\tpg_catalog.cstring)\
             \n\tRETURNS js.complex\
             \n\tLANGUAGE rust IMMUTABLE STRICT\
             \n\tAS e'Complex::input'"
        );
        // the type requires each of its functions and provides itself
        assert_eq!(
            u.requires
                .iter()
                .filter(|t| matches!(t, DependTag::Function(..)))
                .count(),
            4
        );
        assert!(u.provides.contains(&DependTag::Type(u.qname.clone())));
    }

    #[test]
    fn io_functions_require_the_type() {
        let (u, extra, _, ok) = run(udt(parse_quote!(#[base_udt()])));
        assert!(ok);
        for s in &extra {
            let Snippet::UdtIoFunction(io) = s else {
                panic!()
            };
            assert!(io.requires.contains(&DependTag::Type(u.qname.clone())));
        }
    }

    #[test]
    fn subsumed_io_function_drops_nothing() {
        let (_, extra, _, ok) = run(udt(parse_quote!(#[base_udt()])));
        assert!(ok);
        let Snippet::UdtIoFunction(mut io) = extra.into_iter().next().unwrap() else {
            panic!()
        };
        assert_eq!(io.undeploy_strings().len(), 1);
        io.subsumed = true;
        assert!(io.undeploy_strings().is_empty());
    }

    #[test]
    fn create_type_lists_attributes() {
        let (u, _, r, ok) = run(udt(parse_quote!(#[base_udt(
            internal_length = 16,
            alignment = "double",
            storage = "plain",
            category = "N",
            delimiter = ","
        )])));
        assert!(ok, "{:?}", r.diagnostics());
        let create = &u.deploy[0];
        assert!(create.starts_with("CREATE TYPE complex (\n\t"));
        assert!(create.contains("INTERNALLENGTH = 16"));
        assert!(create.contains("INPUT = complex_in"));
        assert!(create.contains("SEND = complex_send"));
        assert!(create.contains("ALIGNMENT = double"));
        assert!(create.contains("CATEGORY = e'N'"));
        assert_eq!(u.undeploy, vec!["DROP TYPE complex CASCADE".to_owned()]);
    }

    #[test]
    fn variable_length_spelled_out() {
        let (u, _, _, ok) = run(udt(parse_quote!(#[base_udt(internal_length = -1)])));
        assert!(ok);
        assert!(u.deploy[0].contains("INTERNALLENGTH = VARIABLE"));
    }

    #[test]
    fn by_value_needs_small_fixed_length() {
        let (_, _, r, ok) = run(udt(parse_quote!(#[base_udt(passed_by_value)])));
        assert!(!ok);
        assert!(r.has_errors());
    }

    #[test]
    fn fixed_length_rejects_extended_storage() {
        let (_, _, r, ok) = run(udt(parse_quote!(#[base_udt(
            internal_length = 8,
            storage = "extended"
        )])));
        assert!(!ok);
        assert!(r.has_errors());
    }

    #[test]
    fn category_must_be_single_printable() {
        let (_, _, r, ok) = run(udt(parse_quote!(#[base_udt(category = "NN")])));
        assert!(!ok);
        assert!(r.has_errors());
    }

    #[test]
    fn missing_io_method_reported() {
        let attr: syn::Attribute = parse_quote!(#[base_udt()]);
        let parsed = BaseUdtAttrs::from_meta(&attr.meta).unwrap();
        let mut reporter = Reporter::new();
        let u = BaseUdt::new(
            parsed,
            "Complex",
            "Complex".to_owned(),
            None,
            Span::call_site(),
            &mut reporter
        )
        .unwrap();
        // io_paths left empty
        let (_, _, r, ok) = run(u);
        assert!(!ok);
        assert_eq!(
            r.diagnostics()
                .iter()
                .filter(|d| d.message.contains("has no associated fn"))
                .count(),
            4
        );
    }

    #[test]
    fn typmod_support_functions_required() {
        let (u, _, r, ok) = run(udt(parse_quote!(#[base_udt(
            type_modifier_input = "js.complextypmodin"
        )])));
        assert!(ok, "{:?}", r.diagnostics());
        assert!(u.deploy[0].contains("TYPMOD_IN = js.complextypmodin"));
        assert!(
            u.requires
                .iter()
                .any(|t| t.to_string()
                    == "(Function)js.complextypmodin(pg_catalog.cstring[])")
        );
    }

    #[test]
    fn shell_emits_bare_create_type() {
        let q = Qualified::from_sql("js.complex").unwrap();
        let shell = UdtShell::new(q, None);
        assert_eq!(shell.deploy, vec!["CREATE TYPE js.complex".to_owned()]);
    }
}
