// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Snippet carriers.
//!
//! A snippet is anything that contributes SQL to the descriptor. Each
//! annotation kind has a carrier struct in a submodule here; the
//! [`Snippet`] enum ties them together so the driver, scheduler, and
//! emitter can treat them uniformly. Variants, not trait objects:
//! characterize, emission, and cycle-breaking all dispatch on the enum.
//!
//! # Lifecycle
//!
//! ```text
//! populate      — attribute payloads + element data move in
//! characterize  — validate, resolve names and types, compute tags,
//!                 pre-render deploy/undeploy SQL, maybe synthesize
//!                 further snippets (UDT I/O functions, derived
//!                 operator functions)
//! schedule      — vertices over the provide/require tags
//! emit          — the pre-rendered strings, in scheduled order
//! ```
//!
//! A carrier that fails validation reports through the [`Reporter`] and
//! excludes itself from scheduling; processing always continues so every
//! diagnostic surfaces in one run.

pub mod aggregate;
pub mod base_udt;
pub mod cast;
pub mod function;
pub mod mapped_udt;
pub mod operator;
pub mod sql_action;
pub mod trigger;

use std::collections::{BTreeMap, BTreeSet};

use proc_macro2::Span;

use crate::{
    attrs::{Effects, StrList},
    dbtype::DbType,
    emit::valid_implementor,
    ident::{Qualified, Simple},
    report::Reporter,
    tag::DependTag,
    typemap::TypeMapper
};

pub use self::{
    aggregate::Aggregate,
    base_udt::{BaseUdt, UdtIoFunction, UdtShell},
    cast::Cast,
    function::Function,
    mapped_udt::MappedUdt,
    operator::{Operator, Transformed},
    sql_action::SqlAction
};

/// What the driver knows about an annotated `fn` item.
#[derive(Debug, Clone)]
pub struct FnElement {
    /// Module-qualified path, e.g. `geometry::area`.
    pub path: String,
    /// The bare fn name.
    pub name: String,
    /// Parameter names and Rust types, in declaration order.
    pub params: Vec<(String, syn::Type)>,
    /// Return type; `None` for unit.
    pub ret: Option<syn::Type>,
    /// Doc-comment first sentence, if any.
    pub doc: Option<String>,
    /// Location for diagnostics.
    pub span: Span,
}

/// Resolved facts about a characterized function, for snippets that
/// reference it (casts, operators, aggregates, derived functions).
#[derive(Debug, Clone)]
pub struct FunctionFacts {
    /// The declared SQL name.
    pub qname: Qualified<Simple>,
    /// IN-parameter SQL types, defaults stripped.
    pub params: Vec<DbType>,
    /// IN-parameter names.
    pub param_names: Vec<Simple>,
    /// Declared return type (element type for SETOF).
    pub returns: DbType,
    /// Volatility.
    pub effects: Effects,
    /// Language binding name.
    pub language: String,
    /// The Rust item implementing it.
    pub rust_path: String,
    /// Everything the function's snippet requires; derived functions
    /// require exactly the same set.
    pub requires: BTreeSet<DependTag>,
}

/// Resolved facts about a characterized, non-derived operator.
#[derive(Debug, Clone)]
pub struct OperatorFacts {
    /// The operator name.
    pub qname: Qualified<crate::ident::Operator>,
    /// Left/right operand types.
    pub operands: [Option<DbType>; 2],
    /// The implementing function.
    pub func: Qualified<Simple>,
    /// The function's parameter signature.
    pub func_sig: Vec<DbType>,
    /// The commutator reference as written (`SELF`, `TWIN`, or a name in
    /// header form), for the symmetry check.
    pub commutator: Option<String>,
}

/// Shared state for the characterize phase.
pub struct Ctx<'a> {
    /// The frozen type mapper.
    pub mapper: &'a TypeMapper,
    /// Diagnostics sink.
    pub reporter: &'a mut Reporter,
    /// Facts registered by characterized functions, keyed by element path.
    pub facts: &'a mut BTreeMap<String, FunctionFacts>,
    /// Facts registered by characterized operators, keyed by
    /// `(element path, operator name)`.
    pub operators: &'a mut BTreeMap<(String, String), OperatorFacts>,
    /// Default implementor name; `None` when wrapping is disabled.
    pub default_implementor: Option<String>,
    /// Trusted language binding name.
    pub trusted: String,
    /// Untrusted language binding name.
    pub untrusted: String,
    /// Snippets synthesized during characterize, scheduled alongside.
    pub extra: Vec<Snippet>,
}

/// Any entity contributing SQL to the descriptor.
#[derive(Debug)]
pub enum Snippet {
    /// Free-form install/remove SQL.
    SqlAction(SqlAction),
    /// A declared function, with its triggers.
    Function(Box<Function>),
    /// A base (scalar) user-defined type.
    BaseUdt(Box<BaseUdt>),
    /// One of a base type's synthesized I/O functions.
    UdtIoFunction(UdtIoFunction),
    /// A shell type declaration inserted by the cycle breaker.
    UdtShell(UdtShell),
    /// A mapped (composite) user-defined type.
    MappedUdt(MappedUdt),
    /// A cast.
    Cast(Cast),
    /// An operator, declared or derived.
    Operator(Box<Operator>),
    /// A function derived from another by commutation/negation.
    Transformed(Transformed),
    /// An aggregate.
    Aggregate(Box<Aggregate>),
}

impl Snippet {
    /// Validate and resolve this snippet.
    ///
    /// Returns `true` when the snippet should be scheduled; a snippet
    /// that reported a fatal problem returns `false` and is excluded
    /// from emission (but its diagnostics remain).
    pub fn characterize(&mut self, ctx: &mut Ctx<'_>) -> bool {
        match self {
            Self::SqlAction(s) => s.characterize(ctx),
            Self::Function(s) => s.characterize(ctx),
            Self::BaseUdt(s) => s.characterize(ctx),
            Self::MappedUdt(s) => s.characterize(ctx),
            Self::Cast(s) => s.characterize(ctx),
            Self::Operator(s) => s.characterize(ctx),
            Self::Aggregate(s) => s.characterize(ctx),
            // synthesized during characterize, already resolved
            Self::UdtIoFunction(_) | Self::UdtShell(_) | Self::Transformed(_) => true
        }
    }

    /// The implementor-block name, if emission should wrap this snippet.
    #[must_use]
    pub fn implementor(&self) -> Option<&str> {
        match self {
            Self::SqlAction(s) => s.implementor.as_deref(),
            Self::Function(s) => s.implementor.as_deref(),
            Self::BaseUdt(s) => s.implementor.as_deref(),
            Self::UdtIoFunction(s) => s.implementor.as_deref(),
            Self::UdtShell(s) => s.implementor.as_deref(),
            Self::MappedUdt(s) => s.implementor.as_deref(),
            Self::Cast(s) => s.implementor.as_deref(),
            Self::Operator(s) => s.implementor.as_deref(),
            Self::Transformed(s) => s.implementor.as_deref(),
            Self::Aggregate(s) => s.implementor.as_deref()
        }
    }

    /// Install-group SQL commands, in order.
    #[must_use]
    pub fn deploy_strings(&self) -> Vec<String> {
        match self {
            Self::SqlAction(s) => s.deploy.clone(),
            Self::Function(s) => s.deploy.clone(),
            Self::BaseUdt(s) => s.deploy.clone(),
            Self::UdtIoFunction(s) => s.deploy.clone(),
            Self::UdtShell(s) => s.deploy.clone(),
            Self::MappedUdt(s) => s.deploy.clone(),
            Self::Cast(s) => s.deploy.clone(),
            Self::Operator(s) => s.deploy.clone(),
            Self::Transformed(s) => s.deploy.clone(),
            Self::Aggregate(s) => s.deploy.clone()
        }
    }

    /// Remove-group SQL commands, in order.
    #[must_use]
    pub fn undeploy_strings(&self) -> Vec<String> {
        match self {
            Self::SqlAction(s) => s.undeploy.clone(),
            Self::Function(s) => s.undeploy.clone(),
            Self::BaseUdt(s) => s.undeploy.clone(),
            Self::UdtIoFunction(s) => s.undeploy_strings(),
            Self::UdtShell(_) => Vec::new(),
            Self::MappedUdt(s) => s.undeploy.clone(),
            Self::Cast(s) => s.undeploy.clone(),
            Self::Operator(s) => s.undeploy.clone(),
            Self::Transformed(s) => s.undeploy.clone(),
            Self::Aggregate(s) => s.undeploy.clone()
        }
    }

    /// Tags this snippet provides.
    #[must_use]
    pub fn provide_tags(&self) -> &BTreeSet<DependTag> {
        match self {
            Self::SqlAction(s) => &s.provides,
            Self::Function(s) => &s.provides,
            Self::BaseUdt(s) => &s.provides,
            Self::UdtIoFunction(s) => &s.provides,
            Self::UdtShell(s) => &s.provides,
            Self::MappedUdt(s) => &s.provides,
            Self::Cast(s) => &s.provides,
            Self::Operator(s) => &s.provides,
            Self::Transformed(s) => &s.provides,
            Self::Aggregate(s) => &s.provides
        }
    }

    /// Tags this snippet requires.
    #[must_use]
    pub fn require_tags(&self) -> &BTreeSet<DependTag> {
        match self {
            Self::SqlAction(s) => &s.requires,
            Self::Function(s) => &s.requires,
            Self::BaseUdt(s) => &s.requires,
            Self::UdtIoFunction(s) => &s.requires,
            Self::UdtShell(s) => &s.requires,
            Self::MappedUdt(s) => &s.requires,
            Self::Cast(s) => &s.requires,
            Self::Operator(s) => &s.requires,
            Self::Transformed(s) => &s.requires,
            Self::Aggregate(s) => &s.requires
        }
    }
}

/// Resolve an annotation `name`/`schema` pair against the element name.
///
/// The annotation values use SQL spelling (quotable); the fallback is a
/// host-language name.
pub fn resolve_qname(
    name: Option<&str>,
    schema: Option<&str>,
    fallback: &str,
    reporter: &mut Reporter,
    span: Span
) -> Option<Qualified<Simple>> {
    let local = match name {
        Some(text) => Simple::from_sql(text),
        None => Simple::from_host(fallback)
    };
    let local = match local {
        Ok(l) => l,
        Err(e) => {
            reporter.error_span(span, e);
            return None;
        }
    };
    let qualifier = match schema {
        Some(text) => match Simple::from_sql(text) {
            Ok(s) => Some(s),
            Err(e) => {
                reporter.error_span(span, e);
                return None;
            }
        },
        None => None
    };
    Some(local.with_qualifier(qualifier))
}

/// Resolve the implementor for a snippet.
///
/// Absent means the configured default; `-` disables wrapping; anything
/// else must satisfy the restricted implementor alphabet.
pub fn resolve_implementor(
    given: Option<&str>,
    ctx_default: Option<&String>,
    reporter: &mut Reporter,
    span: Span
) -> Option<String> {
    match given {
        None => ctx_default.cloned(),
        Some("-") => None,
        Some(name) => {
            if valid_implementor(name) {
                Some(name.to_owned())
            } else {
                reporter.error_span(span, format!("implementor name {name} is not a valid identifier"));
                None
            }
        }
    }
}

/// Resolve a COMMENT ON text: explicit empty suppresses, explicit text
/// wins, otherwise the doc comment's first sentence is used.
#[must_use]
pub fn resolve_comment(given: Option<&str>, doc: Option<&String>) -> Option<String> {
    match given {
        Some("") => None,
        Some(text) => Some(text.to_owned()),
        None => doc.cloned()
    }
}

/// Turn explicit tag strings into `Explicit` depend tags.
pub fn explicit_tags(list: &StrList, into: &mut BTreeSet<DependTag>) {
    for s in list.iter() {
        into.insert(DependTag::Explicit(s.clone()));
    }
}

/// Parse a `"name type"` or `"type"` entry.
///
/// The name, when present, is an SQL identifier; the remainder is a type
/// expression. A single token is a bare type.
pub fn parse_name_type(text: &str) -> Result<(Option<Simple>, DbType), String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err("empty name/type entry".into());
    }
    match trimmed.split_once(char::is_whitespace) {
        Some((head, rest)) if !rest.trim().is_empty() => {
            let name = Simple::from_sql(head)?;
            Ok((Some(name), DbType::from_annotation(rest)))
        }
        _ => Ok((None, DbType::from_annotation(trimmed)))
    }
}

/// Whether an SQL type is boolean under either common spelling.
#[must_use]
pub fn is_boolean(ty: &DbType) -> bool {
    *ty == DbType::reserved("boolean") || *ty == DbType::catalog("bool")
}
