// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Annotation payload parsing with darling.
//!
//! Every attribute the generator understands has a payload struct here,
//! parsed from the attribute's meta with [`darling::FromMeta`]. Fields
//! are `Option`s (or list newtypes defaulting to empty) so the carriers
//! can distinguish "was written" from "defaulted" — several validation
//! rules hinge on that difference.
//!
//! These structs hold exactly what the user wrote. Interpretation —
//! identifier resolution, type mapping, cross-references — happens in
//! the snippet carriers, never here.

use darling::FromMeta;
use syn::{Meta, Token, punctuated::Punctuated};

/// A list of strings.
///
/// Accepted spellings: `key = ["a", "b"]`, `key("a", "b")`, and the
/// single-element shorthand `key = "a"`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrList(pub Vec<String>);

impl StrList {
    /// Whether no strings were given.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate the strings.
    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }
}

impl FromMeta for StrList {
    fn from_meta(item: &Meta) -> darling::Result<Self> {
        match item {
            Meta::Path(_) => Ok(Self::default()),
            Meta::NameValue(nv) => match &nv.value {
                syn::Expr::Lit(syn::ExprLit {
                    lit: syn::Lit::Str(s),
                    ..
                }) => Ok(Self(vec![s.value()])),
                syn::Expr::Array(arr) => {
                    let mut out = Vec::with_capacity(arr.elems.len());
                    for elem in &arr.elems {
                        match elem {
                            syn::Expr::Lit(syn::ExprLit {
                                lit: syn::Lit::Str(s),
                                ..
                            }) => out.push(s.value()),
                            other => {
                                return Err(darling::Error::custom(
                                    "expected a string literal"
                                )
                                .with_span(other));
                            }
                        }
                    }
                    Ok(Self(out))
                }
                other => {
                    Err(darling::Error::custom("expected a string or [\"...\"] array")
                        .with_span(other))
                }
            },
            Meta::List(list) => {
                let lits = list
                    .parse_args_with(Punctuated::<syn::LitStr, Token![,]>::parse_terminated)?;
                Ok(Self(lits.iter().map(syn::LitStr::value).collect()))
            }
        }
    }
}

/// A list of trigger events, written as bare words:
/// `events(insert, update)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventList(pub Vec<TriggerEvent>);

impl FromMeta for EventList {
    fn from_meta(item: &Meta) -> darling::Result<Self> {
        let Meta::List(list) = item else {
            return Err(darling::Error::custom("expected events(insert, ...)").with_span(item));
        };
        let idents =
            list.parse_args_with(Punctuated::<syn::Ident, Token![,]>::parse_terminated)?;
        let mut out = Vec::with_capacity(idents.len());
        for ident in idents {
            let event = match ident.to_string().as_str() {
                "insert" => TriggerEvent::Insert,
                "update" => TriggerEvent::Update,
                "delete" => TriggerEvent::Delete,
                "truncate" => TriggerEvent::Truncate,
                other => {
                    return Err(darling::Error::custom(format!("unknown trigger event {other}"))
                        .with_span(&ident));
                }
            };
            out.push(event);
        }
        Ok(Self(out))
    }
}

/// The variadic marker of an aggregate: one flag for an ordinary
/// aggregate, two (`variadic(true, false)`) for an ordered-set one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariadicSpec(pub Vec<bool>);

impl FromMeta for VariadicSpec {
    fn from_meta(item: &Meta) -> darling::Result<Self> {
        match item {
            Meta::Path(_) => Ok(Self(vec![true])),
            Meta::NameValue(nv) => match &nv.value {
                syn::Expr::Lit(syn::ExprLit {
                    lit: syn::Lit::Bool(b),
                    ..
                }) => Ok(Self(vec![b.value])),
                other => {
                    Err(darling::Error::custom("expected a bool").with_span(other))
                }
            },
            Meta::List(list) => {
                let lits =
                    list.parse_args_with(Punctuated::<syn::LitBool, Token![,]>::parse_terminated)?;
                Ok(Self(lits.iter().map(|b| b.value).collect()))
            }
        }
    }
}

/// Function volatility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromMeta)]
pub enum Effects {
    /// May do anything; the planner assumes nothing.
    #[default]
    Volatile,
    /// Stable within a statement.
    Stable,
    /// Pure; may be pre-evaluated.
    Immutable,
}

impl Effects {
    /// The SQL keyword.
    #[must_use]
    pub fn sql(self) -> &'static str {
        match self {
            Self::Volatile => "VOLATILE",
            Self::Stable => "STABLE",
            Self::Immutable => "IMMUTABLE"
        }
    }
}

/// Behavior on null input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromMeta)]
pub enum OnNullInput {
    /// The function is called normally.
    #[default]
    Called,
    /// The call is skipped and the result is null.
    ReturnsNull,
}

/// Execution identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromMeta)]
pub enum Security {
    /// Run as the caller.
    #[default]
    Invoker,
    /// Run as the function owner.
    Definer,
}

/// Parallel-safety marking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromMeta)]
pub enum Parallel {
    /// Never run in a parallel worker.
    Unsafe,
    /// Only in the leader.
    Restricted,
    /// Anywhere.
    Safe,
}

impl Parallel {
    /// The SQL keyword.
    #[must_use]
    pub fn sql(self) -> &'static str {
        match self {
            Self::Unsafe => "UNSAFE",
            Self::Restricted => "RESTRICTED",
            Self::Safe => "SAFE"
        }
    }
}

/// Which language binding runs the function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromMeta)]
pub enum Trust {
    /// The trusted binding.
    Sandboxed,
    /// The untrusted binding.
    Unsandboxed,
}

/// When a trigger fires relative to its event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromMeta)]
pub enum TriggerCalled {
    /// Before the event.
    Before,
    /// After the event.
    After,
    /// Replacing the event (views only).
    InsteadOf,
}

impl TriggerCalled {
    /// The SQL phrase.
    #[must_use]
    pub fn sql(self) -> &'static str {
        match self {
            Self::Before => "BEFORE",
            Self::After => "AFTER",
            Self::InsteadOf => "INSTEAD OF"
        }
    }
}

/// Row- or statement-level firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromMeta)]
pub enum TriggerScope {
    /// Once per statement.
    #[default]
    Statement,
    /// Once per affected row.
    Row,
}

impl TriggerScope {
    /// The SQL phrase.
    #[must_use]
    pub fn sql(self) -> &'static str {
        match self {
            Self::Statement => "STATEMENT",
            Self::Row => "ROW"
        }
    }
}

/// A trigger event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEvent {
    /// INSERT.
    Insert,
    /// UPDATE, optionally of specific columns.
    Update,
    /// DELETE.
    Delete,
    /// TRUNCATE.
    Truncate,
}

impl TriggerEvent {
    /// The SQL keyword.
    #[must_use]
    pub fn sql(self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Truncate => "TRUNCATE"
        }
    }
}

/// How a cast converts its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromMeta)]
pub enum CastPath {
    /// The representations already match.
    Binary,
    /// Via the types' I/O conversions.
    Inout,
    /// Via a conversion function.
    Function,
}

/// In which contexts a cast applies implicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromMeta)]
pub enum CastApplication {
    /// Only on explicit request.
    #[default]
    Explicit,
    /// Also in assignment contexts.
    Assignment,
    /// Also in expression contexts.
    Implicit,
}

/// Storage alignment of a base type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromMeta)]
pub enum Alignment {
    /// Byte alignment.
    Char,
    /// Two-byte alignment.
    Int2,
    /// Four-byte alignment.
    Int4,
    /// Eight-byte alignment.
    Double,
}

impl Alignment {
    /// The CREATE TYPE keyword.
    #[must_use]
    pub fn sql(self) -> &'static str {
        match self {
            Self::Char => "char",
            Self::Int2 => "int2",
            Self::Int4 => "int4",
            Self::Double => "double"
        }
    }

    /// The alignment width in bytes.
    #[must_use]
    pub fn bytes(self) -> i32 {
        match self {
            Self::Char => 1,
            Self::Int2 => 2,
            Self::Int4 => 4,
            Self::Double => 8
        }
    }
}

/// TOAST storage strategy of a base type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromMeta)]
pub enum Storage {
    /// Inline, never compressed.
    Plain,
    /// Out of line, never compressed.
    External,
    /// Out of line, compressed.
    Extended,
    /// Inline, compressed.
    Main,
}

impl Storage {
    /// The CREATE TYPE keyword.
    #[must_use]
    pub fn sql(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::External => "external",
            Self::Extended => "extended",
            Self::Main => "main"
        }
    }
}

/// FINALFUNC_MODIFY / MFINALFUNC_MODIFY values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromMeta)]
pub enum FinishEffect {
    /// The finisher never changes the state.
    ReadOnly,
    /// May be shared across finisher calls.
    Shareable,
    /// The finisher may trash the state.
    ReadWrite,
}

impl FinishEffect {
    /// The SQL keyword.
    #[must_use]
    pub fn sql(self) -> &'static str {
        match self {
            Self::ReadOnly => "READ_ONLY",
            Self::Shareable => "SHAREABLE",
            Self::ReadWrite => "READ_WRITE"
        }
    }
}

/// Payload of `#[sql_action(...)]`.
#[derive(Debug, Clone, Default, FromMeta)]
#[darling(default)]
pub struct SqlActionAttrs {
    /// SQL commands for the install group.
    pub install: StrList,
    /// SQL commands for the remove group.
    pub remove: StrList,
    /// Explicit tags this action provides.
    pub provides: StrList,
    /// Explicit tags this action requires.
    pub requires: StrList,
    /// Implementor-block name; `-` disables wrapping.
    pub implementor: Option<String>,
}

/// Payload of a `param(...)` entry inside `#[function(...)]`.
#[derive(Debug, Clone, Default, FromMeta)]
#[darling(default)]
pub struct ParamAttrs {
    /// The Rust parameter this entry describes.
    pub name: String,
    /// Explicit SQL type text.
    #[darling(rename = "type")]
    pub sql_type: Option<String>,
    /// Default value(s).
    pub default: StrList,
    /// Emit `DEFAULT NULL`.
    pub optional: bool,
}

/// Payload of a `trigger(...)` entry inside `#[function(...)]`.
#[derive(Debug, Clone, Default, FromMeta)]
#[darling(default)]
pub struct TriggerAttrs {
    /// Trigger name; defaults to function and table.
    pub name: Option<String>,
    /// Schema of the subject table.
    pub schema: Option<String>,
    /// The subject table.
    pub table: String,
    /// Events that fire the trigger.
    pub events: EventList,
    /// String arguments passed to the function.
    pub arguments: StrList,
    /// Row- or statement-level.
    pub scope: Option<TriggerScope>,
    /// BEFORE / AFTER / INSTEAD OF.
    pub called: Option<TriggerCalled>,
    /// WHEN condition text.
    pub when: Option<String>,
    /// Columns for UPDATE OF.
    pub columns: StrList,
    /// Declare a constraint trigger.
    pub constraint: bool,
    /// Referenced table of a constraint trigger.
    pub from: Option<String>,
    /// Schema of the referenced table.
    pub from_schema: Option<String>,
    /// Transition-table name for old rows.
    pub table_old: Option<String>,
    /// Transition-table name for new rows.
    pub table_new: Option<String>,
    /// COMMENT ON text.
    pub comment: Option<String>,
}

/// Payload of `#[function(...)]`.
#[derive(Debug, Clone, Default, FromMeta)]
#[darling(default)]
pub struct FunctionAttrs {
    /// SQL function name; defaults to the Rust fn name.
    pub name: Option<String>,
    /// Schema; unqualified when absent.
    pub schema: Option<String>,
    /// Explicit return type text; `RECORD` confirms a composite.
    #[darling(rename = "type")]
    pub return_type: Option<String>,
    /// OUT parameters, each as `"name type"`.
    pub out: StrList,
    /// Declare the last parameter VARIADIC.
    pub variadic: bool,
    /// CALLED / RETURNS NULL ON NULL INPUT.
    pub on_null_input: Option<OnNullInput>,
    /// INVOKER / DEFINER.
    pub security: Option<Security>,
    /// Volatility.
    pub effects: Option<Effects>,
    /// Which binding (trusted/untrusted) runs it.
    pub trust: Option<Trust>,
    /// Explicit language name; excludes `trust`.
    pub language: Option<String>,
    /// PARALLEL marking.
    pub parallel: Option<Parallel>,
    /// LEAKPROOF / NOT LEAKPROOF.
    pub leakproof: Option<bool>,
    /// Planner cost hint.
    pub cost: Option<u32>,
    /// Planner rows hint (set-returning only).
    pub rows: Option<u32>,
    /// `SET` configuration clauses.
    pub settings: StrList,
    /// Triggers executed through this function.
    #[darling(multiple, rename = "trigger")]
    pub triggers: Vec<TriggerAttrs>,
    /// Per-parameter type data.
    #[darling(multiple, rename = "param")]
    pub params: Vec<ParamAttrs>,
    /// Explicit tags provided.
    pub provides: StrList,
    /// Explicit tags required.
    pub requires: StrList,
    /// Implementor-block name; `-` disables wrapping.
    pub implementor: Option<String>,
    /// COMMENT ON text; defaults to the doc comment's first sentence.
    pub comment: Option<String>,
}

/// Payload of `#[base_udt(...)]`.
#[derive(Debug, Clone, Default, FromMeta)]
#[darling(default)]
pub struct BaseUdtAttrs {
    /// SQL type name; defaults from the Rust type name.
    pub name: Option<String>,
    /// Schema; unqualified when absent.
    pub schema: Option<String>,
    /// INTERNALLENGTH; `-1` means VARIABLE.
    pub internal_length: Option<i32>,
    /// PASSEDBYVALUE.
    pub passed_by_value: bool,
    /// ALIGNMENT.
    pub alignment: Option<Alignment>,
    /// STORAGE.
    pub storage: Option<Storage>,
    /// CATEGORY, one printable ASCII character.
    pub category: Option<String>,
    /// PREFERRED within its category.
    pub preferred: bool,
    /// DEFAULT value text.
    pub default: Option<String>,
    /// ELEMENT type for subscripting.
    pub element: Option<String>,
    /// Array delimiter character.
    pub delimiter: Option<String>,
    /// COLLATABLE.
    pub collatable: bool,
    /// Type-modifier input function name.
    pub type_modifier_input: Option<String>,
    /// Type-modifier output function name.
    pub type_modifier_output: Option<String>,
    /// ANALYZE function name.
    pub analyze: Option<String>,
    /// Explicit tags provided.
    pub provides: StrList,
    /// Explicit tags required.
    pub requires: StrList,
    /// Implementor-block name.
    pub implementor: Option<String>,
    /// COMMENT ON text.
    pub comment: Option<String>,
}

/// Payload of `#[mapped_udt(...)]`.
#[derive(Debug, Clone, Default, FromMeta)]
#[darling(default)]
pub struct MappedUdtAttrs {
    /// SQL type name; defaults from the Rust type name.
    pub name: Option<String>,
    /// Schema; unqualified when absent.
    pub schema: Option<String>,
    /// Attribute declarations for `CREATE TYPE ... AS (...)`.
    pub structure: StrList,
    /// Explicit tags provided.
    pub provides: StrList,
    /// Explicit tags required.
    pub requires: StrList,
    /// Implementor-block name.
    pub implementor: Option<String>,
    /// COMMENT ON text.
    pub comment: Option<String>,
}

/// Payload of `#[cast(...)]`.
#[derive(Debug, Clone, Default, FromMeta)]
#[darling(default)]
pub struct CastAttrs {
    /// Source type; defaults from the annotated function.
    pub from: Option<String>,
    /// Target type; defaults from the annotated function.
    pub to: Option<String>,
    /// Conversion path for casts without a function.
    pub path: Option<CastPath>,
    /// Implicit-application level.
    pub application: Option<CastApplication>,
    /// Explicit tags provided.
    pub provides: StrList,
    /// Explicit tags required.
    pub requires: StrList,
    /// Implementor-block name.
    pub implementor: Option<String>,
    /// COMMENT ON text.
    pub comment: Option<String>,
}

/// Payload of `#[operator(...)]`.
#[derive(Debug, Clone, Default, FromMeta)]
#[darling(default)]
pub struct OperatorAttrs {
    /// Operator name, `op` or `schema.op`.
    pub name: String,
    /// Left operand type text.
    pub left: Option<String>,
    /// Right operand type text.
    pub right: Option<String>,
    /// Function implementing the operator; defaults to the annotated fn.
    pub function: Option<String>,
    /// Derive this operator: a function name to synthesize, or `TWIN`.
    pub synthetic: Option<String>,
    /// Commutator: an operator name, or `SELF` / `TWIN`.
    pub commutator: Option<String>,
    /// Negator: an operator name, or `SELF`.
    pub negator: Option<String>,
    /// Restriction-selectivity estimator.
    pub restrict: Option<String>,
    /// Join-selectivity estimator.
    pub join: Option<String>,
    /// HASHES.
    pub hashes: bool,
    /// MERGES.
    pub merges: bool,
    /// Explicit tags provided.
    pub provides: StrList,
    /// Explicit tags required.
    pub requires: StrList,
    /// Implementor-block name.
    pub implementor: Option<String>,
    /// COMMENT ON text.
    pub comment: Option<String>,
}

/// Payload of a `plan(...)` / `moving_plan(...)` entry.
#[derive(Debug, Clone, Default, FromMeta)]
#[darling(default)]
pub struct PlanAttrs {
    /// STYPE; defaults from the accumulator's first parameter.
    pub state_type: Option<String>,
    /// SSPACE.
    pub state_size: Option<u32>,
    /// INITCOND.
    pub initial_state: Option<String>,
    /// SFUNC name; defaults to the annotated fn.
    pub accumulate: Option<String>,
    /// COMBINEFUNC name.
    pub combine: Option<String>,
    /// FINALFUNC name.
    pub finish: Option<String>,
    /// INVFUNC (moving plans only).
    pub remove: Option<String>,
    /// SERIALFUNC name.
    pub serialize: Option<String>,
    /// DESERIALFUNC name.
    pub deserialize: Option<String>,
    /// FINALFUNC_EXTRA.
    pub polymorphic: bool,
    /// FINALFUNC_MODIFY.
    pub finish_effect: Option<FinishEffect>,
}

/// Payload of `#[aggregate(...)]`.
#[derive(Debug, Clone, Default, FromMeta)]
#[darling(default)]
pub struct AggregateAttrs {
    /// Aggregate name; defaults to the Rust fn name.
    pub name: Option<String>,
    /// Schema; unqualified when absent.
    pub schema: Option<String>,
    /// Aggregated arguments, each `"name type"` or `"type"`.
    pub arguments: StrList,
    /// Direct arguments; present (even empty) means ordered-set.
    pub direct_arguments: Option<StrList>,
    /// Hypothetical-set aggregate.
    pub hypothetical: bool,
    /// Variadic marker(s).
    pub variadic: VariadicSpec,
    /// The main plan.
    pub plan: Option<PlanAttrs>,
    /// The moving-window plan.
    pub moving_plan: Option<PlanAttrs>,
    /// PARALLEL marking.
    pub parallel: Option<Parallel>,
    /// SORTOP.
    pub sort_operator: Option<String>,
    /// Explicit tags provided.
    pub provides: StrList,
    /// Explicit tags required.
    pub requires: StrList,
    /// Implementor-block name.
    pub implementor: Option<String>,
    /// COMMENT ON text.
    pub comment: Option<String>,
}
