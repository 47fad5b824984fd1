// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! SQL type references.
//!
//! A [`DbType`] is how the generator talks about an SQL type without ever
//! consulting a database: a grammar keyword (`integer`), a possibly
//! qualified name (`pg_catalog.bytea`), an array of either, or any of
//! those wrapped with a rendered default clause.
//!
//! [`DbType::from_annotation`] parses the type strings users write in
//! attributes. It is deliberately permissive: anything it cannot fully
//! understand is carried through verbatim as a keyword-style type, so an
//! exotic spelling like `timestamp (3) with time zone` still round-trips
//! into the emitted SQL unchanged.

use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher}
};

use crate::{
    ident::{Qualified, Simple},
    tag::DependTag
};

/// Single-word type names that are grammar keywords rather than
/// catalog-resolved names.
const RESERVED_TYPES: &[&str] = &[
    "bigint", "bit", "boolean", "char", "character", "decimal", "dec", "float", "int", "integer",
    "interval", "numeric", "real", "smallint", "time", "timestamp", "varchar"
];

/// A reference to an SQL type.
#[derive(Debug, Clone)]
pub enum DbType {
    /// A keyword type, carried as written (`integer`, `double precision`).
    Reserved(String),
    /// A named, possibly schema-qualified type.
    Named(Qualified<Simple>),
    /// An array over an element type, with the suffix as written.
    Array {
        /// Element type.
        elem: Box<DbType>,
        /// The literal suffix text, e.g. `[]` or `ARRAY[4]`.
        suffix: String,
    },
    /// A type plus a rendered default clause, attached only on request.
    Defaulting {
        /// The underlying type.
        ty: Box<DbType>,
        /// Complete default expression text (already escaped/cast).
        default_text: String,
    },
}

impl DbType {
    /// A named type from a qualified name.
    #[must_use]
    pub fn named(name: Qualified<Simple>) -> Self {
        Self::Named(name)
    }

    /// A keyword type carried verbatim.
    #[must_use]
    pub fn reserved(text: impl Into<String>) -> Self {
        Self::Reserved(text.into())
    }

    /// Convenience constructor for a `pg_catalog` type.
    ///
    /// # Panics
    ///
    /// Panics if `local` is not a regular identifier; callers pass
    /// compile-time constants only.
    #[must_use]
    pub fn catalog(local: &str) -> Self {
        let schema = Simple::from_sql("pg_catalog").expect("static identifier");
        let local = Simple::from_sql(local).expect("static identifier");
        Self::Named(local.with_qualifier(Some(schema)))
    }

    /// Parse a type expression as written in an annotation.
    ///
    /// Recognizes an optionally qualified (and optionally quoted) name
    /// followed by an optional array suffix (`[]`, `[n]`, `ARRAY`,
    /// `ARRAY[n]`). A single unqualified word from the keyword list
    /// becomes [`DbType::Reserved`]. Everything else — typmods, multi
    /// word keywords, spellings with stray characters — is preserved
    /// verbatim as a keyword-style type.
    #[must_use]
    pub fn from_annotation(text: &str) -> Self {
        let trimmed = text.trim();
        let Some((name_text, rest)) = scan_name(trimmed) else {
            return Self::Reserved(trimmed.to_owned());
        };
        let rest = rest.trim();
        let base = if rest.is_empty() || is_array_suffix(rest) {
            if !name_text.contains('.') && !name_text.starts_with('"') {
                let folded = name_text.to_ascii_lowercase();
                if RESERVED_TYPES.contains(&folded.as_str()) {
                    Self::Reserved(folded)
                } else {
                    match Qualified::from_sql(name_text) {
                        Ok(q) => Self::Named(q),
                        Err(_) => return Self::Reserved(trimmed.to_owned())
                    }
                }
            } else {
                match Qualified::from_sql(name_text) {
                    Ok(q) => Self::Named(q),
                    Err(_) => return Self::Reserved(trimmed.to_owned())
                }
            }
        } else {
            return Self::Reserved(trimmed.to_owned());
        };
        if rest.is_empty() {
            base
        } else {
            // keyword-form suffixes (ARRAY) need the separating space back
            let suffix = if rest.starts_with(|c: char| c.is_ascii_alphabetic()) {
                format!(" {rest}")
            } else {
                rest.to_owned()
            };
            Self::Array {
                elem: Box::new(base),
                suffix
            }
        }
    }

    /// Whether this type (through any default wrapper) is an array.
    #[must_use]
    pub fn is_array(&self) -> bool {
        match self {
            Self::Array {
                ..
            } => true,
            Self::Defaulting {
                ty, ..
            } => ty.is_array(),
            _ => false
        }
    }

    /// Wrap into a one-dimensional array type.
    #[must_use]
    pub fn as_array(self) -> Self {
        Self::Array {
            elem: Box::new(self),
            suffix: "[]".to_owned()
        }
    }

    /// Attach a rendered default clause.
    #[must_use]
    pub fn with_default(self, default_text: impl Into<String>) -> Self {
        Self::Defaulting {
            ty: Box::new(self),
            default_text: default_text.into()
        }
    }

    /// The type with any default wrapper removed.
    #[must_use]
    pub fn strip_default(&self) -> &DbType {
        match self {
            Self::Defaulting {
                ty, ..
            } => ty.strip_default(),
            other => other
        }
    }

    /// The dependency tag this type contributes, if any.
    ///
    /// Only catalog-resolved names produce a tag; keyword types are
    /// assumed ever-present.
    #[must_use]
    pub fn depend_tag(&self) -> Option<DependTag> {
        match self {
            Self::Named(q) => Some(DependTag::Type(q.clone())),
            Self::Array {
                elem, ..
            } => elem.depend_tag(),
            Self::Defaulting {
                ty, ..
            } => ty.depend_tag(),
            Self::Reserved(_) => None
        }
    }

    /// Render the type, optionally including a default clause.
    #[must_use]
    pub fn to_sql(&self, with_default: bool) -> String {
        match self {
            Self::Reserved(s) => s.clone(),
            Self::Named(q) => q.deparse(),
            Self::Array {
                elem,
                suffix
            } => format!("{}{}", elem.to_sql(false), suffix),
            Self::Defaulting {
                ty,
                default_text
            } => {
                if with_default {
                    format!("{} DEFAULT {}", ty.to_sql(false), default_text)
                } else {
                    ty.to_sql(false)
                }
            }
        }
    }

    /// Canonical comparison key. Defaults are transparent; keyword case
    /// and array suffix spelling are normalized.
    fn key(&self) -> String {
        match self {
            Self::Reserved(s) => format!("r:{}", s.to_ascii_lowercase()),
            Self::Named(q) => {
                let mut k = String::from("n:");
                if let Some(qual) = &q.qualifier {
                    k.push_str(qual.folded());
                    k.push('.');
                }
                k.push_str(q.local.folded());
                k
            }
            Self::Array {
                elem, ..
            } => format!("a:{}", elem.key()),
            Self::Defaulting {
                ty, ..
            } => ty.key()
        }
    }
}

impl PartialEq for DbType {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for DbType {}

impl Hash for DbType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for DbType {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DbType {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql(false))
    }
}

/// Scan a (possibly qualified, possibly quoted) name prefix.
///
/// Returns the name text and the unconsumed remainder, or `None` when the
/// text does not begin with something name-shaped.
fn scan_name(text: &str) -> Option<(&str, &str)> {
    let first = scan_part(text)?;
    let after = &text[first..];
    if let Some(dotted) = after.strip_prefix('.') {
        let second = scan_part(dotted)?;
        Some((&text[..first + 1 + second], &dotted[second..]))
    } else {
        Some((&text[..first], after))
    }
}

/// Length of one quoted or regular identifier part at the start of `text`.
fn scan_part(text: &str) -> Option<usize> {
    let mut chars = text.char_indices().peekable();
    match chars.peek()?.1 {
        '"' => {
            chars.next();
            while let Some((idx, c)) = chars.next() {
                if c == '"' {
                    match chars.peek() {
                        Some((_, '"')) => {
                            chars.next();
                        }
                        _ => return Some(idx + 1)
                    }
                }
            }
            None
        }
        c if c.is_ascii_alphabetic() || c == '_' => {
            let mut end = 0;
            for (idx, c) in text.char_indices() {
                if c.is_ascii_alphanumeric() || c == '_' || c == '$' {
                    end = idx + c.len_utf8();
                } else {
                    break;
                }
            }
            Some(end)
        }
        _ => None
    }
}

/// Whether `rest` is a well-formed array suffix.
fn is_array_suffix(rest: &str) -> bool {
    let mut s = rest.trim();
    if s.to_ascii_lowercase().starts_with("array") {
        s = s[5..].trim_start();
        if s.is_empty() {
            return true;
        }
    }
    while let Some(open) = s.strip_prefix('[') {
        match open.find(']') {
            Some(close) if open[..close].trim().chars().all(|c| c.is_ascii_digit()) => {
                s = open[close + 1..].trim_start();
            }
            _ => return false
        }
    }
    s.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_single_word() {
        let t = DbType::from_annotation("integer");
        assert!(matches!(t, DbType::Reserved(_)));
        assert_eq!(t.to_sql(false), "integer");
        assert!(t.depend_tag().is_none());
    }

    #[test]
    fn named_qualified() {
        let t = DbType::from_annotation("pg_catalog.int4");
        assert_eq!(t.to_sql(false), "pg_catalog.int4");
        assert!(t.depend_tag().is_some());
    }

    #[test]
    fn named_unqualified_non_keyword() {
        let t = DbType::from_annotation("complex");
        assert!(matches!(t, DbType::Named(_)));
        assert_eq!(t.to_sql(false), "complex");
    }

    #[test]
    fn quoted_name_preserved() {
        let t = DbType::from_annotation("\"My Type\"");
        assert_eq!(t.to_sql(false), "\"My Type\"");
    }

    #[test]
    fn array_suffix_plain() {
        let t = DbType::from_annotation("pg_catalog.int4[]");
        assert!(t.is_array());
        assert_eq!(t.to_sql(false), "pg_catalog.int4[]");
    }

    #[test]
    fn array_suffix_with_bound() {
        let t = DbType::from_annotation("integer[3]");
        assert!(t.is_array());
        assert_eq!(t.to_sql(false), "integer[3]");
    }

    #[test]
    fn array_keyword_suffix() {
        let t = DbType::from_annotation("integer array");
        assert!(t.is_array());
        assert_eq!(t.to_sql(false), "integer array");
    }

    #[test]
    fn uncertain_text_passes_through() {
        let t = DbType::from_annotation("timestamp (3) with time zone");
        assert!(matches!(t, DbType::Reserved(_)));
        assert_eq!(t.to_sql(false), "timestamp (3) with time zone");
    }

    #[test]
    fn typmod_passes_through() {
        let t = DbType::from_annotation("varchar(10)");
        assert_eq!(t.to_sql(false), "varchar(10)");
    }

    #[test]
    fn array_depend_tag_is_element_tag() {
        let t = DbType::from_annotation("myschema.point[]");
        let tag = t.depend_tag().unwrap();
        assert_eq!(tag.to_string(), "(Type)myschema.point");
    }

    #[test]
    fn default_round_trip() {
        let t = DbType::catalog("varchar").with_default("e'hi'::pg_catalog.varchar");
        assert_eq!(t.to_sql(false), "pg_catalog.varchar");
        assert_eq!(
            t.to_sql(true),
            "pg_catalog.varchar DEFAULT e'hi'::pg_catalog.varchar"
        );
    }

    #[test]
    fn equality_ignores_default_and_case() {
        let a = DbType::catalog("int4").with_default("NULL");
        let b = DbType::catalog("int4");
        assert_eq!(a, b);
        assert_eq!(
            DbType::from_annotation("INTEGER"),
            DbType::from_annotation("integer")
        );
    }

    #[test]
    fn reserved_and_named_differ() {
        assert_ne!(
            DbType::reserved("varchar"),
            DbType::from_annotation("myschema.varchar")
        );
    }
}
