// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! SQL identifiers: simple names, operator names, and qualified names.
//!
//! An unquoted SQL identifier is *folded* (ASCII downcase) before any
//! comparison; a delimited (double-quoted) identifier keeps its exact
//! spelling. Equality and hashing work over the folded form, so
//! `FOO`, `foo`, and `"foo"` all collide, while `"Foo"` stays distinct.
//!
//! Operator names come from a restricted punctuation alphabet and follow
//! the PostgreSQL trailing-sign rule. Qualified names carry an optional
//! schema part and print either dotted (`schema.name`) or, for operators
//! outside CREATE/DROP headers, wrapped as `OPERATOR(schema.op)`.

use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher}
};

/// Characters an operator name may consist of.
const OPERATOR_ALPHABET: &str = "+-*/<>=~!@#%^&|`?";

/// Characters that allow an operator name to end in `+` or `-`.
const OPERATOR_SIGN_EXEMPT: &str = "~!@#%^&|`?";

/// A simple (unqualified) SQL identifier.
///
/// Construct one with [`Simple::from_sql`] (accepts the literal SQL
/// spelling, quoted or not) or [`Simple::from_host`] (accepts a Rust-side
/// name, which must also survive the descriptor file's stricter lexer).
#[derive(Debug, Clone)]
pub struct Simple {
    /// Folded spelling for non-delimited names, exact for delimited ones.
    text: String,
    delimited: bool,
}

impl Simple {
    /// Parse an identifier as it would appear in SQL text.
    ///
    /// A leading `"` makes the identifier delimited; inner doubled quotes
    /// collapse. Anything else must be a regular identifier, which is
    /// folded immediately.
    ///
    /// # Errors
    ///
    /// Returns a message when the text is empty, a delimited form is
    /// unterminated, or an unquoted form contains illegal characters.
    pub fn from_sql(text: &str) -> Result<Self, String> {
        let text = text.trim();
        if text.is_empty() {
            return Err("identifier must not be empty".into());
        }
        if let Some(stripped) = text.strip_prefix('"') {
            let inner = stripped
                .strip_suffix('"')
                .ok_or_else(|| format!("unterminated delimited identifier: {text}"))?;
            let mut unquoted = String::with_capacity(inner.len());
            let mut chars = inner.chars().peekable();
            while let Some(c) = chars.next() {
                if c == '"' {
                    match chars.next() {
                        Some('"') => unquoted.push('"'),
                        _ => {
                            return Err(format!("stray quote inside delimited identifier: {text}"));
                        }
                    }
                } else {
                    unquoted.push(c);
                }
            }
            if unquoted.is_empty() {
                return Err("delimited identifier must not be empty".into());
            }
            return Ok(Self {
                text: unquoted,
                delimited: true
            });
        }
        if is_regular(text) {
            Ok(Self {
                text: fold(text),
                delimited: false
            })
        } else {
            Err(format!("not a regular identifier (quote it?): {text}"))
        }
    }

    /// Build an identifier from a host-language name.
    ///
    /// The name must satisfy the intersection of the SQL and host
    /// alphabets used by the descriptor lexer: an ASCII letter or
    /// underscore followed by ASCII letters, digits, or underscores.
    /// Names that are not all-lowercase become delimited so their exact
    /// spelling survives folding.
    pub fn from_host(name: &str) -> Result<Self, String> {
        let mut chars = name.chars();
        let head_ok = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        let tail_ok = name
            .chars()
            .skip(1)
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !head_ok || !tail_ok {
            return Err(format!("not usable as an identifier here: {name}"));
        }
        if name.chars().any(|c| c.is_ascii_uppercase()) {
            Ok(Self {
                text: name.to_owned(),
                delimited: true
            })
        } else {
            Ok(Self {
                text: name.to_owned(),
                delimited: false
            })
        }
    }

    /// Wrap an exact spelling, delimiting only when folding would lose it.
    ///
    /// Used for synthesized names built from other identifiers' folded
    /// text, which may contain characters a regular identifier cannot.
    pub fn from_raw(text: &str) -> Result<Self, String> {
        if text.is_empty() {
            return Err("identifier must not be empty".into());
        }
        if is_regular(text) && !text.chars().any(|c| c.is_ascii_uppercase()) {
            Ok(Self {
                text: text.to_owned(),
                delimited: false
            })
        } else {
            Ok(Self {
                text: text.to_owned(),
                delimited: true
            })
        }
    }

    /// The folded spelling used for comparisons.
    #[must_use]
    pub fn folded(&self) -> &str {
        &self.text
    }

    /// Whether this identifier was delimited (double-quoted).
    #[must_use]
    pub fn is_delimited(&self) -> bool {
        self.delimited
    }

    /// Render the identifier, quoting only when necessary.
    #[must_use]
    pub fn deparse(&self) -> String {
        if !self.delimited && is_regular(&self.text) {
            self.text.clone()
        } else {
            self.deparse_quoted()
        }
    }

    /// Render the identifier double-quoted unconditionally.
    ///
    /// Parameter names are emitted this way so their exact spelling is
    /// preserved regardless of folding.
    #[must_use]
    pub fn deparse_quoted(&self) -> String {
        let mut out = String::with_capacity(self.text.len() + 2);
        out.push('"');
        for c in self.text.chars() {
            if c == '"' {
                out.push('"');
            }
            out.push(c);
        }
        out.push('"');
        out
    }

    /// Attach an optional qualifier, producing a qualified name.
    #[must_use]
    pub fn with_qualifier(self, qualifier: Option<Simple>) -> Qualified<Simple> {
        Qualified {
            qualifier,
            local: self
        }
    }

    /// Equality check that also reports the near-miss case: two names
    /// that collide under folding but differ in delimitedness.
    pub fn eq_reporting(&self, other: &Self, mut warn: impl FnMut(String)) -> bool {
        let equal = self == other;
        if equal && self.delimited != other.delimited {
            warn(format!(
                "identifiers {} and {} match only because one is delimited",
                self.deparse(),
                other.deparse()
            ));
        }
        equal
    }
}

impl PartialEq for Simple {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl Eq for Simple {}

impl Hash for Simple {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.text.hash(state);
    }
}

impl PartialOrd for Simple {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Simple {
    fn cmp(&self, other: &Self) -> Ordering {
        self.text.cmp(&other.text)
    }
}

impl fmt::Display for Simple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.deparse())
    }
}

/// An operator name drawn from the SQL operator alphabet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Operator {
    text: String,
}

impl Operator {
    /// Validate and wrap an operator spelling.
    ///
    /// Enforces the operator alphabet, the no-comment rule (`--`, `/*`
    /// may not appear), and the trailing-sign rule: a name may end in
    /// `+` or `-` only if it also contains one of `~ ! @ # % ^ & | \` ?`.
    pub fn from_str(text: &str) -> Result<Self, String> {
        if text.is_empty() {
            return Err("operator name must not be empty".into());
        }
        if let Some(c) = text.chars().find(|c| !OPERATOR_ALPHABET.contains(*c)) {
            return Err(format!("character {c:?} not allowed in operator name {text}"));
        }
        if text.contains("--") || text.contains("/*") {
            return Err(format!("operator name {text} contains a comment start"));
        }
        if (text.ends_with('+') || text.ends_with('-'))
            && !text.chars().any(|c| OPERATOR_SIGN_EXEMPT.contains(c))
        {
            return Err(format!(
                "operator name {text} may not end in + or - without one of {OPERATOR_SIGN_EXEMPT}"
            ));
        }
        Ok(Self {
            text: text.to_owned()
        })
    }

    /// The operator spelling.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Attach an optional schema qualifier.
    #[must_use]
    pub fn with_qualifier(self, qualifier: Option<Simple>) -> Qualified<Operator> {
        Qualified {
            qualifier,
            local: self
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// A possibly schema-qualified name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Qualified<N> {
    /// Schema part, absent for an unqualified name.
    pub qualifier: Option<Simple>,
    /// Local part: a [`Simple`] for objects, an [`Operator`] for operators.
    pub local: N,
}

impl Qualified<Simple> {
    /// Parse `name` or `schema.name`, honoring quoting on either part.
    pub fn from_sql(text: &str) -> Result<Self, String> {
        let (qualifier, local) = match split_qualified(text.trim()) {
            Some((schema, name)) => (Some(Simple::from_sql(schema)?), Simple::from_sql(name)?),
            None => (None, Simple::from_sql(text)?)
        };
        Ok(Self {
            qualifier,
            local
        })
    }

    /// Render as `schema.name` or bare `name`, quoting parts as needed.
    #[must_use]
    pub fn deparse(&self) -> String {
        match &self.qualifier {
            Some(q) => format!("{}.{}", q.deparse(), self.local.deparse()),
            None => self.local.deparse()
        }
    }
}

impl Qualified<Operator> {
    /// Render for a CREATE/DROP header: `schema.op` or bare `op`.
    #[must_use]
    pub fn deparse_header(&self) -> String {
        match &self.qualifier {
            Some(q) => format!("{}.{}", q.deparse(), self.local),
            None => self.local.to_string()
        }
    }
}

impl fmt::Display for Qualified<Simple> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.deparse())
    }
}

impl fmt::Display for Qualified<Operator> {
    /// Operator names print wrapped, `OPERATOR(schema.op)`, whenever a
    /// qualifier is present; CREATE/DROP headers use
    /// [`deparse_header`](Qualified::deparse_header) instead.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "OPERATOR({}.{})", q.deparse(), self.local),
            None => write!(f, "{}", self.local)
        }
    }
}

/// ASCII-only downcase, the SQL regular folding rule.
fn fold(text: &str) -> String {
    text.chars().map(|c| c.to_ascii_lowercase()).collect()
}

/// Whether `text` is a regular (quote-free) identifier.
fn is_regular(text: &str) -> bool {
    let mut chars = text.chars();
    let head = chars.next();
    head.is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && text
            .chars()
            .skip(1)
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        && text.is_ascii()
}

/// Split `schema.name` at the top-level dot, respecting quoted parts.
fn split_qualified(text: &str) -> Option<(&str, &str)> {
    let mut in_quotes = false;
    let mut prev_quote = false;
    for (idx, c) in text.char_indices() {
        match c {
            '"' => {
                // a doubled quote inside a delimited part stays inside
                if in_quotes && prev_quote {
                    prev_quote = false;
                } else if in_quotes {
                    prev_quote = true;
                } else {
                    in_quotes = true;
                }
            }
            '.' if !in_quotes || prev_quote => {
                return Some((&text[..idx], &text[idx + 1..]));
            }
            _ => {
                if prev_quote {
                    in_quotes = false;
                }
                prev_quote = false;
            }
        }
    }
    None
}
