// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Dependency tags.
//!
//! A [`DependTag`] is the key that connects a snippet providing something
//! to every snippet requiring it. Explicit tags are opaque strings from
//! `provides`/`requires` attributes; the other variants are derived from
//! the declarations themselves, so a function picks up a dependency on
//! its parameter types without anyone writing a tag by hand.

use std::fmt;

use crate::{
    dbtype::DbType,
    ident::{Operator, Qualified, Simple}
};

/// A typed dependency key.
///
/// Equality is by variant then content; `Function` and `Operator`
/// signatures must match element-wise, with an absent operand matching
/// only an absent operand.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DependTag {
    /// An opaque tag written in an annotation.
    Explicit(String),
    /// A type by qualified name.
    Type(Qualified<Simple>),
    /// A function by qualified name and parameter signature.
    Function(Qualified<Simple>, Vec<DbType>),
    /// An operator by qualified name and two operand slots; a slot is
    /// `None` only for the deprecated unary forms.
    Operator(Qualified<Operator>, [Option<DbType>; 2]),
}

impl fmt::Display for DependTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Explicit(s) => write!(f, "(Explicit){s}"),
            Self::Type(q) => write!(f, "(Type){}", q.deparse()),
            Self::Function(q, sig) => {
                write!(f, "(Function){}(", q.deparse())?;
                for (i, t) in sig.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    f.write_str(&t.to_sql(false))?;
                }
                f.write_str(")")
            }
            Self::Operator(q, [l, r]) => {
                let side = |s: &Option<DbType>| {
                    s.as_ref()
                        .map_or_else(|| "NONE".to_owned(), |t| t.to_sql(false))
                };
                write!(f, "(Operator){}({},{})", q.deparse_header(), side(l), side(r))
            }
        }
    }
}
