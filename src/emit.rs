// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Descriptor text assembly.
//!
//! The deployment descriptor is one text artifact with two groups:
//!
//! ```text
//! SQLActions[]={
//! "BEGIN INSTALL
//! <command>;
//! BEGIN <implementor>
//! <command>
//! END <implementor>;
//! END INSTALL",
//! "BEGIN REMOVE
//! ...
//! END REMOVE"
//! }
//! ```
//!
//! A command whose snippet carries an implementor name is wrapped in a
//! `BEGIN name ... END name;` block so the loader runs it only when that
//! name is in its implementors set; everything else gets a bare `;`.
//!
//! Before anything is written, every command must pass the lexability
//! check: the descriptor's own lexer understands exactly three escape
//! mechanisms (backslash-anything, single-quoted spans, double-quoted
//! spans, with doubling as the in-span escape), so any `;`, `'`, or `"`
//! outside those rules would corrupt the file on playback.

/// One scheduled command ready for the descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmitItem {
    /// Implementor-block name, already validated and deparsed.
    pub implementor: Option<String>,
    /// The SQL command text, without a trailing semicolon.
    pub sql: String,
}

/// Escape `s` as an `e'...'` string literal.
///
/// Backslashes and apostrophes are doubled; the SQL `e''` literal rule
/// recovers the original text exactly.
#[must_use]
pub fn e_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 3);
    out.push_str("e'");
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("''"),
            _ => out.push(c)
        }
    }
    out.push('\'');
    out
}

/// Check that `s` would survive the descriptor lexer.
///
/// # Errors
///
/// Returns a description of the first violation: an unquoted `;`, an
/// unbalanced quoted span, or a dangling backslash.
pub fn check_lexable(s: &str) -> Result<(), String> {
    #[derive(PartialEq)]
    enum State {
        Normal,
        Single,
        Double,
    }
    let mut state = State::Normal;
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match state {
            State::Normal => match c {
                '\\' => {
                    if chars.next().is_none() {
                        return Err("dangling backslash at end of command".into());
                    }
                }
                '\'' => state = State::Single,
                '"' => state = State::Double,
                ';' => return Err("unquoted ; embedded in command".into()),
                _ => {}
            },
            State::Single => {
                if c == '\'' {
                    if chars.peek() == Some(&'\'') {
                        chars.next();
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::Double => {
                if c == '"' {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                    } else {
                        state = State::Normal;
                    }
                }
            }
        }
    }
    match state {
        State::Normal => Ok(()),
        State::Single => Err("unbalanced ' in command".into()),
        State::Double => Err("unbalanced \" in command".into())
    }
}

/// Whether `name` satisfies the restricted implementor-name alphabet
/// (the intersection of the SQL and host identifier rules).
#[must_use]
pub fn valid_implementor(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name
            .chars()
            .skip(1)
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Assemble the full descriptor text from scheduled commands.
#[must_use]
pub fn render(install: &[EmitItem], remove: &[EmitItem]) -> String {
    let mut out = String::from("SQLActions[]={\n\"BEGIN INSTALL\n");
    render_group(&mut out, install);
    out.push_str("END INSTALL\",\n\"BEGIN REMOVE\n");
    render_group(&mut out, remove);
    out.push_str("END REMOVE\"\n}\n");
    out
}

fn render_group(out: &mut String, items: &[EmitItem]) {
    for item in items {
        match &item.implementor {
            Some(name) => {
                out.push_str("BEGIN ");
                out.push_str(name);
                out.push('\n');
                out.push_str(&item.sql);
                out.push_str("\nEND ");
                out.push_str(name);
                out.push_str(";\n");
            }
            None => {
                out.push_str(&item.sql);
                out.push_str(";\n");
            }
        }
    }
}
