// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Diagnostics sink.
//!
//! Processing never bails on the first problem: every carrier runs its
//! validation to completion so all diagnostics surface at once, and only
//! emission is suppressed when anything fatal was reported. The
//! [`Reporter`] collects everything; at the end the driver folds the
//! errors into a single [`darling::Error`] for the caller.

use proc_macro2::Span;
use quote::ToTokens;

/// How bad a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Worth telling the user; does not suppress emission.
    Warning,
    /// Suppresses emission once processing completes.
    Error,
}

/// One collected diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Warning or error.
    pub severity: Severity,
    /// Human-readable message.
    pub message: String,
    /// Source location, when one is known.
    pub span: Option<Span>,
}

/// Collects diagnostics across the whole run.
#[derive(Debug, Default)]
pub struct Reporter {
    diags: Vec<Diagnostic>,
    errors: usize,
}

impl Reporter {
    /// An empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error without a location.
    pub fn error(&mut self, message: impl Into<String>) {
        self.push(Severity::Error, message.into(), None);
    }

    /// Record an error located at `span`.
    pub fn error_span(&mut self, span: Span, message: impl Into<String>) {
        self.push(Severity::Error, message.into(), Some(span));
    }

    /// Record an error located at a syntax node.
    pub fn error_at<T: ToTokens>(&mut self, node: &T, message: impl Into<String>) {
        let span = node
            .to_token_stream()
            .into_iter()
            .next()
            .map_or_else(Span::call_site, |t| t.span());
        self.push(Severity::Error, message.into(), Some(span));
    }

    /// Record a warning without a location.
    pub fn warn(&mut self, message: impl Into<String>) {
        self.push(Severity::Warning, message.into(), None);
    }

    /// Record a warning located at `span`.
    pub fn warn_span(&mut self, span: Span, message: impl Into<String>) {
        self.push(Severity::Warning, message.into(), Some(span));
    }

    /// Record a warning located at a syntax node.
    pub fn warn_at<T: ToTokens>(&mut self, node: &T, message: impl Into<String>) {
        let span = node
            .to_token_stream()
            .into_iter()
            .next()
            .map_or_else(Span::call_site, |t| t.span());
        self.push(Severity::Warning, message.into(), Some(span));
    }

    fn push(&mut self, severity: Severity, message: String, span: Option<Span>) {
        if severity == Severity::Error {
            self.errors += 1;
        }
        self.diags.push(Diagnostic {
            severity,
            message,
            span
        });
    }

    /// Whether any error has been recorded.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    /// All diagnostics in the order reported.
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diags
    }

    /// The warning messages, for callers that print them.
    #[must_use]
    pub fn warnings(&self) -> Vec<String> {
        self.diags
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .map(|d| d.message.clone())
            .collect()
    }

    /// Fold every recorded error into one [`darling::Error`].
    ///
    /// Returns `None` when no errors were recorded.
    #[must_use]
    pub fn into_error(self) -> Option<darling::Error> {
        let errors: Vec<darling::Error> = self
            .diags
            .into_iter()
            .filter(|d| d.severity == Severity::Error)
            .map(|d| match d.span {
                Some(span) => darling::Error::from(syn::Error::new(span, d.message)),
                None => darling::Error::custom(d.message)
            })
            .collect();
        if errors.is_empty() {
            None
        } else {
            Some(darling::Error::multiple(errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_and_warnings_tracked_separately() {
        let mut r = Reporter::new();
        r.warn("just so you know");
        assert!(!r.has_errors());
        r.error("that is broken");
        assert!(r.has_errors());
        assert_eq!(r.warnings(), vec!["just so you know".to_owned()]);
        assert_eq!(r.diagnostics().len(), 2);
    }

    #[test]
    fn into_error_collects_all_errors() {
        let mut r = Reporter::new();
        r.error("first");
        r.error("second");
        let err = r.into_error().unwrap();
        assert_eq!(err.len(), 2);
    }

    #[test]
    fn into_error_none_when_clean() {
        let mut r = Reporter::new();
        r.warn("only a warning");
        assert!(r.into_error().is_none());
    }

    #[test]
    fn error_at_captures_a_span() {
        let item: syn::ItemFn = syn::parse_quote! {
            fn broken() {}
        };
        let mut r = Reporter::new();
        r.error_at(&item.sig.ident, "bad function");
        assert!(r.diagnostics()[0].span.is_some());
    }
}
