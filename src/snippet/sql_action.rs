// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Free-form SQL actions.
//!
//! An `#[sql_action]` contributes raw commands to the install and remove
//! groups, ordered purely through its explicit `provides`/`requires`
//! tags. This is also how install-time conditions are declared: an
//! action whose `provides` names some snippet's implementor becomes that
//! implementor tag's provider.

use std::collections::BTreeSet;

use proc_macro2::Span;

use crate::{
    attrs::SqlActionAttrs,
    snippet::{Ctx, explicit_tags, resolve_implementor},
    tag::DependTag
};

/// Carrier for one `#[sql_action(...)]`.
#[derive(Debug)]
pub struct SqlAction {
    /// The parsed payload.
    pub attrs: SqlActionAttrs,
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

impl SqlAction {
    /// Wrap a freshly parsed payload.
    #[must_use]
    pub fn new(attrs: SqlActionAttrs, span: Span) -> Self {
        Self {
            attrs,
            span,
            implementor: None,
            provides: BTreeSet::new(),
            requires: BTreeSet::new(),
            deploy: Vec::new(),
            undeploy: Vec::new()
        }
    }

    pub(crate) fn characterize(&mut self, ctx: &mut Ctx<'_>) -> bool {
        self.implementor = resolve_implementor(
            self.attrs.implementor.as_deref(),
            ctx.default_implementor.as_ref(),
            ctx.reporter,
            self.span
        );
        explicit_tags(&self.attrs.provides, &mut self.provides);
        explicit_tags(&self.attrs.requires, &mut self.requires);
        self.deploy = self.attrs.install.0.clone();
        self.undeploy = self.attrs.remove.0.clone();
        true
    }
}
