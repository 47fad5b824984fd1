// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Triggers.
//!
//! A trigger is declared inside its function's attribute and never
//! scheduled on its own: the owning function emits the trigger's CREATE
//! after its own, and the trigger's DROP before its own. Characterize
//! therefore only validates and pre-renders; the snippet set a trigger
//! contributes is empty.

use proc_macro2::Span;

use crate::{
    attrs::{TriggerAttrs, TriggerCalled, TriggerEvent, TriggerScope},
    emit::e_quote,
    ident::{Qualified, Simple},
    report::Reporter
};

/// Carrier for one `trigger(...)` entry.
#[derive(Debug)]
pub struct Trigger {
    /// The parsed payload.
    pub attrs: TriggerAttrs,
    name: Option<Simple>,
    table: Option<Qualified<Simple>>,
    deploy: String,
    undeploy: String,
    comment_cmd: Option<String>,
}

impl Trigger {
    /// Wrap a freshly parsed payload.
    #[must_use]
    pub fn new(attrs: TriggerAttrs) -> Self {
        Self {
            attrs,
            name: None,
            table: None,
            deploy: String::new(),
            undeploy: String::new(),
            comment_cmd: None
        }
    }

    /// Validate against the compatibility rules and pre-render the SQL.
    pub(crate) fn characterize(
        &mut self,
        fn_qname: &Qualified<Simple>,
        reporter: &mut Reporter,
        span: Span
    ) -> bool {
        let a = &self.attrs;
        let mut ok = true;
        let fail = |reporter: &mut Reporter, msg: String| {
            reporter.error_span(span, msg);
        };

        let Some(name_text) = a.name.as_deref() else {
            fail(reporter, "trigger needs a name".into());
            return false;
        };
        let name = match Simple::from_sql(name_text) {
            Ok(n) => n,
            Err(e) => {
                fail(reporter, e);
                return false;
            }
        };
        if a.table.is_empty() {
            fail(reporter, format!("trigger {name_text} needs a table"));
            return false;
        }
        let table = match Simple::from_sql(&a.table) {
            Ok(t) => t,
            Err(e) => {
                fail(reporter, e);
                return false;
            }
        };
        let schema = match a.schema.as_deref().map(Simple::from_sql) {
            None => None,
            Some(Ok(s)) => Some(s),
            Some(Err(e)) => {
                fail(reporter, e);
                return false;
            }
        };
        let table = table.with_qualifier(schema);

        let events = &a.events.0;
        if events.is_empty() {
            fail(reporter, format!("trigger {name_text} needs at least one event"));
            ok = false;
        }
        let Some(called) = a.called else {
            fail(reporter, format!("trigger {name_text} needs called = before/after/instead_of"));
            return false;
        };
        let scope = a.scope.unwrap_or_default();

        if events.contains(&TriggerEvent::Truncate) && scope == TriggerScope::Row {
            fail(reporter, format!("trigger {name_text}: TRUNCATE cannot fire per row"));
            ok = false;
        }
        if called == TriggerCalled::InsteadOf {
            if a.when.is_some() {
                fail(reporter, format!("trigger {name_text}: INSTEAD OF cannot have WHEN"));
                ok = false;
            }
            if !a.columns.is_empty() {
                fail(reporter, format!("trigger {name_text}: INSTEAD OF cannot name columns"));
                ok = false;
            }
            if scope != TriggerScope::Row {
                fail(reporter, format!("trigger {name_text}: INSTEAD OF requires row scope"));
                ok = false;
            }
        }
        if !a.columns.is_empty() && !events.contains(&TriggerEvent::Update) {
            fail(reporter, format!("trigger {name_text}: a column list needs an UPDATE event"));
            ok = false;
        }
        if a.table_old.is_some() || a.table_new.is_some() {
            if called != TriggerCalled::After {
                fail(reporter, format!("trigger {name_text}: transition tables require AFTER"));
                ok = false;
            }
            if a.table_old.is_some()
                && !(events.contains(&TriggerEvent::Update) || events.contains(&TriggerEvent::Delete))
            {
                fail(
                    reporter,
                    format!("trigger {name_text}: an old transition table needs UPDATE or DELETE")
                );
                ok = false;
            }
            if a.table_new.is_some()
                && !(events.contains(&TriggerEvent::Insert) || events.contains(&TriggerEvent::Update))
            {
                fail(
                    reporter,
                    format!("trigger {name_text}: a new transition table needs INSERT or UPDATE")
                );
                ok = false;
            }
        }
        if a.constraint && (called != TriggerCalled::After || scope != TriggerScope::Row) {
            fail(
                reporter,
                format!("trigger {name_text}: a constraint trigger must be AFTER ... FOR EACH ROW")
            );
            ok = false;
        }
        if (a.from.is_some() || a.from_schema.is_some()) && !a.constraint {
            fail(reporter, format!("trigger {name_text}: FROM is only for constraint triggers"));
            ok = false;
        }
        if a.from_schema.is_some() && a.from.is_none() {
            fail(reporter, format!("trigger {name_text}: from_schema without from"));
            ok = false;
        }
        if !ok {
            return false;
        }

        self.render(&name, &table, called, scope, fn_qname, reporter, span);
        self.name = Some(name);
        self.table = Some(table);
        true
    }

    #[allow(clippy::too_many_arguments)]
    fn render(
        &mut self,
        name: &Simple,
        table: &Qualified<Simple>,
        called: TriggerCalled,
        scope: TriggerScope,
        fn_qname: &Qualified<Simple>,
        reporter: &mut Reporter,
        span: Span
    ) {
        let a = &self.attrs;
        let mut s = String::from("CREATE ");
        if a.constraint {
            s.push_str("CONSTRAINT ");
        }
        s.push_str("TRIGGER ");
        s.push_str(&name.deparse());
        s.push_str("\n\t");
        s.push_str(called.sql());
        s.push(' ');
        let events: Vec<String> = a
            .events
            .0
            .iter()
            .map(|e| {
                if *e == TriggerEvent::Update && !a.columns.is_empty() {
                    let cols: Vec<String> = a
                        .columns
                        .iter()
                        .filter_map(|c| match Simple::from_sql(c) {
                            Ok(col) => Some(col.deparse()),
                            Err(err) => {
                                reporter.error_span(span, err);
                                None
                            }
                        })
                        .collect();
                    format!("UPDATE OF {}", cols.join(", "))
                } else {
                    e.sql().to_owned()
                }
            })
            .collect();
        s.push_str(&events.join(" OR "));
        s.push_str("\n\tON ");
        s.push_str(&table.deparse());
        if let Some(from) = &a.from {
            let from_name = Simple::from_sql(from)
                .map(|f| {
                    let qual = a
                        .from_schema
                        .as_deref()
                        .and_then(|q| Simple::from_sql(q).ok());
                    f.with_qualifier(qual).deparse()
                })
                .unwrap_or_else(|_| from.clone());
            s.push_str("\n\tFROM ");
            s.push_str(&from_name);
        }
        if a.table_old.is_some() || a.table_new.is_some() {
            s.push_str("\n\tREFERENCING");
            if let Some(old) = &a.table_old {
                s.push_str(" OLD TABLE AS ");
                s.push_str(old);
            }
            if let Some(new) = &a.table_new {
                s.push_str(" NEW TABLE AS ");
                s.push_str(new);
            }
        }
        s.push_str("\n\tFOR EACH ");
        s.push_str(scope.sql());
        if let Some(when) = &a.when {
            s.push_str("\n\tWHEN (");
            s.push_str(when);
            s.push(')');
        }
        s.push_str("\n\tEXECUTE PROCEDURE ");
        s.push_str(&fn_qname.deparse());
        s.push('(');
        let args: Vec<String> = a.arguments.iter().map(|arg| e_quote(arg)).collect();
        s.push_str(&args.join(", "));
        s.push(')');
        self.deploy = s;

        self.undeploy = format!("DROP TRIGGER {} ON {}", name.deparse(), table.deparse());
        self.comment_cmd = a.comment.as_ref().map(|c| {
            format!(
                "COMMENT ON TRIGGER {} ON {} IS {}",
                name.deparse(),
                table.deparse(),
                e_quote(c)
            )
        });
    }

    /// The pre-rendered CREATE TRIGGER command.
    #[must_use]
    pub fn deploy_string(&self) -> &str {
        &self.deploy
    }

    /// The pre-rendered DROP TRIGGER command.
    #[must_use]
    pub fn undeploy_string(&self) -> &str {
        &self.undeploy
    }

    /// The pre-rendered COMMENT ON TRIGGER, if any.
    #[must_use]
    pub fn comment_string(&self) -> Option<&str> {
        self.comment_cmd.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use darling::FromMeta;
    use syn::parse_quote;

    use super::*;
    use crate::attrs::FunctionAttrs;

    fn trigger_from(attr: syn::Attribute) -> (Trigger, Reporter, bool) {
        let parsed = FunctionAttrs::from_meta(&attr.meta).unwrap();
        let mut trigger = Trigger::new(parsed.triggers.into_iter().next().unwrap());
        let fn_qname = Qualified::from_sql("public.audit").unwrap();
        let mut reporter = Reporter::new();
        let ok = trigger.characterize(&fn_qname, &mut reporter, Span::call_site());
        (trigger, reporter, ok)
    }

    #[test]
    fn basic_trigger_renders() {
        let (t, r, ok) = trigger_from(parse_quote!(#[function(trigger(
            name = "trg",
            table = "accounts",
            schema = "bank",
            events(insert, update),
            called = "before",
            scope = "row",
            arguments = ["log"]
        ))]));
        assert!(ok, "{:?}", r.diagnostics());
        assert_eq!(
            t.deploy_string(),
            "CREATE TRIGGER trg\n\tBEFORE INSERT OR UPDATE\n\tON bank.accounts\n\t\
             FOR EACH ROW\n\tEXECUTE PROCEDURE public.audit(e'log')"
        );
        assert_eq!(t.undeploy_string(), "DROP TRIGGER trg ON bank.accounts");
    }

    #[test]
    fn update_of_columns() {
        let (t, _, ok) = trigger_from(parse_quote!(#[function(trigger(
            name = "trg",
            table = "t",
            events(update),
            columns = ["a", "b"],
            called = "after"
        ))]));
        assert!(ok);
        assert!(t.deploy_string().contains("AFTER UPDATE OF a, b"));
    }

    #[test]
    fn truncate_forbids_row_scope() {
        let (_, r, ok) = trigger_from(parse_quote!(#[function(trigger(
            name = "trg",
            table = "t",
            events(truncate),
            called = "after",
            scope = "row"
        ))]));
        assert!(!ok);
        assert!(r.has_errors());
    }

    #[test]
    fn instead_of_restrictions() {
        let (_, r, ok) = trigger_from(parse_quote!(#[function(trigger(
            name = "trg",
            table = "v",
            events(insert),
            called = "instead_of",
            when = "true"
        ))]));
        assert!(!ok);
        // WHEN and the defaulted statement scope are both reported
        assert!(r.diagnostics().len() >= 2);
    }

    #[test]
    fn transition_tables_require_after() {
        let (_, r, ok) = trigger_from(parse_quote!(#[function(trigger(
            name = "trg",
            table = "t",
            events(update),
            called = "before",
            table_old = "old_rows"
        ))]));
        assert!(!ok);
        assert!(r.has_errors());
    }

    #[test]
    fn transition_tables_render_referencing() {
        let (t, _, ok) = trigger_from(parse_quote!(#[function(trigger(
            name = "trg",
            table = "t",
            events(update),
            called = "after",
            table_old = "old_rows",
            table_new = "new_rows"
        ))]));
        assert!(ok);
        assert!(
            t.deploy_string()
                .contains("\n\tREFERENCING OLD TABLE AS old_rows NEW TABLE AS new_rows")
        );
    }

    #[test]
    fn constraint_trigger_with_from() {
        let (t, r, ok) = trigger_from(parse_quote!(#[function(trigger(
            name = "trg",
            table = "t",
            events(delete),
            called = "after",
            scope = "row",
            constraint,
            from = "parent"
        ))]));
        assert!(ok, "{:?}", r.diagnostics());
        assert!(t.deploy_string().starts_with("CREATE CONSTRAINT TRIGGER"));
        assert!(t.deploy_string().contains("\n\tFROM parent"));
    }

    #[test]
    fn from_without_constraint_rejected() {
        let (_, r, ok) = trigger_from(parse_quote!(#[function(trigger(
            name = "trg",
            table = "t",
            events(delete),
            called = "after",
            from = "parent"
        ))]));
        assert!(!ok);
        assert!(r.has_errors());
    }

    #[test]
    fn missing_name_rejected() {
        let (_, r, ok) = trigger_from(parse_quote!(#[function(trigger(
            table = "t",
            events(insert),
            called = "before"
        ))]));
        assert!(!ok);
        assert!(r.has_errors());
    }
}
