// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Operator derivation paths.
//!
//! Before operators characterize, all the operators annotating one fn
//! are walked as a group: declared operators seed a work queue, and
//! every commutator/negator reference from a reached operator to a
//! synthetic one records a [`DerivationPath`] on the target. A path
//! carries the transforms accumulated from its base — the symmetric
//! difference, so deriving "commute, then commute back" correctly
//! cancels to nothing.
//!
//! Paths are only *recorded* here. Choosing among them (fewest
//! transforms, deterministic tie-break) happens when the synthetic
//! operator characterizes, because only then are the base's operand
//! types known.

use std::collections::VecDeque;

use crate::snippet::operator::{DerivationPath, OpRef, Operator, TransformSet};

/// Walk one element's operator group, filling in derivation paths on
/// its synthetic members.
pub fn pre_synthesize(group: &mut [&mut Operator]) {
    let mut reached = vec![false; group.len()];
    let mut queue: VecDeque<(usize, crate::ident::Qualified<crate::ident::Operator>, TransformSet)> =
        VecDeque::new();

    for (i, op) in group.iter().enumerate() {
        if op.synthetic.is_none() {
            reached[i] = true;
            queue.push_back((i, op.qname.clone(), TransformSet::default()));
        }
    }

    while let Some((i, base, from_base)) = queue.pop_front() {
        let proximate = group[i].qname.clone();
        let refs = [
            (TransformSet::commutation(), group[i].commutator_ref.clone()),
            (TransformSet::negation(), group[i].negator_ref.clone())
        ];
        for (transform, opref) in refs {
            let Some(OpRef::Named(target)) = opref else {
                continue;
            };
            for j in 0..group.len() {
                if j == i || group[j].synthetic.is_none() || group[j].qname != target {
                    continue;
                }
                let from_base_j = if base == proximate {
                    transform
                } else {
                    from_base.xor(transform)
                };
                group[j].paths.push(DerivationPath {
                    base: base.clone(),
                    proximate: proximate.clone(),
                    from_base: from_base_j,
                    from_proximate: transform
                });
                if !reached[j] {
                    reached[j] = true;
                    queue.push_back((j, base.clone(), from_base_j));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use darling::FromMeta;
    use proc_macro2::Span;
    use syn::parse_quote;

    use super::*;
    use crate::{attrs::OperatorAttrs, report::Reporter};

    fn operator(attr: syn::Attribute) -> Operator {
        let parsed = OperatorAttrs::from_meta(&attr.meta).unwrap();
        let mut reporter = Reporter::new();
        let op = Operator::new(
            parsed,
            "cmp".to_owned(),
            None,
            Span::call_site(),
            &mut reporter
        );
        assert!(!reporter.has_errors(), "{:?}", reporter.diagnostics());
        op.unwrap()
    }

    fn synthesize(ops: Vec<Operator>) -> Vec<Operator> {
        let mut ops = ops;
        {
            let mut group: Vec<&mut Operator> = ops.iter_mut().collect();
            pre_synthesize(&mut group);
        }
        ops
    }

    #[test]
    fn twin_reached_through_commutator() {
        let ops = synthesize(vec![
            operator(parse_quote!(#[operator(name = "<%", commutator = "%>")])),
            operator(parse_quote!(#[operator(name = "%>", synthetic = "TWIN")])),
        ]);
        assert_eq!(ops[1].paths.len(), 1);
        let path = &ops[1].paths[0];
        assert_eq!(path.base.deparse_header(), "<%");
        assert_eq!(path.proximate.deparse_header(), "<%");
        assert!(path.from_base.commute);
        assert!(!path.from_base.negate);
    }

    #[test]
    fn chain_accumulates_symmetric_difference() {
        // declared <, twin > (commute), negated twin <= (commute+negate)
        let ops = synthesize(vec![
            operator(parse_quote!(#[operator(name = "<", commutator = ">")])),
            operator(
                parse_quote!(#[operator(name = ">", synthetic = "TWIN", negator = "<=")])
            ),
            operator(parse_quote!(#[operator(name = "<=", synthetic = "le_fn")])),
        ]);
        assert_eq!(ops[2].paths.len(), 1);
        let path = &ops[2].paths[0];
        assert_eq!(path.base.deparse_header(), "<");
        assert_eq!(path.proximate.deparse_header(), ">");
        assert!(path.from_base.commute && path.from_base.negate);
        assert!(path.from_proximate.negate && !path.from_proximate.commute);
    }

    #[test]
    fn double_transform_cancels() {
        // < commutes to twin >, which commutes back to synthetic <2:
        // net transforms from base cancel out
        let ops = synthesize(vec![
            operator(parse_quote!(#[operator(name = "<", commutator = ">")])),
            operator(
                parse_quote!(#[operator(name = ">", synthetic = "TWIN", commutator = "<<")])
            ),
            operator(parse_quote!(#[operator(name = "<<", synthetic = "lt_alias")])),
        ]);
        let path = &ops[2].paths[0];
        assert_eq!(path.from_base.count(), 0);
    }

    #[test]
    fn unreached_synthetic_gets_no_paths() {
        let ops = synthesize(vec![
            operator(parse_quote!(#[operator(name = "<%")])),
            operator(parse_quote!(#[operator(name = "%>", synthetic = "TWIN")])),
        ]);
        assert!(ops[1].paths.is_empty());
    }

    #[test]
    fn declared_operators_are_not_targets() {
        // a commutator reference to another declared operator records
        // nothing; only synthetic operators accumulate paths
        let ops = synthesize(vec![
            operator(parse_quote!(#[operator(name = "<%", commutator = "%>")])),
            operator(parse_quote!(#[operator(name = "%>", commutator = "<%")])),
        ]);
        assert!(ops[0].paths.is_empty());
        assert!(ops[1].paths.is_empty());
    }

    #[test]
    fn multiple_paths_accumulate() {
        // two declared operators both name the same synthetic negator
        let ops = synthesize(vec![
            operator(parse_quote!(#[operator(name = "<", negator = ">=")])),
            operator(parse_quote!(#[operator(name = "<<", negator = ">=")])),
            operator(parse_quote!(#[operator(name = ">=", synthetic = "ge_fn")])),
        ]);
        assert_eq!(ops[2].paths.len(), 2);
    }
}
