// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Mapping Rust types to SQL types.
//!
//! The mapper holds an ordered list of (host type, SQL type) pairs. It is
//! seeded with the primitives, numeric widenings, strings, byte arrays,
//! the timestamp family, the record pseudo-type, and the bridge's
//! catch-all `PgValue` (SQL `"any"`). Declared UDTs add their own pairs
//! during the first processing round; after that round the list is
//! **frozen**: entries are reordered so that of any two related types the
//! more specific comes first, and lookups become a first-match linear
//! scan.
//!
//! Because a source-level scanner has no name resolution, assignability
//! is structural over canonical type text: numeric widening chains,
//! `str` into `String`, and everything into `PgValue`. A contravariant
//! lookup (function parameters) reverses both the scan order and the
//! assignability direction. The `"any"` mapping is suppressed for
//! covariant lookups — it is never a safe inferred *return* type.

use syn::Type;

use crate::{dbtype::DbType, emit::e_quote};

/// Per-parameter type override data from annotations.
///
/// Mirrors what a parameter-level type annotation can say: an explicit
/// SQL type, default values, and the `optional` marker that
/// short-circuits to `DEFAULT NULL`.
#[derive(Debug, Clone, Default)]
pub struct SqlTypeSpec {
    /// Explicit SQL type text, overriding mapping entirely.
    pub sql_type: Option<String>,
    /// Default values; one for scalars, several for a row default.
    pub defaults: Vec<String>,
    /// Emit `DEFAULT NULL` for this parameter.
    pub optional: bool,
}

/// One host-to-SQL mapping entry.
#[derive(Debug, Clone)]
struct Entry {
    host: String,
    ty: DbType,
}

/// The ordered host-type map.
#[derive(Debug)]
pub struct TypeMapper {
    entries: Vec<Entry>,
    frozen: bool,
}

impl Default for TypeMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeMapper {
    /// A mapper seeded with the built-in pairs.
    #[must_use]
    pub fn new() -> Self {
        let mut m = Self {
            entries: Vec::new(),
            frozen: false
        };
        let seed = |m: &mut Self, host: &str, ty: DbType| {
            m.entries.push(Entry {
                host: host.to_owned(),
                ty
            });
        };
        seed(&mut m, "i16", DbType::catalog("int2"));
        seed(&mut m, "i32", DbType::catalog("int4"));
        seed(&mut m, "i64", DbType::catalog("int8"));
        seed(&mut m, "f32", DbType::catalog("float4"));
        seed(&mut m, "f64", DbType::catalog("float8"));
        seed(&mut m, "bool", DbType::reserved("boolean"));
        seed(&mut m, "str", DbType::catalog("varchar"));
        seed(&mut m, "String", DbType::catalog("varchar"));
        seed(&mut m, "Vec<u8>", DbType::catalog("bytea"));
        seed(&mut m, "[u8]", DbType::catalog("bytea"));
        seed(&mut m, "()", DbType::catalog("void"));
        seed(&mut m, "SystemTime", DbType::catalog("timestamp"));
        seed(&mut m, "Timestamp", DbType::catalog("timestamp"));
        seed(&mut m, "Date", DbType::catalog("date"));
        seed(&mut m, "Time", DbType::catalog("time"));
        seed(&mut m, "Record", DbType::reserved("record"));
        seed(&mut m, "PgValue", DbType::reserved("\"any\""));
        m
    }

    /// Register a UDT's mapping from its Rust type name.
    ///
    /// # Errors
    ///
    /// Fails once the map is frozen (the first round has completed) or
    /// when the host name is already mapped.
    pub fn add_mapping(&mut self, host: &str, ty: DbType) -> Result<(), String> {
        if self.frozen {
            return Err(format!(
                "type mapping for {host} arrived after mappings were frozen"
            ));
        }
        if self.entries.iter().any(|e| e.host == host) {
            return Err(format!("{host} is already mapped to an SQL type"));
        }
        self.entries.push(Entry {
            host: host.to_owned(),
            ty
        });
        Ok(())
    }

    /// Freeze the map: order entries by specificity and switch to
    /// first-match lookups. Idempotent.
    pub fn freeze(&mut self) {
        if self.frozen {
            return;
        }
        self.frozen = true;
        let mut remaining = std::mem::take(&mut self.entries);
        let mut ordered = Vec::with_capacity(remaining.len());
        while !remaining.is_empty() {
            // next entry: every strict subtype already placed; ties break
            // on the canonical host name so the order is reproducible
            let mut best: Option<usize> = None;
            for (i, e) in remaining.iter().enumerate() {
                let blocked = remaining
                    .iter()
                    .enumerate()
                    .any(|(j, o)| j != i && strictly_assignable(&o.host, &e.host));
                if blocked {
                    continue;
                }
                best = match best {
                    Some(b) if remaining[b].host <= e.host => Some(b),
                    _ => Some(i)
                };
            }
            let pick = best.unwrap_or(0);
            ordered.push(remaining.remove(pick));
        }
        self.entries = ordered;
    }

    /// Whether [`freeze`](Self::freeze) has run.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Map a Rust type to its SQL type.
    ///
    /// An explicit annotation wins outright; otherwise the type is
    /// peeled (references, `Box`, `Option`), scanned against the frozen
    /// list, and finally array-detected. When `with_default` is set, the
    /// annotation's default data is rendered onto the result.
    ///
    /// # Errors
    ///
    /// Returns a message when no mapping exists.
    pub fn sql_type(
        &self,
        ty: &Type,
        spec: Option<&SqlTypeSpec>,
        contravariant: bool,
        with_default: bool
    ) -> Result<DbType, String> {
        let base = match spec.and_then(|s| s.sql_type.as_deref()) {
            Some(text) => DbType::from_annotation(text),
            None => self.resolve(ty, contravariant)?
        };
        if !with_default {
            return Ok(base);
        }
        let Some(spec) = spec else {
            return Ok(base);
        };
        if spec.optional {
            return Ok(base.with_default("NULL"));
        }
        if spec.defaults.is_empty() {
            return Ok(base);
        }
        let rendered = if spec.defaults.len() > 1 || base == DbType::reserved("record") {
            let parts: Vec<String> = spec.defaults.iter().map(|d| e_quote(d)).collect();
            format!("ROW({})", parts.join(", "))
        } else {
            format!("{}::{}", e_quote(&spec.defaults[0]), base.to_sql(false))
        };
        Ok(base.with_default(rendered))
    }

    fn resolve(&self, ty: &Type, contravariant: bool) -> Result<DbType, String> {
        let peeled = peel(ty);
        let peeled = option_inner(peeled).map_or(peeled, peel);
        let canon = canonical_type(peeled);
        if let Some(found) = self.scan(&canon, contravariant) {
            return Ok(found);
        }
        if let Some(elem) = array_element(peeled) {
            let elem_ty = self.resolve(elem, contravariant)?;
            return Ok(elem_ty.as_array());
        }
        Err(format!("no SQL type mapping for Rust type {canon}"))
    }

    fn scan(&self, canon: &str, contravariant: bool) -> Option<DbType> {
        if contravariant {
            self.entries
                .iter()
                .rev()
                .find(|e| assignable(&e.host, canon))
                .map(|e| e.ty.clone())
        } else {
            self.entries
                .iter()
                .filter(|e| e.host != "PgValue")
                .find(|e| assignable(canon, &e.host))
                .map(|e| e.ty.clone())
        }
    }
}

/// Structural assignability: is `sub` usable where `sup` is expected?
fn assignable(sub: &str, sup: &str) -> bool {
    if sub == sup || sup == "PgValue" {
        return true;
    }
    if sub == "str" && sup == "String" {
        return true;
    }
    const INTS: [&str; 4] = ["i8", "i16", "i32", "i64"];
    const FLOATS: [&str; 2] = ["f32", "f64"];
    let chain_widens = |chain: &[&str]| {
        let a = chain.iter().position(|t| *t == sub);
        let b = chain.iter().position(|t| *t == sup);
        matches!((a, b), (Some(a), Some(b)) if a < b)
    };
    chain_widens(&INTS) || chain_widens(&FLOATS)
}

/// Assignable one way but not the other.
fn strictly_assignable(sub: &str, sup: &str) -> bool {
    assignable(sub, sup) && !assignable(sup, sub)
}

/// Canonical textual form of a type for map lookups.
///
/// References, parens, and groups are transparent; paths keep only their
/// terminal segment (a source scanner has no name resolution); generic
/// arguments recurse.
#[must_use]
pub fn canonical_type(ty: &Type) -> String {
    match ty {
        Type::Reference(r) => canonical_type(&r.elem),
        Type::Paren(p) => canonical_type(&p.elem),
        Type::Group(g) => canonical_type(&g.elem),
        Type::Slice(s) => format!("[{}]", canonical_type(&s.elem)),
        Type::Array(a) => format!("[{}]", canonical_type(&a.elem)),
        Type::Tuple(t) if t.elems.is_empty() => "()".to_owned(),
        Type::Tuple(t) => {
            let elems: Vec<String> = t.elems.iter().map(canonical_type).collect();
            format!("({})", elems.join(","))
        }
        Type::Path(p) => {
            let Some(seg) = p.path.segments.last() else {
                return "<unnameable>".to_owned();
            };
            let mut out = seg.ident.to_string();
            if let syn::PathArguments::AngleBracketed(ab) = &seg.arguments {
                let args: Vec<String> = ab
                    .args
                    .iter()
                    .filter_map(|a| match a {
                        syn::GenericArgument::Type(t) => Some(canonical_type(t)),
                        _ => None
                    })
                    .collect();
                if !args.is_empty() {
                    out.push('<');
                    out.push_str(&args.join(","));
                    out.push('>');
                }
            }
            out
        }
        other => {
            // fall back to the token spelling, whitespace stripped
            let mut s = quote::ToTokens::to_token_stream(other).to_string();
            s.retain(|c| !c.is_whitespace());
            s
        }
    }
}

/// Strip references, parens, groups, and `Box` wrappers.
fn peel(ty: &Type) -> &Type {
    match ty {
        Type::Reference(r) => peel(&r.elem),
        Type::Paren(p) => peel(&p.elem),
        Type::Group(g) => peel(&g.elem),
        Type::Path(p) => {
            if let Some(inner) = single_generic(p, "Box") {
                peel(inner)
            } else {
                ty
            }
        }
        _ => ty
    }
}

/// The `T` of `Option<T>`, if `ty` is an `Option`.
fn option_inner(ty: &Type) -> Option<&Type> {
    match ty {
        Type::Path(p) => single_generic(p, "Option"),
        _ => None
    }
}

/// The element type of an array-shaped Rust type.
fn array_element(ty: &Type) -> Option<&Type> {
    match ty {
        Type::Slice(s) => Some(&s.elem),
        Type::Array(a) => Some(&a.elem),
        Type::Path(p) => single_generic(p, "Vec"),
        _ => None
    }
}

/// The single type argument of `head<T>`, if `ty` is exactly that shape.
fn single_generic<'t>(p: &'t syn::TypePath, head: &str) -> Option<&'t Type> {
    let seg = p.path.segments.last()?;
    if seg.ident != head {
        return None;
    }
    let syn::PathArguments::AngleBracketed(ab) = &seg.arguments else {
        return None;
    };
    let mut types = ab.args.iter().filter_map(|a| match a {
        syn::GenericArgument::Type(t) => Some(t),
        _ => None
    });
    let first = types.next()?;
    types.next().is_none().then_some(first)
}

#[cfg(test)]
mod tests {
    use syn::parse_quote;

    use super::*;

    fn frozen() -> TypeMapper {
        let mut m = TypeMapper::new();
        m.freeze();
        m
    }

    #[test]
    fn primitives_map() {
        let m = frozen();
        let ty: Type = parse_quote!(i32);
        assert_eq!(
            m.sql_type(&ty, None, false, false).unwrap().to_sql(false),
            "pg_catalog.int4"
        );
        let ty: Type = parse_quote!(bool);
        assert_eq!(
            m.sql_type(&ty, None, false, false).unwrap().to_sql(false),
            "boolean"
        );
    }

    #[test]
    fn string_maps_to_varchar() {
        let m = frozen();
        let cases: [Type; 2] = [parse_quote!(String), parse_quote!(&str)];
        for ty in cases {
            assert_eq!(
                m.sql_type(&ty, None, false, false).unwrap().to_sql(false),
                "pg_catalog.varchar"
            );
        }
    }

    #[test]
    fn byte_vec_is_bytea_not_array() {
        let m = frozen();
        let ty: Type = parse_quote!(Vec<u8>);
        assert_eq!(
            m.sql_type(&ty, None, false, false).unwrap().to_sql(false),
            "pg_catalog.bytea"
        );
    }

    #[test]
    fn other_vec_is_array() {
        let m = frozen();
        let ty: Type = parse_quote!(Vec<i32>);
        assert_eq!(
            m.sql_type(&ty, None, false, false).unwrap().to_sql(false),
            "pg_catalog.int4[]"
        );
    }

    #[test]
    fn option_is_transparent() {
        let m = frozen();
        let ty: Type = parse_quote!(Option<i64>);
        assert_eq!(
            m.sql_type(&ty, None, false, false).unwrap().to_sql(false),
            "pg_catalog.int8"
        );
    }

    #[test]
    fn box_and_reference_peel() {
        let m = frozen();
        let ty: Type = parse_quote!(&Box<String>);
        assert_eq!(
            m.sql_type(&ty, None, false, false).unwrap().to_sql(false),
            "pg_catalog.varchar"
        );
    }

    #[test]
    fn any_suppressed_covariantly() {
        let m = frozen();
        let ty: Type = parse_quote!(PgValue);
        assert!(m.sql_type(&ty, None, false, false).is_err());
        assert_eq!(
            m.sql_type(&ty, None, true, false).unwrap().to_sql(false),
            "\"any\""
        );
    }

    #[test]
    fn contravariant_prefers_widest_exact() {
        let m = frozen();
        let ty: Type = parse_quote!(i64);
        assert_eq!(
            m.sql_type(&ty, None, true, false).unwrap().to_sql(false),
            "pg_catalog.int8"
        );
    }

    #[test]
    fn covariant_prefers_most_specific() {
        let m = frozen();
        let ty: Type = parse_quote!(i16);
        assert_eq!(
            m.sql_type(&ty, None, false, false).unwrap().to_sql(false),
            "pg_catalog.int2"
        );
    }

    #[test]
    fn explicit_annotation_wins() {
        let m = frozen();
        let ty: Type = parse_quote!(String);
        let spec = SqlTypeSpec {
            sql_type: Some("pg_catalog.text".into()),
            ..SqlTypeSpec::default()
        };
        assert_eq!(
            m.sql_type(&ty, Some(&spec), false, false)
                .unwrap()
                .to_sql(false),
            "pg_catalog.text"
        );
    }

    #[test]
    fn optional_short_circuits_to_default_null() {
        let m = frozen();
        let ty: Type = parse_quote!(String);
        let spec = SqlTypeSpec {
            optional: true,
            ..SqlTypeSpec::default()
        };
        assert_eq!(
            m.sql_type(&ty, Some(&spec), true, true).unwrap().to_sql(true),
            "pg_catalog.varchar DEFAULT NULL"
        );
    }

    #[test]
    fn scalar_default_is_escaped_and_cast() {
        let m = frozen();
        let ty: Type = parse_quote!(String);
        let spec = SqlTypeSpec {
            defaults: vec!["it's".into()],
            ..SqlTypeSpec::default()
        };
        assert_eq!(
            m.sql_type(&ty, Some(&spec), true, true).unwrap().to_sql(true),
            "pg_catalog.varchar DEFAULT e'it''s'::pg_catalog.varchar"
        );
    }

    #[test]
    fn multi_value_default_renders_row() {
        let m = frozen();
        let ty: Type = parse_quote!(Record);
        let spec = SqlTypeSpec {
            defaults: vec!["1".into(), "2".into()],
            ..SqlTypeSpec::default()
        };
        assert_eq!(
            m.sql_type(&ty, Some(&spec), true, true).unwrap().to_sql(true),
            "record DEFAULT ROW(e'1', e'2')"
        );
    }

    #[test]
    fn udt_mapping_registers_until_frozen() {
        let mut m = TypeMapper::new();
        m.add_mapping("Complex", DbType::from_annotation("javatest.complex"))
            .unwrap();
        m.freeze();
        assert!(m.add_mapping("Late", DbType::reserved("integer")).is_err());
        let ty: Type = parse_quote!(Complex);
        assert_eq!(
            m.sql_type(&ty, None, false, false).unwrap().to_sql(false),
            "javatest.complex"
        );
    }

    #[test]
    fn duplicate_mapping_rejected() {
        let mut m = TypeMapper::new();
        assert!(m.add_mapping("String", DbType::reserved("text")).is_err());
    }

    #[test]
    fn freeze_orders_subtypes_first() {
        let mut m = TypeMapper::new();
        m.freeze();
        let pos = |host: &str| m.entries.iter().position(|e| e.host == host).unwrap();
        assert!(pos("i16") < pos("i32"));
        assert!(pos("i32") < pos("i64"));
        assert!(pos("f32") < pos("f64"));
        assert!(pos("str") < pos("String"));
        assert_eq!(pos("PgValue"), m.entries.len() - 1);
    }

    #[test]
    fn canonical_forms() {
        let cases: [(Type, &str); 5] = [
            (parse_quote!(std::string::String), "String"),
            (parse_quote!(&[u8]), "[u8]"),
            (parse_quote!(Vec<Vec<i32>>), "Vec<Vec<i32>>"),
            (parse_quote!(()), "()"),
            (parse_quote!((i32, bool)), "(i32,bool)")
        ];
        for (ty, expect) in cases {
            assert_eq!(canonical_type(&ty), expect);
        }
    }

    #[test]
    fn nested_vec_maps_to_nested_array() {
        let m = frozen();
        let ty: Type = parse_quote!(Vec<Vec<i32>>);
        assert_eq!(
            m.sql_type(&ty, None, false, false).unwrap().to_sql(false),
            "pg_catalog.int4[][]"
        );
    }
}
