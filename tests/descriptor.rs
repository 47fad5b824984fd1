// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! End-to-end descriptor generation.
//!
//! Each test feeds annotated source through a [`Driver`] and asserts on
//! fragments and ordering of the produced descriptor.

use ddr_gen::{Driver, Options};
use syn::parse_quote;

fn plain_options() -> Options {
    Options {
        implementor: None,
        ..Options::default()
    }
}

fn descriptor(options: Options, file: syn::File) -> String {
    let mut driver = Driver::new(options);
    driver.add_source(&file);
    driver.finish().expect("descriptor generates").descriptor
}

/// Position of `needle` in `haystack`, with a readable panic.
fn pos(haystack: &str, needle: &str) -> usize {
    haystack
        .find(needle)
        .unwrap_or_else(|| panic!("expected {needle:?} in:\n{haystack}"))
}

#[test]
fn simple_function_fragments() {
    let text = descriptor(
        plain_options(),
        parse_quote! {
            #[function(name = "hello", schema = "public", effects = "immutable", trust = "sandboxed")]
            fn hello(s: String) -> String {
                s
            }
        }
    );
    assert!(text.contains(
        "CREATE OR REPLACE FUNCTION public.hello(\n\t\"s\" pg_catalog.varchar)\
         \n\tRETURNS pg_catalog.varchar\n\tLANGUAGE rust IMMUTABLE"
    ));
    assert!(text.contains("AS e'String=hello(String)'"));
    assert!(text.contains("DROP FUNCTION public.hello(\n\t\"s\" pg_catalog.varchar)"));
}

#[test]
fn explicit_provides_requires_order_both_groups() {
    let text = descriptor(
        plain_options(),
        parse_quote! {
            #[sql_action(
                install = ["SELECT b_install()"],
                remove = ["SELECT b_remove()"],
                requires = ["x"]
            )]
            fn b() {}

            #[sql_action(
                install = ["SELECT a_install()"],
                remove = ["SELECT a_remove()"],
                provides = ["x"]
            )]
            fn a() {}
        }
    );
    // install: provider first
    assert!(pos(&text, "SELECT a_install()") < pos(&text, "SELECT b_install()"));
    // remove: consumer first
    assert!(pos(&text, "SELECT b_remove()") < pos(&text, "SELECT a_remove()"));
}

#[test]
fn implementor_condition_wraps_and_precedes_in_both_groups() {
    let text = descriptor(
        plain_options(),
        parse_quote! {
            #[sql_action(
                implementor = "foo",
                provides = ["cond"],
                install = ["SELECT probe()"],
                remove = ["SELECT unprobe()"]
            )]
            fn a() {}

            #[sql_action(
                implementor = "foo",
                requires = ["cond"],
                install = ["SELECT use_it()"],
                remove = ["SELECT unuse_it()"]
            )]
            fn b() {}
        }
    );
    assert!(text.contains("BEGIN foo\nSELECT probe()\nEND foo;"));
    assert!(text.contains("BEGIN foo\nSELECT use_it()\nEND foo;"));
    assert!(pos(&text, "SELECT probe()") < pos(&text, "SELECT use_it()"));
    assert!(pos(&text, "SELECT unuse_it()") < pos(&text, "SELECT unprobe()"));
}

#[test]
fn base_udt_cycle_breaks_with_shell_and_cascade() {
    let text = descriptor(
        plain_options(),
        parse_quote! {
            #[base_udt(schema = "js", internal_length = 16, alignment = "double")]
            pub struct Complex {
                re: f64,
                im: f64,
            }

            impl Complex {
                fn input(text: &str) -> Complex {
                    unimplemented!()
                }
                fn output(&self) -> String {
                    unimplemented!()
                }
                fn receive(bytes: &[u8]) -> Complex {
                    unimplemented!()
                }
                fn send(&self) -> Vec<u8> {
                    unimplemented!()
                }
            }
        }
    );
    // the shell declaration precedes every I/O function, which precede
    // the full definition
    let shell = pos(&text, "CREATE TYPE js.complex;");
    let full = pos(&text, "CREATE TYPE js.complex (\n\t");
    for role in ["complex_in", "complex_out", "complex_recv", "complex_send"] {
        let f = pos(&text, &format!("CREATE OR REPLACE FUNCTION js.{role}("));
        assert!(shell < f, "shell must precede {role}");
        assert!(f < full, "{role} must precede the full definition");
    }
    // remove: one cascading drop, no function drops
    assert!(text.contains("DROP TYPE js.complex CASCADE"));
    assert!(!text.contains("DROP FUNCTION js.complex_in"));
    assert!(!text.contains("DROP FUNCTION js.complex_out"));
}

#[test]
fn cast_from_method_fragments() {
    let text = descriptor(
        plain_options(),
        parse_quote! {
            #[function(effects = "immutable")]
            #[cast(application = "implicit")]
            fn to_int(s: String) -> i32 {
                0
            }
        }
    );
    assert!(text.contains(
        "CREATE CAST (pg_catalog.varchar AS pg_catalog.int4)\
         \n\tWITH FUNCTION to_int(pg_catalog.varchar)\
         \n\tAS IMPLICIT"
    ));
    // the cast's function exists before the cast in install order
    assert!(
        pos(&text, "CREATE OR REPLACE FUNCTION to_int(") < pos(&text, "CREATE CAST")
    );
    // and is dropped after it in remove order
    assert!(pos(&text, "DROP CAST") < pos(&text, "DROP FUNCTION to_int("));
}

#[test]
fn synthetic_twin_operator() {
    let text = descriptor(
        plain_options(),
        parse_quote! {
            #[function(name = "intricate", effects = "immutable")]
            #[operator(name = "<%", commutator = "%>")]
            #[operator(name = "%>", synthetic = "TWIN")]
            fn intricate(a: i32, b: i64) -> bool {
                true
            }
        }
    );
    // both operators are created
    assert!(text.contains("CREATE OPERATOR <% (\n\t"));
    assert!(text.contains("CREATE OPERATOR %> (\n\t"));
    // the declared operator takes its operands from the fn
    assert!(text.contains(
        "CREATE OPERATOR <% (\n\tPROCEDURE = intricate,\
         \n\tLEFTARG = pg_catalog.int4,\n\tRIGHTARG = pg_catalog.int8,\
         \n\tCOMMUTATOR = %>"
    ));
    // the synthetic one is reversed and points back at the first
    assert!(text.contains(
        "CREATE OPERATOR %> (\n\tPROCEDURE = intricate,\
         \n\tLEFTARG = pg_catalog.int8,\n\tRIGHTARG = pg_catalog.int4,\
         \n\tCOMMUTATOR = <%"
    ));
    // the twin overload of the function is synthesized with reversed
    // parameters, and precedes the operator that calls it
    let twin = pos(
        &text,
        "CREATE OR REPLACE FUNCTION intricate(\n\t\"b\" pg_catalog.int8,\n\t\"a\" pg_catalog.int4)"
    );
    assert!(twin < pos(&text, "CREATE OPERATOR %>"));
    assert!(text.contains("AS e'intricate[commuted]'"));
}

#[test]
fn reproducible_mode_is_byte_identical_and_sorted() {
    let file = || -> syn::File {
        parse_quote! {
            #[sql_action(install = ["SELECT zebra()"])]
            fn z() {}

            #[sql_action(install = ["SELECT aardvark()"])]
            fn a() {}
        }
    };
    let options = || Options {
        reproducible: true,
        ..plain_options()
    };
    let first = descriptor(options(), file());
    let second = descriptor(options(), file());
    assert_eq!(first, second);
    assert!(pos(&first, "SELECT aardvark()") < pos(&first, "SELECT zebra()"));
}

#[test]
fn default_implementor_wraps_everything() {
    let text = descriptor(
        Options::default(),
        parse_quote! {
            #[function]
            fn plain() -> i32 {
                0
            }
        }
    );
    assert!(text.contains("BEGIN PostgreSQL\nCREATE OR REPLACE FUNCTION plain()"));
    assert!(text.contains("END PostgreSQL;"));
}

#[test]
fn trigger_function_emits_triggers_in_order() {
    let text = descriptor(
        plain_options(),
        parse_quote! {
            #[function(trigger(
                name = "audit_t",
                table = "accounts",
                events(insert, update),
                called = "after",
                scope = "row",
                arguments = ["log"]
            ))]
            fn audit(td: TriggerData) {}
        }
    );
    assert!(text.contains("\n\tRETURNS pg_catalog.trigger"));
    assert!(text.contains(
        "CREATE TRIGGER audit_t\n\tAFTER INSERT OR UPDATE\n\tON accounts\
         \n\tFOR EACH ROW\n\tEXECUTE PROCEDURE audit(e'log')"
    ));
    // function before its trigger on install; trigger dropped first on
    // remove
    assert!(
        pos(&text, "CREATE OR REPLACE FUNCTION audit(") < pos(&text, "CREATE TRIGGER audit_t")
    );
    assert!(pos(&text, "DROP TRIGGER audit_t ON accounts") < pos(&text, "DROP FUNCTION audit("));
}

#[test]
fn function_referencing_mapped_udt_is_ordered_after_it() {
    let text = descriptor(
        plain_options(),
        parse_quote! {
            #[function]
            fn noon() -> TimeOfDay {
                unimplemented!()
            }

            #[mapped_udt(structure = ["hours pg_catalog.int4", "minutes pg_catalog.int4"])]
            pub struct TimeOfDay {
                hours: i32,
                minutes: i32,
            }
        }
    );
    assert!(pos(&text, "CREATE TYPE time_of_day AS (") < pos(&text, "FUNCTION noon("));
    assert!(text.contains("\n\tRETURNS time_of_day"));
    assert!(pos(&text, "DROP FUNCTION noon(") < pos(&text, "DROP TYPE time_of_day"));
}

#[test]
fn doc_comment_becomes_comment_on() {
    let text = descriptor(
        plain_options(),
        parse_quote! {
            /// Greets someone politely. Extra detail that stays out.
            #[function]
            fn greet(name: String) -> String {
                name
            }
        }
    );
    assert!(text.contains("COMMENT ON FUNCTION greet(\n\t\"name\" pg_catalog.varchar) IS e'Greets someone politely.'"));
}

#[test]
fn descriptor_skeleton_is_exact() {
    let text = descriptor(
        plain_options(),
        parse_quote! {
            #[sql_action(install = ["SELECT 1"], remove = ["SELECT 2"])]
            fn only() {}
        }
    );
    assert_eq!(
        text,
        "SQLActions[]={\n\
         \"BEGIN INSTALL\n\
         SELECT 1;\n\
         END INSTALL\",\n\
         \"BEGIN REMOVE\n\
         SELECT 2;\n\
         END REMOVE\"\n}\n"
    );
}

#[test]
fn missing_explicit_requirement_fails() {
    let mut driver = Driver::new(plain_options());
    driver.add_source(&parse_quote! {
        #[sql_action(install = ["SELECT 1"], requires = ["never-provided"])]
        fn needy() {}
    });
    let err = driver.finish().unwrap_err();
    assert!(err.to_string().contains("never-provided"), "{err}");
}

#[test]
fn unlexable_action_fails() {
    let mut driver = Driver::new(plain_options());
    driver.add_source(&parse_quote! {
        #[sql_action(install = ["SELECT 'unterminated"])]
        fn bad() {}
    });
    assert!(driver.finish().is_err());
}

#[test]
fn aggregate_over_declared_function() {
    let text = descriptor(
        plain_options(),
        parse_quote! {
            #[function(name = "sum_step", effects = "immutable")]
            #[aggregate(name = "my_sum")]
            fn sum_step(state: i64, x: i64) -> i64 {
                state + x
            }
        }
    );
    assert!(text.contains("CREATE AGGREGATE my_sum(\"x\" pg_catalog.int8) (\n\t"));
    assert!(text.contains("STYPE = pg_catalog.int8"));
    assert!(text.contains("SFUNC = sum_step"));
    // accumulator function installs before the aggregate
    assert!(pos(&text, "FUNCTION sum_step(") < pos(&text, "CREATE AGGREGATE my_sum("));
    assert!(text.contains("DROP AGGREGATE my_sum(\"x\" pg_catalog.int8)"));
}

#[test]
fn two_rounds_accumulate() {
    let mut driver = Driver::new(plain_options());
    driver.add_source(&parse_quote! {
        #[function]
        fn first() -> i32 {
            1
        }
    });
    driver.add_source(&parse_quote! {
        #[function]
        fn second() -> i32 {
            2
        }
    });
    let text = driver.finish().expect("two rounds").descriptor;
    assert!(text.contains("FUNCTION first()"));
    assert!(text.contains("FUNCTION second()"));
}

#[test]
fn overloads_coexist_as_distinct_tags() {
    let text = descriptor(
        plain_options(),
        parse_quote! {
            #[function(name = "pick")]
            fn pick_int(x: i32) -> i32 {
                x
            }

            #[function(name = "pick")]
            fn pick_text(x: String) -> String {
                x
            }
        }
    );
    assert!(text.contains("FUNCTION pick(\n\t\"x\" pg_catalog.int4)"));
    assert!(text.contains("FUNCTION pick(\n\t\"x\" pg_catalog.varchar)"));
}
