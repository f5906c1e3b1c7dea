//! Determinism & parity between the two execution engines.
//!
//! Two harnesses:
//! 1. **Determinism**: render the same template with the same variables
//!    repeatedly, with each engine; every run yields identical output. The
//!    UL4ON dump of a template is identical across runs as well.
//! 2. **Tree walker ↔ opcode parity**: run every template of a corpus through
//!    both engines and compare output fragments, or the full error message
//!    (including the location of the failing tag) when rendering fails.

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use proptest::strategy::Strategy as _;
use std::sync::Arc;
use ul4::ast::{BinaryOp, UnaryOp, VarOp};
use ul4::build::*;
use ul4::{dumps_template, loads_template, Color, Date, Strategy, Template, Value, Vars};

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

/// Output fragments, or the error message prefixed with `!`.
fn outcome(t: &Template, vars: &Vars, strategy: Strategy) -> Vec<String> {
    match ul4::render(t, vars.clone(), strategy) {
        Ok(fragments) => fragments,
        Err(err) => vec![format!("!{err}")],
    }
}

fn assert_parity(name: &str, t: &Template, vars: &Vars) -> Vec<String> {
    let walked = outcome(t, vars, Strategy::TreeWalk);
    let compiled = outcome(t, vars, Strategy::Opcodes);
    assert_eq!(walked, compiled, "engines disagree on {name}");
    walked
}

fn sample_vars() -> Vars {
    let mut vars = Vars::new();
    vars.insert("n".into(), Value::Int(7));
    vars.insert("x".into(), Value::Float(2.5));
    vars.insert("s".into(), Value::from("Gurkenglas"));
    vars.insert(
        "xs".into(),
        Value::List(vec![3.into(), 1.into(), 2.into()]),
    );
    vars.insert("d".into(), Value::dict([("a", 1), ("b", 2)]));
    vars.insert("c".into(), Value::Color(Color::new(0x12, 0x34, 0x56, 0xff)));
    vars.insert(
        "when".into(),
        Value::Date(Date::new(2024, 2, 29).unwrap_or_else(|e| panic!("{e}"))),
    );
    vars.insert("nothing".into(), Value::None);
    vars
}

// ══════════════════════════════════════════════════════════════════════════════
// Corpus
// ══════════════════════════════════════════════════════════════════════════════

fn corpus() -> Vec<(&'static str, Arc<Template>)> {
    vec![
        (
            "text_and_print",
            template(Some("t"), vec![text("n="), print(var("n")), text(" s="), printx(var("s"))]),
        ),
        (
            "arithmetic",
            template(
                Some("t"),
                vec![
                    print(binary(BinaryOp::Add, var("n"), var("x"))),
                    text(" "),
                    print(binary(BinaryOp::FloorDiv, var("n"), constant(-2))),
                    text(" "),
                    print(binary(BinaryOp::TrueDiv, var("n"), constant(2))),
                    text(" "),
                    print(binary(BinaryOp::Mul, constant(3), constant("ab"))),
                    text(" "),
                    print(unary(UnaryOp::Neg, var("x"))),
                    text(" "),
                    print(unary(UnaryOp::Not, var("xs"))),
                ],
            ),
        ),
        (
            "comparisons",
            template(
                Some("t"),
                vec![
                    print(binary(BinaryOp::Lt, var("n"), var("x"))),
                    print(binary(BinaryOp::Eq, constant(1), constant(1.0))),
                    print(binary(BinaryOp::Contains, constant("a"), var("d"))),
                    print(binary(BinaryOp::NotContains, constant(5), var("xs"))),
                    print(binary(BinaryOp::Ge, var("s"), constant("Gurke"))),
                ],
            ),
        ),
        (
            "nested_loops_with_control",
            template(
                Some("t"),
                vec![for_normal(
                    "i",
                    callfunc("range", vec![constant(5)]),
                    vec![
                        conditional(vec![(
                            Some(binary(BinaryOp::Eq, var("i"), constant(1))),
                            vec![continue_()],
                        )]),
                        for_normal(
                            "j",
                            var("xs"),
                            vec![
                                conditional(vec![(
                                    Some(binary(BinaryOp::Gt, var("j"), var("i"))),
                                    vec![break_()],
                                )]),
                                print(var("j")),
                            ],
                        ),
                        text(";"),
                    ],
                )],
            ),
        ),
        (
            "lazy_iterators",
            template(
                Some("t"),
                vec![
                    for_unpack(
                        &["i", "ch"],
                        callfunc("enumerate", vec![var("s")]),
                        vec![conditional(vec![(
                            Some(binary(BinaryOp::Lt, var("i"), constant(3))),
                            vec![print(var("i")), print(var("ch"))],
                        )])],
                    ),
                    text("|"),
                    for_unpack(
                        &["a", "b"],
                        callfunc("zip", vec![var("xs"), var("s")]),
                        vec![print(var("a")), print(var("b"))],
                    ),
                    text("|"),
                    for_unpack(
                        &["first", "last", "v"],
                        callfunc("isfirstlast", vec![var("xs")]),
                        vec![print(var("first")), print(var("last")), print(var("v"))],
                    ),
                    text("|"),
                    for_normal("v", callfunc("reversed", vec![var("xs")]), vec![print(var("v"))]),
                    text("|"),
                    for_normal(
                        "v",
                        callfunc("range", vec![constant(10), constant(0), constant(-3)]),
                        vec![print(var("v"))],
                    ),
                ],
            ),
        ),
        (
            "functions_and_methods",
            template(
                Some("t"),
                vec![
                    print(callfunc("sorted", vec![var("xs")])),
                    text(" "),
                    print(callfunc("len", vec![var("s")])),
                    text(" "),
                    print(callfunc("repr", vec![var("d")])),
                    text(" "),
                    print(callfunc("json", vec![var("d")])),
                    text(" "),
                    print(callfunc("hex", vec![constant(-255)])),
                    text(" "),
                    print(callmeth(var("s"), "upper", vec![])),
                    text(" "),
                    print(callmeth(constant(","), "join", vec![list(vec![constant("a"), constant("b")])])),
                    text(" "),
                    print(callmeth(var("when"), "isoformat", vec![])),
                    text(" "),
                    print(callmeth(var("when"), "format", vec![constant("%d.%m.%Y")])),
                    text(" "),
                    print(callmeth(var("c"), "lum", vec![])),
                    text(" "),
                    print(var("c")),
                    text(" "),
                    print(callfunc("type", vec![var("nothing")])),
                ],
            ),
        ),
        (
            "slices_and_indexing",
            template(
                Some("t"),
                vec![
                    print(getslice(var("s"), Some(constant(-5)), None)),
                    print(getslice(var("xs"), Some(constant(1)), Some(constant(100)))),
                    print(binary(BinaryOp::GetItem, var("s"), constant(-1))),
                    print(getattr(var("d"), "b")),
                    print(binary(BinaryOp::GetItem, var("c"), constant(0))),
                ],
            ),
        ),
        (
            "variables",
            template(
                Some("t"),
                vec![
                    store("acc", constant("")),
                    for_normal("v", var("xs"), vec![changevar(VarOp::Add, "acc", callfunc("str", vec![var("v")]))]),
                    print(var("acc")),
                    store("k", constant(100)),
                    changevar(VarOp::TrueDiv, "k", constant(8)),
                    print(var("k")),
                    delvar("k"),
                    print(callfunc("get", vec![constant("k"), constant("gone")])),
                ],
            ),
        ),
        (
            "subtemplates",
            template(
                Some("t"),
                vec![
                    def(
                        "item",
                        vec![
                            text("("),
                            print(var("v")),
                            conditional(vec![(Some(var("last")), vec![text("!")])]),
                            text(")"),
                        ],
                    ),
                    for_unpack(
                        &["last", "v"],
                        callfunc("islast", vec![var("xs")]),
                        vec![render(var("item"), vec![("v", var("v")), ("last", var("last"))])],
                    ),
                    print(callmethkw(var("item"), "render", vec![("v", constant(0)), ("last", constant(false))])),
                ],
            ),
        ),
        (
            "short_circuit",
            template(
                Some("t"),
                vec![
                    print(binary(BinaryOp::And, var("nothing"), var("undefined"))),
                    print(binary(BinaryOp::Or, var("n"), var("undefined"))),
                    print(binary(BinaryOp::And, var("n"), var("s"))),
                ],
            ),
        ),
        (
            "deep_expression",
            template(
                Some("t"),
                vec![print((0..10).fold(constant(1), |inner, _| {
                    binary(BinaryOp::Add, constant(1), inner)
                }))],
            ),
        ),
        (
            "statement_in_untaken_branch",
            template(
                Some("t"),
                vec![
                    conditional(vec![(
                        Some(constant(false)),
                        vec![print(binary(BinaryOp::Add, delvar("n"), constant(1)))],
                    )]),
                    text("ok"),
                ],
            ),
        ),
        // Failures: both engines must report the same message and location.
        ("missing_variable", template(Some("t"), vec![text("a"), print(var("undefined"))])),
        (
            "division_by_zero",
            template(Some("t"), vec![print(binary(BinaryOp::FloorDiv, var("n"), constant(0)))]),
        ),
        (
            "integer_overflow",
            template(Some("t"), vec![print(binary(BinaryOp::Mul, constant(i64::MAX), constant(2)))]),
        ),
        (
            "negative_repeat",
            template(Some("t"), vec![print(binary(BinaryOp::Mul, constant(-1), var("xs")))]),
        ),
        (
            "none_arithmetic",
            template(Some("t"), vec![print(binary(BinaryOp::Add, var("nothing"), constant(1)))]),
        ),
        ("unknown_function", template(Some("t"), vec![print(callfunc("gurk", vec![]))])),
        ("unknown_method", template(Some("t"), vec![print(callmeth(var("s"), "gurk", vec![]))])),
        ("bad_arguments", template(Some("t"), vec![print(callfunc("len", vec![]))])),
        (
            "index_out_of_range",
            template(Some("t"), vec![print(binary(BinaryOp::GetItem, var("xs"), constant(-4)))]),
        ),
        (
            "error_inside_loop_and_def",
            template(
                Some("t"),
                vec![
                    def("inner", vec![print(binary(BinaryOp::TrueDiv, constant(1), var("v")))]),
                    for_normal(
                        "v",
                        list(vec![constant(2), constant(0)]),
                        vec![render(var("inner"), vec![("v", var("v"))])],
                    ),
                ],
            ),
        ),
        (
            "unpack_mismatch",
            template(
                Some("t"),
                vec![for_unpack(&["a", "b"], var("xs"), vec![print(var("a"))])],
            ),
        ),
        (
            "statement_in_expression",
            template(
                Some("t"),
                vec![print(binary(BinaryOp::Add, delvar("n"), constant(1)))],
            ),
        ),
        (
            "self_render",
            template(
                Some("t"),
                vec![
                    def("r", vec![render(var("r"), vec![("r", var("r"))])]),
                    render(var("r"), vec![("r", var("r"))]),
                ],
            ),
        ),
        (
            "huge_range",
            template(Some("t"), vec![print(callfunc("range", vec![constant(1_000_000_000_000i64)]))]),
        ),
        (
            "huge_repeat",
            template(
                Some("t"),
                vec![print(binary(BinaryOp::Mul, constant("ab"), constant(1i64 << 40)))],
            ),
        ),
    ]
}

// ══════════════════════════════════════════════════════════════════════════════
// Parity
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_corpus_parity() {
    let vars = sample_vars();
    for (name, t) in corpus() {
        assert_parity(name, &t, &vars);
    }
}

#[test]
fn test_corpus_parity_after_ul4on_round_trip() {
    let vars = sample_vars();
    for (name, t) in corpus() {
        let stream = dumps_template(&t).unwrap_or_else(|e| panic!("{name}: {e}"));
        let loaded = loads_template(&stream).unwrap_or_else(|e| panic!("{name}: {e}"));
        assert_eq!(
            assert_parity(name, &loaded, &vars),
            outcome(&t, &vars, Strategy::TreeWalk),
            "{name} changed after a UL4ON round-trip"
        );
    }
}

#[test]
fn test_failures_render_nothing_but_the_error() {
    let vars = sample_vars();
    let failing = [
        "missing_variable",
        "division_by_zero",
        "integer_overflow",
        "negative_repeat",
        "none_arithmetic",
        "unknown_function",
        "unknown_method",
        "bad_arguments",
        "index_out_of_range",
        "error_inside_loop_and_def",
        "unpack_mismatch",
        "statement_in_expression",
        "self_render",
        "huge_range",
        "huge_repeat",
    ];
    for (name, t) in corpus() {
        let out = assert_parity(name, &t, &vars);
        let failed = out.len() == 1 && out[0].starts_with('!');
        assert_eq!(failed, failing.contains(&name), "{name}: {out:?}");
    }
}

#[test]
fn test_known_outputs() {
    let vars = sample_vars();
    let outputs: Vec<(&str, String)> = corpus()
        .into_iter()
        .map(|(name, t)| (name, assert_parity(name, &t, &vars).concat()))
        .collect();
    let get = |wanted: &str| {
        outputs
            .iter()
            .find(|(name, _)| *name == wanted)
            .map(|(_, out)| out.clone())
            .unwrap_or_default()
    };
    assert_eq!(get("nested_loops_with_control"), ";;312;312;");
    assert_eq!(get("short_circuit"), "7Gurkenglas");
    assert_eq!(get("subtemplates"), "(3)(1)(2!)(0)");
    assert_eq!(get("deep_expression"), "11");
    assert_eq!(get("statement_in_untaken_branch"), "ok");
    assert!(get("self_render").starts_with("!RecursionError: maximum render depth of 32"));
    assert!(get("huge_range").starts_with("!ValueError: sequence too long"));
    assert!(get("huge_repeat").starts_with("!ValueError: integer overflow"));
    assert_eq!(
        get("division_by_zero"),
        "!ValueError: division by zero in '<?print n // 0?>' at 1 (line 1, col 1)"
    );
}

// ══════════════════════════════════════════════════════════════════════════════
// Determinism
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_render_is_deterministic() {
    let vars = sample_vars();
    for (name, t) in corpus() {
        for strategy in Strategy::ALL {
            let first = outcome(&t, &vars, strategy);
            for _ in 0..100 {
                assert_eq!(outcome(&t, &vars, strategy), first, "{name} ({strategy})");
            }
        }
    }
}

#[test]
fn test_dump_is_deterministic() {
    for (name, t) in corpus() {
        let first = dumps_template(&t).unwrap();
        for _ in 0..100 {
            assert_eq!(dumps_template(&t).unwrap(), first, "{name}");
        }
    }
}

#[test]
fn test_concurrent_renders_share_one_template() {
    let (_, t) = corpus()
        .into_iter()
        .find(|(name, _)| *name == "subtemplates")
        .unwrap_or_else(|| panic!("missing corpus entry"));
    let vars = sample_vars();
    let expected = outcome(&t, &vars, Strategy::Opcodes);
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| outcome(&t, &vars, Strategy::Opcodes)))
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    });
}

// ══════════════════════════════════════════════════════════════════════════════
// Property-based parity
// ══════════════════════════════════════════════════════════════════════════════

fn arb_operand() -> impl proptest::strategy::Strategy<Value = Value> {
    prop_oneof![
        Just(Value::None),
        any::<bool>().prop_map(Value::Bool),
        (-20i64..20).prop_map(Value::Int),
        prop_oneof![Just(i64::MAX), Just(i64::MIN)].prop_map(Value::Int),
        (-20.0f64..20.0).prop_map(Value::Float),
        "[a-c]{0,3}".prop_map(Value::Str),
        prop::collection::vec((-3i64..3).prop_map(Value::Int), 0..3).prop_map(Value::List),
        Just(Value::dict([("a", 1)])),
    ]
}

fn arb_leaf() -> impl proptest::strategy::Strategy<Value = ul4::Node> {
    prop_oneof![
        Just(var("a")),
        Just(var("b")),
        Just(none()),
        any::<bool>().prop_map(|b| constant(b)),
        (-3i64..4).prop_map(|i| constant(i)),
        (-3.0f64..3.0).prop_map(|f| constant(f)),
        "[a-c]{0,2}".prop_map(|s| constant(s)),
    ]
}

/// Expression trees up to 16 levels deep, deeper than any fixed register bank
/// sized for typical templates.
fn arb_expression() -> impl proptest::strategy::Strategy<Value = ul4::Node> {
    arb_leaf().prop_recursive(16, 64, 2, |inner| {
        prop_oneof![
            3 => (prop::sample::select(BinaryOp::ALL.to_vec()), inner.clone(), inner.clone())
                .prop_map(|(op, left, right)| binary(op, left, right)),
            1 => inner.clone().prop_map(|obj| unary(UnaryOp::Neg, obj)),
            1 => inner.prop_map(|obj| unary(UnaryOp::Not, obj)),
        ]
    })
}

/// A chain nested to the right, `a op (b op (a op ...))`.
fn right_nested(ops: &[BinaryOp]) -> ul4::Node {
    ops.iter().enumerate().rev().fold(var("a"), |inner, (i, &op)| {
        let leaf = if i % 2 == 0 { var("b") } else { var("a") };
        binary(op, leaf, inner)
    })
}

proptest! {
    #[test]
    fn prop_expression_trees_agree(
        expr in arb_expression(),
        a in arb_operand(),
        b in arb_operand(),
    ) {
        let t = template(Some("p"), vec![print(expr)]);
        let vars: Vars = [("a".to_string(), a), ("b".to_string(), b)].into_iter().collect();
        prop_assert_eq!(
            outcome(&t, &vars, Strategy::TreeWalk),
            outcome(&t, &vars, Strategy::Opcodes)
        );
    }

    #[test]
    fn prop_right_nested_chains_agree(
        ops in prop::collection::vec(
            prop::sample::select(vec![BinaryOp::Add, BinaryOp::Sub, BinaryOp::Mul, BinaryOp::Lt]),
            10..48,
        ),
        a in -3i64..4,
        b in -3i64..4,
    ) {
        let t = template(Some("p"), vec![print(right_nested(&ops))]);
        let vars: Vars = [("a".to_string(), Value::Int(a)), ("b".to_string(), Value::Int(b))]
            .into_iter()
            .collect();
        prop_assert_eq!(
            outcome(&t, &vars, Strategy::TreeWalk),
            outcome(&t, &vars, Strategy::Opcodes)
        );
    }

    #[test]
    fn prop_binary_operators_agree(
        op in prop::sample::select(BinaryOp::ALL.to_vec()),
        a in arb_operand(),
        b in arb_operand(),
    ) {
        let t = template(Some("p"), vec![print(binary(op, var("a"), var("b")))]);
        let vars: Vars = [("a".to_string(), a), ("b".to_string(), b)].into_iter().collect();
        prop_assert_eq!(
            outcome(&t, &vars, Strategy::TreeWalk),
            outcome(&t, &vars, Strategy::Opcodes)
        );
    }

    #[test]
    fn prop_variable_operators_agree(
        op in prop::sample::select(VarOp::ALL.to_vec()),
        a in arb_operand(),
        b in arb_operand(),
    ) {
        let t = template(
            Some("p"),
            vec![store("v", var("a")), changevar(op, "v", var("b")), print(var("v"))],
        );
        let vars: Vars = [("a".to_string(), a), ("b".to_string(), b)].into_iter().collect();
        prop_assert_eq!(
            outcome(&t, &vars, Strategy::TreeWalk),
            outcome(&t, &vars, Strategy::Opcodes)
        );
    }
}
