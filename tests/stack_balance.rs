//! Property tests over generated well-formed programs.
//!
//! Every generated program must:
//! 1. compile, which means the checker found the expression stack balanced
//! 2. come out fully patched, with every jump target inside the program
//! 3. run to the same outcome every time

use poliz::ir::Instr;
use poliz::vm::MachineConfig;
use poliz::{compile, Compiled, Error};
use proptest::prelude::*;

fn int_expr() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![
        Just("a".to_owned()),
        Just("b".to_owned()),
        (0u32..100).prop_map(|n| n.to_string()),
    ];
    leaf.prop_recursive(3, 16, 2, |inner| {
        (
            inner.clone(),
            prop_oneof![Just("+"), Just("-"), Just("*")],
            inner,
        )
            .prop_map(|(l, op, r)| format!("({l} {op} {r})"))
    })
}

fn bool_expr() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![
        Just("p".to_owned()),
        Just("true".to_owned()),
        Just("false".to_owned()),
        (
            int_expr(),
            prop_oneof![Just("<"), Just("=="), Just(">="), Just("!=")],
            int_expr(),
        )
            .prop_map(|(l, op, r)| format!("({l} {op} {r})")),
    ];
    leaf.prop_recursive(2, 8, 2, |inner| {
        prop_oneof![
            (
                inner.clone(),
                prop_oneof![Just("&&"), Just("||")],
                inner.clone(),
            )
                .prop_map(|(l, op, r)| format!("({l} {op} {r})")),
            inner.prop_map(|e| format!("!{e}")),
        ]
    })
}

fn float_expr() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("f".to_owned()),
        Just("2.5".to_owned()),
        int_expr(),
        (int_expr(), int_expr()).prop_map(|(l, r)| format!("({l} / {r})")),
        (int_expr(), Just("f")).prop_map(|(l, r)| format!("({l} * {r})")),
    ]
}

fn statement() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![
        int_expr().prop_map(|e| format!("a := {e}")),
        bool_expr().prop_map(|e| format!("p := {e}")),
        float_expr().prop_map(|e| format!("f := {e}")),
        int_expr().prop_map(|e| format!("writeln {e}")),
        (bool_expr(), float_expr()).prop_map(|(l, r)| format!("writeln {l}, {r}")),
        Just("readln a".to_owned()),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            (bool_expr(), inner.clone(), inner.clone())
                .prop_map(|(c, t, e)| format!("if ({c}) {t} else {e}")),
            (bool_expr(), inner.clone()).prop_map(|(c, t)| format!("if ({c}) {t}")),
            inner.clone().prop_map(|s| format!("while (false) {s}")),
            (0u32..4, inner.clone())
                .prop_map(|(n, s)| format!("for b := 1 to {n} step 1 {s} next")),
            prop::collection::vec(inner, 1..4)
                .prop_map(|body| format!("begin {} end", body.join("; "))),
        ]
    })
}

fn program() -> impl Strategy<Value = String> {
    prop::collection::vec(statement(), 1..6).prop_map(|body| {
        format!(
            "program var int a, b; bool p; float f; begin {} end.",
            body.join("; ")
        )
    })
}

fn run(compiled: &Compiled) -> (Vec<String>, Result<(), Error>) {
    let mut out = Vec::new();
    let mut inputs = ["3", "-2", "7"].iter().cycle();
    let config = MachineConfig {
        instruction_limit: 20_000,
    };
    let result = compiled.execute(
        config,
        |line| out.push(line),
        || inputs.next().map(|s| (*s).to_owned()).unwrap_or_default(),
    );
    (out, result)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn generated_programs_compile(source in program()) {
        let compiled = compile(&source);
        prop_assert!(compiled.is_ok(), "{source}\n{:?}", compiled.err());
    }

    #[test]
    fn jump_targets_are_patched_and_in_bounds(source in program()) {
        let compiled = compile(&source).unwrap();
        let program = &compiled.program;
        prop_assert!(program.is_resolved());
        prop_assert_eq!(program.instrs().last(), Some(&Instr::Halt));
        for instr in program.instrs() {
            if let Instr::Target(target) = instr {
                let target = target.unwrap();
                prop_assert!(target <= program.len(), "{target} in {program}");
            }
        }
    }

    #[test]
    fn runs_are_deterministic(source in program()) {
        let compiled = compile(&source).unwrap();
        prop_assert_eq!(run(&compiled), run(&compiled));
    }

    #[test]
    fn postfix_text_round_trips(source in program()) {
        let compiled = compile(&source).unwrap();
        let reparsed: poliz::ir::Program = compiled.program.to_string().parse().unwrap();
        prop_assert_eq!(reparsed, compiled.program);
    }

    #[test]
    fn scanner_never_panics(source in "[ -~\n]{0,200}") {
        let _ = poliz::scan::scan(&source);
    }
}
