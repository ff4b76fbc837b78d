use poliz::check::SemanticError;
use poliz::ir::Instr;
use poliz::vm::{MachineConfig, RuntimeError};
use poliz::{analyze, compile, Error};

fn run_with(source: &str, inputs: &[&str], config: MachineConfig) -> Result<Vec<String>, Error> {
    let compiled = compile(source)?;
    let mut inputs = inputs.iter().map(|s| (*s).to_owned());
    let mut out = Vec::new();
    compiled.execute(
        config,
        |line| out.push(line),
        || inputs.next().unwrap_or_default(),
    )?;
    Ok(out)
}

fn run(source: &str, inputs: &[&str]) -> Vec<String> {
    run_with(source, inputs, MachineConfig::default()).unwrap()
}

const FACTORIAL: &str = "
program var
  int n, i, factorial;
begin
  readln n;
  factorial := 1;
  for i := 1 to n step 1 begin
    factorial := factorial * i;
  end next;
  writeln factorial;
end.
";

#[test]
fn factorial() {
    assert_eq!(run(FACTORIAL, &["5"]), ["120"]);
    assert_eq!(run(FACTORIAL, &["0"]), ["1"]);
}

#[test]
fn bool_assignment_is_one_semantic_error() {
    let scanned = poliz::scan::scan("program var bool b; begin b := 1; end.").unwrap();
    let report = analyze(&scanned.tokens, &scanned.identifiers, &scanned.numbers);
    assert!(!report.success());
    assert!(report.syntax_errors.is_empty());
    assert!(report.program.is_none());
    assert_eq!(report.semantic_errors.len(), 1);
    let message = report.semantic_errors[0].to_string();
    assert!(message.contains("bool") && message.contains("int"), "{message}");
}

#[test]
fn undeclared_use_is_one_semantic_error() {
    let scanned = poliz::scan::scan("program var int y; begin writeln x; end.").unwrap();
    let report = analyze(&scanned.tokens, &scanned.identifiers, &scanned.numbers);
    assert_eq!(report.semantic_errors.len(), 1);
    assert!(matches!(
        &report.semantic_errors[0],
        SemanticError::UndeclaredUse { name, .. } if name == "x"
    ));
}

#[test]
fn division_yields_float() {
    assert_eq!(
        run("program var int x; begin writeln 7/2; end.", &[]),
        ["3.5"]
    );
}

#[test]
fn infinite_loop_hits_the_limit() {
    let config = MachineConfig {
        instruction_limit: 10_000,
    };
    let result = run_with(
        "program var int x; begin while (true) x := x + 1 end.",
        &[],
        config,
    );
    assert_eq!(
        result,
        Err(Error::Runtime(RuntimeError::RuntimeLimitExceeded(10_000)))
    );
}

#[test]
fn branches_follow_the_condition() {
    let source = "
program var int x;
begin
  readln x;
  if (x > 0) begin writeln 1; writeln 2 end
  else writeln 3;
  writeln 4
end.";
    assert_eq!(run(source, &["7"]), ["1", "2", "4"]);
    assert_eq!(run(source, &["-1"]), ["3", "4"]);
}

#[test]
fn jump_targets_are_in_bounds() {
    let compiled = compile(FACTORIAL).unwrap();
    let program = &compiled.program;
    assert!(program.is_resolved());
    for instr in program.instrs() {
        if let Instr::Target(Some(t)) = instr {
            assert!(*t <= program.len());
        }
    }
    assert_eq!(program.instrs().last(), Some(&Instr::Halt));
}

#[test]
fn while_loop() {
    let source = "
program var int n, s;
begin
  readln n;
  while (n > 0) begin
    s := s + n;
    n := n - 1
  end;
  writeln s
end.";
    assert_eq!(run(source, &["4"]), ["10"]);
}

#[test]
fn for_bound_is_recomputed() {
    let source = "
program var int i, n;
begin
  n := 6;
  for i := 1 to n begin n := n - 1; writeln i end next
end.";
    assert_eq!(run(source, &[]), ["1", "2", "3"]);
}

#[test]
fn for_step_runs_after_the_body() {
    let source = "
program var int i, s;
begin
  s := 1;
  for i := 1 to 10 step s begin s := s + 1; writeln i end next
end.";
    assert_eq!(run(source, &[]), ["1", "3", "6", "10"]);
}

#[test]
fn float_counter() {
    let source = "program var float x; begin for x := 0 to 1 step 0.5 writeln x next end.";
    assert_eq!(run(source, &[]), ["0", "0.5", "1"]);
}

#[test]
fn radix_literals_in_programs() {
    let source = "program var int x; begin writeln 1010B, 1FH, 17O, 12D; x := 0FFh + 1 end.";
    let compiled = compile(source).unwrap();
    let numbers: Vec<_> = compiled
        .scanned
        .numbers
        .iter()
        .map(|e| e.value.as_str())
        .collect();
    assert_eq!(numbers, ["10", "31", "15", "12", "255", "1"]);
    assert_eq!(run(source, &[]), ["10", "31", "15", "12"]);
}

#[test]
fn booleans_and_reads() {
    let source = "
program var bool p, q; float f;
begin
  readln p, f;
  q := !p || (f >= 2.5);
  writeln p, q, f * 2
end.";
    assert_eq!(run(source, &["false", "1.25"]), ["false", "true", "2.5"]);
}

#[test]
fn comments_are_skipped() {
    let source = "program var { counters } int x; begin { set it } x := 2; writeln x end.";
    assert_eq!(run(source, &[]), ["2"]);
}

#[test]
fn determinism() {
    let first = compile(FACTORIAL).unwrap();
    let second = compile(FACTORIAL).unwrap();
    assert_eq!(first.program.to_string(), second.program.to_string());
    assert_eq!(run(FACTORIAL, &["6"]), run(FACTORIAL, &["6"]));
}

#[test]
fn lexical_errors_surface_with_their_line() {
    let err = compile("program var int x;\nbegin x := 1 # 2 end.").unwrap_err();
    assert_eq!(err.to_string(), "lexical error at line 2: unexpected lexeme `#`");
}

#[test]
fn postfix_text_round_trips() {
    let compiled = compile(FACTORIAL).unwrap();
    let text = compiled.program.to_string();
    let reparsed: poliz::ir::Program = text.parse().unwrap();
    assert_eq!(reparsed, compiled.program);
}
