use nullflow::prelude::*;
use nullflow_test_utils::fixtures::hierarchy;
use nullflow_test_utils::invariants::assert_run_invariants;
use test_log::test;

/// `String f(String s) { if (s == null) return "none"; return s; }`
fn null_or_default() -> (Program, [InstrIndex; 2]) {
    let mut b = ProgramBuilder::new(hierarchy());
    let s = b.param("s", Nullability::Unknown);
    let fallback = b.label();
    b.push_var(s);
    b.branch(Condition::IsNull, fallback);
    b.push_var(s);
    let pass_through = b.ret();
    b.bind(fallback).unwrap();
    b.push_const(Constant::Str("none".into()));
    let default = b.ret();
    (b.finish().unwrap(), [pass_through, default])
}

#[test]
fn the_method_never_returns_null() {
    let (program, _) = null_or_default();
    let result = DataflowInterpreter::new(&program).run().unwrap();
    assert_run_invariants(&result);

    let returned = result.return_facts().unwrap();
    assert_eq!(returned.nullability(), Nullability::NotNull);
    assert!(result.uncaught_exceptions().is_empty());
    assert_eq!(result.problems().count(), 0);
}

#[test]
fn a_null_argument_takes_the_default() {
    let (program, [pass_through, default]) = null_or_default();
    let s = VarPath::new(program.variable_named("s").unwrap());

    let mut interpreter = DataflowInterpreter::new(&program);
    let entry = interpreter
        .seed(&[Assumption::Nullability(s, Nullability::Null)])
        .unwrap();
    let result = interpreter
        .run_from(InstrIndex::new(0), entry)
        .unwrap();

    assert!(result.is_unreachable(pass_through));
    assert!(result.is_reachable(default));
    assert_eq!(result.exit_states().len(), 1);
}
