mod common;

use nullflow_interpreter::Problem;
use nullflow_ir::{
    CallSpec, CmpOp, Condition, Constant, InstrIndex, IntRange, Nullability, ProgramBuilder,
    TypeTable, VarPath,
};
use test_log::test;

fn possible_null_at(at: InstrIndex) -> Problem {
    Problem::NullDereference {
        at,
        definite: false,
    }
}

// -- Produced values --------------------------------------------------------

#[test]
fn a_null_check_does_not_narrow_a_later_unknown() {
    let mut b = ProgramBuilder::new(TypeTable::new());
    let done = b.label();
    b.push_unknown(None, Nullability::Nullable);
    b.branch(Condition::IsNull, done);
    b.push_unknown(None, Nullability::Nullable);
    let deref = b.deref(None);
    b.bind(done).unwrap();
    b.ret();
    let program = b.finish().unwrap();

    let result = common::run(&program);
    let problems: Vec<Problem> = result.problems().copied().collect();
    assert_eq!(problems, vec![possible_null_at(deref)]);
}

#[test]
fn values_from_different_instructions_are_narrowed_apart() {
    let mut b = ProgramBuilder::new(TypeTable::new());
    let done = b.label();
    b.push_unknown(None, Nullability::Nullable);
    b.push_unknown(None, Nullability::Nullable);
    b.branch(Condition::IsNull, done);
    let deref = b.deref(None);
    b.bind(done).unwrap();
    b.ret();
    let program = b.finish().unwrap();

    let result = common::run(&program);
    let problems: Vec<Problem> = result.problems().copied().collect();
    assert_eq!(problems, vec![possible_null_at(deref)]);
}

#[test]
fn a_duplicated_value_keeps_the_narrowing() {
    let mut b = ProgramBuilder::new(TypeTable::new());
    let done = b.label();
    b.push_unknown(None, Nullability::Nullable);
    b.dup();
    b.branch(Condition::IsNull, done);
    b.deref(None);
    b.bind(done).unwrap();
    b.ret();
    let program = b.finish().unwrap();

    let result = common::run(&program);
    assert_eq!(result.problems().count(), 0);
}

// -- Boxing -----------------------------------------------------------------

#[test]
fn a_box_holds_the_value_at_boxing_time() {
    let mut b = ProgramBuilder::new(TypeTable::new());
    let x = b.local("x");
    let equal = b.label();
    b.push_const(Constant::Int(1));
    b.store(x);
    b.push_var(x);
    b.box_value();
    b.push_const(Constant::Int(2));
    b.store(x);
    b.unbox_value();
    b.push_const(Constant::Int(1));
    b.branch(Condition::Cmp(CmpOp::Eq), equal);
    let different = b.ret();
    b.bind(equal).unwrap();
    let same = b.ret();
    let program = b.finish().unwrap();

    let result = common::run(&program);
    assert!(result.is_reachable(same));
    assert!(result.is_unreachable(different));
    assert_eq!(
        result
            .facts_at(same, &VarPath::new(x))
            .and_then(|f| f.range()),
        Some(IntRange::point(2))
    );
}

#[test]
fn unboxing_null_is_a_dereference() {
    let mut b = ProgramBuilder::new(TypeTable::new());
    b.push_null();
    let unbox = b.unbox_value();
    let after = b.ret();
    let program = b.finish().unwrap();

    let result = common::run(&program);
    let problems: Vec<Problem> = result.problems().copied().collect();
    assert_eq!(
        problems,
        vec![Problem::NullDereference {
            at: unbox,
            definite: true
        }]
    );
    assert!(result.is_unreachable(after));
}

// -- Calls ------------------------------------------------------------------

#[test]
fn only_impure_calls_forget_field_facts() {
    let mut b = ProgramBuilder::new(TypeTable::new());
    let x = b.param("x", Nullability::NotNull);
    let f = b.field("f");
    let xf = VarPath::new(x).field(f);
    let done = b.label();
    b.push_var(xf.clone());
    b.branch(Condition::IsNull, done);
    b.call(CallSpec::builder().pure(true).build());
    let after_pure = b.push_var(xf.clone());
    b.pop();
    b.call(CallSpec::builder().build());
    let after_impure = b.push_var(xf.clone());
    b.pop();
    b.bind(done).unwrap();
    b.ret();
    let program = b.finish().unwrap();

    let result = common::run(&program);
    assert_eq!(
        result.nullability_at(after_pure, &xf),
        Some(Nullability::NotNull)
    );
    assert_eq!(
        result.nullability_at(after_impure, &xf),
        Some(Nullability::Flushed)
    );
    assert_eq!(result.may_be_null(after_impure, &xf), Some(false));
}
