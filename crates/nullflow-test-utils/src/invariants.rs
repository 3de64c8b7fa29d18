//! Structural checks on memory states and completed runs.

use std::collections::BTreeSet;

use nullflow_interpreter::{AnalysisContext, MemoryState, RunResult, Value, ValueId};
use nullflow_ir::{Constant, Nullability};

fn report(what: &str, violations: Vec<String>) {
    if violations.is_empty() {
        return;
    }
    let list: Vec<String> = violations
        .iter()
        .enumerate()
        .map(|(i, v)| format!("  {}. {}", i + 1, v))
        .collect();
    panic!("{what}: {} violation(s):\n{}", violations.len(), list.join("\n"));
}

fn check_partition(ctx: &AnalysisContext<'_>, state: &MemoryState, v: &mut Vec<String>) {
    let mut seen: BTreeSet<ValueId> = BTreeSet::new();
    for class in state.classes() {
        if class.is_empty() {
            v.push(format!("empty class keyed {}", class.key()));
        }
        for member in class.members() {
            if !seen.insert(*member) {
                v.push(format!("{} is in more than one class", ctx.render_value(*member)));
            }
            if state.class_of(*member).map(|c| c.key()) != Some(class.key()) {
                v.push(format!("{} is not indexed to its class", ctx.render_value(*member)));
            }
        }
    }
    for (a, b) in state.distinct_pairs() {
        if state.are_equal(a, b) {
            v.push(format!(
                "{} and {} are both equal and distinct",
                ctx.render_value(a),
                ctx.render_value(b)
            ));
        }
    }
}

fn check_consistent(ctx: &AnalysisContext<'_>, state: &MemoryState, v: &mut Vec<String>) {
    let types = ctx.types();
    for class in state.classes() {
        let facts = class.facts();
        let names: Vec<String> = class.members().iter().map(|m| ctx.render_value(*m)).collect();
        let names = names.join(" = ");
        if facts.nullability() == Nullability::Null && !facts.instance_of().is_empty() {
            v.push(format!("{names}: null yet an instance"));
        }
        if facts.instance_of().iter().any(|t| facts.implies_not_instance_of(types, *t)) {
            v.push(format!("{names}: both an instance and not"));
        }
        if facts.range().is_some_and(|r| r.is_empty()) {
            v.push(format!("{names}: empty range"));
        }
        let constants: Vec<&Constant> = class
            .members()
            .iter()
            .filter_map(|m| match ctx.value(*m) {
                Some(Value::Constant(c)) => Some(c),
                _ => None,
            })
            .collect();
        if constants.len() > 1 {
            v.push(format!("{names}: more than one constant"));
        }
        if class.members().iter().any(|m| ctx.is_fact_carrier(*m)) {
            v.push(format!("{names}: a fact carrier joined a class"));
        }
    }
}

/// Every value is in at most one class, the index agrees with the classes,
/// and no pair is both equal and distinct.
pub fn assert_partition(ctx: &AnalysisContext<'_>, state: &MemoryState) {
    let mut violations = Vec::new();
    check_partition(ctx, state, &mut violations);
    report("partition", violations);
}

/// No class carries contradictory facts or two different constants.
pub fn assert_consistent(ctx: &AnalysisContext<'_>, state: &MemoryState) {
    let mut violations = Vec::new();
    check_consistent(ctx, state, &mut violations);
    report("consistency", violations);
}

/// Every input state is covered by some merged state.
pub fn assert_merge_sound(ctx: &AnalysisContext<'_>, inputs: &[MemoryState], merged: &[MemoryState]) {
    let violations = inputs
        .iter()
        .filter(|input| !merged.iter().any(|m| m.is_superstate_of(ctx, input)))
        .map(|input| format!("not covered: {}", input.render(ctx)))
        .collect();
    report("merge soundness", violations);
}

/// Partition and consistency of every state recorded by a run.
pub fn assert_run_invariants(result: &RunResult<'_>) {
    let ctx = result.context();
    let mut violations = Vec::new();
    for (at, _) in ctx.program.instructions() {
        for state in result.states_at(at).unwrap_or_default() {
            let mut found = Vec::new();
            check_partition(ctx, state, &mut found);
            check_consistent(ctx, state, &mut found);
            violations.extend(found.into_iter().map(|f| format!("{at}: {f}")));
        }
    }
    report("run", violations);
}
