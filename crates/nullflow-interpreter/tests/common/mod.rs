#![allow(dead_code)]

use nullflow_interpreter::{DataflowInterpreter, MergePolicy, RunResult};
use nullflow_ir::Program;
use nullflow_test_utils::invariants::assert_run_invariants;

/// Run with default settings and check the state invariants on the way out.
pub fn run(program: &Program) -> RunResult<'_> {
    run_with(program, MergePolicy::AllJoins)
}

pub fn run_with(program: &Program, policy: MergePolicy) -> RunResult<'_> {
    let result = DataflowInterpreter::new(program)
        .with_merge_policy(policy)
        .run()
        .expect("run should complete");
    assert_run_invariants(&result);
    result
}

/// Every state at every instruction, rendered, for comparing runs.
pub fn snapshot(result: &RunResult<'_>) -> Vec<String> {
    let ctx = result.context();
    ctx.program
        .instructions()
        .flat_map(|(at, _)| {
            result
                .states_at(at)
                .unwrap_or_default()
                .iter()
                .map(move |s| format!("{at}: {}", s.render(ctx)))
                .collect::<Vec<_>>()
        })
        .collect()
}
