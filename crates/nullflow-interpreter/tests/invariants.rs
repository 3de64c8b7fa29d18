mod common;

use nullflow_interpreter::{MergePolicy, merge_states};
use nullflow_test_utils::fixtures::{self, Scenario};
use nullflow_test_utils::invariants::assert_merge_sound;
use test_log::test;

fn all_fixtures() -> Vec<Scenario> {
    vec![
        fixtures::null_check_then_use(),
        fixtures::finally_with_throwing_call(),
        fixtures::specific_then_ancestor_handler(),
        fixtures::nested_finally(),
        fixtures::unrelated_instanceof_join(),
        fixtures::return_in_finally(),
        fixtures::null_terminated_loop(),
        fixtures::checked_cast(),
    ]
}

#[test]
fn every_recorded_state_is_a_consistent_partition() {
    // `common::run` checks partition and consistency of every state.
    for s in all_fixtures() {
        common::run(&s.program);
        common::run_with(&s.program, MergePolicy::Never);
    }
}

#[test]
fn merging_only_widens() {
    for s in all_fixtures() {
        let result = common::run_with(&s.program, MergePolicy::Never);
        let ctx = result.context();
        for (at, _) in s.program.instructions() {
            let states = result.states_at(at).unwrap_or_default();
            for limit in [1, 8] {
                let merged = merge_states(ctx, states.to_vec(), limit);
                assert!(merged.len() <= states.len());
                assert_merge_sound(ctx, states, &merged);
            }
        }
    }
}

#[test]
fn runs_are_deterministic() {
    for s in all_fixtures() {
        let first = common::run(&s.program);
        let second = common::run(&s.program);
        assert_eq!(common::snapshot(&first), common::snapshot(&second));
        assert_eq!(first.edges(), second.edges());
        assert_eq!(first.states_processed(), second.states_processed());
    }
}

#[test]
fn protected_regions_are_left_through_their_cleanup() {
    let s = fixtures::finally_with_throwing_call();
    let result = common::run(&s.program);
    let region = [s.at("call"), s.at("leave")];
    for (from, to) in result.edges() {
        if region.contains(from) && !region.contains(to) {
            assert_eq!(*to, s.at("cleanup"), "{from} leaves the region to {to}");
        }
    }

    let s = fixtures::nested_finally();
    let result = common::run(&s.program);
    for (from, to) in result.edges() {
        if *from == s.at("throw") {
            assert_eq!(*to, s.at("inner_cleanup"));
        }
        if *from == s.at("inner_end") {
            assert_eq!(*to, s.at("outer_cleanup"));
        }
    }
}

#[test]
fn loops_reach_a_fixed_point() {
    let s = fixtures::null_terminated_loop();
    let result = common::run(&s.program);
    assert!(result.is_reachable(s.at("done")));
    assert_eq!(result.problems().count(), 0);
    assert_eq!(
        result.may_be_null(s.at("deref"), &s.var("x")),
        Some(false)
    );
}
