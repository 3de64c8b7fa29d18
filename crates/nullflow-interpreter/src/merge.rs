use log::debug;

use crate::{AnalysisContext, MemoryState};

/// Reduce the states arriving together at a join instruction.
///
/// States are grouped by stack and trap stack, since only those can be
/// joined. Within a group the strategies run in order until none applies:
/// drop states another state covers, join pairs that disagree on the facts
/// of a single class, join pairs that disagree only on nullability, and
/// while the group is larger than `join_limit`, join the first two states
/// regardless. Every result covers the states it replaces.
pub fn merge_states(
    ctx: &AnalysisContext<'_>,
    states: Vec<MemoryState>,
    join_limit: usize,
) -> Vec<MemoryState> {
    let before = states.len();
    let mut groups: Vec<Vec<MemoryState>> = Vec::new();
    for state in states {
        match groups.iter_mut().find(|g| g[0].same_superficial(&state)) {
            Some(group) => group.push(state),
            None => groups.push(vec![state]),
        }
    }
    let merged: Vec<MemoryState> = groups
        .into_iter()
        .flat_map(|group| merge_group(ctx, group, join_limit))
        .collect();
    if merged.len() < before {
        debug!("merged {before} states into {}", merged.len());
    }
    merged
}

fn merge_group(
    ctx: &AnalysisContext<'_>,
    mut group: Vec<MemoryState>,
    join_limit: usize,
) -> Vec<MemoryState> {
    loop {
        if drop_subsumed(ctx, &mut group) {
            continue;
        }
        let single_class = |a: &MemoryState, b: &MemoryState| {
            a.same_partition(b) && a.fact_differences(ctx, b).len() == 1
        };
        if join_first_pair(ctx, &mut group, single_class) {
            continue;
        }
        let nullability_only = |a: &MemoryState, b: &MemoryState| {
            a.same_partition(b)
                && a.fact_differences(ctx, b)
                    .iter()
                    .all(|(x, y)| x.same_but_nullability(y))
        };
        if join_first_pair(ctx, &mut group, nullability_only) {
            continue;
        }
        if group.len() > join_limit.max(1) {
            let second = group.remove(1);
            group[0] = group[0].join(ctx, &second);
            continue;
        }
        return group;
    }
}

/// Remove one state that another state of the group covers. Of two equal
/// states the earlier one goes; the survivor stands in for both.
fn drop_subsumed(ctx: &AnalysisContext<'_>, group: &mut Vec<MemoryState>) -> bool {
    for j in 0..group.len() {
        let covered = (0..group.len()).any(|i| i != j && group[i].is_superstate_of(ctx, &group[j]));
        if covered {
            group.remove(j);
            return true;
        }
    }
    false
}

/// Join the first pair satisfying `pred` into the position of its earlier
/// member.
fn join_first_pair(
    ctx: &AnalysisContext<'_>,
    group: &mut Vec<MemoryState>,
    pred: impl Fn(&MemoryState, &MemoryState) -> bool,
) -> bool {
    for i in 0..group.len() {
        for j in i + 1..group.len() {
            if pred(&group[i], &group[j]) {
                let later = group.remove(j);
                group[i] = group[i].join(ctx, &later);
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use nullflow_ir::{Nullability, Program, ProgramBuilder, TypeTable, VarId, VarPath};
    use test_log::test;

    use super::*;

    fn program() -> (Program, [VarId; 3]) {
        let mut b = ProgramBuilder::new(TypeTable::new());
        let vars = [b.local("x"), b.local("y"), b.local("z")];
        b.ret();
        (b.finish().unwrap(), vars)
    }

    fn state(ctx: &mut AnalysisContext<'_>, facts: &[(VarId, Nullability)]) -> MemoryState {
        let mut state = MemoryState::new();
        for (var, n) in facts {
            let v = ctx.values.path(&VarPath::new(*var));
            state = state.with_nullability(ctx, v, *n).unwrap();
        }
        state
    }

    #[test]
    fn covered_states_are_dropped() {
        let (program, [x, ..]) = program();
        let mut ctx = AnalysisContext::new(&program);
        let precise = state(&mut ctx, &[(x, Nullability::NotNull)]);
        let loose = MemoryState::new();
        let merged = merge_states(&ctx, vec![precise, loose.clone()], 8);
        assert_eq!(merged, vec![loose]);
    }

    #[test]
    fn nullability_splits_are_joined() {
        let (program, [x, y, _]) = program();
        let mut ctx = AnalysisContext::new(&program);
        let a = state(&mut ctx, &[(x, Nullability::Null), (y, Nullability::Null)]);
        let b = state(&mut ctx, &[(x, Nullability::NotNull), (y, Nullability::NotNull)]);
        let merged = merge_states(&ctx, vec![a, b], 8);
        assert_eq!(merged.len(), 1);
        let xv = ctx.values.find_path(&VarPath::new(x)).unwrap();
        let yv = ctx.values.find_path(&VarPath::new(y)).unwrap();
        assert_eq!(merged[0].nullability_of(&ctx, xv), Nullability::Nullable);
        assert_eq!(merged[0].nullability_of(&ctx, yv), Nullability::Nullable);
    }

    #[test]
    fn different_stacks_are_never_joined() {
        let (program, [x, _, z]) = program();
        let mut ctx = AnalysisContext::new(&program);
        let a = state(&mut ctx, &[(x, Nullability::Null)]);
        let mut b = state(&mut ctx, &[(x, Nullability::NotNull)]);
        let zv = ctx.values.path(&VarPath::new(z));
        b.push(zv);
        assert_eq!(merge_states(&ctx, vec![a, b], 1).len(), 2);
    }

    #[test]
    fn groups_larger_than_the_limit_are_forced_down() {
        let (program, vars) = program();
        let mut ctx = AnalysisContext::new(&program);
        let [x, y, z] = vars.map(|v| ctx.values.path(&VarPath::new(v)));
        // Each state equates a different pair, so only the forced join applies.
        let states: Vec<MemoryState> = [(x, y), (y, z), (x, z)]
            .into_iter()
            .map(|(a, b)| {
                let mut s = MemoryState::new();
                assert!(s.unite_values(&mut ctx, a, b));
                s
            })
            .collect();
        assert_eq!(merge_states(&ctx, states.clone(), 8).len(), 3);
        assert!(merge_states(&ctx, states, 2).len() <= 2);
    }
}
