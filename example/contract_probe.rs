//! Probe a method under hypotheses about its argument and print which
//! outcomes remain possible, the way a contract inference would.

use nullflow::prelude::*;

/// `Object find(Object key) {
///     if (key == null) throw new RuntimeException();
///     Object v = lookup(key);
///     if (v instanceof A) return v;
///     return null;
/// }`
fn find_method() -> Result<Program, BuildError> {
    let mut types = TypeTable::new();
    let object = types.class("Object", &[]);
    let exception = types.class("Exception", &[object]);
    let runtime = types.class("RuntimeException", &[exception]);
    let a = types.interface("A", &[]);

    let mut b = ProgramBuilder::new(types);
    let key = b.param("key", Nullability::Unknown);
    let v = b.local("v");
    let present = b.label();
    let found = b.label();

    b.push_var(key);
    b.branch(Condition::NonNull, present);
    b.push_new(runtime);
    b.throw();

    b.bind(present)?;
    b.push_var(key);
    b.call(
        CallSpec::builder()
            .args(1)
            .result(CallResult {
                ty: Some(object),
                nullability: Nullability::Nullable,
            })
            .build(),
    );
    b.store(v);
    b.push_var(v);
    b.branch(Condition::InstanceOf(a), found);
    b.push_null();
    b.ret();

    b.bind(found)?;
    b.push_var(v);
    b.ret();
    b.finish()
}

fn probe(program: &Program, hypothesis: Nullability) -> anyhow::Result<()> {
    let key = VarPath::new(
        program
            .variable_named("key")
            .ok_or_else(|| anyhow::anyhow!("no parameter `key`"))?,
    );

    let mut interpreter = DataflowInterpreter::new(program).with_max_states(1_000);
    let Some(entry) = interpreter.seed(&[Assumption::Nullability(key, hypothesis)]) else {
        println!("key {hypothesis}: contradictory");
        return Ok(());
    };
    let result = interpreter.run_from(InstrIndex::new(0), entry)?;
    let ctx = result.context();

    let returned: Vec<Nullability> = result
        .exit_states()
        .iter()
        .filter_map(|state| state.peek().map(|v| state.nullability_of(ctx, v)))
        .collect();
    let returns_null = returned.iter().any(|n| n.may_be_null());
    let returns_value = returned.iter().any(|n| *n != Nullability::Null);
    let throws = !result.uncaught_exceptions().is_empty();

    println!(
        "key {hypothesis}: returns null: {returns_null}, returns a value: {returns_value}, throws: {throws} ({} states)",
        result.states_processed()
    );
    for exception in result.uncaught_exceptions() {
        println!("  uncaught at {}: {}", exception.origin, exception.facts.render(ctx.types()));
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    simplelog::TermLogger::init(
        simplelog::LevelFilter::Debug,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let time_total = std::time::Instant::now();

    let program = find_method()?;
    println!("{program}");

    for hypothesis in [Nullability::Null, Nullability::NotNull, Nullability::Unknown] {
        probe(&program, hypothesis)?;
    }

    let time_total = time_total.elapsed();
    println!("Done in {:.3} s", time_total.as_secs_f64());
    Ok(())
}
