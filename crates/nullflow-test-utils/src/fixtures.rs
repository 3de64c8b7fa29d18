//! Small lowered methods exercising the engine's control-flow features.
//!
//! Each fixture names its interesting instructions so tests can query them
//! without counting offsets.

use nullflow_ir::{
    CallSpec, Condition, InstrIndex, Nullability, Program, ProgramBuilder, TypeId, TypeTable,
    VarPath, catch,
};

/// A built program plus named positions in it.
pub struct Scenario {
    pub program: Program,
    points: Vec<(&'static str, InstrIndex)>,
}

impl Scenario {
    fn new(program: Program, points: Vec<(&'static str, InstrIndex)>) -> Self {
        Self { program, points }
    }

    /// Position recorded under `name`.
    pub fn at(&self, name: &str) -> InstrIndex {
        self.points
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, at)| *at)
            .unwrap_or_else(|| panic!("no point named {name}"))
    }

    pub fn var(&self, name: &str) -> VarPath {
        let var = self
            .program
            .variable_named(name)
            .unwrap_or_else(|| panic!("no variable named {name}"));
        VarPath::new(var)
    }

    pub fn ty(&self, name: &str) -> TypeId {
        self.program
            .types()
            .by_name(name)
            .unwrap_or_else(|| panic!("no type named {name}"))
    }
}

/// `Object`, the exception hierarchy and two unrelated interfaces `A`, `B`.
pub fn hierarchy() -> TypeTable {
    let mut types = TypeTable::new();
    let object = types.class("Object", &[]);
    let exception = types.class("Exception", &[object]);
    types.class("IOException", &[exception]);
    let runtime = types.class("RuntimeException", &[exception]);
    types.class("ClassCastException", &[runtime]);
    types.interface("A", &[]);
    types.interface("B", &[]);
    types
}

fn builder() -> ProgramBuilder {
    ProgramBuilder::new(hierarchy())
}

fn ty(b: &ProgramBuilder, name: &str) -> TypeId {
    b.types().by_name(name).unwrap()
}

/// `if (x == null) return; use(x);`
pub fn null_check_then_use() -> Scenario {
    let mut b = builder();
    let x = b.param("x", Nullability::Unknown);
    let early = b.label();
    b.push_var(x);
    b.branch(Condition::IsNull, early);
    let use_site = b.push_var(x);
    let deref = b.deref(None);
    b.ret();
    b.bind(early).unwrap();
    let early_return = b.ret();
    Scenario::new(
        b.finish().unwrap(),
        vec![("use", use_site), ("deref", deref), ("early_return", early_return)],
    )
}

/// `try { call() /* throws IOException */ } finally { }`
pub fn finally_with_throwing_call() -> Scenario {
    let mut b = builder();
    let io = ty(&b, "IOException");
    let cleanup = b.label();
    let after = b.label();
    b.try_finally(cleanup, after);
    let call = b.call(CallSpec::builder().throws(vec![io]).build());
    let leave = b.jump(after, 0);
    b.bind(cleanup).unwrap();
    let cleanup_entry = b.inside_finally();
    b.pop_trap();
    let end = b.end_finally();
    b.bind(after).unwrap();
    let resumed = b.ret();
    Scenario::new(
        b.finish().unwrap(),
        vec![
            ("call", call),
            ("leave", leave),
            ("cleanup", cleanup_entry),
            ("end_finally", end),
            ("after", resumed),
        ],
    )
}

/// `try { throw new IOException(); } catch (IOException e) {} catch (Exception e) {}`
pub fn specific_then_ancestor_handler() -> Scenario {
    let mut b = builder();
    let io = ty(&b, "IOException");
    let exception = ty(&b, "Exception");
    let e = b.local("e");
    let on_io = b.label();
    let on_exception = b.label();
    b.try_catch(vec![catch(io, e, on_io), catch(exception, e, on_exception)]);
    b.push_new(io);
    let throw = b.throw();
    b.bind(on_io).unwrap();
    let io_handler = b.ret();
    b.bind(on_exception).unwrap();
    let exception_handler = b.ret();
    Scenario::new(
        b.finish().unwrap(),
        vec![
            ("throw", throw),
            ("io_handler", io_handler),
            ("exception_handler", exception_handler),
        ],
    )
}

/// `try { try { throw new Exception(); } finally { } } finally { }`
pub fn nested_finally() -> Scenario {
    let mut b = builder();
    let exception = ty(&b, "Exception");
    let outer_cleanup = b.label();
    let end = b.label();
    let inner_cleanup = b.label();
    let inner_after = b.label();

    b.try_finally(outer_cleanup, end);
    b.try_finally(inner_cleanup, inner_after);
    b.push_new(exception);
    let throw = b.throw();

    b.bind(inner_cleanup).unwrap();
    let inner_entry = b.inside_finally();
    b.pop_trap();
    let inner_end = b.end_finally();

    b.bind(inner_after).unwrap();
    let inner_resume = b.jump(end, 0);

    b.bind(outer_cleanup).unwrap();
    let outer_entry = b.inside_finally();
    b.pop_trap();
    b.end_finally();

    b.bind(end).unwrap();
    let resumed = b.ret();
    Scenario::new(
        b.finish().unwrap(),
        vec![
            ("throw", throw),
            ("inner_cleanup", inner_entry),
            ("inner_end", inner_end),
            ("inner_resume", inner_resume),
            ("outer_cleanup", outer_entry),
            ("end", resumed),
        ],
    )
}

/// `if (x instanceof A) {} else if (x instanceof B) {} else return; use(x);`
pub fn unrelated_instanceof_join() -> Scenario {
    let mut b = builder();
    let a = ty(&b, "A");
    let bt = ty(&b, "B");
    let x = b.param("x", Nullability::Unknown);
    let is_a = b.label();
    let is_b = b.label();
    let join = b.label();

    b.push_var(x);
    b.branch(Condition::InstanceOf(a), is_a);
    b.push_var(x);
    b.branch(Condition::InstanceOf(bt), is_b);
    b.ret();
    b.bind(is_a).unwrap();
    b.goto(join);
    b.bind(is_b).unwrap();
    b.goto(join);
    b.bind(join).unwrap();
    let joined = b.push_var(x);
    b.deref(None);
    b.ret();
    Scenario::new(b.finish().unwrap(), vec![("join", joined)])
}

/// `try { throw new IOException(); } finally { return null; }`
pub fn return_in_finally() -> Scenario {
    let mut b = builder();
    let io = ty(&b, "IOException");
    let cleanup = b.label();
    let after = b.label();
    b.try_finally(cleanup, after);
    b.push_new(io);
    b.throw();
    b.bind(cleanup).unwrap();
    b.inside_finally();
    b.push_null();
    let early_return = b.ret();
    b.pop_trap();
    let end = b.end_finally();
    b.bind(after).unwrap();
    b.ret();
    Scenario::new(
        b.finish().unwrap(),
        vec![("return", early_return), ("end_finally", end)],
    )
}

/// `while (x != null) { x.use(); x = next(); }`
pub fn null_terminated_loop() -> Scenario {
    let mut b = builder();
    let x = b.param("x", Nullability::Unknown);
    let done = b.label();
    let head = b.here();
    b.push_var(x);
    b.branch(Condition::IsNull, done);
    b.push_var(x);
    let deref = b.deref(None);
    b.push_unknown(None, Nullability::Unknown);
    b.store(x);
    b.goto(head);
    b.bind(done).unwrap();
    let exit_loop = b.ret();
    Scenario::new(
        b.finish().unwrap(),
        vec![("head", InstrIndex::new(0)), ("deref", deref), ("done", exit_loop)],
    )
}

/// `y = (IOException) x; return y;`
pub fn checked_cast() -> Scenario {
    let mut b = builder();
    let io = ty(&b, "IOException");
    let cce = ty(&b, "ClassCastException");
    let x = b.param("x", Nullability::NotNull);
    let y = b.local("y");
    b.push_var(x);
    let cast = b.cast(io, Some(cce));
    let stored = b.store(y);
    b.push_var(y);
    let ret = b.ret();
    Scenario::new(
        b.finish().unwrap(),
        vec![("cast", cast), ("store", stored), ("return", ret)],
    )
}
