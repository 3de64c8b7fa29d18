use std::collections::BTreeSet;

use nullflow_ir::{
    Constant, InstrIndex, InternTable, Nullability, Program, TypeTable, VarId, VarKind, VarPath,
};

use crate::{ControlTransfer, FactSet, Problem};

nullflow_ir::identifier! {
    /// Identity of an interned [`Value`], stable for one run.
    struct ValueId
}

impl std::fmt::Display for ValueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A semantic value the analysis reasons about.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum Value {
    /// A variable, or a field of the object held by `qualifier`.
    Variable {
        var: VarId,
        qualifier: Option<ValueId>,
    },
    Constant(Constant),
    /// Some value satisfying these facts: an allocation, a call result or a
    /// thrown exception. Assertions of different origins are different
    /// values even when their facts agree.
    TypeAssertion { facts: FactSet, origin: Origin },
    Boxed(ValueId),
    /// A transfer suspended while a cleanup block runs.
    ControlTransfer(ControlTransfer),
}

/// Where a [`Value::TypeAssertion`] was made.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Origin {
    /// Produced by the instruction at this index.
    At(InstrIndex),
    /// Stands for what this value was before it was flushed or narrowed.
    From(ValueId),
    /// Synthesized while resolving a transfer.
    Engine,
}

impl Value {
    /// Fact carriers stand for "some value" rather than one identity, so
    /// uniting with one applies its facts instead of recording an equality.
    pub fn is_fact_carrier(&self) -> bool {
        matches!(
            self,
            Value::TypeAssertion { .. }
                | Value::Boxed(_)
                | Value::ControlTransfer(_)
                | Value::Constant(Constant::Null)
        )
    }
}

/// Interning table for [`Value`]s.
#[derive(Clone, Debug, Default)]
pub struct ValueStore {
    table: InternTable<Value, ValueId>,
}

impl ValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, value: Value) -> ValueId {
        self.table.intern(value)
    }

    pub fn get(&self, id: ValueId) -> Option<&Value> {
        self.table.resolve(id)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn variable(&mut self, var: VarId) -> ValueId {
        self.intern(Value::Variable {
            var,
            qualifier: None,
        })
    }

    /// Intern every link of an access chain and return the last one.
    pub fn path(&mut self, path: &VarPath) -> ValueId {
        let mut qualifier = None;
        for var in path.components() {
            qualifier = Some(self.intern(Value::Variable {
                var: *var,
                qualifier,
            }));
        }
        // A path always has a root.
        qualifier.unwrap_or_else(|| self.variable(path.root()))
    }

    /// Like [`path`](Self::path) but never interns.
    pub fn find_path(&self, path: &VarPath) -> Option<ValueId> {
        let mut qualifier = None;
        for var in path.components() {
            qualifier = Some(self.table.lookup(&Value::Variable {
                var: *var,
                qualifier,
            })?);
        }
        qualifier
    }

    pub fn constant(&mut self, constant: Constant) -> ValueId {
        self.intern(Value::Constant(constant))
    }

    pub fn assertion(&mut self, facts: FactSet) -> ValueId {
        self.intern(Value::TypeAssertion {
            facts,
            origin: Origin::Engine,
        })
    }

    /// A fresh value made by the instruction at `at`.
    pub fn produced(&mut self, at: InstrIndex, facts: FactSet) -> ValueId {
        self.intern(Value::TypeAssertion {
            facts,
            origin: Origin::At(at),
        })
    }

    /// The value `from` stood for, described by `facts` alone. An assertion
    /// keeps its own origin.
    pub fn derived(&mut self, from: ValueId, facts: FactSet) -> ValueId {
        let origin = match self.get(from) {
            Some(Value::TypeAssertion { origin, .. }) => *origin,
            _ => Origin::From(from),
        };
        self.intern(Value::TypeAssertion { facts, origin })
    }

    /// The value a box wraps.
    pub fn unboxed(&self, id: ValueId) -> Option<ValueId> {
        match self.get(id)? {
            Value::Boxed(inner) => Some(*inner),
            _ => None,
        }
    }

    pub fn boxed(&mut self, inner: ValueId) -> ValueId {
        self.intern(Value::Boxed(inner))
    }

    pub fn transfer(&mut self, transfer: ControlTransfer) -> ValueId {
        self.intern(Value::ControlTransfer(transfer))
    }

    pub fn qualifier(&self, id: ValueId) -> Option<ValueId> {
        match self.get(id)? {
            Value::Variable { qualifier, .. } => *qualifier,
            _ => None,
        }
    }

    /// Number of qualifier hops from `id` to its root variable.
    pub fn depth(&self, id: ValueId) -> usize {
        let mut depth = 0;
        let mut current = id;
        // Chains are acyclic; the bound guards against a corrupted table.
        while let Some(next) = self.qualifier(current) {
            depth += 1;
            if depth > self.len() {
                break;
            }
            current = next;
        }
        depth
    }

    /// Whether `root` appears in the qualifier chain of `id`.
    pub fn is_qualified_by(&self, id: ValueId, root: ValueId) -> bool {
        let mut current = id;
        let mut hops = 0;
        while let Some(next) = self.qualifier(current) {
            if next == root {
                return true;
            }
            hops += 1;
            if hops > self.len() {
                break;
            }
            current = next;
        }
        false
    }
}

/// Everything a step of the analysis reads besides the state itself: the
/// program, the interned values and the problems found so far.
#[derive(Debug)]
pub struct AnalysisContext<'ir> {
    pub program: &'ir Program,
    pub values: ValueStore,
    pub(crate) problems: BTreeSet<Problem>,
}

impl<'ir> AnalysisContext<'ir> {
    pub fn new(program: &'ir Program) -> Self {
        Self {
            program,
            values: ValueStore::new(),
            problems: BTreeSet::new(),
        }
    }

    pub fn types(&self) -> &'ir TypeTable {
        self.program.types()
    }

    pub fn value(&self, id: ValueId) -> Option<&Value> {
        self.values.get(id)
    }

    pub fn is_fact_carrier(&self, id: ValueId) -> bool {
        self.value(id).is_some_and(Value::is_fact_carrier)
    }

    pub fn is_null(&self, id: ValueId) -> bool {
        matches!(self.value(id), Some(Value::Constant(Constant::Null)))
    }

    pub fn is_constant(&self, id: ValueId) -> bool {
        matches!(self.value(id), Some(Value::Constant(_)))
    }

    pub fn is_variable(&self, id: ValueId) -> bool {
        matches!(self.value(id), Some(Value::Variable { .. }))
    }

    pub fn var_kind(&self, id: ValueId) -> Option<VarKind> {
        match self.value(id)? {
            Value::Variable { var, .. } => self.program.variable(*var).map(|info| info.kind),
            _ => None,
        }
    }

    /// Facts a value has before anything is learned about it.
    pub fn default_facts(&self, id: ValueId) -> FactSet {
        match self.value(id) {
            Some(Value::Variable { var, .. }) => FactSet::with_declared(
                self.program
                    .variable(*var)
                    .map_or(Nullability::Unknown, |info| info.nullability),
            ),
            Some(Value::Constant(Constant::Null)) => FactSet::with_declared(Nullability::Null),
            Some(Value::Constant(Constant::Int(v))) => FactSet::int(*v),
            Some(Value::Constant(_)) | Some(Value::Boxed(_)) => {
                FactSet::with_declared(Nullability::NotNull)
            }
            Some(Value::TypeAssertion { facts, .. }) => facts.clone(),
            Some(Value::ControlTransfer(_)) | None => FactSet::default(),
        }
    }

    pub(crate) fn report(&mut self, problem: Problem) {
        self.problems.insert(problem);
    }

    /// Human-readable form of a value: `x.f`, `null`, `new(not-null ...)`.
    pub fn render_value(&self, id: ValueId) -> String {
        match self.value(id) {
            Some(Value::Variable { var, qualifier }) => match qualifier {
                Some(q) => format!("{}.{}", self.render_value(*q), self.program.var_name(*var)),
                None => self.program.var_name(*var).to_string(),
            },
            Some(Value::Constant(c)) => c.to_string(),
            Some(Value::TypeAssertion { facts, .. }) => {
                format!("<{}>", facts.render(self.types()))
            }
            Some(Value::Boxed(inner)) => format!("box({})", self.render_value(*inner)),
            Some(Value::ControlTransfer(ct)) => format!("transfer({})", ct.target),
            None => id.to_string(),
        }
    }
}
