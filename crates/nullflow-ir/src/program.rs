use std::fmt::Write;

use crate::instruction::mnemonic;
use crate::{
    BuildError, Condition, InstrIndex, Instruction, Nullability, Operand, Trap, TypeId, TypeTable,
    VarId, VarPath,
};

#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VarKind {
    #[default]
    Local,
    Parameter,
    /// Heap location; invalidated by calls with unknown side effects.
    Field,
    /// Introduced by lowering, e.g. a temporary.
    Synthetic,
}

/// Declaration of a variable the method body refers to.
#[derive(Clone, Debug, PartialEq, Eq, bon::Builder)]
pub struct VariableInfo {
    #[builder(into)]
    pub name: String,
    #[builder(default)]
    pub kind: VarKind,
    /// Declared nullability, e.g. from an annotation. Every state starts from it.
    #[builder(default)]
    pub nullability: Nullability,
}

/// A validated, immutable instruction stream together with the variables and
/// types it refers to.
#[derive(Clone, Debug)]
pub struct Program {
    instructions: Vec<Instruction>,
    variables: Vec<VariableInfo>,
    types: TypeTable,
    exit: InstrIndex,
    predecessors: Vec<usize>,
    joins: Vec<bool>,
}

impl Program {
    pub fn new(
        instructions: Vec<Instruction>,
        variables: Vec<VariableInfo>,
        types: TypeTable,
    ) -> Result<Self, BuildError> {
        if instructions.is_empty() {
            return Err(BuildError::EmptyProgram);
        }
        let len = instructions.len();

        let mut exit = None;
        for (idx, instr) in instructions.iter().enumerate() {
            if instr.is_terminal() {
                match exit {
                    None => exit = Some(InstrIndex(idx)),
                    Some(first) => return Err(BuildError::MultipleExits(first, InstrIndex(idx))),
                }
            }
        }
        let exit = exit.ok_or(BuildError::MissingExit)?;

        let mut predecessors = vec![0usize; len];
        let mut joins = vec![false; len];
        // Method entry.
        predecessors[0] = 1;
        for (idx, instr) in instructions.iter().enumerate() {
            let at = InstrIndex(idx);
            for succ in instr.successors(at, exit) {
                if succ.0 >= len {
                    return Err(BuildError::TargetOutOfRange {
                        at,
                        target: succ,
                        len,
                    });
                }
                predecessors[succ.0] += 1;
            }
            // Handler and cleanup entries are reached from every throwing
            // point in their region.
            if let Instruction::PushTrap(trap) = instr {
                match trap {
                    Trap::TryCatch { clauses } => {
                        for clause in clauses {
                            joins[clause.target.0] = true;
                        }
                    }
                    Trap::TryFinally { cleanup, resume } => {
                        joins[cleanup.0] = true;
                        joins[resume.0] = true;
                    }
                    Trap::InsideFinally => {}
                }
            }
        }
        for (idx, count) in predecessors.iter().enumerate() {
            if *count > 1 {
                joins[idx] = true;
            }
        }

        Ok(Self {
            instructions,
            variables,
            types,
            exit,
            predecessors,
            joins,
        })
    }

    /// Replace the computed join set with one supplied by the instruction builder.
    pub fn with_join_points(mut self, joins: impl IntoIterator<Item = InstrIndex>) -> Self {
        self.joins = vec![false; self.instructions.len()];
        for idx in joins {
            if let Some(flag) = self.joins.get_mut(idx.0) {
                *flag = true;
            }
        }
        self
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn instruction(&self, idx: InstrIndex) -> Option<&Instruction> {
        self.instructions.get(idx.0)
    }

    pub fn instructions(&self) -> impl Iterator<Item = (InstrIndex, &Instruction)> {
        self.instructions
            .iter()
            .enumerate()
            .map(|(idx, instr)| (InstrIndex(idx), instr))
    }

    pub fn successors(&self, idx: InstrIndex) -> impl Iterator<Item = InstrIndex> + '_ {
        self.instruction(idx)
            .map(|instr| instr.successors(idx, self.exit))
            .unwrap_or_default()
            .into_iter()
    }

    /// Number of static predecessors.
    pub fn predecessor_count(&self, idx: InstrIndex) -> usize {
        self.predecessors.get(idx.0).copied().unwrap_or(0)
    }

    pub fn is_join(&self, idx: InstrIndex) -> bool {
        self.joins.get(idx.0).copied().unwrap_or(false)
    }

    pub fn join_points(&self) -> impl Iterator<Item = InstrIndex> + '_ {
        self.joins
            .iter()
            .enumerate()
            .filter(|(_, j)| **j)
            .map(|(idx, _)| InstrIndex(idx))
    }

    pub fn exit(&self) -> InstrIndex {
        self.exit
    }

    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    pub fn variable(&self, var: VarId) -> Option<&VariableInfo> {
        self.variables.get(var.0)
    }

    pub fn variables(&self) -> impl Iterator<Item = (VarId, &VariableInfo)> {
        self.variables
            .iter()
            .enumerate()
            .map(|(idx, info)| (VarId(idx), info))
    }

    /// Look a variable up by its declared name.
    pub fn variable_named(&self, name: &str) -> Option<VarId> {
        self.variables
            .iter()
            .position(|v| v.name == name)
            .map(VarId)
    }

    pub fn var_name(&self, var: VarId) -> &str {
        self.variable(var).map(|v| v.name.as_str()).unwrap_or("?")
    }

    pub fn path_name(&self, path: &VarPath) -> String {
        let names: Vec<&str> = path
            .components()
            .iter()
            .map(|v| self.var_name(*v))
            .collect();
        names.join(".")
    }

    fn type_name(&self, ty: TypeId) -> &str {
        self.types.name(ty)
    }

    fn write_instruction(&self, out: &mut String, instr: &Instruction) -> std::fmt::Result {
        match instr {
            Instruction::Push(op) => match op {
                Operand::Var(path) => write!(out, "push {}", self.path_name(path)),
                Operand::Const(c) => write!(out, "push {c}"),
                Operand::New(ty) => write!(out, "push new {}", self.type_name(*ty)),
                Operand::Unknown { ty, nullability } => match ty {
                    Some(ty) => write!(out, "push ?{}:{nullability}", self.type_name(*ty)),
                    None => write!(out, "push ?:{nullability}"),
                },
            },
            Instruction::Pop => out.write_str("pop"),
            Instruction::Dup => out.write_str("dup"),
            Instruction::Store(path) => write!(out, "store {}", self.path_name(path)),
            Instruction::Goto(target) => write!(out, "goto {target}"),
            Instruction::Branch { cond, target } => match cond {
                Condition::InstanceOf(ty) => {
                    write!(out, "{} {} {target}", mnemonic(*cond), self.type_name(*ty))
                }
                _ => write!(out, "{} {target}", mnemonic(*cond)),
            },
            Instruction::Deref { exception } => match exception {
                Some(ty) => write!(out, "deref throws {}", self.type_name(*ty)),
                None => out.write_str("deref"),
            },
            Instruction::Cast { ty, exception } => {
                write!(out, "cast {}", self.type_name(*ty))?;
                if let Some(exc) = exception {
                    write!(out, " throws {}", self.type_name(*exc))?;
                }
                Ok(())
            }
            Instruction::Call(spec) => {
                write!(out, "call/{}", spec.args)?;
                if spec.pure {
                    out.write_str(" pure")?;
                }
                if let Some(result) = &spec.result {
                    match result.ty {
                        Some(ty) => write!(out, " -> {}:{}", self.type_name(ty), result.nullability)?,
                        None => write!(out, " -> {}", result.nullability)?,
                    }
                }
                for exc in &spec.throws {
                    write!(out, " throws {}", self.type_name(*exc))?;
                }
                Ok(())
            }
            Instruction::Box => out.write_str("box"),
            Instruction::Unbox => out.write_str("unbox"),
            Instruction::Throw => out.write_str("throw"),
            Instruction::Return => out.write_str("return"),
            Instruction::Jump {
                target,
                depth,
                flush,
            } => {
                write!(out, "jump {target} depth={depth}")?;
                for path in flush {
                    write!(out, " flush {}", self.path_name(path))?;
                }
                Ok(())
            }
            Instruction::PushTrap(trap) => match trap {
                Trap::TryCatch { clauses } => {
                    out.write_str("push_trap try_catch(")?;
                    for (i, clause) in clauses.iter().enumerate() {
                        if i > 0 {
                            out.write_str(", ")?;
                        }
                        let types: Vec<&str> =
                            clause.types.iter().map(|t| self.type_name(*t)).collect();
                        write!(out, "{}", types.join("|"))?;
                        if let Some(param) = clause.param {
                            write!(out, " {}", self.var_name(param))?;
                        }
                        write!(out, " -> {}", clause.target)?;
                    }
                    out.write_str(")")
                }
                other => write!(out, "push_trap {other}"),
            },
            Instruction::PopTrap => out.write_str("pop_trap"),
            Instruction::EndFinally => out.write_str("end_finally"),
            Instruction::Exit => out.write_str("exit"),
        }
    }

    /// Render one instruction with variable and type names resolved.
    pub fn render(&self, idx: InstrIndex) -> String {
        let mut out = String::new();
        if let Some(instr) = self.instruction(idx) {
            let _ = self.write_instruction(&mut out, instr);
        }
        out
    }
}

impl std::fmt::Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (idx, _) in self.instructions() {
            if idx.0 > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{idx}: {}", self.render(idx))?;
        }
        Ok(())
    }
}
