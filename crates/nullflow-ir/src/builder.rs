use smallvec::SmallVec;

use crate::{
    BuildError, CallSpec, CatchClause, Condition, Constant, InstrIndex, Instruction, Label,
    Nullability, Operand, Program, Trap, TypeId, TypeTable, VarId, VarKind, VarPath, VariableInfo,
};

/// Incrementally assembles a [`Program`] with symbolic jump targets.
///
/// Labels may be referenced before they are bound. [`finish`](Self::finish)
/// appends the `exit` instruction, so a label bound after the last emitted
/// instruction refers to it.
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    types: TypeTable,
    variables: Vec<VariableInfo>,
    instructions: Vec<Instruction<Label>>,
    labels: Vec<Option<InstrIndex>>,
}

impl ProgramBuilder {
    pub fn new(types: TypeTable) -> Self {
        Self {
            types,
            ..Self::default()
        }
    }

    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    pub fn types_mut(&mut self) -> &mut TypeTable {
        &mut self.types
    }

    // -- Variables ----------------------------------------------------------

    pub fn variable(&mut self, info: VariableInfo) -> VarId {
        self.variables.push(info);
        VarId(self.variables.len() - 1)
    }

    pub fn local(&mut self, name: &str) -> VarId {
        self.variable(VariableInfo::builder().name(name).build())
    }

    pub fn param(&mut self, name: &str, nullability: Nullability) -> VarId {
        self.variable(
            VariableInfo::builder()
                .name(name)
                .kind(VarKind::Parameter)
                .nullability(nullability)
                .build(),
        )
    }

    pub fn field(&mut self, name: &str) -> VarId {
        self.variable(
            VariableInfo::builder()
                .name(name)
                .kind(VarKind::Field)
                .build(),
        )
    }

    // -- Labels -------------------------------------------------------------

    pub fn label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind `label` to the position of the next emitted instruction.
    pub fn bind(&mut self, label: Label) -> Result<(), BuildError> {
        let position = InstrIndex(self.instructions.len());
        match self.labels.get_mut(label.0) {
            Some(Some(bound)) => Err(BuildError::LabelRebound(label, *bound)),
            Some(slot) => {
                *slot = Some(position);
                Ok(())
            }
            None => Err(BuildError::UnboundLabel(label)),
        }
    }

    /// A fresh label bound to the next emitted instruction.
    pub fn here(&mut self) -> Label {
        self.labels.push(Some(InstrIndex(self.instructions.len())));
        Label(self.labels.len() - 1)
    }

    // -- Instructions -------------------------------------------------------

    pub fn emit(&mut self, instr: Instruction<Label>) -> InstrIndex {
        self.instructions.push(instr);
        InstrIndex(self.instructions.len() - 1)
    }

    /// Position the next emitted instruction will take.
    pub fn position(&self) -> InstrIndex {
        InstrIndex(self.instructions.len())
    }

    pub fn push_var(&mut self, path: impl Into<VarPath>) -> InstrIndex {
        self.emit(Instruction::Push(Operand::Var(path.into())))
    }

    pub fn push_const(&mut self, constant: Constant) -> InstrIndex {
        self.emit(Instruction::Push(Operand::Const(constant)))
    }

    pub fn push_null(&mut self) -> InstrIndex {
        self.push_const(Constant::Null)
    }

    pub fn push_new(&mut self, ty: TypeId) -> InstrIndex {
        self.emit(Instruction::Push(Operand::New(ty)))
    }

    pub fn push_unknown(&mut self, ty: Option<TypeId>, nullability: Nullability) -> InstrIndex {
        self.emit(Instruction::Push(Operand::Unknown { ty, nullability }))
    }

    pub fn store(&mut self, path: impl Into<VarPath>) -> InstrIndex {
        self.emit(Instruction::Store(path.into()))
    }

    pub fn pop(&mut self) -> InstrIndex {
        self.emit(Instruction::Pop)
    }

    pub fn dup(&mut self) -> InstrIndex {
        self.emit(Instruction::Dup)
    }

    pub fn goto(&mut self, target: Label) -> InstrIndex {
        self.emit(Instruction::Goto(target))
    }

    pub fn branch(&mut self, cond: Condition, target: Label) -> InstrIndex {
        self.emit(Instruction::Branch { cond, target })
    }

    pub fn deref(&mut self, exception: Option<TypeId>) -> InstrIndex {
        self.emit(Instruction::Deref { exception })
    }

    pub fn cast(&mut self, ty: TypeId, exception: Option<TypeId>) -> InstrIndex {
        self.emit(Instruction::Cast { ty, exception })
    }

    pub fn call(&mut self, spec: CallSpec) -> InstrIndex {
        self.emit(Instruction::Call(spec))
    }

    /// Box the value on top of the stack.
    pub fn box_value(&mut self) -> InstrIndex {
        self.emit(Instruction::Box)
    }

    pub fn unbox_value(&mut self) -> InstrIndex {
        self.emit(Instruction::Unbox)
    }

    pub fn throw(&mut self) -> InstrIndex {
        self.emit(Instruction::Throw)
    }

    pub fn ret(&mut self) -> InstrIndex {
        self.emit(Instruction::Return)
    }

    pub fn jump(&mut self, target: Label, depth: usize) -> InstrIndex {
        self.emit(Instruction::Jump {
            target,
            depth,
            flush: Vec::new(),
        })
    }

    pub fn try_catch(&mut self, clauses: Vec<CatchClause<Label>>) -> InstrIndex {
        self.emit(Instruction::PushTrap(Trap::TryCatch { clauses }))
    }

    pub fn try_finally(&mut self, cleanup: Label, resume: Label) -> InstrIndex {
        self.emit(Instruction::PushTrap(Trap::TryFinally { cleanup, resume }))
    }

    pub fn inside_finally(&mut self) -> InstrIndex {
        self.emit(Instruction::PushTrap(Trap::InsideFinally))
    }

    pub fn pop_trap(&mut self) -> InstrIndex {
        self.emit(Instruction::PopTrap)
    }

    pub fn end_finally(&mut self) -> InstrIndex {
        self.emit(Instruction::EndFinally)
    }

    /// Resolve labels, append `exit` and validate the result.
    pub fn finish(mut self) -> Result<Program, BuildError> {
        self.instructions.push(Instruction::Exit);
        let labels = self.labels;
        let mut resolve = |label: Label| -> Result<InstrIndex, BuildError> {
            labels
                .get(label.0)
                .copied()
                .flatten()
                .ok_or(BuildError::UnboundLabel(label))
        };
        let instructions = self
            .instructions
            .into_iter()
            .map(|instr| instr.map_targets(&mut resolve))
            .collect::<Result<Vec<_>, _>>()?;
        Program::new(instructions, self.variables, self.types)
    }
}

/// Shorthand for a single-type catch clause.
pub fn catch(ty: TypeId, param: VarId, target: Label) -> CatchClause<Label> {
    CatchClause {
        types: SmallVec::from_elem(ty, 1),
        param: Some(param),
        target,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_resolve_forward_and_backward() {
        let mut b = ProgramBuilder::default();
        let x = b.local("x");
        let top = b.here();
        let end = b.label();
        b.push_var(x);
        b.branch(Condition::IsNull, end);
        b.goto(top);
        b.bind(end).unwrap();
        b.ret();
        let program = b.finish().unwrap();

        insta::assert_snapshot!(
            program.to_string().replace('\n', " | "),
            @"@0: push x | @1: if_null @3 | @2: goto @0 | @3: return | @4: exit"
        );
        assert!(program.is_join(InstrIndex(0)));
        assert!(!program.is_join(InstrIndex(3)));
        assert_eq!(program.exit(), InstrIndex(4));
    }

    #[test]
    fn unbound_label_is_reported() {
        let mut b = ProgramBuilder::default();
        let nowhere = b.label();
        b.goto(nowhere);
        assert_eq!(b.finish().unwrap_err(), BuildError::UnboundLabel(nowhere));
    }

    #[test]
    fn rebinding_a_label_fails() {
        let mut b = ProgramBuilder::default();
        let l = b.here();
        b.pop();
        assert_eq!(b.bind(l), Err(BuildError::LabelRebound(l, InstrIndex(0))));
    }

    #[test]
    fn handler_and_cleanup_entries_are_joins() {
        let mut types = TypeTable::new();
        let exc = types.class("Exception", &[]);
        let mut b = ProgramBuilder::new(types);
        let e = b.local("e");
        let handler = b.label();
        let done = b.label();
        b.try_catch(vec![catch(exc, e, handler)]);
        b.call(CallSpec::builder().throws(vec![exc]).build());
        b.pop_trap();
        b.goto(done);
        b.bind(handler).unwrap();
        b.push_var(e);
        b.pop();
        b.bind(done).unwrap();
        b.ret();
        let program = b.finish().unwrap();

        assert!(program.is_join(InstrIndex(4)));
        assert_eq!(
            program.render(InstrIndex(0)),
            "push_trap try_catch(Exception e -> @4)"
        );
    }
}
