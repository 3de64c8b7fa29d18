use std::hash::{Hash, Hasher};
use std::sync::Arc;

use nullflow_ir::Trap;

struct Node {
    trap: Trap,
    len: usize,
    rest: TrapStack,
}

/// Persistent stack of active protected regions, innermost first.
///
/// Push and pop are O(1) and never copy the tail, so the per-branch copies of
/// a [`MemoryState`](crate::MemoryState) share their trap stacks.
#[derive(Clone, Default)]
pub struct TrapStack(Option<Arc<Node>>);

impl TrapStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, trap: Trap) -> Self {
        TrapStack(Some(Arc::new(Node {
            trap,
            len: self.len() + 1,
            rest: self.clone(),
        })))
    }

    /// The innermost trap and the stack below it.
    pub fn pop(&self) -> Option<(&Trap, TrapStack)> {
        self.0.as_ref().map(|node| (&node.trap, node.rest.clone()))
    }

    pub fn top(&self) -> Option<&Trap> {
        self.0.as_ref().map(|node| &node.trap)
    }

    pub fn len(&self) -> usize {
        self.0.as_ref().map_or(0, |node| node.len)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter { next: self }
    }
}

pub struct Iter<'a> {
    next: &'a TrapStack,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Trap;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.next.0.as_ref()?;
        self.next = &node.rest;
        Some(&node.trap)
    }
}

impl PartialEq for TrapStack {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Some(a), Some(b)) if Arc::ptr_eq(a, b) => true,
            _ => self.len() == other.len() && self.iter().eq(other.iter()),
        }
    }
}

impl Eq for TrapStack {}

impl Hash for TrapStack {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.len().hash(state);
        for trap in self.iter() {
            trap.hash(state);
        }
    }
}

impl std::fmt::Debug for TrapStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl std::fmt::Display for TrapStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[")?;
        for (i, trap) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{trap}")?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use nullflow_ir::InstrIndex;

    use super::*;

    #[test]
    fn push_and_pop_share_the_tail() {
        let outer = TrapStack::new().push(Trap::TryFinally {
            cleanup: InstrIndex::new(3),
            resume: InstrIndex::new(7),
        });
        let inner = outer.push(Trap::InsideFinally);
        assert_eq!(inner.len(), 2);
        insta::assert_snapshot!(inner.to_string(), @"[inside_finally, try_finally(cleanup=@3, resume=@7)]");

        let (top, rest) = inner.pop().unwrap();
        assert_eq!(top, &Trap::InsideFinally);
        assert_eq!(rest, outer);
        assert!(TrapStack::new().pop().is_none());
    }

    #[test]
    fn equality_is_structural() {
        let a = TrapStack::new().push(Trap::InsideFinally);
        let b = TrapStack::new().push(Trap::InsideFinally);
        assert_eq!(a, b);
        assert_ne!(a, TrapStack::new());
    }
}
