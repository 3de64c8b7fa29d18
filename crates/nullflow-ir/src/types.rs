use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::TypeId;

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TypeKind {
    Class,
    /// A class that cannot be subclassed.
    FinalClass,
    Interface,
}

#[derive(Clone, Debug)]
pub struct TypeInfo {
    name: String,
    kind: TypeKind,
    supertypes: SmallVec<[TypeId; 2]>,
}

impl TypeInfo {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    pub fn supertypes(&self) -> &[TypeId] {
        &self.supertypes
    }
}

/// The runtime type hierarchy the analyzed method is checked against.
///
/// Types are registered supertypes-first, so the hierarchy is acyclic by
/// construction.
#[derive(Clone, Debug, Default)]
pub struct TypeTable {
    types: Vec<TypeInfo>,
    by_name: FxHashMap<String, TypeId>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type. Re-registering a name returns the existing id.
    pub fn declare(
        &mut self,
        name: impl Into<String>,
        kind: TypeKind,
        supertypes: &[TypeId],
    ) -> TypeId {
        let name = name.into();
        if let Some(&id) = self.by_name.get(&name) {
            return id;
        }
        let id = TypeId(self.types.len());
        self.types.push(TypeInfo {
            name: name.clone(),
            kind,
            supertypes: supertypes.iter().copied().collect(),
        });
        self.by_name.insert(name, id);
        id
    }

    pub fn class(&mut self, name: impl Into<String>, supertypes: &[TypeId]) -> TypeId {
        self.declare(name, TypeKind::Class, supertypes)
    }

    pub fn final_class(&mut self, name: impl Into<String>, supertypes: &[TypeId]) -> TypeId {
        self.declare(name, TypeKind::FinalClass, supertypes)
    }

    pub fn interface(&mut self, name: impl Into<String>, supertypes: &[TypeId]) -> TypeId {
        self.declare(name, TypeKind::Interface, supertypes)
    }

    pub fn get(&self, id: TypeId) -> Option<&TypeInfo> {
        self.types.get(id.0)
    }

    pub fn by_name(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    pub fn name(&self, id: TypeId) -> &str {
        self.get(id).map(TypeInfo::name).unwrap_or("?")
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Reflexive, transitive subtype test.
    pub fn is_subtype(&self, sub: TypeId, sup: TypeId) -> bool {
        if sub == sup {
            return true;
        }
        let mut pending: SmallVec<[TypeId; 8]> = SmallVec::new();
        let mut seen = vec![false; self.types.len()];
        pending.push(sub);
        while let Some(ty) = pending.pop() {
            let Some(info) = self.get(ty) else { continue };
            for &parent in &info.supertypes {
                if parent == sup {
                    return true;
                }
                if let Some(flag) = seen.get_mut(parent.0) {
                    if !*flag {
                        *flag = true;
                        pending.push(parent);
                    }
                }
            }
        }
        false
    }

    /// `true` when no runtime value can be an instance of both types.
    pub fn are_disjoint(&self, a: TypeId, b: TypeId) -> bool {
        if self.is_subtype(a, b) || self.is_subtype(b, a) {
            return false;
        }
        let (Some(ka), Some(kb)) = (self.get(a).map(|t| t.kind), self.get(b).map(|t| t.kind))
        else {
            return false;
        };
        match (ka, kb) {
            (TypeKind::Interface, TypeKind::Interface) => false,
            (TypeKind::FinalClass, _) | (_, TypeKind::FinalClass) => true,
            (TypeKind::Interface, TypeKind::Class) | (TypeKind::Class, TypeKind::Interface) => false,
            (TypeKind::Class, TypeKind::Class) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hierarchy() -> (TypeTable, [TypeId; 6]) {
        let mut t = TypeTable::new();
        let object = t.class("Object", &[]);
        let closeable = t.interface("Closeable", &[]);
        let throwable = t.class("Throwable", &[object]);
        let io = t.class("IOException", &[throwable, closeable]);
        let runtime = t.class("RuntimeException", &[throwable]);
        let npe = t.final_class("NullPointerException", &[runtime]);
        (t, [object, closeable, throwable, io, runtime, npe])
    }

    #[test]
    fn subtyping_is_transitive() {
        let (t, [object, closeable, throwable, io, _, npe]) = hierarchy();
        assert!(t.is_subtype(npe, object));
        assert!(t.is_subtype(io, closeable));
        assert!(t.is_subtype(throwable, throwable));
        assert!(!t.is_subtype(throwable, io));
    }

    #[test]
    fn disjointness() {
        let (t, [object, closeable, _, io, runtime, npe]) = hierarchy();
        assert!(t.are_disjoint(io, runtime));
        assert!(!t.are_disjoint(object, io));
        assert!(!t.are_disjoint(closeable, runtime));
        assert!(t.are_disjoint(closeable, npe));
    }
}
