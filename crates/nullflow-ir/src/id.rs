/// Key types usable with [`InternTable`](crate::InternTable).
pub trait InternKey:
    From<usize> + Into<usize> + Clone + Copy + PartialEq + Eq + std::hash::Hash
{
}

impl InternKey for usize {}

/// Declare a dense `usize`-backed identifier.
///
/// The generated type is ordered, hashable, convertible from and into
/// `usize`, and usable as an [`InternKey`].
#[macro_export]
macro_rules! identifier {
    ($(#[$attr:meta])* struct $name:ident) => {
        $(#[$attr])*
        #[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
        pub struct $name(pub(crate) usize);

        impl $name {
            pub fn new(raw: usize) -> Self {
                Self(raw)
            }

            /// return raw ID as usize
            pub fn raw(self) -> usize {
                self.0
            }
        }

        impl From<usize> for $name {
            fn from(value: usize) -> Self {
                Self(value)
            }
        }

        impl From<$name> for usize {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl $crate::InternKey for $name {}
    };
}

identifier! {
    /// Position of an instruction in a [`Program`](crate::Program).
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    struct InstrIndex
}

identifier! {
    /// A variable declared by a [`Program`](crate::Program): local, parameter or field.
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    struct VarId
}

identifier! {
    /// A runtime type registered in a [`TypeTable`](crate::TypeTable).
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    struct TypeId
}

identifier! {
    /// A symbolic jump target, resolved to an [`InstrIndex`] by the
    /// [`ProgramBuilder`](crate::ProgramBuilder).
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    struct Label
}

impl InstrIndex {
    /// The instruction that follows this one in the stream.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for InstrIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{}", self.0)
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}", self.0)
    }
}
