//! Opaque ID newtypes.
//!
//! Every entity of a [`Module`](crate::Module) is referenced by a `Copy`
//! `u32` handle: values and blocks are local to one function, functions,
//! globals and types are module-wide. A `NONE` sentinel (`u32::MAX`) marks
//! an absent id where an `Option` would be awkward.

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Sentinel for "no id".
            pub const NONE: Self = Self(u32::MAX);

            #[inline]
            pub const fn from_raw(raw: u32) -> Self {
                Self(raw)
            }

            #[inline]
            pub const fn raw(self) -> u32 {
                self.0
            }

            #[inline]
            pub const fn index(self) -> usize {
                self.0 as usize
            }

            #[inline]
            pub const fn is_none(self) -> bool {
                self.0 == u32::MAX
            }

            pub(crate) fn from_len(len: usize) -> Self {
                Self(u32::try_from(len).unwrap_or(u32::MAX - 1))
            }
        }
    };
}

define_id!(
    /// SSA value within one function. Parameters are values `0..n`.
    ValueId
);
define_id!(
    /// Basic block within one function. The entry block is block 0.
    BlockId
);
define_id!(
    /// Function in a module (defined or external).
    FuncId
);
define_id!(
    /// Global variable in a module (defined or external).
    GlobalId
);
define_id!(
    /// Interned low-level type.
    TyId
);
