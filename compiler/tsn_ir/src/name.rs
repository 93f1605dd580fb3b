//! Interned identifiers.
//!
//! A [`Name`] is a 4-byte handle into a [`StringInterner`]. Comparing two
//! names is an integer comparison; the string is only materialized for
//! symbol naming and diagnostics.

use std::fmt;

use rustc_hash::FxHashMap;

/// Interned string handle.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(transparent)]
pub struct Name(u32);

impl Name {
    /// The empty string, always interned first.
    pub const EMPTY: Name = Name(0);

    /// Create a name from a raw index.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Name(raw)
    }

    /// Get the raw `u32` value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self.0)
    }
}

/// Single-threaded string interner.
///
/// Compilation of one unit is strictly sequential, so there is no sharding
/// or locking; the interner is owned by the [`Program`](crate::Program).
#[derive(Clone, Debug)]
pub struct StringInterner {
    strings: Vec<Box<str>>,
    map: FxHashMap<Box<str>, Name>,
}

impl StringInterner {
    /// Create an interner with the empty string pre-interned as [`Name::EMPTY`].
    pub fn new() -> Self {
        let mut interner = StringInterner {
            strings: Vec::new(),
            map: FxHashMap::default(),
        };
        interner.intern("");
        interner
    }

    /// Intern a string, returning its handle.
    pub fn intern(&mut self, s: &str) -> Name {
        if let Some(&name) = self.map.get(s) {
            return name;
        }
        let raw = u32::try_from(self.strings.len()).unwrap_or(u32::MAX);
        let name = Name(raw);
        self.strings.push(s.into());
        self.map.insert(s.into(), name);
        name
    }

    /// Look up a name without interning.
    pub fn get(&self, s: &str) -> Option<Name> {
        self.map.get(s).copied()
    }

    /// Resolve a handle back to its string. Unknown handles resolve to `""`.
    pub fn lookup(&self, name: Name) -> &str {
        self.strings.get(name.0 as usize).map_or("", |s| s)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

impl Default for StringInterner {
    fn default() -> Self {
        Self::new()
    }
}
