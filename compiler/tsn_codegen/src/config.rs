//! Code generation configuration.

/// Header slots of a native vtable: two virtual destructor entries plus
/// two virtual methods of the native root object.
pub const DEFAULT_VTABLE_HEADER_SLOTS: u32 = 4;

/// Environment variable that enables dumping each finished module.
pub const DEBUG_LIR_ENV: &str = "TSN_DEBUG_LIR";

/// Configuration for one compilation unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodegenConfig {
    /// Slots reserved at the start of every vtable before user-declared
    /// virtual methods.
    pub vtable_header_slots: u32,
    /// Emit the textual module at debug level when compilation finishes.
    pub dump_lir: bool,
    /// Name of the function holding the top-level statements.
    pub entry_name: String,
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self {
            vtable_header_slots: DEFAULT_VTABLE_HEADER_SLOTS,
            dump_lir: std::env::var_os(DEBUG_LIR_ENV).is_some_and(|v| !v.is_empty()),
            entry_name: "main".to_owned(),
        }
    }
}

impl CodegenConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of reserved vtable header slots.
    #[must_use]
    pub fn with_vtable_header_slots(mut self, slots: u32) -> Self {
        self.vtable_header_slots = slots;
        self
    }

    /// Enable or disable the module dump.
    #[must_use]
    pub fn with_dump_lir(mut self, dump: bool) -> Self {
        self.dump_lir = dump;
        self
    }

    /// Set the entry function name.
    #[must_use]
    pub fn with_entry_name(mut self, name: impl Into<String>) -> Self {
        self.entry_name = name.into();
        self
    }
}
