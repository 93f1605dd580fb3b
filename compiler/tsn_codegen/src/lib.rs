//! Code generation for tsn.
//!
//! Lowers a resolved TypeScript program ([`tsn_ir::Program`]) into a
//! [`tsn_lir::Module`]. The crate owns the runtime representation of the
//! parts of TypeScript that have no direct machine counterpart:
//!
//! - **Environments** (`environment`): one record per function body holding
//!   parameter, capture, `this` and outer-environment cells.
//! - **Closures** (`closure`): `{ code, env }` records, lazy closures for
//!   generic functions, and the uniform call trampoline.
//! - **Unions** (`union`): optional `{ present, value }` records and
//!   untagged multi-slot records.
//! - **Intersections** (`intersection`): flattened structs with named
//!   segments per member.
//! - **VTables** (`vtable`): thunks, trampolines and per-instance patching
//!   so native virtual dispatch reaches compiled overrides.
//!
//! All per-unit state lives in [`CodegenCx`]; the [`MetaRegistry`]
//! records every shape and association made while compiling.
//!
//! # Debugging
//!
//! - `RUST_LOG=tsn_codegen=debug`: one event per compiled function,
//!   environment, shape and vtable (after [`init_tracing`]).
//! - `RUST_LOG=tsn_codegen=trace`: per-call and per-coercion detail.
//! - `TSN_DEBUG_LIR=1`: dump each finished module at debug level.

// Lowering threads the builder, context and record types through most helpers.
#![allow(clippy::too_many_arguments)]

mod closure;
mod config;
mod context;
mod environment;
mod error;
mod function_compiler;
mod intersection;
mod lower;
mod object;
mod registry;
mod resolver;
mod scope;
mod type_info;
mod type_mapper;
mod union;
mod vtable;

use std::sync::Once;

use tracing::debug;
use tsn_ir::Program;
use tsn_lir::{FuncId, Module};

pub use config::{CodegenConfig, DEBUG_LIR_ENV, DEFAULT_VTABLE_HEADER_SLOTS};
pub use context::CodegenCx;
pub use environment::{EnvSlot, Environment, SlotName, SlotOrigin};
pub use error::{CodegenError, CodegenErrorKind, CodegenResult, RegistryError};
pub use registry::{
    ClosureMeta, EnvId, IntersectionMeta, MetaRegistry, ObjectMeta, Segment, ShapeId, ShapeMeta,
    UnionMeta, UnionSlot,
};
pub use resolver::{qualified_name, AmbientResolver, ForeignSymbolResolver, Resolution, SymbolTable};
pub use type_info::{ClosureInfo, Repr, ShapeKey, TypeInfo};
pub use type_mapper::TypeMapper;
pub use vtable::{root_virtuals, vtable_root, VTable};

/// Output of one compilation unit.
#[derive(Debug)]
pub struct CompiledUnit {
    pub module: Module,
    pub registry: MetaRegistry,
    /// Function holding the top-level statements.
    pub entry: FuncId,
}

/// Compile `program` into a module.
pub fn compile(
    program: &Program,
    resolver: &dyn ForeignSymbolResolver,
    config: CodegenConfig,
) -> Result<Module, CodegenError> {
    compile_unit(program, resolver, config).map(|unit| unit.module)
}

/// Compile `program`, keeping the meta-registry alongside the module.
///
/// The first error aborts the unit; no partial module is returned.
pub fn compile_unit(
    program: &Program,
    resolver: &dyn ForeignSymbolResolver,
    config: CodegenConfig,
) -> Result<CompiledUnit, CodegenError> {
    let dump = config.dump_lir;
    let mut cx = CodegenCx::new(program, resolver, config);
    let entry = function_compiler::compile_entry(&mut cx)?;
    let (module, registry) = cx.finish();
    debug!(
        functions = module.functions().count(),
        globals = module.globals().count(),
        shapes = registry.shape_count(),
        "unit compiled"
    );
    if dump {
        debug!(module = %tsn_lir::print_module(&module), "lir");
    }
    Ok(CompiledUnit {
        module,
        registry,
        entry,
    })
}

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for debug output.
///
/// Safe to call multiple times. Does nothing unless `RUST_LOG` is set.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .with_level(true),
                )
                .with(filter)
                .init();
        }
    });
}
