//! Shared program-building and execution helpers.

use std::cell::RefCell;
use std::rc::Rc;

use tsn_codegen::{compile_unit, AmbientResolver, CodegenConfig, CodegenError, CompiledUnit};
use tsn_codegen::ForeignSymbolResolver;
use tsn_ir::{ExprId, Program, ProgramBuilder, StmtId, TypeId};
use tsn_lir::eval::{Machine, Trap, Value};

/// `declare function record(x: number): void`, hoisted at the top level.
pub fn declare_record(b: &mut ProgramBuilder) {
    let x = b.param("x", TypeId::NUMBER);
    let record = b.ambient_function("record", &[x], TypeId::VOID);
    let stmt = b.fn_stmt(record);
    b.push_entry(stmt);
}

/// `record(value);`
pub fn record(b: &mut ProgramBuilder, value: ExprId) -> StmtId {
    let callee = b.ident("record");
    let call = b.call(callee, &[value]);
    b.expr_stmt(call)
}

/// Append `record(value);` to the top level.
pub fn push_record(b: &mut ProgramBuilder, value: ExprId) {
    let stmt = record(b, value);
    b.push_entry(stmt);
}

/// Append `expr;` to the top level.
pub fn push_expr(b: &mut ProgramBuilder, expr: ExprId) {
    let stmt = b.expr_stmt(expr);
    b.push_entry(stmt);
}

pub fn compile(program: &Program) -> CompiledUnit {
    compile_with(program, &AmbientResolver)
}

pub fn compile_with(program: &Program, resolver: &dyn ForeignSymbolResolver) -> CompiledUnit {
    compile_unit(program, resolver, CodegenConfig::default()).unwrap()
}

pub fn compile_err(program: &Program) -> CodegenError {
    compile_unit(program, &AmbientResolver, CodegenConfig::default()).unwrap_err()
}

/// A machine over `unit` with `record` installed, and the numbers it saw.
pub fn machine(unit: CompiledUnit) -> (Machine, Rc<RefCell<Vec<f64>>>) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let mut m = Machine::new(unit.module);
    m.register_host("record", move |m, args| {
        let n = m.read_number(&args[0])?;
        sink.borrow_mut().push(n);
        Ok(Value::NULL)
    });
    (m, seen)
}

/// Run the entry function to completion.
pub fn run_machine(m: &mut Machine, seen: &Rc<RefCell<Vec<f64>>>) -> Result<Vec<f64>, Trap> {
    m.run("main", Vec::new())?;
    let out = seen.borrow().clone();
    Ok(out)
}

/// Compile and run `program`, returning every recorded number.
pub fn run(program: &Program) -> Vec<f64> {
    let (mut m, seen) = machine(compile(program));
    run_machine(&mut m, &seen).unwrap()
}
