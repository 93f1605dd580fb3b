//! Virtual dispatch through emitted and foreign vtables.

use pretty_assertions::assert_eq;
use tsn_codegen::{SymbolTable, DEFAULT_VTABLE_HEADER_SLOTS};
use tsn_ir::{BinaryOp, DeclFlags, DeclId, ProgramBuilder, TypeId};
use tsn_lir::eval::{Trap, Value};

use super::harness::{compile, compile_with, declare_record, machine, push_record, run, run_machine};

/// `class Square extends <base> { side; constructor(s) { super(); this.side = s; } area() }`
/// with `area` overriding the root's slot.
fn square(b: &mut ProgramBuilder, base: DeclId) -> DeclId {
    let square = b.class("Square", Some(base), DeclFlags::empty());
    b.property(square, "side", TypeId::NUMBER, None);
    let s = b.param("s", TypeId::NUMBER);
    let sup = b.super_();
    let super_call = b.call(sup, &[]);
    let super_stmt = b.expr_stmt(super_call);
    let target = b.this_prop("side");
    let value = b.ident("s");
    let assign = b.assign(target, value);
    let store = b.expr_stmt(assign);
    b.constructor(square, &[s], vec![super_stmt, store]);
    let lhs = b.this_prop("side");
    let rhs = b.this_prop("side");
    let area = b.binary(BinaryOp::Mul, lhs, rhs);
    let ret = b.ret(Some(area));
    b.method(
        square,
        "area",
        &[],
        Some(TypeId::NUMBER),
        vec![ret],
        DeclFlags::OVERRIDE,
    );
    square
}

/// `function measure(s: <Shape>): number { return s.area(); }`
fn measure(b: &mut ProgramBuilder, shape: DeclId) {
    let shape_ty = b.class_type(shape);
    let s = b.param("s", shape_ty);
    let recv = b.ident("s");
    let call = b.method_call(recv, "area", &[]);
    let ret = b.ret(Some(call));
    let f = b.function("measure", &[s], Some(TypeId::NUMBER), vec![ret]);
    let stmt = b.fn_stmt(f);
    b.push_entry(stmt);
}

fn record_measure(b: &mut ProgramBuilder, arg: tsn_ir::ExprId) {
    let callee = b.ident("measure");
    let call = b.call(callee, &[arg]);
    push_record(b, call);
}

/// ```text
/// class Shape { area(): number { return 0; } }      // vtable root
/// class Square extends Shape { ... override area(): number { return this.side * this.side; } }
/// class Circle extends Shape { override area(): number { return 100; } }
/// record(measure(new Square(3)));
/// record(measure(new Circle()));
/// record(measure(new Shape()));
/// ```
#[test]
fn overrides_are_reached_through_the_root_slot() {
    let mut b = ProgramBuilder::new();
    declare_record(&mut b);
    let shape = b.class("Shape", None, DeclFlags::VTABLE);
    let zero = b.num(0.0);
    let ret = b.ret(Some(zero));
    b.method(shape, "area", &[], Some(TypeId::NUMBER), vec![ret], DeclFlags::VIRTUAL);
    let square = square(&mut b, shape);
    let circle = b.class("Circle", Some(shape), DeclFlags::empty());
    let hundred = b.num(100.0);
    let ret = b.ret(Some(hundred));
    b.method(circle, "area", &[], Some(TypeId::NUMBER), vec![ret], DeclFlags::OVERRIDE);
    for class in [shape, square, circle] {
        let stmt = b.class_stmt(class);
        b.push_entry(stmt);
    }
    measure(&mut b, shape);

    let three = b.num(3.0);
    let sq = b.new_(square, &[three]);
    record_measure(&mut b, sq);
    let ci = b.new_(circle, &[]);
    record_measure(&mut b, ci);
    let plain = b.new_(shape, &[]);
    record_measure(&mut b, plain);
    let program = b.finish();
    let unit = compile(&program);

    // The root's own method goes through a thunk; overrides through trampolines.
    assert!(unit.module.function_by_name("vthunk.Shape.area").is_some());
    assert!(unit.module.function_by_name("vtramp.Square.area").is_some());
    assert!(unit.module.function_by_name("vtramp.Circle.area").is_some());
    assert!(unit.module.global_by_name("closure.Square.area").is_none());
    let table = unit.module.global_by_name("vtable.Shape").unwrap();
    assert!(unit.module.global(table).unwrap().readonly);

    let (mut m, seen) = machine(unit);
    assert_eq!(run_machine(&mut m, &seen).unwrap(), vec![9.0, 100.0, 0.0]);
}

/// Instances of the same class share the override trampoline but each
/// call sees its own receiver.
///
/// ```text
/// const a = new Square(2);
/// const c = new Square(5);
/// record(measure(a)); record(measure(c)); record(measure(a));
/// ```
#[test]
fn sibling_instances_dispatch_with_their_own_receiver() {
    let mut b = ProgramBuilder::new();
    declare_record(&mut b);
    let shape = b.class("Shape", None, DeclFlags::VTABLE);
    let zero = b.num(0.0);
    let ret = b.ret(Some(zero));
    b.method(shape, "area", &[], Some(TypeId::NUMBER), vec![ret], DeclFlags::VIRTUAL);
    let square = square(&mut b, shape);
    for class in [shape, square] {
        let stmt = b.class_stmt(class);
        b.push_entry(stmt);
    }
    measure(&mut b, shape);
    for (name, side) in [("a", 2.0), ("c", 5.0)] {
        let side = b.num(side);
        let made = b.new_(square, &[side]);
        let stmt = b.const_(name, None, made);
        b.push_entry(stmt);
    }
    for name in ["a", "c", "a"] {
        let arg = b.ident(name);
        record_measure(&mut b, arg);
    }
    let program = b.finish();

    assert_eq!(run(&program), vec![4.0, 25.0, 4.0]);
}

/// Calling through a derived static type still dispatches virtually.
///
/// ```text
/// const sq: Square = new Square(4);
/// record(sq.area());
/// ```
#[test]
fn derived_receiver_uses_the_patched_table() {
    let mut b = ProgramBuilder::new();
    declare_record(&mut b);
    let shape = b.class("Shape", None, DeclFlags::VTABLE);
    let zero = b.num(0.0);
    let ret = b.ret(Some(zero));
    b.method(shape, "area", &[], Some(TypeId::NUMBER), vec![ret], DeclFlags::VIRTUAL);
    let square = square(&mut b, shape);
    for class in [shape, square] {
        let stmt = b.class_stmt(class);
        b.push_entry(stmt);
    }
    let four = b.num(4.0);
    let made = b.new_(square, &[four]);
    let let_sq = b.const_("sq", None, made);
    b.push_entry(let_sq);
    let recv = b.ident("sq");
    let call = b.method_call(recv, "area", &[]);
    push_record(&mut b, call);
    let program = b.finish();

    assert_eq!(run(&program), vec![16.0]);
}

/// Each level of a chain dispatches to its own override; `super` reaches
/// the level above statically.
///
/// ```text
/// class Base { boo(): number { return 0; } }              // vtable root
/// class Derived extends Base { override boo(): number { return 1; } }
/// class Deeper extends Derived { override boo(): number { return super.boo() + 1; } }
/// function ask(s: Base): number { return s.boo(); }
/// record(ask(new Base())); record(ask(new Derived())); record(ask(new Deeper()));
/// let held: Base = new Deeper();
/// record(held.boo());
/// ```
#[test]
fn three_level_chain_dispatches_through_the_base_type() {
    let mut b = ProgramBuilder::new();
    declare_record(&mut b);
    let base = b.class("Base", None, DeclFlags::VTABLE);
    let zero = b.num(0.0);
    let ret = b.ret(Some(zero));
    b.method(base, "boo", &[], Some(TypeId::NUMBER), vec![ret], DeclFlags::VIRTUAL);
    let derived = b.class("Derived", Some(base), DeclFlags::empty());
    let one = b.num(1.0);
    let ret = b.ret(Some(one));
    b.method(derived, "boo", &[], Some(TypeId::NUMBER), vec![ret], DeclFlags::OVERRIDE);
    let deeper = b.class("Deeper", Some(derived), DeclFlags::empty());
    let sup = b.super_();
    let up = b.method_call(sup, "boo", &[]);
    let one = b.num(1.0);
    let sum = b.binary(BinaryOp::Add, up, one);
    let ret = b.ret(Some(sum));
    b.method(deeper, "boo", &[], Some(TypeId::NUMBER), vec![ret], DeclFlags::OVERRIDE);
    for class in [base, derived, deeper] {
        let stmt = b.class_stmt(class);
        b.push_entry(stmt);
    }

    let base_ty = b.class_type(base);
    let s = b.param("s", base_ty);
    let recv = b.ident("s");
    let call = b.method_call(recv, "boo", &[]);
    let ret = b.ret(Some(call));
    let ask = b.function("ask", &[s], Some(TypeId::NUMBER), vec![ret]);
    let stmt = b.fn_stmt(ask);
    b.push_entry(stmt);
    for class in [base, derived, deeper] {
        let made = b.new_(class, &[]);
        let callee = b.ident("ask");
        let call = b.call(callee, &[made]);
        push_record(&mut b, call);
    }

    let made = b.new_(deeper, &[]);
    let let_held = b.let_("held", Some(base_ty), made);
    b.push_entry(let_held);
    let held = b.ident("held");
    let call = b.method_call(held, "boo", &[]);
    push_record(&mut b, call);
    let program = b.finish();

    assert_eq!(run(&program), vec![0.0, 1.0, 2.0, 2.0]);
}

/// An override that captures a local keeps the captures of the instance
/// it was installed for.
///
/// ```text
/// class Base { boo(): number { return 0; } }              // vtable root
/// function make(v: number): Base {
///     class D extends Base { override boo(): number { return v; } }
///     return new D();
/// }
/// const a = make(1);
/// const c = make(2);
/// record(a.boo()); record(c.boo()); record(a.boo());
/// ```
#[test]
fn capturing_override_keeps_its_own_instance_state() {
    let mut b = ProgramBuilder::new();
    declare_record(&mut b);
    let base = b.class("Base", None, DeclFlags::VTABLE);
    let zero = b.num(0.0);
    let ret = b.ret(Some(zero));
    b.method(base, "boo", &[], Some(TypeId::NUMBER), vec![ret], DeclFlags::VIRTUAL);
    let stmt = b.class_stmt(base);
    b.push_entry(stmt);

    let v = b.param("v", TypeId::NUMBER);
    let local = b.class("D", Some(base), DeclFlags::empty());
    let rv = b.ident("v");
    let ret = b.ret(Some(rv));
    b.method(local, "boo", &[], Some(TypeId::NUMBER), vec![ret], DeclFlags::OVERRIDE);
    let class_stmt = b.class_stmt(local);
    let made = b.new_(local, &[]);
    let ret = b.ret(Some(made));
    let base_ty = b.class_type(base);
    let make = b.function("make", &[v], Some(base_ty), vec![class_stmt, ret]);
    let stmt = b.fn_stmt(make);
    b.push_entry(stmt);

    for (name, n) in [("a", 1.0), ("c", 2.0)] {
        let callee = b.ident("make");
        let arg = b.num(n);
        let call = b.call(callee, &[arg]);
        let stmt = b.const_(name, None, call);
        b.push_entry(stmt);
    }
    for name in ["a", "c", "a"] {
        let recv = b.ident(name);
        let call = b.method_call(recv, "boo", &[]);
        push_record(&mut b, call);
    }
    let program = b.finish();
    let unit = compile(&program);
    assert!(unit.module.function_by_name("vtramp.D.boo").is_some());

    let (mut m, seen) = machine(unit);
    assert_eq!(run_machine(&mut m, &seen).unwrap(), vec![1.0, 2.0, 1.0]);
}

/// The shared table is read-only at run time.
#[test]
fn emitted_table_rejects_writes() {
    let mut b = ProgramBuilder::new();
    let shape = b.class("Shape", None, DeclFlags::VTABLE);
    let zero = b.num(0.0);
    let ret = b.ret(Some(zero));
    b.method(shape, "area", &[], Some(TypeId::NUMBER), vec![ret], DeclFlags::VIRTUAL);
    let stmt = b.class_stmt(shape);
    b.push_entry(stmt);
    let made = b.new_(shape, &[]);
    let let_s = b.const_("s", None, made);
    b.push_entry(let_s);
    let program = b.finish();

    let (mut m, seen) = machine(compile(&program));
    run_machine(&mut m, &seen).unwrap();
    let table = m.global_address("vtable.Shape").unwrap();
    assert_eq!(
        m.write(&table, Value::NULL),
        Err(Trap::ReadOnlyWrite("vtable.Shape".to_owned()))
    );
}

/// A native base class whose table and `area` come from the host.
struct Native {
    program: tsn_ir::Program,
    shape: DeclId,
}

/// ```text
/// declare class Shape { area(): number; }       // table "Shape_vtable"
/// class Square extends Shape { ... override area() ... }
/// record(measure(new Square(4)));
/// record(measure(new Shape()));
/// ```
fn native_program() -> Native {
    let mut b = ProgramBuilder::new();
    declare_record(&mut b);
    let shape = b.class("Shape", None, DeclFlags::VTABLE | DeclFlags::AMBIENT);
    b.ambient_method(shape, "area", &[], TypeId::NUMBER, DeclFlags::VIRTUAL);
    let square = square(&mut b, shape);
    for class in [shape, square] {
        let stmt = b.class_stmt(class);
        b.push_entry(stmt);
    }
    measure(&mut b, shape);
    let four = b.num(4.0);
    let sq = b.new_(square, &[four]);
    record_measure(&mut b, sq);
    let plain = b.new_(shape, &[]);
    record_measure(&mut b, plain);
    Native {
        program: b.finish(),
        shape,
    }
}

#[test]
fn foreign_table_is_copied_and_patched() {
    let native = native_program();
    let resolver = SymbolTable::new().with_vtable(native.shape, "Shape_vtable");
    let unit = compile_with(&native.program, &resolver);
    assert!(unit.module.global_by_name("vtable.Shape").is_none());

    let (mut m, seen) = machine(unit);
    let area = m.register_host("Shape.area", |m, _args| Ok(m.alloc(Value::Float(7.0))));
    let mut entries = vec![Value::NULL; DEFAULT_VTABLE_HEADER_SLOTS as usize];
    entries.push(area);
    m.define_global("Shape_vtable", Value::Agg(entries), true).unwrap();

    assert_eq!(run_machine(&mut m, &seen).unwrap(), vec![16.0, 7.0]);
}

#[test]
fn missing_foreign_table_traps_on_first_use() {
    let native = native_program();
    let resolver = SymbolTable::new().with_vtable(native.shape, "Shape_vtable");
    let (mut m, seen) = machine(compile_with(&native.program, &resolver));

    assert_eq!(run_machine(&mut m, &seen), Err(Trap::UninitializedRead));
}
