use std::cell::RefCell;

use pretty_assertions::assert_eq;

use crate::{FunctionBuilder, GlobalId};

use super::*;

/// Define `name(params) -> ret` with a body produced by `f`.
fn define(
    module: &mut Module,
    name: &str,
    params: &[TyId],
    ret: TyId,
    f: impl FnOnce(&mut FunctionBuilder, &mut Module),
) -> FuncId {
    let id = module.declare_function(name, params, ret);
    let mut b = FunctionBuilder::new(id, params);
    f(&mut b, module);
    module.define_function(id, b.finish());
    id
}

#[test]
fn arithmetic_and_return() {
    let mut m = Module::new("t");
    define(&mut m, "f", &[TyId::F64], TyId::F64, |b, _| {
        let two = b.const_f64(2.0);
        let r = b.binary(BinOp::FMul, b.param(0), two, "r");
        b.ret(Some(r));
    });
    let mut vm = Machine::new(m);
    assert_eq!(vm.run("f", vec![Value::Float(21.0)]), Ok(Value::Float(42.0)));
}

#[test]
fn alloc_is_zeroed_and_fields_are_addressable() {
    let mut m = Module::new("t");
    let pair = m.types.literal_struct(&[TyId::F64, TyId::PTR]);
    define(&mut m, "f", &[], TyId::F64, |b, _| {
        let p = b.alloc(pair, "pair");
        let f0 = b.struct_gep(pair, p, 0, "f0");
        let before = b.load(TyId::F64, f0, "before");
        let one = b.const_f64(1.0);
        let sum = b.binary(BinOp::FAdd, before, one, "sum");
        b.store(sum, f0);
        let after = b.load(TyId::F64, f0, "after");
        b.ret(Some(after));
    });
    let mut vm = Machine::new(m);
    assert_eq!(vm.run("f", vec![]), Ok(Value::Float(1.0)));
}

#[test]
fn loops_via_cond_br() {
    // sum = 0; i = 0; while (i < n) { sum += i; i += 1 }
    let mut m = Module::new("t");
    define(&mut m, "sum", &[TyId::F64], TyId::F64, |b, _| {
        let sum = b.alloc(TyId::F64, "sum");
        let i = b.alloc(TyId::F64, "i");
        let head = b.append_block("head");
        let body = b.append_block("body");
        let exit = b.append_block("exit");
        b.br(head);
        b.position_at_end(head);
        let iv = b.load(TyId::F64, i, "iv");
        let c = b.cmp(CmpPred::Lt, iv, b.param(0), "c");
        b.cond_br(c, body, exit);
        b.position_at_end(body);
        let sv = b.load(TyId::F64, sum, "sv");
        let iv = b.load(TyId::F64, i, "iv");
        let ns = b.binary(BinOp::FAdd, sv, iv, "ns");
        b.store(ns, sum);
        let one = b.const_f64(1.0);
        let ni = b.binary(BinOp::FAdd, iv, one, "ni");
        b.store(ni, i);
        b.br(head);
        b.position_at_end(exit);
        let r = b.load(TyId::F64, sum, "r");
        b.ret(Some(r));
    });
    let mut vm = Machine::new(m);
    assert_eq!(vm.run("sum", vec![Value::Float(5.0)]), Ok(Value::Float(10.0)));
}

#[test]
fn switch_selects_case() {
    let mut m = Module::new("t");
    define(&mut m, "pick", &[TyId::I32], TyId::F64, |b, _| {
        let a = b.append_block("a");
        let c = b.append_block("c");
        let d = b.append_block("d");
        b.switch(b.param(0), d, &[(0, a), (1, c)]);
        b.position_at_end(a);
        let v = b.const_f64(10.0);
        b.ret(Some(v));
        b.position_at_end(c);
        let v = b.const_f64(20.0);
        b.ret(Some(v));
        b.position_at_end(d);
        let v = b.const_f64(-1.0);
        b.ret(Some(v));
    });
    let mut vm = Machine::new(m);
    assert_eq!(vm.run("pick", vec![Value::Int(1)]), Ok(Value::Float(20.0)));
    assert_eq!(vm.run("pick", vec![Value::Int(7)]), Ok(Value::Float(-1.0)));
}

#[test]
fn indirect_call_through_stored_pointer() {
    let mut m = Module::new("t");
    let callee = define(&mut m, "callee", &[TyId::F64], TyId::F64, |b, _| {
        let r = b.fneg(b.param(0), "r");
        b.ret(Some(r));
    });
    let sig = m.types.func(&[TyId::F64], TyId::F64);
    define(&mut m, "caller", &[], TyId::F64, |b, _| {
        let slot = b.alloc(TyId::PTR, "slot");
        let f = b.const_fn(callee);
        b.store(f, slot);
        let loaded = b.load(TyId::PTR, slot, "f");
        let x = b.const_f64(3.0);
        let r = b.call_indirect(sig, TyId::F64, loaded, &[x], "r");
        b.ret(r);
    });
    let mut vm = Machine::new(m);
    assert_eq!(vm.run("caller", vec![]), Ok(Value::Float(-3.0)));
}

#[test]
fn external_function_dispatches_to_host() {
    let mut m = Module::new("t");
    let ext = m.declare_function("host.record", &[TyId::F64], TyId::VOID);
    define(&mut m, "main", &[], TyId::VOID, |b, _| {
        let x = b.const_f64(7.0);
        b.call(ext, TyId::VOID, &[x], "");
        b.ret(None);
    });
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let mut vm = Machine::new(m);
    vm.register_host("host.record", move |_, args| {
        sink.borrow_mut().push(args[0].as_f64()?);
        Ok(Value::Undef)
    });
    vm.run("main", vec![]).unwrap();
    assert_eq!(*seen.borrow(), vec![7.0]);
}

#[test]
fn missing_host_is_unresolved() {
    let mut m = Module::new("t");
    let ext = m.declare_function("nowhere", &[], TyId::VOID);
    define(&mut m, "main", &[], TyId::VOID, |b, _| {
        b.call(ext, TyId::VOID, &[], "");
        b.ret(None);
    });
    let mut vm = Machine::new(m);
    assert_eq!(
        vm.run("main", vec![]),
        Err(Trap::UnresolvedSymbol("nowhere".to_owned()))
    );
}

#[test]
fn readonly_global_rejects_stores() {
    let mut m = Module::new("t");
    let table = m.types.array(TyId::PTR, 2);
    let g = m.add_global("vtable.A", table, true, ConstInit::Zero);
    define(&mut m, "poke", &[], TyId::VOID, |b, _| {
        let addr = b.const_global(g);
        let null = b.const_null();
        b.store(null, addr);
        b.ret(None);
    });
    let mut vm = Machine::new(m);
    assert_eq!(
        vm.run("poke", vec![]),
        Err(Trap::ReadOnlyWrite("vtable.A".to_owned()))
    );
}

#[test]
fn aggregate_global_initializer() {
    let mut m = Module::new("t");
    let f = define(&mut m, "f", &[], TyId::VOID, |b, _| b.ret(None));
    let table = m.types.array(TyId::PTR, 2);
    m.add_global(
        "tbl",
        table,
        true,
        ConstInit::Aggregate(vec![
            ConstInit::Scalar(Const::Null),
            ConstInit::Scalar(Const::Func(f)),
        ]),
    );
    let vm = Machine::new(m);
    let addr = vm.global_address("tbl").unwrap();
    let slot1 = vm.field(&addr, 1).unwrap();
    assert_eq!(vm.read(&slot1), Ok(Value::Func(f)));
    assert_eq!(vm.read(&vm.field(&addr, 0).unwrap()), Ok(Value::NULL));
}

#[test]
fn external_global_must_be_defined_before_read() {
    let mut m = Module::new("t");
    let g: GlobalId = m.declare_external_global("native", TyId::PTR, true);
    define(&mut m, "get", &[], TyId::PTR, |b, _| {
        let addr = b.const_global(g);
        let v = b.load(TyId::PTR, addr, "v");
        b.ret(Some(v));
    });
    let mut vm = Machine::new(m);
    assert_eq!(vm.run("get", vec![]), Err(Trap::UninitializedRead));
    vm.define_global("native", Value::Int(5), true).unwrap();
    assert_eq!(vm.run("get", vec![]), Ok(Value::Int(5)));
}

#[test]
fn element_of_undefined_external_table_is_uninitialized() {
    let mut m = Module::new("t");
    let table = m.types.array(TyId::PTR, 3);
    let g = m.declare_external_global("native_table", table, true);
    define(&mut m, "second", &[], TyId::PTR, |b, _| {
        let addr = b.const_global(g);
        let one = b.const_i32(1);
        let slot = b.index_gep(TyId::PTR, addr, one, "slot");
        let v = b.load(TyId::PTR, slot, "v");
        b.ret(Some(v));
    });
    let mut vm = Machine::new(m);
    assert_eq!(vm.run("second", vec![]), Err(Trap::UninitializedRead));
}

#[test]
fn null_dereference_traps() {
    let mut m = Module::new("t");
    define(&mut m, "f", &[], TyId::F64, |b, _| {
        let p = b.const_null();
        let v = b.load(TyId::F64, p, "v");
        b.ret(Some(v));
    });
    let mut vm = Machine::new(m);
    assert_eq!(vm.run("f", vec![]), Err(Trap::NullDeref));
}

#[test]
fn unbounded_recursion_hits_depth_limit() {
    let mut m = Module::new("t");
    let id = m.declare_function("forever", &[], TyId::VOID);
    let mut b = FunctionBuilder::new(id, &[]);
    b.call(id, TyId::VOID, &[], "");
    b.ret(None);
    m.define_function(id, b.finish());
    let mut vm = Machine::new(m);
    assert_eq!(vm.run("forever", vec![]), Err(Trap::StackOverflow));
}

#[test]
fn infinite_loop_runs_out_of_fuel() {
    let mut m = Module::new("t");
    define(&mut m, "spin", &[], TyId::VOID, |b, _| {
        let head = b.append_block("head");
        b.br(head);
        b.position_at_end(head);
        let _ = b.const_bool(true);
        b.br(head);
    });
    let mut vm = Machine::new(m);
    vm.set_fuel(1_000);
    assert_eq!(vm.run("spin", vec![]), Err(Trap::OutOfFuel));
}

#[test]
fn arity_is_checked() {
    let mut m = Module::new("t");
    define(&mut m, "f", &[TyId::F64], TyId::VOID, |b, _| b.ret(None));
    let mut vm = Machine::new(m);
    assert_eq!(
        vm.run("f", vec![]),
        Err(Trap::Arity {
            name: "f".to_owned(),
            expected: 1,
            found: 0
        })
    );
}

#[test]
fn string_concat_and_compare() {
    let mut m = Module::new("t");
    define(&mut m, "f", &[], TyId::I1, |b, _| {
        let a = b.const_str("ab");
        let c = b.const_str("c");
        let s = b.binary(BinOp::Concat, a, c, "s");
        let want = b.const_str("abc");
        let eq = b.cmp(CmpPred::Eq, s, want, "eq");
        b.ret(Some(eq));
    });
    let mut vm = Machine::new(m);
    assert_eq!(vm.run("f", vec![]), Ok(Value::Bool(true)));
}

#[test]
fn host_helpers_read_boxed_values() {
    let m = Module::new("t");
    let mut vm = Machine::new(m);
    let n = vm.alloc(Value::Float(2.5));
    let s = vm.alloc(Value::Str(Rc::from("hi")));
    assert_eq!(vm.read_number(&n), Ok(2.5));
    assert_eq!(vm.read_string(&s), Ok("hi".to_owned()));
    assert_eq!(vm.allocation_count(), 2);
    assert_eq!(vm.read_number(&Value::NULL), Err(Trap::NullDeref));
}
