//! Class construction, property initializers, accessors and statics.

use pretty_assertions::assert_eq;
use tsn_ir::{BinaryOp, DeclFlags, ProgramBuilder, TypeId};

use super::harness::{declare_record, push_expr, push_record, record, run};

/// ```text
/// class P {
///     x: number = 1;
///     y: number = 2;
///     constructor(y: number) { this.y = y; }
///     sum(): number { return this.x + this.y; }
/// }
/// record(new P(5).sum());
/// ```
#[test]
fn initializers_run_before_the_constructor_body() {
    let mut b = ProgramBuilder::new();
    declare_record(&mut b);
    let p = b.class("P", None, DeclFlags::empty());
    let one = b.num(1.0);
    b.property(p, "x", TypeId::NUMBER, Some(one));
    let two = b.num(2.0);
    b.property(p, "y", TypeId::NUMBER, Some(two));
    let y = b.param("y", TypeId::NUMBER);
    let target = b.this_prop("y");
    let value = b.ident("y");
    let assign = b.assign(target, value);
    let store = b.expr_stmt(assign);
    b.constructor(p, &[y], vec![store]);
    let x = b.this_prop("x");
    let y = b.this_prop("y");
    let sum = b.binary(BinaryOp::Add, x, y);
    let ret = b.ret(Some(sum));
    b.method(p, "sum", &[], Some(TypeId::NUMBER), vec![ret], DeclFlags::empty());
    let stmt = b.class_stmt(p);
    b.push_entry(stmt);

    let five = b.num(5.0);
    let obj = b.new_(p, &[five]);
    let call = b.method_call(obj, "sum", &[]);
    push_record(&mut b, call);
    let program = b.finish();

    assert_eq!(run(&program), vec![6.0]);
}

/// ```text
/// class Animal {
///     name: string;
///     constructor(n: string) { this.name = n; }
///     legs(): number { return 4; }
/// }
/// class Bird extends Animal {
///     wings: number = 2;
///     constructor() { super("bird"); }
///     legs(): number { return super.legs() - 2; }
/// }
/// const bird = new Bird();
/// record(bird.legs()); record(bird.wings);
/// ```
#[test]
fn derived_class_reaches_its_base_through_super() {
    let mut b = ProgramBuilder::new();
    declare_record(&mut b);
    let animal = b.class("Animal", None, DeclFlags::empty());
    b.property(animal, "name", TypeId::STRING, None);
    let n = b.param("n", TypeId::STRING);
    let target = b.this_prop("name");
    let value = b.ident("n");
    let assign = b.assign(target, value);
    let store = b.expr_stmt(assign);
    b.constructor(animal, &[n], vec![store]);
    let four = b.num(4.0);
    let ret = b.ret(Some(four));
    b.method(animal, "legs", &[], Some(TypeId::NUMBER), vec![ret], DeclFlags::empty());

    let bird = b.class("Bird", Some(animal), DeclFlags::empty());
    let two = b.num(2.0);
    b.property(bird, "wings", TypeId::NUMBER, Some(two));
    let sup = b.super_();
    let label = b.str("bird");
    let super_call = b.call(sup, &[label]);
    let super_stmt = b.expr_stmt(super_call);
    b.constructor(bird, &[], vec![super_stmt]);
    let sup = b.super_();
    let base_legs = b.method_call(sup, "legs", &[]);
    let two = b.num(2.0);
    let diff = b.binary(BinaryOp::Sub, base_legs, two);
    let ret = b.ret(Some(diff));
    b.method(bird, "legs", &[], Some(TypeId::NUMBER), vec![ret], DeclFlags::empty());

    for class in [animal, bird] {
        let stmt = b.class_stmt(class);
        b.push_entry(stmt);
    }
    let made = b.new_(bird, &[]);
    let let_bird = b.const_("bird", None, made);
    b.push_entry(let_bird);
    let recv = b.ident("bird");
    let legs = b.method_call(recv, "legs", &[]);
    push_record(&mut b, legs);
    let recv = b.ident("bird");
    let wings = b.prop(recv, "wings");
    push_record(&mut b, wings);
    let program = b.finish();

    assert_eq!(run(&program), vec![2.0, 2.0]);
}

/// A derived class without a constructor forwards its arguments to the
/// base constructor, then runs its own initializers.
///
/// ```text
/// class Base { v: number; constructor(v: number) { this.v = v; } }
/// class Derived extends Base { extra: number = 7; }
/// const d = new Derived(3);
/// record(d.v); record(d.extra);
/// ```
#[test]
fn implicit_constructor_forwards_to_the_base() {
    let mut b = ProgramBuilder::new();
    declare_record(&mut b);
    let base = b.class("Base", None, DeclFlags::empty());
    b.property(base, "v", TypeId::NUMBER, None);
    let v = b.param("v", TypeId::NUMBER);
    let target = b.this_prop("v");
    let value = b.ident("v");
    let assign = b.assign(target, value);
    let store = b.expr_stmt(assign);
    b.constructor(base, &[v], vec![store]);
    let derived = b.class("Derived", Some(base), DeclFlags::empty());
    let seven = b.num(7.0);
    b.property(derived, "extra", TypeId::NUMBER, Some(seven));
    for class in [base, derived] {
        let stmt = b.class_stmt(class);
        b.push_entry(stmt);
    }

    let three = b.num(3.0);
    let made = b.new_(derived, &[three]);
    let let_d = b.const_("d", None, made);
    b.push_entry(let_d);
    for field in ["v", "extra"] {
        let d = b.ident("d");
        let read = b.prop(d, field);
        push_record(&mut b, read);
    }
    let program = b.finish();

    assert_eq!(run(&program), vec![3.0, 7.0]);
}

/// ```text
/// class Temp {
///     c: number = 0;
///     get f(): number { return this.c * 9 / 5 + 32; }
///     set f(v: number) { this.c = (v - 32) * 5 / 9; }
/// }
/// const t = new Temp();
/// t.f = 212;
/// record(t.c); record(t.f);
/// ```
#[test]
fn accessors_replace_field_access() {
    let mut b = ProgramBuilder::new();
    declare_record(&mut b);
    let temp = b.class("Temp", None, DeclFlags::empty());
    let zero = b.num(0.0);
    b.property(temp, "c", TypeId::NUMBER, Some(zero));

    let c = b.this_prop("c");
    let nine = b.num(9.0);
    let mul = b.binary(BinaryOp::Mul, c, nine);
    let five = b.num(5.0);
    let div = b.binary(BinaryOp::Div, mul, five);
    let offset = b.num(32.0);
    let f = b.binary(BinaryOp::Add, div, offset);
    let ret = b.ret(Some(f));
    b.getter(temp, "f", TypeId::NUMBER, vec![ret]);

    let v = b.param("v", TypeId::NUMBER);
    let rv = b.ident("v");
    let offset = b.num(32.0);
    let sub = b.binary(BinaryOp::Sub, rv, offset);
    let five = b.num(5.0);
    let mul = b.binary(BinaryOp::Mul, sub, five);
    let nine = b.num(9.0);
    let celsius = b.binary(BinaryOp::Div, mul, nine);
    let target = b.this_prop("c");
    let assign = b.assign(target, celsius);
    let store = b.expr_stmt(assign);
    b.setter(temp, "f", v, vec![store]);
    let stmt = b.class_stmt(temp);
    b.push_entry(stmt);

    let made = b.new_(temp, &[]);
    let let_t = b.const_("t", None, made);
    b.push_entry(let_t);
    let t = b.ident("t");
    let target = b.prop(t, "f");
    let boiling = b.num(212.0);
    let assign = b.assign(target, boiling);
    push_expr(&mut b, assign);
    for field in ["c", "f"] {
        let t = b.ident("t");
        let read = b.prop(t, field);
        push_record(&mut b, read);
    }
    let program = b.finish();

    assert_eq!(run(&program), vec![100.0, 212.0]);
}

/// ```text
/// class Counter {
///     static count: number = 0;
///     static bump(): number { Counter.count = Counter.count + 1; return Counter.count; }
/// }
/// Counter.bump();
/// record(Counter.bump()); record(Counter.count);
/// ```
#[test]
fn static_members_are_shared() {
    let mut b = ProgramBuilder::new();
    declare_record(&mut b);
    let counter = b.class("Counter", None, DeclFlags::empty());
    let zero = b.num(0.0);
    b.static_property(counter, "count", TypeId::NUMBER, Some(zero));
    let class_ref = b.ident("Counter");
    let target = b.prop(class_ref, "count");
    let class_ref = b.ident("Counter");
    let current = b.prop(class_ref, "count");
    let one = b.num(1.0);
    let next = b.binary(BinaryOp::Add, current, one);
    let assign = b.assign(target, next);
    let bump = b.expr_stmt(assign);
    let class_ref = b.ident("Counter");
    let read = b.prop(class_ref, "count");
    let ret = b.ret(Some(read));
    b.method(
        counter,
        "bump",
        &[],
        Some(TypeId::NUMBER),
        vec![bump, ret],
        DeclFlags::STATIC,
    );
    let stmt = b.class_stmt(counter);
    b.push_entry(stmt);

    let class_ref = b.ident("Counter");
    let first = b.method_call(class_ref, "bump", &[]);
    push_expr(&mut b, first);
    let class_ref = b.ident("Counter");
    let second = b.method_call(class_ref, "bump", &[]);
    push_record(&mut b, second);
    let class_ref = b.ident("Counter");
    let read = b.prop(class_ref, "count");
    push_record(&mut b, read);
    let program = b.finish();

    assert_eq!(run(&program), vec![2.0, 2.0]);
}

/// A method read as a value stays bound to its receiver.
///
/// ```text
/// class Counter {
///     count: number = 0;
///     inc(): number { this.count = this.count + 1; return this.count; }
/// }
/// const c = new Counter();
/// const inc = c.inc;
/// inc(); inc();
/// record(c.count);
/// ```
#[test]
fn detached_method_keeps_its_receiver() {
    let mut b = ProgramBuilder::new();
    declare_record(&mut b);
    let counter = b.class("Counter", None, DeclFlags::empty());
    let zero = b.num(0.0);
    b.property(counter, "count", TypeId::NUMBER, Some(zero));
    let target = b.this_prop("count");
    let current = b.this_prop("count");
    let one = b.num(1.0);
    let next = b.binary(BinaryOp::Add, current, one);
    let assign = b.assign(target, next);
    let bump = b.expr_stmt(assign);
    let read = b.this_prop("count");
    let ret = b.ret(Some(read));
    b.method(
        counter,
        "inc",
        &[],
        Some(TypeId::NUMBER),
        vec![bump, ret],
        DeclFlags::empty(),
    );
    let stmt = b.class_stmt(counter);
    b.push_entry(stmt);

    let made = b.new_(counter, &[]);
    let let_c = b.const_("c", None, made);
    b.push_entry(let_c);
    let c = b.ident("c");
    let method = b.prop(c, "inc");
    let let_inc = b.const_("inc", None, method);
    b.push_entry(let_inc);
    for _ in 0..2 {
        let inc = b.ident("inc");
        let call = b.call(inc, &[]);
        push_expr(&mut b, call);
    }
    let c = b.ident("c");
    let read = b.prop(c, "count");
    push_record(&mut b, read);
    let program = b.finish();

    assert_eq!(run(&program), vec![2.0]);
}

/// Statics declared on a base are reached and written through a derived
/// class, and a static method read as a value still updates them.
///
/// ```text
/// class A {
///     static cnt: number = 0;
///     static inc(): number { A.cnt = A.cnt + 1; return A.cnt; }
/// }
/// class B extends A {}
/// B.inc(); B.inc(); A.inc();
/// if (B.cnt === 3) record(1);
/// const inc = B.inc;
/// record(inc()); record(A.cnt);
/// ```
#[test]
fn inherited_statics_share_one_slot() {
    let mut b = ProgramBuilder::new();
    declare_record(&mut b);
    let a = b.class("A", None, DeclFlags::empty());
    let zero = b.num(0.0);
    b.static_property(a, "cnt", TypeId::NUMBER, Some(zero));
    let class_ref = b.ident("A");
    let target = b.prop(class_ref, "cnt");
    let class_ref = b.ident("A");
    let current = b.prop(class_ref, "cnt");
    let one = b.num(1.0);
    let next = b.binary(BinaryOp::Add, current, one);
    let assign = b.assign(target, next);
    let bump = b.expr_stmt(assign);
    let class_ref = b.ident("A");
    let read = b.prop(class_ref, "cnt");
    let ret = b.ret(Some(read));
    b.method(a, "inc", &[], Some(TypeId::NUMBER), vec![bump, ret], DeclFlags::STATIC);
    let derived = b.class("B", Some(a), DeclFlags::empty());
    for class in [a, derived] {
        let stmt = b.class_stmt(class);
        b.push_entry(stmt);
    }

    for class in ["B", "B", "A"] {
        let class_ref = b.ident(class);
        let call = b.method_call(class_ref, "inc", &[]);
        push_expr(&mut b, call);
    }
    let class_ref = b.ident("B");
    let cnt = b.prop(class_ref, "cnt");
    let three = b.num(3.0);
    let cond = b.binary(BinaryOp::StrictEq, cnt, three);
    let one = b.num(1.0);
    let then = record(&mut b, one);
    let check = b.if_(cond, vec![then], Vec::new());
    b.push_entry(check);
    let class_ref = b.ident("B");
    let method = b.prop(class_ref, "inc");
    let let_inc = b.const_("inc", None, method);
    b.push_entry(let_inc);
    let callee = b.ident("inc");
    let call = b.call(callee, &[]);
    push_record(&mut b, call);
    let class_ref = b.ident("A");
    let read = b.prop(class_ref, "cnt");
    push_record(&mut b, read);
    let program = b.finish();

    assert_eq!(run(&program), vec![1.0, 4.0, 4.0]);
}

/// A method bound inside the base constructor is the derived override,
/// and calling it later sees the derived initializers.
///
/// ```text
/// class Base {                                            // vtable root
///     bound: () => number;
///     constructor() { this.bound = this.boo; }
///     boo(): number { return 0; }
/// }
/// class Derived extends Base {
///     n: number = 5;
///     constructor() { super(); record(this.bound()); }
///     override boo(): number { return this.n; }
/// }
/// new Derived();
/// ```
#[test]
fn override_bound_in_base_constructor() {
    let mut b = ProgramBuilder::new();
    declare_record(&mut b);
    let base = b.class("Base", None, DeclFlags::VTABLE);
    let thunk = b.fn_type(&[], TypeId::NUMBER);
    b.property(base, "bound", thunk, None);
    let target = b.this_prop("bound");
    let method = b.this_prop("boo");
    let assign = b.assign(target, method);
    let bind = b.expr_stmt(assign);
    b.constructor(base, &[], vec![bind]);
    let zero = b.num(0.0);
    let ret = b.ret(Some(zero));
    b.method(base, "boo", &[], Some(TypeId::NUMBER), vec![ret], DeclFlags::VIRTUAL);

    let derived = b.class("Derived", Some(base), DeclFlags::empty());
    let five = b.num(5.0);
    b.property(derived, "n", TypeId::NUMBER, Some(five));
    let sup = b.super_();
    let super_call = b.call(sup, &[]);
    let super_stmt = b.expr_stmt(super_call);
    let this = b.this();
    let call = b.method_call(this, "bound", &[]);
    let report = record(&mut b, call);
    b.constructor(derived, &[], vec![super_stmt, report]);
    let n = b.this_prop("n");
    let ret = b.ret(Some(n));
    b.method(derived, "boo", &[], Some(TypeId::NUMBER), vec![ret], DeclFlags::OVERRIDE);
    for class in [base, derived] {
        let stmt = b.class_stmt(class);
        b.push_entry(stmt);
    }
    let made = b.new_(derived, &[]);
    push_expr(&mut b, made);
    let program = b.finish();

    assert_eq!(run(&program), vec![5.0]);
}
