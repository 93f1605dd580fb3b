//! Unions, optionals, objects, intersections and parameter defaults.

use pretty_assertions::assert_eq;
use tsn_ir::{BinaryOp, Body, DeclFlags, ProgramBuilder, TypeId};

use super::harness::{declare_record, push_expr, push_record, record, run};

/// ```text
/// function greet(times: number = 2, extra?: number): number {
///     if (extra) { return times + (extra as number); }
///     return times;
/// }
/// record(greet()); record(greet(5)); record(greet(5, 1));
/// ```
#[test]
fn defaults_and_optional_parameters() {
    let mut b = ProgramBuilder::new();
    declare_record(&mut b);
    let two = b.num(2.0);
    let times = b.param_with_default("times", TypeId::NUMBER, two);
    let extra = b.optional_param("extra", TypeId::NUMBER);
    let cond = b.ident("extra");
    let rt = b.ident("times");
    let re = b.ident("extra");
    let cast = b.as_(re, TypeId::NUMBER);
    let sum = b.binary(BinaryOp::Add, rt, cast);
    let ret_sum = b.ret(Some(sum));
    let check = b.if_(cond, vec![ret_sum], Vec::new());
    let rt = b.ident("times");
    let ret = b.ret(Some(rt));
    let greet = b.function(
        "greet",
        &[times, extra],
        Some(TypeId::NUMBER),
        vec![check, ret],
    );
    let stmt = b.fn_stmt(greet);
    b.push_entry(stmt);

    let calls: [&[f64]; 3] = [&[], &[5.0], &[5.0, 1.0]];
    for args in calls {
        let args: Vec<_> = args.iter().map(|&n| b.num(n)).collect();
        let callee = b.ident("greet");
        let call = b.call(callee, &args);
        push_record(&mut b, call);
    }
    let program = b.finish();

    assert_eq!(run(&program), vec![2.0, 5.0, 6.0]);
}

/// ```text
/// let o: number | null = null;
/// if (o === null) { record(1); }
/// o = 4;
/// if (o !== null) { record(o as number); }
/// ```
#[test]
fn optional_value_tracks_presence() {
    let mut b = ProgramBuilder::new();
    declare_record(&mut b);
    let opt = b.optional_type(TypeId::NUMBER);
    let null = b.null();
    let let_o = b.let_("o", Some(opt), null);
    b.push_entry(let_o);

    let o = b.ident("o");
    let null = b.null();
    let is_null = b.binary(BinaryOp::StrictEq, o, null);
    let one = b.num(1.0);
    let then = record(&mut b, one);
    let check = b.if_(is_null, vec![then], Vec::new());
    b.push_entry(check);

    let target = b.ident("o");
    let four = b.num(4.0);
    let assign = b.assign(target, four);
    push_expr(&mut b, assign);

    let o = b.ident("o");
    let null = b.null();
    let not_null = b.binary(BinaryOp::StrictNotEq, o, null);
    let o = b.ident("o");
    let value = b.as_(o, TypeId::NUMBER);
    let then = record(&mut b, value);
    let check = b.if_(not_null, vec![then], Vec::new());
    b.push_entry(check);
    let program = b.finish();

    assert_eq!(run(&program), vec![1.0, 4.0]);
}

/// ```text
/// let v: number | string = "seven";
/// v = 7;
/// record(v as number);
/// ```
#[test]
fn general_union_keeps_the_last_member_written() {
    let mut b = ProgramBuilder::new();
    declare_record(&mut b);
    let ty = b.union_type(&[TypeId::NUMBER, TypeId::STRING]);
    let text = b.str("seven");
    let let_v = b.let_("v", Some(ty), text);
    b.push_entry(let_v);
    let target = b.ident("v");
    let seven = b.num(7.0);
    let assign = b.assign(target, seven);
    push_expr(&mut b, assign);
    let v = b.ident("v");
    let value = b.as_(v, TypeId::NUMBER);
    push_record(&mut b, value);
    let program = b.finish();

    assert_eq!(run(&program), vec![7.0]);
}

/// Object members of a union share property slots.
///
/// ```text
/// const s: { x: number } | { x: number, label: string } = { x: 3 };
/// record(s.x);
/// record((s as { x: number }).x);
/// ```
#[test]
fn object_union_reads_through_property_slots() {
    let mut b = ProgramBuilder::new();
    declare_record(&mut b);
    let small = b.object_type(&[("x", TypeId::NUMBER)]);
    let labeled = b.object_type(&[("x", TypeId::NUMBER), ("label", TypeId::STRING)]);
    let ty = b.union_type(&[small, labeled]);
    let three = b.num(3.0);
    let lit = b.object(&[("x", three)]);
    let let_s = b.const_("s", Some(ty), lit);
    b.push_entry(let_s);
    let s = b.ident("s");
    let x = b.prop(s, "x");
    push_record(&mut b, x);
    let s = b.ident("s");
    let cast = b.as_(s, small);
    let x = b.prop(cast, "x");
    push_record(&mut b, x);
    let program = b.finish();

    assert_eq!(run(&program), vec![3.0, 3.0]);
}

/// ```text
/// function sum(q: { x: number, y: number }): number { return q.x + q.y; }
/// const p = { x: 1, y: 2 };
/// record(sum(p));
/// p.x = 10;
/// record(sum(p));
/// class Pt { x: number = 4; y: number = 5; }
/// record(sum(new Pt()));
/// ```
#[test]
fn objects_pass_by_reference_and_classes_are_copied_in() {
    let mut b = ProgramBuilder::new();
    declare_record(&mut b);
    let shape = b.object_type(&[("x", TypeId::NUMBER), ("y", TypeId::NUMBER)]);
    let q = b.param("q", shape);
    let q1 = b.ident("q");
    let qx = b.prop(q1, "x");
    let q2 = b.ident("q");
    let qy = b.prop(q2, "y");
    let total = b.binary(BinaryOp::Add, qx, qy);
    let ret = b.ret(Some(total));
    let sum = b.function("sum", &[q], Some(TypeId::NUMBER), vec![ret]);
    let stmt = b.fn_stmt(sum);
    b.push_entry(stmt);

    let pt = b.class("Pt", None, DeclFlags::empty());
    let four = b.num(4.0);
    b.property(pt, "x", TypeId::NUMBER, Some(four));
    let five = b.num(5.0);
    b.property(pt, "y", TypeId::NUMBER, Some(five));
    let stmt = b.class_stmt(pt);
    b.push_entry(stmt);

    let one = b.num(1.0);
    let two = b.num(2.0);
    let lit = b.object(&[("x", one), ("y", two)]);
    let let_p = b.const_("p", None, lit);
    b.push_entry(let_p);
    let p = b.ident("p");
    let callee = b.ident("sum");
    let call = b.call(callee, &[p]);
    push_record(&mut b, call);

    let p = b.ident("p");
    let target = b.prop(p, "x");
    let ten = b.num(10.0);
    let assign = b.assign(target, ten);
    push_expr(&mut b, assign);
    let p = b.ident("p");
    let callee = b.ident("sum");
    let call = b.call(callee, &[p]);
    push_record(&mut b, call);

    let made = b.new_(pt, &[]);
    let callee = b.ident("sum");
    let call = b.call(callee, &[made]);
    push_record(&mut b, call);
    let program = b.finish();

    assert_eq!(run(&program), vec![3.0, 12.0, 9.0]);
}

/// ```text
/// interface Named { name: string }
/// interface Sized { w: number; h: number }
/// function area(s: Named & Sized): number { return s.w * s.h; }
/// function width(s: Sized): number { return s.w; }
/// const boxed: Named & Sized = { name: "box", w: 3, h: 4 };
/// record(area(boxed)); record(width(boxed));
/// ```
#[test]
fn intersection_fields_and_member_projection() {
    let mut b = ProgramBuilder::new();
    declare_record(&mut b);
    let named = b.interface("Named", &[("name", TypeId::STRING)]);
    let sized = b.interface("Sized", &[("w", TypeId::NUMBER), ("h", TypeId::NUMBER)]);
    let both = b.intersection_type(&[named, sized]);

    let s = b.param("s", both);
    let s1 = b.ident("s");
    let w = b.prop(s1, "w");
    let s2 = b.ident("s");
    let h = b.prop(s2, "h");
    let product = b.binary(BinaryOp::Mul, w, h);
    let ret = b.ret(Some(product));
    let area = b.function("area", &[s], Some(TypeId::NUMBER), vec![ret]);
    let stmt = b.fn_stmt(area);
    b.push_entry(stmt);

    let s = b.param("s", sized);
    let s1 = b.ident("s");
    let w = b.prop(s1, "w");
    let ret = b.ret(Some(w));
    let width = b.function("width", &[s], Some(TypeId::NUMBER), vec![ret]);
    let stmt = b.fn_stmt(width);
    b.push_entry(stmt);

    let label = b.str("box");
    let three = b.num(3.0);
    let four = b.num(4.0);
    let lit = b.object(&[("name", label), ("w", three), ("h", four)]);
    let let_box = b.const_("boxed", Some(both), lit);
    b.push_entry(let_box);
    for f in ["area", "width"] {
        let arg = b.ident("boxed");
        let callee = b.ident(f);
        let call = b.call(callee, &[arg]);
        push_record(&mut b, call);
    }
    let program = b.finish();

    assert_eq!(run(&program), vec![12.0, 3.0]);
}

/// `&&` and `||` short-circuit and yield booleans.
///
/// ```text
/// let hits = 0;
/// function touch(): boolean { hits = hits + 1; return true; }
/// if (false && touch()) { record(-1); }
/// if (true || touch()) { record(hits); }
/// ```
#[test]
fn logical_operators_short_circuit() {
    let mut b = ProgramBuilder::new();
    declare_record(&mut b);
    let zero = b.num(0.0);
    let let_hits = b.let_("hits", None, zero);
    b.push_entry(let_hits);
    let target = b.ident("hits");
    let current = b.ident("hits");
    let one = b.num(1.0);
    let next = b.binary(BinaryOp::Add, current, one);
    let assign = b.assign(target, next);
    let bump = b.expr_stmt(assign);
    let yes = b.bool(true);
    let ret = b.ret(Some(yes));
    let touch = b.function("touch", &[], Some(TypeId::BOOLEAN), vec![bump, ret]);
    let stmt = b.fn_stmt(touch);
    b.push_entry(stmt);

    let no = b.bool(false);
    let callee = b.ident("touch");
    let call = b.call(callee, &[]);
    let and = b.binary(BinaryOp::And, no, call);
    let minus_one = b.num(-1.0);
    let then = record(&mut b, minus_one);
    let check = b.if_(and, vec![then], Vec::new());
    b.push_entry(check);

    let yes = b.bool(true);
    let callee = b.ident("touch");
    let call = b.call(callee, &[]);
    let or = b.binary(BinaryOp::Or, yes, call);
    let hits = b.ident("hits");
    let then = record(&mut b, hits);
    let check = b.if_(or, vec![then], Vec::new());
    b.push_entry(check);
    let program = b.finish();

    assert_eq!(run(&program), vec![0.0]);
}

/// ```text
/// function app(f: any): number | string { return f(); }
/// const g: any = () => "five";
/// if ((app(g) as string) === "five") { record(1); }
/// const h: any = () => 4;
/// record(app(h) as number);
/// ```
#[test]
fn any_value_enters_a_union_as_its_member() {
    let mut b = ProgramBuilder::new();
    declare_record(&mut b);
    let either = b.union_type(&[TypeId::NUMBER, TypeId::STRING]);
    let f = b.param("f", TypeId::ANY);
    let callee = b.ident("f");
    let call = b.call(callee, &[]);
    let ret = b.ret(Some(call));
    let app = b.function("app", &[f], Some(either), vec![ret]);
    let stmt = b.fn_stmt(app);
    b.push_entry(stmt);

    let five = b.str("five");
    let text = b.arrow(&[], None, Body::Expr(five));
    let let_g = b.const_("g", Some(TypeId::ANY), text);
    b.push_entry(let_g);
    let callee = b.ident("app");
    let g = b.ident("g");
    let call = b.call(callee, &[g]);
    let cast = b.as_(call, TypeId::STRING);
    let expected = b.str("five");
    let same = b.binary(BinaryOp::StrictEq, cast, expected);
    let one = b.num(1.0);
    let then = record(&mut b, one);
    let check = b.if_(same, vec![then], Vec::new());
    b.push_entry(check);

    let four = b.num(4.0);
    let number = b.arrow(&[], None, Body::Expr(four));
    let let_h = b.const_("h", Some(TypeId::ANY), number);
    b.push_entry(let_h);
    let callee = b.ident("app");
    let h = b.ident("h");
    let call = b.call(callee, &[h]);
    let cast = b.as_(call, TypeId::NUMBER);
    push_record(&mut b, cast);
    let program = b.finish();

    assert_eq!(run(&program), vec![1.0, 4.0]);
}

/// ```text
/// const u: number | string = 7;
/// const a: any = u;
/// const w: number | string = a;
/// record(w as number);
/// const o: number | null = 5;
/// const p: any = o;
/// record(p as number);
/// ```
#[test]
fn union_passes_through_any_as_its_member() {
    let mut b = ProgramBuilder::new();
    declare_record(&mut b);
    let either = b.union_type(&[TypeId::NUMBER, TypeId::STRING]);
    let seven = b.num(7.0);
    let let_u = b.const_("u", Some(either), seven);
    b.push_entry(let_u);
    let u = b.ident("u");
    let let_a = b.const_("a", Some(TypeId::ANY), u);
    b.push_entry(let_a);
    let a = b.ident("a");
    let let_w = b.const_("w", Some(either), a);
    b.push_entry(let_w);
    let w = b.ident("w");
    let value = b.as_(w, TypeId::NUMBER);
    push_record(&mut b, value);

    let maybe = b.optional_type(TypeId::NUMBER);
    let five = b.num(5.0);
    let let_o = b.const_("o", Some(maybe), five);
    b.push_entry(let_o);
    let o = b.ident("o");
    let let_p = b.const_("p", Some(TypeId::ANY), o);
    b.push_entry(let_p);
    let p = b.ident("p");
    let value = b.as_(p, TypeId::NUMBER);
    push_record(&mut b, value);
    let program = b.finish();

    assert_eq!(run(&program), vec![7.0, 5.0]);
}
