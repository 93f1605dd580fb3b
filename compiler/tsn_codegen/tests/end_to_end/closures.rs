//! Captured variables, nested declarations and lazy closures.

use pretty_assertions::assert_eq;
use tsn_ir::{BinaryOp, ProgramBuilder, TypeId};

use super::harness::{declare_record, push_record, record, run};

/// ```text
/// function outer(): number {
///     let x = 1;
///     function f(): number { return x; }
///     function g(): number { let x = 2; return f(); }
///     return g();
/// }
/// record(outer());
/// ```
#[test]
fn callee_reads_the_variable_next_to_its_declaration() {
    let mut b = ProgramBuilder::new();
    declare_record(&mut b);
    let one = b.num(1.0);
    let let_x = b.let_("x", None, one);
    let rx = b.ident("x");
    let ret_x = b.ret(Some(rx));
    let f = b.function("f", &[], Some(TypeId::NUMBER), vec![ret_x]);
    let f_stmt = b.fn_stmt(f);
    let two = b.num(2.0);
    let let_inner_x = b.let_("x", None, two);
    let f_ref = b.ident("f");
    let f_call = b.call(f_ref, &[]);
    let ret_f = b.ret(Some(f_call));
    let g = b.function("g", &[], Some(TypeId::NUMBER), vec![let_inner_x, ret_f]);
    let g_stmt = b.fn_stmt(g);
    let g_ref = b.ident("g");
    let g_call = b.call(g_ref, &[]);
    let ret_g = b.ret(Some(g_call));
    let outer = b.function(
        "outer",
        &[],
        Some(TypeId::NUMBER),
        vec![let_x, f_stmt, g_stmt, ret_g],
    );
    let outer_stmt = b.fn_stmt(outer);
    b.push_entry(outer_stmt);
    let outer_ref = b.ident("outer");
    let call = b.call(outer_ref, &[]);
    push_record(&mut b, call);
    let program = b.finish();

    assert_eq!(run(&program), vec![1.0]);
}

/// ```text
/// function outer(x: number): number {
///     function f(): number { return x; }
///     function g(x: number): number { return f() + x; }
///     return g(10);
/// }
/// record(outer(3));
/// ```
#[test]
fn parameter_shadowing_does_not_redirect_a_capture() {
    let mut b = ProgramBuilder::new();
    declare_record(&mut b);
    let outer_x = b.param("x", TypeId::NUMBER);
    let rx = b.ident("x");
    let ret_x = b.ret(Some(rx));
    let f = b.function("f", &[], Some(TypeId::NUMBER), vec![ret_x]);
    let f_stmt = b.fn_stmt(f);
    let g_x = b.param("x", TypeId::NUMBER);
    let f_ref = b.ident("f");
    let f_call = b.call(f_ref, &[]);
    let gx = b.ident("x");
    let sum = b.binary(BinaryOp::Add, f_call, gx);
    let ret_sum = b.ret(Some(sum));
    let g = b.function("g", &[g_x], Some(TypeId::NUMBER), vec![ret_sum]);
    let g_stmt = b.fn_stmt(g);
    let g_ref = b.ident("g");
    let ten = b.num(10.0);
    let g_call = b.call(g_ref, &[ten]);
    let ret_g = b.ret(Some(g_call));
    let outer = b.function(
        "outer",
        &[outer_x],
        Some(TypeId::NUMBER),
        vec![f_stmt, g_stmt, ret_g],
    );
    let outer_stmt = b.fn_stmt(outer);
    b.push_entry(outer_stmt);
    let outer_ref = b.ident("outer");
    let three = b.num(3.0);
    let call = b.call(outer_ref, &[three]);
    push_record(&mut b, call);
    let program = b.finish();

    assert_eq!(run(&program), vec![13.0]);
}

/// A generic local passed to two call sites is specialized once per
/// signature, and both specializations update the same captured variable.
///
/// ```text
/// function run(): number {
///     let calls = 0;
///     function tag<T>(x: T): T { calls = calls + 1; return x; }
///     function onNumber(f: (x: number) => number): number { return f(8); }
///     function onString(f: (x: string) => string): string { return f("one"); }
///     record(onNumber(tag));
///     if (onString(tag) === "one") record(1);
///     return calls;
/// }
/// record(run());
/// ```
#[test]
fn generic_funarg_specializations_share_captures() {
    let mut b = ProgramBuilder::new();
    declare_record(&mut b);
    let zero = b.num(0.0);
    let let_calls = b.let_("calls", None, zero);

    let t = b.type_param("T");
    let x = b.param("x", t);
    let target = b.ident("calls");
    let current = b.ident("calls");
    let one = b.num(1.0);
    let next = b.binary(BinaryOp::Add, current, one);
    let assign = b.assign(target, next);
    let count = b.expr_stmt(assign);
    let rx = b.ident("x");
    let ret_x = b.ret(Some(rx));
    let tag = b.generic_function("tag", &["T"], &[x], Some(t), vec![count, ret_x]);
    let tag_stmt = b.fn_stmt(tag);

    let eight = b.num(8.0);
    let word = b.str("one");
    let mut sites = Vec::new();
    for (name, ty, arg) in [("onNumber", TypeId::NUMBER, eight), ("onString", TypeId::STRING, word)] {
        let sig = b.fn_type(&[ty], ty);
        let f = b.param("f", sig);
        let callee = b.ident("f");
        let call = b.call(callee, &[arg]);
        let ret = b.ret(Some(call));
        let site = b.function(name, &[f], Some(ty), vec![ret]);
        sites.push(b.fn_stmt(site));
    }

    let callee = b.ident("onNumber");
    let arg = b.ident("tag");
    let call = b.call(callee, &[arg]);
    let report_number = record(&mut b, call);
    let callee = b.ident("onString");
    let arg = b.ident("tag");
    let call = b.call(callee, &[arg]);
    let expected = b.str("one");
    let cond = b.binary(BinaryOp::StrictEq, call, expected);
    let one = b.num(1.0);
    let report_string = record(&mut b, one);
    let check = b.if_(cond, vec![report_string], Vec::new());
    let calls = b.ident("calls");
    let ret_calls = b.ret(Some(calls));

    let mut body = vec![let_calls, tag_stmt];
    body.extend(sites);
    body.extend([report_number, check, ret_calls]);
    let run_fn = b.function("run", &[], Some(TypeId::NUMBER), body);
    let stmt = b.fn_stmt(run_fn);
    b.push_entry(stmt);
    let callee = b.ident("run");
    let call = b.call(callee, &[]);
    push_record(&mut b, call);
    let program = b.finish();

    assert_eq!(run(&program), vec![8.0, 1.0, 2.0]);
}
