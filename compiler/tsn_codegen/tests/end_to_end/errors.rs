//! Every kind of rejection, each from the smallest program that triggers it.

use pretty_assertions::assert_eq;
use tsn_codegen::CodegenErrorKind;
use tsn_ir::{Body, DeclFlags, ProgramBuilder, TypeId};

use super::harness::{compile_err, push_expr};

/// ```text
/// function twice(x: number): number { return x; }
/// twice("a");
/// ```
#[test]
fn argument_of_the_wrong_shape() {
    let mut b = ProgramBuilder::new();
    let x = b.param("x", TypeId::NUMBER);
    let rx = b.ident("x");
    let ret = b.ret(Some(rx));
    let f = b.function("twice", &[x], Some(TypeId::NUMBER), vec![ret]);
    let stmt = b.fn_stmt(f);
    b.push_entry(stmt);
    let callee = b.ident("twice");
    let text = b.str("a");
    let call = b.call(callee, &[text]);
    push_expr(&mut b, call);
    let program = b.finish();

    assert_eq!(
        compile_err(&program).kind,
        CodegenErrorKind::ShapeMismatch {
            expected: "number".to_owned(),
            found: "string".to_owned(),
        }
    );
}

/// ```text
/// const v: number | string = 1;
/// v as boolean;
/// ```
#[test]
fn extracting_a_type_the_union_does_not_hold() {
    let mut b = ProgramBuilder::new();
    let ty = b.union_type(&[TypeId::NUMBER, TypeId::STRING]);
    let one = b.num(1.0);
    let let_v = b.const_("v", Some(ty), one);
    b.push_entry(let_v);
    let v = b.ident("v");
    let cast = b.as_(v, TypeId::BOOLEAN);
    push_expr(&mut b, cast);
    let program = b.finish();

    assert_eq!(
        compile_err(&program).kind,
        CodegenErrorKind::UnknownUnionMember {
            union: "union.number|string".to_owned(),
            member: "boolean".to_owned(),
        }
    );
}

/// ```text
/// class Base { area(): number { return 0; } }     // vtable root
/// class Sub extends Base { override perimeter(): number { return 1; } }
/// new Sub();
/// ```
#[test]
fn override_without_a_root_slot() {
    let mut b = ProgramBuilder::new();
    let base = b.class("Base", None, DeclFlags::VTABLE);
    let zero = b.num(0.0);
    let ret = b.ret(Some(zero));
    b.method(base, "area", &[], Some(TypeId::NUMBER), vec![ret], DeclFlags::VIRTUAL);
    let sub = b.class("Sub", Some(base), DeclFlags::empty());
    let one = b.num(1.0);
    let ret = b.ret(Some(one));
    b.method(
        sub,
        "perimeter",
        &[],
        Some(TypeId::NUMBER),
        vec![ret],
        DeclFlags::OVERRIDE,
    );
    for class in [base, sub] {
        let stmt = b.class_stmt(class);
        b.push_entry(stmt);
    }
    let made = b.new_(sub, &[]);
    push_expr(&mut b, made);
    let program = b.finish();

    assert_eq!(
        compile_err(&program).kind,
        CodegenErrorKind::AmbiguousVirtualSlot {
            class: "Sub".to_owned(),
            method: "perimeter".to_owned(),
            candidates: vec!["area".to_owned()],
        }
    );
}

/// ```text
/// function make<T>(): T { return null as T; }
/// make();
/// ```
#[test]
fn generic_function_without_a_binding() {
    let mut b = ProgramBuilder::new();
    let t = b.type_param("T");
    let null = b.null();
    let cast = b.as_(null, t);
    let ret = b.ret(Some(cast));
    let make = b.generic_function("make", &["T"], &[], Some(t), vec![ret]);
    let stmt = b.fn_stmt(make);
    b.push_entry(stmt);
    let callee = b.ident("make");
    let call = b.call(callee, &[]);
    push_expr(&mut b, call);
    let program = b.finish();

    let err = compile_err(&program);
    assert!(matches!(
        err.kind,
        CodegenErrorKind::GenericBindingUnavailable { ref param, .. } if param == "T"
    ));
}

/// ```text
/// const g = (): number => ghost;
/// g();
/// ```
#[test]
fn closure_over_an_unbound_name() {
    let mut b = ProgramBuilder::new();
    let ghost = b.ident("ghost");
    let arrow = b.arrow(&[], Some(TypeId::NUMBER), Body::Expr(ghost));
    let let_g = b.const_("g", None, arrow);
    b.push_entry(let_g);
    let g = b.ident("g");
    let call = b.call(g, &[]);
    push_expr(&mut b, call);
    let program = b.finish();

    assert_eq!(
        compile_err(&program).kind,
        CodegenErrorKind::UnresolvedCapture {
            name: "ghost".to_owned()
        }
    );
}

/// ```text
/// class Point {}
/// Point();
/// ```
#[test]
fn calling_a_class_without_new() {
    let mut b = ProgramBuilder::new();
    let point = b.class("Point", None, DeclFlags::empty());
    let stmt = b.class_stmt(point);
    b.push_entry(stmt);
    let callee = b.ident("Point");
    let call = b.call(callee, &[]);
    push_expr(&mut b, call);
    let program = b.finish();

    assert!(matches!(
        compile_err(&program).kind,
        CodegenErrorKind::Unsupported { .. }
    ));
}

/// ```text
/// declare class Widget { draw(): void; }
/// const draw = new Widget().draw;
/// ```
#[test]
fn native_method_as_a_value() {
    let mut b = ProgramBuilder::new();
    let widget = b.class("Widget", None, DeclFlags::AMBIENT);
    b.ambient_method(widget, "draw", &[], TypeId::VOID, DeclFlags::empty());
    let stmt = b.class_stmt(widget);
    b.push_entry(stmt);
    let made = b.new_(widget, &[]);
    let method = b.prop(made, "draw");
    let let_draw = b.const_("draw", None, method);
    b.push_entry(let_draw);
    let program = b.finish();

    let err = compile_err(&program);
    let CodegenErrorKind::Unsupported { what } = err.kind else {
        panic!("expected unsupported, got {:?}", err.kind);
    };
    assert!(what.contains("Widget.draw"), "{what}");
}

/// A callee the front end never resolved.
#[test]
fn call_to_an_undeclared_function() {
    let mut b = ProgramBuilder::new();
    let callee = b.ident("nowhere");
    let call = b.call(callee, &[]);
    push_expr(&mut b, call);
    let program = b.finish();

    assert!(matches!(
        compile_err(&program).kind,
        CodegenErrorKind::InvalidProgram { .. }
    ));
}
