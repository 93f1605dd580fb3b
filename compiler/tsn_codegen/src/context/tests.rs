use pretty_assertions::assert_eq;
use tsn_ir::ProgramBuilder;

use super::*;
use crate::resolver::AmbientResolver;

#[test]
fn runtime_is_declared_up_front() {
    let program = ProgramBuilder::new().finish();
    let cx = CodegenCx::new(&program, &AmbientResolver, CodegenConfig::default());

    assert_eq!(
        cx.module.types.struct_fields(cx.rt.closure),
        Some(&[TyId::PTR, TyId::PTR][..])
    );
    assert_eq!(cx.module.types.struct_fields(cx.rt.lazy), Some(&[TyId::PTR][..]));
    assert_eq!(cx.module.function_by_name("__tsn.closure.call"), Some(cx.rt.call));
    let call = cx.module.function(cx.rt.call).unwrap();
    assert!(call.body.is_some());
}

#[test]
fn primitive_types_lower_directly() {
    let program = ProgramBuilder::new().finish();
    let mut cx = CodegenCx::new(&program, &AmbientResolver, CodegenConfig::default());
    let mapper = TypeMapper::default();

    for (ty, info) in [
        (TypeId::NUMBER, TypeInfo::Number),
        (TypeId::BOOLEAN, TypeInfo::Boolean),
        (TypeId::STRING, TypeInfo::String),
        (TypeId::VOID, TypeInfo::Void),
        (TypeId::NULL, TypeInfo::Null),
        (TypeId::UNDEFINED, TypeInfo::Null),
        (TypeId::ANY, TypeInfo::Opaque),
    ] {
        assert_eq!(cx.to_info(ty, &mapper).unwrap(), info);
    }
    assert_eq!(cx.info_name(TypeInfo::Opaque), "any");
    assert_eq!(cx.info_name(TypeInfo::Number), "number");
}

#[test]
fn function_types_keep_a_concrete_signature() {
    let mut b = ProgramBuilder::new();
    let concrete = b.fn_type(&[TypeId::NUMBER], TypeId::STRING);
    let t = b.type_param("T");
    let generic = b.fn_type(&[t], t);
    let program = b.finish();
    let mut cx = CodegenCx::new(&program, &AmbientResolver, CodegenConfig::default());
    let mapper = TypeMapper::default();

    let TypeInfo::Closure(info) = cx.to_info(concrete, &mapper).unwrap() else {
        panic!("expected a closure");
    };
    assert_eq!(info.sig, Some(concrete));
    assert_eq!(cx.info_name(TypeInfo::Closure(info)), "(number)=>string");

    let TypeInfo::Closure(info) = cx.to_info(generic, &mapper).unwrap() else {
        panic!("expected a closure");
    };
    assert_eq!(info.sig, None);
}

#[test]
fn unbound_type_parameter_is_reported() {
    let mut b = ProgramBuilder::new();
    let t = b.type_param("T");
    let program = b.finish();
    let mut cx = CodegenCx::new(&program, &AmbientResolver, CodegenConfig::default());

    let root = TypeMapper::root();
    let mapper = TypeMapper::child_for(&root, "identity");
    let err = cx.to_info(t, &mapper).unwrap_err();
    assert_eq!(
        err.kind,
        CodegenErrorKind::GenericBindingUnavailable {
            decl: "identity".to_owned(),
            param: "T".to_owned(),
        }
    );
}

#[test]
fn bound_type_parameter_resolves_through_the_mapper() {
    let mut b = ProgramBuilder::new();
    let t = b.type_param("T");
    let t_name = b.name("T");
    let program = b.finish();
    let mut cx = CodegenCx::new(&program, &AmbientResolver, CodegenConfig::default());

    let mut mapper = TypeMapper::default();
    mapper.bind(t_name, TypeInfo::String, "T").unwrap();
    assert_eq!(cx.to_info(t, &mapper).unwrap(), TypeInfo::String);
}

#[test]
fn class_layout_reserves_the_vtable_pointer() {
    let mut b = ProgramBuilder::new();
    let base = b.class("Shape", None, DeclFlags::VTABLE);
    b.property(base, "x", TypeId::NUMBER, None);
    let derived = b.class("Circle", Some(base), DeclFlags::empty());
    b.property(derived, "r", TypeId::NUMBER, None);
    b.static_property(derived, "count", TypeId::NUMBER, None);
    let x = b.name("x");
    let r = b.name("r");
    let count = b.name("count");
    let program = b.finish();
    let mut cx = CodegenCx::new(&program, &AmbientResolver, CodegenConfig::default());

    let layout = cx.class_layout(derived).unwrap();
    assert!(layout.has_vptr);
    assert_eq!(layout.props.len(), 2);
    // Base properties come first, after the vtable pointer.
    assert_eq!(layout.field_of(x), Some((1, TypeInfo::Number)));
    assert_eq!(layout.field_of(r), Some((2, TypeInfo::Number)));
    assert_eq!(layout.field_of(count), None);
    assert_eq!(
        cx.module.types.struct_fields(layout.record).map(<[TyId]>::len),
        Some(3)
    );

    let again = cx.class_layout(derived).unwrap();
    assert_eq!(again.record, layout.record);
}

#[test]
fn struct_names_are_made_unique() {
    let mut b = ProgramBuilder::new();
    let class = b.class("Node", None, DeclFlags::empty());
    let program = b.finish();
    let mut cx = CodegenCx::new(&program, &AmbientResolver, CodegenConfig::default());

    assert_eq!(cx.unique_struct_name("class.Node"), "class.Node");
    cx.class_layout(class).unwrap();
    assert_eq!(cx.unique_struct_name("class.Node"), "class.Node.1");
}

#[test]
fn static_properties_live_in_globals() {
    let mut b = ProgramBuilder::new();
    let class = b.class("Counter", None, DeclFlags::empty());
    let count = b.static_property(class, "count", TypeId::NUMBER, None);
    let program = b.finish();
    let mut cx = CodegenCx::new(&program, &AmbientResolver, CodegenConfig::default());

    let g = cx.static_global(count).unwrap();
    assert_eq!(cx.static_global(count).unwrap(), g);
    let global = cx.module.global(g).unwrap();
    assert_eq!(global.name, "static.Counter.count");
    assert!(!global.readonly);
}

#[test]
fn synthetic_environments_are_shared_per_arity() {
    let program = ProgramBuilder::new().finish();
    let mut cx = CodegenCx::new(&program, &AmbientResolver, CodegenConfig::default());

    let two = cx.synthetic_env(2);
    assert_eq!(cx.synthetic_env(2), two);
    assert_ne!(cx.synthetic_env(1), two);
    let env = cx.env(two).unwrap();
    assert_eq!(env.param_count, 2);
    assert_eq!(env.owner, None);
}

#[test]
fn external_name_cannot_shadow_compiled_code() {
    let program = ProgramBuilder::new().finish();
    let mut cx = CodegenCx::new(&program, &AmbientResolver, CodegenConfig::default());

    let print = cx.external_function("print", 1).unwrap();
    assert_eq!(cx.external_function("print", 1).unwrap(), print);

    let compiled = cx.module.declare_function("helper", &[TyId::PTR], TyId::PTR);
    cx.compiled.insert(compiled);
    let err = cx.external_function("helper", 0).unwrap_err();
    assert!(matches!(err.kind, CodegenErrorKind::InvalidProgram { .. }));
}

#[test]
fn unknown_site_is_an_invalid_program() {
    let mut b = ProgramBuilder::new();
    let f = b.function("orphan", &[], None, Vec::new());
    let program = b.finish();
    let cx = CodegenCx::new(&program, &AmbientResolver, CodegenConfig::default());

    let err = cx.site_of(f).unwrap_err();
    assert!(matches!(err.kind, CodegenErrorKind::InvalidProgram { .. }));
}
