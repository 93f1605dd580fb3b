use pretty_assertions::assert_eq;

use super::*;

#[test]
fn primitives_are_preinterned() {
    let mut pool = TypePool::new();
    assert_eq!(pool.intern(TsType::Number), TypeId::NUMBER);
    assert_eq!(pool.intern(TsType::String), TypeId::STRING);
    assert_eq!(pool.intern(TsType::Undefined), TypeId::UNDEFINED);
    assert_eq!(pool.intern(TsType::Any), TypeId::ANY);
}

#[test]
fn union_flattens_and_dedups() {
    let mut pool = TypePool::new();
    let inner = pool.union(&[TypeId::NUMBER, TypeId::STRING]);
    let outer = pool.union(&[inner, TypeId::NUMBER, TypeId::BOOLEAN]);
    assert_eq!(
        pool.get(outer),
        &TsType::Union(vec![TypeId::NUMBER, TypeId::STRING, TypeId::BOOLEAN])
    );
}

#[test]
fn single_member_union_collapses() {
    let mut pool = TypePool::new();
    assert_eq!(pool.union(&[TypeId::STRING, TypeId::STRING]), TypeId::STRING);
}

#[test]
fn optional_inner_detects_optional_form() {
    let mut pool = TypePool::new();
    let opt = pool.optional(TypeId::NUMBER);
    assert_eq!(pool.optional_inner(opt), Some(TypeId::NUMBER));

    let both = pool.union(&[TypeId::STRING, TypeId::NULL, TypeId::UNDEFINED]);
    assert_eq!(pool.optional_inner(both), Some(TypeId::STRING));

    let plain = pool.union(&[TypeId::STRING, TypeId::NUMBER]);
    assert_eq!(pool.optional_inner(plain), None);

    let two_and_null = pool.union(&[TypeId::STRING, TypeId::NUMBER, TypeId::NULL]);
    assert_eq!(pool.optional_inner(two_and_null), None);
}

#[test]
fn type_param_detection_is_deep() {
    let mut pool = TypePool::new();
    let t = pool.type_param(Name::from_raw(7));
    let f = pool.function(vec![t], TypeId::NUMBER, None);
    let obj = pool.object(vec![(Name::from_raw(3), f)]);
    assert!(pool.mentions_type_param(obj));
    assert!(!pool.mentions_type_param(TypeId::NUMBER));
}
