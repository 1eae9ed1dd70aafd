//! Dynamic cast scenarios: authorization preservation through upcasts,
//! interface and intersection conformance, and forced-cast failures.

mod common;

use common::*;
use std::rc::Rc;
use tally_core::ast::{CastOp, Declaration, Expression, InterfaceDeclaration};
use tally_core::authorization::{Authorization, EntitlementSet};
use tally_core::location::Span;
use tally_core::types::{CompositeKind, CompositeType, InterfaceType, TypeDescriptor};
use tally_runtime::reference::ReferenceValue;
use tally_runtime::{RuntimeError, Value};

fn auth(kinds: &[&str]) -> Authorization {
    Authorization::Entitlements(EntitlementSet::conjunction(
        kinds.iter().map(|k| k.to_string()),
    ))
}

fn int_reference(kinds: &[&str]) -> TypeDescriptor {
    TypeDescriptor::reference(auth(kinds), int_type())
}

/// `(&1 as auth(X, Y) &Int) as auth(X) &Int as? <target>` as a program
fn upcast_then_downcast(target: TypeDescriptor) -> tally_core::ast::Program {
    let mut program = empty_program();
    global_function(
        &mut program,
        "main",
        vec![],
        TypeDescriptor::optional(target.clone()),
        vec![
            let_copy(
                "r",
                int_reference(&["X", "Y"]),
                Expression::Reference {
                    expression: Box::new(Expression::int(1)),
                    target: int_reference(&["X", "Y"]),
                    span: Span::default(),
                },
            ),
            let_copy(
                "up",
                int_reference(&["X"]),
                Expression::Cast {
                    expression: Box::new(Expression::name("r")),
                    op: CastOp::Static,
                    target: int_reference(&["X"]),
                    span: Span::default(),
                },
            ),
            return_value(Expression::Cast {
                expression: Box::new(Expression::name("up")),
                op: CastOp::Failable,
                target,
                span: Span::default(),
            }),
        ],
    );
    program
}

#[test]
fn test_downcast_recovers_original_authorization() {
    let program = upcast_then_downcast(int_reference(&["X", "Y"]));
    let mut fixture = fixture(&program);
    let result = fixture.interpreter.invoke("main", vec![]).unwrap();
    let Value::Optional(Some(inner)) = result else {
        panic!("expected Some, got downcast failure");
    };
    let Value::Reference(reference) = *inner else {
        panic!("expected a reference");
    };
    assert_eq!(*reference.authorization(), auth(&["X", "Y"]));
}

#[test]
fn test_downcast_to_unheld_authorization_fails() {
    let program = upcast_then_downcast(int_reference(&["X", "Z"]));
    let mut fixture = fixture(&program);
    let result = fixture.interpreter.invoke("main", vec![]).unwrap();
    assert!(result.equal(&Value::nil()));
}

#[test]
fn test_force_cast_failure_is_distinct_error() {
    let mut program = empty_program();
    global_function(
        &mut program,
        "main",
        vec![],
        TypeDescriptor::Bool,
        vec![return_value(Expression::Cast {
            expression: Box::new(Expression::int(1)),
            op: CastOp::Force,
            target: TypeDescriptor::Bool,
            span: Span::default(),
        })],
    );
    let mut fixture = fixture(&program);
    let result = fixture.interpreter.invoke("main", vec![]);
    assert!(matches!(
        result,
        Err(RuntimeError::ForceCastTypeMismatch { .. })
    ));
}

fn marker_interface(identifier: &str) -> Declaration {
    Declaration::Interface(Rc::new(InterfaceDeclaration {
        kind: CompositeKind::Resource,
        identifier: identifier.to_string(),
        conformances: vec![],
        functions: vec![],
        destroy_event: None,
        span: Span::default(),
    }))
}

#[test]
fn test_intersection_cast_requires_every_interface() {
    let qualified = |name: &str| script_location().type_id(name);
    let interface_type =
        |name: &str| InterfaceType::new(script_location(), name, CompositeKind::Resource);
    let resource_type = TypeDescriptor::Composite(CompositeType::new(
        script_location(),
        "R",
        CompositeKind::Resource,
    ));

    let mut program = empty_program();
    program.declarations.push(marker_interface("I"));
    program.declarations.push(marker_interface("J"));
    program.declarations.push(marker_interface("K"));
    program.declarations.push(simple_resource(
        "R",
        &["n"],
        vec![qualified("I"), qualified("J")],
    ));

    // R conforms to {I, J} but not {I, K}
    let both = TypeDescriptor::Intersection {
        interfaces: vec![interface_type("I"), interface_type("J")],
    };
    let missing = TypeDescriptor::Intersection {
        interfaces: vec![interface_type("I"), interface_type("K")],
    };

    global_function(
        &mut program,
        "conforming",
        vec![],
        TypeDescriptor::Bool,
        vec![
            let_move(
                "r",
                resource_type.clone(),
                Expression::create(Expression::call(Expression::name("R"), vec![
                    Expression::int(1),
                ])),
            ),
            let_move(
                "cast",
                TypeDescriptor::optional(both.clone()),
                Expression::Cast {
                    expression: Box::new(Expression::move_of(Expression::name("r"))),
                    op: CastOp::Failable,
                    target: both,
                    span: Span::default(),
                },
            ),
            let_copy(
                "ok",
                TypeDescriptor::Bool,
                Expression::Binary {
                    op: tally_core::ast::BinaryOp::NotEqual,
                    left: Box::new(Expression::name("cast")),
                    right: Box::new(Expression::NilLiteral),
                },
            ),
            destroy(Expression::name("cast")),
            return_value(Expression::name("ok")),
        ],
    );
    global_function(
        &mut program,
        "nonconforming",
        vec![],
        TypeDescriptor::Bool,
        vec![
            let_move(
                "r",
                resource_type,
                Expression::create(Expression::call(Expression::name("R"), vec![
                    Expression::int(1),
                ])),
            ),
            let_move(
                "cast",
                TypeDescriptor::optional(missing.clone()),
                Expression::Cast {
                    expression: Box::new(Expression::move_of(Expression::name("r"))),
                    op: CastOp::Failable,
                    target: missing,
                    span: Span::default(),
                },
            ),
            return_value(Expression::Binary {
                op: tally_core::ast::BinaryOp::Equal,
                left: Box::new(Expression::name("cast")),
                right: Box::new(Expression::NilLiteral),
            }),
        ],
    );

    let mut fixture = fixture(&program);
    let conforming = fixture.interpreter.invoke("conforming", vec![]).unwrap();
    assert!(conforming.equal(&Value::Bool(true)));
    let nonconforming = fixture.interpreter.invoke("nonconforming", vec![]).unwrap();
    assert!(nonconforming.equal(&Value::Bool(true)));
}

#[test]
fn test_container_downcast_is_not_covariant() {
    // ([1, 2] as [AnyStruct]) as? [Int] fails even with Int elements
    let mut program = empty_program();
    let any_array = TypeDescriptor::variable_array(TypeDescriptor::AnyStruct);
    let int_array = TypeDescriptor::variable_array(int_type());
    global_function(
        &mut program,
        "main",
        vec![],
        TypeDescriptor::optional(int_array.clone()),
        vec![
            let_copy(
                "xs",
                any_array.clone(),
                Expression::ArrayLiteral {
                    elements: vec![Expression::int(1), Expression::int(2)],
                    ty: any_array,
                },
            ),
            return_value(Expression::Cast {
                expression: Box::new(Expression::name("xs")),
                op: CastOp::Failable,
                target: int_array,
                span: Span::default(),
            }),
        ],
    );
    let mut fixture = fixture(&program);
    let result = fixture.interpreter.invoke("main", vec![]).unwrap();
    assert!(result.equal(&Value::nil()));
}

#[test]
fn test_reference_created_through_binding_keeps_authorization() {
    // The reference value itself reports its creation authorization as
    // its static type
    let value = Value::Reference(ReferenceValue::ephemeral(
        auth(&["X"]),
        int_type(),
        int_value(1),
    ));
    assert_eq!(
        value.static_type(),
        TypeDescriptor::reference(auth(&["X"]), int_type())
    );
}
