//! Attachment scenarios: attach-with entitlements, indexed access,
//! `base` references, and destruction event defaults that mention
//! `base`.

mod common;

use common::*;
use std::rc::Rc;
use tally_core::ast::{
    Block, CompositeDeclaration, Declaration, DestroyEventDeclaration, EventParameter,
    Expression, FunctionDeclaration, Statement,
};
use tally_core::authorization::{Authorization, EntitlementSet};
use tally_core::location::Span;
use tally_core::types::{CompositeKind, CompositeType, TypeDescriptor};
use tally_runtime::{RuntimeError, Value};

fn resource_type(identifier: &str) -> TypeDescriptor {
    TypeDescriptor::Composite(CompositeType::new(
        script_location(),
        identifier,
        CompositeKind::Resource,
    ))
}

/// `attachment A for R { fun baseValue(): Int { return base.n } }`
fn attachment_declaration(destroy_event: Option<DestroyEventDeclaration>) -> Declaration {
    let base_value = FunctionDeclaration::simple(
        "baseValue",
        vec![],
        int_type(),
        Block::new(vec![return_value(Expression::member(
            Expression::name("base"),
            "n",
        ))]),
    );
    Declaration::Composite(Rc::new(CompositeDeclaration {
        kind: CompositeKind::Attachment,
        identifier: "A".to_string(),
        conformances: vec![],
        fields: vec![],
        initializer: None,
        functions: vec![Rc::new(base_value)],
        destroy_event,
        base_type: Some(resource_type("R")),
        required_entitlements: vec!["E".to_string(), "F".to_string()],
        span: Span::default(),
    }))
}

/// `let r <- attach A() to <- create R(5) with (E, F)`
fn attach_statement() -> Statement {
    let_move(
        "r",
        resource_type("R"),
        Expression::Attach {
            attachment: Box::new(Expression::call(Expression::name("A"), vec![])),
            base: Box::new(Expression::move_of(Expression::create(Expression::call(
                Expression::name("R"),
                vec![Expression::int(5)],
            )))),
            entitlements: vec!["E".to_string(), "F".to_string()],
            span: Span::default(),
        },
    )
}

#[test]
fn test_attachment_method_reads_base_through_reference() {
    let mut program = empty_program();
    program.declarations.push(simple_resource("R", &["n"], vec![]));
    program.declarations.push(attachment_declaration(None));
    global_function(
        &mut program,
        "main",
        vec![],
        int_type(),
        vec![
            attach_statement(),
            // r[A]!.baseValue()
            let_copy(
                "n",
                int_type(),
                Expression::call(
                    Expression::member(
                        Expression::Force {
                            expression: Box::new(Expression::index(
                                Expression::name("r"),
                                Expression::name("A"),
                            )),
                            span: Span::default(),
                        },
                        "baseValue",
                    ),
                    vec![],
                ),
            ),
            destroy(Expression::name("r")),
            return_value(Expression::name("n")),
        ],
    );

    let mut fixture = fixture(&program);
    let result = fixture.interpreter.invoke("main", vec![]).unwrap();
    assert!(result.equal(&int_value(5)));
}

#[test]
fn test_attachment_access_on_missing_type_is_nil() {
    let mut program = empty_program();
    program.declarations.push(simple_resource("R", &["n"], vec![]));
    program.declarations.push(attachment_declaration(None));
    global_function(
        &mut program,
        "main",
        vec![],
        TypeDescriptor::Bool,
        vec![
            let_move(
                "r",
                resource_type("R"),
                Expression::create(Expression::call(Expression::name("R"), vec![
                    Expression::int(1),
                ])),
            ),
            let_copy(
                "missing",
                TypeDescriptor::Bool,
                Expression::Binary {
                    op: tally_core::ast::BinaryOp::Equal,
                    left: Box::new(Expression::index(
                        Expression::name("r"),
                        Expression::name("A"),
                    )),
                    right: Box::new(Expression::NilLiteral),
                },
            ),
            destroy(Expression::name("r")),
            return_value(Expression::name("missing")),
        ],
    );

    let mut fixture = fixture(&program);
    let result = fixture.interpreter.invoke("main", vec![]).unwrap();
    assert!(result.equal(&Value::Bool(true)));
}

#[test]
fn test_base_reference_carries_attach_entitlements() {
    // An attachment method returning `base` exposes the authorization
    // granted by the `with (E, F)` clause
    let mut program = empty_program();
    program.declarations.push(simple_resource("R", &["n"], vec![]));
    let Declaration::Composite(base_declaration) = attachment_declaration(None) else {
        unreachable!();
    };
    let mut declaration = (*base_declaration).clone();
    declaration.functions.push(Rc::new(FunctionDeclaration::simple(
        "baseRef",
        vec![],
        TypeDescriptor::reference(Authorization::Unauthorized, resource_type("R")),
        Block::new(vec![return_value(Expression::name("base"))]),
    )));
    program
        .declarations
        .push(Declaration::Composite(Rc::new(declaration)));

    global_function(
        &mut program,
        "main",
        vec![],
        TypeDescriptor::reference(Authorization::Unauthorized, resource_type("R")),
        vec![
            attach_statement(),
            let_copy(
                "b",
                TypeDescriptor::reference(Authorization::Unauthorized, resource_type("R")),
                Expression::call(
                    Expression::member(
                        Expression::Force {
                            expression: Box::new(Expression::index(
                                Expression::name("r"),
                                Expression::name("A"),
                            )),
                            span: Span::default(),
                        },
                        "baseRef",
                    ),
                    vec![],
                ),
            ),
            destroy(Expression::name("r")),
            return_value(Expression::name("b")),
        ],
    );

    let mut fixture = fixture(&program);
    let result = fixture.interpreter.invoke("main", vec![]).unwrap();
    let Value::Reference(reference) = result else {
        panic!("expected a reference, got {:?}", result);
    };
    // Static upcasts never erase the dynamic authorization
    let expected = Authorization::Entitlements(EntitlementSet::conjunction([
        "E".to_string(),
        "F".to_string(),
    ]));
    assert_eq!(*reference.authorization(), expected);
}

#[test]
fn test_attachment_destroy_event_sees_base() {
    // The attachment's ResourceDestroyed default reads base.n; `base`
    // must resolve to the attachment's base reference even though the
    // program declares a global function named `base`.
    let mut program = empty_program();
    program.declarations.push(simple_resource("R", &["n"], vec![]));
    program.declarations.push(attachment_declaration(Some(
        DestroyEventDeclaration {
            parameters: vec![EventParameter {
                name: "baseN".to_string(),
                type_annotation: int_type(),
                default: Expression::member(Expression::name("base"), "n"),
            }],
        },
    )));
    // A decoy global named `base`; the attachment receiver shadows it
    global_function(
        &mut program,
        "base",
        vec![],
        int_type(),
        vec![return_value(Expression::int(-1))],
    );
    global_function(
        &mut program,
        "main",
        vec![],
        TypeDescriptor::Void,
        vec![attach_statement(), destroy(Expression::name("r"))],
    );

    let mut fixture = fixture(&program);
    fixture.interpreter.invoke("main", vec![]).unwrap();

    let events = fixture.events.borrow();
    assert_eq!(events.type_ids(), vec!["S.main.A.ResourceDestroyed"]);
    let Value::Composite(cell) = &events.events[0] else {
        panic!("expected composite event");
    };
    assert!(
        cell.borrow()
            .fields
            .get("baseN")
            .unwrap()
            .equal(&int_value(5)),
        "base default must read the attachment's base, not the global"
    );
}

#[test]
fn test_attachment_destroyed_with_base() {
    let mut program = empty_program();
    program.declarations.push(simple_resource("R", &["n"], vec![]));
    program.declarations.push(attachment_declaration(None));
    global_function(
        &mut program,
        "main",
        vec![],
        TypeDescriptor::Void,
        vec![attach_statement(), destroy(Expression::name("r"))],
    );

    let mut fixture = fixture(&program);
    fixture.interpreter.invoke("main", vec![]).unwrap();
    // base + attachment
    assert_eq!(fixture.interpreter.stats.resources_created, 2);
    assert_eq!(fixture.interpreter.stats.resources_destroyed, 2);
}

#[test]
fn test_attachment_reference_survives_base_move() {
    // Moving the base re-aims the attachment's back-pointer; access
    // through the new owner still works
    let mut program = empty_program();
    program.declarations.push(simple_resource("R", &["n"], vec![]));
    program.declarations.push(attachment_declaration(None));
    global_function(
        &mut program,
        "main",
        vec![],
        int_type(),
        vec![
            attach_statement(),
            let_move("moved", resource_type("R"), Expression::name("r")),
            let_copy(
                "n",
                int_type(),
                Expression::call(
                    Expression::member(
                        Expression::Force {
                            expression: Box::new(Expression::index(
                                Expression::name("moved"),
                                Expression::name("A"),
                            )),
                            span: Span::default(),
                        },
                        "baseValue",
                    ),
                    vec![],
                ),
            ),
            destroy(Expression::name("moved")),
            return_value(Expression::name("n")),
        ],
    );

    let mut fixture = fixture(&program);
    let result = fixture.interpreter.invoke("main", vec![]);
    match result {
        Ok(value) => assert!(value.equal(&int_value(5))),
        Err(error) => panic!("attachment access after base move failed: {error}"),
    }
}

#[test]
fn test_attachment_requires_create_context() {
    // Constructing an attachment outside `attach` is rejected
    let mut program = empty_program();
    program.declarations.push(attachment_declaration(None));
    global_function(
        &mut program,
        "main",
        vec![],
        TypeDescriptor::Void,
        vec![expression(Expression::call(Expression::name("A"), vec![]))],
    );
    let mut fixture = fixture(&program);
    let result = fixture.interpreter.invoke("main", vec![]);
    assert!(matches!(result, Err(RuntimeError::Unreachable { .. })));
}
