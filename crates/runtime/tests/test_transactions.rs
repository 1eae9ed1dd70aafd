//! Transaction driver scenarios: argument/signer splitting, role
//! prepares, condition ordering, and event emission from execute.

mod common;

use common::*;
use std::rc::Rc;
use tally_core::ast::{
    Argument, BinaryOp, Block, Condition, Expression, FunctionDeclaration, Parameter,
    RoleDeclaration, Statement, TransactionDeclaration, Transfer,
};
use tally_core::location::{Address, Span};
use tally_core::path::Path;
use tally_core::types::{CompositeKind, CompositeType, TypeDescriptor};
use tally_runtime::{ConditionKind, RuntimeError, Storage, Value};

fn prepare(parameters: Vec<Parameter>, statements: Vec<Statement>) -> Rc<FunctionDeclaration> {
    Rc::new(FunctionDeclaration::simple(
        "prepare",
        parameters,
        TypeDescriptor::Void,
        Block::new(statements),
    ))
}

fn empty_transaction() -> TransactionDeclaration {
    TransactionDeclaration {
        parameters: vec![],
        fields: vec![],
        prepare: None,
        roles: vec![],
        preconditions: vec![],
        execute: None,
        postconditions: vec![],
    }
}

#[test]
fn test_transaction_not_declared() {
    let program = empty_program();
    let mut fixture = fixture(&program);
    let result = fixture.interpreter.invoke_transaction(0, vec![]);
    assert_eq!(result, Err(RuntimeError::TransactionNotDeclared { index: 0 }));
}

#[test]
fn test_argument_count_includes_signers() {
    let mut program = empty_program();
    let mut transaction = empty_transaction();
    transaction.parameters = vec![Parameter::new("amount", int_type())];
    transaction.prepare = Some(prepare(
        vec![Parameter::new("signer", TypeDescriptor::Unknown)],
        vec![],
    ));
    program.transactions.push(Rc::new(transaction));

    let mut fixture = fixture(&program);
    // amount + one signer expected, only amount given
    let result = fixture.interpreter.invoke_transaction(0, vec![int_value(1)]);
    assert_eq!(
        result,
        Err(RuntimeError::ArgumentCount {
            expected: 2,
            actual: 1
        })
    );
}

#[test]
fn test_prepare_saves_with_transaction_parameter() {
    let mut program = empty_program();
    program.declarations.push(simple_resource("R", &["n"], vec![]));
    let mut transaction = empty_transaction();
    transaction.parameters = vec![Parameter::new("amount", int_type())];
    transaction.prepare = Some(prepare(
        vec![Parameter::new("signer", TypeDescriptor::Unknown)],
        vec![expression(Expression::Call {
            callee: Box::new(Expression::member(Expression::name("signer"), "save")),
            type_arguments: vec![],
            arguments: vec![
                Argument::unlabeled(Expression::move_of(Expression::create(Expression::call(
                    Expression::name("R"),
                    vec![Expression::name("amount")],
                )))),
                Argument::unlabeled(Expression::PathLiteral(Path::storage("r"))),
            ],
            span: Span::default(),
        })],
    ));
    program.transactions.push(Rc::new(transaction));

    let mut fixture = fixture(&program);
    let address = Address::short(1);
    let signer = fixture.interpreter.account(address);
    fixture
        .interpreter
        .invoke_transaction(0, vec![int_value(9), signer])
        .unwrap();

    let stored = fixture
        .storage
        .borrow()
        .read(address, &Path::storage("r"))
        .expect("stored");
    let tally_runtime::storage::StoredValue::Value(Value::Composite(cell)) = stored else {
        panic!("expected stored composite");
    };
    assert!(cell.borrow().fields.get("n").unwrap().equal(&int_value(9)));
}

#[test]
fn test_role_fields_visible_as_self_role_field() {
    // role buyer's prepare sets self.x; the post-condition reads
    // self.buyer.x
    let mut program = empty_program();
    let mut transaction = empty_transaction();
    transaction.roles = vec![RoleDeclaration {
        name: "buyer".to_string(),
        fields: vec![],
        prepare: Some(prepare(
            vec![Parameter::new("signer", TypeDescriptor::Unknown)],
            vec![Statement::Assignment {
                target: Expression::member(Expression::name("self"), "x"),
                transfer: Transfer::Copy,
                value: Expression::int(7),
                span: Span::default(),
            }],
        )),
    }];
    transaction.postconditions = vec![Condition {
        expression: Expression::Binary {
            op: BinaryOp::Equal,
            left: Box::new(Expression::member(
                Expression::member(Expression::name("self"), "buyer"),
                "x",
            )),
            right: Box::new(Expression::int(7)),
        },
        message: Some(Expression::string("role field not visible")),
    }];
    program.transactions.push(Rc::new(transaction));

    let mut fixture = fixture(&program);
    let signer = fixture.interpreter.account(Address::short(1));
    fixture.interpreter.invoke_transaction(0, vec![signer]).unwrap();
}

#[test]
fn test_precondition_failure_before_execute() {
    let mut program = empty_program();
    program.declarations.push(common_event_declaration());
    let mut transaction = empty_transaction();
    transaction.preconditions = vec![Condition {
        expression: Expression::BoolLiteral(false),
        message: Some(Expression::string("never valid")),
    }];
    transaction.execute = Some(Block::new(vec![Statement::Emit {
        call: Expression::call(Expression::name("E"), vec![Expression::int(1)]),
        span: Span::default(),
    }]));
    program.transactions.push(Rc::new(transaction));

    let mut fixture = fixture(&program);
    let result = fixture.interpreter.invoke_transaction(0, vec![]);
    match result {
        Err(RuntimeError::Condition { kind, message }) => {
            assert_eq!(kind, ConditionKind::Pre);
            assert_eq!(message, "never valid");
        }
        other => panic!("expected pre-condition failure, got {:?}", other),
    }
    // execute never ran
    assert!(fixture.events.borrow().events.is_empty());
}

#[test]
fn test_execute_emits_events_in_order() {
    let mut program = empty_program();
    program.declarations.push(common_event_declaration());
    let mut transaction = empty_transaction();
    transaction.execute = Some(Block::new(vec![
        Statement::Emit {
            call: Expression::call(Expression::name("E"), vec![Expression::int(1)]),
            span: Span::default(),
        },
        Statement::Emit {
            call: Expression::call(Expression::name("E"), vec![Expression::int(2)]),
            span: Span::default(),
        },
    ]));
    program.transactions.push(Rc::new(transaction));

    let mut fixture = fixture(&program);
    fixture.interpreter.invoke_transaction(0, vec![]).unwrap();
    let events = fixture.events.borrow();
    assert_eq!(events.type_ids(), vec!["S.main.E", "S.main.E"]);
    let Value::Composite(first) = &events.events[0] else {
        panic!("expected composite event");
    };
    assert!(first.borrow().fields.get("n").unwrap().equal(&int_value(1)));
}

/// `event E(n: Int)` as a composite declaration without an initializer
fn common_event_declaration() -> tally_core::ast::Declaration {
    let tally_core::ast::Declaration::Composite(base) =
        composite_with_kind("E", &["n"], vec![], CompositeKind::Event)
    else {
        unreachable!();
    };
    let mut declaration = (*base).clone();
    declaration.initializer = None;
    tally_core::ast::Declaration::Composite(Rc::new(declaration))
}

#[test]
fn test_transaction_self_composite_is_value_kind() {
    // After a successful run nothing resource-kind remains in scope
    let mut program = empty_program();
    let mut transaction = empty_transaction();
    transaction.execute = Some(Block::new(vec![expression(Expression::int(1))]));
    program.transactions.push(Rc::new(transaction));

    let mut fixture = fixture(&program);
    fixture.interpreter.invoke_transaction(0, vec![]).unwrap();
    assert_eq!(fixture.interpreter.stats.resources_created, 0);
    let _ = CompositeType::new(script_location(), "Transaction", CompositeKind::Struct);
}
