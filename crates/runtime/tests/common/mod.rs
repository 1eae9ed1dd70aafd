//! Shared fixtures for the scenario suites: programs are built directly
//! as elaborated AST values, the way the checker would hand them to the
//! interpreter.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use tally_core::ast::{
    Access, Block, CompositeDeclaration, Declaration, Expression, FieldDeclaration,
    FunctionDeclaration, Parameter, Program, Statement, Transfer,
};
use tally_core::location::{Location, Span};
use tally_core::types::{CompositeKind, IntegerKind, TypeDescriptor};
use tally_runtime::arithmetic::IntegerValue;
use tally_runtime::events::CollectingEventSink;
use tally_runtime::storage::InMemoryStorage;
use tally_runtime::{Interpreter, InterpreterConfig, Value};

pub fn script_location() -> Location {
    Location::Script("main".to_string())
}

pub fn empty_program() -> Program {
    Program::new(script_location())
}

pub struct Fixture {
    pub interpreter: Interpreter,
    pub events: Rc<RefCell<CollectingEventSink>>,
    pub storage: Rc<RefCell<InMemoryStorage>>,
}

pub fn fixture(program: &Program) -> Fixture {
    fixture_with_config(program, InterpreterConfig::new())
}

pub fn fixture_with_config(program: &Program, config: InterpreterConfig) -> Fixture {
    let storage = Rc::new(RefCell::new(InMemoryStorage::new()));
    let events = Rc::new(RefCell::new(CollectingEventSink::new()));
    let interpreter = Interpreter::new(program, storage.clone(), events.clone(), config);
    Fixture {
        interpreter,
        events,
        storage,
    }
}

pub fn int_type() -> TypeDescriptor {
    TypeDescriptor::Integer(IntegerKind::Int)
}

pub fn int_value(n: i64) -> Value {
    Value::Integer(IntegerValue::Int(n.into()))
}

/// `let <name> <- <value>` with a throwaway annotation
pub fn let_move(name: &str, type_annotation: TypeDescriptor, value: Expression) -> Statement {
    Statement::Let {
        name: name.to_string(),
        type_annotation,
        transfer: Transfer::Move,
        value,
        span: Span::default(),
    }
}

pub fn let_copy(name: &str, type_annotation: TypeDescriptor, value: Expression) -> Statement {
    Statement::Let {
        name: name.to_string(),
        type_annotation,
        transfer: Transfer::Copy,
        value,
        span: Span::default(),
    }
}

pub fn assign_field(target: Expression, value: Expression) -> Statement {
    Statement::Assignment {
        target,
        transfer: Transfer::Copy,
        value,
        span: Span::default(),
    }
}

pub fn return_value(value: Expression) -> Statement {
    Statement::Return {
        value: Some(value),
        span: Span::default(),
    }
}

pub fn expression(value: Expression) -> Statement {
    Statement::Expression(value)
}

pub fn destroy(value: Expression) -> Statement {
    Statement::Destroy {
        expression: value,
        span: Span::default(),
    }
}

/// A global function declaration added to the program
pub fn global_function(
    program: &mut Program,
    name: &str,
    parameters: Vec<Parameter>,
    return_type: TypeDescriptor,
    statements: Vec<Statement>,
) {
    program
        .declarations
        .push(Declaration::Function(Rc::new(FunctionDeclaration::simple(
            name,
            parameters,
            return_type,
            Block::new(statements),
        ))));
}

/// A resource declaration with integer fields assigned positionally by
/// an `init` of matching arity
pub fn simple_resource(identifier: &str, fields: &[&str], conformances: Vec<String>) -> Declaration {
    composite_with_kind(identifier, fields, conformances, CompositeKind::Resource)
}

pub fn simple_struct(identifier: &str, fields: &[&str]) -> Declaration {
    composite_with_kind(identifier, fields, Vec::new(), CompositeKind::Struct)
}

pub fn composite_with_kind(
    identifier: &str,
    fields: &[&str],
    conformances: Vec<String>,
    kind: CompositeKind,
) -> Declaration {
    let field_declarations: Vec<FieldDeclaration> = fields
        .iter()
        .map(|name| FieldDeclaration {
            name: name.to_string(),
            type_annotation: int_type(),
            access: Access::Public,
        })
        .collect();
    let initializer = FunctionDeclaration::simple(
        "init",
        fields
            .iter()
            .map(|name| Parameter::new(*name, int_type()))
            .collect(),
        TypeDescriptor::Void,
        Block::new(
            fields
                .iter()
                .map(|name| assign_field(
                    Expression::member(Expression::name("self"), *name),
                    Expression::name(*name),
                ))
                .collect(),
        ),
    );
    Declaration::Composite(Rc::new(CompositeDeclaration {
        kind,
        identifier: identifier.to_string(),
        conformances,
        fields: field_declarations,
        initializer: Some(Rc::new(initializer)),
        functions: vec![],
        destroy_event: None,
        base_type: None,
        required_entitlements: vec![],
        span: Span::default(),
    }))
}
