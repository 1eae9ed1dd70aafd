//! Transaction driver
//!
//! A transaction is an ordered orchestration: bind parameters, create
//! the transaction's `self` composite (with one nested composite per
//! role), run the top-level prepare and then each role's prepare in
//! declaration order, check pre-conditions, run `execute`, check
//! post-conditions. Signers are split off the argument list by declared
//! prepare arity, top-level prepare first, then roles in order.

use crate::error::RuntimeError;
use crate::interpreter::Interpreter;
use crate::value::{CompositeData, Value};
use tally_core::ast::{FunctionDeclaration, TransactionDeclaration};
use tally_core::location::Span;
use tally_core::types::{CompositeKind, CompositeType};
use crate::cast::adapt_to_target;
use crate::error::ConditionKind;
use std::rc::Rc;

pub fn invoke_transaction(
    interpreter: &mut Interpreter,
    index: usize,
    arguments: Vec<Value>,
) -> Result<(), RuntimeError> {
    let declaration = interpreter
        .registry()
        .transaction(index)
        .cloned()
        .ok_or(RuntimeError::TransactionNotDeclared { index })?;

    let parameter_count = declaration.parameters.len();
    let signer_count: usize = prepare_arity(declaration.prepare.as_deref())
        + declaration
            .roles
            .iter()
            .map(|role| prepare_arity(role.prepare.as_deref()))
            .sum::<usize>();
    if arguments.len() != parameter_count + signer_count {
        return Err(RuntimeError::ArgumentCount {
            expected: parameter_count + signer_count,
            actual: arguments.len(),
        });
    }
    let mut arguments = arguments;
    let signers = arguments.split_off(parameter_count);

    let location = interpreter.registry().location.clone();
    let mut self_data = CompositeData::new(CompositeType::new(
        location.clone(),
        "Transaction",
        CompositeKind::Struct,
    ));
    let mut role_values = Vec::new();
    for role in &declaration.roles {
        let role_value = Value::new_composite(CompositeData::new(CompositeType::new(
            location.clone(),
            format!("Transaction.{}", role.name),
            CompositeKind::Struct,
        )));
        self_data
            .fields
            .insert(role.name.clone(), role_value.clone());
        role_values.push(role_value);
    }
    let self_value = Value::new_composite(self_data);

    interpreter.activations_mut().push_isolated();
    let result = run_transaction(
        interpreter,
        &declaration,
        self_value,
        role_values,
        arguments,
        signers,
    );
    match result {
        Ok(()) => interpreter.pop_frame_checking_loss(Span::default()),
        Err(error) => {
            interpreter.activations_mut().pop();
            Err(error)
        }
    }
}

fn prepare_arity(prepare: Option<&FunctionDeclaration>) -> usize {
    prepare.map(|p| p.parameters.len()).unwrap_or(0)
}

fn run_transaction(
    interpreter: &mut Interpreter,
    declaration: &Rc<TransactionDeclaration>,
    self_value: Value,
    role_values: Vec<Value>,
    parameters: Vec<Value>,
    signers: Vec<Value>,
) -> Result<(), RuntimeError> {
    let span = Span::default();
    interpreter.activations_mut().declare("self", self_value);
    for (parameter, argument) in declaration.parameters.iter().zip(parameters) {
        let argument = argument.transfer(None, span)?;
        interpreter.activations_mut().declare(
            parameter.name.clone(),
            adapt_to_target(argument, &parameter.type_annotation),
        );
    }

    // Top-level prepare, then role prepares in declaration order
    let mut signers = signers.into_iter();
    if let Some(prepare) = &declaration.prepare {
        let own: Vec<Value> = signers.by_ref().take(prepare.parameters.len()).collect();
        run_prepare(interpreter, prepare, None, own)?;
    }
    for (role, role_value) in declaration.roles.iter().zip(role_values) {
        if let Some(prepare) = &role.prepare {
            let own: Vec<Value> = signers.by_ref().take(prepare.parameters.len()).collect();
            run_prepare(interpreter, prepare, Some(role_value), own)?;
        }
    }

    interpreter.check_conditions(ConditionKind::Pre, &declaration.preconditions)?;
    if let Some(execute) = &declaration.execute {
        interpreter.eval_block(execute)?;
    }
    interpreter.check_conditions(ConditionKind::Post, &declaration.postconditions)?;
    Ok(())
}

/// Run a prepare body in a fresh frame over the transaction scope.
/// Role prepares see the role composite as `self`.
fn run_prepare(
    interpreter: &mut Interpreter,
    prepare: &FunctionDeclaration,
    role_self: Option<Value>,
    signers: Vec<Value>,
) -> Result<(), RuntimeError> {
    let span = Span::default();
    interpreter.activations_mut().push();
    let result = (|| {
        if let Some(role_self) = role_self {
            interpreter.activations_mut().declare("self", role_self);
        }
        for (parameter, signer) in prepare.parameters.iter().zip(signers) {
            interpreter
                .activations_mut()
                .declare(parameter.name.clone(), signer);
        }
        if let Some(body) = &prepare.body {
            interpreter.eval_statements(&body.statements)?;
        }
        Ok(())
    })();
    match result {
        Ok(()) => interpreter.pop_frame_checking_loss(span),
        Err(error) => {
            interpreter.activations_mut().pop();
            Err(error)
        }
    }
}
