//! The evaluator
//!
//! Tree-walking evaluation of statements and expressions over a checked
//! program: name resolution through the activation stack, function and
//! method invocation with pre/post conditions and interface condition
//! composition, composite construction and destruction with implicit
//! destruction events, the move/copy transfer discipline, reference
//! creation, casts, and the storage adapter.
//!
//! Evaluation is strictly sequential and single-threaded. All errors
//! unwind to the caller of the public entry points; frames popped during
//! unwind drop their values without destruction events (best-effort
//! cleanup in an already-failed run).

use crate::activation::{Activation, ActivationStack, Variable};
use crate::arithmetic::{FixedValue, IntegerValue};
use crate::cast::{self, adapt_to_target};
use crate::config::InterpreterConfig;
use crate::declarations::DeclarationRegistry;
use crate::error::{ConditionKind, RuntimeError};
use crate::events::{make_event, EventSink};
use crate::invalidation::{InvalidationCause, ResourceState};
use crate::reference::{ContainerGuard, EphemeralReference, ReferenceValue};
use crate::stdlib;
use crate::storage::{self, Storage};
use crate::value::{
    BoundFunction, CompositeData, DictionaryData, DictionaryKey, FunctionValue, HostInvocation,
    InterpretedFunction, Value,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tally_core::ast::{
    Argument, BinaryOp, Block, CastOp, CompositeDeclaration, Condition, DestroyEventDeclaration,
    Expression, IfTest, Program, Statement, SwitchCase, Transfer, UnaryOp,
};
use tally_core::authorization::Authorization;
use tally_core::location::{Address, Span};
use tally_core::types::{CompositeKind, CompositeType, TypeDescriptor};
use tracing::trace;

/// Run counters exposed to the host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub statements: u64,
    pub resources_created: u64,
    pub resources_destroyed: u64,
}

/// Statement-level control flow
#[derive(Debug)]
pub enum Control {
    Normal,
    Break,
    Continue,
    Return(Value),
}

/// Resolved assignment target
enum AssignTarget {
    Variable {
        variable: Variable,
        name: String,
    },
    Field {
        cell: Rc<RefCell<CompositeData>>,
        name: String,
    },
    ArraySlot {
        cell: Rc<RefCell<crate::value::ArrayData>>,
        index: usize,
    },
    DictSlot {
        cell: Rc<RefCell<DictionaryData>>,
        key: DictionaryKey,
    },
}

/// Bindings that are exempt from the scope-exit resource-loss check:
/// the receiver and its base alias live beyond the frame, and `result`
/// is a synthetic view of the return value
const SYNTHETIC_BINDINGS: [&str; 3] = ["self", "base", "result"];

pub struct Interpreter {
    registry: Rc<DeclarationRegistry>,
    config: InterpreterConfig,
    storage: Rc<RefCell<dyn Storage>>,
    events: Rc<RefCell<dyn EventSink>>,
    activations: ActivationStack,
    contract_instances: HashMap<String, Value>,
    call_depth: usize,
    next_uuid: u64,
    pub stats: Stats,
}

impl Interpreter {
    pub fn new(
        program: &Program,
        storage: Rc<RefCell<dyn Storage>>,
        events: Rc<RefCell<dyn EventSink>>,
        config: InterpreterConfig,
    ) -> Self {
        let registry = Rc::new(DeclarationRegistry::from_program(program));
        let mut base = Activation::new();
        stdlib::install_builtins(&mut base);
        if let Some(handler) = &config.base_activation_handler {
            handler(&program.location, &mut base);
        }
        Interpreter {
            registry,
            config,
            storage,
            events,
            activations: ActivationStack::new(base),
            contract_instances: HashMap::new(),
            call_depth: 0,
            next_uuid: 0,
            stats: Stats::default(),
        }
    }

    pub fn registry(&self) -> &DeclarationRegistry {
        &self.registry
    }

    pub fn storage_handle(&self) -> Rc<RefCell<dyn Storage>> {
        self.storage.clone()
    }

    /// The account host object for an address, exposing the storage
    /// adapter operations
    pub fn account(&self, address: Address) -> Value {
        stdlib::account_value(address)
    }

    /// Invoke a top-level function declaration by name
    pub fn invoke(&mut self, name: &str, arguments: Vec<Value>) -> Result<Value, RuntimeError> {
        let declaration = self
            .registry
            .global_function(name)
            .cloned()
            .ok_or_else(|| RuntimeError::unreachable(format!("no function named `{name}`")))?;
        let function = Rc::new(InterpretedFunction {
            declaration,
            member_of: None,
        });
        self.invoke_interpreted(function, None, None, arguments, Span::default())
    }

    /// Invoke the index-th declared transaction
    pub fn invoke_transaction(
        &mut self,
        index: usize,
        arguments: Vec<Value>,
    ) -> Result<(), RuntimeError> {
        crate::transaction::invoke_transaction(self, index, arguments)
    }

    pub(crate) fn fresh_uuid(&mut self) -> u64 {
        self.next_uuid += 1;
        self.next_uuid
    }

    pub(crate) fn emit_event(&mut self, event: Value) {
        self.events.borrow_mut().emit(event);
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    pub fn eval_block(&mut self, block: &Block) -> Result<Control, RuntimeError> {
        self.activations.push();
        match self.eval_statements(&block.statements) {
            Ok(control) => {
                self.pop_frame_checking_loss(Span::default())?;
                Ok(control)
            }
            Err(error) => {
                // Unwind: frame values drop without destruction events
                self.activations.pop();
                Err(error)
            }
        }
    }

    pub(crate) fn eval_statements(
        &mut self,
        statements: &[Statement],
    ) -> Result<Control, RuntimeError> {
        for statement in statements {
            match self.eval_statement(statement)? {
                Control::Normal => {}
                control => return Ok(control),
            }
        }
        Ok(Control::Normal)
    }

    pub fn eval_statement(&mut self, statement: &Statement) -> Result<Control, RuntimeError> {
        if let Some(hook) = &self.config.interrupt
            && hook()
        {
            return Err(RuntimeError::Cancelled);
        }
        self.stats.statements += 1;
        trace!(statement = statement_name(statement), "eval");

        match statement {
            Statement::Expression(expression) => {
                let value = self.eval_expression(expression)?;
                // A discarded expression result must not leak a resource
                if value.resource_state().is_some_and(|state| state.is_live()) {
                    return Err(RuntimeError::ResourceLoss {
                        name: "<expression result>".to_string(),
                        span: expression.span(),
                    });
                }
                Ok(Control::Normal)
            }
            Statement::Let {
                name,
                type_annotation,
                transfer: _,
                value,
                span,
            } => {
                let value = self.eval_expression(value)?;
                let value = value.transfer(None, *span)?;
                self.activations
                    .declare(name.clone(), adapt_to_target(value, type_annotation));
                Ok(Control::Normal)
            }
            Statement::Assignment {
                target,
                transfer,
                value,
                span,
            } => {
                // Value first: `f(x, <-x)`-style invalidation happens
                // before the target is touched
                let value = self.eval_expression(value)?;
                self.assign(target, *transfer, value, *span)?;
                Ok(Control::Normal)
            }
            Statement::Swap { left, right, span } => {
                let left_target = self.resolve_target(left, *span)?;
                let right_target = self.resolve_target(right, *span)?;
                let left_value = self.read_target(&left_target, *span)?;
                let right_value = self.read_target(&right_target, *span)?;
                self.write_target(&left_target, right_value, *span)?;
                self.write_target(&right_target, left_value, *span)?;
                Ok(Control::Normal)
            }
            Statement::If {
                test,
                then_block,
                else_block,
                span,
            } => self.eval_if(test, then_block, else_block.as_ref(), *span),
            Statement::While {
                condition, block, ..
            } => {
                loop {
                    if !self.expect_bool(condition)? {
                        break;
                    }
                    match self.eval_block(block)? {
                        Control::Break => break,
                        Control::Continue | Control::Normal => {}
                        control @ Control::Return(_) => return Ok(control),
                    }
                }
                Ok(Control::Normal)
            }
            Statement::ForIn {
                identifier,
                iterable,
                block,
                span,
            } => self.eval_for_in(identifier, iterable, block, *span),
            Statement::Switch {
                subject, cases, ..
            } => self.eval_switch(subject, cases),
            Statement::Return { value, span } => {
                let value = match value {
                    Some(expression) => self.eval_expression(expression)?,
                    None => Value::Void,
                };
                let _ = span;
                Ok(Control::Return(value))
            }
            Statement::Break { .. } => Ok(Control::Break),
            Statement::Continue { .. } => Ok(Control::Continue),
            Statement::Destroy { expression, span } => {
                let value = self.eval_expression(expression)?;
                self.destroy_value(value, *span)?;
                Ok(Control::Normal)
            }
            Statement::Emit { call, .. } => {
                let event = self.eval_expression(call)?;
                self.emit_event(event);
                Ok(Control::Normal)
            }
        }
    }

    fn eval_if(
        &mut self,
        test: &IfTest,
        then_block: &Block,
        else_block: Option<&Block>,
        span: Span,
    ) -> Result<Control, RuntimeError> {
        match test {
            IfTest::Condition(condition) => {
                if self.expect_bool(condition)? {
                    self.eval_block(then_block)
                } else if let Some(else_block) = else_block {
                    self.eval_block(else_block)
                } else {
                    Ok(Control::Normal)
                }
            }
            IfTest::Binding {
                name,
                type_annotation,
                transfer: _,
                value,
            } => {
                let value = self.eval_expression(value)?;
                match value {
                    Value::Optional(Some(inner)) => {
                        let inner = inner.transfer(None, span)?;
                        self.activations.push();
                        self.activations
                            .declare(name.clone(), adapt_to_target(inner, type_annotation));
                        let result = self.eval_statements(&then_block.statements);
                        match result {
                            Ok(control) => {
                                self.pop_frame_checking_loss(span)?;
                                Ok(control)
                            }
                            Err(error) => {
                                self.activations.pop();
                                Err(error)
                            }
                        }
                    }
                    // nil, or a non-optional that the checker knows is
                    // never nil-bindable
                    _ => match else_block {
                        Some(else_block) => self.eval_block(else_block),
                        None => Ok(Control::Normal),
                    },
                }
            }
        }
    }

    fn eval_for_in(
        &mut self,
        identifier: &str,
        iterable: &Expression,
        block: &Block,
        span: Span,
    ) -> Result<Control, RuntimeError> {
        let iterable = self.eval_expression(iterable)?;
        let items: Vec<Value> = match &iterable {
            Value::Array(cell) => cell.borrow().values.clone(),
            Value::String(s) => s
                .chars()
                .map(|c| Value::Character(Rc::new(c.to_string())))
                .collect(),
            Value::Dictionary(cell) => {
                let data = cell.borrow();
                data.insertion_order.iter().map(|k| k.to_value()).collect()
            }
            other => {
                return Err(RuntimeError::unreachable(format!(
                    "cannot iterate value of type `{}` at {}",
                    other.static_type(),
                    span
                )));
            }
        };
        for item in items {
            self.activations.push();
            self.activations.declare(identifier, item);
            let result = self.eval_statements(&block.statements);
            match result {
                Ok(Control::Break) => {
                    self.pop_frame_checking_loss(span)?;
                    break;
                }
                Ok(Control::Continue) | Ok(Control::Normal) => {
                    self.pop_frame_checking_loss(span)?;
                }
                Ok(control @ Control::Return(_)) => {
                    self.pop_frame_checking_loss(span)?;
                    return Ok(control);
                }
                Err(error) => {
                    self.activations.pop();
                    return Err(error);
                }
            }
        }
        Ok(Control::Normal)
    }

    /// `switch`: first matching case runs, then the switch exits. A
    /// `break` inside a case only ends the case body early.
    fn eval_switch(
        &mut self,
        subject: &Expression,
        cases: &[SwitchCase],
    ) -> Result<Control, RuntimeError> {
        let subject = self.eval_expression(subject)?;
        for case in cases {
            let matches = match &case.value {
                Some(expression) => {
                    let candidate = self.eval_expression(expression)?;
                    subject.equal(&candidate)
                }
                None => true,
            };
            if !matches {
                continue;
            }
            self.activations.push();
            let result = self.eval_statements(&case.statements);
            return match result {
                Ok(Control::Break) | Ok(Control::Normal) => {
                    self.pop_frame_checking_loss(Span::default())?;
                    Ok(Control::Normal)
                }
                Ok(control) => {
                    self.pop_frame_checking_loss(Span::default())?;
                    Ok(control)
                }
                Err(error) => {
                    self.activations.pop();
                    Err(error)
                }
            };
        }
        Ok(Control::Normal)
    }

    // ------------------------------------------------------------------
    // Assignment
    // ------------------------------------------------------------------

    fn assign(
        &mut self,
        target: &Expression,
        transfer: Transfer,
        value: Value,
        span: Span,
    ) -> Result<(), RuntimeError> {
        let target = self.resolve_target(target, span)?;
        let owner = self.target_owner(&target);
        let value = value.transfer(owner, span)?;
        let old = self.read_target(&target, span)?;
        match transfer {
            Transfer::ForceMove => {
                // `<-!` asserts the target slot holds nil
                if !matches!(old, Value::Optional(None)) {
                    return Err(RuntimeError::Overwrite {
                        target: self.target_name(&target),
                    });
                }
            }
            Transfer::Move | Transfer::Copy => {
                if old.resource_state().is_some_and(|state| state.is_live()) {
                    return Err(RuntimeError::ResourceLoss {
                        name: self.target_name(&target),
                        span,
                    });
                }
            }
        }
        self.write_target(&target, value, span)
    }

    fn target_name(&self, target: &AssignTarget) -> String {
        match target {
            AssignTarget::Variable { name, .. } => name.clone(),
            AssignTarget::Field { name, .. } => name.clone(),
            AssignTarget::ArraySlot { index, .. } => format!("[{}]", index),
            AssignTarget::DictSlot { .. } => "[key]".to_string(),
        }
    }

    fn target_owner(&self, target: &AssignTarget) -> Option<Address> {
        match target {
            AssignTarget::Variable { .. } => None,
            AssignTarget::Field { cell, .. } => cell.borrow().owner,
            AssignTarget::ArraySlot { cell, .. } => cell.borrow().owner,
            AssignTarget::DictSlot { cell, .. } => cell.borrow().owner,
        }
    }

    fn resolve_target(
        &mut self,
        expression: &Expression,
        span: Span,
    ) -> Result<AssignTarget, RuntimeError> {
        match expression {
            Expression::Identifier { name, span } => {
                let variable = self.activations.lookup(name).ok_or_else(|| {
                    RuntimeError::unreachable(format!("unresolved identifier `{name}` at {span}"))
                })?;
                Ok(AssignTarget::Variable {
                    variable,
                    name: name.clone(),
                })
            }
            Expression::MemberAccess { target, name, .. } => {
                let base = self.eval_expression(target)?;
                let cell = self.composite_cell_of(base, span)?;
                cell.borrow().state.check_live(span)?;
                Ok(AssignTarget::Field {
                    cell,
                    name: name.clone(),
                })
            }
            Expression::Index { target, index, .. } => {
                let base = self.eval_expression(target)?;
                let index = self.eval_expression(index)?;
                match base {
                    Value::Array(cell) => {
                        let position = array_index(&cell.borrow(), &index)?;
                        Ok(AssignTarget::ArraySlot {
                            cell,
                            index: position,
                        })
                    }
                    Value::Dictionary(cell) => {
                        let key = DictionaryKey::from_value(&index).ok_or_else(|| {
                            RuntimeError::unreachable("unhashable dictionary key")
                        })?;
                        Ok(AssignTarget::DictSlot { cell, key })
                    }
                    other => Err(RuntimeError::unreachable(format!(
                        "cannot index into `{}` at {span}",
                        other.static_type()
                    ))),
                }
            }
            other => Err(RuntimeError::unreachable(format!(
                "invalid assignment target at {}",
                other.span()
            ))),
        }
    }

    /// A composite cell from a direct value or through a reference
    fn composite_cell_of(
        &mut self,
        value: Value,
        span: Span,
    ) -> Result<Rc<RefCell<CompositeData>>, RuntimeError> {
        match value {
            Value::Composite(cell) => Ok(cell),
            Value::Reference(ReferenceValue::Ephemeral(reference)) => {
                reference.check_valid(span)?;
                match &reference.referent {
                    Value::Composite(cell) => Ok(cell.clone()),
                    _ => Err(RuntimeError::unreachable("reference to non-composite")),
                }
            }
            Value::Reference(ReferenceValue::Storage(reference)) => {
                let value = {
                    let storage = self.storage.borrow();
                    storage::dereference(&*storage, &self.registry, &reference, span)?
                };
                match value {
                    Value::Composite(cell) => Ok(cell),
                    _ => Err(RuntimeError::unreachable("reference to non-composite")),
                }
            }
            other => Err(RuntimeError::unreachable(format!(
                "member assignment on `{}`",
                other.static_type()
            ))),
        }
    }

    fn read_target(&self, target: &AssignTarget, span: Span) -> Result<Value, RuntimeError> {
        match target {
            AssignTarget::Variable { variable, .. } => Ok(variable.get()),
            AssignTarget::Field { cell, name } => Ok(cell
                .borrow()
                .fields
                .get(name)
                .cloned()
                .unwrap_or(Value::Optional(None))),
            AssignTarget::ArraySlot { cell, index } => {
                let data = cell.borrow();
                data.values.get(*index).cloned().ok_or_else(|| {
                    RuntimeError::IndexOutOfBounds {
                        index: *index as i128,
                        size: data.values.len(),
                    }
                })
            }
            AssignTarget::DictSlot { cell, key } => Ok(cell
                .borrow()
                .entries
                .get(key)
                .cloned()
                .map(Value::some)
                .unwrap_or(Value::Optional(None))),
        }
        .map(|value| {
            let _ = span;
            value
        })
    }

    fn write_target(
        &mut self,
        target: &AssignTarget,
        value: Value,
        span: Span,
    ) -> Result<(), RuntimeError> {
        match target {
            AssignTarget::Variable { variable, .. } => {
                variable.set(value);
                Ok(())
            }
            AssignTarget::Field { cell, name } => {
                cell.borrow_mut().fields.insert(name.clone(), value);
                Ok(())
            }
            AssignTarget::ArraySlot { cell, index } => {
                let mut data = cell.borrow_mut();
                if *index >= data.values.len() {
                    return Err(RuntimeError::IndexOutOfBounds {
                        index: *index as i128,
                        size: data.values.len(),
                    });
                }
                data.values[*index] = value;
                data.epoch += 1;
                let _ = span;
                Ok(())
            }
            AssignTarget::DictSlot { cell, key } => {
                let mut data = cell.borrow_mut();
                // Dictionary values are optional-typed at the slot
                // level; writing nil removes the entry
                match value {
                    Value::Optional(None) => {
                        data.remove(key);
                    }
                    Value::Optional(Some(inner)) => {
                        data.insert(key.clone(), *inner);
                    }
                    other => {
                        data.insert(key.clone(), other);
                    }
                }
                data.epoch += 1;
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn expect_bool(&mut self, expression: &Expression) -> Result<bool, RuntimeError> {
        match self.eval_expression(expression)? {
            Value::Bool(b) => Ok(b),
            other => Err(RuntimeError::TypeMismatch {
                expected: TypeDescriptor::Bool,
                actual: other.static_type(),
            }),
        }
    }

    pub fn eval_expression(&mut self, expression: &Expression) -> Result<Value, RuntimeError> {
        match expression {
            Expression::NilLiteral => Ok(Value::nil()),
            Expression::BoolLiteral(b) => Ok(Value::Bool(*b)),
            Expression::IntegerLiteral { value, kind } => Ok(Value::Integer(
                IntegerValue::from_bigint(*kind, value.clone())?,
            )),
            Expression::FixedLiteral { raw, kind } => {
                Ok(Value::Fixed(FixedValue::from_mantissa(*kind, *raw)?))
            }
            Expression::StringLiteral(s) => Ok(Value::string(s.clone())),
            Expression::CharacterLiteral(c) => Ok(Value::Character(Rc::new(c.clone()))),
            Expression::AddressLiteral(address) => Ok(Value::Address(*address)),
            Expression::PathLiteral(path) => Ok(Value::Path(path.clone())),
            Expression::ArrayLiteral { elements, ty } => self.eval_array_literal(elements, ty),
            Expression::DictionaryLiteral { entries, ty } => {
                self.eval_dictionary_literal(entries, ty)
            }
            Expression::Identifier { name, span } => self.eval_identifier(name, *span),
            Expression::MemberAccess {
                target,
                name,
                optional_chaining,
                span,
            } => {
                let target = self.eval_expression(target)?;
                if *optional_chaining {
                    match target {
                        Value::Optional(None) => Ok(Value::nil()),
                        Value::Optional(Some(inner)) => {
                            let member = self.get_member(*inner, name, *span)?;
                            Ok(Value::some(member))
                        }
                        other => Ok(Value::some(self.get_member(other, name, *span)?)),
                    }
                } else {
                    self.get_member(target, name, *span)
                }
            }
            Expression::Index {
                target,
                index,
                span,
            } => {
                let target = self.eval_expression(target)?;
                let index = self.eval_expression(index)?;
                self.get_index(target, index, *span)
            }
            Expression::Call {
                callee,
                type_arguments,
                arguments,
                span,
            } => self.eval_call(callee, type_arguments, arguments, *span),
            Expression::Create { call, span } => self.eval_create(call, *span),
            Expression::Attach {
                attachment,
                base,
                entitlements,
                span,
            } => self.eval_attach(attachment, base, entitlements, *span),
            Expression::Move { expression } => {
                let span = expression.span();
                let value = self.eval_expression(expression)?;
                value.transfer(None, span)
            }
            Expression::Unary { op, expression } => {
                let value = self.eval_expression(expression)?;
                match (op, value) {
                    (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                    (UnaryOp::Minus, Value::Integer(n)) => Ok(Value::Integer(n.negate()?)),
                    (UnaryOp::Minus, Value::Fixed(n)) => Ok(Value::Fixed(n.negate()?)),
                    (_, other) => Err(RuntimeError::unreachable(format!(
                        "invalid unary operand of type `{}`",
                        other.static_type()
                    ))),
                }
            }
            Expression::Binary { op, left, right } => self.eval_binary(*op, left, right),
            Expression::Force { expression, span } => {
                match self.eval_expression(expression)? {
                    Value::Optional(Some(inner)) => Ok(*inner),
                    Value::Optional(None) => Err(RuntimeError::ForceNil { span: *span }),
                    other => Ok(other),
                }
            }
            Expression::Cast {
                expression,
                op,
                target,
                span,
            } => {
                let value = self.eval_expression(expression)?;
                match op {
                    // Static upcasts are identity at runtime; the
                    // dynamic authorization of references survives them
                    CastOp::Static => Ok(adapt_to_target(value, target)),
                    CastOp::Failable => {
                        match cast::failable_cast(&self.registry, value, target) {
                            Ok(value) => Ok(Value::some(value)),
                            Err(original) => {
                                // A failed resource downcast leaves the
                                // value owned by the cast expression;
                                // nothing re-binds it, so it ends here.
                                if original
                                    .resource_state()
                                    .is_some_and(|state| state.is_live())
                                {
                                    self.invalidate_silently(&original);
                                }
                                Ok(Value::nil())
                            }
                        }
                    }
                    CastOp::Force => {
                        cast::force_cast(&self.registry, value, target, *span)
                    }
                }
            }
            Expression::Reference {
                expression,
                target,
                span,
            } => self.eval_reference(expression, target, *span),
        }
    }

    fn eval_array_literal(
        &mut self,
        elements: &[Expression],
        ty: &TypeDescriptor,
    ) -> Result<Value, RuntimeError> {
        let (element_type, constant_size) = match ty {
            TypeDescriptor::VariableArray(element) => ((**element).clone(), None),
            TypeDescriptor::ConstantArray { element, size } => ((**element).clone(), Some(*size)),
            other => {
                return Err(RuntimeError::unreachable(format!(
                    "array literal with non-array type `{other}`"
                )));
            }
        };
        let values = elements
            .iter()
            .map(|element| self.eval_expression(element))
            .collect::<Result<Vec<_>, _>>()?;
        let mut data = crate::value::ArrayData::new(element_type, values);
        data.constant_size = constant_size;
        Ok(Value::Array(Rc::new(RefCell::new(data))))
    }

    fn eval_dictionary_literal(
        &mut self,
        entries: &[(Expression, Expression)],
        ty: &TypeDescriptor,
    ) -> Result<Value, RuntimeError> {
        let TypeDescriptor::Dictionary { key, value } = ty else {
            return Err(RuntimeError::unreachable(
                "dictionary literal with non-dictionary type",
            ));
        };
        let mut data = DictionaryData::new((**key).clone(), (**value).clone());
        for (key_expression, value_expression) in entries {
            let key_value = self.eval_expression(key_expression)?;
            let value_value = self.eval_expression(value_expression)?;
            let key = DictionaryKey::from_value(&key_value)
                .ok_or_else(|| RuntimeError::unreachable("unhashable dictionary key"))?;
            data.insert(key, value_value);
        }
        Ok(Value::Dictionary(Rc::new(RefCell::new(data))))
    }

    fn eval_identifier(&mut self, name: &str, span: Span) -> Result<Value, RuntimeError> {
        if let Some(variable) = self.activations.lookup(name) {
            let value = variable.get();
            value.check_live(span)?;
            return Ok(value);
        }
        if let Some(declaration) = self.registry.global_function(name).cloned() {
            return Ok(Value::Function(FunctionValue::Interpreted(Rc::new(
                InterpretedFunction {
                    declaration,
                    member_of: None,
                },
            ))));
        }
        if let Some(type_id) = self.registry.type_id_of(name).map(str::to_string) {
            if let Some(declaration) = self.registry.composite(&type_id).cloned() {
                if declaration.kind == CompositeKind::Contract {
                    return Ok(self.contract_instance(&type_id, &declaration));
                }
                return Ok(Value::Type(TypeDescriptor::Composite(
                    self.registry.composite_type(&declaration),
                )));
            }
            if let Some(interface) = self.registry.interface(&type_id).cloned() {
                return Ok(Value::Type(TypeDescriptor::Interface(
                    self.registry.interface_type(&interface),
                )));
            }
        }
        Err(RuntimeError::unreachable(format!(
            "unresolved identifier `{name}` at {span}"
        )))
    }

    /// Contracts evaluate to a per-type singleton composite so member
    /// functions have a receiver; contract deployment itself is a host
    /// concern
    fn contract_instance(
        &mut self,
        type_id: &str,
        declaration: &Rc<CompositeDeclaration>,
    ) -> Value {
        if let Some(instance) = self.contract_instances.get(type_id) {
            return instance.clone();
        }
        let instance =
            Value::new_composite(CompositeData::new(self.registry.composite_type(declaration)));
        self.contract_instances
            .insert(type_id.to_string(), instance.clone());
        instance
    }

    // ------------------------------------------------------------------
    // Member and index access
    // ------------------------------------------------------------------

    fn get_member(
        &mut self,
        target: Value,
        name: &str,
        span: Span,
    ) -> Result<Value, RuntimeError> {
        match target {
            Value::Composite(cell) => self.composite_member(&cell, name, span, None),
            Value::Reference(ReferenceValue::Ephemeral(reference)) => {
                reference.check_valid(span)?;
                let authorization = reference.authorization.clone();
                match &reference.referent {
                    Value::Composite(cell) => {
                        let cell = cell.clone();
                        self.composite_member(&cell, name, span, Some(authorization))
                    }
                    other => self.get_member(other.clone(), name, span),
                }
            }
            Value::Reference(ReferenceValue::Storage(reference)) => {
                let authorization = reference.authorization.clone();
                let value = {
                    let storage = self.storage.borrow();
                    storage::dereference(&*storage, &self.registry, &reference, span)?
                };
                match value {
                    Value::Composite(cell) => {
                        self.composite_member(&cell, name, span, Some(authorization))
                    }
                    other => self.get_member(other, name, span),
                }
            }
            other => stdlib::builtin_member(&other, name).ok_or_else(|| {
                RuntimeError::unreachable(format!(
                    "no member `{name}` on `{}` at {span}",
                    other.static_type()
                ))
            }),
        }
    }

    /// Member access on a composite. `access_authorization` is `Some`
    /// when the access goes through a reference; `None` is an owned
    /// access.
    fn composite_member(
        &mut self,
        cell: &Rc<RefCell<CompositeData>>,
        name: &str,
        span: Span,
        access_authorization: Option<Authorization>,
    ) -> Result<Value, RuntimeError> {
        cell.borrow().state.check_live(span)?;

        // uuid is an implicit member of every resource
        if name == "uuid"
            && let Some(uuid) = cell.borrow().uuid
        {
            return Ok(Value::Integer(IntegerValue::UInt64(uuid)));
        }

        let type_id = cell.borrow().type_.type_id();
        let declaration = self.registry.composite(&type_id).cloned();

        let field_value = cell.borrow().fields.get(name).cloned();
        if let Some(value) = field_value {
            // Entitlement-mapped fields rewrite the authorization of the
            // reference they hold
            if let Some(declaration) = &declaration
                && let Some(field) = declaration.fields.iter().find(|f| f.name == name)
                && let tally_core::ast::Access::Mapped(mapping_id) = &field.access
                && let Some(mapping) = self.registry.mapping(mapping_id).cloned()
                && let Value::Reference(reference) = &value
            {
                let new_authorization = match &access_authorization {
                    Some(authorization) => mapping.image(authorization),
                    None => {
                        // Owned access: full codomain restricted to what
                        // the stored reference actually carries
                        let held = match reference.authorization() {
                            Authorization::Unauthorized => Default::default(),
                            Authorization::Entitlements(set) => set.kinds.clone(),
                        };
                        mapping.codomain_for(&held)
                    }
                };
                return Ok(Value::Reference(restamp_reference(
                    reference,
                    new_authorization,
                )));
            }
            return Ok(value);
        }

        if let Some(declaration) = &declaration {
            if let Some(function) = self.registry.resolve_member_function(declaration, name) {
                let member_of = self.registry.composite_type(declaration);
                let base = self.attachment_base_reference(cell);
                return Ok(Value::Function(FunctionValue::Bound(Rc::new(
                    BoundFunction {
                        receiver: Value::Composite(cell.clone()),
                        base,
                        function: FunctionValue::Interpreted(Rc::new(InterpretedFunction {
                            declaration: function,
                            member_of: Some(member_of),
                        })),
                    },
                ))));
            }
            if declaration.fields.iter().any(|f| f.name == name) {
                return Err(RuntimeError::UseBeforeInitialization {
                    field: name.to_string(),
                });
            }
        }

        Err(RuntimeError::unreachable(format!(
            "no member `{name}` on `{type_id}` at {span}"
        )))
    }

    /// The implicit `base` reference of an attachment's methods,
    /// authorized with the entitlements the attachment was attached with
    fn attachment_base_reference(&self, cell: &Rc<RefCell<CompositeData>>) -> Option<Value> {
        let data = cell.borrow();
        if data.type_.kind != CompositeKind::Attachment {
            return None;
        }
        let base_cell = data.attachment_base.as_ref()?.upgrade()?;
        let authorization =
            Authorization::conjunction(data.attachment_entitlements.iter().cloned());
        let referent = Value::Composite(base_cell);
        Some(Value::Reference(ReferenceValue::ephemeral(
            authorization,
            referent.static_type(),
            referent,
        )))
    }

    fn get_index(
        &mut self,
        target: Value,
        index: Value,
        span: Span,
    ) -> Result<Value, RuntimeError> {
        match target {
            Value::Array(cell) => {
                let data = cell.borrow();
                let position = array_index(&data, &index)?;
                data.values
                    .get(position)
                    .cloned()
                    .ok_or(RuntimeError::IndexOutOfBounds {
                        index: position as i128,
                        size: data.values.len(),
                    })
            }
            Value::Dictionary(cell) => {
                let key = DictionaryKey::from_value(&index)
                    .ok_or_else(|| RuntimeError::unreachable("unhashable dictionary key"))?;
                let data = cell.borrow();
                Ok(match data.entries.get(&key) {
                    Some(value) => Value::some(value.clone()),
                    None => Value::nil(),
                })
            }
            // Attachment access: composite indexed by attachment type
            Value::Composite(cell) => {
                let Value::Type(TypeDescriptor::Composite(attachment_type)) = index else {
                    return Err(RuntimeError::unreachable("invalid attachment index"));
                };
                cell.borrow().state.check_live(span)?;
                let attachment = cell
                    .borrow()
                    .attachments
                    .get(&attachment_type.type_id())
                    .cloned();
                Ok(match attachment {
                    Some(attachment) => {
                        let borrowed = attachment.static_type();
                        Value::some(Value::Reference(ReferenceValue::ephemeral(
                            Authorization::Unauthorized,
                            borrowed,
                            attachment,
                        )))
                    }
                    None => Value::nil(),
                })
            }
            Value::Reference(ReferenceValue::Ephemeral(reference)) => {
                reference.check_valid(span)?;
                let referent = reference.referent.clone();
                self.get_index(referent, index, span)
            }
            Value::Reference(ReferenceValue::Storage(reference)) => {
                let value = {
                    let storage = self.storage.borrow();
                    storage::dereference(&*storage, &self.registry, &reference, span)?
                };
                self.get_index(value, index, span)
            }
            other => Err(RuntimeError::unreachable(format!(
                "cannot index `{}` at {span}",
                other.static_type()
            ))),
        }
    }

    // ------------------------------------------------------------------
    // Calls, construction, attachment
    // ------------------------------------------------------------------

    fn eval_arguments(&mut self, arguments: &[Argument]) -> Result<Vec<Value>, RuntimeError> {
        // Left-to-right, fully evaluated before any parameter binding
        arguments
            .iter()
            .map(|argument| self.eval_expression(&argument.value))
            .collect()
    }

    fn eval_call(
        &mut self,
        callee: &Expression,
        type_arguments: &[TypeDescriptor],
        arguments: &[Argument],
        span: Span,
    ) -> Result<Value, RuntimeError> {
        let callee_value = self.eval_expression(callee)?;
        let chained = matches!(
            callee,
            Expression::MemberAccess {
                optional_chaining: true,
                ..
            }
        );
        let (callee_value, chained) = match (callee_value, chained) {
            (Value::Optional(None), true) => return Ok(Value::nil()),
            (Value::Optional(Some(inner)), true) => (*inner, true),
            (value, _) => (value, false),
        };
        let arguments = self.eval_arguments(arguments)?;
        let result = match callee_value {
            Value::Function(function) => {
                self.invoke_function_value(function, arguments, type_arguments.to_vec(), span)?
            }
            Value::Type(TypeDescriptor::Composite(composite_type)) => {
                let declaration = self
                    .registry
                    .composite(&composite_type.type_id())
                    .cloned()
                    .ok_or_else(|| {
                        RuntimeError::unreachable(format!(
                            "unknown composite `{}`",
                            composite_type.type_id()
                        ))
                    })?;
                match declaration.kind {
                    CompositeKind::Struct | CompositeKind::Event | CompositeKind::Enum => self
                        .construct_composite(&declaration, composite_type, arguments, None, span)?,
                    _ => {
                        return Err(RuntimeError::unreachable(
                            "resource construction requires `create`",
                        ));
                    }
                }
            }
            other => {
                return Err(RuntimeError::unreachable(format!(
                    "cannot call value of type `{}` at {span}",
                    other.static_type()
                )));
            }
        };
        Ok(if chained { Value::some(result) } else { result })
    }

    fn eval_create(&mut self, call: &Expression, span: Span) -> Result<Value, RuntimeError> {
        let Expression::Call {
            callee, arguments, ..
        } = call
        else {
            return Err(RuntimeError::unreachable("`create` requires a call"));
        };
        let callee_value = self.eval_expression(callee)?;
        let Value::Type(TypeDescriptor::Composite(composite_type)) = callee_value else {
            return Err(RuntimeError::unreachable("`create` on a non-composite"));
        };
        let declaration = self
            .registry
            .composite(&composite_type.type_id())
            .cloned()
            .ok_or_else(|| {
                RuntimeError::unreachable(format!(
                    "unknown composite `{}`",
                    composite_type.type_id()
                ))
            })?;
        let arguments = self.eval_arguments(arguments)?;
        self.construct_composite(&declaration, composite_type, arguments, None, span)
    }

    fn eval_attach(
        &mut self,
        attachment: &Expression,
        base: &Expression,
        entitlements: &[String],
        span: Span,
    ) -> Result<Value, RuntimeError> {
        let base_value = self.eval_expression(base)?;
        let base_value = base_value.transfer(None, span)?;
        let Value::Composite(base_cell) = &base_value else {
            return Err(RuntimeError::unreachable("attach to non-composite"));
        };

        let Expression::Call {
            callee, arguments, ..
        } = attachment
        else {
            return Err(RuntimeError::unreachable("`attach` requires a call"));
        };
        let callee_value = self.eval_expression(callee)?;
        let Value::Type(TypeDescriptor::Composite(attachment_type)) = callee_value else {
            return Err(RuntimeError::unreachable("`attach` on a non-attachment"));
        };
        let declaration = self
            .registry
            .composite(&attachment_type.type_id())
            .cloned()
            .ok_or_else(|| {
                RuntimeError::unreachable(format!(
                    "unknown attachment `{}`",
                    attachment_type.type_id()
                ))
            })?;
        let arguments = self.eval_arguments(arguments)?;

        let attachment_value = self.construct_composite(
            &declaration,
            attachment_type.clone(),
            arguments,
            Some((base_cell.clone(), entitlements.to_vec())),
            span,
        )?;
        if let Value::Composite(attachment_cell) = &attachment_value {
            let mut data = attachment_cell.borrow_mut();
            data.attachment_entitlements = entitlements.to_vec();
            data.attachment_base = Some(Rc::downgrade(base_cell));
        }
        base_cell
            .borrow_mut()
            .attachments
            .insert(attachment_type.type_id(), attachment_value);
        Ok(base_value)
    }

    /// Build a composite: fresh uuid for resources, `init` evaluation
    /// with `self` bound, and a full-initialization check afterwards
    fn construct_composite(
        &mut self,
        declaration: &Rc<CompositeDeclaration>,
        composite_type: CompositeType,
        arguments: Vec<Value>,
        attach: Option<(Rc<RefCell<CompositeData>>, Vec<String>)>,
        span: Span,
    ) -> Result<Value, RuntimeError> {
        let mut data = CompositeData::new(composite_type.clone());
        if matches!(
            declaration.kind,
            CompositeKind::Resource | CompositeKind::Attachment
        ) {
            data.uuid = Some(self.fresh_uuid());
            self.stats.resources_created += 1;
        }
        let value = Value::new_composite(data);

        match &declaration.initializer {
            Some(initializer) => {
                let base = attach.as_ref().map(|(base_cell, entitlements)| {
                    self.base_reference(base_cell, entitlements)
                });
                let function = Rc::new(InterpretedFunction {
                    declaration: initializer.clone(),
                    member_of: Some(composite_type),
                });
                self.invoke_interpreted(function, Some(value.clone()), base, arguments, span)?;
            }
            None => {
                // No declared initializer: fields bind positionally from
                // the arguments, the rule events rely on
                if arguments.len() != declaration.fields.len() {
                    return Err(RuntimeError::ArgumentCount {
                        expected: declaration.fields.len(),
                        actual: arguments.len(),
                    });
                }
                if let Value::Composite(cell) = &value {
                    let mut data = cell.borrow_mut();
                    for (field, argument) in declaration.fields.iter().zip(arguments) {
                        let argument = argument.transfer(None, span)?;
                        data.fields.insert(field.name.clone(), argument);
                    }
                }
            }
        }

        // Every declared field must be assigned by the time init returns
        if let Value::Composite(cell) = &value {
            let data = cell.borrow();
            for field in &declaration.fields {
                if !data.fields.contains_key(&field.name) {
                    return Err(RuntimeError::UseBeforeInitialization {
                        field: field.name.clone(),
                    });
                }
            }
        }
        Ok(value)
    }

    fn base_reference(
        &self,
        base_cell: &Rc<RefCell<CompositeData>>,
        entitlements: &[String],
    ) -> Value {
        let authorization = Authorization::conjunction(entitlements.iter().cloned());
        let referent = Value::Composite(base_cell.clone());
        Value::Reference(ReferenceValue::ephemeral(
            authorization,
            referent.static_type(),
            referent,
        ))
    }

    // ------------------------------------------------------------------
    // Function invocation
    // ------------------------------------------------------------------

    pub fn invoke_function_value(
        &mut self,
        function: FunctionValue,
        arguments: Vec<Value>,
        type_arguments: Vec<TypeDescriptor>,
        span: Span,
    ) -> Result<Value, RuntimeError> {
        match function {
            FunctionValue::Host(host) => {
                let implementation = host.implementation.clone();
                (*implementation)(
                    self,
                    HostInvocation {
                        arguments,
                        type_arguments,
                        span,
                    },
                )
            }
            FunctionValue::Interpreted(function) => {
                self.invoke_interpreted(function, None, None, arguments, span)
            }
            FunctionValue::Bound(bound) => match &bound.function {
                FunctionValue::Host(host) => {
                    let implementation = host.implementation.clone();
                    (*implementation)(
                        self,
                        HostInvocation {
                            arguments,
                            type_arguments,
                            span,
                        },
                    )
                }
                FunctionValue::Interpreted(function) => self.invoke_interpreted(
                    function.clone(),
                    Some(bound.receiver.clone()),
                    bound.base.clone(),
                    arguments,
                    span,
                ),
                FunctionValue::Bound(_) => {
                    Err(RuntimeError::unreachable("doubly-bound function"))
                }
            },
        }
    }

    fn invoke_interpreted(
        &mut self,
        function: Rc<InterpretedFunction>,
        receiver: Option<Value>,
        base: Option<Value>,
        arguments: Vec<Value>,
        span: Span,
    ) -> Result<Value, RuntimeError> {
        let declaration = function.declaration.clone();
        if arguments.len() != declaration.parameters.len() {
            return Err(RuntimeError::ArgumentCount {
                expected: declaration.parameters.len(),
                actual: arguments.len(),
            });
        }
        if self.call_depth >= self.config.max_call_depth {
            return Err(RuntimeError::CallStackLimitExceeded {
                limit: self.config.max_call_depth,
            });
        }
        self.call_depth += 1;
        self.activations.push_isolated();
        let result = self.run_function(&function, receiver, base, arguments, span);
        self.call_depth -= 1;
        match result {
            Ok(value) => {
                self.pop_frame_checking_loss(span)?;
                Ok(value)
            }
            Err(error) => {
                self.activations.pop();
                Err(error)
            }
        }
    }

    fn run_function(
        &mut self,
        function: &Rc<InterpretedFunction>,
        receiver: Option<Value>,
        base: Option<Value>,
        arguments: Vec<Value>,
        span: Span,
    ) -> Result<Value, RuntimeError> {
        let declaration = &function.declaration;
        if let Some(receiver) = receiver {
            self.activations.declare("self", receiver);
        }
        if let Some(base) = base {
            self.activations.declare("base", base);
        }
        for (parameter, argument) in declaration.parameters.iter().zip(arguments) {
            let argument = argument.transfer(None, span)?;
            self.activations.declare(
                parameter.name.clone(),
                adapt_to_target(argument, &parameter.type_annotation),
            );
        }

        // Interface conditions compose around the concrete function's
        // own: interface pre-conditions first (conformance pre-order),
        // the concrete post-conditions first (interfaces reversed after)
        let interface_functions = self.interface_condition_functions(function);
        for interface_function in &interface_functions {
            self.check_conditions(ConditionKind::Pre, &interface_function.preconditions)?;
        }
        self.check_conditions(ConditionKind::Pre, &declaration.preconditions)?;

        // `before(…)` snapshots evaluate at pre-condition time; the
        // bindings stay in the frame for the post-conditions
        for function_with_snapshots in
            std::iter::once(declaration).chain(interface_functions.iter())
        {
            for (name, expression) in &function_with_snapshots.before_snapshots {
                let snapshot = self.eval_expression(expression)?;
                self.activations.declare(name.clone(), snapshot);
            }
        }

        let control = match &declaration.body {
            Some(body) => self.eval_block(body)?,
            None => Control::Normal,
        };
        let value = match control {
            Control::Return(value) => value,
            Control::Normal => Value::Void,
            Control::Break | Control::Continue => {
                return Err(RuntimeError::unreachable(
                    "break/continue escaped function body",
                ));
            }
        };
        let value = adapt_to_target(value.transfer(None, span)?, &declaration.return_type);

        let has_postconditions = !declaration.postconditions.is_empty()
            || interface_functions
                .iter()
                .any(|f| !f.postconditions.is_empty());
        if has_postconditions {
            // Resource returns are exposed to post-conditions as an
            // entitled reference so conditions cannot move the value
            let result_binding = if value.is_resource_kind() {
                let authorization =
                    Authorization::conjunction(self.registry.all_entitlements().cloned());
                Value::Reference(ReferenceValue::ephemeral(
                    authorization,
                    value.static_type(),
                    value.clone(),
                ))
            } else {
                value.clone()
            };
            self.activations.declare("result", result_binding);
            self.check_conditions(ConditionKind::Post, &declaration.postconditions)?;
            for interface_function in interface_functions.iter().rev() {
                self.check_conditions(ConditionKind::Post, &interface_function.postconditions)?;
            }
        }
        Ok(value)
    }

    /// Same-named interface function declarations contributing
    /// conditions, in conformance pre-order
    fn interface_condition_functions(
        &self,
        function: &InterpretedFunction,
    ) -> Vec<Rc<tally_core::ast::FunctionDeclaration>> {
        let Some(composite_type) = &function.member_of else {
            return Vec::new();
        };
        let Some(declaration) = self.registry.composite(&composite_type.type_id()) else {
            return Vec::new();
        };
        let name = &function.declaration.identifier;
        let mut functions = Vec::new();
        for interface_id in self.registry.conformance_preorder(&declaration.conformances) {
            if let Some(interface) = self.registry.interface(&interface_id)
                && let Some(interface_function) =
                    interface.functions.iter().find(|f| &f.identifier == name)
            {
                functions.push(interface_function.clone());
            }
        }
        functions
    }

    pub(crate) fn check_conditions(
        &mut self,
        kind: ConditionKind,
        conditions: &[Condition],
    ) -> Result<(), RuntimeError> {
        for condition in conditions {
            if !self.expect_bool(&condition.expression)? {
                let message = match &condition.message {
                    Some(message) => self.eval_expression(message)?.to_string(),
                    None => String::new(),
                };
                return Err(RuntimeError::Condition { kind, message });
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // References
    // ------------------------------------------------------------------

    fn eval_reference(
        &mut self,
        expression: &Expression,
        target: &TypeDescriptor,
        span: Span,
    ) -> Result<Value, RuntimeError> {
        let optional_target = matches!(target, TypeDescriptor::Optional(_));
        let TypeDescriptor::Reference {
            authorization,
            referenced,
        } = target.unwrap_optionals()
        else {
            return Err(RuntimeError::unreachable(format!(
                "reference expression with non-reference type `{target}`"
            )));
        };

        // Index targets record the container epoch for invalidation on
        // mutation
        let (value, guard) = match expression {
            Expression::Index {
                target: container,
                index,
                span: index_span,
            } => {
                let container = self.eval_expression(container)?;
                let index = self.eval_expression(index)?;
                match container {
                    Value::Array(cell) => {
                        let element = {
                            let data = cell.borrow();
                            let position = array_index(&data, &index)?;
                            data.values.get(position).cloned().ok_or(
                                RuntimeError::IndexOutOfBounds {
                                    index: position as i128,
                                    size: data.values.len(),
                                },
                            )?
                        };
                        (element, Some(ContainerGuard::array(&cell)))
                    }
                    Value::Dictionary(cell) => {
                        let key = DictionaryKey::from_value(&index).ok_or_else(|| {
                            RuntimeError::unreachable("unhashable dictionary key")
                        })?;
                        let element = {
                            let data = cell.borrow();
                            match data.entries.get(&key) {
                                Some(value) => Value::some(value.clone()),
                                None => Value::nil(),
                            }
                        };
                        (element, Some(ContainerGuard::dictionary(&cell)))
                    }
                    other => (self.get_index(other, index, *index_span)?, None),
                }
            }
            other => (self.eval_expression(other)?, None),
        };

        let make = |referent: Value, guard: Option<ContainerGuard>| -> Result<Value, RuntimeError> {
            referent.check_live(span)?;
            let mut reference = EphemeralReference::new(
                authorization.clone(),
                (**referenced).clone(),
                referent,
            );
            reference.container = guard;
            Ok(Value::Reference(ReferenceValue::Ephemeral(Rc::new(
                reference,
            ))))
        };

        match value {
            Value::Optional(None) if optional_target => Ok(Value::nil()),
            Value::Optional(Some(inner)) if optional_target => {
                Ok(Value::some(make(*inner, guard)?))
            }
            value => make(value, guard),
        }
    }

    // ------------------------------------------------------------------
    // Binary operators
    // ------------------------------------------------------------------

    fn eval_binary(
        &mut self,
        op: BinaryOp,
        left: &Expression,
        right: &Expression,
    ) -> Result<Value, RuntimeError> {
        match op {
            BinaryOp::And => {
                if !self.expect_bool(left)? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.expect_bool(right)?))
            }
            BinaryOp::Or => {
                if self.expect_bool(left)? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.expect_bool(right)?))
            }
            BinaryOp::NilCoalesce => {
                // The right operand evaluates only when the left is nil
                match self.eval_expression(left)? {
                    Value::Optional(Some(inner)) => Ok(*inner),
                    Value::Optional(None) => self.eval_expression(right),
                    other => Ok(other),
                }
            }
            BinaryOp::Equal => {
                let left = self.eval_expression(left)?;
                let right = self.eval_expression(right)?;
                Ok(Value::Bool(left.equal(&right)))
            }
            BinaryOp::NotEqual => {
                let left = self.eval_expression(left)?;
                let right = self.eval_expression(right)?;
                Ok(Value::Bool(!left.equal(&right)))
            }
            _ => {
                let left = self.eval_expression(left)?;
                let right = self.eval_expression(right)?;
                numeric_binary(op, left, right)
            }
        }
    }

    // ------------------------------------------------------------------
    // Destruction
    // ------------------------------------------------------------------

    /// `destroy v`: events first, then recursive field teardown, then
    /// the irreversible invalidation
    pub fn destroy_value(&mut self, value: Value, span: Span) -> Result<(), RuntimeError> {
        match value {
            Value::Composite(cell) => {
                if !cell.borrow().is_resource() {
                    return Ok(());
                }
                cell.borrow().state.check_live(span)?;
                self.emit_destroy_events(&cell, span)?;

                let attachments: Vec<Value> = {
                    let mut data = cell.borrow_mut();
                    let keys: Vec<String> = data.attachments.keys().cloned().collect();
                    keys.iter()
                        .filter_map(|key| data.attachments.remove(key))
                        .collect()
                };
                for attachment in attachments {
                    self.destroy_value(attachment, span)?;
                }

                let fields: Vec<Value> = {
                    let mut data = cell.borrow_mut();
                    data.fields.drain().map(|(_, value)| value).collect()
                };
                for field in fields {
                    if field.is_resource_kind() {
                        self.destroy_value(field, span)?;
                    }
                }

                cell.borrow_mut().state =
                    ResourceState::Invalidated(InvalidationCause::Destroyed);
                self.stats.resources_destroyed += 1;
                Ok(())
            }
            Value::Array(cell) => {
                if !cell.borrow().element_type.is_resource_kind() {
                    return Ok(());
                }
                cell.borrow().state.check_live(span)?;
                let values: Vec<Value> = {
                    let mut data = cell.borrow_mut();
                    std::mem::take(&mut data.values)
                };
                for value in values {
                    self.destroy_value(value, span)?;
                }
                cell.borrow_mut().state =
                    ResourceState::Invalidated(InvalidationCause::Destroyed);
                Ok(())
            }
            Value::Dictionary(cell) => {
                if !cell.borrow().value_type.is_resource_kind() {
                    return Ok(());
                }
                cell.borrow().state.check_live(span)?;
                let values: Vec<Value> = {
                    let mut data = cell.borrow_mut();
                    data.insertion_order.clear();
                    data.entries.drain().map(|(_, value)| value).collect()
                };
                for value in values {
                    self.destroy_value(value, span)?;
                }
                cell.borrow_mut().state =
                    ResourceState::Invalidated(InvalidationCause::Destroyed);
                Ok(())
            }
            Value::Optional(Some(inner)) => self.destroy_value(*inner, span),
            _ => Ok(()),
        }
    }

    /// Interface `ResourceDestroyed` events in conformance pre-order,
    /// each interface at most once, then the concrete type's own event
    fn emit_destroy_events(
        &mut self,
        cell: &Rc<RefCell<CompositeData>>,
        span: Span,
    ) -> Result<(), RuntimeError> {
        let type_id = cell.borrow().type_.type_id();
        let Some(declaration) = self.registry.composite(&type_id).cloned() else {
            return Ok(());
        };
        for interface_id in self.registry.conformance_preorder(&declaration.conformances) {
            if let Some(interface) = self.registry.interface(&interface_id).cloned()
                && let Some(event) = &interface.destroy_event
            {
                let qualified_name = format!("{}.ResourceDestroyed", interface.identifier);
                let event_value =
                    self.eval_destroy_event(cell, event, &qualified_name, span)?;
                self.emit_event(event_value);
            }
        }
        if let Some(event) = &declaration.destroy_event {
            let qualified_name = format!("{}.ResourceDestroyed", declaration.identifier);
            let event_value = self.eval_destroy_event(cell, event, &qualified_name, span)?;
            self.emit_event(event_value);
        }
        Ok(())
    }

    /// Default argument expressions evaluate in the *declaration* scope:
    /// only `self` (and `base` for attachments) plus program globals and
    /// builtins are visible, never the destroying scope's locals
    fn eval_destroy_event(
        &mut self,
        cell: &Rc<RefCell<CompositeData>>,
        event: &DestroyEventDeclaration,
        qualified_name: &str,
        span: Span,
    ) -> Result<Value, RuntimeError> {
        self.activations.push_isolated();
        self.activations
            .declare("self", Value::Composite(cell.clone()));
        if let Some(base) = self.attachment_base_reference(cell) {
            // `base` here shadows any program declaration of that name
            self.activations.declare("base", base);
        }
        let mut fields = Vec::new();
        let mut result = Ok(());
        for parameter in &event.parameters {
            match self.eval_expression(&parameter.default) {
                Ok(value) => fields.push((parameter.name.clone(), value)),
                Err(error) => {
                    result = Err(error);
                    break;
                }
            }
        }
        self.activations.pop();
        result?;
        let _ = span;
        Ok(make_event(
            self.registry.location.clone(),
            qualified_name,
            fields,
        ))
    }

    // ------------------------------------------------------------------
    // Frames
    // ------------------------------------------------------------------

    pub(crate) fn activations_mut(&mut self) -> &mut ActivationStack {
        &mut self.activations
    }

    /// Pop the current frame; a live resource left in a binding is a
    /// program error
    pub(crate) fn pop_frame_checking_loss(&mut self, span: Span) -> Result<(), RuntimeError> {
        let activation = self.activations.pop();
        for (name, variable) in activation.bindings() {
            if SYNTHETIC_BINDINGS.contains(&name.as_str()) {
                continue;
            }
            let value = variable.get();
            if value.resource_state().is_some_and(|state| state.is_live()) {
                return Err(RuntimeError::ResourceLoss {
                    name: name.clone(),
                    span,
                });
            }
        }
        Ok(())
    }

    /// Invalidate a resource without emitting destruction events:
    /// failed failable resource casts and unwind cleanup
    fn invalidate_silently(&mut self, value: &Value) {
        match value {
            Value::Composite(cell) => {
                cell.borrow_mut().state =
                    ResourceState::Invalidated(InvalidationCause::Destroyed);
                self.stats.resources_destroyed += 1;
            }
            Value::Array(cell) => {
                cell.borrow_mut().state =
                    ResourceState::Invalidated(InvalidationCause::Destroyed);
            }
            Value::Dictionary(cell) => {
                cell.borrow_mut().state =
                    ResourceState::Invalidated(InvalidationCause::Destroyed);
            }
            Value::Optional(Some(inner)) => self.invalidate_silently(inner),
            _ => {}
        }
    }
}

/// Re-stamp a reference with a new authorization, keeping referent and
/// borrowed type (entitlement mapping application)
fn restamp_reference(reference: &ReferenceValue, authorization: Authorization) -> ReferenceValue {
    match reference {
        ReferenceValue::Ephemeral(ephemeral) => {
            let mut restamped = EphemeralReference::new(
                authorization,
                ephemeral.borrowed_type.clone(),
                ephemeral.referent.clone(),
            );
            restamped.container = ephemeral.container.clone();
            ReferenceValue::Ephemeral(Rc::new(restamped))
        }
        ReferenceValue::Storage(storage) => {
            ReferenceValue::Storage(Rc::new(crate::reference::StorageReference {
                authorization,
                borrowed_type: storage.borrowed_type.clone(),
                address: storage.address,
                path: storage.path.clone(),
            }))
        }
    }
}

fn array_index(
    data: &crate::value::ArrayData,
    index: &Value,
) -> Result<usize, RuntimeError> {
    let Value::Integer(index) = index else {
        return Err(RuntimeError::unreachable("non-integer array index"));
    };
    let raw = index.to_bigint();
    use num_traits::ToPrimitive;
    match raw.to_usize() {
        Some(position) if position < data.values.len() => Ok(position),
        _ => Err(RuntimeError::IndexOutOfBounds {
            index: raw.to_i128().unwrap_or(i128::MAX),
            size: data.values.len(),
        }),
    }
}

fn numeric_binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, RuntimeError> {
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => match op {
            BinaryOp::Add => Ok(Value::Integer(a.add(&b)?)),
            BinaryOp::Subtract => Ok(Value::Integer(a.subtract(&b)?)),
            BinaryOp::Multiply => Ok(Value::Integer(a.multiply(&b)?)),
            BinaryOp::Divide => Ok(Value::Integer(a.divide(&b)?)),
            BinaryOp::Modulo => Ok(Value::Integer(a.modulo(&b)?)),
            BinaryOp::Less => Ok(Value::Bool(a.compare(&b).is_lt())),
            BinaryOp::LessEqual => Ok(Value::Bool(a.compare(&b).is_le())),
            BinaryOp::Greater => Ok(Value::Bool(a.compare(&b).is_gt())),
            BinaryOp::GreaterEqual => Ok(Value::Bool(a.compare(&b).is_ge())),
            _ => Err(RuntimeError::unreachable("invalid integer operator")),
        },
        (Value::Fixed(a), Value::Fixed(b)) => match op {
            BinaryOp::Add => Ok(Value::Fixed(a.add(&b)?)),
            BinaryOp::Subtract => Ok(Value::Fixed(a.subtract(&b)?)),
            BinaryOp::Multiply => Ok(Value::Fixed(a.multiply(&b)?)),
            BinaryOp::Divide => Ok(Value::Fixed(a.divide(&b)?)),
            BinaryOp::Less => Ok(Value::Bool(a.compare(&b).is_lt())),
            BinaryOp::LessEqual => Ok(Value::Bool(a.compare(&b).is_le())),
            BinaryOp::Greater => Ok(Value::Bool(a.compare(&b).is_gt())),
            BinaryOp::GreaterEqual => Ok(Value::Bool(a.compare(&b).is_ge())),
            _ => Err(RuntimeError::unreachable("invalid fixed-point operator")),
        },
        // Strings order lexicographically
        (Value::String(a), Value::String(b)) => match op {
            BinaryOp::Less => Ok(Value::Bool(a < b)),
            BinaryOp::LessEqual => Ok(Value::Bool(a <= b)),
            BinaryOp::Greater => Ok(Value::Bool(a > b)),
            BinaryOp::GreaterEqual => Ok(Value::Bool(a >= b)),
            _ => Err(RuntimeError::unreachable("invalid string operator")),
        },
        (left, right) => Err(RuntimeError::unreachable(format!(
            "invalid operands `{}` and `{}`",
            left.static_type(),
            right.static_type()
        ))),
    }
}

fn statement_name(statement: &Statement) -> &'static str {
    match statement {
        Statement::Expression(_) => "expression",
        Statement::Let { .. } => "let",
        Statement::Assignment { .. } => "assignment",
        Statement::Swap { .. } => "swap",
        Statement::If { .. } => "if",
        Statement::While { .. } => "while",
        Statement::ForIn { .. } => "for-in",
        Statement::Switch { .. } => "switch",
        Statement::Return { .. } => "return",
        Statement::Break { .. } => "break",
        Statement::Continue { .. } => "continue",
        Statement::Destroy { .. } => "destroy",
        Statement::Emit { .. } => "emit",
    }
}
