//! Elaborated abstract syntax tree
//!
//! The interpreter consumes programs that have already been parsed and
//! type-checked: every declaration, binding, cast, and reference
//! expression carries the type descriptor the checker elaborated for it.
//! Nothing in the runtime infers types; an annotation that is missing or
//! wrong is a checker bug, not something the evaluator recovers from.

use crate::authorization::Authorization;
use crate::location::{Address, Location, Span};
use crate::path::Path;
use crate::types::{CompositeKind, FixedKind, IntegerKind, TypeDescriptor};
use num_bigint::BigInt;
use std::rc::Rc;

/// A checked program: declarations plus the transactions it declares, in
/// source order
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub location: Location,
    pub declarations: Vec<Declaration>,
    pub transactions: Vec<Rc<TransactionDeclaration>>,
}

impl Program {
    pub fn new(location: Location) -> Self {
        Program {
            location,
            declarations: Vec::new(),
            transactions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Declaration {
    Composite(Rc<CompositeDeclaration>),
    Interface(Rc<InterfaceDeclaration>),
    Function(Rc<FunctionDeclaration>),
    Entitlement(EntitlementDeclaration),
    EntitlementMapping(EntitlementMappingDeclaration),
}

/// A struct, resource, contract, event, enum, or attachment declaration
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeDeclaration {
    pub kind: CompositeKind,
    /// Simple name; the qualified identifier is derived from the program
    /// location at registration time
    pub identifier: String,
    /// Conformances as fully-qualified interface identifiers, in declared
    /// order
    pub conformances: Vec<String>,
    pub fields: Vec<FieldDeclaration>,
    pub initializer: Option<Rc<FunctionDeclaration>>,
    pub functions: Vec<Rc<FunctionDeclaration>>,
    /// `event ResourceDestroyed(…)` declared on the composite, if any
    pub destroy_event: Option<DestroyEventDeclaration>,
    /// Attachments only: the base type this attachment attaches to
    pub base_type: Option<TypeDescriptor>,
    /// Attachments only: entitlements the attachment requires from its
    /// base, as fully-qualified identifiers
    pub required_entitlements: Vec<String>,
    pub span: Span,
}

/// An interface declaration (struct or resource interface)
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceDeclaration {
    pub kind: CompositeKind,
    pub identifier: String,
    /// Parent interfaces, fully qualified, in declared order
    pub conformances: Vec<String>,
    /// Function requirements; bodies are optional, conditions are not
    pub functions: Vec<Rc<FunctionDeclaration>>,
    pub destroy_event: Option<DestroyEventDeclaration>,
    pub span: Span,
}

/// An entitlement declaration; carries no payload beyond its name
#[derive(Debug, Clone, PartialEq)]
pub struct EntitlementDeclaration {
    pub identifier: String,
    pub span: Span,
}

/// An entitlement mapping declaration: `entitlement mapping M { X -> Y }`
#[derive(Debug, Clone, PartialEq)]
pub struct EntitlementMappingDeclaration {
    pub identifier: String,
    /// `(input, output)` pairs as fully-qualified entitlement identifiers
    pub entries: Vec<(String, String)>,
    pub span: Span,
}

/// Field access control, already resolved by the checker
#[derive(Debug, Clone, PartialEq)]
pub enum Access {
    Public,
    /// Access requires the given authorization on the accessing reference
    Entitled(Authorization),
    /// Access through an entitlement mapping; the produced reference's
    /// authorization is the mapping image of the access authorization
    Mapped(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDeclaration {
    pub name: String,
    pub type_annotation: TypeDescriptor,
    pub access: Access,
}

/// The implicit `ResourceDestroyed` event attached to a resource or
/// resource interface. Parameters carry default expressions evaluated in
/// the declaration scope with only `self` (and `base`, for attachments)
/// in scope.
#[derive(Debug, Clone, PartialEq)]
pub struct DestroyEventDeclaration {
    pub parameters: Vec<EventParameter>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventParameter {
    pub name: String,
    pub type_annotation: TypeDescriptor,
    pub default: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDeclaration {
    pub identifier: String,
    pub parameters: Vec<Parameter>,
    pub return_type: TypeDescriptor,
    pub preconditions: Vec<Condition>,
    pub postconditions: Vec<Condition>,
    /// `before(…)` expressions the checker lifted out of
    /// post-conditions: evaluated at pre-condition time, bound under the
    /// checker-chosen name, and visible to post-conditions
    pub before_snapshots: Vec<(String, Expression)>,
    pub body: Option<Block>,
    pub span: Span,
}

impl FunctionDeclaration {
    /// Convenience for declarations with no conditions, used heavily in
    /// tests
    pub fn simple(
        identifier: impl Into<String>,
        parameters: Vec<Parameter>,
        return_type: TypeDescriptor,
        body: Block,
    ) -> Self {
        FunctionDeclaration {
            identifier: identifier.into(),
            parameters,
            return_type,
            preconditions: Vec::new(),
            postconditions: Vec::new(),
            before_snapshots: Vec::new(),
            body: Some(body),
            span: Span::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// External argument label; `None` means the parameter name doubles
    /// as the label, `Some("_")`-style unlabelled calls are represented
    /// by the checker as `None` here
    pub label: Option<String>,
    pub name: String,
    pub type_annotation: TypeDescriptor,
}

impl Parameter {
    pub fn new(name: impl Into<String>, type_annotation: TypeDescriptor) -> Self {
        Parameter {
            label: None,
            name: name.into(),
            type_annotation,
        }
    }
}

/// A pre- or post-condition with an optional message expression
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub expression: Expression,
    pub message: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionDeclaration {
    pub parameters: Vec<Parameter>,
    pub fields: Vec<FieldDeclaration>,
    /// Top-level prepare; its parameters are the transaction signers
    pub prepare: Option<Rc<FunctionDeclaration>>,
    /// Roles in declaration order; each may declare fields and its own
    /// prepare
    pub roles: Vec<RoleDeclaration>,
    pub preconditions: Vec<Condition>,
    pub execute: Option<Block>,
    pub postconditions: Vec<Condition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoleDeclaration {
    pub name: String,
    pub fields: Vec<FieldDeclaration>,
    pub prepare: Option<Rc<FunctionDeclaration>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub statements: Vec<Statement>,
}

impl Block {
    pub fn new(statements: Vec<Statement>) -> Self {
        Block { statements }
    }
}

/// How a value moves into a binding or location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    /// `=`: copy for value-kind, forbidden for resource-kind
    Copy,
    /// `<-`: move; invalidates the source for resource-kind
    Move,
    /// `<-!`: move, but only into a currently-nil target
    ForceMove,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Expression(Expression),
    Let {
        name: String,
        type_annotation: TypeDescriptor,
        transfer: Transfer,
        value: Expression,
        span: Span,
    },
    Assignment {
        target: Expression,
        transfer: Transfer,
        value: Expression,
        span: Span,
    },
    /// `a <-> b`
    Swap {
        left: Expression,
        right: Expression,
        span: Span,
    },
    If {
        test: IfTest,
        then_block: Block,
        else_block: Option<Block>,
        span: Span,
    },
    While {
        condition: Expression,
        block: Block,
        span: Span,
    },
    ForIn {
        identifier: String,
        iterable: Expression,
        block: Block,
        span: Span,
    },
    Switch {
        subject: Expression,
        cases: Vec<SwitchCase>,
        span: Span,
    },
    Return {
        value: Option<Expression>,
        span: Span,
    },
    Break {
        span: Span,
    },
    Continue {
        span: Span,
    },
    Destroy {
        expression: Expression,
        span: Span,
    },
    Emit {
        /// A call expression whose callee resolves to an event declaration
        call: Expression,
        span: Span,
    },
}

/// The test of an `if`: a boolean condition or an optional binding
#[derive(Debug, Clone, PartialEq)]
pub enum IfTest {
    Condition(Expression),
    /// `if let name <- value { … }`
    Binding {
        name: String,
        type_annotation: TypeDescriptor,
        transfer: Transfer,
        value: Expression,
    },
}

/// One `case value:` arm, or the `default:` arm when `value` is `None`
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub value: Option<Expression>,
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Minus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
    NotEqual,
    /// Short-circuit boolean and
    And,
    /// Short-circuit boolean or
    Or,
    /// `??`; the right operand evaluates only when the left is nil
    NilCoalesce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastOp {
    /// `as`: static upcast, always succeeds
    Static,
    /// `as?`: failable, produces an optional
    Failable,
    /// `as!`: forcing, errors on mismatch
    Force,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub label: Option<String>,
    pub value: Expression,
}

impl Argument {
    pub fn unlabeled(value: Expression) -> Self {
        Argument { label: None, value }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    NilLiteral,
    BoolLiteral(bool),
    IntegerLiteral {
        value: BigInt,
        kind: IntegerKind,
    },
    /// Raw mantissa at scale 10^8
    FixedLiteral {
        raw: i128,
        kind: FixedKind,
    },
    StringLiteral(String),
    CharacterLiteral(String),
    AddressLiteral(Address),
    PathLiteral(Path),
    ArrayLiteral {
        elements: Vec<Expression>,
        /// The elaborated array type (variable or constant sized)
        ty: TypeDescriptor,
    },
    DictionaryLiteral {
        entries: Vec<(Expression, Expression)>,
        ty: TypeDescriptor,
    },
    Identifier {
        name: String,
        span: Span,
    },
    MemberAccess {
        target: Box<Expression>,
        name: String,
        /// `?.` instead of `.`
        optional_chaining: bool,
        span: Span,
    },
    Index {
        target: Box<Expression>,
        index: Box<Expression>,
        span: Span,
    },
    Call {
        callee: Box<Expression>,
        type_arguments: Vec<TypeDescriptor>,
        arguments: Vec<Argument>,
        span: Span,
    },
    /// `create T(…)`; the inner expression is always a `Call`
    Create {
        call: Box<Expression>,
        span: Span,
    },
    /// `attach A(…) to <-base with (E, F)`
    Attach {
        attachment: Box<Expression>,
        base: Box<Expression>,
        /// Entitlements granted to the attachment, fully qualified
        entitlements: Vec<String>,
        span: Span,
    },
    /// `<-e` in value position (arguments, array elements, …)
    Move {
        expression: Box<Expression>,
    },
    Unary {
        op: UnaryOp,
        expression: Box<Expression>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// `e!`
    Force {
        expression: Box<Expression>,
        span: Span,
    },
    Cast {
        expression: Box<Expression>,
        op: CastOp,
        target: TypeDescriptor,
        span: Span,
    },
    /// `&e as T` where `T` is a (possibly optional) reference type
    Reference {
        expression: Box<Expression>,
        target: TypeDescriptor,
        span: Span,
    },
}

impl Expression {
    /// Identifier with a default span, for programmatically-built
    /// programs
    pub fn name(name: impl Into<String>) -> Self {
        Expression::Identifier {
            name: name.into(),
            span: Span::default(),
        }
    }

    /// Integer literal of kind `Int`
    pub fn int(value: i64) -> Self {
        Expression::IntegerLiteral {
            value: BigInt::from(value),
            kind: IntegerKind::Int,
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expression::StringLiteral(value.into())
    }

    pub fn member(target: Expression, name: impl Into<String>) -> Self {
        Expression::MemberAccess {
            target: Box::new(target),
            name: name.into(),
            optional_chaining: false,
            span: Span::default(),
        }
    }

    pub fn index(target: Expression, index: Expression) -> Self {
        Expression::Index {
            target: Box::new(target),
            index: Box::new(index),
            span: Span::default(),
        }
    }

    pub fn call(callee: Expression, arguments: Vec<Expression>) -> Self {
        Expression::Call {
            callee: Box::new(callee),
            type_arguments: Vec::new(),
            arguments: arguments.into_iter().map(Argument::unlabeled).collect(),
            span: Span::default(),
        }
    }

    pub fn create(call: Expression) -> Self {
        Expression::Create {
            call: Box::new(call),
            span: Span::default(),
        }
    }

    pub fn move_of(expression: Expression) -> Self {
        Expression::Move {
            expression: Box::new(expression),
        }
    }

    /// Best-effort source position, for error reporting
    pub fn span(&self) -> Span {
        match self {
            Expression::Identifier { span, .. }
            | Expression::MemberAccess { span, .. }
            | Expression::Index { span, .. }
            | Expression::Call { span, .. }
            | Expression::Create { span, .. }
            | Expression::Attach { span, .. }
            | Expression::Force { span, .. }
            | Expression::Cast { span, .. }
            | Expression::Reference { span, .. } => *span,
            Expression::Move { expression } => expression.span(),
            Expression::Unary { expression, .. } => expression.span(),
            Expression::Binary { left, .. } => left.span(),
            _ => Span::default(),
        }
    }
}
