//! Host-visible runtime error taxonomy
//!
//! Every failure the evaluator can surface is a distinct variant here.
//! Errors unwind to the interpreter boundary; nothing is recovered
//! internally, and condition failures have no catch semantics.

use tally_core::location::Span;
use tally_core::path::{Path, PathDomain};
use tally_core::types::TypeDescriptor;
use thiserror::Error;

/// Whether a failed condition was a pre- or post-condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionKind {
    Pre,
    Post,
}

impl std::fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionKind::Pre => write!(f, "pre-condition"),
            ConditionKind::Post => write!(f, "post-condition"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    // Resource discipline
    #[error("use of moved or destroyed resource at {span}")]
    InvalidatedResource { span: Span },

    #[error("reference to moved or destroyed resource at {span}")]
    InvalidatedResourceReference { span: Span },

    #[error("resource `{name}` was neither moved nor destroyed before scope exit at {span}")]
    ResourceLoss { name: String, span: Span },

    #[error("field `{field}` used before initialization")]
    UseBeforeInitialization { field: String },

    #[error("`{target}` is already occupied")]
    Overwrite { target: String },

    // Casts and type checks
    #[error("forced cast failed: expected `{expected}`, got `{actual}` at {span}")]
    ForceCastTypeMismatch {
        expected: TypeDescriptor,
        actual: TypeDescriptor,
        span: Span,
    },

    #[error("type mismatch: expected `{expected}`, got `{actual}`")]
    TypeMismatch {
        expected: TypeDescriptor,
        actual: TypeDescriptor,
    },

    #[error("unexpected nil forced at {span}")]
    ForceNil { span: Span },

    // Arithmetic
    #[error("{ty} overflow")]
    Overflow { ty: String },

    #[error("{ty} underflow")]
    Underflow { ty: String },

    #[error("division by zero")]
    DivisionByZero,

    // Authorization
    #[error("disjoint entitlement sets with more than one member cannot be constructed at runtime")]
    InvalidDisjointRuntimeEntitlementSetCreation,

    // Capabilities
    #[error("cyclic capability link: {}", format_link_chain(chain))]
    CyclicLink { chain: Vec<Path> },

    #[error("dereference failed: nothing stored at {path}")]
    DereferenceFailed { path: Path },

    // Paths
    #[error("invalid path domain `{actual}`, expected one of: {}", format_domains(expected))]
    InvalidPathDomain {
        expected: Vec<PathDomain>,
        actual: PathDomain,
    },

    // Conditions
    #[error("{kind} failed: {message}")]
    Condition {
        kind: ConditionKind,
        message: String,
    },

    // Transactions
    #[error("no transaction declared at index {index}")]
    TransactionNotDeclared { index: usize },

    #[error("wrong number of arguments: expected {expected}, got {actual}")]
    ArgumentCount { expected: usize, actual: usize },

    // Host interrupt (checked once per statement)
    #[error("evaluation cancelled by host")]
    Cancelled,

    #[error("call stack limit of {limit} exceeded")]
    CallStackLimitExceeded { limit: usize },

    #[error("could not decode argument: {message}")]
    ArgumentEncoding { message: String },

    #[error("index {index} out of bounds (size {size})")]
    IndexOutOfBounds { index: i128, size: usize },

    // Internal inconsistency: a checked program can never reach this
    #[error("internal error: {message}")]
    Unreachable { message: String },
}

impl RuntimeError {
    /// Internal-inconsistency error for states a checked program rules
    /// out
    pub fn unreachable(message: impl Into<String>) -> Self {
        RuntimeError::Unreachable {
            message: message.into(),
        }
    }
}

fn format_link_chain(chain: &[Path]) -> String {
    chain
        .iter()
        .map(|path| path.identifier.clone())
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn format_domains(domains: &[PathDomain]) -> String {
    domains
        .iter()
        .map(|domain| domain.name().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
