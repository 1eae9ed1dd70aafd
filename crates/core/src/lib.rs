//! Tally Core
//!
//! Shared data model for the Tally contract language: the elaborated AST
//! the interpreter consumes, static type descriptors, storage paths, code
//! locations, and the entitlement authorization algebra.
//!
//! This crate is pure data with no runtime behavior; evaluation lives in
//! `tally-runtime`.
//!
//! # Modules
//!
//! - `ast`: elaborated declarations, statements, and expressions
//! - `authorization`: entitlement sets, sigils, subtyping, mappings
//! - `location`: account addresses, code locations, qualified identifiers
//! - `path`: storage paths (`/storage/…`, `/private/…`, `/public/…`)
//! - `types`: static type descriptors and resource-kind classification

pub mod ast;
pub mod authorization;
pub mod location;
pub mod path;
pub mod types;

pub use ast::{Block, Declaration, Expression, Program, Statement, Transfer};
pub use authorization::{Authorization, EntitlementMapping, EntitlementSet, Sigil};
pub use location::{Address, Location, Span};
pub use path::{Path, PathDomain};
pub use types::{
    CompositeKind, CompositeType, FixedKind, IntegerKind, InterfaceType, TypeDescriptor,
};
