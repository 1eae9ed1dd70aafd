//! Tally Runtime
//!
//! Tree-walking interpreter for the Tally contract language: a
//! statically-typed, resource-oriented language whose defining feature is
//! a linear ownership discipline. Resource values are move-only and must
//! be explicitly destroyed; the runtime enforces this in addition to the
//! static checker, detecting any use of a moved or destroyed resource.
//!
//! The interpreter consumes a checked program (`tally_core::ast`), a
//! [`storage::Storage`] backend, and an [`events::EventSink`], and
//! exposes function invocation and the transaction driver:
//!
//! ```rust,ignore
//! use tally_runtime::{Interpreter, InterpreterConfig};
//! use tally_runtime::storage::InMemoryStorage;
//! use tally_runtime::events::CollectingEventSink;
//!
//! let storage = Rc::new(RefCell::new(InMemoryStorage::new()));
//! let events = Rc::new(RefCell::new(CollectingEventSink::new()));
//! let mut interpreter =
//!     Interpreter::new(&program, storage, events, InterpreterConfig::new());
//! let result = interpreter.invoke("main", vec![])?;
//! ```
//!
//! # Modules
//!
//! - `value`: the runtime value universe and the transfer discipline
//! - `arithmetic`: per-width integer and fixed-point numerics
//! - `invalidation`: resource and reference invalidation records
//! - `reference`: ephemeral and storage references
//! - `activation`: frames, variables, base activations
//! - `declarations`: registry over a checked program's declarations
//! - `cast`: dynamic subtyping, `as?` / `as!`
//! - `storage`: the account storage adapter and capability links
//! - `events`: event sink and destruction-event ordering
//! - `interpreter`: the evaluator
//! - `transaction`: prepare/execute/pre/post orchestration
//! - `json`: value import/export for arguments and events
//! - `stdlib`: builtins and the account host object

pub mod activation;
pub mod arithmetic;
pub mod cast;
pub mod config;
pub mod declarations;
pub mod error;
pub mod events;
pub mod interpreter;
pub mod invalidation;
pub mod json;
pub mod reference;
pub mod stdlib;
pub mod storage;
pub mod transaction;
pub mod value;

pub use config::InterpreterConfig;
pub use error::{ConditionKind, RuntimeError};
pub use events::{CollectingEventSink, EventSink};
pub use interpreter::{Interpreter, Stats};
pub use storage::{InMemoryStorage, Storage};
pub use value::Value;
