//! Resource and reference invalidation tracking
//!
//! Every resource value carries a small state record shared (through the
//! value's `Rc`) with every ephemeral reference into it. Moving or
//! destroying a resource flips the record to `Invalidated`; the
//! transition is irreversible, and every subsequent read, write, destroy,
//! or reference-take must check the record first.
//!
//! References into value-kind containers use a generation counter
//! instead: the container bumps its epoch on structural mutation and a
//! reference created against an older epoch is dead.

use crate::error::RuntimeError;
use tally_core::location::Span;

/// Why a resource left the `Live` state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationCause {
    /// Ownership was transferred to another location
    Moved,
    /// Explicitly destroyed, or torn down with its container
    Destroyed,
}

/// Lifecycle state of a resource value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    Live,
    Invalidated(InvalidationCause),
}

impl ResourceState {
    pub fn is_live(&self) -> bool {
        matches!(self, ResourceState::Live)
    }

    /// Error unless the resource is still live
    pub fn check_live(&self, span: Span) -> Result<(), RuntimeError> {
        if self.is_live() {
            Ok(())
        } else {
            Err(RuntimeError::InvalidatedResource { span })
        }
    }

    /// The reference-flavored check: same transition, different error
    pub fn check_referent_live(&self, span: Span) -> Result<(), RuntimeError> {
        if self.is_live() {
            Ok(())
        } else {
            Err(RuntimeError::InvalidatedResourceReference { span })
        }
    }
}
