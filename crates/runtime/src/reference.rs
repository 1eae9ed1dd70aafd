//! The reference subsystem
//!
//! Two reference flavors exist. An *ephemeral* reference holds a direct
//! handle to a live value (sharing the value's `Rc`), plus an optional
//! non-owning back-pointer to the container it was taken from, recorded
//! as a weak handle and an epoch snapshot. A *storage* reference points
//! by `(address, path)` into persistent storage and is re-validated on
//! every dereference.
//!
//! Both carry the authorization stamped at creation. Static upcasts are
//! identity at runtime, so the stamped authorization survives them and is
//! what later downcasts consult.

use crate::error::RuntimeError;
use crate::value::{ArrayData, DictionaryData, Value};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use tally_core::authorization::Authorization;
use tally_core::location::{Address, Span};
use tally_core::path::Path;
use tally_core::types::TypeDescriptor;

/// Non-owning handle to the container a reference was taken out of
#[derive(Debug, Clone)]
pub enum EpochSource {
    Array(Weak<RefCell<ArrayData>>),
    Dictionary(Weak<RefCell<DictionaryData>>),
}

impl EpochSource {
    fn current_epoch(&self) -> Option<u64> {
        match self {
            EpochSource::Array(weak) => weak.upgrade().map(|rc| rc.borrow().epoch),
            EpochSource::Dictionary(weak) => weak.upgrade().map(|rc| rc.borrow().epoch),
        }
    }
}

/// Epoch snapshot taken when a reference into a container is created
#[derive(Debug, Clone)]
pub struct ContainerGuard {
    pub source: EpochSource,
    pub seen: u64,
}

impl ContainerGuard {
    pub fn array(container: &Rc<RefCell<ArrayData>>) -> Self {
        ContainerGuard {
            seen: container.borrow().epoch,
            source: EpochSource::Array(Rc::downgrade(container)),
        }
    }

    pub fn dictionary(container: &Rc<RefCell<DictionaryData>>) -> Self {
        ContainerGuard {
            seen: container.borrow().epoch,
            source: EpochSource::Dictionary(Rc::downgrade(container)),
        }
    }

    /// The reference is dead once the container mutated (epoch advanced)
    /// or went away entirely
    fn check(&self, span: Span) -> Result<(), RuntimeError> {
        match self.source.current_epoch() {
            Some(epoch) if epoch == self.seen => Ok(()),
            _ => Err(RuntimeError::InvalidatedResourceReference { span }),
        }
    }
}

/// A reference into a live in-memory value
#[derive(Debug)]
pub struct EphemeralReference {
    /// Authorization stamped at creation; observable through downcasts
    /// regardless of intermediate static upcasts
    pub authorization: Authorization,
    /// The type the reference presents (without the authorization)
    pub borrowed_type: TypeDescriptor,
    pub referent: Value,
    pub container: Option<ContainerGuard>,
}

impl EphemeralReference {
    pub fn new(
        authorization: Authorization,
        borrowed_type: TypeDescriptor,
        referent: Value,
    ) -> Self {
        EphemeralReference {
            authorization,
            borrowed_type,
            referent,
            container: None,
        }
    }

    /// Check referent liveness and container epoch; every dereference
    /// goes through here first
    pub fn check_valid(&self, span: Span) -> Result<(), RuntimeError> {
        if let Some(state) = self.referent.resource_state() {
            state.check_referent_live(span)?;
        }
        if let Some(guard) = &self.container {
            guard.check(span)?;
        }
        Ok(())
    }
}

/// A reference into persistent storage, re-validated on each access
#[derive(Debug)]
pub struct StorageReference {
    pub authorization: Authorization,
    pub borrowed_type: TypeDescriptor,
    pub address: Address,
    pub path: Path,
}

#[derive(Debug, Clone)]
pub enum ReferenceValue {
    Ephemeral(Rc<EphemeralReference>),
    Storage(Rc<StorageReference>),
}

impl ReferenceValue {
    pub fn ephemeral(
        authorization: Authorization,
        borrowed_type: TypeDescriptor,
        referent: Value,
    ) -> Self {
        ReferenceValue::Ephemeral(Rc::new(EphemeralReference::new(
            authorization,
            borrowed_type,
            referent,
        )))
    }

    pub fn authorization(&self) -> &Authorization {
        match self {
            ReferenceValue::Ephemeral(reference) => &reference.authorization,
            ReferenceValue::Storage(reference) => &reference.authorization,
        }
    }

    pub fn borrowed_type(&self) -> &TypeDescriptor {
        match self {
            ReferenceValue::Ephemeral(reference) => &reference.borrowed_type,
            ReferenceValue::Storage(reference) => &reference.borrowed_type,
        }
    }

    /// The reference type this value presents as its static type
    pub fn ty(&self) -> TypeDescriptor {
        TypeDescriptor::reference(self.authorization().clone(), self.borrowed_type().clone())
    }

    /// Reference equality: same referent identity (ephemeral) or same
    /// storage coordinates, with the same authorization
    pub fn equal(&self, other: &ReferenceValue) -> bool {
        match (self, other) {
            (ReferenceValue::Ephemeral(a), ReferenceValue::Ephemeral(b)) => {
                a.authorization == b.authorization && referent_identity_eq(&a.referent, &b.referent)
            }
            (ReferenceValue::Storage(a), ReferenceValue::Storage(b)) => {
                a.address == b.address && a.path == b.path && a.authorization == b.authorization
            }
            _ => false,
        }
    }
}

/// Identity comparison of two referents: pointer equality for shared
/// containers, structural for scalars
fn referent_identity_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Composite(a), Value::Composite(b)) => Rc::ptr_eq(a, b),
        (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
        (Value::Dictionary(a), Value::Dictionary(b)) => Rc::ptr_eq(a, b),
        _ => a.equal(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arithmetic::IntegerValue;
    use crate::invalidation::{InvalidationCause, ResourceState};
    use crate::value::CompositeData;
    use tally_core::location::Location;
    use tally_core::types::{CompositeKind, CompositeType, IntegerKind};

    fn resource() -> Value {
        Value::new_composite(CompositeData::new(CompositeType::new(
            Location::Script("test".to_string()),
            "R",
            CompositeKind::Resource,
        )))
    }

    #[test]
    fn test_reference_to_live_resource_is_valid() {
        let r = resource();
        let reference = EphemeralReference::new(
            Authorization::Unauthorized,
            r.static_type(),
            r.clone(),
        );
        assert!(reference.check_valid(Span::default()).is_ok());
    }

    #[test]
    fn test_reference_dies_with_its_referent() {
        let r = resource();
        let reference = EphemeralReference::new(
            Authorization::Unauthorized,
            r.static_type(),
            r.clone(),
        );
        if let Value::Composite(cell) = &r {
            cell.borrow_mut().state = ResourceState::Invalidated(InvalidationCause::Moved);
        }
        assert!(matches!(
            reference.check_valid(Span::default()),
            Err(RuntimeError::InvalidatedResourceReference { .. })
        ));
    }

    #[test]
    fn test_container_epoch_invalidation() {
        let array = Rc::new(RefCell::new(ArrayData::new(
            TypeDescriptor::Integer(IntegerKind::Int),
            vec![Value::Integer(IntegerValue::Int(1.into()))],
        )));
        let mut reference = EphemeralReference::new(
            Authorization::Unauthorized,
            TypeDescriptor::Integer(IntegerKind::Int),
            array.borrow().values[0].clone(),
        );
        reference.container = Some(ContainerGuard::array(&array));
        assert!(reference.check_valid(Span::default()).is_ok());

        array.borrow_mut().epoch += 1;
        assert!(matches!(
            reference.check_valid(Span::default()),
            Err(RuntimeError::InvalidatedResourceReference { .. })
        ));
    }

    #[test]
    fn test_static_type_reports_reference_type() {
        let r = resource();
        let referenced = r.static_type();
        let value = Value::Reference(ReferenceValue::ephemeral(
            Authorization::Unauthorized,
            referenced.clone(),
            r,
        ));
        assert_eq!(
            value.static_type(),
            TypeDescriptor::reference(Authorization::Unauthorized, referenced)
        );
    }
}
