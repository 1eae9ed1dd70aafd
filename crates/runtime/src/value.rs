//! The runtime value universe
//!
//! `Value` is a tagged sum over everything a Tally program can hold.
//! Containers and composites live behind `Rc<RefCell<…>>` so that
//! ephemeral references alias them directly; the interpreter is strictly
//! single-threaded, so no further synchronization exists anywhere in the
//! value model.
//!
//! The two operations with teeth are [`Value::transfer`], which
//! implements the move/copy discipline (resource-kind values move and
//! invalidate their source, value-kind values deep-copy), and
//! [`Value::equal`], structural equality that never errors.

use crate::arithmetic::{FixedValue, IntegerValue};
use crate::error::RuntimeError;
use crate::interpreter::Interpreter;
use crate::invalidation::{InvalidationCause, ResourceState};
use crate::reference::ReferenceValue;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tally_core::ast::FunctionDeclaration;
use tally_core::location::{Address, Span};
use tally_core::path::Path;
use tally_core::types::{CompositeKind, CompositeType, TypeDescriptor};

/// Hashable subset of `Value` usable as a dictionary key
///
/// Containers, composites, references, and functions are not hashable
/// keys; the checker only admits the kinds below.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DictionaryKey {
    Bool(bool),
    Integer(IntegerValue),
    Fixed(FixedValue),
    String(String),
    Character(String),
    Address(Address),
    Path(Path),
}

impl DictionaryKey {
    /// Convert a value to a key; `None` for non-hashable kinds
    pub fn from_value(value: &Value) -> Option<DictionaryKey> {
        match value {
            Value::Bool(b) => Some(DictionaryKey::Bool(*b)),
            Value::Integer(n) => Some(DictionaryKey::Integer(n.clone())),
            Value::Fixed(n) => Some(DictionaryKey::Fixed(*n)),
            Value::String(s) => Some(DictionaryKey::String(s.as_ref().clone())),
            Value::Character(c) => Some(DictionaryKey::Character(c.as_ref().clone())),
            Value::Address(a) => Some(DictionaryKey::Address(*a)),
            Value::Path(p) => Some(DictionaryKey::Path(p.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            DictionaryKey::Bool(b) => Value::Bool(*b),
            DictionaryKey::Integer(n) => Value::Integer(n.clone()),
            DictionaryKey::Fixed(n) => Value::Fixed(*n),
            DictionaryKey::String(s) => Value::String(Rc::new(s.clone())),
            DictionaryKey::Character(c) => Value::Character(Rc::new(c.clone())),
            DictionaryKey::Address(a) => Value::Address(*a),
            DictionaryKey::Path(p) => Value::Path(p.clone()),
        }
    }
}

/// Backing data of an array value
#[derive(Debug)]
pub struct ArrayData {
    pub values: Vec<Value>,
    /// Static element type; the array's own dynamic type derives from it
    pub element_type: TypeDescriptor,
    /// `Some(n)` for constant-sized arrays
    pub constant_size: Option<u64>,
    /// Address of the account whose storage transitively contains this
    /// array, if any
    pub owner: Option<Address>,
    /// Bumped on structural mutation; element references snapshot it
    pub epoch: u64,
    /// Only meaningful when the element type is resource-kind
    pub state: ResourceState,
}

impl ArrayData {
    pub fn new(element_type: TypeDescriptor, values: Vec<Value>) -> Self {
        ArrayData {
            values,
            element_type,
            constant_size: None,
            owner: None,
            epoch: 0,
            state: ResourceState::Live,
        }
    }
}

/// Backing data of a dictionary value
///
/// Lookup goes through the hash map; `insertion_order` preserves the
/// user-visible iteration order.
#[derive(Debug)]
pub struct DictionaryData {
    pub key_type: TypeDescriptor,
    pub value_type: TypeDescriptor,
    pub entries: HashMap<DictionaryKey, Value>,
    pub insertion_order: Vec<DictionaryKey>,
    pub owner: Option<Address>,
    pub epoch: u64,
    pub state: ResourceState,
}

impl DictionaryData {
    pub fn new(key_type: TypeDescriptor, value_type: TypeDescriptor) -> Self {
        DictionaryData {
            key_type,
            value_type,
            entries: HashMap::new(),
            insertion_order: Vec::new(),
            owner: None,
            epoch: 0,
            state: ResourceState::Live,
        }
    }

    pub fn insert(&mut self, key: DictionaryKey, value: Value) -> Option<Value> {
        let previous = self.entries.insert(key.clone(), value);
        if previous.is_none() {
            self.insertion_order.push(key);
        }
        previous
    }

    pub fn remove(&mut self, key: &DictionaryKey) -> Option<Value> {
        let previous = self.entries.remove(key);
        if previous.is_some() {
            self.insertion_order.retain(|k| k != key);
        }
        previous
    }
}

/// Backing data of a composite value
#[derive(Debug)]
pub struct CompositeData {
    pub type_: CompositeType,
    pub fields: HashMap<String, Value>,
    pub owner: Option<Address>,
    /// Process-unique identifier; resources only
    pub uuid: Option<u64>,
    pub state: ResourceState,
    /// Attachments indexed by their fully-qualified type identifier
    pub attachments: HashMap<String, Value>,
    /// When this composite is an attachment: the entitlements it was
    /// attached with (`attach A() to <-r with (E, F)`)
    pub attachment_entitlements: Vec<String>,
    /// When this composite is an attachment: non-owning handle to the
    /// base it is attached to
    pub attachment_base: Option<std::rc::Weak<RefCell<CompositeData>>>,
}

impl CompositeData {
    pub fn new(type_: CompositeType) -> Self {
        CompositeData {
            type_,
            fields: HashMap::new(),
            owner: None,
            uuid: None,
            state: ResourceState::Live,
            attachments: HashMap::new(),
            attachment_entitlements: Vec::new(),
            attachment_base: None,
        }
    }

    pub fn is_resource(&self) -> bool {
        matches!(
            self.type_.kind,
            CompositeKind::Resource | CompositeKind::Attachment
        )
    }
}

/// A thin handle to a path on an account with a declared borrow type
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityValue {
    pub address: Address,
    pub path: Path,
    pub borrow_type: Option<TypeDescriptor>,
}

/// Arguments handed to a host function implementation
pub struct HostInvocation {
    pub arguments: Vec<Value>,
    pub type_arguments: Vec<TypeDescriptor>,
    pub span: Span,
}

/// A function implemented by the host
///
/// Host implementations must not retain interpreter-owned values across
/// calls; a type descriptor is the only carrier safe to keep.
pub struct HostFunction {
    pub name: String,
    pub ty: TypeDescriptor,
    #[allow(clippy::type_complexity)]
    pub implementation:
        Rc<dyn Fn(&mut Interpreter, HostInvocation) -> Result<Value, RuntimeError>>,
}

impl std::fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostFunction")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .finish_non_exhaustive()
    }
}

/// A function whose body the evaluator walks
#[derive(Debug)]
pub struct InterpretedFunction {
    pub declaration: Rc<FunctionDeclaration>,
    /// Set when the function is a member of a composite; used for
    /// interface condition composition
    pub member_of: Option<CompositeType>,
}

/// A function bound to a receiver (`self`), and for attachments a `base`
/// reference
#[derive(Debug)]
pub struct BoundFunction {
    pub receiver: Value,
    pub base: Option<Value>,
    pub function: FunctionValue,
}

#[derive(Debug, Clone)]
pub enum FunctionValue {
    Host(Rc<HostFunction>),
    Interpreted(Rc<InterpretedFunction>),
    Bound(Rc<BoundFunction>),
}

impl FunctionValue {
    pub fn ty(&self) -> TypeDescriptor {
        match self {
            FunctionValue::Host(host) => host.ty.clone(),
            FunctionValue::Interpreted(function) => {
                let declaration = &function.declaration;
                TypeDescriptor::function(
                    declaration
                        .parameters
                        .iter()
                        .map(|p| p.type_annotation.clone())
                        .collect(),
                    declaration.return_type.clone(),
                )
            }
            FunctionValue::Bound(bound) => bound.function.ty(),
        }
    }
}

/// The tagged sum of all runtime values
#[derive(Debug, Clone)]
pub enum Value {
    Void,
    Bool(bool),
    Integer(IntegerValue),
    Fixed(FixedValue),
    String(Rc<String>),
    /// A single extended grapheme cluster, exposing its UTF-8 bytes
    Character(Rc<String>),
    Address(Address),
    Path(Path),
    Optional(Option<Box<Value>>),
    Array(Rc<RefCell<ArrayData>>),
    Dictionary(Rc<RefCell<DictionaryData>>),
    Composite(Rc<RefCell<CompositeData>>),
    Capability(CapabilityValue),
    /// A reified type descriptor as a first-class value
    Type(TypeDescriptor),
    Reference(ReferenceValue),
    Function(FunctionValue),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(Rc::new(s.into()))
    }

    pub fn nil() -> Self {
        Value::Optional(None)
    }

    pub fn some(inner: Value) -> Self {
        Value::Optional(Some(Box::new(inner)))
    }

    pub fn new_array(element_type: TypeDescriptor, values: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(ArrayData::new(element_type, values))))
    }

    pub fn new_composite(data: CompositeData) -> Self {
        Value::Composite(Rc::new(RefCell::new(data)))
    }

    /// The declared type of the value, without reading through
    /// references: a reference reports its reference type with the
    /// borrowed type intact, never the referent's type.
    pub fn static_type(&self) -> TypeDescriptor {
        match self {
            Value::Void => TypeDescriptor::Void,
            Value::Bool(_) => TypeDescriptor::Bool,
            Value::Integer(n) => TypeDescriptor::Integer(n.kind()),
            Value::Fixed(n) => TypeDescriptor::Fixed(n.kind()),
            Value::String(_) => TypeDescriptor::String,
            Value::Character(_) => TypeDescriptor::Character,
            Value::Address(_) => TypeDescriptor::Address,
            Value::Path(_) => TypeDescriptor::Path,
            Value::Optional(inner) => match inner {
                Some(inner) => TypeDescriptor::optional(inner.static_type()),
                None => TypeDescriptor::optional(TypeDescriptor::Unknown),
            },
            Value::Array(data) => {
                let data = data.borrow();
                match data.constant_size {
                    Some(size) => TypeDescriptor::ConstantArray {
                        element: Box::new(data.element_type.clone()),
                        size,
                    },
                    None => TypeDescriptor::variable_array(data.element_type.clone()),
                }
            }
            Value::Dictionary(data) => {
                let data = data.borrow();
                TypeDescriptor::dictionary(data.key_type.clone(), data.value_type.clone())
            }
            Value::Composite(data) => TypeDescriptor::Composite(data.borrow().type_.clone()),
            Value::Capability(capability) => TypeDescriptor::Capability {
                borrow: capability.borrow_type.clone().map(Box::new),
            },
            Value::Type(_) => TypeDescriptor::Meta,
            Value::Reference(reference) => reference.ty(),
            Value::Function(function) => function.ty(),
        }
    }

    /// Dynamic resource-kind classification
    pub fn is_resource_kind(&self) -> bool {
        match self {
            Value::Composite(data) => data.borrow().is_resource(),
            Value::Array(data) => data.borrow().element_type.is_resource_kind(),
            Value::Dictionary(data) => data.borrow().value_type.is_resource_kind(),
            Value::Optional(Some(inner)) => inner.is_resource_kind(),
            _ => false,
        }
    }

    /// The owning account of the value, if it is (transitively) stored
    pub fn owner(&self) -> Option<Address> {
        match self {
            Value::Composite(data) => data.borrow().owner,
            Value::Array(data) => data.borrow().owner,
            Value::Dictionary(data) => data.borrow().owner,
            Value::Optional(Some(inner)) => inner.owner(),
            _ => None,
        }
    }

    /// Stamp the owning address onto the value and everything it
    /// transitively contains
    pub fn set_owner(&self, owner: Option<Address>) {
        match self {
            Value::Composite(data) => {
                let children: Vec<Value> = {
                    let mut data = data.borrow_mut();
                    data.owner = owner;
                    data.fields
                        .values()
                        .chain(data.attachments.values())
                        .cloned()
                        .collect()
                };
                for child in children {
                    child.set_owner(owner);
                }
            }
            Value::Array(data) => {
                let children: Vec<Value> = {
                    let mut data = data.borrow_mut();
                    data.owner = owner;
                    data.values.clone()
                };
                for child in children {
                    child.set_owner(owner);
                }
            }
            Value::Dictionary(data) => {
                let children: Vec<Value> = {
                    let mut data = data.borrow_mut();
                    data.owner = owner;
                    data.entries.values().cloned().collect()
                };
                for child in children {
                    child.set_owner(owner);
                }
            }
            Value::Optional(Some(inner)) => inner.set_owner(owner),
            _ => {}
        }
    }

    /// Resource lifecycle state, for values that track one
    pub fn resource_state(&self) -> Option<ResourceState> {
        match self {
            Value::Composite(data) => Some(data.borrow().state),
            Value::Array(data) if data.borrow().element_type.is_resource_kind() => {
                Some(data.borrow().state)
            }
            Value::Dictionary(data) if data.borrow().value_type.is_resource_kind() => {
                Some(data.borrow().state)
            }
            Value::Optional(Some(inner)) => inner.resource_state(),
            _ => None,
        }
    }

    /// Check that a resource-kind value is live before it is read,
    /// written, destroyed, or referenced
    pub fn check_live(&self, span: Span) -> Result<(), RuntimeError> {
        match self.resource_state() {
            Some(state) => state.check_live(span),
            None => Ok(()),
        }
    }

    /// The transfer operation.
    ///
    /// Value-kind values produce a structural copy and leave the source
    /// untouched. Resource-kind values move: the backing data is lifted
    /// into a fresh cell, the old cell is marked invalidated, and the
    /// structural identity (uuid, nested values) is preserved. The new
    /// owner is stamped recursively.
    pub fn transfer(
        &self,
        new_owner: Option<Address>,
        span: Span,
    ) -> Result<Value, RuntimeError> {
        let transferred = match self {
            Value::Composite(cell) => {
                let is_resource = cell.borrow().is_resource();
                if is_resource {
                    let moved = {
                        let mut old = cell.borrow_mut();
                        old.state.check_live(span)?;
                        let moved = CompositeData {
                            type_: old.type_.clone(),
                            fields: std::mem::take(&mut old.fields),
                            owner: new_owner,
                            uuid: old.uuid,
                            state: ResourceState::Live,
                            attachments: std::mem::take(&mut old.attachments),
                            attachment_entitlements: std::mem::take(
                                &mut old.attachment_entitlements,
                            ),
                            attachment_base: old.attachment_base.take(),
                        };
                        old.state = ResourceState::Invalidated(InvalidationCause::Moved);
                        moved
                    };
                    let new_cell = Rc::new(RefCell::new(moved));
                    // Attachments keep a back-pointer to their base;
                    // re-aim it at the cell the base moved into
                    let attachments: Vec<Value> =
                        new_cell.borrow().attachments.values().cloned().collect();
                    for attachment in attachments {
                        if let Value::Composite(attachment_cell) = attachment {
                            attachment_cell.borrow_mut().attachment_base =
                                Some(Rc::downgrade(&new_cell));
                        }
                    }
                    Value::Composite(new_cell)
                } else {
                    let old = cell.borrow();
                    let mut copied = CompositeData::new(old.type_.clone());
                    copied.owner = new_owner;
                    for (name, value) in &old.fields {
                        copied
                            .fields
                            .insert(name.clone(), value.transfer(new_owner, span)?);
                    }
                    Value::Composite(Rc::new(RefCell::new(copied)))
                }
            }
            Value::Array(cell) => {
                let is_resource = cell.borrow().element_type.is_resource_kind();
                if is_resource {
                    let mut old = cell.borrow_mut();
                    old.state.check_live(span)?;
                    let moved = ArrayData {
                        values: std::mem::take(&mut old.values),
                        element_type: old.element_type.clone(),
                        constant_size: old.constant_size,
                        owner: new_owner,
                        epoch: 0,
                        state: ResourceState::Live,
                    };
                    old.state = ResourceState::Invalidated(InvalidationCause::Moved);
                    Value::Array(Rc::new(RefCell::new(moved)))
                } else {
                    let old = cell.borrow();
                    let values = old
                        .values
                        .iter()
                        .map(|v| v.transfer(new_owner, span))
                        .collect::<Result<Vec<_>, _>>()?;
                    let mut copied = ArrayData::new(old.element_type.clone(), values);
                    copied.constant_size = old.constant_size;
                    copied.owner = new_owner;
                    Value::Array(Rc::new(RefCell::new(copied)))
                }
            }
            Value::Dictionary(cell) => {
                let is_resource = cell.borrow().value_type.is_resource_kind();
                if is_resource {
                    let mut old = cell.borrow_mut();
                    old.state.check_live(span)?;
                    let moved = DictionaryData {
                        key_type: old.key_type.clone(),
                        value_type: old.value_type.clone(),
                        entries: std::mem::take(&mut old.entries),
                        insertion_order: std::mem::take(&mut old.insertion_order),
                        owner: new_owner,
                        epoch: 0,
                        state: ResourceState::Live,
                    };
                    old.state = ResourceState::Invalidated(InvalidationCause::Moved);
                    Value::Dictionary(Rc::new(RefCell::new(moved)))
                } else {
                    let old = cell.borrow();
                    let mut copied =
                        DictionaryData::new(old.key_type.clone(), old.value_type.clone());
                    copied.owner = new_owner;
                    for key in &old.insertion_order {
                        if let Some(value) = old.entries.get(key) {
                            copied.insert(key.clone(), value.transfer(new_owner, span)?);
                        }
                    }
                    Value::Dictionary(Rc::new(RefCell::new(copied)))
                }
            }
            Value::Optional(Some(inner)) => Value::some(inner.transfer(new_owner, span)?),
            // Scalars, references, capabilities, types, and functions
            // copy by clone; none of them carry ownership
            other => other.clone(),
        };
        // The owner stamp is the account whose storage transitively
        // contains the value; a transfer into memory clears it
        transferred.set_owner(new_owner);
        Ok(transferred)
    }

    /// Structural equality (never an error).
    ///
    /// Composites compare field-wise; identity (uuid) and owner are not
    /// considered. Incompatible dynamic types compare unequal, and
    /// function values are never equal to anything.
    pub fn equal(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Void, Value::Void) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Fixed(a), Value::Fixed(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Character(a), Value::Character(b)) => a == b,
            (Value::Address(a), Value::Address(b)) => a == b,
            (Value::Path(a), Value::Path(b)) => a == b,
            (Value::Optional(a), Value::Optional(b)) => match (a, b) {
                (None, None) => true,
                (Some(a), Some(b)) => a.equal(b),
                _ => false,
            },
            (Value::Array(a), Value::Array(b)) => {
                let a = a.borrow();
                let b = b.borrow();
                a.values.len() == b.values.len()
                    && a.values.iter().zip(b.values.iter()).all(|(x, y)| x.equal(y))
            }
            (Value::Dictionary(a), Value::Dictionary(b)) => {
                let a = a.borrow();
                let b = b.borrow();
                a.entries.len() == b.entries.len()
                    && a.entries.iter().all(|(key, value)| {
                        b.entries.get(key).is_some_and(|other| value.equal(other))
                    })
            }
            (Value::Composite(a), Value::Composite(b)) => {
                let a = a.borrow();
                let b = b.borrow();
                a.type_ == b.type_
                    && a.fields.len() == b.fields.len()
                    && a.fields.iter().all(|(name, value)| {
                        b.fields.get(name).is_some_and(|other| value.equal(other))
                    })
            }
            (Value::Capability(a), Value::Capability(b)) => a == b,
            (Value::Type(a), Value::Type(b)) => a == b,
            (Value::Reference(a), Value::Reference(b)) => a.equal(b),
            // Functions never compare equal, and mismatched variants
            // (including reified types vs. anything else) are false
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equal(other)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Void => write!(f, "()"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Fixed(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::Character(c) => write!(f, "{}", c),
            Value::Address(a) => write!(f, "{}", a),
            Value::Path(p) => write!(f, "{}", p),
            Value::Optional(None) => write!(f, "nil"),
            Value::Optional(Some(inner)) => write!(f, "{}", inner),
            Value::Array(data) => {
                let data = data.borrow();
                let rendered: Vec<String> =
                    data.values.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", rendered.join(", "))
            }
            Value::Dictionary(data) => {
                let data = data.borrow();
                let rendered: Vec<String> = data
                    .insertion_order
                    .iter()
                    .filter_map(|key| {
                        data.entries
                            .get(key)
                            .map(|value| format!("{}: {}", key.to_value(), value))
                    })
                    .collect();
                write!(f, "{{{}}}", rendered.join(", "))
            }
            Value::Composite(data) => {
                let data = data.borrow();
                write!(f, "{}(…)", data.type_.type_id())
            }
            Value::Capability(capability) => {
                write!(f, "Capability({}{})", capability.address, capability.path)
            }
            Value::Type(descriptor) => write!(f, "Type<{}>", descriptor),
            Value::Reference(reference) => write!(f, "{}", reference.ty()),
            Value::Function(function) => write!(f, "{}", function.ty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::location::Location;
    use tally_core::types::IntegerKind;

    fn resource_type(name: &str) -> CompositeType {
        CompositeType::new(
            Location::Script("test".to_string()),
            name,
            CompositeKind::Resource,
        )
    }

    fn struct_type(name: &str) -> CompositeType {
        CompositeType::new(
            Location::Script("test".to_string()),
            name,
            CompositeKind::Struct,
        )
    }

    fn int(n: i64) -> Value {
        Value::Integer(IntegerValue::Int(n.into()))
    }

    #[test]
    fn test_value_kind_transfer_is_copy() {
        let mut data = CompositeData::new(struct_type("S"));
        data.fields.insert("n".to_string(), int(1));
        let original = Value::new_composite(data);

        let copy = original.transfer(None, Span::default()).unwrap();
        assert!(original.equal(&copy));

        // Mutating the copy must not affect the original
        if let Value::Composite(cell) = &copy {
            cell.borrow_mut().fields.insert("n".to_string(), int(2));
        }
        assert!(!original.equal(&copy));
    }

    #[test]
    fn test_resource_transfer_invalidates_source() {
        let mut data = CompositeData::new(resource_type("R"));
        data.uuid = Some(7);
        data.fields.insert("n".to_string(), int(42));
        let original = Value::new_composite(data);

        let moved = original.transfer(None, Span::default()).unwrap();

        // Source cell is dead, moved value is live with identity intact
        assert!(matches!(
            original.resource_state(),
            Some(ResourceState::Invalidated(InvalidationCause::Moved))
        ));
        assert!(original.check_live(Span::default()).is_err());
        if let Value::Composite(cell) = &moved {
            let data = cell.borrow();
            assert_eq!(data.uuid, Some(7));
            assert!(data.fields.get("n").unwrap().equal(&int(42)));
        } else {
            panic!("expected composite");
        }

        // A second transfer of the dead source must fail
        assert!(matches!(
            original.transfer(None, Span::default()),
            Err(RuntimeError::InvalidatedResource { .. })
        ));
    }

    #[test]
    fn test_transfer_stamps_owner_recursively() {
        let inner = {
            let mut data = CompositeData::new(resource_type("Inner"));
            data.fields.insert("n".to_string(), int(1));
            Value::new_composite(data)
        };
        let outer = {
            let mut data = CompositeData::new(resource_type("Outer"));
            data.fields.insert("inner".to_string(), inner);
            Value::new_composite(data)
        };

        let owner = Address::short(9);
        let moved = outer.transfer(Some(owner), Span::default()).unwrap();
        assert_eq!(moved.owner(), Some(owner));
        if let Value::Composite(cell) = &moved {
            let data = cell.borrow();
            assert_eq!(data.fields.get("inner").unwrap().owner(), Some(owner));
        }
    }

    #[test]
    fn test_composite_equality_ignores_uuid() {
        let make = |uuid| {
            let mut data = CompositeData::new(resource_type("R"));
            data.uuid = Some(uuid);
            data.fields.insert("n".to_string(), int(1));
            Value::new_composite(data)
        };
        assert!(make(1).equal(&make(2)));
    }

    #[test]
    fn test_incompatible_types_compare_unequal() {
        assert!(!int(1).equal(&Value::Bool(true)));
        assert!(!Value::Type(TypeDescriptor::Bool).equal(&Value::Bool(true)));
        assert!(!int(1).equal(&Value::Integer(IntegerValue::UInt8(1))));
    }

    #[test]
    fn test_static_type_of_array_uses_declared_element() {
        let array = Value::new_array(TypeDescriptor::AnyStruct, vec![int(1), int(2)]);
        assert_eq!(
            array.static_type(),
            TypeDescriptor::variable_array(TypeDescriptor::AnyStruct)
        );
    }

    #[test]
    fn test_dictionary_insertion_order_preserved() {
        let mut data = DictionaryData::new(
            TypeDescriptor::String,
            TypeDescriptor::Integer(IntegerKind::Int),
        );
        data.insert(DictionaryKey::String("b".to_string()), int(1));
        data.insert(DictionaryKey::String("a".to_string()), int(2));
        data.insert(DictionaryKey::String("b".to_string()), int(3));
        assert_eq!(
            data.insertion_order,
            vec![
                DictionaryKey::String("b".to_string()),
                DictionaryKey::String("a".to_string()),
            ]
        );
        data.remove(&DictionaryKey::String("b".to_string()));
        assert_eq!(
            data.insertion_order,
            vec![DictionaryKey::String("a".to_string())]
        );
    }
}
