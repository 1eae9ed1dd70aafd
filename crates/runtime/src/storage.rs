//! Account storage adapter
//!
//! The boundary through which the interpreter reads and writes persistent
//! values at typed paths. The backend is abstract (`Storage`); the
//! adapter implements the path-domain rules, occupancy checks, capability
//! links with transitive resolution and cycle detection, and the borrow
//! type check.
//!
//! Links live in the private/public domains and point at another path on
//! the same account; values live in the storage domain. Dereferencing a
//! capability walks the link chain until it lands on a storage-domain
//! value or revisits a path, in which case the full chain is reported in
//! the `CyclicLink` error.

use crate::cast::{dynamic_type, is_subtype};
use crate::declarations::DeclarationRegistry;
use crate::error::RuntimeError;
use crate::reference::{ReferenceValue, StorageReference};
use crate::value::{CapabilityValue, Value};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use tally_core::location::{Address, Span};
use tally_core::path::{Path, PathDomain};
use tally_core::types::TypeDescriptor;
use tracing::debug;

/// One storage slot: a stored value or a capability link
#[derive(Debug, Clone)]
pub enum StoredValue {
    Value(Value),
    Link {
        target: Path,
        borrow_type: TypeDescriptor,
    },
}

/// The persistent backend the interpreter is given. A `None` write
/// removes the entry.
pub trait Storage {
    fn exists(&self, address: Address, path: &Path) -> bool;
    fn read(&self, address: Address, path: &Path) -> Option<StoredValue>;
    fn write(&mut self, address: Address, path: &Path, value: Option<StoredValue>);
    fn iterate(
        &self,
        address: Address,
        domain: PathDomain,
        f: &mut dyn FnMut(&Path, &StoredValue) -> bool,
    );
}

/// In-memory backend used by tests and embedders without persistence
#[derive(Default)]
pub struct InMemoryStorage {
    accounts: HashMap<Address, BTreeMap<Path, StoredValue>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        InMemoryStorage::default()
    }
}

impl Storage for InMemoryStorage {
    fn exists(&self, address: Address, path: &Path) -> bool {
        self.accounts
            .get(&address)
            .is_some_and(|account| account.contains_key(path))
    }

    fn read(&self, address: Address, path: &Path) -> Option<StoredValue> {
        self.accounts.get(&address)?.get(path).cloned()
    }

    fn write(&mut self, address: Address, path: &Path, value: Option<StoredValue>) {
        let account = self.accounts.entry(address).or_default();
        match value {
            Some(value) => {
                account.insert(path.clone(), value);
            }
            None => {
                account.remove(path);
            }
        }
    }

    fn iterate(
        &self,
        address: Address,
        domain: PathDomain,
        f: &mut dyn FnMut(&Path, &StoredValue) -> bool,
    ) {
        if let Some(account) = self.accounts.get(&address) {
            for (path, value) in account {
                if path.domain == domain && !f(path, value) {
                    break;
                }
            }
        }
    }
}

fn require_domain(path: &Path, expected: &[PathDomain]) -> Result<(), RuntimeError> {
    if expected.contains(&path.domain) {
        Ok(())
    } else {
        Err(RuntimeError::InvalidPathDomain {
            expected: expected.to_vec(),
            actual: path.domain,
        })
    }
}

/// `save(v, path)`: store a value at a storage-domain path, stamping the
/// account as its owner. Fails on occupied paths.
pub fn save(
    storage: &mut dyn Storage,
    address: Address,
    value: Value,
    path: &Path,
) -> Result<(), RuntimeError> {
    require_domain(path, &[PathDomain::Storage])?;
    if storage.exists(address, path) {
        return Err(RuntimeError::Overwrite {
            target: path.to_string(),
        });
    }
    value.set_owner(Some(address));
    debug!(address = %address, path = %path, "storage save");
    storage.write(address, path, Some(StoredValue::Value(value)));
    Ok(())
}

/// `load(path)`: move the value out of a storage-domain path. Produces
/// nil when the path is vacant.
pub fn load(
    storage: &mut dyn Storage,
    address: Address,
    path: &Path,
) -> Result<Value, RuntimeError> {
    require_domain(path, &[PathDomain::Storage])?;
    match storage.read(address, path) {
        Some(StoredValue::Value(value)) => {
            storage.write(address, path, None);
            value.set_owner(None);
            debug!(address = %address, path = %path, "storage load");
            Ok(Value::some(value))
        }
        _ => Ok(Value::nil()),
    }
}

/// Resolution of a link chain: the final storage path and the declared
/// borrow type of the first link followed (if any)
struct ResolvedTarget {
    path: Path,
    value: Value,
    link_borrow_type: Option<TypeDescriptor>,
}

/// Follow capability links transitively until a stored value or a cycle.
/// A vacant path anywhere in the chain resolves to `None`.
fn follow_links(
    storage: &dyn Storage,
    address: Address,
    start: &Path,
) -> Result<Option<ResolvedTarget>, RuntimeError> {
    let mut chain = vec![start.clone()];
    let mut current = start.clone();
    let mut first_link_type: Option<TypeDescriptor> = None;
    loop {
        match storage.read(address, &current) {
            None => return Ok(None),
            Some(StoredValue::Value(value)) => {
                return Ok(Some(ResolvedTarget {
                    path: current,
                    value,
                    link_borrow_type: first_link_type,
                }));
            }
            Some(StoredValue::Link {
                target,
                borrow_type,
            }) => {
                if first_link_type.is_none() {
                    first_link_type = Some(borrow_type);
                }
                if chain.contains(&target) {
                    chain.push(target);
                    return Err(RuntimeError::CyclicLink { chain });
                }
                chain.push(target.clone());
                current = target;
            }
        }
    }
}

/// `borrow(path)`: produce a storage reference of the requested
/// reference type, or nil when the path does not resolve or the stored
/// value does not satisfy the borrow type (including authorization
/// granted by the link).
pub fn borrow(
    storage: &dyn Storage,
    registry: &DeclarationRegistry,
    address: Address,
    path: &Path,
    reference_type: &TypeDescriptor,
) -> Result<Value, RuntimeError> {
    let TypeDescriptor::Reference {
        authorization,
        referenced,
    } = reference_type
    else {
        return Err(RuntimeError::unreachable(format!(
            "borrow requires a reference type, got `{}`",
            reference_type
        )));
    };
    let Some(resolved) = follow_links(storage, address, path)? else {
        return Ok(Value::nil());
    };
    // The chain's first link bounds what the borrow may request; a
    // direct storage borrow is bounded only by the stored value itself.
    if let Some(link_type) = &resolved.link_borrow_type
        && !is_subtype(registry, link_type, reference_type)
    {
        return Ok(Value::nil());
    }
    if !is_subtype(registry, &dynamic_type(&resolved.value), referenced) {
        return Ok(Value::nil());
    }
    debug!(address = %address, path = %path, target = %resolved.path, "storage borrow");
    Ok(Value::some(Value::Reference(ReferenceValue::Storage(
        Rc::new(StorageReference {
            authorization: authorization.clone(),
            borrowed_type: (**referenced).clone(),
            address,
            path: resolved.path,
        }),
    ))))
}

/// `link(cap_path, target)`: establish a capability link. Produces nil
/// when the capability path is already occupied.
pub fn link(
    storage: &mut dyn Storage,
    address: Address,
    capability_path: &Path,
    target: &Path,
    borrow_type: TypeDescriptor,
) -> Result<Value, RuntimeError> {
    require_domain(capability_path, &[PathDomain::Private, PathDomain::Public])?;
    if storage.exists(address, capability_path) {
        return Ok(Value::nil());
    }
    debug!(address = %address, path = %capability_path, target = %target, "storage link");
    storage.write(
        address,
        capability_path,
        Some(StoredValue::Link {
            target: target.clone(),
            borrow_type: borrow_type.clone(),
        }),
    );
    Ok(Value::some(Value::Capability(CapabilityValue {
        address,
        path: capability_path.clone(),
        borrow_type: Some(borrow_type),
    })))
}

/// `get_capability(path)`: an unchecked handle; it may not resolve
pub fn get_capability(
    address: Address,
    path: &Path,
    borrow_type: Option<TypeDescriptor>,
) -> Value {
    Value::Capability(CapabilityValue {
        address,
        path: path.clone(),
        borrow_type,
    })
}

/// Dereference a storage reference: re-read the path and re-check the
/// borrowed type on every access.
pub fn dereference(
    storage: &dyn Storage,
    registry: &DeclarationRegistry,
    reference: &StorageReference,
    _span: Span,
) -> Result<Value, RuntimeError> {
    match storage.read(reference.address, &reference.path) {
        Some(StoredValue::Value(value)) => {
            let actual = dynamic_type(&value);
            if is_subtype(registry, &actual, &reference.borrowed_type) {
                Ok(value)
            } else {
                Err(RuntimeError::TypeMismatch {
                    expected: reference.borrowed_type.clone(),
                    actual,
                })
            }
        }
        _ => Err(RuntimeError::DereferenceFailed {
            path: reference.path.clone(),
        }),
    }
}
