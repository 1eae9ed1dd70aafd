//! Builtins and host objects
//!
//! The default base activation: reified-type construction, the runtime
//! reference-type constructor, and the built-in members of strings,
//! arrays, dictionaries, numbers, and capabilities. Also the account
//! host object surfaced to transactions as their signer, a thin veneer
//! over the storage adapter.

use crate::arithmetic::IntegerValue;
use crate::activation::Activation;
use crate::error::RuntimeError;
use crate::interpreter::Interpreter;
use crate::storage;
use crate::value::{
    CompositeData, DictionaryKey, FunctionValue, HostFunction, HostInvocation, Value,
};
use std::rc::Rc;
use tally_core::authorization::{Authorization, EntitlementSet};
use tally_core::location::{Address, Location};
use tally_core::path::Path;
use tally_core::types::{CompositeKind, CompositeType, IntegerKind, TypeDescriptor};

/// Wrap a host closure as a function value
pub fn host_function(
    name: impl Into<String>,
    ty: TypeDescriptor,
    implementation: impl Fn(&mut Interpreter, HostInvocation) -> Result<Value, RuntimeError> + 'static,
) -> Value {
    Value::Function(FunctionValue::Host(Rc::new(HostFunction {
        name: name.into(),
        ty,
        implementation: Rc::new(implementation),
    })))
}

fn generic_function_type() -> TypeDescriptor {
    TypeDescriptor::function(Vec::new(), TypeDescriptor::Unknown)
}

/// Install the language builtins into the base activation
pub fn install_builtins(activation: &mut Activation) {
    // Type<T>(): reify a type descriptor
    activation.declare(
        "Type",
        host_function("Type", generic_function_type(), |_, invocation| {
            let descriptor = invocation
                .type_arguments
                .first()
                .cloned()
                .ok_or_else(|| RuntimeError::unreachable("Type requires a type argument"))?;
            Ok(Value::Type(descriptor))
        }),
    );

    // ReferenceType(entitlements, disjoint, type): runtime construction
    // of a reference type. Disjunction sets with more than one member
    // can only come from the checker, never from here.
    activation.declare(
        "ReferenceType",
        host_function(
            "ReferenceType",
            generic_function_type(),
            |_, invocation| {
                let [entitlements, disjoint, referenced] = invocation.arguments.as_slice() else {
                    return Err(RuntimeError::ArgumentCount {
                        expected: 3,
                        actual: invocation.arguments.len(),
                    });
                };
                let Value::Array(entitlements) = entitlements else {
                    return Err(RuntimeError::unreachable("expected entitlement array"));
                };
                let kinds: Vec<String> = entitlements
                    .borrow()
                    .values
                    .iter()
                    .map(|value| match value {
                        Value::String(s) => Ok(s.as_ref().clone()),
                        _ => Err(RuntimeError::unreachable("expected entitlement name")),
                    })
                    .collect::<Result<_, _>>()?;
                let Value::Bool(disjoint) = disjoint else {
                    return Err(RuntimeError::unreachable("expected Bool"));
                };
                let Value::Type(referenced) = referenced else {
                    return Err(RuntimeError::unreachable("expected Type"));
                };
                let authorization = if kinds.is_empty() {
                    Authorization::Unauthorized
                } else if *disjoint {
                    if kinds.len() > 1 {
                        return Err(
                            RuntimeError::InvalidDisjointRuntimeEntitlementSetCreation,
                        );
                    }
                    Authorization::Entitlements(EntitlementSet::disjunction(kinds))
                } else {
                    Authorization::Entitlements(EntitlementSet::conjunction(kinds))
                };
                Ok(Value::Type(TypeDescriptor::reference(
                    authorization,
                    referenced.clone(),
                )))
            },
        ),
    );
}

fn utf8_array(s: &str) -> Value {
    Value::new_array(
        TypeDescriptor::Integer(IntegerKind::UInt8),
        s.bytes()
            .map(|b| Value::Integer(IntegerValue::UInt8(b)))
            .collect(),
    )
}

fn int_value(n: usize) -> Value {
    Value::Integer(IntegerValue::Int((n as i64).into()))
}

/// Built-in members of non-composite values. Returns `None` when the
/// value has no such member.
pub fn builtin_member(value: &Value, name: &str) -> Option<Value> {
    match value {
        Value::String(s) => match name {
            "length" => Some(int_value(s.chars().count())),
            "utf8" => Some(utf8_array(s)),
            "concat" => {
                let receiver = s.clone();
                Some(host_function(
                    "String.concat",
                    TypeDescriptor::function(vec![TypeDescriptor::String], TypeDescriptor::String),
                    move |_, invocation| match invocation.arguments.as_slice() {
                        [Value::String(other)] => {
                            Ok(Value::string(format!("{}{}", receiver, other)))
                        }
                        _ => Err(RuntimeError::unreachable("String.concat expects a string")),
                    },
                ))
            }
            _ => None,
        },
        Value::Character(c) => match name {
            "utf8" => Some(utf8_array(c)),
            _ => None,
        },
        Value::Integer(n) => match name {
            "toString" => {
                let rendered = n.to_string();
                Some(host_function(
                    "Integer.toString",
                    TypeDescriptor::function(vec![], TypeDescriptor::String),
                    move |_, _| Ok(Value::string(rendered.clone())),
                ))
            }
            _ => None,
        },
        Value::Fixed(n) => match name {
            "toString" => {
                let rendered = n.to_string();
                Some(host_function(
                    "Fixed.toString",
                    TypeDescriptor::function(vec![], TypeDescriptor::String),
                    move |_, _| Ok(Value::string(rendered.clone())),
                ))
            }
            _ => None,
        },
        Value::Address(address) => match name {
            "toString" => {
                let rendered = address.to_string();
                Some(host_function(
                    "Address.toString",
                    TypeDescriptor::function(vec![], TypeDescriptor::String),
                    move |_, _| Ok(Value::string(rendered.clone())),
                ))
            }
            _ => None,
        },
        Value::Array(cell) => match name {
            "length" => Some(int_value(cell.borrow().values.len())),
            "append" => {
                let cell = cell.clone();
                Some(host_function(
                    "Array.append",
                    generic_function_type(),
                    move |_, invocation| {
                        let [value] = invocation.arguments.as_slice() else {
                            return Err(RuntimeError::ArgumentCount {
                                expected: 1,
                                actual: invocation.arguments.len(),
                            });
                        };
                        let mut data = cell.borrow_mut();
                        data.values.push(value.clone());
                        data.epoch += 1;
                        Ok(Value::Void)
                    },
                ))
            }
            "remove" => {
                let cell = cell.clone();
                Some(host_function(
                    "Array.remove",
                    generic_function_type(),
                    move |_, invocation| {
                        let [Value::Integer(index)] = invocation.arguments.as_slice() else {
                            return Err(RuntimeError::unreachable("expected index"));
                        };
                        use num_traits::ToPrimitive;
                        let raw = index.to_bigint();
                        let mut data = cell.borrow_mut();
                        match raw.to_usize() {
                            Some(position) if position < data.values.len() => {
                                let value = data.values.remove(position);
                                data.epoch += 1;
                                Ok(value)
                            }
                            _ => Err(RuntimeError::IndexOutOfBounds {
                                index: raw.to_i128().unwrap_or(i128::MAX),
                                size: data.values.len(),
                            }),
                        }
                    },
                ))
            }
            "contains" => {
                let cell = cell.clone();
                Some(host_function(
                    "Array.contains",
                    generic_function_type(),
                    move |_, invocation| {
                        let [candidate] = invocation.arguments.as_slice() else {
                            return Err(RuntimeError::ArgumentCount {
                                expected: 1,
                                actual: invocation.arguments.len(),
                            });
                        };
                        let found = cell
                            .borrow()
                            .values
                            .iter()
                            .any(|value| value.equal(candidate));
                        Ok(Value::Bool(found))
                    },
                ))
            }
            _ => None,
        },
        Value::Dictionary(cell) => match name {
            "length" => Some(int_value(cell.borrow().entries.len())),
            "keys" => {
                let data = cell.borrow();
                Some(Value::new_array(
                    data.key_type.clone(),
                    data.insertion_order.iter().map(|k| k.to_value()).collect(),
                ))
            }
            "values" => {
                let data = cell.borrow();
                Some(Value::new_array(
                    data.value_type.clone(),
                    data.insertion_order
                        .iter()
                        .filter_map(|k| data.entries.get(k).cloned())
                        .collect(),
                ))
            }
            "containsKey" => {
                let cell = cell.clone();
                Some(host_function(
                    "Dictionary.containsKey",
                    generic_function_type(),
                    move |_, invocation| {
                        let [key] = invocation.arguments.as_slice() else {
                            return Err(RuntimeError::ArgumentCount {
                                expected: 1,
                                actual: invocation.arguments.len(),
                            });
                        };
                        let key = DictionaryKey::from_value(key)
                            .ok_or_else(|| RuntimeError::unreachable("unhashable key"))?;
                        Ok(Value::Bool(cell.borrow().entries.contains_key(&key)))
                    },
                ))
            }
            "insert" => {
                let cell = cell.clone();
                Some(host_function(
                    "Dictionary.insert",
                    generic_function_type(),
                    move |_, invocation| {
                        let [key, value] = invocation.arguments.as_slice() else {
                            return Err(RuntimeError::ArgumentCount {
                                expected: 2,
                                actual: invocation.arguments.len(),
                            });
                        };
                        let key = DictionaryKey::from_value(key)
                            .ok_or_else(|| RuntimeError::unreachable("unhashable key"))?;
                        let mut data = cell.borrow_mut();
                        let previous = data.insert(key, value.clone());
                        data.epoch += 1;
                        Ok(match previous {
                            Some(previous) => Value::some(previous),
                            None => Value::nil(),
                        })
                    },
                ))
            }
            "remove" => {
                let cell = cell.clone();
                Some(host_function(
                    "Dictionary.remove",
                    generic_function_type(),
                    move |_, invocation| {
                        let [key] = invocation.arguments.as_slice() else {
                            return Err(RuntimeError::ArgumentCount {
                                expected: 1,
                                actual: invocation.arguments.len(),
                            });
                        };
                        let key = DictionaryKey::from_value(key)
                            .ok_or_else(|| RuntimeError::unreachable("unhashable key"))?;
                        let mut data = cell.borrow_mut();
                        let previous = data.remove(&key);
                        data.epoch += 1;
                        Ok(match previous {
                            Some(previous) => Value::some(previous),
                            None => Value::nil(),
                        })
                    },
                ))
            }
            _ => None,
        },
        Value::Capability(capability) => match name {
            "address" => Some(Value::Address(capability.address)),
            "path" => Some(Value::Path(capability.path.clone())),
            "borrow" => {
                let capability = capability.clone();
                Some(host_function(
                    "Capability.borrow",
                    generic_function_type(),
                    move |interpreter, invocation| {
                        let reference_type = invocation
                            .type_arguments
                            .first()
                            .cloned()
                            .or_else(|| capability.borrow_type.clone())
                            .ok_or_else(|| {
                                RuntimeError::unreachable("untyped capability borrow")
                            })?;
                        let storage_handle = interpreter.storage_handle();
                        let storage = storage_handle.borrow();
                        storage::borrow(
                            &*storage,
                            interpreter.registry(),
                            capability.address,
                            &capability.path,
                            &reference_type,
                        )
                    },
                ))
            }
            "check" => {
                let capability = capability.clone();
                Some(host_function(
                    "Capability.check",
                    TypeDescriptor::function(vec![], TypeDescriptor::Bool),
                    move |interpreter, invocation| {
                        let Some(reference_type) = invocation
                            .type_arguments
                            .first()
                            .cloned()
                            .or_else(|| capability.borrow_type.clone())
                        else {
                            return Ok(Value::Bool(false));
                        };
                        let storage_handle = interpreter.storage_handle();
                        let storage = storage_handle.borrow();
                        let borrowed = storage::borrow(
                            &*storage,
                            interpreter.registry(),
                            capability.address,
                            &capability.path,
                            &reference_type,
                        )?;
                        Ok(Value::Bool(!borrowed.equal(&Value::nil())))
                    },
                ))
            }
            _ => None,
        },
        _ => None,
    }
}

/// The account host object handed to transactions as a signer
pub fn account_value(address: Address) -> Value {
    let mut data = CompositeData::new(CompositeType::new(
        Location::Script("native".to_string()),
        "Account",
        CompositeKind::Struct,
    ));
    data.fields
        .insert("address".to_string(), Value::Address(address));

    data.fields.insert(
        "save".to_string(),
        host_function("Account.save", generic_function_type(), move |interpreter, invocation| {
            let actual = invocation.arguments.len();
            let mut arguments = invocation.arguments.into_iter();
            let (Some(value), Some(path), None) =
                (arguments.next(), arguments.next(), arguments.next())
            else {
                return Err(RuntimeError::ArgumentCount {
                    expected: 2,
                    actual,
                });
            };
            let path = expect_path(path)?;
            let value = value.transfer(Some(address), invocation.span)?;
            let storage_handle = interpreter.storage_handle();
            let mut storage = storage_handle.borrow_mut();
            storage::save(&mut *storage, address, value, &path)?;
            Ok(Value::Void)
        }),
    );

    data.fields.insert(
        "load".to_string(),
        host_function("Account.load", generic_function_type(), move |interpreter, invocation| {
            let [path] = invocation.arguments.as_slice() else {
                return Err(RuntimeError::ArgumentCount {
                    expected: 1,
                    actual: invocation.arguments.len(),
                });
            };
            let path = expect_path(path.clone())?;
            let storage_handle = interpreter.storage_handle();
            let mut storage = storage_handle.borrow_mut();
            storage::load(&mut *storage, address, &path)
        }),
    );

    data.fields.insert(
        "borrow".to_string(),
        host_function("Account.borrow", generic_function_type(), move |interpreter, invocation| {
            let [path] = invocation.arguments.as_slice() else {
                return Err(RuntimeError::ArgumentCount {
                    expected: 1,
                    actual: invocation.arguments.len(),
                });
            };
            let path = expect_path(path.clone())?;
            let reference_type = invocation
                .type_arguments
                .first()
                .cloned()
                .ok_or_else(|| RuntimeError::unreachable("borrow requires a type argument"))?;
            let storage_handle = interpreter.storage_handle();
            let storage = storage_handle.borrow();
            storage::borrow(
                &*storage,
                interpreter.registry(),
                address,
                &path,
                &reference_type,
            )
        }),
    );

    data.fields.insert(
        "link".to_string(),
        host_function("Account.link", generic_function_type(), move |interpreter, invocation| {
            let [capability_path, target_path] = invocation.arguments.as_slice() else {
                return Err(RuntimeError::ArgumentCount {
                    expected: 2,
                    actual: invocation.arguments.len(),
                });
            };
            let capability_path = expect_path(capability_path.clone())?;
            let target_path = expect_path(target_path.clone())?;
            let borrow_type = invocation
                .type_arguments
                .first()
                .cloned()
                .ok_or_else(|| RuntimeError::unreachable("link requires a type argument"))?;
            let storage_handle = interpreter.storage_handle();
            let mut storage = storage_handle.borrow_mut();
            storage::link(
                &mut *storage,
                address,
                &capability_path,
                &target_path,
                borrow_type,
            )
        }),
    );

    data.fields.insert(
        "getCapability".to_string(),
        host_function(
            "Account.getCapability",
            generic_function_type(),
            move |_, invocation| {
                let [path] = invocation.arguments.as_slice() else {
                    return Err(RuntimeError::ArgumentCount {
                        expected: 1,
                        actual: invocation.arguments.len(),
                    });
                };
                let path = expect_path(path.clone())?;
                Ok(storage::get_capability(
                    address,
                    &path,
                    invocation.type_arguments.first().cloned(),
                ))
            },
        ),
    );

    Value::new_composite(data)
}

fn expect_path(value: Value) -> Result<Path, RuntimeError> {
    match value {
        Value::Path(path) => Ok(path),
        other => Err(RuntimeError::unreachable(format!(
            "expected a path, got `{}`",
            other.static_type()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_members() {
        let s = Value::string("héllo");
        let length = builtin_member(&s, "length").unwrap();
        assert!(length.equal(&int_value(5)));
        assert!(builtin_member(&s, "utf8").is_some());
        assert!(builtin_member(&s, "nope").is_none());
    }

    #[test]
    fn test_account_object_shape() {
        let account = account_value(Address::short(1));
        let Value::Composite(cell) = &account else {
            panic!("expected composite");
        };
        let data = cell.borrow();
        assert!(data.fields.contains_key("address"));
        for member in ["save", "load", "borrow", "link", "getCapability"] {
            assert!(
                matches!(data.fields.get(member), Some(Value::Function(_))),
                "missing account member {member}"
            );
        }
    }
}
