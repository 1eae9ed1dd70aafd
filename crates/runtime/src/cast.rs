//! Dynamic subtyping and the cast engine
//!
//! `as?` and `as!` consult the *dynamic* type of a value. For references
//! that is the authorization stamped at creation combined with the
//! concrete referent type, which is what lets a downcast see through any
//! number of static upcasts. For containers it is the declared element
//! type, which is what makes covariant container downcasts fail:
//! `[AnyStruct]` is `[AnyStruct]` no matter what the elements are.
//!
//! Casting never copies: a successful resource cast moves the value into
//! the target binding, a failed failable cast leaves ownership with the
//! surrounding expression.

use crate::declarations::DeclarationRegistry;
use crate::error::RuntimeError;
use crate::value::Value;
use tally_core::location::Span;
use tally_core::types::TypeDescriptor;

/// The dynamic type used by cast checks
pub fn dynamic_type(value: &Value) -> TypeDescriptor {
    match value {
        Value::Reference(reference) => {
            let referenced = match reference {
                crate::reference::ReferenceValue::Ephemeral(ephemeral) => {
                    dynamic_type(&ephemeral.referent)
                }
                crate::reference::ReferenceValue::Storage(storage) => {
                    storage.borrowed_type.clone()
                }
            };
            TypeDescriptor::Reference {
                authorization: reference.authorization().clone(),
                referenced: Box::new(referenced),
            }
        }
        Value::Optional(Some(inner)) => TypeDescriptor::optional(dynamic_type(inner)),
        Value::Optional(None) => TypeDescriptor::optional(TypeDescriptor::Unknown),
        other => other.static_type(),
    }
}

/// Structural subtype check over descriptors, including authorization
/// subtyping on references and interface conformance through the
/// registry
pub fn is_subtype(
    registry: &DeclarationRegistry,
    sub: &TypeDescriptor,
    superty: &TypeDescriptor,
) -> bool {
    if sub == superty {
        return true;
    }
    match (sub, superty) {
        (TypeDescriptor::Unknown, _) | (_, TypeDescriptor::Unknown) => false,
        (_, TypeDescriptor::AnyStruct) => !sub.is_resource_kind(),
        (_, TypeDescriptor::AnyResource) => sub.is_resource_kind(),
        (TypeDescriptor::Optional(sub_inner), TypeDescriptor::Optional(super_inner)) => {
            is_subtype(registry, sub_inner, super_inner)
        }
        // Non-optional into optional: covariant injection
        (_, TypeDescriptor::Optional(super_inner)) => is_subtype(registry, sub, super_inner),
        (TypeDescriptor::VariableArray(sub_element), TypeDescriptor::VariableArray(super_element)) => {
            is_subtype(registry, sub_element, super_element)
        }
        (
            TypeDescriptor::ConstantArray {
                element: sub_element,
                size: sub_size,
            },
            TypeDescriptor::ConstantArray {
                element: super_element,
                size: super_size,
            },
        ) => sub_size == super_size && is_subtype(registry, sub_element, super_element),
        (
            TypeDescriptor::Dictionary {
                key: sub_key,
                value: sub_value,
            },
            TypeDescriptor::Dictionary {
                key: super_key,
                value: super_value,
            },
        ) => is_subtype(registry, sub_key, super_key) && is_subtype(registry, sub_value, super_value),
        (TypeDescriptor::Composite(composite), TypeDescriptor::Interface(interface)) => registry
            .composite(&composite.type_id())
            .is_some_and(|declaration| {
                registry.composite_conforms_to(declaration, &interface.type_id())
            }),
        (TypeDescriptor::Composite(composite), TypeDescriptor::Intersection { interfaces }) => {
            registry
                .composite(&composite.type_id())
                .is_some_and(|declaration| {
                    interfaces.iter().all(|interface| {
                        registry.composite_conforms_to(declaration, &interface.type_id())
                    })
                })
        }
        (TypeDescriptor::Interface(sub_interface), TypeDescriptor::Interface(super_interface)) => {
            registry.interface_inherits(&sub_interface.type_id(), &super_interface.type_id())
        }
        (TypeDescriptor::Intersection { interfaces }, TypeDescriptor::Interface(super_interface)) => {
            interfaces.iter().any(|interface| {
                registry.interface_inherits(&interface.type_id(), &super_interface.type_id())
            })
        }
        (
            TypeDescriptor::Intersection {
                interfaces: sub_interfaces,
            },
            TypeDescriptor::Intersection {
                interfaces: super_interfaces,
            },
        ) => super_interfaces.iter().all(|super_interface| {
            sub_interfaces.iter().any(|sub_interface| {
                registry.interface_inherits(&sub_interface.type_id(), &super_interface.type_id())
            })
        }),
        (
            TypeDescriptor::Reference {
                authorization: sub_auth,
                referenced: sub_referenced,
            },
            TypeDescriptor::Reference {
                authorization: super_auth,
                referenced: super_referenced,
            },
        ) => {
            sub_auth.is_subtype_of(super_auth)
                && is_subtype(registry, sub_referenced, super_referenced)
        }
        (
            TypeDescriptor::Capability { borrow: sub_borrow },
            TypeDescriptor::Capability {
                borrow: super_borrow,
            },
        ) => match (sub_borrow, super_borrow) {
            (_, None) => true,
            (Some(sub_borrow), Some(super_borrow)) => {
                is_subtype(registry, sub_borrow, super_borrow)
            }
            (None, Some(_)) => false,
        },
        (
            TypeDescriptor::Function {
                parameters: sub_parameters,
                return_type: sub_return,
            },
            TypeDescriptor::Function {
                parameters: super_parameters,
                return_type: super_return,
            },
        ) => {
            sub_parameters.len() == super_parameters.len()
                && sub_parameters
                    .iter()
                    .zip(super_parameters.iter())
                    .all(|(sub_p, super_p)| is_subtype(registry, super_p, sub_p))
                && is_subtype(registry, sub_return, super_return)
        }
        _ => false,
    }
}

/// Wrap a value in optional layers until its shape matches the target.
/// `1 as? Int?` produces `Some(1)`, not a bare `1`. Static upcasts reuse
/// this: they are identity at runtime apart from optional injection.
pub fn adapt_to_target(value: Value, target: &TypeDescriptor) -> Value {
    if let TypeDescriptor::Optional(inner) = target
        && !matches!(value, Value::Optional(_))
    {
        return Value::some(adapt_to_target(value, inner));
    }
    value
}

/// `as?`: `Ok(value)` (adapted to the target shape) on success. On
/// mismatch the original value is handed back in `Err` so the caller
/// keeps ownership and can apply the resource-discipline rules.
pub fn failable_cast(
    registry: &DeclarationRegistry,
    value: Value,
    target: &TypeDescriptor,
) -> Result<Value, Value> {
    // nil casts into any optional target, never into a non-optional
    if let Value::Optional(None) = &value {
        return if matches!(target, TypeDescriptor::Optional(_)) {
            Ok(value)
        } else {
            Err(value)
        };
    }
    let dynamic = dynamic_type(&value);
    if is_subtype(registry, &dynamic, target) {
        Ok(adapt_to_target(value, target))
    } else {
        Err(value)
    }
}

/// `as!`: the value, or `ForceCastTypeMismatch`
pub fn force_cast(
    registry: &DeclarationRegistry,
    value: Value,
    target: &TypeDescriptor,
    span: Span,
) -> Result<Value, RuntimeError> {
    failable_cast(registry, value, target).map_err(|value| {
        RuntimeError::ForceCastTypeMismatch {
            expected: target.clone(),
            actual: dynamic_type(&value),
            span,
        }
    })
}
