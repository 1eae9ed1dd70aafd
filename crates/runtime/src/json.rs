//! Value <-> JSON exchange
//!
//! Lossless export of runtime values for host inspection of emitted
//! events, and the inverse import used to bind externally-supplied
//! transaction arguments into typed values. Resources, references, and
//! functions do not round-trip; they export as tagged descriptive
//! objects only.

use crate::arithmetic::{FixedValue, IntegerValue, FIXED_SCALE};
use crate::error::RuntimeError;
use crate::value::{DictionaryData, DictionaryKey, Value};
use num_bigint::BigInt;
use serde_json::{json, Value as Json};
use std::cell::RefCell;
use std::rc::Rc;
use std::str::FromStr;
use tally_core::location::Address;
use tally_core::path::{Path, PathDomain};
use tally_core::types::{FixedKind, TypeDescriptor};

/// Export a runtime value as JSON
pub fn export_value(value: &Value) -> Json {
    match value {
        Value::Void => json!({ "type": "Void" }),
        Value::Bool(b) => json!({ "type": "Bool", "value": b }),
        Value::Integer(n) => json!({
            "type": n.kind().name(),
            "value": n.to_string(),
        }),
        Value::Fixed(n) => json!({
            "type": n.kind().name(),
            "value": n.to_string(),
        }),
        Value::String(s) => json!({ "type": "String", "value": s.as_ref() }),
        Value::Character(c) => json!({ "type": "Character", "value": c.as_ref() }),
        Value::Address(address) => json!({ "type": "Address", "value": address.to_string() }),
        Value::Path(path) => json!({
            "type": "Path",
            "value": { "domain": path.domain.name(), "identifier": path.identifier },
        }),
        Value::Optional(inner) => json!({
            "type": "Optional",
            "value": inner.as_ref().map(|inner| export_value(inner)),
        }),
        Value::Array(cell) => json!({
            "type": "Array",
            "value": cell.borrow().values.iter().map(export_value).collect::<Vec<_>>(),
        }),
        Value::Dictionary(cell) => {
            let data = cell.borrow();
            let entries: Vec<Json> = data
                .insertion_order
                .iter()
                .filter_map(|key| {
                    data.entries.get(key).map(|value| {
                        json!({
                            "key": export_value(&key.to_value()),
                            "value": export_value(value),
                        })
                    })
                })
                .collect();
            json!({ "type": "Dictionary", "value": entries })
        }
        Value::Composite(cell) => {
            let data = cell.borrow();
            let fields: Vec<Json> = data
                .fields
                .iter()
                .map(|(name, value)| json!({ "name": name, "value": export_value(value) }))
                .collect();
            json!({
                "type": "Composite",
                "kind": data.type_.kind.name(),
                "id": data.type_.type_id(),
                "fields": fields,
            })
        }
        Value::Capability(capability) => json!({
            "type": "Capability",
            "address": capability.address.to_string(),
            "path": capability.path.to_string(),
            "borrowType": capability.borrow_type.as_ref().map(|t| t.to_string()),
        }),
        Value::Type(descriptor) => json!({ "type": "Type", "value": descriptor.to_string() }),
        Value::Reference(reference) => json!({
            "type": "Reference",
            "referenceType": reference.ty().to_string(),
        }),
        Value::Function(function) => json!({
            "type": "Function",
            "functionType": function.ty().to_string(),
        }),
    }
}

fn encoding_error(message: impl Into<String>) -> RuntimeError {
    RuntimeError::ArgumentEncoding {
        message: message.into(),
    }
}

/// Import a JSON argument against the type the program declares for it
pub fn import_value(descriptor: &TypeDescriptor, json: &Json) -> Result<Value, RuntimeError> {
    match descriptor {
        TypeDescriptor::Bool => match json {
            Json::Bool(b) => Ok(Value::Bool(*b)),
            other => Err(encoding_error(format!("expected a boolean, got {other}"))),
        },
        TypeDescriptor::String => match json {
            Json::String(s) => Ok(Value::string(s.clone())),
            other => Err(encoding_error(format!("expected a string, got {other}"))),
        },
        TypeDescriptor::Integer(kind) => {
            let raw = match json {
                Json::Number(n) => n.to_string(),
                Json::String(s) => s.clone(),
                other => {
                    return Err(encoding_error(format!("expected an integer, got {other}")));
                }
            };
            let value = BigInt::from_str(&raw)
                .map_err(|_| encoding_error(format!("invalid integer literal `{raw}`")))?;
            Ok(Value::Integer(IntegerValue::from_bigint(*kind, value)?))
        }
        TypeDescriptor::Fixed(kind) => {
            let raw = match json {
                Json::Number(n) => n.to_string(),
                Json::String(s) => s.clone(),
                other => {
                    return Err(encoding_error(format!(
                        "expected a fixed-point number, got {other}"
                    )));
                }
            };
            Ok(Value::Fixed(parse_fixed(*kind, &raw)?))
        }
        TypeDescriptor::Address => match json {
            Json::String(s) => parse_address(s).map(Value::Address),
            other => Err(encoding_error(format!("expected an address, got {other}"))),
        },
        TypeDescriptor::Path => {
            let domain = json
                .get("domain")
                .and_then(Json::as_str)
                .ok_or_else(|| encoding_error("path needs a domain"))?;
            let identifier = json
                .get("identifier")
                .and_then(Json::as_str)
                .ok_or_else(|| encoding_error("path needs an identifier"))?;
            let domain = match domain {
                "storage" => PathDomain::Storage,
                "private" => PathDomain::Private,
                "public" => PathDomain::Public,
                other => return Err(encoding_error(format!("unknown path domain `{other}`"))),
            };
            Ok(Value::Path(Path::new(domain, identifier)))
        }
        TypeDescriptor::Optional(inner) => match json {
            Json::Null => Ok(Value::nil()),
            other => Ok(Value::some(import_value(inner, other)?)),
        },
        TypeDescriptor::VariableArray(element) => match json {
            Json::Array(items) => {
                let values = items
                    .iter()
                    .map(|item| import_value(element, item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::new_array((**element).clone(), values))
            }
            other => Err(encoding_error(format!("expected an array, got {other}"))),
        },
        TypeDescriptor::Dictionary { key, value } => match json {
            Json::Array(items) => {
                let mut data = DictionaryData::new((**key).clone(), (**value).clone());
                for item in items {
                    let key_json = item
                        .get("key")
                        .ok_or_else(|| encoding_error("dictionary entry needs a key"))?;
                    let value_json = item
                        .get("value")
                        .ok_or_else(|| encoding_error("dictionary entry needs a value"))?;
                    let key_value = import_value(key, key_json)?;
                    let key = DictionaryKey::from_value(&key_value)
                        .ok_or_else(|| encoding_error("unhashable dictionary key"))?;
                    data.insert(key, import_value(value, value_json)?);
                }
                Ok(Value::Dictionary(Rc::new(RefCell::new(data))))
            }
            other => Err(encoding_error(format!(
                "expected an array of entries, got {other}"
            ))),
        },
        other => Err(encoding_error(format!(
            "arguments of type `{other}` cannot be decoded from JSON"
        ))),
    }
}

/// Import one JSON argument per declared type, in order
pub fn import_arguments(
    types: &[TypeDescriptor],
    values: &[Json],
) -> Result<Vec<Value>, RuntimeError> {
    if types.len() != values.len() {
        return Err(RuntimeError::ArgumentCount {
            expected: types.len(),
            actual: values.len(),
        });
    }
    types
        .iter()
        .zip(values)
        .map(|(descriptor, json)| import_value(descriptor, json))
        .collect()
}

fn parse_address(raw: &str) -> Result<Address, RuntimeError> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    if digits.len() > 16 || digits.is_empty() {
        return Err(encoding_error(format!("invalid address `{raw}`")));
    }
    let padded = format!("{:0>16}", digits);
    let mut bytes = [0u8; 8];
    for (i, byte) in bytes.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&padded[i * 2..i * 2 + 2], 16)
            .map_err(|_| encoding_error(format!("invalid address `{raw}`")))?;
    }
    Ok(Address(bytes))
}

fn parse_fixed(kind: FixedKind, raw: &str) -> Result<FixedValue, RuntimeError> {
    let (negative, digits) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    let (integer_part, fraction_part) = match digits.split_once('.') {
        Some((i, f)) => (i, f),
        None => (digits, ""),
    };
    if fraction_part.len() > 8 {
        return Err(encoding_error(format!(
            "fixed-point literal `{raw}` exceeds 8 fractional digits"
        )));
    }
    let integer: i128 = integer_part
        .parse()
        .map_err(|_| encoding_error(format!("invalid fixed-point literal `{raw}`")))?;
    let fraction: i128 = if fraction_part.is_empty() {
        0
    } else {
        let padded = format!("{:0<8}", fraction_part);
        padded
            .parse()
            .map_err(|_| encoding_error(format!("invalid fixed-point literal `{raw}`")))?
    };
    let mut mantissa = integer
        .checked_mul(FIXED_SCALE)
        .and_then(|scaled| scaled.checked_add(fraction))
        .ok_or_else(|| encoding_error(format!("fixed-point literal `{raw}` out of range")))?;
    if negative {
        mantissa = -mantissa;
    }
    FixedValue::from_mantissa(kind, mantissa)
}
