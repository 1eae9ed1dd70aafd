//! Static type descriptors
//!
//! Runtime type tags consumed by the cast engine, reference creation, and
//! value identity. These are the elaborated types the static checker
//! attaches to the program; the interpreter never infers types itself.

use crate::authorization::Authorization;
use crate::location::Location;

/// Integer flavors: arbitrary precision, fixed-width checked, and
/// fixed-width wraparound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntegerKind {
    // Arbitrary precision
    Int,
    UInt,
    // Fixed-width signed, checked
    Int8,
    Int16,
    Int32,
    Int64,
    Int128,
    Int256,
    // Fixed-width unsigned, checked
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    UInt128,
    UInt256,
    // Two's-complement wraparound
    Word8,
    Word16,
    Word32,
    Word64,
    Word128,
}

impl IntegerKind {
    pub fn name(&self) -> &'static str {
        match self {
            IntegerKind::Int => "Int",
            IntegerKind::UInt => "UInt",
            IntegerKind::Int8 => "Int8",
            IntegerKind::Int16 => "Int16",
            IntegerKind::Int32 => "Int32",
            IntegerKind::Int64 => "Int64",
            IntegerKind::Int128 => "Int128",
            IntegerKind::Int256 => "Int256",
            IntegerKind::UInt8 => "UInt8",
            IntegerKind::UInt16 => "UInt16",
            IntegerKind::UInt32 => "UInt32",
            IntegerKind::UInt64 => "UInt64",
            IntegerKind::UInt128 => "UInt128",
            IntegerKind::UInt256 => "UInt256",
            IntegerKind::Word8 => "Word8",
            IntegerKind::Word16 => "Word16",
            IntegerKind::Word32 => "Word32",
            IntegerKind::Word64 => "Word64",
            IntegerKind::Word128 => "Word128",
        }
    }

    /// Wraparound semantics instead of overflow errors
    pub fn is_word(&self) -> bool {
        matches!(
            self,
            IntegerKind::Word8
                | IntegerKind::Word16
                | IntegerKind::Word32
                | IntegerKind::Word64
                | IntegerKind::Word128
        )
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            IntegerKind::Int
                | IntegerKind::Int8
                | IntegerKind::Int16
                | IntegerKind::Int32
                | IntegerKind::Int64
                | IntegerKind::Int128
                | IntegerKind::Int256
        )
    }
}

/// Fixed-point flavors, mantissa scaled by 10^8
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FixedKind {
    Fix64,
    UFix64,
}

impl FixedKind {
    pub fn name(&self) -> &'static str {
        match self {
            FixedKind::Fix64 => "Fix64",
            FixedKind::UFix64 => "UFix64",
        }
    }
}

/// Discriminator kind of a composite declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompositeKind {
    Struct,
    Resource,
    Contract,
    Event,
    Enum,
    Attachment,
}

impl CompositeKind {
    pub fn name(&self) -> &'static str {
        match self {
            CompositeKind::Struct => "struct",
            CompositeKind::Resource => "resource",
            CompositeKind::Contract => "contract",
            CompositeKind::Event => "event",
            CompositeKind::Enum => "enum",
            CompositeKind::Attachment => "attachment",
        }
    }
}

/// Identity of a composite type: location plus dotted name inside it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeType {
    pub location: Location,
    pub qualified_name: String,
    pub kind: CompositeKind,
}

impl CompositeType {
    pub fn new(location: Location, qualified_name: impl Into<String>, kind: CompositeKind) -> Self {
        CompositeType {
            location,
            qualified_name: qualified_name.into(),
            kind,
        }
    }

    /// Fully-qualified identifier, e.g. `A.0000000000000001.Token.Vault`
    pub fn type_id(&self) -> String {
        self.location.type_id(&self.qualified_name)
    }
}

/// Identity of an interface type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InterfaceType {
    pub location: Location,
    pub qualified_name: String,
    /// Whether the interface constrains resources or structs
    pub kind: CompositeKind,
}

impl InterfaceType {
    pub fn new(location: Location, qualified_name: impl Into<String>, kind: CompositeKind) -> Self {
        InterfaceType {
            location,
            qualified_name: qualified_name.into(),
            kind,
        }
    }

    pub fn type_id(&self) -> String {
        self.location.type_id(&self.qualified_name)
    }
}

/// The structural runtime type grammar
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    Void,
    Bool,
    String,
    Character,
    Address,
    Path,
    Integer(IntegerKind),
    Fixed(FixedKind),
    /// Top type of all value-kind values
    AnyStruct,
    /// Top type of all resource-kind values
    AnyResource,
    Optional(Box<TypeDescriptor>),
    VariableArray(Box<TypeDescriptor>),
    ConstantArray {
        element: Box<TypeDescriptor>,
        size: u64,
    },
    Dictionary {
        key: Box<TypeDescriptor>,
        value: Box<TypeDescriptor>,
    },
    Composite(CompositeType),
    Interface(InterfaceType),
    Reference {
        authorization: Authorization,
        referenced: Box<TypeDescriptor>,
    },
    Capability {
        /// Declared borrow type; `None` for an untyped capability
        borrow: Option<Box<TypeDescriptor>>,
    },
    /// `{I1, …, In}`: conforms to every listed interface
    Intersection {
        interfaces: Vec<InterfaceType>,
    },
    Function {
        parameters: Vec<TypeDescriptor>,
        return_type: Box<TypeDescriptor>,
    },
    /// The type of reified `Type` values
    Meta,
    Unknown,
}

impl TypeDescriptor {
    pub fn optional(inner: TypeDescriptor) -> Self {
        TypeDescriptor::Optional(Box::new(inner))
    }

    pub fn variable_array(element: TypeDescriptor) -> Self {
        TypeDescriptor::VariableArray(Box::new(element))
    }

    pub fn dictionary(key: TypeDescriptor, value: TypeDescriptor) -> Self {
        TypeDescriptor::Dictionary {
            key: Box::new(key),
            value: Box::new(value),
        }
    }

    pub fn reference(authorization: Authorization, referenced: TypeDescriptor) -> Self {
        TypeDescriptor::Reference {
            authorization,
            referenced: Box::new(referenced),
        }
    }

    pub fn function(parameters: Vec<TypeDescriptor>, return_type: TypeDescriptor) -> Self {
        TypeDescriptor::Function {
            parameters,
            return_type: Box::new(return_type),
        }
    }

    /// Resource-kind classification: values of
    /// resource-kind types are move-only and must be explicitly
    /// destroyed. Containers are resource-kind when their elements are.
    pub fn is_resource_kind(&self) -> bool {
        match self {
            TypeDescriptor::AnyResource => true,
            TypeDescriptor::Composite(composite) => matches!(
                composite.kind,
                CompositeKind::Resource | CompositeKind::Attachment
            ),
            TypeDescriptor::Interface(interface) => interface.kind == CompositeKind::Resource,
            TypeDescriptor::Optional(inner) => inner.is_resource_kind(),
            TypeDescriptor::VariableArray(element) => element.is_resource_kind(),
            TypeDescriptor::ConstantArray { element, .. } => element.is_resource_kind(),
            TypeDescriptor::Dictionary { value, .. } => value.is_resource_kind(),
            TypeDescriptor::Intersection { interfaces } => interfaces
                .iter()
                .any(|interface| interface.kind == CompositeKind::Resource),
            _ => false,
        }
    }

    /// Unwrap any number of optional layers
    pub fn unwrap_optionals(&self) -> &TypeDescriptor {
        let mut current = self;
        while let TypeDescriptor::Optional(inner) = current {
            current = inner;
        }
        current
    }
}

impl std::fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeDescriptor::Void => write!(f, "Void"),
            TypeDescriptor::Bool => write!(f, "Bool"),
            TypeDescriptor::String => write!(f, "String"),
            TypeDescriptor::Character => write!(f, "Character"),
            TypeDescriptor::Address => write!(f, "Address"),
            TypeDescriptor::Path => write!(f, "Path"),
            TypeDescriptor::Integer(kind) => write!(f, "{}", kind.name()),
            TypeDescriptor::Fixed(kind) => write!(f, "{}", kind.name()),
            TypeDescriptor::AnyStruct => write!(f, "AnyStruct"),
            TypeDescriptor::AnyResource => write!(f, "AnyResource"),
            TypeDescriptor::Optional(inner) => write!(f, "{}?", inner),
            TypeDescriptor::VariableArray(element) => write!(f, "[{}]", element),
            TypeDescriptor::ConstantArray { element, size } => {
                write!(f, "[{}; {}]", element, size)
            }
            TypeDescriptor::Dictionary { key, value } => write!(f, "{{{}: {}}}", key, value),
            TypeDescriptor::Composite(composite) => write!(f, "{}", composite.type_id()),
            TypeDescriptor::Interface(interface) => write!(f, "{}", interface.type_id()),
            TypeDescriptor::Reference {
                authorization,
                referenced,
            } => {
                if authorization.is_authorized() {
                    write!(f, "{} &{}", authorization, referenced)
                } else {
                    write!(f, "&{}", referenced)
                }
            }
            TypeDescriptor::Capability { borrow } => match borrow {
                Some(borrow) => write!(f, "Capability<{}>", borrow),
                None => write!(f, "Capability"),
            },
            TypeDescriptor::Intersection { interfaces } => {
                let ids: Vec<String> = interfaces.iter().map(|i| i.type_id()).collect();
                write!(f, "{{{}}}", ids.join(", "))
            }
            TypeDescriptor::Function {
                parameters,
                return_type,
            } => {
                let params: Vec<String> = parameters.iter().map(|p| p.to_string()).collect();
                write!(f, "fun({}): {}", params.join(", "), return_type)
            }
            TypeDescriptor::Meta => write!(f, "Type"),
            TypeDescriptor::Unknown => write!(f, "Unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::Address;

    fn resource(name: &str) -> TypeDescriptor {
        TypeDescriptor::Composite(CompositeType::new(
            Location::Account(Address::short(1)),
            name,
            CompositeKind::Resource,
        ))
    }

    #[test]
    fn test_resource_kind_propagates_through_containers() {
        let r = resource("R");
        assert!(r.is_resource_kind());
        assert!(TypeDescriptor::variable_array(r.clone()).is_resource_kind());
        assert!(TypeDescriptor::optional(r.clone()).is_resource_kind());
        assert!(
            TypeDescriptor::dictionary(TypeDescriptor::String, r.clone()).is_resource_kind()
        );
        assert!(!TypeDescriptor::reference(
            crate::authorization::Authorization::Unauthorized,
            r
        )
        .is_resource_kind());
        assert!(!TypeDescriptor::Integer(IntegerKind::Int).is_resource_kind());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            format!("{}", TypeDescriptor::variable_array(TypeDescriptor::Integer(IntegerKind::Int))),
            "[Int]"
        );
        assert_eq!(
            format!(
                "{}",
                TypeDescriptor::dictionary(
                    TypeDescriptor::String,
                    TypeDescriptor::Integer(IntegerKind::UInt8)
                )
            ),
            "{String: UInt8}"
        );
        assert_eq!(
            format!("{}", resource("Token.Vault")),
            "A.0000000000000001.Token.Vault"
        );
    }
}
