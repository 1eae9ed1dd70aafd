//! Code locations, account addresses, and qualified type identifiers
//!
//! Every composite and interface type is anchored to the location of the
//! code that declared it: an account (for deployed contracts) or a
//! script/transaction locator. Fully-qualified type identifiers embed the
//! location, e.g. `A.0000000000000001.Token.Vault` for contract-scoped
//! types and `S.main.Counter` for script-scoped ones.

use serde::{Deserialize, Serialize};

/// Fixed 8-byte account identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub [u8; 8]);

impl Address {
    /// Shorthand for test addresses: the last byte carries the value
    pub fn short(last: u8) -> Self {
        let mut bytes = [0u8; 8];
        bytes[7] = last;
        Address(bytes)
    }

    /// Hex form without a `0x` prefix, as used inside qualified identifiers
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

/// Where a declaration lives: an account or a script/transaction
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Location {
    /// Contract code deployed to an account
    Account(Address),
    /// A one-off script or transaction, keyed by a host-chosen locator
    Script(String),
}

impl Location {
    /// Build the fully-qualified identifier for a declaration at this
    /// location. `qualified_name` is the dotted name path inside the
    /// location, e.g. `Token.Vault` or just `Counter`.
    pub fn type_id(&self, qualified_name: &str) -> String {
        match self {
            Location::Account(address) => format!("A.{}.{}", address.to_hex(), qualified_name),
            Location::Script(locator) => format!("S.{}.{}", locator, qualified_name),
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::Account(address) => write!(f, "A.{}", address.to_hex()),
            Location::Script(locator) => write!(f, "S.{}", locator),
        }
    }
}

/// Source position for error reporting
///
/// Lines are 0-indexed internally; `Display` renders 1-indexed for users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(line: usize, column: usize) -> Self {
        Span { line, column }
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line + 1, self.column + 1)
    }
}
