//! Storage paths
//!
//! A path is a typed key into account storage: a domain plus an
//! identifier, written `/storage/vault`, `/private/admin`, `/public/cap`.
//! The storage domain holds values; the private and public domains hold
//! capability links only.

use serde::{Deserialize, Serialize};

/// The three path domains
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PathDomain {
    Storage,
    Private,
    Public,
}

impl PathDomain {
    pub fn name(&self) -> &'static str {
        match self {
            PathDomain::Storage => "storage",
            PathDomain::Private => "private",
            PathDomain::Public => "public",
        }
    }

    /// Domains that may hold capability links
    pub fn is_capability_domain(&self) -> bool {
        matches!(self, PathDomain::Private | PathDomain::Public)
    }
}

impl std::fmt::Display for PathDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A `(domain, identifier)` pair addressing a slot in account storage
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Path {
    pub domain: PathDomain,
    pub identifier: String,
}

impl Path {
    pub fn new(domain: PathDomain, identifier: impl Into<String>) -> Self {
        Path {
            domain,
            identifier: identifier.into(),
        }
    }

    pub fn storage(identifier: impl Into<String>) -> Self {
        Path::new(PathDomain::Storage, identifier)
    }

    pub fn private(identifier: impl Into<String>) -> Self {
        Path::new(PathDomain::Private, identifier)
    }

    pub fn public(identifier: impl Into<String>) -> Self {
        Path::new(PathDomain::Public, identifier)
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "/{}/{}", self.domain, self.identifier)
    }
}
