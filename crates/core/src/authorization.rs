//! Entitlement sets and the authorization algebra
//!
//! References carry an authorization: either `Unauthorized` or a set of
//! entitlement type identifiers joined by a conjunction (`E, F`) or a
//! disjunction (`E | F`) sigil. Subtyping over authorizations is a
//! semilattice: dropping entitlements is always allowed, conjunctions
//! widen into disjunctions they intersect, and disjunctions shrink only
//! into subsets.
//!
//! Entitlement mappings translate the entitlements of an access path into
//! the entitlements of the reference produced by that access.

use std::collections::BTreeSet;

/// How the kinds of an entitlement set are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sigil {
    /// All listed entitlements are held (`auth(E, F)`)
    Conjunction,
    /// At least one of the listed entitlements is held (`auth(E | F)`)
    Disjunction,
}

/// A non-empty set of entitlement type identifiers plus a sigil
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntitlementSet {
    /// Fully-qualified entitlement type identifiers, kept sorted for
    /// canonical equality
    pub kinds: BTreeSet<String>,
    pub sigil: Sigil,
}

impl EntitlementSet {
    pub fn conjunction(kinds: impl IntoIterator<Item = String>) -> Self {
        EntitlementSet {
            kinds: kinds.into_iter().collect(),
            sigil: Sigil::Conjunction,
        }
    }

    pub fn disjunction(kinds: impl IntoIterator<Item = String>) -> Self {
        EntitlementSet {
            kinds: kinds.into_iter().collect(),
            sigil: Sigil::Disjunction,
        }
    }
}

/// The authorization carried by a reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Authorization {
    /// No entitlements
    Unauthorized,
    /// A non-empty entitlement set
    Entitlements(EntitlementSet),
}

impl Authorization {
    /// Conjunction authorization over the given kinds; `Unauthorized`
    /// when the set is empty.
    pub fn conjunction(kinds: impl IntoIterator<Item = String>) -> Self {
        let set = EntitlementSet::conjunction(kinds);
        if set.kinds.is_empty() {
            Authorization::Unauthorized
        } else {
            Authorization::Entitlements(set)
        }
    }

    pub fn is_authorized(&self) -> bool {
        matches!(self, Authorization::Entitlements(_))
    }

    /// Authorization subtyping: may a reference holding `self` be used
    /// where `other` is required?
    ///
    /// - anything ≤ `Unauthorized` (dropping entitlements is permitted)
    /// - `(K1, ∧) ≤ (K2, ∧)` iff `K1 ⊇ K2`
    /// - `(K1, ∧) ≤ (K2, ∨)` iff `K1 ∩ K2 ≠ ∅`
    /// - `(K1, ∨) ≤ (K2, ∧)` iff `|K2| ≤ 1` and `K1 ⊆ K2`
    /// - `(K1, ∨) ≤ (K2, ∨)` iff `K1 ⊆ K2`
    pub fn is_subtype_of(&self, other: &Authorization) -> bool {
        match (self, other) {
            (_, Authorization::Unauthorized) => true,
            (Authorization::Unauthorized, Authorization::Entitlements(_)) => false,
            (Authorization::Entitlements(a), Authorization::Entitlements(b)) => {
                match (a.sigil, b.sigil) {
                    (Sigil::Conjunction, Sigil::Conjunction) => a.kinds.is_superset(&b.kinds),
                    (Sigil::Conjunction, Sigil::Disjunction) => {
                        a.kinds.intersection(&b.kinds).next().is_some()
                    }
                    (Sigil::Disjunction, Sigil::Conjunction) => {
                        b.kinds.len() <= 1 && a.kinds.is_subset(&b.kinds)
                    }
                    (Sigil::Disjunction, Sigil::Disjunction) => a.kinds.is_subset(&b.kinds),
                }
            }
        }
    }
}

impl std::fmt::Display for Authorization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Authorization::Unauthorized => Ok(()),
            Authorization::Entitlements(set) => {
                let separator = match set.sigil {
                    Sigil::Conjunction => ", ",
                    Sigil::Disjunction => " | ",
                };
                let kinds: Vec<&str> = set.kinds.iter().map(String::as_str).collect();
                write!(f, "auth({})", kinds.join(separator))
            }
        }
    }
}

/// A declared entitlement mapping: input entitlement -> output entitlement
///
/// A single input may map to several outputs; the image of an access is
/// the union of the outputs of every held input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitlementMapping {
    /// Fully-qualified identifier of the mapping declaration
    pub type_id: String,
    /// `(input, output)` pairs in declaration order
    pub entries: Vec<(String, String)>,
}

impl EntitlementMapping {
    pub fn new(type_id: impl Into<String>, entries: Vec<(String, String)>) -> Self {
        EntitlementMapping {
            type_id: type_id.into(),
            entries,
        }
    }

    /// The set of input entitlements the mapping understands
    pub fn domain(&self) -> BTreeSet<&str> {
        self.entries.iter().map(|(input, _)| input.as_str()).collect()
    }

    /// Map an access authorization through the mapping.
    ///
    /// For a conjunction set the image is `⋃ { M(e) : e ∈ kinds }` as a
    /// conjunction. Disjunction sets pass their kinds through entry by
    /// entry, preserving the disjunction sigil. `Unauthorized` maps to
    /// `Unauthorized`.
    pub fn image(&self, authorization: &Authorization) -> Authorization {
        let set = match authorization {
            Authorization::Unauthorized => return Authorization::Unauthorized,
            Authorization::Entitlements(set) => set,
        };
        let outputs: BTreeSet<String> = self
            .entries
            .iter()
            .filter(|(input, _)| set.kinds.contains(input))
            .map(|(_, output)| output.clone())
            .collect();
        if outputs.is_empty() {
            return Authorization::Unauthorized;
        }
        Authorization::Entitlements(EntitlementSet {
            kinds: outputs,
            sigil: set.sigil,
        })
    }

    /// The mapping's codomain restricted to the entitlements the stored
    /// value actually carries, as a conjunction. Used for accesses on
    /// owned values, where the holder is entitled to everything the
    /// mapping can produce that the value was initialized with.
    pub fn codomain_for(&self, held: &BTreeSet<String>) -> Authorization {
        let outputs: BTreeSet<String> = self
            .entries
            .iter()
            .filter(|(_, output)| held.contains(output))
            .map(|(_, output)| output.clone())
            .collect();
        if outputs.is_empty() {
            Authorization::Unauthorized
        } else {
            Authorization::Entitlements(EntitlementSet {
                kinds: outputs,
                sigil: Sigil::Conjunction,
            })
        }
    }
}
