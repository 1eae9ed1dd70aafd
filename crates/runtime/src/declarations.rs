//! Declaration registry
//!
//! Indexes a checked program's declarations by fully-qualified type
//! identifier so the evaluator can resolve composite construction,
//! member lookup, interface conformance, entitlements, and mappings in
//! constant time. Built once per interpreter from the program.

use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;
use tally_core::ast::{
    CompositeDeclaration, Declaration, FunctionDeclaration, InterfaceDeclaration, Program,
    TransactionDeclaration,
};
use tally_core::authorization::EntitlementMapping;
use tally_core::location::Location;
use tally_core::types::{CompositeType, InterfaceType, TypeDescriptor};

pub struct DeclarationRegistry {
    pub location: Location,
    composites: HashMap<String, Rc<CompositeDeclaration>>,
    interfaces: HashMap<String, Rc<InterfaceDeclaration>>,
    functions: HashMap<String, Rc<FunctionDeclaration>>,
    entitlements: BTreeSet<String>,
    mappings: HashMap<String, EntitlementMapping>,
    transactions: Vec<Rc<TransactionDeclaration>>,
    /// simple identifier -> fully-qualified identifier
    by_identifier: HashMap<String, String>,
}

impl DeclarationRegistry {
    pub fn from_program(program: &Program) -> Self {
        let location = program.location.clone();
        let mut registry = DeclarationRegistry {
            location: location.clone(),
            composites: HashMap::new(),
            interfaces: HashMap::new(),
            functions: HashMap::new(),
            entitlements: BTreeSet::new(),
            mappings: HashMap::new(),
            transactions: program.transactions.clone(),
            by_identifier: HashMap::new(),
        };
        for declaration in &program.declarations {
            match declaration {
                Declaration::Composite(composite) => {
                    let type_id = location.type_id(&composite.identifier);
                    registry
                        .by_identifier
                        .insert(composite.identifier.clone(), type_id.clone());
                    registry.composites.insert(type_id, composite.clone());
                }
                Declaration::Interface(interface) => {
                    let type_id = location.type_id(&interface.identifier);
                    registry
                        .by_identifier
                        .insert(interface.identifier.clone(), type_id.clone());
                    registry.interfaces.insert(type_id, interface.clone());
                }
                Declaration::Function(function) => {
                    registry
                        .functions
                        .insert(function.identifier.clone(), function.clone());
                }
                Declaration::Entitlement(entitlement) => {
                    registry
                        .entitlements
                        .insert(location.type_id(&entitlement.identifier));
                }
                Declaration::EntitlementMapping(mapping) => {
                    let type_id = location.type_id(&mapping.identifier);
                    registry.mappings.insert(
                        type_id.clone(),
                        EntitlementMapping::new(type_id, mapping.entries.clone()),
                    );
                }
            }
        }
        registry
    }

    pub fn composite(&self, type_id: &str) -> Option<&Rc<CompositeDeclaration>> {
        self.composites.get(type_id)
    }

    pub fn interface(&self, type_id: &str) -> Option<&Rc<InterfaceDeclaration>> {
        self.interfaces.get(type_id)
    }

    pub fn global_function(&self, name: &str) -> Option<&Rc<FunctionDeclaration>> {
        self.functions.get(name)
    }

    /// Resolve a simple identifier to a composite or interface type id
    pub fn type_id_of(&self, identifier: &str) -> Option<&str> {
        self.by_identifier.get(identifier).map(String::as_str)
    }

    pub fn transaction(&self, index: usize) -> Option<&Rc<TransactionDeclaration>> {
        self.transactions.get(index)
    }

    pub fn mapping(&self, type_id: &str) -> Option<&EntitlementMapping> {
        self.mappings.get(type_id)
    }

    /// Every declared entitlement, for fully-entitled references
    pub fn all_entitlements(&self) -> impl Iterator<Item = &String> {
        self.entitlements.iter()
    }

    /// The composite type for a registered declaration
    pub fn composite_type(&self, declaration: &CompositeDeclaration) -> CompositeType {
        CompositeType::new(
            self.location.clone(),
            declaration.identifier.clone(),
            declaration.kind,
        )
    }

    pub fn interface_type(&self, declaration: &InterfaceDeclaration) -> InterfaceType {
        InterfaceType::new(
            self.location.clone(),
            declaration.identifier.clone(),
            declaration.kind,
        )
    }

    /// The conformance list of a composite or interface, walked in
    /// *pre-order*: each interface is visited before its own parents,
    /// siblings in declared order, every interface at most once. This is
    /// the order destruction events and interface pre-conditions use:
    /// `A: I` gives `[I]`, `A: I, J` gives `[I, J]`, and `A: J` with
    /// `J: I` gives `[J, I]`.
    pub fn conformance_preorder(&self, conformances: &[String]) -> Vec<String> {
        let mut visited = BTreeSet::new();
        let mut order = Vec::new();
        self.collect_preorder(conformances, &mut visited, &mut order);
        order
    }

    fn collect_preorder(
        &self,
        conformances: &[String],
        visited: &mut BTreeSet<String>,
        order: &mut Vec<String>,
    ) {
        for type_id in conformances {
            if !visited.insert(type_id.clone()) {
                continue;
            }
            order.push(type_id.clone());
            if let Some(interface) = self.interfaces.get(type_id) {
                self.collect_preorder(&interface.conformances, visited, order);
            }
        }
    }

    /// Does the composite (by declaration) conform, transitively, to the
    /// interface?
    pub fn composite_conforms_to(
        &self,
        declaration: &CompositeDeclaration,
        interface_type_id: &str,
    ) -> bool {
        self.conformance_preorder(&declaration.conformances)
            .iter()
            .any(|id| id == interface_type_id)
    }

    /// Does one interface inherit (transitively) from another?
    pub fn interface_inherits(&self, sub_type_id: &str, super_type_id: &str) -> bool {
        if sub_type_id == super_type_id {
            return true;
        }
        match self.interfaces.get(sub_type_id) {
            Some(interface) => self
                .conformance_preorder(&interface.conformances)
                .iter()
                .any(|id| id == super_type_id),
            None => false,
        }
    }

    /// Find a member function on a composite declaration
    pub fn member_function<'a>(
        &self,
        declaration: &'a CompositeDeclaration,
        name: &str,
    ) -> Option<&'a Rc<FunctionDeclaration>> {
        declaration
            .functions
            .iter()
            .find(|function| function.identifier == name)
    }

    /// Find a member function with a body, looking at the composite
    /// first and then at conformed interfaces (interface defaults)
    pub fn resolve_member_function(
        &self,
        declaration: &CompositeDeclaration,
        name: &str,
    ) -> Option<Rc<FunctionDeclaration>> {
        if let Some(function) = self.member_function(declaration, name)
            && function.body.is_some()
        {
            return Some(function.clone());
        }
        for interface_id in self.conformance_preorder(&declaration.conformances) {
            if let Some(interface) = self.interfaces.get(&interface_id)
                && let Some(function) = interface
                    .functions
                    .iter()
                    .find(|f| f.identifier == name && f.body.is_some())
            {
                return Some(function.clone());
            }
        }
        None
    }

    /// The static type a descriptor resolves to for a simple identifier
    /// naming a composite or interface, if any
    pub fn descriptor_for_identifier(&self, identifier: &str) -> Option<TypeDescriptor> {
        let type_id = self.by_identifier.get(identifier)?;
        if let Some(composite) = self.composites.get(type_id) {
            return Some(TypeDescriptor::Composite(self.composite_type(composite)));
        }
        if let Some(interface) = self.interfaces.get(type_id) {
            return Some(TypeDescriptor::Interface(self.interface_type(interface)));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::location::Span;
    use tally_core::types::CompositeKind;

    fn interface(identifier: &str, conformances: Vec<String>) -> Declaration {
        Declaration::Interface(Rc::new(InterfaceDeclaration {
            kind: CompositeKind::Resource,
            identifier: identifier.to_string(),
            conformances,
            functions: vec![],
            destroy_event: None,
            span: Span::default(),
        }))
    }

    fn composite(identifier: &str, conformances: Vec<String>) -> Declaration {
        Declaration::Composite(Rc::new(CompositeDeclaration {
            kind: CompositeKind::Resource,
            identifier: identifier.to_string(),
            conformances,
            fields: vec![],
            initializer: None,
            functions: vec![],
            destroy_event: None,
            base_type: None,
            required_entitlements: vec![],
            span: Span::default(),
        }))
    }

    fn test_location() -> Location {
        Location::Script("test".to_string())
    }

    fn qualified(name: &str) -> String {
        test_location().type_id(name)
    }

    #[test]
    fn test_preorder_sibling_interfaces_in_declared_order() {
        let mut program = Program::new(test_location());
        program.declarations.push(interface("I", vec![]));
        program.declarations.push(interface("J", vec![]));
        program
            .declarations
            .push(composite("A", vec![qualified("I"), qualified("J")]));
        let registry = DeclarationRegistry::from_program(&program);

        let a = registry.composite(&qualified("A")).unwrap().clone();
        assert_eq!(
            registry.conformance_preorder(&a.conformances),
            vec![qualified("I"), qualified("J")]
        );
    }

    #[test]
    fn test_preorder_child_before_ancestor() {
        let mut program = Program::new(test_location());
        program.declarations.push(interface("I", vec![]));
        program
            .declarations
            .push(interface("J", vec![qualified("I")]));
        program.declarations.push(composite("A", vec![qualified("J")]));
        let registry = DeclarationRegistry::from_program(&program);

        let a = registry.composite(&qualified("A")).unwrap().clone();
        assert_eq!(
            registry.conformance_preorder(&a.conformances),
            vec![qualified("J"), qualified("I")]
        );
    }

    #[test]
    fn test_preorder_deduplicates_shared_ancestors() {
        let mut program = Program::new(test_location());
        program.declarations.push(interface("I", vec![]));
        program
            .declarations
            .push(interface("J", vec![qualified("I")]));
        program
            .declarations
            .push(interface("K", vec![qualified("I")]));
        program
            .declarations
            .push(composite("A", vec![qualified("J"), qualified("K")]));
        let registry = DeclarationRegistry::from_program(&program);

        let a = registry.composite(&qualified("A")).unwrap().clone();
        assert_eq!(
            registry.conformance_preorder(&a.conformances),
            vec![qualified("J"), qualified("I"), qualified("K")]
        );
    }

    #[test]
    fn test_transitive_conformance() {
        let mut program = Program::new(test_location());
        program.declarations.push(interface("I", vec![]));
        program
            .declarations
            .push(interface("J", vec![qualified("I")]));
        program.declarations.push(composite("A", vec![qualified("J")]));
        let registry = DeclarationRegistry::from_program(&program);

        let a = registry.composite(&qualified("A")).unwrap().clone();
        assert!(registry.composite_conforms_to(&a, &qualified("I")));
        assert!(registry.composite_conforms_to(&a, &qualified("J")));
        assert!(!registry.composite_conforms_to(&a, &qualified("A")));
        assert!(registry.interface_inherits(&qualified("J"), &qualified("I")));
        assert!(!registry.interface_inherits(&qualified("I"), &qualified("J")));
    }
}
