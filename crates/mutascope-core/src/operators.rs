use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Operator definitions compiled into the binary.
const BUILTIN_OPERATORS: &str = include_str!("operators.toml");

/// Shared handle to a catalog entry. Records hold one of these instead of a copy.
pub type OperatorRef = Arc<MutationOperator>;

/// A PIT mutation operator, e.g. `NEGATE_CONDITIONALS`.
///
/// Two operators are equal when their ids are equal; the remaining fields are
/// descriptive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationOperator {
    pub id: String,
    pub name: String,
    /// Fully qualified implementation names. PIT has renamed some operators
    /// across releases, so more than one name can denote the same operator.
    pub classes: Vec<String>,
    pub violation_description: String,
    #[serde(default)]
    pub detail: Option<String>,
}

impl MutationOperator {
    /// The sentinel used when a report names an operator the catalog does not know.
    pub fn unknown() -> Self {
        Self {
            id: "UNKNOWN".to_string(),
            name: "Unknown mutagen".to_string(),
            classes: vec!["unknown.mutation.operator".to_string()],
            violation_description: "An unknown mutagen has been applied".to_string(),
            detail: None,
        }
    }

    pub fn is_experimental(&self) -> bool {
        self.id.starts_with("EXPERIMENTAL")
    }

    /// The implementation name `key` starts with, if any.
    pub fn matching_class(&self, key: &str) -> Option<&str> {
        self.classes
            .iter()
            .map(String::as_str)
            .find(|class| key.starts_with(class))
    }
}

impl PartialEq for MutationOperator {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MutationOperator {}

impl Hash for MutationOperator {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for MutationOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to parse operator definitions: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("operator '{0}' is defined more than once")]
    DuplicateId(String),
    #[error("operator '{0}' declares no implementation class")]
    NoClasses(String),
}

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default)]
    operator: Vec<MutationOperator>,
}

/// Read-only registry of known mutation operators.
///
/// Built once at startup and passed by reference to whatever needs operator
/// identity (the report parser, rule generation). Lookup order is the order
/// of the definition table, so resolution is deterministic.
#[derive(Debug, Clone)]
pub struct OperatorCatalog {
    operators: Vec<OperatorRef>,
    by_id: HashMap<String, OperatorRef>,
    unknown: OperatorRef,
}

impl OperatorCatalog {
    /// The catalog shipped with mutascope.
    pub fn builtin() -> Self {
        // Covered by tests; the table is part of the binary.
        Self::from_toml(BUILTIN_OPERATORS).expect("embedded operator catalog should be valid")
    }

    /// Build a catalog from a TOML table of `[[operator]]` entries.
    pub fn from_toml(content: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(content)?;
        let mut operators = Vec::with_capacity(file.operator.len());
        let mut by_id = HashMap::with_capacity(file.operator.len());

        for operator in file.operator {
            if operator.classes.is_empty() {
                return Err(CatalogError::NoClasses(operator.id));
            }
            let operator = Arc::new(MutationOperator {
                violation_description: operator.violation_description.trim().to_string(),
                ..operator
            });
            if by_id
                .insert(operator.id.clone(), Arc::clone(&operator))
                .is_some()
            {
                return Err(CatalogError::DuplicateId(operator.id.clone()));
            }
            operators.push(operator);
        }

        Ok(Self {
            operators,
            by_id,
            unknown: Arc::new(MutationOperator::unknown()),
        })
    }

    /// Resolve a report's mutator key.
    ///
    /// The key is tried as an operator id, then as an exact implementation
    /// name, then as an implementation name followed by a variant suffix.
    /// Keys that match nothing resolve to [`OperatorCatalog::unknown`].
    pub fn find(&self, key: &str) -> OperatorRef {
        if let Some(operator) = self.by_id.get(key) {
            return Arc::clone(operator);
        }
        if let Some(operator) = self
            .operators
            .iter()
            .find(|op| op.classes.iter().any(|class| class == key))
        {
            return Arc::clone(operator);
        }
        if let Some(operator) = self
            .operators
            .iter()
            .find(|op| op.matching_class(key).is_some())
        {
            return Arc::clone(operator);
        }
        Arc::clone(&self.unknown)
    }

    pub fn get(&self, id: &str) -> Option<&OperatorRef> {
        self.by_id.get(id)
    }

    pub fn unknown(&self) -> &OperatorRef {
        &self.unknown
    }

    pub fn is_unknown(&self, operator: &MutationOperator) -> bool {
        *operator == *self.unknown
    }

    /// All operators in definition order.
    pub fn all_operators(&self) -> &[OperatorRef] {
        &self.operators
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }
}

impl Default for OperatorCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARGUMENT_PROPAGATION_CLASS: &str =
        "org.pitest.mutationtest.engine.gregor.mutators.ArgumentPropagationMutator";

    #[test]
    fn test_builtin_catalog_loads() {
        let catalog = OperatorCatalog::builtin();
        assert_eq!(catalog.len(), 25);
        assert!(catalog
            .all_operators()
            .iter()
            .all(|op| !op.violation_description.is_empty()));
    }

    #[test]
    fn test_find_by_id() {
        let catalog = OperatorCatalog::builtin();
        let op = catalog.find("ARGUMENT_PROPAGATION");
        assert_eq!(op.id, "ARGUMENT_PROPAGATION");
        assert_eq!(op.classes[0], ARGUMENT_PROPAGATION_CLASS);
    }

    #[test]
    fn test_find_by_class_name_and_suffix_resolve_to_same_operator() {
        let catalog = OperatorCatalog::builtin();
        let by_id = catalog.find("ARGUMENT_PROPAGATION");
        let by_class = catalog.find(ARGUMENT_PROPAGATION_CLASS);
        let by_suffix = catalog.find(&format!("{ARGUMENT_PROPAGATION_CLASS}_WITH_SUFFIX"));
        assert_eq!(by_id, by_class);
        assert_eq!(by_class, by_suffix);
    }

    #[test]
    fn test_find_alias() {
        let catalog = OperatorCatalog::builtin();
        let old = catalog
            .find("org.pitest.mutationtest.engine.gregor.mutators.experimental.RemoveSwitchMutator");
        let new = catalog.find("org.pitest.mutationtest.engine.gregor.mutators.RemoveSwitchMutator_3");
        assert_eq!(old.id, "REMOVE_SWITCH");
        assert_eq!(new.id, "REMOVE_SWITCH");
    }

    #[test]
    fn test_find_unknown_returns_sentinel() {
        let catalog = OperatorCatalog::builtin();
        let op = catalog.find("xyzabc");
        assert_eq!(op.id, "UNKNOWN");
        assert!(catalog.is_unknown(&op));
    }

    #[test]
    fn test_find_is_case_sensitive() {
        let catalog = OperatorCatalog::builtin();
        assert!(catalog.is_unknown(&catalog.find("argument_propagation")));
    }

    #[test]
    fn test_equality_is_by_id() {
        let mut a = MutationOperator::unknown();
        let b = MutationOperator::unknown();
        a.name = "renamed".to_string();
        assert_eq!(a, b);
    }

    #[test]
    fn test_experimental_flag() {
        let catalog = OperatorCatalog::builtin();
        assert!(catalog.find("EXPERIMENTAL_SWITCH").is_experimental());
        assert!(!catalog.find("MATH").is_experimental());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let toml_str = r#"
[[operator]]
id = "A"
name = "A"
classes = ["x.A"]
violation_description = "a"

[[operator]]
id = "A"
name = "A again"
classes = ["x.A2"]
violation_description = "a"
"#;
        assert!(matches!(
            OperatorCatalog::from_toml(toml_str),
            Err(CatalogError::DuplicateId(id)) if id == "A"
        ));
    }

    #[test]
    fn test_operator_without_classes_rejected() {
        let toml_str = r#"
[[operator]]
id = "A"
name = "A"
classes = []
violation_description = "a"
"#;
        assert!(matches!(
            OperatorCatalog::from_toml(toml_str),
            Err(CatalogError::NoClasses(_))
        ));
    }

    #[test]
    fn test_first_prefix_match_in_definition_order_wins() {
        let toml_str = r#"
[[operator]]
id = "FIRST"
name = "First"
classes = ["x.Mutator"]
violation_description = "first"

[[operator]]
id = "SECOND"
name = "Second"
classes = ["x.MutatorExtended"]
violation_description = "second"
"#;
        let catalog = OperatorCatalog::from_toml(toml_str).unwrap();
        // exact match beats an earlier prefix match
        assert_eq!(catalog.find("x.MutatorExtended").id, "SECOND");
        assert_eq!(catalog.find("x.MutatorExtended_V").id, "FIRST");
    }
}
