use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::operators::{OperatorCatalog, OperatorRef};

/// Detection status PIT reports for a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MutationState {
    NoCoverage,
    Killed,
    Survived,
    MemoryError,
    TimedOut,
    Unknown,
}

impl MutationState {
    pub const ALL: [MutationState; 6] = [
        MutationState::NoCoverage,
        MutationState::Killed,
        MutationState::Survived,
        MutationState::MemoryError,
        MutationState::TimedOut,
        MutationState::Unknown,
    ];

    /// Alive mutants were not eliminated by any test.
    pub fn is_alive(&self) -> bool {
        matches!(
            self,
            MutationState::NoCoverage | MutationState::Survived | MutationState::Unknown
        )
    }

    /// Parse a report status. Unrecognized values are `Unknown`, never an error.
    pub fn parse(status: &str) -> Self {
        match status {
            "NO_COVERAGE" => MutationState::NoCoverage,
            "KILLED" => MutationState::Killed,
            "SURVIVED" => MutationState::Survived,
            "MEMORY_ERROR" => MutationState::MemoryError,
            "TIMED_OUT" => MutationState::TimedOut,
            _ => MutationState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MutationState::NoCoverage => "NO_COVERAGE",
            MutationState::Killed => "KILLED",
            MutationState::Survived => "SURVIVED",
            MutationState::MemoryError => "MEMORY_ERROR",
            MutationState::TimedOut => "TIMED_OUT",
            MutationState::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for MutationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A required field was missing when finalizing a [`MutationRecordBuilder`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("{0} must be set")]
    MissingField(&'static str),
}

/// One injected mutation and its outcome, as read from a report.
///
/// Constructed only through [`MutationRecordBuilder::build`], which enforces:
/// `detected == !state.is_alive()`, `killing_test` non-empty iff detected,
/// and all identifying strings non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MutationRecord {
    detected: bool,
    state: MutationState,
    source_file: String,
    mutated_class: String,
    mutated_method: String,
    method_descriptor: String,
    line_number: u32,
    #[serde(serialize_with = "serialize_operator_id")]
    operator: OperatorRef,
    operator_suffix: String,
    operator_index: u32,
    killing_test: String,
    tests_executed: u32,
    description: Option<String>,
}

fn serialize_operator_id<S: serde::Serializer>(
    operator: &OperatorRef,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&operator.id)
}

impl MutationRecord {
    pub fn builder() -> MutationRecordBuilder {
        MutationRecordBuilder::default()
    }

    pub fn is_detected(&self) -> bool {
        self.detected
    }

    pub fn state(&self) -> MutationState {
        self.state
    }

    pub fn source_file(&self) -> &str {
        &self.source_file
    }

    pub fn mutated_class(&self) -> &str {
        &self.mutated_class
    }

    pub fn mutated_method(&self) -> &str {
        &self.mutated_method
    }

    pub fn method_descriptor(&self) -> &str {
        &self.method_descriptor
    }

    pub fn line_number(&self) -> u32 {
        self.line_number
    }

    pub fn operator(&self) -> &OperatorRef {
        &self.operator
    }

    /// Variant suffix PIT appended to the operator's class name, e.g.
    /// `EQUAL_ELSE`; empty when there is none.
    pub fn operator_suffix(&self) -> &str {
        &self.operator_suffix
    }

    pub fn operator_index(&self) -> u32 {
        self.operator_index
    }

    /// Empty unless the mutant was detected.
    pub fn killing_test(&self) -> &str {
        &self.killing_test
    }

    pub fn tests_executed(&self) -> u32 {
        self.tests_executed
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Decomposed killing test, if there is one.
    pub fn test_descriptor(&self) -> Option<TestDescriptor> {
        (!self.killing_test.trim().is_empty()).then(|| TestDescriptor::parse(&self.killing_test))
    }

    /// The top-level class containing the mutation (nested part after the
    /// first `$` removed).
    pub fn outer_class(&self) -> &str {
        match self.mutated_class.find('$') {
            Some(pos) => &self.mutated_class[..pos],
            None => &self.mutated_class,
        }
    }
}

impl fmt::Display for MutationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}.{}{} line {} [{}] {}",
            self.state,
            self.mutated_class,
            self.mutated_method,
            self.method_descriptor,
            self.line_number,
            self.operator.id,
            self.killing_test
        )
    }
}

/// Collects the fields of a [`MutationRecord`]; validation happens in [`build`](Self::build).
#[derive(Debug, Clone, Default)]
pub struct MutationRecordBuilder {
    state: Option<MutationState>,
    source_file: Option<String>,
    mutated_class: Option<String>,
    mutated_method: Option<String>,
    method_descriptor: Option<String>,
    line_number: u32,
    operator: Option<OperatorRef>,
    operator_suffix: String,
    operator_index: u32,
    killing_test: Option<String>,
    tests_executed: u32,
    description: Option<String>,
}

impl MutationRecordBuilder {
    pub fn state(mut self, state: MutationState) -> Self {
        self.state = Some(state);
        self
    }

    /// Set the state from its report spelling. Unknown spellings become `Unknown`.
    pub fn status(self, status: &str) -> Self {
        self.state(MutationState::parse(status))
    }

    pub fn source_file(mut self, source_file: impl Into<String>) -> Self {
        self.source_file = Some(source_file.into());
        self
    }

    pub fn mutated_class(mut self, class: impl Into<String>) -> Self {
        self.mutated_class = Some(class.into());
        self
    }

    pub fn mutated_method(mut self, method: impl Into<String>) -> Self {
        self.mutated_method = Some(method.into());
        self
    }

    pub fn method_descriptor(mut self, descriptor: impl Into<String>) -> Self {
        self.method_descriptor = Some(descriptor.into());
        self
    }

    pub fn line_number(mut self, line: u32) -> Self {
        self.line_number = line;
        self
    }

    /// Use an already resolved operator. Clears any suffix.
    pub fn operator(mut self, operator: OperatorRef) -> Self {
        self.operator = Some(operator);
        self.operator_suffix.clear();
        self
    }

    /// Resolve a report's mutator key through the catalog and derive the
    /// variant suffix from whatever follows the matched class name.
    pub fn mutator(mut self, catalog: &OperatorCatalog, key: &str) -> Self {
        let operator = catalog.find(key);
        if catalog.is_unknown(&operator) {
            tracing::warn!("Found unknown mutation operator: {key}");
        }
        self.operator_suffix = operator
            .matching_class(key)
            .map(|class| {
                let rest = &key[class.len()..];
                rest.strip_prefix('_').unwrap_or(rest).to_string()
            })
            .unwrap_or_default();
        self.operator = Some(operator);
        self
    }

    pub fn operator_index(mut self, index: u32) -> Self {
        self.operator_index = index;
        self
    }

    pub fn killing_test(mut self, test: impl Into<String>) -> Self {
        self.killing_test = Some(test.into());
        self
    }

    pub fn tests_executed(mut self, count: u32) -> Self {
        self.tests_executed = count;
        self
    }

    /// An empty description counts as none.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into()).filter(|d| !d.is_empty());
        self
    }

    /// Validate and produce the record.
    ///
    /// Alive mutants never carry a killing test, even if one was supplied.
    pub fn build(self) -> Result<MutationRecord, BuildError> {
        let state = self.state.ok_or(BuildError::MissingField("state"))?;
        let source_file = required(self.source_file, "sourceFile")?;
        let mutated_class = required(self.mutated_class, "mutatedClass")?;
        let mutated_method = required(self.mutated_method, "mutatedMethod")?;
        let method_descriptor = required(self.method_descriptor, "methodDescription")?;
        let operator = self.operator.ok_or(BuildError::MissingField("mutator"))?;

        let detected = !state.is_alive();
        let killing_test = if detected {
            required(self.killing_test, "killingTest")?
        } else {
            String::new()
        };

        Ok(MutationRecord {
            detected,
            state,
            source_file,
            mutated_class,
            mutated_method,
            method_descriptor,
            line_number: self.line_number,
            operator,
            operator_suffix: self.operator_suffix,
            operator_index: self.operator_index,
            killing_test,
            tests_executed: self.tests_executed,
            description: self.description,
        })
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, BuildError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(BuildError::MissingField(field)),
    }
}

/// A killing test identifier split into test class and method.
///
/// `pkg.FooTest$Nested.testBar(pkg.FooTest$Nested)` becomes class
/// `pkg.FooTest`, method `testBar`. Equality ignores the method so that kills
/// can be grouped per test class.
#[derive(Debug, Clone, Eq, Serialize)]
pub struct TestDescriptor {
    class_name: String,
    method_name: String,
    spec: String,
}

impl TestDescriptor {
    pub fn parse(spec: &str) -> Self {
        let parenthesis = spec.find('(');
        let method_separator = parenthesis.and_then(|p| spec[..p].rfind('.'));
        let nested_separator = spec[..parenthesis.unwrap_or(spec.len())].find('$');

        let class_end = nested_separator.or(method_separator).unwrap_or(spec.len());
        let method_name = match (method_separator, parenthesis) {
            (Some(sep), Some(paren)) => spec[sep + 1..paren].to_string(),
            _ => "unknown".to_string(),
        };

        Self {
            class_name: spec[..class_end].to_string(),
            method_name,
            spec: spec.to_string(),
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    pub fn spec(&self) -> &str {
        &self.spec
    }
}

impl PartialEq for TestDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.class_name == other.class_name
    }
}

impl Hash for TestDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.class_name.hash(state);
    }
}

impl fmt::Display for TestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TestDescriptor{{class='{}', method='{}'}}",
            self.class_name, self.method_name
        )
    }
}

/// A source file that mutation records map to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Resource(pub PathBuf);

impl Resource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// A rule violation found on a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub rule_id: String,
    pub resource: Resource,
    /// `None` for resource-level issues such as the coverage threshold.
    pub line: Option<u32>,
    pub message: String,
    /// Remediation effort ("gap").
    pub effort: f64,
}
