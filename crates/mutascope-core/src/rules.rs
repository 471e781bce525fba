use std::fmt;

use serde::{Deserialize, Serialize};

use crate::metrics::ResourceMutationMetrics;
use crate::operators::{MutationOperator, OperatorCatalog};
use crate::types::{Issue, MutationRecord, MutationState};

pub const RULE_SURVIVED: &str = "mutant.survived";
pub const RULE_UNCOVERED: &str = "mutant.uncovered";
pub const RULE_UNKNOWN_STATUS: &str = "mutant.unknownStatus";
pub const RULE_COVERAGE: &str = "mutant.coverage";
pub const OPERATOR_RULE_PREFIX: &str = "mutant.";
pub const CODE_SMELL_SUFFIX: &str = "_CODE_SMELL";

pub const DEFAULT_COVERAGE_THRESHOLD: f64 = 80.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleType {
    Bug,
    CodeSmell,
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleType::Bug => write!(f, "BUG"),
            RuleType::CodeSmell => write!(f, "CODE_SMELL"),
        }
    }
}

/// What a rule checks.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleKind {
    /// One issue per record in the given state.
    State { state: MutationState },
    /// One issue per alive record produced by the operator.
    Operator { operator_id: String },
    /// One issue per resource whose coverage is below `threshold` percent.
    CoverageThreshold { threshold: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleDefinition {
    pub key: String,
    pub name: String,
    pub kind: RuleKind,
    pub rule_type: RuleType,
    /// Rules of experimental operators.
    pub beta: bool,
    pub activated_by_default: bool,
}

impl RuleDefinition {
    fn state(key: &str, name: &str, state: MutationState, activated_by_default: bool) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            kind: RuleKind::State { state },
            rule_type: RuleType::Bug,
            beta: false,
            activated_by_default,
        }
    }

    pub fn coverage(threshold: f64) -> Self {
        Self {
            key: RULE_COVERAGE.to_string(),
            name: "Insufficient mutation coverage".to_string(),
            kind: RuleKind::CoverageThreshold { threshold },
            rule_type: RuleType::Bug,
            beta: false,
            activated_by_default: true,
        }
    }

    /// `mutant.<ID>` for bugs, `mutant.<ID>_CODE_SMELL` for code smells.
    pub fn operator(operator: &MutationOperator, rule_type: RuleType) -> Self {
        let (key, name) = match rule_type {
            RuleType::Bug => (
                format!("{OPERATOR_RULE_PREFIX}{}", operator.id),
                operator.name.clone(),
            ),
            RuleType::CodeSmell => (
                format!("{OPERATOR_RULE_PREFIX}{}{CODE_SMELL_SUFFIX}", operator.id),
                format!("{} (Code Smell)", operator.name),
            ),
        };
        let beta = operator.is_experimental();
        Self {
            key,
            name,
            kind: RuleKind::Operator {
                operator_id: operator.id.clone(),
            },
            rule_type,
            beta,
            activated_by_default: !beta && rule_type == RuleType::Bug,
        }
    }

    /// Whether this per-record rule fires for `record`. Never true for the
    /// threshold rule.
    pub fn matches(&self, record: &MutationRecord) -> bool {
        match &self.kind {
            RuleKind::State { state } => record.state() == *state,
            RuleKind::Operator { operator_id } => {
                record.operator().id == *operator_id && record.state().is_alive()
            }
            RuleKind::CoverageThreshold { .. } => false,
        }
    }
}

/// An ordered set of rules. Evaluation follows this order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RuleSet {
    rules: Vec<RuleDefinition>,
}

impl RuleSet {
    pub fn new(rules: Vec<RuleDefinition>) -> Self {
        Self { rules }
    }

    /// The state rules, the coverage rule, and a bug and a code smell rule
    /// for every operator of `catalog`.
    pub fn standard(catalog: &OperatorCatalog, coverage_threshold: f64) -> Self {
        let mut rules = vec![
            RuleDefinition::state(
                RULE_SURVIVED,
                "Survived mutant",
                MutationState::Survived,
                true,
            ),
            RuleDefinition::state(
                RULE_UNCOVERED,
                "Uncovered mutant",
                MutationState::NoCoverage,
                true,
            ),
            RuleDefinition::state(
                RULE_UNKNOWN_STATUS,
                "Mutant with unknown status",
                MutationState::Unknown,
                false,
            ),
            RuleDefinition::coverage(coverage_threshold),
        ];
        for operator in catalog.all_operators() {
            rules.push(RuleDefinition::operator(operator, RuleType::Bug));
            rules.push(RuleDefinition::operator(operator, RuleType::CodeSmell));
        }
        Self { rules }
    }

    /// Rules activated by default, in order.
    pub fn default_active(&self) -> Self {
        Self::new(
            self.rules
                .iter()
                .filter(|r| r.activated_by_default)
                .cloned()
                .collect(),
        )
    }

    /// The rules named by `keys`, in rule set order. Unknown keys are logged
    /// and ignored.
    pub fn select<S: AsRef<str>>(&self, keys: &[S]) -> Self {
        for key in keys {
            if self.get(key.as_ref()).is_none() {
                tracing::warn!("Ignoring unknown rule '{}'", key.as_ref());
            }
        }
        Self::new(
            self.rules
                .iter()
                .filter(|r| keys.iter().any(|k| k.as_ref() == r.key))
                .cloned()
                .collect(),
        )
    }

    pub fn get(&self, key: &str) -> Option<&RuleDefinition> {
        self.rules.iter().find(|r| r.key == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RuleDefinition> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Multipliers applied to the effort of each issue.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffortFactors {
    /// Effort of one issue on an alive mutant.
    pub survived_mutant: f64,
    /// Effort per mutant missing to reach the coverage threshold.
    pub missing_coverage: f64,
}

impl Default for EffortFactors {
    fn default() -> Self {
        Self {
            survived_mutant: 1.0,
            missing_coverage: 1.0,
        }
    }
}

/// Outcome of a rule evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// The engine had no rules to apply; nothing was evaluated.
    NoActiveRules,
    Issues(Vec<Issue>),
}

impl Evaluation {
    pub fn issues(&self) -> &[Issue] {
        match self {
            Evaluation::NoActiveRules => &[],
            Evaluation::Issues(issues) => issues,
        }
    }

    pub fn into_issues(self) -> Vec<Issue> {
        match self {
            Evaluation::NoActiveRules => Vec::new(),
            Evaluation::Issues(issues) => issues,
        }
    }
}

/// Applies active rules to aggregated metrics.
#[derive(Debug, Clone)]
pub struct ViolationEngine {
    rules: RuleSet,
    factors: EffortFactors,
}

impl ViolationEngine {
    pub fn new(rules: RuleSet, factors: EffortFactors) -> Self {
        Self { rules, factors }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Issues of every resource, resource by resource and rule by rule.
    pub fn evaluate<'a, I>(&self, metrics: I) -> Evaluation
    where
        I: IntoIterator<Item = &'a ResourceMutationMetrics>,
    {
        if self.rules.is_empty() {
            tracing::warn!("At least one mutation analysis rule needs to be active");
            return Evaluation::NoActiveRules;
        }

        let mut issues = Vec::new();
        for resource_metrics in metrics {
            for rule in self.rules.iter() {
                self.apply_rule(rule, resource_metrics, &mut issues);
            }
        }
        tracing::debug!("Rule evaluation produced {} issues", issues.len());
        Evaluation::Issues(issues)
    }

    fn apply_rule(
        &self,
        rule: &RuleDefinition,
        metrics: &ResourceMutationMetrics,
        issues: &mut Vec<Issue>,
    ) {
        match &rule.kind {
            RuleKind::CoverageThreshold { threshold } => {
                if let Some(issue) = self.threshold_issue(rule, *threshold, metrics) {
                    issues.push(issue);
                }
            }
            RuleKind::State { .. } | RuleKind::Operator { .. } => {
                issues.extend(
                    metrics
                        .records()
                        .iter()
                        .filter(|record| rule.matches(record))
                        .map(|record| Issue {
                            rule_id: rule.key.clone(),
                            resource: metrics.resource().clone(),
                            line: Some(record.line_number()),
                            message: violation_message(record),
                            effort: self.factors.survived_mutant,
                        }),
                );
            }
        }
    }

    fn threshold_issue(
        &self,
        rule: &RuleDefinition,
        threshold: f64,
        metrics: &ResourceMutationMetrics,
    ) -> Option<Issue> {
        let actual = metrics.coverage_percent();
        if metrics.total() == 0 || actual >= threshold {
            return None;
        }

        let gap = mutants_to_kill(metrics.total(), metrics.killed(), threshold);
        Some(Issue {
            rule_id: rule.key.clone(),
            resource: metrics.resource().clone(),
            line: None,
            message: format!(
                "{gap:.0} more mutants need to be killed to get the mutation coverage from {actual:.1}% to {threshold:.1}%"
            ),
            effort: self.factors.missing_coverage * gap,
        })
    }
}

/// Additional kills needed to reach `threshold` percent, rounded up.
///
/// Computed from the unrounded required kill count, so the result is not
/// guaranteed to lift coverage to the threshold in every case.
pub fn mutants_to_kill(total: u32, killed: u32, threshold: f64) -> f64 {
    let required = f64::from(total) * threshold / 100.0;
    (required - f64::from(killed)).ceil()
}

/// The operator's description, then the mutation description and the
/// operator variant when the record has them.
pub fn violation_message(record: &MutationRecord) -> String {
    let mut message = record.operator().violation_description.clone();
    if let Some(description) = record.description() {
        message.push_str(" Mutation: ");
        message.push_str(description);
    }
    if !record.operator_suffix().is_empty() {
        message.push_str(" (");
        message.push_str(record.operator_suffix());
        message.push(')');
    }
    message
}
