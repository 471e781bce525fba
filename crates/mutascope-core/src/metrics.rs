use std::collections::BTreeMap;

use serde::Serialize;

use crate::resolver::ResourceResolver;
use crate::types::{MutationRecord, MutationState, Resource};

/// Mutation counters of one resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MutationCounts {
    pub total: u32,
    pub no_coverage: u32,
    pub killed: u32,
    pub survived: u32,
    pub memory_error: u32,
    pub timed_out: u32,
    pub unknown: u32,
    pub detected: u32,
    /// Saturates at `u32::MAX`.
    pub tests_executed: u32,
}

impl MutationCounts {
    pub fn add(&mut self, record: &MutationRecord) {
        self.total += 1;
        match record.state() {
            MutationState::NoCoverage => self.no_coverage += 1,
            MutationState::Killed => self.killed += 1,
            MutationState::Survived => self.survived += 1,
            MutationState::MemoryError => self.memory_error += 1,
            MutationState::TimedOut => self.timed_out += 1,
            MutationState::Unknown => self.unknown += 1,
        }
        if record.is_detected() {
            self.detected += 1;
        }
        self.tests_executed = self.tests_executed.saturating_add(record.tests_executed());
    }

    /// Mutants no test eliminated.
    pub fn alive(&self) -> u32 {
        self.no_coverage + self.survived + self.unknown
    }

    /// `100 * killed / total`, 0 without mutants.
    pub fn coverage_percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            100.0 * f64::from(self.killed) / f64::from(self.total)
        }
    }
}

impl std::ops::AddAssign for MutationCounts {
    fn add_assign(&mut self, other: Self) {
        self.total += other.total;
        self.no_coverage += other.no_coverage;
        self.killed += other.killed;
        self.survived += other.survived;
        self.memory_error += other.memory_error;
        self.timed_out += other.timed_out;
        self.unknown += other.unknown;
        self.detected += other.detected;
        self.tests_executed = self.tests_executed.saturating_add(other.tests_executed);
    }
}

/// Running statistics of the mutants of one source file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceMutationMetrics {
    resource: Resource,
    counts: MutationCounts,
    coverage_percent: f64,
    #[serde(skip)]
    records: Vec<MutationRecord>,
}

impl ResourceMutationMetrics {
    pub fn new(resource: Resource) -> Self {
        Self {
            resource,
            counts: MutationCounts::default(),
            coverage_percent: 0.0,
            records: Vec::new(),
        }
    }

    pub fn add_record(&mut self, record: MutationRecord) {
        self.counts.add(&record);
        self.coverage_percent = self.counts.coverage_percent();
        self.records.push(record);
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn counts(&self) -> &MutationCounts {
        &self.counts
    }

    pub fn total(&self) -> u32 {
        self.counts.total
    }

    pub fn killed(&self) -> u32 {
        self.counts.killed
    }

    pub fn survived(&self) -> u32 {
        self.counts.survived
    }

    pub fn no_coverage(&self) -> u32 {
        self.counts.no_coverage
    }

    pub fn coverage_percent(&self) -> f64 {
        self.coverage_percent
    }

    /// Contributing records in the order they were added.
    pub fn records(&self) -> &[MutationRecord] {
        &self.records
    }
}

/// Group records by the resource their outer class resolves to.
///
/// Records whose class resolves to no resource are dropped with a debug log.
pub fn aggregate<I>(
    records: I,
    resolver: &dyn ResourceResolver,
) -> BTreeMap<Resource, ResourceMutationMetrics>
where
    I: IntoIterator<Item = MutationRecord>,
{
    let mut metrics: BTreeMap<Resource, ResourceMutationMetrics> = BTreeMap::new();
    let mut unresolved = 0usize;

    for record in records {
        match resolver.resolve(record.outer_class()) {
            Some(resource) => metrics
                .entry(resource.clone())
                .or_insert_with(|| ResourceMutationMetrics::new(resource))
                .add_record(record),
            None => unresolved += 1,
        }
    }

    if unresolved > 0 {
        tracing::debug!("{unresolved} mutants could not be mapped to a source file");
    }
    metrics
}
