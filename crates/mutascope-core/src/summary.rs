use std::collections::HashMap;

use serde::Serialize;

use crate::metrics::{MutationCounts, ResourceMutationMetrics};
use crate::types::{MutationRecord, TestDescriptor};

/// Mutants killed by the tests of one test class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestKills {
    pub test_class: String,
    pub kills: u32,
    /// Share of all mutants of the project killed by this class, in percent.
    pub kill_ratio: f64,
}

/// Project-level measures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MutationSummary {
    /// Counters summed over the analyzed module's resources.
    pub counts: MutationCounts,
    /// Mutants of the whole build when global collection ran, else of the module.
    pub total: u32,
    pub alive: u32,
    /// `100 * detected / total`; 100 without mutants.
    pub mutation_coverage: f64,
    /// `100 * detected / (survived + detected)`; ignores uncovered mutants.
    pub test_strength: f64,
    /// Empty unless experimental features are on.
    pub test_kills: Vec<TestKills>,
}

impl MutationSummary {
    pub fn compute<'a, I>(metrics: I, global: &[MutationRecord], experimental: bool) -> Self
    where
        I: IntoIterator<Item = &'a ResourceMutationMetrics>,
    {
        let mut counts = MutationCounts::default();
        let mut local_records = Vec::new();
        for resource in metrics {
            counts += *resource.counts();
            local_records.extend(resource.records());
        }

        let (total, alive) = if global.is_empty() {
            (counts.total, counts.alive())
        } else {
            let alive = global.iter().filter(|r| r.state().is_alive()).count();
            (saturating_count(global.len()), saturating_count(alive))
        };

        let test_kills = if experimental {
            if global.is_empty() {
                test_kills(local_records, total)
            } else {
                test_kills(global.iter(), total)
            }
        } else {
            Vec::new()
        };

        Self {
            counts,
            total,
            alive,
            mutation_coverage: percent(counts.detected, counts.total).unwrap_or(100.0),
            test_strength: percent(counts.detected, counts.survived + counts.detected)
                .unwrap_or(0.0),
            test_kills,
        }
    }
}

fn percent(part: u32, whole: u32) -> Option<f64> {
    (whole > 0).then(|| 100.0 * f64::from(part) / f64::from(whole))
}

/// Kills per test class, most kills first.
fn saturating_count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

fn test_kills<'a>(records: impl IntoIterator<Item = &'a MutationRecord>, total: u32) -> Vec<TestKills> {
    let mut kills: HashMap<TestDescriptor, u32> = HashMap::new();
    for descriptor in records.into_iter().filter_map(MutationRecord::test_descriptor) {
        *kills.entry(descriptor).or_default() += 1;
    }

    let mut result: Vec<TestKills> = kills
        .into_iter()
        .map(|(descriptor, kills)| TestKills {
            test_class: descriptor.class_name().to_string(),
            kills,
            kill_ratio: percent(kills, total).unwrap_or(0.0),
        })
        .collect();
    result.sort_by(|a, b| b.kills.cmp(&a.kills).then_with(|| a.test_class.cmp(&b.test_class)));
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::OperatorCatalog;
    use crate::types::{MutationState, Resource};

    fn record(catalog: &OperatorCatalog, state: MutationState, test: &str) -> MutationRecord {
        let builder = MutationRecord::builder()
            .state(state)
            .source_file("A.java")
            .mutated_class("a.A")
            .mutated_method("m")
            .method_descriptor("()V")
            .mutator(catalog, "MATH");
        if state.is_alive() {
            builder.build().unwrap()
        } else {
            builder.killing_test(test).build().unwrap()
        }
    }

    fn metrics(records: Vec<MutationRecord>) -> ResourceMutationMetrics {
        let mut metrics = ResourceMutationMetrics::new(Resource::new("A.java"));
        for record in records {
            metrics.add_record(record);
        }
        metrics
    }

    #[test]
    fn test_summary_of_module() {
        let catalog = OperatorCatalog::builtin();
        let m = metrics(vec![
            record(&catalog, MutationState::Killed, "a.ATest.t1(a.ATest)"),
            record(&catalog, MutationState::TimedOut, "a.ATest.t2(a.ATest)"),
            record(&catalog, MutationState::Survived, ""),
            record(&catalog, MutationState::NoCoverage, ""),
        ]);
        let summary = MutationSummary::compute([&m], &[], false);

        assert_eq!(summary.total, 4);
        assert_eq!(summary.alive, 2);
        assert!((summary.mutation_coverage - 50.0).abs() < 1e-9);
        assert!((summary.test_strength - 200.0 / 3.0).abs() < 1e-9);
        assert!(summary.test_kills.is_empty());
    }

    #[test]
    fn test_counts_beyond_u32_saturate() {
        assert_eq!(saturating_count(7), 7);
        assert_eq!(saturating_count(u32::MAX as usize), u32::MAX);
        assert_eq!(saturating_count(usize::MAX), u32::MAX);
    }

    #[test]
    fn test_summary_without_mutants() {
        let summary = MutationSummary::compute(std::iter::empty(), &[], true);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.mutation_coverage, 100.0);
        assert_eq!(summary.test_strength, 0.0);
        assert!(summary.test_kills.is_empty());
    }

    #[test]
    fn test_global_totals_and_test_kills() {
        let catalog = OperatorCatalog::builtin();
        let m = metrics(vec![record(&catalog, MutationState::Killed, "a.ATest.t1(a.ATest)")]);
        let global = vec![
            record(&catalog, MutationState::Killed, "a.ATest.t1(a.ATest)"),
            record(&catalog, MutationState::Killed, "a.ATest$Nested.t2(a.ATest$Nested)"),
            record(&catalog, MutationState::MemoryError, "b.BTest.t(b.BTest)"),
            record(&catalog, MutationState::Survived, ""),
        ];
        let summary = MutationSummary::compute([&m], &global, true);

        assert_eq!(summary.total, 4);
        assert_eq!(summary.alive, 1);
        assert_eq!(summary.counts.total, 1);
        assert_eq!(
            summary.test_kills,
            vec![
                TestKills {
                    test_class: "a.ATest".to_string(),
                    kills: 2,
                    kill_ratio: 50.0,
                },
                TestKills {
                    test_class: "b.BTest".to_string(),
                    kills: 1,
                    kill_ratio: 25.0,
                },
            ]
        );
    }
}
