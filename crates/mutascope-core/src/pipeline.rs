use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::collector::ReportCollector;
use crate::config::Config;
use crate::metrics::{aggregate, ResourceMutationMetrics};
use crate::operators::OperatorCatalog;
use crate::resolver::SourceTreeResolver;
use crate::rules::{Evaluation, RuleSet, ViolationEngine};
use crate::summary::MutationSummary;
use crate::types::Issue;

/// Everything one analysis of a module produced.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub module_dir: PathBuf,
    /// Set when the whole build was collected.
    pub project_root: Option<PathBuf>,
    pub resources: Vec<ResourceMutationMetrics>,
    pub issues: Vec<Issue>,
    /// False when no rule was active.
    pub rules_evaluated: bool,
    pub summary: MutationSummary,
}

impl AnalysisResult {
    /// Coverage below `min_coverage`, or any issue.
    pub fn fails(&self, min_coverage: Option<f64>) -> bool {
        !self.issues.is_empty()
            || min_coverage.is_some_and(|min| self.summary.mutation_coverage < min)
    }
}

/// Report collection, aggregation and rule evaluation for one module.
pub struct AnalysisPipeline {
    catalog: OperatorCatalog,
    config: Config,
}

impl AnalysisPipeline {
    pub fn new(catalog: OperatorCatalog, config: Config) -> Self {
        Self { catalog, config }
    }

    pub fn catalog(&self) -> &OperatorCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Rules to apply: the configured selection, or the default ones.
    pub fn rules(&self) -> RuleSet {
        let standard = RuleSet::standard(&self.catalog, self.config.rules.coverage_threshold);
        match &self.config.rules.active {
            Some(keys) => standard.select(keys),
            None => standard.default_active(),
        }
    }

    /// Analyze the module at `module_dir`.
    ///
    /// Never fails: a report that cannot be used contributes no mutants and
    /// is logged, so the rest of the analysis still runs.
    pub fn analyze(&self, module_dir: &Path) -> AnalysisResult {
        let project = &self.config.project;
        let collector = ReportCollector::new(&self.catalog, project.report_directory.clone())
            .with_project_root(project.project_root.clone());

        let (project_root, global) = if project.experimental_features {
            let root = collector.project_root(module_dir);
            tracing::info!("Collecting mutants of project {}", root.display());
            let records = collector.collect_global_mutants(&root);
            (Some(root), records)
        } else {
            (None, Vec::new())
        };

        let local = match collector.collect_local_mutants(module_dir) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(
                    "Ignoring mutation report of {}: {e}",
                    module_dir.display()
                );
                Vec::new()
            }
        };
        tracing::info!("Found {} mutants in {}", local.len(), module_dir.display());

        let resolver = SourceTreeResolver::new(
            module_dir,
            project.source_roots.iter().cloned(),
            project.source_extensions.iter().cloned(),
        );
        let metrics = aggregate(local, &resolver);

        let engine = ViolationEngine::new(self.rules(), self.config.effort.factors());
        let evaluation = engine.evaluate(metrics.values());
        let rules_evaluated = evaluation != Evaluation::NoActiveRules;

        let summary =
            MutationSummary::compute(metrics.values(), &global, project.experimental_features);

        AnalysisResult {
            module_dir: module_dir.to_path_buf(),
            project_root,
            resources: metrics.into_values().collect(),
            issues: evaluation.into_issues(),
            rules_evaluated,
            summary,
        }
    }
}
