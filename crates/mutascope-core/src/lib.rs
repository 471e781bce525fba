pub mod collector;
pub mod config;
pub mod descriptor;
pub mod metrics;
pub mod operators;
pub mod pipeline;
pub mod report;
pub mod resolver;
pub mod rules;
pub mod summary;
pub mod types;

pub use collector::ReportCollector;
pub use config::Config;
pub use metrics::{MutationCounts, ResourceMutationMetrics};
pub use operators::{MutationOperator, OperatorCatalog, OperatorRef};
pub use pipeline::{AnalysisPipeline, AnalysisResult};
pub use report::{ReportError, ReportParser};
pub use resolver::{ResourceResolver, SourceTreeResolver};
pub use rules::{EffortFactors, Evaluation, RuleSet, ViolationEngine};
pub use summary::MutationSummary;
pub use types::*;
