use colored::Colorize;

use mutascope_core::pipeline::AnalysisResult;
use mutascope_core::summary::MutationSummary;

/// Format a full analysis report for terminal output.
pub fn format_report(result: &AnalysisResult) -> String {
    let mut out = String::new();

    // Header
    out.push_str(&format!("\n{}\n", "mutascope - Mutation Analysis".bold()));
    out.push_str(&format!("{}\n\n", "=".repeat(40)));

    out.push_str(&format_summary_section(&result.summary));

    if let Some(ref root) = result.project_root {
        out.push_str(&format!(
            "  Project:           {} ({} mutants, {} alive)\n",
            root.display(),
            result.summary.total,
            result.summary.alive,
        ));
    }

    // Per file
    if !result.resources.is_empty() {
        out.push_str(&format!("\n{}\n{}\n", "Files".bold(), "-".repeat(40)));
        for metrics in &result.resources {
            let coverage = format!("{:5.1}%", metrics.coverage_percent());
            let coverage = if metrics.survived() + metrics.no_coverage() == 0 {
                coverage.green()
            } else {
                coverage.yellow()
            };
            out.push_str(&format!(
                "  {} {:>4}/{:<4} {}\n",
                coverage,
                metrics.killed(),
                metrics.total(),
                metrics.resource(),
            ));
        }
    }

    if !result.summary.test_kills.is_empty() {
        out.push_str(&format!("\n{}\n{}\n", "Kills by test".bold(), "-".repeat(40)));
        for kills in &result.summary.test_kills {
            out.push_str(&format!(
                "  {:>4} ({:5.1}%) {}\n",
                kills.kills, kills.kill_ratio, kills.test_class
            ));
        }
    }

    // Issues
    if !result.rules_evaluated {
        out.push_str(&format!(
            "\n{}\n",
            "No mutation analysis rule is active; no issues were computed.".yellow()
        ));
    } else if result.issues.is_empty() {
        out.push_str(&format!("\n{}\n", "No issues found!".green().bold()));
    } else {
        out.push_str(&format!(
            "\n{} ({} found)\n{}\n",
            "Issues".red().bold(),
            result.issues.len(),
            "-".repeat(40),
        ));

        for issue in &result.issues {
            let location = match issue.line {
                Some(line) => format!("{}:{line}", issue.resource),
                None => issue.resource.to_string(),
            };
            out.push_str(&format!(
                "\n  {} {}\n",
                format!("[{}]", issue.rule_id).red(),
                location,
            ));
            out.push_str(&format!("    {}\n", issue.message));
            out.push_str(&format!("    {}: {}\n", "Effort".cyan(), issue.effort));
        }
    }

    out.push('\n');
    out
}

fn format_summary_section(summary: &MutationSummary) -> String {
    let mut out = String::new();

    let coverage_str = format!("{:.1}%", summary.mutation_coverage);
    let coverage_color = if summary.mutation_coverage >= 80.0 {
        coverage_str.green()
    } else if summary.mutation_coverage >= 50.0 {
        coverage_str.yellow()
    } else {
        coverage_str.red()
    };

    let counts = &summary.counts;
    out.push_str(&format!(
        "{}: {}\n",
        "Mutation Coverage".bold(),
        coverage_color
    ));
    out.push_str(&format!(
        "  Test Strength:     {:.1}%\n",
        summary.test_strength
    ));
    out.push_str(&format!(
        "  Mutants:           {} ({} killed, {} survived, {} no coverage)\n",
        counts.total, counts.killed, counts.survived, counts.no_coverage
    ));
    if counts.timed_out + counts.memory_error + counts.unknown > 0 {
        out.push_str(&format!(
            "  Other:             {} timed out, {} memory error, {} unknown\n",
            counts.timed_out, counts.memory_error, counts.unknown
        ));
    }
    out.push_str(&format!(
        "  Tests Executed:    {}\n",
        counts.tests_executed
    ));

    out
}

/// Format a check result for CI use. Returns (text, passed).
pub fn format_check(result: &AnalysisResult, min_coverage: Option<f64>) -> (String, bool) {
    let passed = !result.fails(min_coverage);

    let mut out = format_report(result);

    if passed {
        out.push_str(&format!("{}\n", "CHECK PASSED".green().bold()));
    } else {
        let mut reasons = Vec::new();
        if !result.issues.is_empty() {
            reasons.push(format!("{} issue(s)", result.issues.len()));
        }
        if let Some(min) = min_coverage {
            if result.summary.mutation_coverage < min {
                reasons.push(format!(
                    "mutation coverage {:.1}% below {:.1}%",
                    result.summary.mutation_coverage, min
                ));
            }
        }
        out.push_str(&format!(
            "{}: {}\n",
            "CHECK FAILED".red().bold(),
            reasons.join(", "),
        ));
    }

    (out, passed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::sample_result;

    fn plain<T>(f: impl FnOnce() -> T) -> T {
        colored::control::set_override(false);
        f()
    }

    #[test]
    fn test_format_report_lists_issues() {
        let out = plain(|| format_report(&sample_result(true)));
        assert!(out.contains("Issues (3 found)"));
        assert!(out.contains("[mutant.survived] src/main/java/ch/example/Mutant.java:172"));
        assert!(out.contains("(WITH_SUFFIX)"));
        assert!(out.contains("[mutant.coverage] src/main/java/ch/example/Mutant.java\n"));
    }

    #[test]
    fn test_format_report_summary() {
        let out = plain(|| format_report(&sample_result(false)));
        assert!(out.contains("Mutation Coverage: 33.3%"));
        assert!(out.contains("3 (1 killed, 1 survived, 1 no coverage)"));
        assert!(out.contains("No issues found!"));
        assert!(!out.contains("Other:"));
    }

    #[test]
    fn test_format_report_without_rules() {
        let mut result = sample_result(false);
        result.rules_evaluated = false;
        let out = plain(|| format_report(&result));
        assert!(out.contains("No mutation analysis rule is active"));
        assert!(!out.contains("No issues found!"));
    }

    #[test]
    fn test_format_check() {
        let (out, passed) = plain(|| format_check(&sample_result(false), None));
        assert!(passed);
        assert!(out.contains("CHECK PASSED"));

        let (out, passed) = plain(|| format_check(&sample_result(true), Some(50.0)));
        assert!(!passed);
        assert!(out.contains("CHECK FAILED: 3 issue(s), mutation coverage 33.3% below 50.0%"));
    }
}
