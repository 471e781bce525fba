use serde::Serialize;

use mutascope_core::pipeline::AnalysisResult;

/// Serialize an analysis result, pretty-printed unless `compact`.
pub fn format_report(result: &AnalysisResult, compact: bool) -> String {
    to_json(result, compact)
}

/// An analysis result together with the verdict of `mutascope check`.
#[derive(Debug, Serialize)]
pub struct CheckOutput<'a> {
    #[serde(flatten)]
    pub result: &'a AnalysisResult,
    pub check: CheckStatus,
}

#[derive(Debug, Serialize)]
pub struct CheckStatus {
    pub passed: bool,
    pub issue_count: usize,
    pub min_coverage: Option<f64>,
}

/// The check verdict as JSON, and whether the check passed.
pub fn format_check(
    result: &AnalysisResult,
    min_coverage: Option<f64>,
    compact: bool,
) -> (String, bool) {
    let passed = !result.fails(min_coverage);
    let output = CheckOutput {
        result,
        check: CheckStatus {
            passed,
            issue_count: result.issues.len(),
            min_coverage,
        },
    };
    (to_json(&output, compact), passed)
}

fn to_json<T: Serialize + ?Sized>(value: &T, compact: bool) -> String {
    let json = if compact {
        serde_json::to_string(value)
    } else {
        serde_json::to_string_pretty(value)
    };
    json.expect("report types should be serializable")
}
