//! SonarQube generic issue import format.
//!
//! See <https://docs.sonarsource.com/sonarqube/latest/analyzing-source-code/importing-external-issues/generic-issue-import-format/>.

use serde::Serialize;

use mutascope_core::pipeline::AnalysisResult;
use mutascope_core::rules::CODE_SMELL_SUFFIX;
use mutascope_core::types::Issue;

pub const ENGINE_ID: &str = "mutascope";

#[derive(Debug, Serialize)]
pub struct GenericIssueReport<'a> {
    pub issues: Vec<GenericIssue<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericIssue<'a> {
    pub engine_id: &'static str,
    pub rule_id: &'a str,
    pub severity: &'static str,
    #[serde(rename = "type")]
    pub issue_type: &'static str,
    pub primary_location: Location<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Location<'a> {
    pub message: &'a str,
    pub file_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_range: Option<TextRange>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextRange {
    pub start_line: u32,
    pub end_line: u32,
}

impl<'a> From<&'a Issue> for GenericIssue<'a> {
    fn from(issue: &'a Issue) -> Self {
        let issue_type = if issue.rule_id.ends_with(CODE_SMELL_SUFFIX) {
            "CODE_SMELL"
        } else {
            "BUG"
        };
        GenericIssue {
            engine_id: ENGINE_ID,
            rule_id: &issue.rule_id,
            severity: "MAJOR",
            issue_type,
            primary_location: Location {
                message: &issue.message,
                // forward slashes on every platform
                file_path: issue
                    .resource
                    .path()
                    .to_string_lossy()
                    .replace('\\', "/"),
                text_range: issue.line.filter(|&line| line > 0).map(|line| TextRange {
                    start_line: line,
                    end_line: line,
                }),
            },
        }
    }
}

/// Format the issues of an analysis for `sonar.externalIssuesReportPaths`.
pub fn format_report(result: &AnalysisResult) -> String {
    let report = GenericIssueReport {
        issues: result.issues.iter().map(GenericIssue::from).collect(),
    };
    serde_json::to_string_pretty(&report).expect("GenericIssueReport should be serializable")
}
