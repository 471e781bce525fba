use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use globset::Glob;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;
use walkdir::WalkDir;

use crate::operators::OperatorCatalog;
use crate::types::{BuildError, MutationRecord, MutationRecordBuilder};

const ELEMENT_MUTATION: &[u8] = b"mutation";
const ELEMENT_SOURCE_FILE: &[u8] = b"sourceFile";
const ELEMENT_MUTATED_CLASS: &[u8] = b"mutatedClass";
const ELEMENT_MUTATED_METHOD: &[u8] = b"mutatedMethod";
const ELEMENT_METHOD_DESCRIPTION: &[u8] = b"methodDescription";
const ELEMENT_LINE_NUMBER: &[u8] = b"lineNumber";
const ELEMENT_MUTATOR: &[u8] = b"mutator";
const ELEMENT_INDEX: &[u8] = b"index";
const ELEMENT_KILLING_TEST: &[u8] = b"killingTest";
const ELEMENT_DESCRIPTION: &[u8] = b"description";

const ATTR_STATUS: &str = "status";
const ATTR_NUMBER_OF_TESTS_RUN: &str = "numberOfTestsRun";

/// File name pattern of PIT's XML report.
const REPORT_PATTERN: &str = "*.xml";

/// Errors raised while reading a mutation report.
#[derive(Debug, Error)]
pub enum ReportError {
    /// A mutation element lacks a required field. Fatal to the whole report.
    #[error("parse error at [row,col]:[{line},{column}]: {cause}")]
    Format {
        line: usize,
        column: usize,
        cause: BuildError,
    },
    #[error("malformed report at [row,col]:[{line},{column}]: {message}")]
    Malformed {
        line: usize,
        column: usize,
        message: String,
    },
    #[error("report declares entities at [row,col]:[{line},{column}]; entity expansion is disabled")]
    EntityDeclaration { line: usize, column: usize },
    #[error("failed to read report '{}': {cause}", path.display())]
    Io { path: PathBuf, cause: io::Error },
}

/// Streaming parser for PIT `mutations.xml` reports.
///
/// The parser never expands entities beyond the five predefined XML ones and
/// never fetches anything: a document type declaration that declares entities
/// is rejected outright.
pub struct ReportParser<'c> {
    catalog: &'c OperatorCatalog,
}

impl<'c> ReportParser<'c> {
    pub fn new(catalog: &'c OperatorCatalog) -> Self {
        Self { catalog }
    }

    /// Read the report at `path`, which may be the report file itself or a
    /// directory to search for the most recent report.
    ///
    /// A missing report yields no records. See [`ReportParser::parse_file`]
    /// for how a report that exists is handled.
    pub fn read_mutants(&self, path: &Path) -> Result<Vec<MutationRecord>, ReportError> {
        tracing::debug!("Searching pit reports in {}", path.display());

        let report = if path.is_dir() {
            find_report(path)
        } else {
            Some(path.to_path_buf())
        };

        match report {
            Some(report) => self.parse_file(&report),
            None => {
                tracing::warn!("No XML PIT report found in directory {}", path.display());
                Ok(Vec::new())
            }
        }
    }

    /// Parse a report file.
    ///
    /// Only [`ReportError::Format`] is returned to the caller. An unreadable
    /// file or malformed XML is logged and yields no records.
    pub fn parse_file(&self, path: &Path) -> Result<Vec<MutationRecord>, ReportError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(cause) => {
                let err = ReportError::Io {
                    path: path.to_path_buf(),
                    cause,
                };
                tracing::warn!("{err}");
                return Ok(Vec::new());
            }
        };

        match self.parse_str(&content) {
            Ok(records) => Ok(records),
            Err(err @ ReportError::Format { .. }) => Err(err),
            Err(err) => {
                tracing::warn!("Parsing report {} failed: {err}", path.display());
                Ok(Vec::new())
            }
        }
    }

    /// Parse report content. Records are returned in document order.
    pub fn parse_str(&self, xml: &str) -> Result<Vec<MutationRecord>, ReportError> {
        let mut reader = Reader::from_str(xml);
        let mut records = Vec::new();

        loop {
            match reader.read_event() {
                Ok(Event::Start(start)) if start.local_name().as_ref() == ELEMENT_MUTATION => {
                    let builder = self.open_mutation(&reader, xml, &start)?;
                    let record = self.read_mutation(&mut reader, xml, builder)?;
                    tracing::debug!("Found mutant {record}");
                    records.push(record);
                }
                Ok(Event::Empty(start)) if start.local_name().as_ref() == ELEMENT_MUTATION => {
                    let builder = self.open_mutation(&reader, xml, &start)?;
                    records.push(finish(&reader, xml, builder)?);
                }
                Ok(Event::DocType(doctype)) => {
                    if String::from_utf8_lossy(&doctype).contains("ENTITY") {
                        let (line, column) = position(&reader, xml);
                        return Err(ReportError::EntityDeclaration { line, column });
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(malformed(&reader, xml, e.to_string())),
            }
        }

        Ok(records)
    }

    /// Start a record from the attributes of its opening tag.
    fn open_mutation(
        &self,
        reader: &Reader<&[u8]>,
        xml: &str,
        start: &BytesStart<'_>,
    ) -> Result<MutationRecordBuilder, ReportError> {
        let status = attribute(start, ATTR_STATUS).map_err(|m| malformed(reader, xml, m))?;
        let tests_run = attribute(start, ATTR_NUMBER_OF_TESTS_RUN)
            .map_err(|m| malformed(reader, xml, m))?
            .map(|v| parse_number(reader, xml, ATTR_NUMBER_OF_TESTS_RUN, &v))
            .transpose()?
            .unwrap_or(0);

        Ok(MutationRecord::builder()
            .status(status.as_deref().unwrap_or_default())
            .tests_executed(tests_run))
    }

    /// Consume child elements up to the closing `mutation` tag.
    fn read_mutation(
        &self,
        reader: &mut Reader<&[u8]>,
        xml: &str,
        mut builder: MutationRecordBuilder,
    ) -> Result<MutationRecord, ReportError> {
        let mut field: Option<Vec<u8>> = None;
        let mut text = String::new();

        loop {
            match reader.read_event() {
                Ok(Event::Start(start)) => {
                    field = Some(start.local_name().as_ref().to_vec());
                    text.clear();
                }
                Ok(Event::Empty(start)) => {
                    builder = self.apply_field(reader, xml, builder, start.local_name().as_ref(), "")?;
                }
                Ok(Event::Text(content)) => {
                    if field.is_some() {
                        let unescaped = content
                            .unescape()
                            .map_err(|e| malformed(reader, xml, e.to_string()))?;
                        text.push_str(&unescaped);
                    }
                }
                Ok(Event::CData(content)) => {
                    if field.is_some() {
                        text.push_str(&String::from_utf8_lossy(&content));
                    }
                }
                Ok(Event::End(end)) => {
                    if end.local_name().as_ref() == ELEMENT_MUTATION {
                        break;
                    }
                    if let Some(name) = field.take() {
                        builder = self.apply_field(reader, xml, builder, &name, text.trim())?;
                        text.clear();
                    }
                }
                Ok(Event::Eof) => {
                    return Err(malformed(
                        reader,
                        xml,
                        "unexpected end of report inside a mutation".to_string(),
                    ))
                }
                Ok(_) => {}
                Err(e) => return Err(malformed(reader, xml, e.to_string())),
            }
        }

        finish(reader, xml, builder)
    }

    fn apply_field(
        &self,
        reader: &Reader<&[u8]>,
        xml: &str,
        builder: MutationRecordBuilder,
        name: &[u8],
        value: &str,
    ) -> Result<MutationRecordBuilder, ReportError> {
        let builder = match name {
            ELEMENT_SOURCE_FILE => builder.source_file(value),
            ELEMENT_MUTATED_CLASS => builder.mutated_class(value),
            ELEMENT_MUTATED_METHOD => builder.mutated_method(value),
            ELEMENT_METHOD_DESCRIPTION => builder.method_descriptor(value),
            ELEMENT_LINE_NUMBER => builder.line_number(parse_number(reader, xml, "lineNumber", value)?),
            ELEMENT_MUTATOR if !value.is_empty() => builder.mutator(self.catalog, value),
            ELEMENT_INDEX => builder.operator_index(parse_number(reader, xml, "index", value)?),
            ELEMENT_KILLING_TEST => builder.killing_test(value),
            ELEMENT_DESCRIPTION => builder.description(value),
            _ => builder,
        };
        Ok(builder)
    }
}

fn finish(
    reader: &Reader<&[u8]>,
    xml: &str,
    builder: MutationRecordBuilder,
) -> Result<MutationRecord, ReportError> {
    builder.build().map_err(|cause| {
        let (line, column) = position(reader, xml);
        ReportError::Format {
            line,
            column,
            cause,
        }
    })
}

fn attribute(start: &BytesStart<'_>, name: &str) -> Result<Option<String>, String> {
    match start.try_get_attribute(name) {
        Ok(Some(attr)) => attr
            .unescape_value()
            .map(|v| Some(v.into_owned()))
            .map_err(|e| e.to_string()),
        Ok(None) => Ok(None),
        Err(e) => Err(e.to_string()),
    }
}

fn parse_number(
    reader: &Reader<&[u8]>,
    xml: &str,
    field: &str,
    value: &str,
) -> Result<u32, ReportError> {
    value
        .trim()
        .parse()
        .map_err(|_| malformed(reader, xml, format!("invalid {field} '{value}'")))
}

fn malformed(reader: &Reader<&[u8]>, xml: &str, message: String) -> ReportError {
    let (line, column) = position(reader, xml);
    ReportError::Malformed {
        line,
        column,
        message,
    }
}

/// 1-based line and column of the reader's current position.
fn position(reader: &Reader<&[u8]>, xml: &str) -> (usize, usize) {
    let offset = (reader.buffer_position() as usize).min(xml.len());
    let before = &xml.as_bytes()[..offset];
    let line = before.iter().filter(|&&b| b == b'\n').count() + 1;
    let line_start = before
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |p| p + 1);
    (line, offset - line_start + 1)
}

/// Find the most recently modified `*.xml` file below `report_directory`.
pub fn find_report(report_directory: &Path) -> Option<PathBuf> {
    if !report_directory.is_dir() {
        tracing::warn!(
            "Report directory {} is no valid directory",
            report_directory.display()
        );
        return None;
    }

    let matcher = match Glob::new(REPORT_PATTERN) {
        Ok(glob) => glob.compile_matcher(),
        Err(e) => {
            tracing::warn!("Invalid report pattern {REPORT_PATTERN}: {e}");
            return None;
        }
    };

    let mut most_recent: Option<(PathBuf, SystemTime)> = None;
    for entry in WalkDir::new(report_directory)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && matcher.is_match(e.file_name()))
    {
        let modified = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let newer = most_recent
            .as_ref()
            .map_or(true, |(_, current)| modified > *current);
        if newer {
            most_recent = Some((entry.into_path(), modified));
        }
    }

    most_recent.map(|(path, _)| path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MutationState;

    const NEGATE: &str = "org.pitest.mutationtest.engine.gregor.mutators.NegateConditionalsMutator";

    const THREE_MUTANTS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<mutations>
<mutation detected='true' status='KILLED'><sourceFile>Mutant.java</sourceFile><mutatedClass>ch.example.model.Mutant</mutatedClass><mutatedMethod>equals</mutatedMethod><methodDescription>(Ljava/lang/Object;)Z</methodDescription><lineNumber>162</lineNumber><mutator>org.pitest.mutationtest.engine.gregor.mutators.NegateConditionalsMutator</mutator><index>5</index><killingTest>ch.example.model.MutantTest.testEquals_different_false(ch.example.model.MutantTest)</killingTest></mutation>
<mutation detected='false' status='SURVIVED'><sourceFile>Mutant.java</sourceFile><mutatedClass>ch.example.model.Mutant</mutatedClass><mutatedMethod>equals</mutatedMethod><methodDescription>(Ljava/lang/Object;)Z</methodDescription><lineNumber>172</lineNumber><mutator>org.pitest.mutationtest.engine.gregor.mutators.NegateConditionalsMutator_WITH_SUFFIX</mutator><index>43</index><killingTest/></mutation>
<mutation detected='false' status='NO_COVERAGE'><sourceFile>Mutant.java</sourceFile><mutatedClass>ch.example.model.Mutant</mutatedClass><mutatedMethod>equals</mutatedMethod><methodDescription>(Ljava/lang/Object;)Z</methodDescription><lineNumber>175</lineNumber><mutator>org.pitest.mutationtest.engine.gregor.mutators.NegateConditionalsMutator</mutator><index>55</index><killingTest/></mutation>
</mutations>
"#;

    fn parse(xml: &str) -> Result<Vec<MutationRecord>, ReportError> {
        let catalog = OperatorCatalog::builtin();
        ReportParser::new(&catalog).parse_str(xml)
    }

    #[test]
    fn test_parse_three_mutants_in_order() {
        let records = parse(THREE_MUTANTS).unwrap();
        assert_eq!(records.len(), 3);

        let states: Vec<_> = records.iter().map(|r| r.state()).collect();
        assert_eq!(
            states,
            vec![
                MutationState::Killed,
                MutationState::Survived,
                MutationState::NoCoverage
            ]
        );
        assert_eq!(records[0].line_number(), 162);
        assert_eq!(records[0].operator_index(), 5);
        assert!(records[0].killing_test().starts_with("ch.example.model.MutantTest"));
        assert_eq!(records[1].operator_suffix(), "WITH_SUFFIX");
        assert_eq!(records[1].killing_test(), "");
        assert!(records
            .iter()
            .all(|r| r.operator().id == "NEGATE_CONDITIONALS"));
    }

    #[test]
    fn test_parsed_record_equals_rebuilt_record() {
        let catalog = OperatorCatalog::builtin();
        let records = ReportParser::new(&catalog).parse_str(THREE_MUTANTS).unwrap();
        let expected = MutationRecord::builder()
            .state(MutationState::Killed)
            .source_file("Mutant.java")
            .mutated_class("ch.example.model.Mutant")
            .mutated_method("equals")
            .method_descriptor("(Ljava/lang/Object;)Z")
            .line_number(162)
            .operator_index(5)
            .mutator(&catalog, NEGATE)
            .killing_test(
                "ch.example.model.MutantTest.testEquals_different_false(ch.example.model.MutantTest)",
            )
            .build()
            .unwrap();
        assert_eq!(records[0], expected);
    }

    #[test]
    fn test_parse_description_and_tests_run() {
        let xml = r#"<mutations>
<mutation detected='true' status='KILLED' numberOfTestsRun='40'>
  <sourceFile>Mutant.java</sourceFile>
  <mutatedClass>ch.example.Mutant</mutatedClass>
  <mutatedMethod>&lt;init&gt;</mutatedMethod>
  <methodDescription>()V</methodDescription>
  <lineNumber>268</lineNumber>
  <mutator>org.pitest.mutationtest.engine.gregor.mutators.InlineConstantMutator</mutator>
  <index>8</index>
  <killingTest>ch.example.MutantTest.testEquals_same_true(ch.example.MutantTest)</killingTest>
  <description>Substituted 1 with 0</description>
</mutation>
</mutations>"#;
        let records = parse(xml).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].tests_executed(), 40);
        assert_eq!(records[0].mutated_method(), "<init>");
        assert_eq!(records[0].description(), Some("Substituted 1 with 0"));
        assert_eq!(records[0].operator().id, "INLINE_CONSTS");
    }

    #[test]
    fn test_missing_status_is_unknown() {
        let xml = r#"<mutations><mutation><sourceFile>A.java</sourceFile><mutatedClass>a.A</mutatedClass><mutatedMethod>m</mutatedMethod><methodDescription>()V</methodDescription><lineNumber>1</lineNumber><mutator>MATH</mutator><index>0</index></mutation></mutations>"#;
        let records = parse(xml).unwrap();
        assert_eq!(records[0].state(), MutationState::Unknown);
        assert!(!records[0].is_detected());
    }

    #[test]
    fn test_missing_required_field_is_format_error_with_position() {
        let xml = "<mutations>\n<mutation status='SURVIVED'>\n  <mutatedClass>a.A</mutatedClass>\n</mutation>\n</mutations>";
        let err = parse(xml).unwrap_err();
        match err {
            ReportError::Format {
                line,
                cause: BuildError::MissingField(field),
                ..
            } => {
                assert_eq!(field, "sourceFile");
                assert_eq!(line, 4);
            }
            other => panic!("expected format error, got {other:?}"),
        }
    }

    #[test]
    fn test_format_error_names_cause_once() {
        let xml = "<mutations><mutation status='KILLED'><sourceFile>A.java</sourceFile></mutation></mutations>";
        let err = parse(xml).unwrap_err();
        assert!(std::error::Error::source(&err).is_none());
        let message = anyhow::Error::new(err).context("reading report");
        let rendered = format!("{message:#}");
        assert_eq!(rendered.matches("mutatedClass must be set").count(), 1, "{rendered}");
    }

    #[test]
    fn test_killed_without_killing_test_is_format_error() {
        let xml = r#"<mutations><mutation status='KILLED'><sourceFile>A.java</sourceFile><mutatedClass>a.A</mutatedClass><mutatedMethod>m</mutatedMethod><methodDescription>()V</methodDescription><lineNumber>1</lineNumber><mutator>MATH</mutator><index>0</index></mutation></mutations>"#;
        let err = parse(xml).unwrap_err();
        assert!(err.to_string().contains("killingTest must be set"), "{err}");
    }

    #[test]
    fn test_invalid_line_number_is_malformed() {
        let xml = r#"<mutations><mutation status='SURVIVED'><lineNumber>abc</lineNumber></mutation></mutations>"#;
        assert!(matches!(parse(xml), Err(ReportError::Malformed { .. })));
    }

    #[test]
    fn test_unknown_entity_is_malformed() {
        let xml = r#"<mutations><mutation status='SURVIVED'><sourceFile>&xxe;</sourceFile></mutation></mutations>"#;
        assert!(matches!(parse(xml), Err(ReportError::Malformed { .. })));
    }

    #[test]
    fn test_external_entity_declaration_rejected() {
        let xml = r#"<?xml version="1.0"?>
<!DOCTYPE mutations [ <!ENTITY xxe SYSTEM "file:///etc/passwd"> ]>
<mutations><mutation status='SURVIVED'><sourceFile>A.java</sourceFile><mutatedClass>a.A</mutatedClass><mutatedMethod>m</mutatedMethod><methodDescription>&xxe;</methodDescription><mutator>MATH</mutator></mutation></mutations>"#;
        assert!(matches!(
            parse(xml),
            Err(ReportError::EntityDeclaration { line: 2, .. })
        ));
    }

    #[test]
    fn test_empty_input_yields_no_records() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("<mutations/>").unwrap().is_empty());
    }

    #[test]
    fn test_truncated_report_is_malformed() {
        let xml = r#"<mutations><mutation status='SURVIVED'><sourceFile>A.java</sourceFile>"#;
        assert!(matches!(parse(xml), Err(ReportError::Malformed { .. })));
    }

    #[test]
    fn test_parse_file_missing_file_is_empty() {
        let catalog = OperatorCatalog::builtin();
        let records = ReportParser::new(&catalog)
            .parse_file(Path::new("anyNonExistingPath.xml"))
            .unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_parse_file_broken_xml_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mutations.xml");
        std::fs::write(&path, "<mutations><mutation status='KILLED'></mutations>").unwrap();

        let catalog = OperatorCatalog::builtin();
        let records = ReportParser::new(&catalog).parse_file(&path).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_parse_file_surfaces_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mutations.xml");
        std::fs::write(&path, "<mutations><mutation status='SURVIVED'></mutation></mutations>").unwrap();

        let catalog = OperatorCatalog::builtin();
        let result = ReportParser::new(&catalog).parse_file(&path);
        assert!(matches!(result, Err(ReportError::Format { .. })));
    }

    #[test]
    fn test_read_mutants_searches_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("202401011200");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("mutations.xml"), THREE_MUTANTS).unwrap();
        std::fs::write(nested.join("index.html"), "<html/>").unwrap();

        let catalog = OperatorCatalog::builtin();
        let records = ReportParser::new(&catalog).read_mutants(dir.path()).unwrap();
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn test_read_mutants_without_report_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = OperatorCatalog::builtin();
        let records = ReportParser::new(&catalog).read_mutants(dir.path()).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_find_report_picks_most_recent() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("a.xml");
        let new = dir.path().join("b.xml");
        std::fs::write(&old, "<mutations/>").unwrap();
        std::fs::write(&new, "<mutations/>").unwrap();

        let past = SystemTime::now() - std::time::Duration::from_secs(3600);
        std::fs::File::options()
            .write(true)
            .open(&old)
            .unwrap()
            .set_modified(past)
            .unwrap();

        assert_eq!(find_report(dir.path()), Some(new));
    }

    #[test]
    fn test_find_report_rejects_non_directory() {
        assert_eq!(find_report(Path::new("does/not/exist")), None);
    }
}
