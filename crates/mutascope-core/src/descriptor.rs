use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use thiserror::Error;

pub const POM_FILE: &str = "pom.xml";
pub const GRADLE_SETTINGS_FILES: [&str; 2] = ["settings.gradle", "settings.gradle.kts"];

/// `include 'a', 'b'`, `include(":a", ":b")`. Not `includeBuild`.
const GRADLE_INCLUDE_PATTERN: &str = r"(?i)^\s*include(?:\s+|\s*\()(.*)$";

static GRADLE_INCLUDE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(GRADLE_INCLUDE_PATTERN).expect("include pattern should compile")
});

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("failed to read {}: {cause}", path.display())]
    Io {
        path: PathBuf,
        cause: std::io::Error,
    },
    #[error("invalid XML: {0}")]
    Xml(String),
    #[error("entity declarations are not allowed")]
    EntityDeclaration,
}

/// Module structure declared by the build descriptors of one directory.
///
/// Reads `pom.xml` and `settings.gradle(.kts)`. Any descriptor that cannot be
/// read or parsed is skipped with a warning, so a broken file behaves like a
/// directory that declares nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildDescriptor {
    modules: BTreeSet<PathBuf>,
    parent: Option<PathBuf>,
}

impl BuildDescriptor {
    pub fn read(dir: &Path) -> Self {
        let mut descriptor = Self::default();

        let pom = dir.join(POM_FILE);
        if pom.is_file() {
            match read_pom(&pom) {
                Ok(parsed) => {
                    descriptor
                        .modules
                        .extend(parsed.modules.iter().map(|m| module_dir(dir, m)));
                    descriptor.parent = parsed.relative_path.map(|p| module_dir(dir, &p));
                }
                Err(e) => {
                    tracing::warn!("Ignoring build descriptor {}: {e}", pom.display());
                }
            }
        }

        for name in GRADLE_SETTINGS_FILES {
            let settings = dir.join(name);
            if !settings.is_file() {
                continue;
            }
            match read_gradle_settings(&settings) {
                Ok(includes) => descriptor
                    .modules
                    .extend(includes.iter().map(|m| dir.join(m))),
                Err(e) => {
                    tracing::warn!("Ignoring build descriptor {}: {e}", settings.display());
                }
            }
        }

        descriptor
    }

    /// Declared module directories, sorted.
    pub fn modules(&self) -> impl DoubleEndedIterator<Item = &Path> {
        self.modules.iter().map(PathBuf::as_path)
    }

    /// Directory named by `<parent><relativePath>`, if declared.
    pub fn parent_dir(&self) -> Option<&Path> {
        self.parent.as_deref()
    }

    pub fn declares(&self, module: &Path) -> bool {
        self.modules.iter().any(|m| is_same_path(m, module))
    }
}

/// Two paths name the same existing file or directory. False if either
/// cannot be resolved.
pub fn is_same_path(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// A module entry may name the module directory or its `pom.xml`.
fn module_dir(base: &Path, entry: &str) -> PathBuf {
    let path = base.join(entry);
    if entry.ends_with(".xml") {
        path.parent().map(Path::to_path_buf).unwrap_or(path)
    } else {
        path
    }
}

#[derive(Debug, Default)]
struct PomModules {
    modules: Vec<String>,
    relative_path: Option<String>,
}

fn read_pom(path: &Path) -> Result<PomModules, DescriptorError> {
    let content = std::fs::read_to_string(path).map_err(|cause| DescriptorError::Io {
        path: path.to_path_buf(),
        cause,
    })?;
    parse_pom(&content)
}

fn parse_pom(content: &str) -> Result<PomModules, DescriptorError> {
    let xml_error = |e: quick_xml::Error| DescriptorError::Xml(e.to_string());
    let mut reader = Reader::from_str(content);
    let mut pom = PomModules::default();
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut text = String::new();

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(start) => {
                stack.push(start.local_name().as_ref().to_vec());
                text.clear();
            }
            Event::Text(content) => text.push_str(&content.unescape().map_err(xml_error)?),
            Event::End(_) => {
                let path: Vec<&[u8]> = stack.iter().map(Vec::as_slice).collect();
                let value = text.trim();
                match path.as_slice() {
                    [.., b"module"] if !value.is_empty() => pom.modules.push(value.to_string()),
                    [b"project", b"parent", b"relativePath"] if !value.is_empty() => {
                        pom.relative_path = Some(value.to_string());
                    }
                    _ => {}
                }
                stack.pop();
                text.clear();
            }
            Event::DocType(doctype) => {
                if String::from_utf8_lossy(&doctype).contains("ENTITY") {
                    return Err(DescriptorError::EntityDeclaration);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(pom)
}

fn read_gradle_settings(path: &Path) -> Result<Vec<PathBuf>, DescriptorError> {
    let content = std::fs::read_to_string(path).map_err(|cause| DescriptorError::Io {
        path: path.to_path_buf(),
        cause,
    })?;
    Ok(gradle_includes(&content))
}

/// Module directories from the `include` statements of a Gradle settings file.
/// Project paths such as `:lib:core` map to `lib/core`.
fn gradle_includes(content: &str) -> Vec<PathBuf> {
    let mut modules = Vec::new();

    for line in content.lines() {
        let Some(captures) = GRADLE_INCLUDE.captures(line) else {
            continue;
        };
        let arguments = captures[1].trim().trim_end_matches(')');
        for argument in arguments.split(',') {
            let project = argument.trim().trim_matches(|c| c == '\'' || c == '"');
            let project = project.trim_start_matches(':');
            if project.is_empty() {
                continue;
            }
            modules.push(project.split(':').collect::<PathBuf>());
        }
    }

    modules
}
