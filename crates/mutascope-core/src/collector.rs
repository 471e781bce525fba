use std::collections::HashSet;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::descriptor::BuildDescriptor;
use crate::operators::OperatorCatalog;
use crate::report::{ReportError, ReportParser};
use crate::types::MutationRecord;

/// Report location relative to a module, as written by the PIT build plugins.
pub const DEFAULT_REPORT_DIRECTORY: &str = "target/pit-reports";

/// Locates mutation reports across a multi-module build and parses them.
pub struct ReportCollector<'c> {
    parser: ReportParser<'c>,
    report_directory: PathBuf,
    project_root: Option<PathBuf>,
}

impl<'c> ReportCollector<'c> {
    pub fn new(catalog: &'c OperatorCatalog, report_directory: impl Into<PathBuf>) -> Self {
        Self {
            parser: ReportParser::new(catalog),
            report_directory: report_directory.into(),
            project_root: None,
        }
    }

    /// Use `root` instead of discovering the project root from build
    /// descriptors. A relative path is resolved against the module directory.
    pub fn with_project_root(mut self, root: Option<PathBuf>) -> Self {
        self.project_root = root;
        self
    }

    pub fn report_directory(&self) -> &Path {
        &self.report_directory
    }

    /// The root of the build containing `module_dir`.
    pub fn project_root(&self, module_dir: &Path) -> PathBuf {
        match &self.project_root {
            Some(root) => {
                tracing::debug!("Using configured project root {}", root.display());
                module_dir.join(root)
            }
            None => find_project_root(module_dir),
        }
    }

    /// Records of every module below `root`, in module enumeration order.
    ///
    /// A module whose report is missing or unparsable contributes nothing;
    /// the other modules are still collected.
    pub fn collect_global_mutants(&self, root: &Path) -> Vec<MutationRecord> {
        let modules = find_module_roots(root);
        tracing::debug!("Collecting mutants of {} modules", modules.len());

        modules
            .par_iter()
            .map(|module| self.read_module(module))
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .collect()
    }

    /// Records of `module_dir`'s own report.
    pub fn collect_local_mutants(
        &self,
        module_dir: &Path,
    ) -> Result<Vec<MutationRecord>, ReportError> {
        self.parser
            .read_mutants(&module_dir.join(&self.report_directory))
    }

    fn read_module(&self, module_dir: &Path) -> Vec<MutationRecord> {
        match self.collect_local_mutants(module_dir) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("Skipping report of module {}: {e}", module_dir.display());
                Vec::new()
            }
        }
    }
}

/// Walk upward from `module_dir` while the enclosing directory declares the
/// current one as a module.
///
/// A module's `<parent><relativePath>` is tried before its filesystem parent.
/// Directories without descriptors, or with unreadable ones, end the walk.
pub fn find_project_root(module_dir: &Path) -> PathBuf {
    let mut current = canonical(module_dir);
    let mut visited = HashSet::new();

    while visited.insert(current.clone()) {
        let declared_parent = BuildDescriptor::read(&current)
            .parent_dir()
            .map(canonical)
            .into_iter();
        let filesystem_parent = current.parent().map(Path::to_path_buf).into_iter();

        let parent = declared_parent
            .chain(filesystem_parent)
            .find(|candidate| BuildDescriptor::read(candidate).declares(&current));

        match parent {
            Some(parent) => {
                tracing::debug!(
                    "{} is a module of {}",
                    current.display(),
                    parent.display()
                );
                current = parent;
            }
            None => break,
        }
    }

    current
}

/// `root` followed by every module it declares transitively, depth first.
pub fn find_module_roots(root: &Path) -> Vec<PathBuf> {
    let mut roots = Vec::new();
    let mut visited = HashSet::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        if !visited.insert(canonical(&dir)) {
            continue;
        }
        let descriptor = BuildDescriptor::read(&dir);
        for module in descriptor.modules().rev() {
            if module.is_dir() {
                pending.push(module.to_path_buf());
            } else {
                tracing::warn!("Declared module {} does not exist", module.display());
            }
        }
        roots.push(dir);
    }

    roots
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
