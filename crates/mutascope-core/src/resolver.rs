use std::path::{Path, PathBuf};

use crate::types::Resource;

/// Maps a mutated class to the source file it was compiled from.
pub trait ResourceResolver: Send + Sync {
    /// `class_name` is fully qualified and already stripped of any nested
    /// class part.
    fn resolve(&self, class_name: &str) -> Option<Resource>;
}

/// Resolves classes against conventional source directories of one module,
/// e.g. `a.b.C` to `src/main/java/a/b/C.java`.
#[derive(Debug, Clone)]
pub struct SourceTreeResolver {
    base_dir: PathBuf,
    source_roots: Vec<PathBuf>,
    extensions: Vec<String>,
}

impl SourceTreeResolver {
    pub fn new(
        base_dir: impl Into<PathBuf>,
        source_roots: impl IntoIterator<Item = impl Into<PathBuf>>,
        extensions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            base_dir: base_dir.into(),
            source_roots: source_roots.into_iter().map(Into::into).collect(),
            extensions: extensions.into_iter().map(Into::into).collect(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn candidates<'a>(&'a self, class_path: &'a Path) -> impl Iterator<Item = PathBuf> + 'a {
        self.source_roots.iter().flat_map(move |root| {
            self.extensions
                .iter()
                .map(move |ext| root.join(class_path).with_extension(ext))
        })
    }
}

impl ResourceResolver for SourceTreeResolver {
    fn resolve(&self, class_name: &str) -> Option<Resource> {
        let outer = class_name.split('$').next().unwrap_or(class_name);
        if outer.is_empty() {
            return None;
        }
        let class_path: PathBuf = outer.split('.').collect();

        let found = self
            .candidates(&class_path)
            .find(|relative| self.base_dir.join(relative).is_file());
        if found.is_none() {
            tracing::debug!("No source file found for class {class_name}");
        }
        found.map(Resource::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(base: &Path) -> SourceTreeResolver {
        SourceTreeResolver::new(
            base,
            ["src/main/java", "src/main/kotlin"],
            ["java", "kt"],
        )
    }

    #[test]
    fn test_resolve_java_class() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("src/main/java/ch/example/Mutant.java");
        std::fs::create_dir_all(source.parent().unwrap()).unwrap();
        std::fs::write(&source, "class Mutant {}").unwrap();

        let resource = resolver(dir.path()).resolve("ch.example.Mutant").unwrap();
        assert_eq!(resource.path(), Path::new("src/main/java/ch/example/Mutant.java"));
    }

    #[test]
    fn test_resolve_nested_and_kotlin_class() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("src/main/kotlin/ch/example/Util.kt");
        std::fs::create_dir_all(source.parent().unwrap()).unwrap();
        std::fs::write(&source, "object Util").unwrap();

        let resource = resolver(dir.path()).resolve("ch.example.Util$Inner").unwrap();
        assert_eq!(resource.path(), Path::new("src/main/kotlin/ch/example/Util.kt"));
    }

    #[test]
    fn test_resolve_missing_class() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(resolver(dir.path()).resolve("ch.example.Missing"), None);
        assert_eq!(resolver(dir.path()).resolve("$Anonymous"), None);
    }
}
