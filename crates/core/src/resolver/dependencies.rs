//! Library entries merged across all targets

use super::{
    model::{Attributes, ClasspathEntry},
    raw::RawTarget,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Module kind carrying resolved artifacts
const ARTIFACT_MODULE_KIND: &str = "maven";
const SOURCES_CLASSIFIER: &str = "sources";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Library {
    pub jar: PathBuf,
    pub sources: Option<PathBuf>,
    /// True until a non-test target references the jar
    pub test: bool,
    pub optional: bool,
}

impl Library {
    pub fn into_entry(self) -> ClasspathEntry {
        ClasspathEntry::Library {
            jar_path: self.jar,
            source_jar_path: self.sources,
            attributes: Attributes::new(self.test, self.optional),
        }
    }
}

/// Collects one entry per distinct jar, in first-seen order
#[derive(Debug, Default)]
pub struct LibraryMerger {
    libraries: Vec<Library>,
    index: HashMap<PathBuf, usize>,
}

impl LibraryMerger {
    pub fn add_target(&mut self, target: &RawTarget, project_root: &Path) {
        for module in &target.dependency_modules {
            if module.kind != ARTIFACT_MODULE_KIND {
                debug!("skipping {} module {}", module.kind, module.name);
                continue;
            }
            let jar = module
                .artifacts
                .iter()
                .find(|artifact| artifact.classifier.as_deref().is_none_or(str::is_empty));
            let Some(jar) = jar else {
                debug!("module {} has no primary artifact", module.name);
                continue;
            };
            let sources = module
                .artifacts
                .iter()
                .find(|artifact| artifact.classifier.as_deref() == Some(SOURCES_CLASSIFIER))
                .map(|artifact| absolute(&artifact.path, project_root));

            self.add(absolute(&jar.path, project_root), sources, target.is_test);
        }
    }

    fn add(&mut self, jar: PathBuf, sources: Option<PathBuf>, test: bool) {
        if let Some(&position) = self.index.get(&jar) {
            let existing = &mut self.libraries[position];
            existing.test &= test;
            if existing.sources.is_none() {
                existing.sources = sources;
            }
            return;
        }
        let optional = !jar.exists();
        self.index.insert(jar.clone(), self.libraries.len());
        self.libraries.push(Library {
            jar,
            sources,
            test,
            optional,
        });
    }

    pub fn into_libraries(self) -> Vec<Library> {
        self.libraries
    }
}

fn absolute(path: &Path, project_root: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_root.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::raw::{Artifact, DependencyModule};
    use tempfile::TempDir;

    fn module(kind: &str, artifacts: Vec<(PathBuf, Option<&str>)>) -> DependencyModule {
        DependencyModule {
            name: "lib".to_string(),
            version: Some("1.0".to_string()),
            kind: kind.to_string(),
            artifacts: artifacts
                .into_iter()
                .map(|(path, classifier)| Artifact {
                    path,
                    classifier: classifier.map(str::to_string),
                })
                .collect(),
        }
    }

    fn target(is_test: bool, modules: Vec<DependencyModule>) -> RawTarget {
        RawTarget {
            id: if is_test { "test" } else { "main" }.to_string(),
            is_test,
            dependency_modules: modules,
            ..Default::default()
        }
    }

    #[test]
    fn test_shared_jar_is_not_test_only() {
        let temp_dir = TempDir::new().unwrap();
        let jar = temp_dir.path().join("guava.jar");
        std::fs::write(&jar, b"").unwrap();

        let mut merger = LibraryMerger::default();
        merger.add_target(&target(true, vec![module("maven", vec![(jar.clone(), None)])]), temp_dir.path());
        merger.add_target(&target(false, vec![module("maven", vec![(jar.clone(), None)])]), temp_dir.path());

        let libraries = merger.into_libraries();
        assert_eq!(libraries.len(), 1);
        assert!(!libraries[0].test);
        assert!(!libraries[0].optional);
    }

    #[test]
    fn test_test_only_jar_and_missing_jar() {
        let temp_dir = TempDir::new().unwrap();
        let jar = temp_dir.path().join("junit.jar");
        let sources = temp_dir.path().join("junit-sources.jar");

        let mut merger = LibraryMerger::default();
        merger.add_target(
            &target(
                true,
                vec![module(
                    "maven",
                    vec![(jar.clone(), None), (sources.clone(), Some("sources"))],
                )],
            ),
            temp_dir.path(),
        );
        let libraries = merger.into_libraries();
        assert_eq!(
            libraries,
            vec![Library {
                jar,
                sources: Some(sources),
                test: true,
                optional: true,
            }]
        );
    }

    #[test]
    fn test_non_artifact_modules_are_skipped() {
        let mut merger = LibraryMerger::default();
        merger.add_target(
            &target(false, vec![module("project", vec![(PathBuf::from("/x.jar"), None)])]),
            Path::new("/ws"),
        );
        merger.add_target(
            &target(
                false,
                vec![module(
                    "maven",
                    vec![(PathBuf::from("/y-sources.jar"), Some("sources"))],
                )],
            ),
            Path::new("/ws"),
        );
        assert!(merger.into_libraries().is_empty());
    }
}
