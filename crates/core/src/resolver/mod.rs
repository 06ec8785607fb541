//! Turns raw build-target metadata into a normalized project model

pub mod dependencies;
pub mod jpms;
pub mod model;
pub mod modules;
pub mod raw;
pub mod sources;
pub mod toolchain;

pub use jpms::{JpmsArgs, JpmsAttribute, JpmsDirective};
pub use model::{
    Attributes, ClasspathEntry, JvmToolchain, LinkedFolder, ProjectModel, TargetModel,
};
pub use modules::{FsModuleInspector, ModuleInspector};
pub use raw::{DependencyNode, RawProject, RawTarget};

use crate::error::Result;
use dependencies::LibraryMerger;
use sources::{PathMapper, target_entries};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct Resolver<'a> {
    project_root: &'a Path,
    workspace_root: &'a Path,
    inspector: &'a dyn ModuleInspector,
}

impl<'a> Resolver<'a> {
    /// `workspace_root` defaults to the project root
    pub fn new(
        project_root: &'a Path,
        workspace_root: Option<&'a Path>,
        inspector: &'a dyn ModuleInspector,
    ) -> Self {
        Self {
            project_root,
            workspace_root: workspace_root.unwrap_or(project_root),
            inspector,
        }
    }

    /// Resolve the full model. Fails only when no toolchain can be selected.
    pub fn resolve(&self, raw: RawProject) -> Result<ProjectModel> {
        let toolchain = toolchain::select_toolchain(&raw.targets)?;
        debug!(
            "resolving {} targets with toolchain {}",
            raw.targets.len(),
            toolchain.version
        );

        // Non-test targets first; their source paths win over duplicates in test targets
        let mut targets = raw.targets;
        targets.sort_by_key(|target| target.is_test);

        let mapper = PathMapper::new(self.project_root, self.workspace_root);
        let mut merger = LibraryMerger::default();
        let mut pool = JpmsArgs::default();

        let mut models = Vec::with_capacity(targets.len());
        let mut sources = Vec::new();
        let mut resources = Vec::new();
        let mut linked_folders = Vec::new();
        let mut seen_paths: HashSet<PathBuf> = HashSet::new();
        let mut seen_links: HashSet<String> = HashSet::new();

        for target in &targets {
            let entries = target_entries(target, &mapper);

            for entry in entries.sources.iter().chain(&entries.resources) {
                let Some(path) = entry.location() else {
                    continue;
                };
                if !seen_paths.insert(path.clone()) {
                    continue;
                }
                match entry {
                    ClasspathEntry::Resource { .. } => resources.push(entry.clone()),
                    _ => sources.push(entry.clone()),
                }
            }
            for folder in entries.linked_folders {
                if seen_links.insert(folder.name.clone()) {
                    linked_folders.push(folder);
                }
            }

            merger.add_target(target, self.project_root);
            pool.collect(&target.compiler_args);

            models.push(TargetModel {
                id: target.id.clone(),
                is_test: target.is_test,
                source_entries: entries.sources,
                resource_entries: entries.resources,
                toolchain: toolchain.clone(),
                extra_args: target.compiler_args.clone(),
            });
        }

        let mut container = ClasspathEntry::Container {
            toolchain_ref: toolchain.container_ref(),
            attributes: Attributes::default(),
        };
        if !pool.is_empty() {
            let provided = self.inspector.toolchain_modules(&toolchain.home);
            container.attributes_mut().jpms = pool.take_for_modules(&provided);
        }

        let mut libraries = Vec::new();
        for library in merger.into_libraries() {
            let attach = !pool.is_empty() && !library.optional;
            let jar = library.jar.clone();
            let mut entry = library.into_entry();
            if attach {
                let provided = self.inspector.jar_modules(&jar);
                entry.attributes_mut().jpms = pool.take_for_modules(&provided);
            }
            libraries.push(entry);
        }

        if !pool.is_empty() {
            debug!(
                "module directives for {:?} matched no classpath entry",
                pool.pending_modules()
            );
        }

        let mut classpath = sources;
        classpath.extend(resources);
        classpath.extend(libraries);
        classpath.push(container);

        Ok(ProjectModel {
            project_root: self.project_root.to_path_buf(),
            targets: models,
            toolchain,
            classpath,
            linked_folders,
        })
    }
}
