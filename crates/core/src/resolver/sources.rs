//! Maps target sources and resources onto model-relative locations

use super::{
    model::{Attributes, ClasspathEntry, LinkedFolder},
    raw::RawTarget,
};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Directory name marking build-tool generated content
const BUILD_DIR: &str = "build";

/// Where a source path lands in the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// Relative to the project root
    Project(PathBuf),
    /// Outside the root; represented by a linked folder
    Linked(LinkedFolder),
}

impl Location {
    pub fn path(&self) -> PathBuf {
        match self {
            Location::Project(path) => path.clone(),
            Location::Linked(folder) => PathBuf::from(&folder.name),
        }
    }
}

pub struct PathMapper<'a> {
    project_root: &'a Path,
    workspace_root: &'a Path,
}

impl<'a> PathMapper<'a> {
    pub fn new(project_root: &'a Path, workspace_root: &'a Path) -> Self {
        Self {
            project_root,
            workspace_root,
        }
    }

    /// Absolute and lexically normalized, so `..` cannot hide a foreign path
    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            normalize(path)
        } else {
            normalize(&self.project_root.join(path))
        }
    }

    /// Map a source path. Paths under neither the project nor the workspace root are unplaceable.
    pub fn map_source(&self, path: &Path) -> Option<Location> {
        let absolute = self.absolute(path);
        if let Ok(relative) = absolute.strip_prefix(self.project_root) {
            return Some(Location::Project(relative.to_path_buf()));
        }
        let relative = absolute.strip_prefix(self.workspace_root).ok()?;
        let name = segments(relative).join("_");
        if name.is_empty() {
            return None;
        }
        Some(Location::Linked(LinkedFolder {
            name,
            target: absolute,
        }))
    }

    /// Map a resource path; resources are never linked from outside the root
    pub fn map_resource(&self, path: &Path) -> Option<PathBuf> {
        self.absolute(path)
            .strip_prefix(self.project_root)
            .ok()
            .map(Path::to_path_buf)
    }

    /// True when the mapped path runs through a directory literally named `build`
    pub fn is_build_output(&self, path: &Path) -> bool {
        let absolute = self.absolute(path);
        let relative = absolute
            .strip_prefix(self.project_root)
            .or_else(|_| absolute.strip_prefix(self.workspace_root))
            .unwrap_or(&absolute);
        segments(relative).contains(&BUILD_DIR)
    }
}

/// Drop `.` and fold `..` into its parent without touching the file system.
///
/// `..` above the file-system root stays at the root.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => normalized.push(".."),
            },
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

fn segments(path: &Path) -> Vec<&str> {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(segment) => segment.to_str(),
            _ => None,
        })
        .collect()
}

/// Entries contributed by one target
#[derive(Debug, Default)]
pub struct TargetEntries {
    pub sources: Vec<ClasspathEntry>,
    pub resources: Vec<ClasspathEntry>,
    pub linked_folders: Vec<LinkedFolder>,
}

/// Build the source and resource entries for a target.
///
/// Missing or generated sources and anything under a `build` directory are OPTIONAL;
/// resources are always OPTIONAL. Test targets mark their entries TEST.
pub fn target_entries(target: &RawTarget, mapper: &PathMapper<'_>) -> TargetEntries {
    let mut entries = TargetEntries::default();
    let output_path = output_path_of(target, "source");
    let resource_output = output_path_of(target, "resource").or_else(|| output_path.clone());
    let mut seen: HashSet<PathBuf> = HashSet::new();

    let sources = match &output_path {
        Some(_) => target.sources.as_slice(),
        None => {
            if !target.sources.is_empty() {
                debug!("target {} has no source output path; skipping its sources", target.id);
            }
            &[]
        }
    };

    for source in sources {
        let Some(location) = mapper.map_source(&source.path) else {
            debug!(
                "skipping source {} of {}: outside project and workspace",
                source.path.display(),
                target.id
            );
            continue;
        };
        let path = location.path();
        if !seen.insert(path.clone()) {
            continue;
        }
        if let Location::Linked(folder) = location {
            entries.linked_folders.push(folder);
        }
        let optional = source.generated
            || !mapper.absolute(&source.path).exists()
            || mapper.is_build_output(&source.path);
        entries.sources.push(ClasspathEntry::Source {
            path,
            output_path: output_path.clone(),
            attributes: Attributes::new(target.is_test, optional),
        });
    }

    for resource in &target.resources {
        let Some(path) = mapper.map_resource(&resource.path) else {
            debug!(
                "skipping resource {} of {}: outside project",
                resource.path.display(),
                target.id
            );
            continue;
        };
        if !seen.insert(path.clone()) {
            continue;
        }
        entries.resources.push(ClasspathEntry::Resource {
            path,
            output_path: resource_output.clone(),
            attributes: Attributes::new(target.is_test, true),
        });
    }

    entries
}

fn output_path_of(target: &RawTarget, kind: &str) -> Option<PathBuf> {
    target
        .output_paths
        .iter()
        .find(|output| output.kind == kind)
        .map(|output| output.path.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::raw::{OutputPath, ResourceItem, SourceItem};
    use tempfile::TempDir;

    fn source(path: &Path, generated: bool) -> SourceItem {
        SourceItem {
            path: path.to_path_buf(),
            generated,
        }
    }

    #[test]
    fn test_in_root_and_linked_mapping() {
        let mapper = PathMapper::new(Path::new("/ws/app"), Path::new("/ws"));
        assert_eq!(
            mapper.map_source(Path::new("/ws/app/src/main/java")),
            Some(Location::Project(PathBuf::from("src/main/java")))
        );
        assert_eq!(
            mapper.map_source(Path::new("/ws/shared/src/main/java")),
            Some(Location::Linked(LinkedFolder {
                name: "shared_src_main_java".to_string(),
                target: PathBuf::from("/ws/shared/src/main/java"),
            }))
        );
        assert_eq!(mapper.map_source(Path::new("/elsewhere/src")), None);
        assert_eq!(mapper.map_resource(Path::new("/ws/shared/res")), None);
    }

    #[test]
    fn test_parent_segments_cannot_escape_the_root() {
        let mapper = PathMapper::new(Path::new("/ws/app"), Path::new("/ws"));
        let expected = Location::Linked(LinkedFolder {
            name: "shared_src".to_string(),
            target: PathBuf::from("/ws/shared/src"),
        });
        assert_eq!(
            mapper.map_source(Path::new("/ws/app/../shared/src")),
            Some(expected.clone())
        );
        assert_eq!(mapper.map_source(Path::new("../shared/src")), Some(expected));
        assert_eq!(
            mapper.map_source(Path::new("./src/./main/java")),
            Some(Location::Project(PathBuf::from("src/main/java")))
        );
        assert_eq!(mapper.map_source(Path::new("/ws/../../etc")), None);
        assert_eq!(mapper.map_resource(Path::new("/ws/app/../res")), None);
    }

    #[test]
    fn test_target_entries() {
        let temp_dir = TempDir::new().unwrap();
        let ws = temp_dir.path().join("ws");
        let app = ws.join("app");
        for dir in [
            app.join("src/test/java"),
            app.join("build/generated/sources/test"),
            app.join("gen"),
            ws.join("shared/src/test/java"),
        ] {
            std::fs::create_dir_all(dir).unwrap();
        }

        let mapper = PathMapper::new(&app, &ws);
        let target = RawTarget {
            id: "app:test".to_string(),
            is_test: true,
            output_paths: vec![OutputPath {
                kind: "source".to_string(),
                path: app.join("build/classes/java/test"),
            }],
            sources: vec![
                source(&app.join("src/test/java"), false),
                source(&app.join("src/test/java"), false),
                source(&app.join("build/generated/sources/test"), false),
                source(&app.join("gen"), true),
                source(&app.join("src/missing"), false),
                source(Path::new("/tmp/stray"), false),
                source(&ws.join("shared/src/test/java"), false),
            ],
            resources: vec![ResourceItem {
                path: app.join("src/test/resources"),
            }],
            ..Default::default()
        };

        let entries = target_entries(&target, &mapper);
        let flags: Vec<(PathBuf, bool, bool)> = entries
            .sources
            .iter()
            .map(|entry| {
                let attrs = entry.attributes();
                (entry.location().unwrap().clone(), attrs.test, attrs.optional)
            })
            .collect();
        assert_eq!(
            flags,
            vec![
                (PathBuf::from("src/test/java"), true, false),
                (PathBuf::from("build/generated/sources/test"), true, true),
                (PathBuf::from("gen"), true, true),
                (PathBuf::from("src/missing"), true, true),
                (PathBuf::from("shared_src_test_java"), true, false),
            ]
        );
        assert_eq!(entries.linked_folders.len(), 1);

        assert_eq!(entries.resources.len(), 1);
        let resource = &entries.resources[0];
        assert!(resource.attributes().optional);
        assert!(matches!(
            resource,
            ClasspathEntry::Resource { output_path: Some(out), .. }
                if *out == app.join("build/classes/java/test")
        ));
    }

    #[test]
    fn test_target_without_source_output_skips_sources() {
        let mapper = PathMapper::new(Path::new("/ws/app"), Path::new("/ws"));
        let target = RawTarget {
            id: "app:main".to_string(),
            sources: vec![source(Path::new("/ws/app/src/main/java"), false)],
            resources: vec![ResourceItem {
                path: PathBuf::from("/ws/app/src/main/resources"),
            }],
            ..Default::default()
        };
        let entries = target_entries(&target, &mapper);
        assert!(entries.sources.is_empty());
        assert_eq!(entries.resources.len(), 1);
    }
}
