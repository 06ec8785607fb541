//! Normalized project model produced by the resolver

use super::jpms::JpmsAttribute;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attributes {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub test: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub jpms: Vec<JpmsAttribute>,
}

impl Attributes {
    pub fn new(test: bool, optional: bool) -> Self {
        Self {
            test,
            optional,
            jpms: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entryKind", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum ClasspathEntry {
    Source {
        /// Model-relative location; a linked folder name for foreign paths
        path: PathBuf,
        #[serde(skip_serializing_if = "Option::is_none")]
        output_path: Option<PathBuf>,
        attributes: Attributes,
    },
    Resource {
        path: PathBuf,
        #[serde(skip_serializing_if = "Option::is_none")]
        output_path: Option<PathBuf>,
        attributes: Attributes,
    },
    Library {
        jar_path: PathBuf,
        #[serde(skip_serializing_if = "Option::is_none")]
        source_jar_path: Option<PathBuf>,
        attributes: Attributes,
    },
    Container {
        toolchain_ref: String,
        attributes: Attributes,
    },
}

impl ClasspathEntry {
    pub fn attributes(&self) -> &Attributes {
        match self {
            ClasspathEntry::Source { attributes, .. }
            | ClasspathEntry::Resource { attributes, .. }
            | ClasspathEntry::Library { attributes, .. }
            | ClasspathEntry::Container { attributes, .. } => attributes,
        }
    }

    pub fn attributes_mut(&mut self) -> &mut Attributes {
        match self {
            ClasspathEntry::Source { attributes, .. }
            | ClasspathEntry::Resource { attributes, .. }
            | ClasspathEntry::Library { attributes, .. }
            | ClasspathEntry::Container { attributes, .. } => attributes,
        }
    }

    /// Path for source/resource entries
    pub fn location(&self) -> Option<&PathBuf> {
        match self {
            ClasspathEntry::Source { path, .. } | ClasspathEntry::Resource { path, .. } => {
                Some(path)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JvmToolchain {
    pub home: PathBuf,
    pub version: String,
}

impl JvmToolchain {
    /// Reference used by the toolchain container entry
    pub fn container_ref(&self) -> String {
        format!("JavaSE-{}", self.version)
    }
}

/// Synthetic folder standing in for a source directory outside the project root
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedFolder {
    pub name: String,
    pub target: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetModel {
    pub id: String,
    pub is_test: bool,
    pub source_entries: Vec<ClasspathEntry>,
    pub resource_entries: Vec<ClasspathEntry>,
    pub toolchain: JvmToolchain,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectModel {
    pub project_root: PathBuf,
    pub targets: Vec<TargetModel>,
    pub toolchain: JvmToolchain,
    /// Merged classpath: sources, resources, libraries, then the toolchain container
    pub classpath: Vec<ClasspathEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub linked_folders: Vec<LinkedFolder>,
}

impl ProjectModel {
    pub fn libraries(&self) -> impl Iterator<Item = &ClasspathEntry> {
        self.classpath
            .iter()
            .filter(|entry| matches!(entry, ClasspathEntry::Library { .. }))
    }

    pub fn library(&self, jar: &std::path::Path) -> Option<&ClasspathEntry> {
        self.libraries().find(|entry| {
            matches!(entry, ClasspathEntry::Library { jar_path, .. } if jar_path == jar)
        })
    }

    pub fn container(&self) -> Option<&ClasspathEntry> {
        self.classpath
            .iter()
            .find(|entry| matches!(entry, ClasspathEntry::Container { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::jpms::JpmsDirective;

    #[test]
    fn test_classpath_wire_shape() {
        let classpath = vec![
            ClasspathEntry::Library {
                jar_path: PathBuf::from("/repo/junit.jar"),
                source_jar_path: None,
                attributes: Attributes::new(true, true),
            },
            ClasspathEntry::Container {
                toolchain_ref: "JavaSE-17".to_string(),
                attributes: Attributes {
                    jpms: vec![JpmsAttribute {
                        directive: JpmsDirective::AddExports,
                        module: "java.base".to_string(),
                        value: "java.base/sun.nio.ch=ALL-UNNAMED".to_string(),
                    }],
                    ..Attributes::default()
                },
            },
        ];
        insta::assert_snapshot!(serde_json::to_string_pretty(&classpath).unwrap(), @r#"
        [
          {
            "entryKind": "LIBRARY",
            "jarPath": "/repo/junit.jar",
            "attributes": {
              "test": true,
              "optional": true
            }
          },
          {
            "entryKind": "CONTAINER",
            "toolchainRef": "JavaSE-17",
            "attributes": {
              "jpms": [
                {
                  "directive": "add-exports",
                  "module": "java.base",
                  "value": "java.base/sun.nio.ch=ALL-UNNAMED"
                }
              ]
            }
          }
        ]
        "#);
    }
}
