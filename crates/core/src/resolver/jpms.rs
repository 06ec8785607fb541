//! Module-system directives carried in compiler arguments

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JpmsDirective {
    AddExports,
    AddOpens,
    AddReads,
    PatchModule,
}

impl JpmsDirective {
    pub const ALL: [JpmsDirective; 4] = [
        JpmsDirective::AddExports,
        JpmsDirective::AddOpens,
        JpmsDirective::AddReads,
        JpmsDirective::PatchModule,
    ];

    pub fn flag(&self) -> &'static str {
        match self {
            JpmsDirective::AddExports => "--add-exports",
            JpmsDirective::AddOpens => "--add-opens",
            JpmsDirective::AddReads => "--add-reads",
            JpmsDirective::PatchModule => "--patch-module",
        }
    }

    fn from_flag(flag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|directive| directive.flag() == flag)
    }

    /// Module a directive value applies to.
    ///
    /// `--add-exports java.base/sun.nio.ch=ALL-UNNAMED` names its module
    /// before the `/`; `--add-reads` and `--patch-module` before the `=`.
    fn module_of<'a>(&self, value: &'a str) -> Option<&'a str> {
        let separator = match self {
            JpmsDirective::AddExports | JpmsDirective::AddOpens => '/',
            JpmsDirective::AddReads | JpmsDirective::PatchModule => '=',
        };
        value
            .split_once(separator)
            .map(|(module, _)| module)
            .filter(|module| !module.is_empty())
    }
}

/// Aggregated directive values attached to one classpath entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JpmsAttribute {
    pub directive: JpmsDirective,
    pub module: String,
    /// All values for this (directive, module), joined with `:`
    pub value: String,
}

/// Directives collected from every target, grouped by kind and module
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct JpmsArgs {
    groups: BTreeMap<(JpmsDirective, String), Vec<String>>,
}

impl JpmsArgs {
    /// Collect directives from one argument list into the pool
    pub fn collect(&mut self, args: &[String]) {
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            let (flag, attached) = match arg.split_once('=') {
                Some((flag, value)) if flag.starts_with("--") => (flag, Some(value)),
                _ => (arg.as_str(), None),
            };
            let Some(directive) = JpmsDirective::from_flag(flag) else {
                continue;
            };
            let value = match attached {
                Some(value) => value,
                None => match iter.next() {
                    Some(value) => value.as_str(),
                    None => {
                        debug!("{} without a value", flag);
                        continue;
                    }
                },
            };
            self.add(directive, value);
        }
    }

    pub fn parse(args: &[String]) -> Self {
        let mut pool = Self::default();
        pool.collect(args);
        pool
    }

    fn add(&mut self, directive: JpmsDirective, value: &str) {
        let Some(module) = directive.module_of(value) else {
            debug!("ignoring malformed {} value '{}'", directive.flag(), value);
            return;
        };
        let values = self
            .groups
            .entry((directive, module.to_string()))
            .or_default();
        if !values.iter().any(|existing| existing == value) {
            values.push(value.to_string());
        }
    }

    /// Remove and return every group whose module is in `modules`.
    ///
    /// Each directive kind draws only from its own groups, so a module that
    /// is both exported and opened yields two attributes.
    pub fn take_for_modules(&mut self, modules: &BTreeSet<String>) -> Vec<JpmsAttribute> {
        if modules.is_empty() {
            return Vec::new();
        }
        let matched: Vec<(JpmsDirective, String)> = self
            .groups
            .keys()
            .filter(|(_, module)| modules.contains(module))
            .cloned()
            .collect();

        matched
            .into_iter()
            .filter_map(|key| {
                let values = self.groups.remove(&key)?;
                Some(JpmsAttribute {
                    directive: key.0,
                    module: key.1,
                    value: values.join(":"),
                })
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Modules that still have unattached directives
    pub fn pending_modules(&self) -> BTreeSet<&str> {
        self.groups.keys().map(|(_, module)| module.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn modules(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_attached_and_separate_forms() {
        let mut pool = JpmsArgs::parse(&args(&[
            "--add-exports=java.base/sun.nio.ch=ALL-UNNAMED",
            "-parameters",
            "--add-exports",
            "java.base/jdk.internal.misc=ALL-UNNAMED",
            "--add-reads",
            "com.acme=ALL-UNNAMED",
        ]));

        let attrs = pool.take_for_modules(&modules(&["java.base"]));
        assert_eq!(
            attrs,
            vec![JpmsAttribute {
                directive: JpmsDirective::AddExports,
                module: "java.base".to_string(),
                value: "java.base/sun.nio.ch=ALL-UNNAMED:java.base/jdk.internal.misc=ALL-UNNAMED"
                    .to_string(),
            }]
        );
        assert_eq!(pool.pending_modules(), BTreeSet::from(["com.acme"]));
    }

    #[test]
    fn test_each_kind_aggregates_its_own_values() {
        let mut pool = JpmsArgs::parse(&args(&[
            "--add-exports=java.base/a=ALL-UNNAMED",
            "--add-opens=java.base/b=ALL-UNNAMED",
        ]));
        let attrs = pool.take_for_modules(&modules(&["java.base"]));

        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs[0].directive, JpmsDirective::AddExports);
        assert_eq!(attrs[0].value, "java.base/a=ALL-UNNAMED");
        assert_eq!(attrs[1].directive, JpmsDirective::AddOpens);
        assert_eq!(attrs[1].value, "java.base/b=ALL-UNNAMED");
    }

    #[test]
    fn test_taken_groups_are_removed() {
        let mut pool = JpmsArgs::parse(&args(&["--patch-module", "com.acme=src/patch"]));
        assert_eq!(pool.take_for_modules(&modules(&["com.acme"])).len(), 1);
        assert!(pool.take_for_modules(&modules(&["com.acme"])).is_empty());
        assert!(pool.is_empty());
    }

    #[test]
    fn test_duplicates_and_malformed_values() {
        let pool = JpmsArgs::parse(&args(&[
            "--add-opens=java.base/a=X",
            "--add-opens=java.base/a=X",
            "--add-opens=nomodule",
            "--add-reads",
        ]));
        let mut pool = pool;
        let attrs = pool.take_for_modules(&modules(&["java.base"]));
        assert_eq!(attrs[0].value, "java.base/a=X");
        assert!(pool.is_empty());
    }
}
