//! JVM toolchain selection across targets

use super::{model::JvmToolchain, raw::RawTarget};
use crate::error::{Error, Result};
use std::cmp::Ordering;
use tracing::debug;

/// Map legacy `1.x` versions to `x`; other versions are returned trimmed
pub fn normalize_version(version: &str) -> String {
    let version = version.trim();
    match version.strip_prefix("1.") {
        Some(rest) if !rest.is_empty() && !rest.contains('.') => rest.to_string(),
        _ => version.to_string(),
    }
}

/// Compare dotted versions numerically, component by component.
///
/// Missing components count as zero and non-numeric components compare as
/// text, so `"17" > "11"` and `"17.0.2" > "17"`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let a = normalize_version(a);
    let b = normalize_version(b);
    let mut left = a.split(['.', '_', '-', '+']);
    let mut right = b.split(['.', '_', '-', '+']);
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (l, r) => {
                let l = l.unwrap_or("0");
                let r = r.unwrap_or("0");
                let ordering = match (l.parse::<u64>(), r.parse::<u64>()) {
                    (Ok(l), Ok(r)) => l.cmp(&r),
                    (Ok(_), Err(_)) => Ordering::Greater,
                    (Err(_), Ok(_)) => Ordering::Less,
                    (Err(_), Err(_)) => l.cmp(r),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}

/// Pick the highest-versioned toolchain among JVM-kind targets.
///
/// Fails when no target carries both a home and a version.
pub fn select_toolchain(targets: &[RawTarget]) -> Result<JvmToolchain> {
    let mut best: Option<JvmToolchain> = None;
    for target in targets {
        let Some(jvm) = &target.jvm else {
            continue;
        };
        let (Some(home), Some(version)) = (&jvm.java_home, &jvm.java_version) else {
            debug!("target {} has incomplete JVM metadata", target.id);
            continue;
        };
        if home.as_os_str().is_empty() || version.trim().is_empty() {
            debug!("target {} has blank JVM home or version", target.id);
            continue;
        }
        let candidate = JvmToolchain {
            home: home.clone(),
            version: normalize_version(version),
        };
        best = match best {
            Some(current)
                if compare_versions(&current.version, &candidate.version) != Ordering::Less =>
            {
                Some(current)
            }
            _ => Some(candidate),
        };
    }

    best.ok_or_else(|| {
        Error::ResolutionError("no JVM toolchain reported by any build target".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::raw::JvmTargetInfo;
    use std::path::PathBuf;

    fn jvm_target(id: &str, version: &str) -> RawTarget {
        RawTarget {
            id: id.to_string(),
            jvm: Some(JvmTargetInfo {
                java_home: Some(PathBuf::from(format!("/jdks/{version}"))),
                java_version: Some(version.to_string()),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_normalize_legacy_versions() {
        assert_eq!(normalize_version("1.8"), "8");
        assert_eq!(normalize_version("1.9"), "9");
        assert_eq!(normalize_version("17"), "17");
        assert_eq!(normalize_version(" 21.0.1 "), "21.0.1");
    }

    #[test]
    fn test_numeric_comparison() {
        assert_eq!(compare_versions("17", "11"), Ordering::Greater);
        assert_eq!(compare_versions("9", "10"), Ordering::Less);
        assert_eq!(compare_versions("1.9", "9"), Ordering::Equal);
        assert_eq!(compare_versions("17.0.2", "17"), Ordering::Greater);
    }

    #[test]
    fn test_selects_highest_version() {
        let targets = vec![
            jvm_target("a", "11"),
            jvm_target("b", "1.9"),
            jvm_target("c", "17"),
        ];
        let toolchain = select_toolchain(&targets).unwrap();
        assert_eq!(toolchain.version, "17");
        assert_eq!(toolchain.home, PathBuf::from("/jdks/17"));
    }

    #[test]
    fn test_single_legacy_version_is_normalized() {
        let toolchain = select_toolchain(&[jvm_target("a", "1.9")]).unwrap();
        assert_eq!(toolchain.version, "9");
    }

    fn jvm_info(id: &str, home: &str, version: &str) -> RawTarget {
        RawTarget {
            id: id.to_string(),
            jvm: Some(JvmTargetInfo {
                java_home: Some(PathBuf::from(home)),
                java_version: Some(version.to_string()),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_blank_version_is_skipped() {
        let err = select_toolchain(&[jvm_info("a", "/jdks/17", "  ")]).unwrap_err();
        assert!(matches!(err, Error::ResolutionError(_)));
    }

    #[test]
    fn test_blank_home_never_wins() {
        let targets = vec![jvm_info("a", "/jdks/11", "11"), jvm_info("b", "", "21")];
        let toolchain = select_toolchain(&targets).unwrap();
        assert_eq!(toolchain.version, "11");
        assert_eq!(toolchain.home, PathBuf::from("/jdks/11"));
    }

    #[test]
    fn test_no_jvm_targets_is_resolution_error() {
        let targets = vec![RawTarget {
            id: "docs".to_string(),
            ..Default::default()
        }];
        let err = select_toolchain(&targets).unwrap_err();
        assert!(matches!(err, Error::ResolutionError(_)));
    }
}
