//! Discovers which modules a jar or a JVM installation provides

use crate::error::Result;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Reports module names for classpath entries.
///
/// Lookups never fail: anything unreadable simply provides no modules.
pub trait ModuleInspector: Send + Sync {
    fn jar_modules(&self, jar: &Path) -> BTreeSet<String>;
    fn toolchain_modules(&self, home: &Path) -> BTreeSet<String>;
}

/// Reads module descriptors from the file system
#[derive(Debug, Default, Clone, Copy)]
pub struct FsModuleInspector;

impl ModuleInspector for FsModuleInspector {
    fn jar_modules(&self, jar: &Path) -> BTreeSet<String> {
        match jar_module_name(jar) {
            Ok(Some(name)) => BTreeSet::from([name]),
            Ok(None) => BTreeSet::new(),
            Err(e) => {
                debug!("cannot inspect {}: {}", jar.display(), e);
                BTreeSet::new()
            }
        }
    }

    fn toolchain_modules(&self, home: &Path) -> BTreeSet<String> {
        let release = home.join("release");
        match std::fs::read_to_string(&release) {
            Ok(content) => release_modules(&content),
            Err(e) => {
                debug!("cannot read {}: {}", release.display(), e);
                BTreeSet::new()
            }
        }
    }
}

/// Parse the `MODULES="..."` line of a JDK `release` file
pub fn release_modules(content: &str) -> BTreeSet<String> {
    content
        .lines()
        .find_map(|line| line.trim().strip_prefix("MODULES="))
        .map(|value| {
            value
                .trim_matches('"')
                .split_whitespace()
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn jar_module_name(jar: &Path) -> Result<Option<String>> {
    let mut archive = zip::ZipArchive::new(File::open(jar)?)?;

    let descriptor = if archive.index_for_name("module-info.class").is_some() {
        Some("module-info.class".to_string())
    } else {
        versioned_descriptor(archive.file_names())
    };

    if let Some(name) = descriptor {
        let mut bytes = Vec::new();
        archive.by_name(&name)?.read_to_end(&mut bytes)?;
        if let Some(module) = module_info_name(&bytes) {
            return Ok(Some(module));
        }
        debug!("unreadable {} in {}", name, jar.display());
    }

    if archive.index_for_name("META-INF/MANIFEST.MF").is_none() {
        return Ok(None);
    }
    let mut manifest = String::new();
    archive
        .by_name("META-INF/MANIFEST.MF")?
        .read_to_string(&mut manifest)?;
    Ok(automatic_module_name(&manifest))
}

/// Highest `META-INF/versions/N/module-info.class` in a multi-release jar
fn versioned_descriptor<'a>(names: impl Iterator<Item = &'a str>) -> Option<String> {
    names
        .filter_map(|name| {
            let version = name
                .strip_prefix("META-INF/versions/")?
                .strip_suffix("/module-info.class")?
                .parse::<u32>()
                .ok()?;
            Some((version, name.to_string()))
        })
        .max_by_key(|(version, _)| *version)
        .map(|(_, name)| name)
}

pub fn automatic_module_name(manifest: &str) -> Option<String> {
    manifest.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        (key.trim() == "Automatic-Module-Name")
            .then(|| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

/// Read the module name out of a compiled `module-info.class`
pub fn module_info_name(bytes: &[u8]) -> Option<String> {
    let mut reader = ClassReader { bytes, pos: 0 };
    if reader.u32()? != 0xCAFE_BABE {
        return None;
    }
    reader.skip(4)?; // minor, major

    let count = reader.u16()? as usize;
    let mut pool: Vec<Constant> = vec![Constant::Unused; count];
    let mut index = 1;
    while index < count {
        let tag = reader.u8()?;
        let (constant, width) = match tag {
            1 => {
                let len = reader.u16()? as usize;
                let text = String::from_utf8_lossy(reader.take(len)?).into_owned();
                (Constant::Utf8(text), 1)
            }
            7 | 19 => (Constant::Named(reader.u16()?), 1),
            8 | 16 | 20 => {
                reader.skip(2)?;
                (Constant::Unused, 1)
            }
            15 => {
                reader.skip(3)?;
                (Constant::Unused, 1)
            }
            3 | 4 | 9 | 10 | 11 | 12 | 17 | 18 => {
                reader.skip(4)?;
                (Constant::Unused, 1)
            }
            5 | 6 => {
                reader.skip(8)?;
                (Constant::Unused, 2)
            }
            _ => return None,
        };
        pool[index] = constant;
        index += width;
    }

    reader.skip(6)?; // access flags, this, super
    let interfaces = reader.u16()? as usize;
    reader.skip(interfaces * 2)?;
    for _ in 0..2 {
        // fields, then methods
        let members = reader.u16()?;
        for _ in 0..members {
            reader.skip(6)?;
            reader.skip_attributes()?;
        }
    }

    let attributes = reader.u16()?;
    for _ in 0..attributes {
        let name = reader.u16()? as usize;
        let len = reader.u32()? as usize;
        let body = reader.take(len)?;
        if matches!(pool.get(name), Some(Constant::Utf8(n)) if n == "Module") {
            let module_index = u16::from_be_bytes([*body.first()?, *body.get(1)?]) as usize;
            let Some(Constant::Named(name_index)) = pool.get(module_index) else {
                return None;
            };
            return match pool.get(*name_index as usize) {
                Some(Constant::Utf8(name)) => Some(name.clone()),
                _ => None,
            };
        }
    }
    None
}

#[derive(Debug, Clone)]
enum Constant {
    Unused,
    Utf8(String),
    /// Class or Module entry pointing at a Utf8 name
    Named(u16),
}

struct ClassReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ClassReader<'a> {
    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(len)?;
        let slice = self.bytes.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    fn skip(&mut self, len: usize) -> Option<()> {
        self.take(len).map(|_| ())
    }

    fn u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    fn u16(&mut self) -> Option<u16> {
        self.take(2).map(|b| u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Option<u32> {
        self.take(4).map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn skip_attributes(&mut self) -> Option<()> {
        let count = self.u16()?;
        for _ in 0..count {
            self.skip(2)?;
            let len = self.u32()? as usize;
            self.skip(len)?;
        }
        Some(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::Error;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    /// Minimal module-info.class declaring `name`
    pub(crate) fn module_info_class(name: &str) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&0xCAFE_BABEu32.to_be_bytes());
        out.extend_from_slice(&[0, 0, 0, 53]);
        out.extend_from_slice(&6u16.to_be_bytes()); // 5 constants

        let utf8 = |out: &mut Vec<u8>, text: &str| {
            out.push(1);
            out.extend_from_slice(&(text.len() as u16).to_be_bytes());
            out.extend_from_slice(text.as_bytes());
        };
        utf8(&mut out, "Module"); // #1
        utf8(&mut out, name); // #2
        out.push(19); // #3 Module -> #2
        out.extend_from_slice(&2u16.to_be_bytes());
        utf8(&mut out, "module-info"); // #4
        out.push(7); // #5 Class -> #4
        out.extend_from_slice(&4u16.to_be_bytes());

        out.extend_from_slice(&0x8000u16.to_be_bytes()); // ACC_MODULE
        out.extend_from_slice(&5u16.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&[0, 0, 0, 0, 0, 0]); // interfaces, fields, methods

        out.extend_from_slice(&1u16.to_be_bytes());
        out.extend_from_slice(&1u16.to_be_bytes());
        out.extend_from_slice(&16u32.to_be_bytes());
        out.extend_from_slice(&3u16.to_be_bytes());
        out.extend_from_slice(&[0; 14]);
        out
    }

    pub(crate) fn write_jar(path: &Path, entries: &[(&str, &[u8])]) {
        let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_module_info_name() {
        let bytes = module_info_class("com.acme.core");
        assert_eq!(module_info_name(&bytes), Some("com.acme.core".to_string()));
        assert_eq!(module_info_name(&bytes[..20]), None);
        assert_eq!(module_info_name(b"not a class"), None);
    }

    #[test]
    fn test_jar_with_descriptor() {
        let temp_dir = TempDir::new().unwrap();
        let jar = temp_dir.path().join("core.jar");
        write_jar(&jar, &[("module-info.class", module_info_class("com.acme.core").as_slice())]);

        let modules = FsModuleInspector.jar_modules(&jar);
        assert_eq!(modules, BTreeSet::from(["com.acme.core".to_string()]));
    }

    #[test]
    fn test_multi_release_descriptor() {
        let temp_dir = TempDir::new().unwrap();
        let jar = temp_dir.path().join("mr.jar");
        write_jar(
            &jar,
            &[
                (
                    "META-INF/versions/9/module-info.class",
                    module_info_class("old.name").as_slice(),
                ),
                (
                    "META-INF/versions/11/module-info.class",
                    module_info_class("new.name").as_slice(),
                ),
            ],
        );
        assert!(FsModuleInspector.jar_modules(&jar).contains("new.name"));
    }

    #[test]
    fn test_automatic_module_name() {
        let temp_dir = TempDir::new().unwrap();
        let jar = temp_dir.path().join("auto.jar");
        write_jar(
            &jar,
            &[(
                "META-INF/MANIFEST.MF",
                &b"Manifest-Version: 1.0\r\nAutomatic-Module-Name: org.example.util\r\n"[..],
            )],
        );
        assert!(FsModuleInspector.jar_modules(&jar).contains("org.example.util"));
    }

    #[test]
    fn test_missing_or_plain_jar_has_no_modules() {
        let temp_dir = TempDir::new().unwrap();
        assert!(
            FsModuleInspector
                .jar_modules(&temp_dir.path().join("absent.jar"))
                .is_empty()
        );

        let jar = temp_dir.path().join("plain.jar");
        write_jar(&jar, &[("com/acme/A.class", &b"\xca\xfe"[..])]);
        assert!(FsModuleInspector.jar_modules(&jar).is_empty());
    }

    #[test]
    fn test_unreadable_jar_errors_are_typed() {
        let temp_dir = TempDir::new().unwrap();
        let missing = jar_module_name(&temp_dir.path().join("absent.jar"));
        assert!(matches!(missing, Err(Error::IoError(_))));

        let corrupt = temp_dir.path().join("corrupt.jar");
        std::fs::write(&corrupt, b"definitely not a zip archive").unwrap();
        assert!(matches!(
            jar_module_name(&corrupt),
            Err(Error::ArchiveError(_))
        ));
    }

    #[test]
    fn test_toolchain_release_file() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join("release"),
            "JAVA_VERSION=\"17.0.2\"\nMODULES=\"java.base java.logging jdk.unsupported\"\n",
        )
        .unwrap();

        let modules = FsModuleInspector.toolchain_modules(temp_dir.path());
        assert_eq!(modules.len(), 3);
        assert!(modules.contains("java.base"));
        assert!(FsModuleInspector.toolchain_modules(Path::new("/nonexistent")).is_empty());
    }
}
