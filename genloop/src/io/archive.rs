//! Deliverable archives of a project's source (and optionally test) tree.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tracing::{info, instrument};
use walkdir::WalkDir;

use crate::io::fs::relative_key;
use crate::io::structure::ProjectStructure;

/// Prefix of test entries inside an archive built with tests.
pub const ARCHIVE_TESTS_PREFIX: &str = "tests";

pub fn archive_path(structure: &ProjectStructure, include_tests: bool) -> PathBuf {
    let name = if include_tests {
        format!("{}_with_tests.tar.gz", structure.project_name)
    } else {
        format!("{}.tar.gz", structure.project_name)
    };
    structure.base_path.join(name)
}

/// Package the source tree, and the test tree under `tests/` when asked,
/// into `<base>/<name>[_with_tests].tar.gz`.
#[instrument(skip_all, fields(include_tests = include_tests))]
pub fn create_project_archive(structure: &ProjectStructure, include_tests: bool) -> Result<PathBuf> {
    let path = archive_path(structure, include_tests);
    let file = File::create(&path).with_context(|| format!("create {}", path.display()))?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));

    append_tree(&mut builder, &structure.source_path, None)?;
    if include_tests {
        append_tree(&mut builder, &structure.tests_path, Some(ARCHIVE_TESTS_PREFIX))?;
    }

    let encoder = builder
        .into_inner()
        .with_context(|| format!("finish archive {}", path.display()))?;
    encoder
        .finish()
        .with_context(|| format!("flush archive {}", path.display()))?;
    info!(path = %path.display(), "created project archive");
    Ok(path)
}

/// Unpack an archive produced by [`create_project_archive`].
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest).with_context(|| format!("create directory {}", dest.display()))?;
    let file = File::open(archive).with_context(|| format!("open {}", archive.display()))?;
    tar::Archive::new(GzDecoder::new(file))
        .unpack(dest)
        .with_context(|| format!("unpack {}", archive.display()))
}

fn append_tree<W: std::io::Write>(
    builder: &mut tar::Builder<W>,
    root: &Path,
    prefix: Option<&str>,
) -> Result<()> {
    if !root.exists() {
        return Ok(());
    }
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = relative_key(root, entry.path())?;
        let name = match prefix {
            Some(prefix) => format!("{prefix}/{rel}"),
            None => rel,
        };
        builder
            .append_path_with_name(entry.path(), &name)
            .with_context(|| format!("append {}", entry.path().display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::FileMap;
    use crate::io::fs::{read_tree, write_tree};
    use crate::io::structure::StructureManager;

    fn populated() -> (tempfile::TempDir, ProjectStructure, FileMap, FileMap) {
        let temp = tempfile::tempdir().expect("tempdir");
        let manager = StructureManager::new(temp.path());
        let structure = manager.create_project_structure("p", "shop").expect("create");
        let source = FileMap::from([
            ("backend/app/main.py".to_string(), "print('x')\n".to_string()),
            ("frontend/src/App.jsx".to_string(), "export default 1;\n".to_string()),
            ("EMPTY.md".to_string(), String::new()),
        ]);
        let tests = FileMap::from([("unit/test_main.py".to_string(), "def test(): pass\n".to_string())]);
        write_tree(&structure.source_path, &source).expect("source");
        write_tree(&structure.tests_path, &tests).expect("tests");
        (temp, structure, source, tests)
    }

    #[test]
    fn source_archive_round_trips() {
        let (temp, structure, source, _) = populated();
        let archive = create_project_archive(&structure, false).expect("archive");
        assert!(archive.ends_with("shop.tar.gz"));
        let out = temp.path().join("out");
        extract_archive(&archive, &out).expect("extract");
        assert_eq!(read_tree(&out).expect("read"), source);
    }

    #[test]
    fn archive_with_tests_prefixes_test_tree() {
        let (temp, structure, source, tests) = populated();
        let archive = create_project_archive(&structure, true).expect("archive");
        assert!(archive.ends_with("shop_with_tests.tar.gz"));
        let out = temp.path().join("out");
        extract_archive(&archive, &out).expect("extract");

        let mut expected = source;
        for (path, content) in tests {
            expected.insert(format!("tests/{path}"), content);
        }
        assert_eq!(read_tree(&out).expect("read"), expected);
    }
}
