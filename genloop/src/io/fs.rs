//! Filesystem helpers shared by the structure, workspace and output modules.

use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde::de::DeserializeOwned;
use walkdir::WalkDir;

use crate::core::types::FileMap;

/// Atomically write text (temp file + rename), creating parent directories.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut tmp_name = path
        .file_name()
        .with_context(|| format!("path missing file name {}", path.display()))?
        .to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = parent.join(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

/// Pretty-printed JSON with a trailing newline, written atomically.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)
        .with_context(|| format!("serialize {}", path.display()))?;
    buf.push('\n');
    write_atomic(path, &buf)
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

/// Append text, creating the file if needed.
pub fn append_text(path: &Path, text: &str) -> Result<()> {
    use std::io::Write;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {}", path.display()))?;
    file.write_all(text.as_bytes())
        .with_context(|| format!("append {}", path.display()))
}

/// Resolve a generated relative path under `root`, rejecting escapes.
pub fn safe_join(root: &Path, rel: &str) -> Result<PathBuf> {
    let rel_path = Path::new(rel);
    let mut out = root.to_path_buf();
    let mut depth = 0usize;
    for component in rel_path.components() {
        match component {
            Component::Normal(part) => {
                out.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                bail!("refusing path outside project: {rel}");
            }
        }
    }
    if depth == 0 {
        bail!("empty relative path");
    }
    Ok(out)
}

/// Write every file of the map under `root`, creating parents.
pub fn write_tree(root: &Path, files: &FileMap) -> Result<()> {
    for (rel, content) in files {
        let path = safe_join(root, rel)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        fs::write(&path, content).with_context(|| format!("write {}", path.display()))?;
    }
    Ok(())
}

/// Read every regular file under `root` into a map keyed by `/`-separated
/// relative path. Non UTF-8 content is decoded lossily. Missing roots read
/// as empty.
pub fn read_tree(root: &Path) -> Result<FileMap> {
    let mut files = FileMap::new();
    if !root.exists() {
        return Ok(files);
    }
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = relative_key(root, entry.path())?;
        let bytes =
            fs::read(entry.path()).with_context(|| format!("read {}", entry.path().display()))?;
        files.insert(rel, String::from_utf8_lossy(&bytes).into_owned());
    }
    Ok(files)
}

/// Count regular files under `root` (0 when missing).
pub fn count_files(root: &Path) -> usize {
    if !root.exists() {
        return 0;
    }
    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .count()
}

/// Total size in bytes of regular files under `root`.
pub fn tree_size(root: &Path) -> u64 {
    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// Recursively copy a directory tree.
pub fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry.with_context(|| format!("walk {}", src.display()))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .with_context(|| format!("strip prefix {}", src.display()))?;
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("create directory {}", target.display()))?;
        } else if entry.file_type().is_file() {
            fs::copy(entry.path(), &target)
                .with_context(|| format!("copy {}", entry.path().display()))?;
        }
    }
    Ok(())
}

/// Remove a directory tree if present.
pub fn remove_dir_if_exists(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path).with_context(|| format!("remove {}", path.display()))?;
    }
    Ok(())
}

pub fn relative_key(root: &Path, path: &Path) -> Result<String> {
    let rel = path
        .strip_prefix(root)
        .with_context(|| format!("{} is not under {}", path.display(), root.display()))?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_round_trips_nested_and_empty_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let files = FileMap::from([
            ("a/b/c.txt".to_string(), "deep".to_string()),
            ("empty.txt".to_string(), String::new()),
        ]);
        write_tree(temp.path(), &files).expect("write");
        assert_eq!(read_tree(temp.path()).expect("read"), files);
        assert_eq!(count_files(temp.path()), 2);
    }

    #[test]
    fn safe_join_rejects_escapes() {
        let root = Path::new("/tmp/project");
        assert!(safe_join(root, "../evil").is_err());
        assert!(safe_join(root, "/etc/passwd").is_err());
        assert!(safe_join(root, "").is_err());
        assert_eq!(
            safe_join(root, "./src/main.py").expect("join"),
            root.join("src").join("main.py")
        );
    }

    #[test]
    fn missing_tree_reads_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(read_tree(&temp.path().join("nope")).expect("read").is_empty());
        assert_eq!(count_files(&temp.path().join("nope")), 0);
    }

    #[test]
    fn write_json_ends_with_newline() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("value.json");
        write_json(&path, &serde_json::json!({"a": 1})).expect("write");
        let text = fs::read_to_string(&path).expect("read");
        assert!(text.ends_with("}\n"));
        let value: serde_json::Value = read_json(&path).expect("read json");
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn copy_dir_copies_everything() {
        let temp = tempfile::tempdir().expect("tempdir");
        let src = temp.path().join("src");
        let files = FileMap::from([("x/y.py".to_string(), "1".to_string())]);
        write_tree(&src, &files).expect("write");
        let dst = temp.path().join("dst");
        copy_dir(&src, &dst).expect("copy");
        assert_eq!(read_tree(&dst).expect("read"), files);
    }
}
