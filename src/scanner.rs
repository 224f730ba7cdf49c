//! Enumerates the pool directory for files matching the configured pattern.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;

/// A matching file found in the pool, along with an open read handle.
pub struct ScannedFile {
    pub path: PathBuf,
    pub handle: File,
}

/// List `pool_path`'s direct entries, keep regular files whose basename
/// matches `pattern`, and open each for reading.
///
/// An open failure on any single file aborts the whole scan and returns an
/// error rather than a partial list: returning partial state here would
/// leave the caller unsure which files it actually has handles for, and
/// that uncertainty is exactly what the offset store must never tolerate.
pub fn scan(pool_path: &Path, pattern: &Regex) -> Result<Vec<ScannedFile>> {
    let mut out = Vec::new();
    let entries = std::fs::read_dir(pool_path)
        .with_context(|| format!("listing pool directory {}", pool_path.display()))?;

    for entry in entries {
        let entry = entry.with_context(|| format!("reading entry in {}", pool_path.display()))?;
        let path = entry.path();

        let file_type = entry
            .file_type()
            .with_context(|| format!("stat-ing {}", path.display()))?;
        if !file_type.is_file() {
            continue;
        }

        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => continue,
        };
        if !pattern.is_match(name) {
            continue;
        }

        let handle = File::open(&path).with_context(|| format!("opening {}", path.display()))?;
        out.push(ScannedFile { path, handle });
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn only_matching_regular_files_are_returned() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("a.log")).unwrap();
        File::create(dir.path().join("b.log")).unwrap();
        File::create(dir.path().join("ignore.txt")).unwrap();
        std::fs::create_dir(dir.path().join("c.log")).unwrap();

        let pattern = Regex::new(r".*\.log$").unwrap();
        let mut found = scan(dir.path(), &pattern)
            .unwrap()
            .into_iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().to_string())
            .collect::<Vec<_>>();
        found.sort();
        assert_eq!(found, vec!["a.log".to_string(), "b.log".to_string()]);
    }

    #[test]
    fn missing_pool_directory_errors() {
        let pattern = Regex::new(r".*\.log$").unwrap();
        assert!(scan(Path::new("/no/such/pool/dir"), &pattern).is_err());
    }

    #[test]
    fn returned_handles_read_from_start() {
        use std::io::Read;

        let dir = tempfile::tempdir().unwrap();
        let mut f = File::create(dir.path().join("a.log")).unwrap();
        f.write_all(b"hello\n").unwrap();

        let pattern = Regex::new(r".*\.log$").unwrap();
        let mut found = scan(dir.path(), &pattern).unwrap();
        assert_eq!(found.len(), 1);

        let mut contents = String::new();
        found[0].handle.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "hello\n");
    }
}
