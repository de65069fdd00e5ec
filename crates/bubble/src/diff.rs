//! Step 3 of the Bubble Builder protocol: diff a staged root against
//! the main environment, classifying each file as `identical`, `added`,
//! or `differs` (spec §4.3).

use crate::hash::hash_file;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// How one staged file compares to the main environment's copy at the
/// same relative path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClass {
    /// Same relative path exists in main with an identical hash.
    Identical,
    /// No file exists in main at this relative path.
    Added,
    /// A file exists in main at this relative path but its hash
    /// differs.
    Differs,
}

/// One staged file's classification plus the data materialize needs.
#[derive(Debug, Clone)]
pub struct DiffEntry {
    /// Path relative to the staged/main root.
    pub relative_path: PathBuf,
    /// Classification against the main environment.
    pub class: FileClass,
    /// SHA-256 of the staged file's contents.
    pub sha256: [u8; 32],
    /// Size of the staged file in bytes.
    pub size: u64,
}

/// Walk `staged_root` recursively and classify every regular file
/// against `main_root`.
pub fn diff_staged_against_main(
    staged_root: &Path,
    main_root: &Path,
) -> std::io::Result<Vec<DiffEntry>> {
    let mut entries = Vec::new();
    let mut stack = vec![PathBuf::new()];

    while let Some(relative_dir) = stack.pop() {
        let dir = staged_root.join(&relative_dir);
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let relative_path = relative_dir.join(entry.file_name());

            if file_type.is_dir() {
                stack.push(relative_path);
                continue;
            }
            if !file_type.is_file() {
                continue;
            }

            let staged_path = staged_root.join(&relative_path);
            let sha256 = hash_file(&staged_path)?;
            let size = entry.metadata()?.len();

            let main_path = main_root.join(&relative_path);
            let class = if !main_path.exists() {
                FileClass::Added
            } else {
                let main_hash = hash_file(&main_path)?;
                if main_hash == sha256 {
                    FileClass::Identical
                } else {
                    FileClass::Differs
                }
            };

            entries.push(DiffEntry { relative_path, class, sha256, size });
        }
    }

    Ok(entries)
}

/// Group `entries` by classification, for callers that want counts or
/// a space-savings report without re-filtering the flat list.
pub fn classify_counts(entries: &[DiffEntry]) -> BTreeMap<&'static str, usize> {
    let mut counts = BTreeMap::new();
    for entry in entries {
        let label = match entry.class {
            FileClass::Identical => "identical",
            FileClass::Added => "added",
            FileClass::Differs => "differs",
        };
        *counts.entry(label).or_insert(0) += 1;
    }
    counts
}
