//! Step 4 of the Bubble Builder protocol: materialize the bubble
//! directory from a diffed staged root, honoring the dedup policy and
//! the native-package exclusion list (spec §4.3).

use crate::diff::{DiffEntry, FileClass};
use sheaf_core::config::DedupPolicy;
use sheaf_core::types::{DedupMode, Manifest, ManifestEntry, ManifestEntryKind};
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

/// File extensions that always mark a file as native compiled code,
/// regardless of `native_package_list` (spec §4.3: "native-code
/// packages ... are never deduped").
const NATIVE_EXTENSIONS: &[&str] = &["so", "pyd", "dll", "dylib"];

fn has_native_extension(relative_path: &Path) -> bool {
    relative_path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| NATIVE_EXTENSIONS.iter().any(|native| native.eq_ignore_ascii_case(ext)))
}

/// Sniff the first four bytes of `source` for a known native-binary
/// magic number: ELF, Mach-O (32/64-bit, either byte order, and fat
/// binaries), or a PE/COFF `MZ` header. Unreadable or too-short files
/// are treated as non-native rather than erroring — a missing/unreadable
/// staged file is reported elsewhere in the build protocol.
fn has_native_magic_bytes(source: &Path) -> bool {
    let Ok(mut file) = std::fs::File::open(source) else { return false };
    let mut header = [0u8; 4];
    if file.read_exact(&mut header).is_err() {
        return false;
    }
    matches!(
        header,
        [0x7f, b'E', b'L', b'F']
            | [0xfe, 0xed, 0xfa, 0xce]
            | [0xfe, 0xed, 0xfa, 0xcf]
            | [0xce, 0xfa, 0xed, 0xfe]
            | [0xcf, 0xfa, 0xed, 0xfe]
            | [0xca, 0xfe, 0xba, 0xbe]
    ) || (header[0] == b'M' && header[1] == b'Z')
}

/// Whether `source` (a file already staged at `relative_path`) is
/// detected as native compiled code by extension or magic bytes, the
/// automatic half of spec §4.3's native-code exclusion — independent
/// of whatever `native_package_list` names explicitly.
fn is_detected_native(relative_path: &Path, source: &Path) -> bool {
    has_native_extension(relative_path) || has_native_magic_bytes(source)
}

/// Decide the on-disk realization for one diffed file.
///
/// Native packages are never deduped, matching spec §4.3's dedup
/// policy regardless of hash match — whether named explicitly in
/// `native_package_list` or detected automatically from `source`'s
/// extension/magic bytes. Among the remaining dedup-eligible files,
/// `policy` decides whether an `Identical` file becomes a `DedupRef`,
/// and `mode` decides whether a `DedupRef` is realized as a
/// manifest-only entry, a symlink, or a hard link (the Open Question
/// resolved in DESIGN.md).
fn entry_kind(
    entry: &DiffEntry,
    source: &Path,
    is_native_package: bool,
    policy: DedupPolicy,
    mode: DedupMode,
) -> ManifestEntryKind {
    let dedup_eligible = entry.class == FileClass::Identical
        && !matches!(policy, DedupPolicy::Off)
        && !is_native_package
        && !is_detected_native(&entry.relative_path, source);

    if !dedup_eligible {
        return ManifestEntryKind::File;
    }

    match mode {
        DedupMode::ManifestRef => ManifestEntryKind::DedupRef,
        DedupMode::Symlink => ManifestEntryKind::Symlink,
        DedupMode::Hardlink => ManifestEntryKind::Hardlink,
    }
}

/// Materialize `entries` (already diffed against `main_root`) from
/// `staged_root` into `bubble_root`, returning the resulting manifest.
///
/// `native_package_files` lists relative paths belonging to packages on
/// the `native_package_list` (spec §6); every other file is checked for
/// native compiled code by extension/magic bytes ([`is_detected_native`])
/// and is otherwise dedup-eligible subject to `policy`/`mode`.
pub fn materialize(
    entries: &[DiffEntry],
    staged_root: &Path,
    main_root: &Path,
    bubble_root: &Path,
    native_package_files: &HashSet<std::path::PathBuf>,
    policy: DedupPolicy,
    mode: DedupMode,
) -> std::io::Result<Manifest> {
    std::fs::create_dir_all(bubble_root)?;
    let mut manifest = Manifest::default();

    for entry in entries {
        let is_native = native_package_files.contains(&entry.relative_path);
        let source = staged_root.join(&entry.relative_path);
        let kind = entry_kind(entry, &source, is_native, policy, mode);
        let dest = bubble_root.join(&entry.relative_path);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }

        match kind {
            ManifestEntryKind::File => {
                std::fs::copy(&source, &dest)?;
            }
            ManifestEntryKind::DedupRef => {
                // No bytes written under the bubble root; the loader
                // resolves this reference against `main_root` at
                // activation time (spec §4.5 step 5).
            }
            ManifestEntryKind::Symlink => {
                let target = main_root.join(&entry.relative_path);
                symlink(&target, &dest)?;
            }
            ManifestEntryKind::Hardlink => {
                let target = main_root.join(&entry.relative_path);
                std::fs::hard_link(target, &dest)?;
            }
        }

        manifest.entries.push(ManifestEntry {
            relative_path: entry.relative_path.clone(),
            kind,
            sha256: entry.sha256,
            size: entry.size,
        });
    }

    Ok(manifest)
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}
