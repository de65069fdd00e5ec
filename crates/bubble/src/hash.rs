//! SHA-256 file hashing, used by the Diff and Materialize steps to
//! classify files as `identical`/`added`/`differs` (spec §4.3).

use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Hash a file's contents. Reads in fixed-size chunks so large native
/// binaries don't need to be loaded into memory at once.
pub fn hash_file(path: &Path) -> std::io::Result<[u8; 32]> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hasher.finalize().into())
}
