//! Bubble manifest lookup (spec §4.5 step 1): the Loader Protocol's only
//! point of contact with the Knowledge Base.
//!
//! Activation needs nothing from the KB beyond "does a committed bubble
//! exist for this `(name, version)`, and if so what does its manifest
//! say" — `find_bubble` is deliberately the only query this crate runs.

use crate::error::LoaderError;
use sheaf_core::types::{Bubble, PackageName};
use sheaf_kb::{KbBackend, KbError, KbKey};

/// Look up the committed bubble for `(name, version)`.
///
/// Returns [`LoaderError::BubbleNotFound`] if the KB has no record —
/// this must happen before any stack mutation, per spec §8's boundary
/// case ("activating a nonexistent bubble: `BubbleNotFound`, no state
/// change").
pub fn find_bubble(
    kb: &dyn KbBackend,
    name: &PackageName,
    version: &semver::Version,
) -> Result<Bubble, LoaderError> {
    let key = KbKey::bubble(name.as_str(), version);
    match kb.get(&key) {
        Ok(value) => {
            serde_json::from_value(value).map_err(|err| LoaderError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                err,
            )))
        }
        Err(KbError::NotFound(_)) => Err(LoaderError::BubbleNotFound {
            name: name.to_string(),
            version: version.clone(),
        }),
        Err(other) => Err(LoaderError::Io(std::io::Error::new(std::io::ErrorKind::Other, other))),
    }
}
