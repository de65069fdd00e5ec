//! The Reorder-and-Diff algorithm (spec §4.2): given a list of install
//! requirements, group by package name, sort each group descending by
//! semantic version, and interleave groups preserving first-seen order.
//!
//! Worked example from the spec: `[A==1.0, A==2.0, B==3.0]` reorders to
//! `[A==2.0, A==1.0, B==3.0]`. Installing the newest version of a
//! package first, then older ones, makes every subsequent install of
//! that name unambiguously a downgrade — the trigger condition for
//! bubble creation (spec §4.3).

use crate::types::Requirement;
use sheaf_core::types::PackageName;
use std::collections::HashMap;

/// Reorder `requirements` so that, per package name, versions are
/// applied newest-first, while groups themselves stay in the order
/// their name was first seen in the input.
///
/// Pure and side-effect free; exercised directly by the property-test
/// suite (spec §8) rather than through a subprocess.
pub fn version_reorder(requirements: &[Requirement]) -> Vec<Requirement> {
    let mut order: Vec<PackageName> = Vec::new();
    let mut groups: HashMap<PackageName, Vec<semver::Version>> = HashMap::new();

    for req in requirements {
        groups.entry(req.name.clone()).or_insert_with(|| {
            order.push(req.name.clone());
            Vec::new()
        });
    }
    for req in requirements {
        groups.get_mut(&req.name).expect("group was just inserted above").push(req.version.clone());
    }

    let mut result = Vec::with_capacity(requirements.len());
    for name in order {
        let mut versions = groups.remove(&name).unwrap_or_default();
        // SemVer precedence per the ecosystem's canonical ordering is
        // exactly `semver::Version`'s `Ord` implementation.
        versions.sort_by(|a, b| b.cmp(a));
        for version in versions {
            result.push(Requirement::new(name.clone(), version));
        }
    }
    result
}
