//! Chain resolution over version-linked scripts and history entries.
//!
//! A chain is the linear order obtained by following one script's
//! `to_version` into the next script's `from_version`. Only linear chains
//! are valid: two candidates leaving the same version make the whole
//! configuration ambiguous, and coming back to a version already visited
//! makes it cyclic. Both abort the resolution without a partial result.

use std::collections::HashSet;

use crate::entry::MigrationEntry;
use crate::error::CoreError;
use crate::script::{describe_scripts, MigrationInfo, MigrationType};

/// Order `candidates` into the executable sequence starting at `start`.
///
/// At each step the single candidate whose `from_version` equals the
/// current version is appended and the current version advances to its
/// `to_version`. Resolution stops when no candidate matches; candidates
/// never reached are left out without error.
///
/// `info_of` extracts the version metadata from a candidate, so the same
/// algorithm serves bare [`MigrationInfo`]s and registered scripts.
pub fn resolve_chain<S, F>(start: &str, candidates: Vec<S>, info_of: F) -> Result<Vec<S>, CoreError>
where
    F: Fn(&S) -> &MigrationInfo,
{
    let mut pool = candidates;
    let mut chain = Vec::with_capacity(pool.len());
    let mut visited: HashSet<String> = HashSet::new();
    let mut current = start.to_string();
    visited.insert(current.clone());

    loop {
        let matching: Vec<usize> = pool
            .iter()
            .enumerate()
            .filter(|(_, candidate)| info_of(candidate).from_version == current)
            .map(|(idx, _)| idx)
            .collect();

        match matching.as_slice() {
            [] => break,
            [idx] => {
                let next = pool.remove(*idx);
                let to_version = info_of(&next).to_version.clone();
                chain.push(next);
                if !visited.insert(to_version.clone()) {
                    return Err(CoreError::CyclicChain {
                        version: to_version,
                    });
                }
                current = to_version;
            }
            _ => {
                return Err(CoreError::AmbiguousChain {
                    scripts: describe_scripts(matching.iter().map(|&idx| info_of(&pool[idx]))),
                    version: current,
                });
            }
        }
    }

    tracing::debug!(start, resolved = chain.len(), "Script chain resolved");
    Ok(chain)
}

/// Entries chain-reachable forward from `start`, following creation order.
///
/// Repeatedly takes the first not yet taken entry whose `from_version`
/// equals the current version. Once the Initial entry (which has
/// `from_version == to_version`) was taken, only Upgrade entries qualify.
/// Each entry is taken at most once, so the walk always terminates.
pub fn walk_entries(start: &str, entries: &[MigrationEntry]) -> Vec<MigrationEntry> {
    let mut taken = vec![false; entries.len()];
    let mut reachable = Vec::new();
    let mut current = start;
    let mut initial_found = false;

    loop {
        let next = entries.iter().enumerate().find(|(idx, entry)| {
            !taken[*idx]
                && entry.from_version == current
                && (!initial_found || entry.migration_type == MigrationType::Upgrade)
        });
        let Some((idx, entry)) = next else {
            break;
        };

        taken[idx] = true;
        if entry.migration_type == MigrationType::Initial {
            initial_found = true;
        }
        reachable.push(entry.clone());
        current = &entry.to_version;
    }

    reachable
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::entry::MigrationStatus;

    fn resolve(start: &str, pairs: &[(&str, &str)]) -> Result<Vec<String>, CoreError> {
        let infos: Vec<MigrationInfo> = pairs
            .iter()
            .map(|(from, to)| MigrationInfo::upgrade(*from, *to))
            .collect();
        resolve_chain(start, infos, |info| info).map(|chain| {
            chain
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<String>>()
        })
    }

    #[test]
    fn forward_chain_in_path_order() {
        let chain = resolve("1", &[("3", "4"), ("1", "2"), ("2", "3")]).unwrap();
        assert_eq!(chain, vec!["1->2", "2->3", "3->4"]);
    }

    #[test]
    fn stops_when_no_successor() {
        let chain = resolve("1", &[("1", "2"), ("5", "6")]).unwrap();
        assert_eq!(chain, vec!["1->2"]);
    }

    #[test]
    fn empty_candidates_resolve_to_empty() {
        assert!(resolve("1", &[]).unwrap().is_empty());
    }

    #[test]
    fn no_match_for_start_resolves_to_empty() {
        assert!(resolve("7", &[("1", "2"), ("2", "3")]).unwrap().is_empty());
    }

    #[test]
    fn ambiguous_from_version_fails_whole_chain() {
        let err = resolve("1", &[("1", "2"), ("2", "3"), ("2", "4")]).unwrap_err();
        assert_matches!(
            err,
            CoreError::AmbiguousChain { ref version, ref scripts }
                if version == "2" && scripts.contains("2->3") && scripts.contains("2->4")
        );
    }

    #[test]
    fn ambiguity_at_start_fails() {
        assert_matches!(
            resolve("1", &[("1", "2"), ("1", "3")]),
            Err(CoreError::AmbiguousChain { .. })
        );
    }

    #[test]
    fn cycle_is_rejected() {
        let err = resolve("1", &[("1", "2"), ("2", "3"), ("3", "1")]).unwrap_err();
        assert_matches!(err, CoreError::CyclicChain { version } if version == "1");
    }

    #[test]
    fn long_chain_resolves_fully() {
        let versions: Vec<String> = (0..200).map(|v| v.to_string()).collect();
        let pairs: Vec<(&str, &str)> = versions
            .windows(2)
            .rev()
            .map(|w| (w[0].as_str(), w[1].as_str()))
            .collect();
        let chain = resolve("0", &pairs).unwrap();
        assert_eq!(chain.len(), 199);
        assert_eq!(chain.first().map(String::as_str), Some("0->1"));
        assert_eq!(chain.last().map(String::as_str), Some("198->199"));
    }

    fn ok_entry(info: MigrationInfo) -> MigrationEntry {
        MigrationEntry::new(&info, MigrationStatus::Ok)
    }

    #[test]
    fn walk_from_initial_follows_upgrades() {
        let entries = vec![
            ok_entry(MigrationInfo::initial("1")),
            ok_entry(MigrationInfo::upgrade("1", "2")),
            ok_entry(MigrationInfo::upgrade("2", "3")),
            ok_entry(MigrationInfo::upgrade("7", "8")),
        ];
        let walked: Vec<String> = walk_entries("1", &entries)
            .iter()
            .map(|e| format!("{}->{}", e.from_version, e.to_version))
            .collect();
        assert_eq!(walked, vec!["1->1", "1->2", "2->3"]);
    }

    #[test]
    fn walk_from_middle_skips_earlier_entries() {
        let entries = vec![
            ok_entry(MigrationInfo::initial("1")),
            ok_entry(MigrationInfo::upgrade("1", "2")),
            ok_entry(MigrationInfo::upgrade("2", "3")),
        ];
        let walked = walk_entries("2", &entries);
        assert_eq!(walked.len(), 1);
        assert_eq!(walked[0].to_version, "3");
    }

    #[test]
    fn walk_unknown_start_is_empty() {
        let entries = vec![ok_entry(MigrationInfo::upgrade("1", "2"))];
        assert!(walk_entries("9", &entries).is_empty());
    }

    #[test]
    fn walk_terminates_on_cyclic_history() {
        let entries = vec![
            ok_entry(MigrationInfo::upgrade("1", "2")),
            ok_entry(MigrationInfo::upgrade("2", "1")),
        ];
        assert_eq!(walk_entries("1", &entries).len(), 2);
    }
}
