// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Configuration snapshot diffing.
//!
//! [`diff`] turns two snapshots into the minimal set of group level changes.
//! Only keys whose value differs are inspected, so the work done is proportional
//! to the size of the change and not to the size of the configuration.
//!
//! A group is:
//!
//! - **Added** when it has keys in the new snapshot and none in the old one
//! - **Removed** when it had keys in the old snapshot and has none left in the new one
//! - **Updated** when it has keys in both snapshots and at least one differs

use super::group::{group_name, has_group};
use super::ConfigSnapshot;
use std::collections::{BTreeMap, BTreeSet};

/// A single key whose value differs between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDiff {
    /// Full configuration key
    pub key: String,
    /// Value in the old snapshot
    pub old: Option<String>,
    /// Value in the new snapshot
    pub new: Option<String>,
}

/// Classification of a changed group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupChange {
    /// The group did not exist in the old snapshot
    Added,
    /// The group has no keys left in the new snapshot
    Removed,
    /// The group exists in both snapshots; holds the keys that differ
    Updated(BTreeSet<String>),
}

/// The change of one group between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDiff {
    /// Group identity
    pub group: String,
    /// How the group changed
    pub change: GroupChange,
}

/// Returns every key whose value differs between `old` and `new`, ordered by key.
#[must_use]
pub fn key_diffs(old: &ConfigSnapshot, new: &ConfigSnapshot) -> Vec<KeyDiff> {
    if old == new {
        return Vec::new();
    }

    let mut diffs: Vec<KeyDiff> = new
        .iter()
        .filter(|(key, value)| old.get(*key) != Some(*value))
        .map(|(key, value)| KeyDiff {
            key: key.clone(),
            old: old.get(key).cloned(),
            new: Some(value.clone()),
        })
        .collect();

    diffs.extend(
        old.iter()
            .filter(|(key, _)| !new.contains_key(*key))
            .map(|(key, value)| KeyDiff {
                key: key.clone(),
                old: Some(value.clone()),
                new: None,
            }),
    );

    diffs.sort_by(|a, b| a.key.cmp(&b.key));
    diffs
}

/// Returns the names of every group with at least one differing key.
#[must_use]
pub fn changed_groups(old: &ConfigSnapshot, new: &ConfigSnapshot) -> BTreeSet<String> {
    key_diffs(old, new)
        .iter()
        .map(|d| group_name(&d.key).to_string())
        .collect()
}

/// Compare two snapshots and classify every affected group.
///
/// The result is ordered by group name. `diff(a, a)` is always empty.
#[must_use]
pub fn diff(old: &ConfigSnapshot, new: &ConfigSnapshot) -> Vec<GroupDiff> {
    let mut changed: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for key_diff in key_diffs(old, new) {
        changed
            .entry(group_name(&key_diff.key).to_string())
            .or_default()
            .insert(key_diff.key);
    }

    changed
        .into_iter()
        .map(|(group, keys)| {
            let change = match (has_group(old, &group), has_group(new, &group)) {
                (false, _) => GroupChange::Added,
                (true, false) => GroupChange::Removed,
                (true, true) => GroupChange::Updated(keys),
            };
            GroupDiff { group, change }
        })
        .collect()
}

#[cfg(test)]
#[path = "diff_tests.rs"]
mod diff_tests;
