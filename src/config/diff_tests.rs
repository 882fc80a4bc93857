// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `diff.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::config::ConfigSnapshot;
    use std::collections::BTreeSet;

    fn snapshot(pairs: &[(&str, &str)]) -> ConfigSnapshot {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn keys(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|k| (*k).to_string()).collect()
    }

    #[test]
    fn test_identical_snapshots_have_no_diff() {
        let a = snapshot(&[("g1.bind-port", "80"), ("g2.host", "x")]);

        assert!(diff(&a, &a).is_empty());
        assert!(key_diffs(&a, &a).is_empty());
        assert!(diff(&ConfigSnapshot::new(), &ConfigSnapshot::new()).is_empty());
    }

    #[test]
    fn test_new_group_is_added() {
        let old = snapshot(&[("g1.bind-port", "80")]);
        let new = snapshot(&[("g1.bind-port", "80"), ("g2.host", "x")]);

        assert_eq!(
            diff(&old, &new),
            vec![GroupDiff {
                group: "g2".to_string(),
                change: GroupChange::Added,
            }]
        );
    }

    #[test]
    fn test_group_with_no_keys_left_is_removed() {
        let old = snapshot(&[("g1.bind-port", "80")]);
        let new = ConfigSnapshot::new();

        assert_eq!(
            diff(&old, &new),
            vec![GroupDiff {
                group: "g1".to_string(),
                change: GroupChange::Removed,
            }]
        );
    }

    #[test]
    fn test_changed_value_is_updated() {
        let old = snapshot(&[("g1.bind-port", "80")]);
        let new = snapshot(&[("g1.bind-port", "8080")]);

        assert_eq!(
            diff(&old, &new),
            vec![GroupDiff {
                group: "g1".to_string(),
                change: GroupChange::Updated(keys(&["g1.bind-port"])),
            }]
        );
    }

    #[test]
    fn test_partial_key_removal_is_update_not_removal() {
        let old = snapshot(&[("g1.bind-port", "80"), ("g1.path", "/api")]);
        let new = snapshot(&[("g1.bind-port", "80")]);

        assert_eq!(
            diff(&old, &new),
            vec![GroupDiff {
                group: "g1".to_string(),
                change: GroupChange::Updated(keys(&["g1.path"])),
            }]
        );
    }

    #[test]
    fn test_multi_key_new_group_is_single_added_entry() {
        let old = ConfigSnapshot::new();
        let new = snapshot(&[
            ("web.bind-port", "80"),
            ("web.namespace", "shop"),
            ("web.target-service-name", "frontend"),
        ]);

        assert_eq!(
            diff(&old, &new),
            vec![GroupDiff {
                group: "web".to_string(),
                change: GroupChange::Added,
            }]
        );
    }

    #[test]
    fn test_mixed_changes_are_classified_per_group() {
        let old = snapshot(&[
            ("a.bind-port", "80"),
            ("b.bind-port", "81"),
            ("c.bind-port", "82"),
        ]);
        let new = snapshot(&[
            ("a.bind-port", "80"),
            ("b.bind-port", "91"),
            ("d.bind-port", "83"),
        ]);

        assert_eq!(
            diff(&old, &new),
            vec![
                GroupDiff {
                    group: "b".to_string(),
                    change: GroupChange::Updated(keys(&["b.bind-port"])),
                },
                GroupDiff {
                    group: "c".to_string(),
                    change: GroupChange::Removed,
                },
                GroupDiff {
                    group: "d".to_string(),
                    change: GroupChange::Added,
                },
            ]
        );
    }

    #[test]
    fn test_every_differing_key_attributed_to_one_group() {
        let old = snapshot(&[("x.a", "1"), ("x.b", "2"), ("y.a", "1")]);
        let new = snapshot(&[("x.a", "9"), ("y.b", "2"), ("z.a", "1")]);

        let diffs = key_diffs(&old, &new);
        let mut attributed = BTreeSet::new();
        for group_diff in diff(&old, &new) {
            match group_diff.change {
                GroupChange::Updated(changed) => attributed.extend(changed),
                GroupChange::Added => attributed.extend(
                    new.keys()
                        .filter(|k| group_name(k) == group_diff.group)
                        .cloned(),
                ),
                GroupChange::Removed => attributed.extend(
                    old.keys()
                        .filter(|k| group_name(k) == group_diff.group)
                        .cloned(),
                ),
            }
        }

        let differing: BTreeSet<String> = diffs.into_iter().map(|d| d.key).collect();
        assert!(differing.is_subset(&attributed));
        assert_eq!(
            changed_groups(&old, &new),
            keys(&["x", "y", "z"])
        );
    }

    #[test]
    fn test_key_diffs_are_sorted_and_carry_values() {
        let old = snapshot(&[("b.x", "1"), ("a.x", "1")]);
        let new = snapshot(&[("b.x", "2"), ("c.x", "3")]);

        let diffs = key_diffs(&old, &new);
        assert_eq!(
            diffs,
            vec![
                KeyDiff {
                    key: "a.x".to_string(),
                    old: Some("1".to_string()),
                    new: None,
                },
                KeyDiff {
                    key: "b.x".to_string(),
                    old: Some("1".to_string()),
                    new: Some("2".to_string()),
                },
                KeyDiff {
                    key: "c.x".to_string(),
                    old: None,
                    new: Some("3".to_string()),
                },
            ]
        );
    }

    #[test]
    fn test_diff_is_symmetric_in_group_set() {
        let a = snapshot(&[("g1.bind-port", "80"), ("g2.host", "x")]);
        let b = snapshot(&[("g1.bind-port", "81"), ("g3.host", "y")]);

        let forward: BTreeSet<String> = diff(&a, &b).into_iter().map(|d| d.group).collect();
        let backward: BTreeSet<String> = diff(&b, &a).into_iter().map(|d| d.group).collect();
        assert_eq!(forward, backward);
    }
}
