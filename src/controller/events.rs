// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Watch events to object changes.
//!
//! A Kubernetes watch reports the current state of an object, not what changed.
//! [`ObjectTracker`] remembers the last state seen for every object so each
//! event can be turned into an [`ObjectChange`] carrying both the old and the
//! new object.
//!
//! When the watch restarts it relists everything between `Init` and `InitDone`.
//! Objects known before the relist that do not reappear were deleted while the
//! watch was down and are reported as [`ObjectChange::Deleted`].

use kube::runtime::watcher::Event;
use kube::{Resource, ResourceExt};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// What happened to one object.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectChange<K> {
    /// First time the object is seen
    Added(K),
    /// The object changed
    Updated {
        /// Last state seen
        old: K,
        /// Current state
        new: K,
    },
    /// The object is gone; holds its last known state
    Deleted(K),
}

/// Tracks watched objects and derives changes from watch events.
#[derive(Debug)]
pub struct ObjectTracker<K> {
    known: BTreeMap<String, K>,
    relisted: Option<BTreeSet<String>>,
}

impl<K> Default for ObjectTracker<K> {
    fn default() -> Self {
        Self {
            known: BTreeMap::new(),
            relisted: None,
        }
    }
}

/// `namespace/name`, or `name` for cluster scoped objects.
fn object_key<K: Resource>(obj: &K) -> String {
    match obj.namespace() {
        Some(ns) => format!("{ns}/{}", obj.name_any()),
        None => obj.name_any(),
    }
}

impl<K> ObjectTracker<K>
where
    K: Resource + Clone,
{
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects currently known.
    #[must_use]
    pub fn len(&self) -> usize {
        self.known.len()
    }

    /// Returns true if no object is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    /// Feed one watch event and return the resulting changes.
    pub fn apply(&mut self, event: Event<K>) -> Vec<ObjectChange<K>> {
        match event {
            Event::Init => {
                debug!(known = self.known.len(), "Watch relist started");
                self.relisted = Some(BTreeSet::new());
                Vec::new()
            }
            Event::InitApply(obj) => {
                if let Some(seen) = self.relisted.as_mut() {
                    seen.insert(object_key(&obj));
                }
                self.upsert(obj).into_iter().collect()
            }
            Event::InitDone => {
                let Some(seen) = self.relisted.take() else {
                    return Vec::new();
                };
                let gone: Vec<String> = self
                    .known
                    .keys()
                    .filter(|key| !seen.contains(*key))
                    .cloned()
                    .collect();
                debug!(relisted = seen.len(), gone = gone.len(), "Watch relist finished");
                gone.into_iter()
                    .filter_map(|key| self.known.remove(&key))
                    .map(ObjectChange::Deleted)
                    .collect()
            }
            Event::Apply(obj) => self.upsert(obj).into_iter().collect(),
            Event::Delete(obj) => {
                let last = self.known.remove(&object_key(&obj)).unwrap_or(obj);
                vec![ObjectChange::Deleted(last)]
            }
        }
    }

    fn upsert(&mut self, obj: K) -> Option<ObjectChange<K>> {
        let key = object_key(&obj);
        match self.known.insert(key, obj.clone()) {
            None => Some(ObjectChange::Added(obj)),
            Some(old)
                if old.resource_version().is_some()
                    && old.resource_version() == obj.resource_version() =>
            {
                None
            }
            Some(old) => Some(ObjectChange::Updated { old, new: obj }),
        }
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod events_tests;
