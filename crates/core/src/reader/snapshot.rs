//! Group snapshot - the flat group table
//!
//! A snapshot is built in full from every group row and never mutated
//! afterwards. Inheritance edges are [`GroupKey`] indices into the same
//! table, so cyclic graphs are representable without reference cycles.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use permrs_sdk::{DataKey, EntityRow};
use slotmap::{new_key_type, SlotMap};

use super::entity::{CachedGroup, EntityData};

new_key_type! {
    /// Index of a group in a snapshot's group table
    pub struct GroupKey;
}

/// Immutable group graph plus derived lookups
#[derive(Debug, Default)]
pub struct GroupSnapshot {
    groups: SlotMap<GroupKey, Arc<CachedGroup>>,
    by_name: HashMap<String, GroupKey>,
    /// Groups with stored data, in first-seen order
    order: Vec<GroupKey>,
    defaults: Vec<GroupKey>,
    permissions: Arc<BTreeSet<String>>,
    cycles: Vec<Vec<String>>,
    generation: u64,
}

/// Rows of one group, accumulated before keys are assigned
struct PendingGroup {
    data: EntityData,
    is_default: bool,
    inheritances: Vec<String>,
}

impl GroupSnapshot {
    /// Build a snapshot from every group row
    ///
    /// `user_permissions` are permission literals stored on users; they
    /// only feed the known-permission set.
    pub fn build<I>(group_rows: Vec<EntityRow>, user_permissions: I, generation: u64) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut names: Vec<String> = Vec::new();
        let mut pending: HashMap<String, PendingGroup> = HashMap::new();
        let mut permissions: BTreeSet<String> = user_permissions.into_iter().collect();

        for row in &group_rows {
            let group = pending.entry(row.name.clone()).or_insert_with(|| {
                names.push(row.name.clone());
                PendingGroup {
                    data: EntityData::new(&row.name),
                    is_default: false,
                    inheritances: Vec::new(),
                }
            });

            match row.key {
                DataKey::Inheritances => {
                    let parent = row.value.to_lowercase();
                    if !group.inheritances.contains(&parent) {
                        group.inheritances.push(parent);
                    }
                }
                DataKey::Default => {
                    group.is_default = row.value.trim().eq_ignore_ascii_case("true");
                }
                _ => {
                    if row.key == DataKey::Permissions {
                        permissions.insert(row.value.clone());
                    }
                    group.data.absorb(row);
                }
            }
        }

        let mut snapshot = GroupSnapshot {
            generation,
            ..Self::default()
        };

        // First pass: assign a key to every group, placeholders included
        for name in &names {
            snapshot.insert_placeholder(name);
        }
        snapshot.order = names.iter().map(|name| snapshot.by_name[name]).collect();
        for group in pending.values() {
            for parent in &group.inheritances {
                if !snapshot.by_name.contains_key(parent) {
                    tracing::debug!(
                        "Group '{}' inherits unknown group '{}'",
                        group.data.name,
                        parent
                    );
                    snapshot.insert_placeholder(parent);
                }
            }
        }

        // Second pass: fill in data and resolve edges
        for name in &names {
            let Some(group) = pending.remove(name) else {
                continue;
            };
            let key = snapshot.by_name[name];
            let inheritances = group
                .inheritances
                .iter()
                .map(|parent| snapshot.by_name[parent])
                .collect();
            if group.is_default {
                snapshot.defaults.push(key);
            }
            snapshot.groups[key] = Arc::new(CachedGroup {
                data: group.data,
                is_default: group.is_default,
                inheritances,
                placeholder: false,
            });
        }

        snapshot.permissions = Arc::new(permissions);
        snapshot.cycles = snapshot.find_cycles();
        for cycle in &snapshot.cycles {
            tracing::warn!("Cyclic group inheritance: {}", cycle.join(" -> "));
        }
        snapshot
    }

    fn insert_placeholder(&mut self, name: &str) -> GroupKey {
        let key = self
            .groups
            .insert(Arc::new(CachedGroup::placeholder(name)));
        self.by_name.insert(name.to_string(), key);
        key
    }

    /// Group at a key
    pub fn get(&self, key: GroupKey) -> Option<&Arc<CachedGroup>> {
        self.groups.get(key)
    }

    /// Group by name, if it is part of this snapshot
    pub fn get_by_name(&self, name: &str) -> Option<&Arc<CachedGroup>> {
        self.by_name
            .get(&name.to_lowercase())
            .and_then(|key| self.groups.get(*key))
    }

    /// Group by name, or a fresh placeholder for unknown names
    pub fn group_or_placeholder(&self, name: &str) -> Arc<CachedGroup> {
        match self.get_by_name(name) {
            Some(group) => Arc::clone(group),
            None => Arc::new(CachedGroup::placeholder(&name.to_lowercase())),
        }
    }

    /// Direct parents of a group, in declaration order
    pub fn parents<'a>(
        &'a self,
        group: &'a CachedGroup,
    ) -> impl Iterator<Item = &'a Arc<CachedGroup>> + 'a {
        group
            .inheritances
            .iter()
            .filter_map(move |key| self.groups.get(*key))
    }

    /// Groups with stored data, in first-seen order
    pub fn groups(&self) -> impl Iterator<Item = &Arc<CachedGroup>> {
        self.order.iter().filter_map(|key| self.groups.get(*key))
    }

    /// Groups flagged as default, in first-seen order
    pub fn default_groups(&self) -> impl Iterator<Item = &Arc<CachedGroup>> {
        self.defaults.iter().filter_map(|key| self.groups.get(*key))
    }

    /// Every permission literal stored on any group or user
    pub fn permissions(&self) -> &Arc<BTreeSet<String>> {
        &self.permissions
    }

    /// Inheritance cycles found while building, as group name paths
    pub fn cycles(&self) -> &[Vec<String>] {
        &self.cycles
    }

    /// Build counter, incremented on every rebuild
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of groups with stored data
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Find every inheritance cycle with an iterative depth-first walk
    fn find_cycles(&self) -> Vec<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        let mut marks: HashMap<GroupKey, Mark> =
            self.groups.keys().map(|key| (key, Mark::Unvisited)).collect();
        let mut cycles = Vec::new();

        for start in self.order.iter().copied() {
            if marks[&start] != Mark::Unvisited {
                continue;
            }

            // (group, index of the next parent to visit)
            let mut stack: Vec<(GroupKey, usize)> = vec![(start, 0)];
            marks.insert(start, Mark::InProgress);

            while let Some((key, next)) = stack.last().copied() {
                let parents = &self.groups[key].inheritances;
                if next >= parents.len() {
                    marks.insert(key, Mark::Done);
                    stack.pop();
                    continue;
                }
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }

                let parent = parents[next];
                match marks[&parent] {
                    Mark::Unvisited => {
                        marks.insert(parent, Mark::InProgress);
                        stack.push((parent, 0));
                    }
                    Mark::InProgress => {
                        let from = stack.iter().position(|(k, _)| *k == parent).unwrap_or(0);
                        let mut cycle: Vec<String> = stack[from..]
                            .iter()
                            .map(|(k, _)| self.groups[*k].name().to_string())
                            .collect();
                        cycle.push(self.groups[parent].name().to_string());
                        cycles.push(cycle);
                    }
                    Mark::Done => {}
                }
            }
        }

        cycles
    }
}
