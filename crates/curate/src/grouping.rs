//! Greedy first-fit clustering of normalized names.
//!
//! Names are visited once, in input order. Each name joins the first
//! existing group (in creation order) whose representative is within the
//! edit-distance threshold and which holds no member the name is forbidden
//! to merge with; otherwise it founds a new group. The result depends on
//! input order and is not a globally optimal clustering. Changing either
//! property would change historical outputs, so grouping stays sequential.

use std::collections::{HashMap, HashSet};

use strsim::levenshtein;
use tracing::debug;

use crate::error::CurateError;
use crate::model::{CanonicalGroup, PreparedRecord};
use crate::normalize::normalize_name;

/// Unordered pairs of normalized names that must never share a group.
#[derive(Debug, Clone, Default)]
pub struct NoMergeSet {
    pairs: HashSet<(String, String)>,
}

fn ordered(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

impl NoMergeSet {
    /// Normalizes both sides of each pair. Pairs that collapse to one name
    /// or to an empty name are rejected.
    pub fn from_pairs(pairs: &[[String; 2]]) -> Result<Self, CurateError> {
        let mut set = Self::default();
        for [a, b] in pairs {
            let (na, nb) = (normalize_name(a), normalize_name(b));
            if na.is_empty() || nb.is_empty() {
                return Err(CurateError::ConfigValidation(format!(
                    "no-merge pair ('{a}', '{b}'): names must not be empty"
                )));
            }
            if na == nb {
                return Err(CurateError::ConfigValidation(format!(
                    "no-merge pair ('{a}', '{b}'): both sides normalize to '{na}'"
                )));
            }
            set.pairs.insert(ordered(&na, &nb));
        }
        Ok(set)
    }

    pub fn forbids(&self, a: &str, b: &str) -> bool {
        !self.pairs.is_empty() && self.pairs.contains(&ordered(a, b))
    }

    /// Every name referenced by a constraint.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().flat_map(|(a, b)| [a.as_str(), b.as_str()])
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// A cluster of distinct names, representative first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameGroup {
    pub canonical_name: String,
    pub members: Vec<String>,
}

/// Cluster distinct, non-empty names. `names` must already be deduplicated
/// and in stable input order.
pub fn group_names(names: &[String], max_distance: usize, no_merge: &NoMergeSet) -> Vec<NameGroup> {
    let mut groups: Vec<NameGroup> = Vec::new();

    for name in names {
        let name_len = name.chars().count();
        let mut joined = false;

        for group in groups.iter_mut() {
            let rep_len = group.canonical_name.chars().count();
            if name_len.abs_diff(rep_len) > max_distance {
                continue;
            }
            if levenshtein(name, &group.canonical_name) > max_distance {
                continue;
            }
            if let Some(blocker) = group.members.iter().find(|m| no_merge.forbids(name, m)) {
                debug!(
                    name = %name,
                    representative = %group.canonical_name,
                    blocker = %blocker,
                    "no-merge constraint skipped fuzzy match"
                );
                continue;
            }
            group.members.push(name.clone());
            joined = true;
            break;
        }

        if !joined {
            groups.push(NameGroup {
                canonical_name: name.clone(),
                members: vec![name.clone()],
            });
        }
    }

    groups
}

/// Grouping of a prepared record table.
#[derive(Debug, Clone, Default)]
pub struct GroupingOutput {
    pub groups: Vec<CanonicalGroup>,
    /// Records whose normalized name is empty; never grouped.
    pub unnamed: Vec<usize>,
}

impl GroupingOutput {
    /// Reverse map: record index -> canonical name.
    pub fn canonical_by_record(&self) -> HashMap<usize, &str> {
        self.groups
            .iter()
            .flat_map(|g| g.record_indices.iter().map(move |i| (*i, g.canonical_name.as_str())))
            .collect()
    }
}

/// Assign every named record to exactly one canonical group.
pub fn group_records(records: &[PreparedRecord<'_>], max_distance: usize, no_merge: &NoMergeSet) -> GroupingOutput {
    let mut unnamed = Vec::new();
    let mut seen = HashSet::new();
    let mut names = Vec::new();

    for rec in records {
        if rec.normalized_name.is_empty() {
            unnamed.push(rec.index);
        } else if seen.insert(rec.normalized_name.as_str()) {
            names.push(rec.normalized_name.clone());
        }
    }

    let name_groups = group_names(&names, max_distance, no_merge);

    let mut slot_of: HashMap<&str, usize> = HashMap::new();
    for (slot, g) in name_groups.iter().enumerate() {
        for m in &g.members {
            slot_of.insert(m.as_str(), slot);
        }
    }

    let mut groups: Vec<CanonicalGroup> = name_groups
        .iter()
        .map(|g| CanonicalGroup {
            canonical_name: g.canonical_name.clone(),
            members: g.members.clone(),
            record_indices: Vec::new(),
        })
        .collect();

    for rec in records {
        if let Some(&slot) = slot_of.get(rec.normalized_name.as_str()) {
            groups[slot].record_indices.push(rec.index);
        }
    }

    debug!(
        names = names.len(),
        groups = groups.len(),
        unnamed = unnamed.len(),
        "grouped records"
    );

    GroupingOutput { groups, unnamed }
}
