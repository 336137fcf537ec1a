use std::collections::BTreeMap;

use crate::grouping::GroupingOutput;
use crate::model::{CurationSummary, MergedRecord, PreparedRecord, RemovedOutlier};

/// Compute corpus statistics for a finished run. `records` is the table
/// that survived outlier filtering; `category_attribute` names the
/// attribute measured records are counted under.
pub fn compute_summary(
    prepared: &[PreparedRecord<'_>],
    grouping: &GroupingOutput,
    records: &[MergedRecord],
    outliers: &[RemovedOutlier],
    category_attribute: &str,
) -> CurationSummary {
    let mut tier_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut measured_per_category: BTreeMap<String, usize> = BTreeMap::new();
    let mut measured = 0;
    let mut low_confidence_units = 0;

    for r in records {
        if let Some(tier) = r.quality_tier {
            *tier_counts.entry(tier.to_string()).or_insert(0) += 1;
        }
        if let Some(m) = r.normalized_metric {
            if m.fold_change.is_some() {
                measured += 1;
                let category = r.attribute(category_attribute).map(str::trim).unwrap_or_default();
                if !category.is_empty() {
                    *measured_per_category.entry(category.to_string()).or_insert(0) += 1;
                }
            }
            if m.low_confidence {
                low_confidence_units += 1;
            }
        }
    }

    let mut sources: Vec<String> = Vec::new();
    for p in prepared {
        let id = p.record.source_id.trim();
        if !id.is_empty() && !sources.iter().any(|s| s == id) {
            sources.push(id.to_string());
        }
    }

    CurationSummary {
        raw_records: prepared.len(),
        unnamed_records: grouping.unnamed.len(),
        aliased_records: prepared.iter().filter(|p| p.original_name.is_some()).count(),
        groups: grouping.groups.len(),
        multi_member_groups: grouping.groups.iter().filter(|g| g.record_indices.len() > 1).count(),
        merged: records.len(),
        outliers_removed: outliers.len(),
        measured,
        low_confidence_units,
        tier_counts,
        measured_per_category,
        sources,
    }
}
