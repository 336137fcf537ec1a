use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::debug;

use crate::model::{CanonicalGroup, Measurement, MergedRecord, MergedStatistics, PreparedRecord, RawRecord, Resolved};

/// Rank assigned to evidence types absent from the table.
pub const UNRANKED: u32 = u32::MAX;

/// evidence_type -> rank, lower is better. Lookups ignore case and
/// surrounding whitespace.
#[derive(Debug, Clone, Default)]
pub struct EvidenceRanking {
    ranks: HashMap<String, u32>,
}

impl EvidenceRanking {
    pub fn new<'a>(tiers: impl IntoIterator<Item = (&'a String, &'a u32)>) -> Self {
        Self {
            ranks: tiers
                .into_iter()
                .map(|(k, v)| (k.trim().to_lowercase(), *v))
                .collect(),
        }
    }

    pub fn rank(&self, evidence_type: &str) -> u32 {
        let key = evidence_type.trim().to_lowercase();
        if key.is_empty() {
            return UNRANKED;
        }
        self.ranks.get(&key).copied().unwrap_or(UNRANKED)
    }
}

/// A group member with its precomputed ordering key.
struct Candidate<'r, 'a> {
    prepared: &'r PreparedRecord<'a>,
    rank: u32,
    completeness: usize,
    /// First-seen position within the group.
    position: usize,
}

impl Candidate<'_, '_> {
    fn key(&self) -> (u32, Reverse<usize>, usize) {
        (self.rank, Reverse(self.completeness), self.position)
    }
}

/// Pick a field from the best-ranked member holding a non-null value:
/// lowest evidence rank, then highest completeness, then first seen.
fn pick<T>(candidates: &[Candidate<'_, '_>], extract: impl Fn(&RawRecord) -> Option<T>) -> Option<Resolved<T>> {
    candidates
        .iter()
        .filter_map(|c| extract(c.prepared.record).map(|v| (c, v)))
        .min_by_key(|(c, _)| c.key())
        .map(|(c, value)| Resolved {
            value,
            source_id: c.prepared.record.source_id.clone(),
            record_index: c.prepared.index,
        })
}

fn non_blank(s: &str) -> Option<String> {
    let t = s.trim();
    (!t.is_empty()).then(|| t.to_string())
}

fn push_distinct(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

/// Merge one canonical group into a single record, field by field.
///
/// `prepared` is the full prepared table indexed by input position. Every
/// resolved value is copied from exactly one member; references from all
/// members are kept regardless of which member won each field.
pub fn merge_group(group: &CanonicalGroup, prepared: &[PreparedRecord<'_>], ranking: &EvidenceRanking) -> MergedRecord {
    let candidates: Vec<Candidate<'_, '_>> = group
        .record_indices
        .iter()
        .filter_map(|&i| prepared.get(i))
        .enumerate()
        .map(|(position, p)| Candidate {
            prepared: p,
            rank: ranking.rank(&p.record.evidence_type),
            completeness: p.record.completeness(),
            position,
        })
        .collect();

    let metric = pick(&candidates, |r| {
        r.metric().map(|value| Measurement {
            value,
            unit: r.metric_unit.clone(),
            evidence_type: r.evidence_type.trim().to_string(),
        })
    });
    let statistics = MergedStatistics {
        sample_size: pick(&candidates, |r| r.statistics.sample_size),
        std_dev: pick(&candidates, |r| r.statistics.std_dev),
        ci_low: pick(&candidates, |r| r.statistics.ci_low),
        ci_high: pick(&candidates, |r| r.statistics.ci_high),
    };
    let evidence_type = pick(&candidates, |r| non_blank(&r.evidence_type));
    let license_tag = pick(&candidates, |r| non_blank(&r.license_tag));

    let keys: BTreeSet<&str> = candidates
        .iter()
        .flat_map(|c| c.prepared.record.attributes.keys().map(String::as_str))
        .collect();
    let mut attributes = BTreeMap::new();
    for key in keys {
        if let Some(resolved) = pick(&candidates, |r| r.attributes.get(key).and_then(|v| non_blank(v))) {
            attributes.insert(key.to_string(), resolved);
        }
    }

    let display_name = candidates
        .iter()
        .min_by_key(|c| c.key())
        .map(|c| c.prepared.label.clone())
        .unwrap_or_else(|| group.canonical_name.clone());

    let mut references = Vec::new();
    let mut source_ids = Vec::new();
    let mut aliased_from = Vec::new();
    for c in &candidates {
        if let Some(r) = c.prepared.record.reference() {
            push_distinct(&mut references, r);
        }
        push_distinct(&mut source_ids, &c.prepared.record.source_id);
        if let Some(original) = &c.prepared.original_name {
            push_distinct(&mut aliased_from, original);
        }
    }

    if candidates.len() > 1 {
        debug!(
            canonical_name = %group.canonical_name,
            members = candidates.len(),
            metric_from = ?metric.as_ref().map(|m| &m.source_id),
            "merged group"
        );
    }

    MergedRecord {
        canonical_name: group.canonical_name.clone(),
        display_name,
        members: group.members.clone(),
        source_ids,
        aliased_from,
        metric,
        statistics,
        evidence_type,
        license_tag,
        attributes,
        references,
        normalized_metric: None,
        quality_tier: None,
    }
}

/// Merge every group. Groups are independent of one another.
pub fn merge_groups(groups: &[CanonicalGroup], prepared: &[PreparedRecord<'_>], ranking: &EvidenceRanking) -> Vec<MergedRecord> {
    groups.iter().map(|g| merge_group(g, prepared, ranking)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StatisticalInfo;
    use crate::normalize::normalize_name;
    use crate::units::MetricUnit;

    fn ranking() -> EvidenceRanking {
        let tiers: HashMap<String, u32> = [
            ("supplement_table".to_string(), 1),
            ("table".to_string(), 2),
            ("caption".to_string(), 3),
            ("paragraph".to_string(), 4),
        ]
        .into_iter()
        .collect();
        EvidenceRanking::new(&tiers)
    }

    fn prepare(raws: &[RawRecord]) -> Vec<PreparedRecord<'_>> {
        raws.iter()
            .enumerate()
            .map(|(index, record)| PreparedRecord {
                index,
                record,
                label: record.raw_name.clone(),
                original_name: None,
                normalized_name: normalize_name(&record.raw_name),
            })
            .collect()
    }

    fn whole_group(prepared: &[PreparedRecord<'_>]) -> CanonicalGroup {
        CanonicalGroup {
            canonical_name: prepared[0].normalized_name.clone(),
            members: vec![prepared[0].normalized_name.clone()],
            record_indices: (0..prepared.len()).collect(),
        }
    }

    #[test]
    fn rank_lookup() {
        let r = ranking();
        assert_eq!(r.rank("table"), 2);
        assert_eq!(r.rank(" Table "), 2);
        assert_eq!(r.rank("hearsay"), UNRANKED);
        assert_eq!(r.rank(""), UNRANKED);
    }

    #[test]
    fn better_tier_wins_metric() {
        let raws = vec![
            RawRecord::new("dLight 1.1", "pmc", "paragraph")
                .with_metric(3.2, MetricUnit::DeltaOverBaseline)
                .with_reference("PMCID:PMC1"),
            RawRecord::new("dLight1.1", "supp", "table")
                .with_metric(3.5, MetricUnit::DeltaOverBaseline)
                .with_reference("10.1126/science.aat4422"),
        ];
        let prepared = prepare(&raws);
        let merged = merge_group(&whole_group(&prepared), &prepared, &ranking());

        let metric = merged.metric.unwrap();
        assert_eq!(metric.value.value, 3.5);
        assert_eq!(metric.value.evidence_type, "table");
        assert_eq!(metric.source_id, "supp");
        assert_eq!(metric.record_index, 1);
        assert_eq!(merged.display_name, "dLight1.1");
        // provenance of the losing record is kept
        assert_eq!(merged.references, vec!["PMCID:PMC1", "10.1126/science.aat4422"]);
        assert_eq!(merged.source_ids, vec!["pmc", "supp"]);
    }

    #[test]
    fn null_values_are_skipped_per_field() {
        let raws = vec![
            RawRecord::new("ASAP3", "fpbase", "table").with_attribute("family", "voltage"),
            RawRecord::new("ASAP3", "pmc", "paragraph").with_metric(0.51, MetricUnit::DeltaOverBaseline),
        ];
        let prepared = prepare(&raws);
        let merged = merge_group(&whole_group(&prepared), &prepared, &ranking());
        // table record has no metric, so the paragraph value is used
        assert_eq!(merged.metric.as_ref().unwrap().source_id, "pmc");
        assert_eq!(merged.attribute("family"), Some("voltage"));
        assert_eq!(merged.evidence_type.unwrap().value, "table");
    }

    #[test]
    fn tie_broken_by_completeness_then_order() {
        let raws = vec![
            RawRecord::new("x1", "a", "table").with_metric(1.0, MetricUnit::FoldChange),
            RawRecord::new("x1", "b", "table")
                .with_metric(2.0, MetricUnit::FoldChange)
                .with_reference("ref-b"),
            RawRecord::new("x1", "c", "table")
                .with_metric(3.0, MetricUnit::FoldChange)
                .with_reference("ref-c"),
        ];
        let prepared = prepare(&raws);
        let merged = merge_group(&whole_group(&prepared), &prepared, &ranking());
        // b and c tie on rank and completeness; b is seen first
        assert_eq!(merged.metric.unwrap().source_id, "b");
    }

    #[test]
    fn unranked_loses_to_ranked() {
        let raws = vec![
            RawRecord::new("x1", "guess", "rumour")
                .with_metric(9.0, MetricUnit::FoldChange)
                .with_reference("r1")
                .with_license("CC BY"),
            RawRecord::new("x1", "pmc", "paragraph").with_metric(2.0, MetricUnit::FoldChange),
        ];
        let prepared = prepare(&raws);
        let merged = merge_group(&whole_group(&prepared), &prepared, &ranking());
        assert_eq!(merged.metric.unwrap().value.value, 2.0);
        // license only exists on the unranked record; it is still used
        assert_eq!(merged.license_tag.unwrap().source_id, "guess");
    }

    #[test]
    fn statistics_resolve_per_component() {
        let raws = vec![
            RawRecord::new("ASAP3", "supp", "table").with_statistics(StatisticalInfo {
                std_dev: Some(0.1),
                ..Default::default()
            }),
            RawRecord::new("ASAP 3", "pmc", "paragraph").with_statistics(StatisticalInfo {
                sample_size: Some(12),
                std_dev: Some(0.4),
                ..Default::default()
            }),
        ];
        let prepared = prepare(&raws);
        let merged = merge_group(&whole_group(&prepared), &prepared, &ranking());

        let std_dev = merged.statistics.std_dev.as_ref().unwrap();
        assert_eq!(std_dev.value, 0.1);
        assert_eq!(std_dev.source_id, "supp");
        // the table record has no sample size, so the paragraph one fills it
        let n = merged.statistics.sample_size.as_ref().unwrap();
        assert_eq!(n.value, 12);
        assert_eq!(n.source_id, "pmc");
        assert_eq!(n.record_index, 1);
        assert!(merged.statistics.ci_low.is_none());
        assert!(merged.statistics.has_confidence());
    }

    #[test]
    fn references_are_deduplicated() {
        let raws = vec![
            RawRecord::new("x1", "a", "table").with_reference(" doi:1 "),
            RawRecord::new("x1", "b", "table").with_reference("doi:1"),
            RawRecord::new("x1", "c", "table").with_reference(""),
        ];
        let prepared = prepare(&raws);
        let merged = merge_group(&whole_group(&prepared), &prepared, &ranking());
        assert_eq!(merged.references, vec!["doi:1"]);
    }

    #[test]
    fn non_finite_metric_is_null() {
        let raws = vec![
            RawRecord::new("x1", "a", "supplement_table").with_metric(f64::NAN, MetricUnit::FoldChange),
            RawRecord::new("x1", "b", "paragraph").with_metric(2.0, MetricUnit::FoldChange),
        ];
        let prepared = prepare(&raws);
        let merged = merge_group(&whole_group(&prepared), &prepared, &ranking());
        assert_eq!(merged.metric.unwrap().source_id, "b");
    }
}
