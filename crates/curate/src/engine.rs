use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::alias::AliasTable;
use crate::config::CurationPolicy;
use crate::error::CurateError;
use crate::gate::evaluate;
use crate::grouping::{group_records, NoMergeSet};
use crate::merge::merge_groups;
use crate::model::{CurationMeta, CurationResult, PreparedRecord, RawRecord};
use crate::normalize::normalize_name;
use crate::outlier::filter_outliers;
use crate::quality::classify_table;
use crate::summary::compute_summary;
use crate::units::normalize_table;

/// Resolve aliases and derive normalized names, preserving input order.
pub fn prepare<'a>(records: &'a [RawRecord], aliases: &AliasTable) -> Vec<PreparedRecord<'a>> {
    records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let resolution = aliases.resolve(&record.raw_name);
            let normalized_name = normalize_name(&resolution.label);
            PreparedRecord {
                index,
                record,
                label: resolution.label,
                original_name: resolution.original,
                normalized_name,
            }
        })
        .collect()
}

/// Every no-merge name must be known to the run, either as a normalized
/// input name or as a normalized alias target.
fn check_no_merge_names(
    no_merge: &NoMergeSet,
    prepared: &[PreparedRecord<'_>],
    aliases: &AliasTable,
) -> Result<(), CurateError> {
    let mut known: HashSet<String> = prepared.iter().map(|p| p.normalized_name.clone()).collect();
    known.extend(aliases.canonical_labels().map(normalize_name));

    let mut unknown: Vec<&str> = no_merge.names().filter(|n| !known.contains(*n)).collect();
    unknown.sort_unstable();
    match unknown.first() {
        Some(name) => Err(CurateError::UnknownNoMergeName(name.to_string())),
        None => Ok(()),
    }
}

/// Run the full curation pipeline for one policy + input snapshot.
///
/// Stages run strictly forward; each consumes the previous table and
/// builds a new one. The only fatal errors are policy errors, all of which
/// are raised before the first stage.
pub fn run(policy: &CurationPolicy, records: &[RawRecord]) -> Result<CurationResult, CurateError> {
    let aliases = policy.alias_table()?;
    let no_merge = policy.no_merge_set()?;
    let ranking = policy.ranking();
    let measured_kinds = policy.measured_kinds();

    let prepared = prepare(records, &aliases);
    check_no_merge_names(&no_merge, &prepared, &aliases)?;
    debug!(
        records = prepared.len(),
        aliased = prepared.iter().filter(|p| p.original_name.is_some()).count(),
        "prepared records"
    );

    let grouping = group_records(&prepared, policy.grouping.max_edit_distance, &no_merge);
    for &i in &grouping.unnamed {
        warn!(row = i, raw_name = %records[i].raw_name, "record has no usable name, excluded from grouping");
    }

    let merged = merge_groups(&grouping.groups, &prepared, &ranking);
    debug!(merged = merged.len(), "merged groups");

    let normalized = normalize_table(merged);
    let classified = classify_table(normalized, &measured_kinds);

    let report = filter_outliers(classified, policy.outliers.z_threshold, policy.outliers.min_corpus);
    debug!(kept = report.kept.len(), removed = report.removed.len(), "outlier filter applied");

    let verdict = evaluate(&report.kept, &policy.gate);
    let summary = compute_summary(
        &prepared,
        &grouping,
        &report.kept,
        &report.removed,
        &policy.gate.category_attribute,
    );

    info!(
        policy = %policy.name,
        raw = summary.raw_records,
        merged = summary.merged,
        measured = summary.measured,
        outliers = summary.outliers_removed,
        decision = %verdict.decision,
        "curation run complete"
    );
    for failure in verdict.failures() {
        info!(
            check = %failure.name,
            actual = failure.actual,
            required = failure.required,
            shortfall = failure.shortfall,
            "threshold not met"
        );
    }

    Ok(CurationResult {
        meta: CurationMeta {
            policy_name: policy.name.clone(),
            policy_version: policy.version.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
        },
        summary,
        records: report.kept,
        outliers: report.removed,
        unnamed: grouping.unnamed,
        verdict,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::AliasRule;
    use crate::model::{QualityTier, StatisticalInfo};
    use crate::units::MetricUnit;

    fn policy() -> CurationPolicy {
        let mut p = CurationPolicy::default();
        p.gate.min_total = 1;
        p.gate.min_measured = 1;
        p.gate.min_categories = 0;
        p.gate.min_unique_reference_ratio = 0.0;
        p.gate.min_license_ratio = 0.0;
        p
    }

    #[test]
    fn dlight_variants_merge_to_table_value() {
        let records = vec![
            RawRecord::new("dLight1.1", "supp", "table")
                .with_metric(3.5, MetricUnit::DeltaOverBaseline)
                .with_reference("10.1126/science.aat4422"),
            RawRecord::new("dLight 1.1", "pmc", "paragraph")
                .with_metric(3.2, MetricUnit::DeltaOverBaseline)
                .with_reference("PMCID:PMC6034"),
        ];
        let result = run(&policy(), &records).unwrap();
        assert_eq!(result.records.len(), 1);

        let r = &result.records[0];
        assert_eq!(r.canonical_name, "dlight11");
        assert_eq!(r.fold_change(), Some(4.5));
        assert_eq!(r.quality_tier, Some(QualityTier::B));
        assert_eq!(r.metric.as_ref().unwrap().source_id, "supp");
        assert_eq!(r.references.len(), 2);
        assert!(result.verdict.is_go());
        assert_eq!(result.summary.multi_member_groups, 1);
    }

    #[test]
    fn sample_size_from_weaker_member_reaches_tier_a() {
        let records = vec![
            RawRecord::new("ASAP3", "supp", "table")
                .with_metric(0.51, MetricUnit::DeltaOverBaseline)
                .with_statistics(StatisticalInfo {
                    std_dev: Some(0.1),
                    ..Default::default()
                }),
            RawRecord::new("ASAP 3", "pmc", "paragraph").with_statistics(StatisticalInfo {
                sample_size: Some(12),
                ..Default::default()
            }),
        ];
        let result = run(&policy(), &records).unwrap();
        assert_eq!(result.records.len(), 1);

        let r = &result.records[0];
        assert_eq!(r.quality_tier, Some(QualityTier::A));
        assert_eq!(r.statistics.std_dev.as_ref().unwrap().source_id, "supp");
        assert_eq!(r.statistics.sample_size.as_ref().unwrap().value, 12);
    }

    #[test]
    fn no_merge_keeps_variants_apart() {
        let mut p = policy();
        p.grouping.no_merge = vec![["jGCaMP7a".into(), "jGCaMP7b".into()]];
        let records = vec![
            RawRecord::new("jGCaMP7a", "s1", "table").with_metric(20.0, MetricUnit::DeltaOverBaseline),
            RawRecord::new("jGCaMP7b", "s1", "table").with_metric(25.0, MetricUnit::DeltaOverBaseline),
        ];
        let result = run(&p, &records).unwrap();
        let names: Vec<&str> = result.records.iter().map(|r| r.canonical_name.as_str()).collect();
        assert_eq!(names, vec!["jgcamp7a", "jgcamp7b"]);
    }

    #[test]
    fn alias_applied_before_grouping() {
        let mut p = policy();
        p.grouping.max_edit_distance = 0;
        p.aliases = vec![AliasRule {
            variant: "GCaMP6 fast".into(),
            canonical: "GCaMP6f".into(),
        }];
        let records = vec![
            RawRecord::new("GCaMP6 fast", "a", "paragraph"),
            RawRecord::new("GCaMP6f", "b", "table"),
        ];
        let result = run(&p, &records).unwrap();
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].aliased_from, vec!["GCaMP6 fast"]);
        assert_eq!(result.summary.aliased_records, 1);
    }

    #[test]
    fn unknown_no_merge_name_is_fatal() {
        let mut p = policy();
        p.grouping.no_merge = vec![["jGCaMP7a".into(), "XCaMP-Y".into()]];
        let records = vec![RawRecord::new("jGCaMP7a", "s1", "table")];
        let err = run(&p, &records).unwrap_err();
        assert!(matches!(err, CurateError::UnknownNoMergeName(ref n) if n == "xcampy"));
    }

    #[test]
    fn alias_target_counts_as_known_name() {
        let mut p = policy();
        p.aliases = vec![AliasRule {
            variant: "G7b".into(),
            canonical: "jGCaMP7b".into(),
        }];
        p.grouping.no_merge = vec![["jGCaMP7a".into(), "jGCaMP7b".into()]];
        let records = vec![RawRecord::new("jGCaMP7a", "s1", "table")];
        assert!(run(&p, &records).is_ok());
    }

    #[test]
    fn unnamed_records_are_surfaced() {
        let records = vec![
            RawRecord::new("  ", "s1", "table"),
            RawRecord::new("ASAP3", "s1", "table").with_metric(0.5, MetricUnit::DeltaOverBaseline),
        ];
        let result = run(&policy(), &records).unwrap();
        assert_eq!(result.unnamed, vec![0]);
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.summary.unnamed_records, 1);
    }

    #[test]
    fn no_go_is_data_not_error() {
        let records = vec![RawRecord::new("ASAP3", "s1", "table")];
        let result = run(&CurationPolicy::default(), &records).unwrap();
        assert!(!result.verdict.is_go());
        assert!(result.verdict.failures().any(|c| c.name == "total"));
    }

    #[test]
    fn meta_carries_policy_identity() {
        let mut p = policy();
        p.name = "atlas".into();
        p.version = "2.1.0".into();
        let result = run(&p, &[]).unwrap();
        assert_eq!(result.meta.policy_name, "atlas");
        assert_eq!(result.meta.policy_version, "2.1.0");
        assert_eq!(result.meta.engine_version, env!("CARGO_PKG_VERSION"));
        assert!(!result.meta.run_at.is_empty());
    }
}
