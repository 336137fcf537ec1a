use std::collections::HashMap;

use serde::Deserialize;

use crate::alias::{AliasRule, AliasTable};
use crate::error::CurateError;
use crate::grouping::NoMergeSet;
use crate::merge::EvidenceRanking;
use crate::quality::MeasuredKinds;

// ---------------------------------------------------------------------------
// Top-level policy
// ---------------------------------------------------------------------------

/// Versioned curation policy. A policy plus an input snapshot fully
/// determines a dataset release; nothing here is mutated during a run.
#[derive(Debug, Clone, Deserialize)]
pub struct CurationPolicy {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub grouping: GroupingConfig,
    #[serde(default)]
    pub aliases: Vec<AliasRule>,
    #[serde(default = "default_evidence_tiers")]
    pub evidence_tiers: HashMap<String, u32>,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub outliers: OutlierConfig,
    #[serde(default)]
    pub gate: GatePolicy,
    #[serde(default)]
    pub columns: ColumnMapping,
}

impl Default for CurationPolicy {
    fn default() -> Self {
        Self {
            name: "default".into(),
            version: String::new(),
            grouping: GroupingConfig::default(),
            aliases: Vec::new(),
            evidence_tiers: default_evidence_tiers(),
            quality: QualityConfig::default(),
            outliers: OutlierConfig::default(),
            gate: GatePolicy::default(),
            columns: ColumnMapping::default(),
        }
    }
}

fn default_evidence_tiers() -> HashMap<String, u32> {
    [
        ("supplement_table", 1),
        ("main_table", 2),
        ("table", 2),
        ("caption", 3),
        ("paragraph", 4),
        ("specialist_db", 5),
        ("fpbase", 6),
        ("computed", 7),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct GroupingConfig {
    #[serde(default = "default_max_edit_distance")]
    pub max_edit_distance: usize,
    /// Pairs of names that must never be fuzzy-merged.
    #[serde(default)]
    pub no_merge: Vec<[String; 2]>,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            max_edit_distance: default_max_edit_distance(),
            no_merge: Vec::new(),
        }
    }
}

fn default_max_edit_distance() -> usize {
    2
}

// ---------------------------------------------------------------------------
// Quality + Outliers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct QualityConfig {
    /// Evidence kinds that count as measured (tier B eligible).
    #[serde(default = "default_measured_evidence")]
    pub measured_evidence: Vec<String>,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            measured_evidence: default_measured_evidence(),
        }
    }
}

fn default_measured_evidence() -> Vec<String> {
    ["supplement_table", "main_table", "table", "caption", "paragraph"]
        .into_iter()
        .map(String::from)
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutlierConfig {
    #[serde(default = "default_z_threshold")]
    pub z_threshold: f64,
    /// Minimum measured records before scoring kicks in.
    #[serde(default = "default_min_corpus")]
    pub min_corpus: usize,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            z_threshold: default_z_threshold(),
            min_corpus: default_min_corpus(),
        }
    }
}

fn default_z_threshold() -> f64 {
    5.0
}

fn default_min_corpus() -> usize {
    3
}

// ---------------------------------------------------------------------------
// Release gate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct GatePolicy {
    #[serde(default = "default_min_total")]
    pub min_total: usize,
    #[serde(default = "default_min_measured")]
    pub min_measured: usize,
    /// Required number of categories with at least `category_min_members`
    /// measured records.
    #[serde(default = "default_min_categories")]
    pub min_categories: usize,
    #[serde(default = "default_category_min_members")]
    pub category_min_members: usize,
    /// Passthrough attribute that holds the category (family) label.
    #[serde(default = "default_category_attribute")]
    pub category_attribute: String,
    #[serde(default = "default_min_unique_reference_ratio")]
    pub min_unique_reference_ratio: f64,
    #[serde(default = "default_min_license_ratio")]
    pub min_license_ratio: f64,
    /// A license tag is approved when it contains any of these
    /// (case-insensitive).
    #[serde(default = "default_approved_licenses")]
    pub approved_licenses: Vec<String>,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            min_total: default_min_total(),
            min_measured: default_min_measured(),
            min_categories: default_min_categories(),
            category_min_members: default_category_min_members(),
            category_attribute: default_category_attribute(),
            min_unique_reference_ratio: default_min_unique_reference_ratio(),
            min_license_ratio: default_min_license_ratio(),
            approved_licenses: default_approved_licenses(),
        }
    }
}

fn default_min_total() -> usize {
    200
}

fn default_min_measured() -> usize {
    120
}

fn default_min_categories() -> usize {
    10
}

fn default_category_min_members() -> usize {
    5
}

fn default_category_attribute() -> String {
    "family".into()
}

fn default_min_unique_reference_ratio() -> f64 {
    0.85
}

fn default_min_license_ratio() -> f64 {
    1.0
}

fn default_approved_licenses() -> Vec<String> {
    vec!["CC BY".into(), "CC-BY".into(), "CC0".into()]
}

// ---------------------------------------------------------------------------
// Column mapping
// ---------------------------------------------------------------------------

/// CSV header names for the record fields. Columns not listed here are
/// carried as passthrough attributes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ColumnMapping {
    pub name: String,
    pub source_id: String,
    pub evidence_type: String,
    pub metric_value: String,
    pub metric_unit: String,
    pub sample_size: String,
    pub std_dev: String,
    pub ci_low: String,
    pub ci_high: String,
    pub reference: String,
    pub license_tag: String,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            name: "name".into(),
            source_id: "source_id".into(),
            evidence_type: "evidence_type".into(),
            metric_value: "metric_value".into(),
            metric_unit: "metric_unit".into(),
            sample_size: "sample_size".into(),
            std_dev: "std_dev".into(),
            ci_low: "ci_low".into(),
            ci_high: "ci_high".into(),
            reference: "reference".into(),
            license_tag: "license_tag".into(),
        }
    }
}

impl ColumnMapping {
    pub fn all(&self) -> [&str; 11] {
        [
            self.name.as_str(),
            self.source_id.as_str(),
            self.evidence_type.as_str(),
            self.metric_value.as_str(),
            self.metric_unit.as_str(),
            self.sample_size.as_str(),
            self.std_dev.as_str(),
            self.ci_low.as_str(),
            self.ci_high.as_str(),
            self.reference.as_str(),
            self.license_tag.as_str(),
        ]
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

fn check_ratio(name: &str, value: f64) -> Result<(), CurateError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(CurateError::ConfigValidation(format!(
            "gate.{name} must be within 0..=1, got {value}"
        )));
    }
    Ok(())
}

impl CurationPolicy {
    pub fn from_toml(input: &str) -> Result<Self, CurateError> {
        let policy: CurationPolicy =
            toml::from_str(input).map_err(|e| CurateError::ConfigParse(e.to_string()))?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<(), CurateError> {
        if self.name.trim().is_empty() {
            return Err(CurateError::ConfigValidation("name must not be empty".into()));
        }

        // Canonicalization policy must compile
        self.alias_table()?;
        self.no_merge_set()?;

        let mut seen_tiers: HashMap<String, (&str, u32)> = HashMap::new();
        for (kind, rank) in &self.evidence_tiers {
            let key = kind.trim().to_lowercase();
            if key.is_empty() {
                return Err(CurateError::ConfigValidation(
                    "evidence_tiers: evidence type must not be empty".into(),
                ));
            }
            if let Some((other, other_rank)) = seen_tiers.insert(key, (kind.as_str(), *rank)) {
                if other_rank != *rank {
                    return Err(CurateError::ConfigValidation(format!(
                        "evidence_tiers: '{other}' and '{kind}' differ only in case but rank {other_rank} vs {rank}"
                    )));
                }
            }
        }

        if !self.outliers.z_threshold.is_finite() || self.outliers.z_threshold <= 0.0 {
            return Err(CurateError::ConfigValidation(format!(
                "outliers.z_threshold must be a positive number, got {}",
                self.outliers.z_threshold
            )));
        }
        if self.outliers.min_corpus < 3 {
            return Err(CurateError::ConfigValidation(format!(
                "outliers.min_corpus must be at least 3, got {}",
                self.outliers.min_corpus
            )));
        }

        check_ratio("min_unique_reference_ratio", self.gate.min_unique_reference_ratio)?;
        check_ratio("min_license_ratio", self.gate.min_license_ratio)?;
        if self.gate.category_min_members == 0 {
            return Err(CurateError::ConfigValidation(
                "gate.category_min_members must be at least 1".into(),
            ));
        }
        if self.gate.category_attribute.trim().is_empty() {
            return Err(CurateError::ConfigValidation(
                "gate.category_attribute must not be empty".into(),
            ));
        }

        let columns = self.columns.all();
        for (i, column) in columns.iter().enumerate() {
            if column.trim().is_empty() {
                return Err(CurateError::ConfigValidation("columns: names must not be empty".into()));
            }
            if columns[..i].contains(column) {
                return Err(CurateError::ConfigValidation(format!(
                    "columns: '{column}' is mapped more than once"
                )));
            }
        }

        Ok(())
    }

    pub fn alias_table(&self) -> Result<AliasTable, CurateError> {
        AliasTable::from_rules(&self.aliases)
    }

    pub fn no_merge_set(&self) -> Result<NoMergeSet, CurateError> {
        NoMergeSet::from_pairs(&self.grouping.no_merge)
    }

    pub fn ranking(&self) -> EvidenceRanking {
        EvidenceRanking::new(&self.evidence_tiers)
    }

    pub fn measured_kinds(&self) -> MeasuredKinds {
        MeasuredKinds::new(&self.quality.measured_evidence)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
name = "biosensor-atlas"
version = "1.3.0"

[grouping]
max_edit_distance = 1
no_merge = [["jGCaMP7a", "jGCaMP7b"], ["jgcamp7c", "jgcamp7s"]]

[[aliases]]
variant = "GCaMP6 fast"
canonical = "GCaMP6f"

[[aliases]]
variant = "GCaMP6-slow"
canonical = "GCaMP6s"

[evidence_tiers]
supplement_table = 1
table = 2
paragraph = 4

[quality]
measured_evidence = ["supplement_table", "table"]

[outliers]
z_threshold = 4.5
min_corpus = 10

[gate]
min_total = 50
min_measured = 30
min_categories = 3
category_attribute = "sensor_family"
min_unique_reference_ratio = 0.8
approved_licenses = ["CC BY", "CC0", "MIT"]

[columns]
name = "protein_name"
reference = "doi"
"#;

    #[test]
    fn parse_full_policy() {
        let p = CurationPolicy::from_toml(FULL).unwrap();
        assert_eq!(p.name, "biosensor-atlas");
        assert_eq!(p.version, "1.3.0");
        assert_eq!(p.grouping.max_edit_distance, 1);
        assert_eq!(p.grouping.no_merge.len(), 2);
        assert_eq!(p.aliases.len(), 2);
        assert_eq!(p.evidence_tiers.len(), 3);
        assert_eq!(p.quality.measured_evidence, vec!["supplement_table", "table"]);
        assert_eq!(p.outliers.z_threshold, 4.5);
        assert_eq!(p.outliers.min_corpus, 10);
        assert_eq!(p.gate.min_total, 50);
        assert_eq!(p.gate.category_attribute, "sensor_family");
        // untouched gate fields keep their defaults
        assert_eq!(p.gate.category_min_members, 5);
        assert_eq!(p.gate.min_license_ratio, 1.0);
        assert_eq!(p.columns.name, "protein_name");
        assert_eq!(p.columns.reference, "doi");
        assert_eq!(p.columns.source_id, "source_id");

        let nm = p.no_merge_set().unwrap();
        assert!(nm.forbids("jgcamp7a", "jgcamp7b"));
        assert_eq!(p.alias_table().unwrap().resolve("GCaMP6 fast").label, "GCaMP6f");
        assert_eq!(p.ranking().rank("paragraph"), 4);
        assert!(!p.measured_kinds().contains("paragraph"));
    }

    #[test]
    fn minimal_policy_uses_defaults() {
        let p = CurationPolicy::from_toml(r#"name = "minimal""#).unwrap();
        assert_eq!(p.grouping.max_edit_distance, 2);
        assert!(p.grouping.no_merge.is_empty());
        assert_eq!(p.ranking().rank("supplement_table"), 1);
        assert_eq!(p.ranking().rank("computed"), 7);
        assert_eq!(p.outliers.z_threshold, 5.0);
        assert_eq!(p.gate.min_total, 200);
        assert_eq!(p.gate.min_measured, 120);
        assert_eq!(p.gate.min_categories, 10);
        assert_eq!(p.gate.min_unique_reference_ratio, 0.85);
        assert!(p.measured_kinds().contains("caption"));
    }

    #[test]
    fn reject_missing_name() {
        let err = CurationPolicy::from_toml("version = \"1\"").unwrap_err();
        assert!(matches!(err, CurateError::ConfigParse(_)));
    }

    #[test]
    fn reject_conflicting_aliases() {
        let input = r#"
name = "bad"
[[aliases]]
variant = "G6"
canonical = "GCaMP6f"
[[aliases]]
variant = "G6"
canonical = "GCaMP6s"
"#;
        let err = CurationPolicy::from_toml(input).unwrap_err();
        assert!(matches!(err, CurateError::AliasConflict { .. }));
    }

    #[test]
    fn reject_degenerate_no_merge_pair() {
        let input = r#"
name = "bad"
[grouping]
no_merge = [["GCaMP6f", "gcamp-6f"]]
"#;
        let err = CurationPolicy::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("both sides normalize"));
    }

    #[test]
    fn reject_malformed_no_merge_pair() {
        let input = r#"
name = "bad"
[grouping]
no_merge = [["only-one"]]
"#;
        let err = CurationPolicy::from_toml(input).unwrap_err();
        assert!(matches!(err, CurateError::ConfigParse(_)));
    }

    #[test]
    fn reject_bad_ratio() {
        let input = r#"
name = "bad"
[gate]
min_license_ratio = 1.5
"#;
        let err = CurationPolicy::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("min_license_ratio"));
    }

    #[test]
    fn reject_bad_z_threshold() {
        let input = r#"
name = "bad"
[outliers]
z_threshold = 0.0
"#;
        let err = CurationPolicy::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("z_threshold"));
    }

    #[test]
    fn reject_case_conflicting_tiers() {
        let input = r#"
name = "bad"
[evidence_tiers]
table = 2
Table = 3
"#;
        let err = CurationPolicy::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("differ only in case"));
    }

    #[test]
    fn reject_duplicate_column() {
        let input = r#"
name = "bad"
[columns]
reference = "name"
"#;
        let err = CurationPolicy::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("mapped more than once"));
    }
}
