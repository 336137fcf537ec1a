use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::units::MetricUnit;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Statistical context reported alongside a measurement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticalInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std_dev: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ci_low: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ci_high: Option<f64>,
}

impl StatisticalInfo {
    /// Number of populated components.
    pub fn field_count(&self) -> usize {
        usize::from(self.sample_size.is_some())
            + usize::from(self.std_dev.is_some())
            + usize::from(self.ci_low.is_some())
            + usize::from(self.ci_high.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.field_count() == 0
    }
}

/// One source observation of one entity, as handed over by an upstream
/// producer (REST harvester, spreadsheet parser, text miner).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub raw_name: String,
    pub source_id: String,
    pub evidence_type: String,
    pub metric_value: Option<f64>,
    pub metric_unit: MetricUnit,
    #[serde(default)]
    pub statistics: StatisticalInfo,
    pub reference: Option<String>,
    #[serde(default)]
    pub license_tag: String,
    /// Opaque passthrough columns (family, excitation_nm, ...).
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl RawRecord {
    pub fn new(raw_name: impl Into<String>, source_id: impl Into<String>, evidence_type: impl Into<String>) -> Self {
        Self {
            raw_name: raw_name.into(),
            source_id: source_id.into(),
            evidence_type: evidence_type.into(),
            metric_value: None,
            metric_unit: MetricUnit::Unrecognized(String::new()),
            statistics: StatisticalInfo::default(),
            reference: None,
            license_tag: String::new(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_metric(mut self, value: f64, unit: MetricUnit) -> Self {
        self.metric_value = Some(value);
        self.metric_unit = unit;
        self
    }

    pub fn with_statistics(mut self, statistics: StatisticalInfo) -> Self {
        self.statistics = statistics;
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_license(mut self, license_tag: impl Into<String>) -> Self {
        self.license_tag = license_tag.into();
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// The metric value, with non-finite values treated as null.
    pub fn metric(&self) -> Option<f64> {
        self.metric_value.filter(|v| v.is_finite())
    }

    /// Trimmed reference, `None` when blank.
    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref().map(str::trim).filter(|r| !r.is_empty())
    }

    /// Count of non-null fields, used to break evidence-tier ties.
    pub fn completeness(&self) -> usize {
        usize::from(self.metric().is_some())
            + self.statistics.field_count()
            + usize::from(self.reference().is_some())
            + usize::from(!self.license_tag.trim().is_empty())
            + usize::from(!self.evidence_type.trim().is_empty())
            + self.attributes.values().filter(|v| !v.trim().is_empty()).count()
    }
}

/// A record after alias resolution and name normalization. Borrows the
/// source row; `normalized_name` is always derived, never stored upstream.
#[derive(Debug, Clone)]
pub struct PreparedRecord<'a> {
    /// Position in the input table (first-seen order).
    pub index: usize,
    pub record: &'a RawRecord,
    /// Name after alias rewriting (equals `raw_name` when no rule applied).
    pub label: String,
    /// Original raw name, kept for audit when an alias rewrote it.
    pub original_name: Option<String>,
    pub normalized_name: String,
}

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

/// Records judged to share one identity. Ephemeral: rebuilt on every run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalGroup {
    pub canonical_name: String,
    /// Distinct normalized names, in join order (representative first).
    pub members: Vec<String>,
    /// Indices of the member records in the input table.
    pub record_indices: Vec<usize>,
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// A merged field value and the record it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolved<T> {
    pub value: T,
    pub source_id: String,
    pub record_index: usize,
}

/// A measurement travels as one unit: value, its encoding and the kind of
/// evidence it was read from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    pub value: f64,
    pub unit: MetricUnit,
    pub evidence_type: String,
}

/// Measurement on the common fold-change scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NormalizedMetric {
    pub fold_change: Option<f64>,
    /// Set when the source unit was not recognized.
    pub low_confidence: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum QualityTier {
    A,
    B,
    C,
}

impl std::fmt::Display for QualityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
            Self::C => write!(f, "C"),
        }
    }
}

/// Statistics resolved component by component. Each part may come from a
/// different member of the group.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergedStatistics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_size: Option<Resolved<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std_dev: Option<Resolved<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ci_low: Option<Resolved<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ci_high: Option<Resolved<f64>>,
}

impl MergedStatistics {
    pub fn is_empty(&self) -> bool {
        self.sample_size.is_none() && self.std_dev.is_none() && self.ci_low.is_none() && self.ci_high.is_none()
    }

    /// Sample size or any confidence-interval bound resolved.
    pub fn has_confidence(&self) -> bool {
        self.sample_size.is_some() || self.ci_low.is_some() || self.ci_high.is_some()
    }
}

/// One resolved output row per canonical group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedRecord {
    pub canonical_name: String,
    pub display_name: String,
    pub members: Vec<String>,
    pub source_ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub aliased_from: Vec<String>,
    pub metric: Option<Resolved<Measurement>>,
    pub statistics: MergedStatistics,
    pub evidence_type: Option<Resolved<String>>,
    pub license_tag: Option<Resolved<String>>,
    pub attributes: BTreeMap<String, Resolved<String>>,
    pub references: Vec<String>,
    pub normalized_metric: Option<NormalizedMetric>,
    pub quality_tier: Option<QualityTier>,
}

impl MergedRecord {
    /// Fold-change value, if the record is measured on the common scale.
    pub fn fold_change(&self) -> Option<f64> {
        self.normalized_metric.and_then(|m| m.fold_change)
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(|r| r.value.as_str())
    }
}

// ---------------------------------------------------------------------------
// Outliers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierReason {
    /// |z| above the configured threshold.
    ZScore,
    /// Fold-change at or below -1; log1p is undefined.
    InvalidScale,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemovedOutlier {
    pub canonical_name: String,
    pub fold_change: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z_score: Option<f64>,
    pub reason: OutlierReason,
}

// ---------------------------------------------------------------------------
// Threshold gate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GateDecision {
    #[serde(rename = "GO")]
    Go,
    #[serde(rename = "NO-GO")]
    NoGo,
}

impl std::fmt::Display for GateDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Go => write!(f, "GO"),
            Self::NoGo => write!(f, "NO-GO"),
        }
    }
}

/// Outcome of a single release threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdCheck {
    pub name: String,
    pub actual: f64,
    pub required: f64,
    pub passed: bool,
    /// How far below the requirement the corpus is (0 when passed).
    pub shortfall: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateVerdict {
    pub decision: GateDecision,
    pub checks: Vec<ThresholdCheck>,
}

impl GateVerdict {
    pub fn is_go(&self) -> bool {
        self.decision == GateDecision::Go
    }

    pub fn failures(&self) -> impl Iterator<Item = &ThresholdCheck> {
        self.checks.iter().filter(|c| !c.passed)
    }
}

// ---------------------------------------------------------------------------
// Ingest
// ---------------------------------------------------------------------------

/// A field-level problem isolated to one input row. The row is kept with
/// the offending field treated as null.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestIssue {
    /// 1-based data row (header excluded).
    pub row: usize,
    pub column: String,
    pub value: String,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CurationSummary {
    pub raw_records: usize,
    pub unnamed_records: usize,
    pub aliased_records: usize,
    pub groups: usize,
    pub multi_member_groups: usize,
    pub merged: usize,
    pub outliers_removed: usize,
    pub measured: usize,
    pub low_confidence_units: usize,
    pub tier_counts: BTreeMap<String, usize>,
    /// Measured records per value of the gate's category attribute.
    pub measured_per_category: BTreeMap<String, usize>,
    /// Distinct `source_id`s across the input, first-seen order.
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CurationMeta {
    pub policy_name: String,
    pub policy_version: String,
    pub engine_version: String,
    pub run_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CurationResult {
    pub meta: CurationMeta,
    pub summary: CurationSummary,
    pub records: Vec<MergedRecord>,
    pub outliers: Vec<RemovedOutlier>,
    /// Input rows whose name normalized to nothing; never grouped.
    pub unnamed: Vec<usize>,
    pub verdict: GateVerdict,
}
