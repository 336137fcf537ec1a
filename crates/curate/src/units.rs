use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::model::{MergedRecord, NormalizedMetric};

/// Encoding of a reported measurement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricUnit {
    FoldChange,
    DeltaOverBaseline,
    PercentChange,
    /// Unit text that matched no known encoding (kept verbatim).
    Unrecognized(String),
}

impl MetricUnit {
    /// Lenient parse of the unit spellings found across harvested sources.
    pub fn parse(text: &str) -> Self {
        match text.trim().to_lowercase().as_str() {
            "fold" | "fold_change" | "fold-change" | "foldchange" | "x" => Self::FoldChange,
            "delta" | "delta_over_baseline" | "delta-over-baseline" | "deltaf_f0" | "deltar_r0"
            | "df/f" | "df/f0" | "dr/r" | "dr/r0" => Self::DeltaOverBaseline,
            "percent" | "percent_change" | "percent-change" | "pct" | "%" => Self::PercentChange,
            _ => Self::Unrecognized(text.trim().to_string()),
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }
}

impl std::fmt::Display for MetricUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FoldChange => write!(f, "fold_change"),
            Self::DeltaOverBaseline => write!(f, "delta_over_baseline"),
            Self::PercentChange => write!(f, "percent_change"),
            Self::Unrecognized(text) => write!(f, "unrecognized({text})"),
        }
    }
}

/// Convert one measurement onto the fold-change scale.
///
/// Null stays null (no imputation). Unrecognized units pass the value
/// through unchanged and flag it low-confidence.
pub fn normalize_metric(value: Option<f64>, unit: &MetricUnit) -> NormalizedMetric {
    let low_confidence = !unit.is_recognized();
    let fold_change = value.filter(|v| v.is_finite()).map(|v| match unit {
        MetricUnit::FoldChange => v,
        MetricUnit::DeltaOverBaseline => v + 1.0,
        MetricUnit::PercentChange => 1.0 + v / 100.0,
        MetricUnit::Unrecognized(_) => v,
    });
    NormalizedMetric {
        fold_change,
        low_confidence: low_confidence && fold_change.is_some(),
    }
}

/// Attach a normalized metric to every merged record.
pub fn normalize_table(records: Vec<MergedRecord>) -> Vec<MergedRecord> {
    records
        .into_iter()
        .map(|mut record| {
            let normalized = match &record.metric {
                Some(m) => normalize_metric(Some(m.value.value), &m.value.unit),
                None => normalize_metric(None, &MetricUnit::FoldChange),
            };
            if normalized.low_confidence {
                warn!(
                    canonical_name = %record.canonical_name,
                    unit = %record.metric.as_ref().map(|m| m.value.unit.to_string()).unwrap_or_default(),
                    "unrecognized metric unit, value passed through as low-confidence"
                );
            }
            record.normalized_metric = Some(normalized);
            record
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_spellings() {
        assert_eq!(MetricUnit::parse("fold"), MetricUnit::FoldChange);
        assert_eq!(MetricUnit::parse(" Fold-Change "), MetricUnit::FoldChange);
        assert_eq!(MetricUnit::parse("deltaF_F0"), MetricUnit::DeltaOverBaseline);
        assert_eq!(MetricUnit::parse("dF/F"), MetricUnit::DeltaOverBaseline);
        assert_eq!(MetricUnit::parse("delta"), MetricUnit::DeltaOverBaseline);
        assert_eq!(MetricUnit::parse("%"), MetricUnit::PercentChange);
        assert_eq!(MetricUnit::parse("percent"), MetricUnit::PercentChange);
        assert_eq!(
            MetricUnit::parse("brightness"),
            MetricUnit::Unrecognized("brightness".into())
        );
        assert_eq!(MetricUnit::parse(""), MetricUnit::Unrecognized(String::new()));
    }

    #[test]
    fn delta_over_baseline_adds_one() {
        let n = normalize_metric(Some(2.0), &MetricUnit::DeltaOverBaseline);
        assert_eq!(n.fold_change, Some(3.0));
        assert!(!n.low_confidence);
    }

    #[test]
    fn percent_change_scales() {
        let n = normalize_metric(Some(150.0), &MetricUnit::PercentChange);
        assert_eq!(n.fold_change, Some(2.5));
    }

    #[test]
    fn fold_change_unchanged() {
        let n = normalize_metric(Some(4.0), &MetricUnit::FoldChange);
        assert_eq!(n.fold_change, Some(4.0));
    }

    #[test]
    fn unrecognized_passes_through_flagged() {
        let n = normalize_metric(Some(7.5), &MetricUnit::Unrecognized("a.u.".into()));
        assert_eq!(n.fold_change, Some(7.5));
        assert!(n.low_confidence);
    }

    #[test]
    fn null_stays_null() {
        for unit in [
            MetricUnit::FoldChange,
            MetricUnit::DeltaOverBaseline,
            MetricUnit::PercentChange,
            MetricUnit::Unrecognized("?".into()),
        ] {
            let n = normalize_metric(None, &unit);
            assert_eq!(n.fold_change, None);
            assert!(!n.low_confidence);
        }
        assert_eq!(normalize_metric(Some(f64::NAN), &MetricUnit::FoldChange).fold_change, None);
    }
}
