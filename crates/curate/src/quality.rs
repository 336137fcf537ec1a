use std::collections::HashSet;

use crate::model::{MergedRecord, QualityTier};

/// Evidence kinds that count as a direct measurement.
#[derive(Debug, Clone, Default)]
pub struct MeasuredKinds {
    kinds: HashSet<String>,
}

impl MeasuredKinds {
    pub fn new<I, S>(kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            kinds: kinds
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    pub fn contains(&self, evidence_type: &str) -> bool {
        self.kinds.contains(&evidence_type.trim().to_lowercase())
    }
}

/// Fixed-order decision tree, exactly one tier per record:
/// A when a sample size or a CI bound is known, B when a metric exists and
/// was read from a measured evidence kind, C otherwise.
pub fn classify_record(record: &MergedRecord, measured: &MeasuredKinds) -> QualityTier {
    if record.statistics.has_confidence() {
        return QualityTier::A;
    }
    match &record.metric {
        Some(m) if measured.contains(&m.value.evidence_type) => QualityTier::B,
        _ => QualityTier::C,
    }
}

pub fn classify_table(records: Vec<MergedRecord>, measured: &MeasuredKinds) -> Vec<MergedRecord> {
    records
        .into_iter()
        .map(|mut record| {
            record.quality_tier = Some(classify_record(&record, measured));
            record
        })
        .collect()
}
