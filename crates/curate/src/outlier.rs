//! Corpus-relative outlier rejection on the fold-change scale.
//!
//! Values are compared in log1p space. Each record is scored against the
//! mean and sample standard deviation of the *other* measured records, so a
//! single extreme entry cannot inflate the spread it is judged by. The
//! filter has no fixed bound: rerun it whenever corpus membership changes.

use tracing::{debug, warn};

use crate::model::{MergedRecord, OutlierReason, RemovedOutlier};

/// Relative tolerance under which the spread of the other records is
/// treated as zero.
const ZERO_SPREAD: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct OutlierReport {
    pub kept: Vec<MergedRecord>,
    pub removed: Vec<RemovedOutlier>,
}

/// Leave-one-out z-score for every value. `None` marks a value that differs
/// from others with zero spread (an unbounded z). Requires `values.len() >= 3`.
fn leave_one_out_scores(values: &[f64]) -> Vec<Option<f64>> {
    let n = values.len();
    let global_mean = values.iter().sum::<f64>() / n as f64;
    // Centering keeps the running sums small and limits cancellation.
    let centered: Vec<f64> = values.iter().map(|v| v - global_mean).collect();
    let sum: f64 = centered.iter().sum();
    let sum_sq: f64 = centered.iter().map(|v| v * v).sum();
    let others = (n - 1) as f64;

    centered
        .iter()
        .map(|&x| {
            let mean = (sum - x) / others;
            let ss = ((sum_sq - x * x) - others * mean * mean).max(0.0);
            let std = (ss / (others - 1.0)).sqrt();
            let tol = ZERO_SPREAD * (1.0 + (global_mean + mean).abs());
            let deviation = x - mean;
            if std <= tol {
                if deviation.abs() <= tol {
                    Some(0.0)
                } else {
                    None
                }
            } else {
                Some(deviation / std)
            }
        })
        .collect()
}

/// Drop merged records whose fold-change is an outlier relative to the rest
/// of the corpus (`|z| > z_threshold`). Records without a fold-change are
/// always kept. With fewer than `min_corpus` measured records only
/// fold-changes at or below -1 are removed.
pub fn filter_outliers(records: Vec<MergedRecord>, z_threshold: f64, min_corpus: usize) -> OutlierReport {
    let mut removed = Vec::new();
    let mut verdicts: Vec<Option<RemovedOutlier>> = vec![None; records.len()];

    let mut measured: Vec<(usize, f64)> = Vec::new();
    for (i, record) in records.iter().enumerate() {
        let Some(fold) = record.fold_change() else {
            continue;
        };
        let log = fold.ln_1p();
        if log.is_finite() {
            measured.push((i, log));
        } else {
            verdicts[i] = Some(RemovedOutlier {
                canonical_name: record.canonical_name.clone(),
                fold_change: fold,
                z_score: None,
                reason: OutlierReason::InvalidScale,
            });
        }
    }

    if measured.len() >= min_corpus.max(3) {
        let logs: Vec<f64> = measured.iter().map(|(_, v)| *v).collect();
        let scores = leave_one_out_scores(&logs);
        for ((i, _), score) in measured.iter().zip(scores) {
            let is_outlier = match score {
                Some(z) => z.abs() > z_threshold,
                None => true,
            };
            if is_outlier {
                let record = &records[*i];
                verdicts[*i] = Some(RemovedOutlier {
                    canonical_name: record.canonical_name.clone(),
                    fold_change: record.fold_change().unwrap_or_default(),
                    z_score: score,
                    reason: OutlierReason::ZScore,
                });
            }
        }
    } else {
        debug!(measured = measured.len(), min_corpus, "corpus too small for outlier scoring");
    }

    let mut kept = Vec::with_capacity(records.len());
    for (record, verdict) in records.into_iter().zip(verdicts) {
        match verdict {
            Some(outlier) => {
                warn!(
                    canonical_name = %outlier.canonical_name,
                    fold_change = outlier.fold_change,
                    z_score = ?outlier.z_score,
                    reason = ?outlier.reason,
                    "removed outlier"
                );
                removed.push(outlier);
            }
            None => kept.push(record),
        }
    }

    OutlierReport { kept, removed }
}
