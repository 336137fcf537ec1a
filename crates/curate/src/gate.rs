use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::config::GatePolicy;
use crate::model::{GateDecision, GateVerdict, MergedRecord, ThresholdCheck};

fn check(name: &str, actual: f64, required: f64) -> ThresholdCheck {
    let passed = actual >= required;
    ThresholdCheck {
        name: name.to_string(),
        actual,
        required,
        passed,
        shortfall: (required - actual).max(0.0),
    }
}

/// Lowercase, with hyphens, underscores and whitespace runs folded to a
/// single space: "CC-BY 4.0" and "cc by  4.0" compare equal.
fn license_key(tag: &str) -> String {
    tag.to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// "4.0", "v3", "1.0.2": a bare version label.
fn is_version(s: &str) -> bool {
    let digits = s.strip_prefix('v').unwrap_or(s);
    digits.starts_with(|c: char| c.is_ascii_digit()) && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
}

/// A tag is approved when it equals an approved tag, optionally followed
/// by a version. "CC BY-NC 4.0" does not match "CC BY".
fn is_approved(tag: &str, approved: &[String]) -> bool {
    let tag = license_key(tag);
    approved.iter().map(|a| license_key(a)).any(|a| {
        if a.is_empty() {
            return false;
        }
        match tag.strip_prefix(a.as_str()) {
            Some("") => true,
            Some(rest) => rest.strip_prefix(' ').is_some_and(is_version),
            None => false,
        }
    })
}

/// Evaluate the merged corpus against the release policy.
///
/// Every threshold is always reported; a NO-GO lists each failing one with
/// its shortfall. The corpus is never modified.
pub fn evaluate(records: &[MergedRecord], policy: &GatePolicy) -> GateVerdict {
    let total = records.len();
    let measured: Vec<&MergedRecord> = records.iter().filter(|r| r.fold_change().is_some()).collect();

    let mut per_category: BTreeMap<&str, usize> = BTreeMap::new();
    for r in &measured {
        if let Some(category) = r.attribute(&policy.category_attribute) {
            let category = category.trim();
            if !category.is_empty() {
                *per_category.entry(category).or_default() += 1;
            }
        }
    }
    let categories = per_category
        .values()
        .filter(|&&n| n >= policy.category_min_members)
        .count();

    let distinct_refs: HashSet<&str> = measured
        .iter()
        .flat_map(|r| r.references.iter().map(String::as_str))
        .collect();
    let unique_reference_ratio = if measured.is_empty() {
        0.0
    } else {
        distinct_refs.len() as f64 / measured.len() as f64
    };

    let licensed = records
        .iter()
        .filter(|r| {
            r.license_tag
                .as_ref()
                .is_some_and(|t| is_approved(&t.value, &policy.approved_licenses))
        })
        .count();
    let license_ratio = if total == 0 { 0.0 } else { licensed as f64 / total as f64 };

    let checks = vec![
        check("total", total as f64, policy.min_total as f64),
        check("measured", measured.len() as f64, policy.min_measured as f64),
        check("categories", categories as f64, policy.min_categories as f64),
        check("unique_reference_ratio", unique_reference_ratio, policy.min_unique_reference_ratio),
        check("license_ratio", license_ratio, policy.min_license_ratio),
    ];

    let decision = if checks.iter().all(|c| c.passed) {
        GateDecision::Go
    } else {
        GateDecision::NoGo
    };

    debug!(
        total,
        measured = measured.len(),
        categories,
        unique_reference_ratio,
        license_ratio,
        %decision,
        "gate evaluated"
    );

    GateVerdict { decision, checks }
}
