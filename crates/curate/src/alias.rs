use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CurateError;
use crate::normalize::normalize_name;

/// `variant -> canonical`, many-to-one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasRule {
    pub variant: String,
    pub canonical: String,
}

/// Result of resolving one raw name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasResolution {
    /// Canonical label, or the raw name untouched when no rule applied.
    pub label: String,
    /// The raw name, present only when a rule rewrote it.
    pub original: Option<String>,
}

/// Compiled alias rules: an exact-string index plus a normalized-form index.
///
/// Construction rejects conflicting and chained rules, which is what makes
/// `resolve` idempotent.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    exact: HashMap<String, String>,
    normalized: HashMap<String, String>,
}

impl AliasTable {
    pub fn from_rules(rules: &[AliasRule]) -> Result<Self, CurateError> {
        let mut table = Self::default();

        for rule in rules {
            if normalize_name(&rule.variant).is_empty() || normalize_name(&rule.canonical).is_empty() {
                return Err(CurateError::ConfigValidation(format!(
                    "alias '{}' -> '{}': names must not be empty",
                    rule.variant, rule.canonical
                )));
            }

            if let Some(existing) = table.exact.get(&rule.variant) {
                if existing != &rule.canonical {
                    return Err(CurateError::AliasConflict {
                        variant: rule.variant.clone(),
                        first: existing.clone(),
                        second: rule.canonical.clone(),
                    });
                }
            }
            table.exact.insert(rule.variant.clone(), rule.canonical.clone());

            let key = normalize_name(&rule.variant);
            if let Some(existing) = table.normalized.get(&key) {
                if existing != &rule.canonical {
                    return Err(CurateError::AliasConflict {
                        variant: rule.variant.clone(),
                        first: existing.clone(),
                        second: rule.canonical.clone(),
                    });
                }
            }
            table.normalized.insert(key, rule.canonical.clone());
        }

        // A canonical label must resolve to itself.
        for rule in rules {
            if let Some(next) = table.lookup(&rule.canonical) {
                if next != rule.canonical {
                    return Err(CurateError::AliasChain {
                        variant: rule.variant.clone(),
                        canonical: rule.canonical.clone(),
                        next: next.to_string(),
                    });
                }
            }
        }

        Ok(table)
    }

    fn lookup(&self, raw: &str) -> Option<&str> {
        self.exact
            .get(raw)
            .or_else(|| self.normalized.get(&normalize_name(raw)))
            .map(String::as_str)
    }

    /// Exact match first, then the normalized form.
    pub fn resolve(&self, raw: &str) -> AliasResolution {
        match self.lookup(raw) {
            Some(canonical) if canonical != raw => AliasResolution {
                label: canonical.to_string(),
                original: Some(raw.to_string()),
            },
            _ => AliasResolution {
                label: raw.to_string(),
                original: None,
            },
        }
    }

    /// Canonical labels targeted by at least one rule.
    pub fn canonical_labels(&self) -> impl Iterator<Item = &str> {
        self.exact.values().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.exact.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(variant: &str, canonical: &str) -> AliasRule {
        AliasRule {
            variant: variant.into(),
            canonical: canonical.into(),
        }
    }

    #[test]
    fn exact_match_rewrites_and_keeps_original() {
        let table = AliasTable::from_rules(&[rule("GCaMP6 fast", "GCaMP6f")]).unwrap();
        let r = table.resolve("GCaMP6 fast");
        assert_eq!(r.label, "GCaMP6f");
        assert_eq!(r.original.as_deref(), Some("GCaMP6 fast"));
    }

    #[test]
    fn normalized_fallback() {
        let table = AliasTable::from_rules(&[rule("GCaMP6 fast", "GCaMP6f")]).unwrap();
        let r = table.resolve("gcamp6-FAST");
        assert_eq!(r.label, "GCaMP6f");
        assert_eq!(r.original.as_deref(), Some("gcamp6-FAST"));
    }

    #[test]
    fn unmatched_passes_through() {
        let table = AliasTable::from_rules(&[rule("GCaMP6 fast", "GCaMP6f")]).unwrap();
        let r = table.resolve("jRGECO1a");
        assert_eq!(r.label, "jRGECO1a");
        assert!(r.original.is_none());
    }

    #[test]
    fn many_to_one() {
        let table = AliasTable::from_rules(&[
            rule("iGluSnFR3", "iGluSnFR3.v857"),
            rule("SF-iGluSnFR3", "iGluSnFR3.v857"),
        ])
        .unwrap();
        assert_eq!(table.resolve("iGluSnFR3").label, "iGluSnFR3.v857");
        assert_eq!(table.resolve("SF-iGluSnFR3").label, "iGluSnFR3.v857");
        assert_eq!(table.canonical_labels().filter(|c| *c == "iGluSnFR3.v857").count(), 2);
    }

    #[test]
    fn idempotent() {
        let table = AliasTable::from_rules(&[
            rule("GCaMP6 fast", "GCaMP6f"),
            rule("gcamp6-f", "GCaMP6f"),
            rule("dLight 1", "dLight1.1"),
        ])
        .unwrap();
        for raw in ["GCaMP6 fast", "gcamp6 f", "GCaMP6f", "dLight 1", "other"] {
            let once = table.resolve(raw).label;
            assert_eq!(table.resolve(&once).label, once, "raw={raw}");
        }
    }

    #[test]
    fn reject_conflicting_variant() {
        let err = AliasTable::from_rules(&[rule("G6", "GCaMP6f"), rule("G6", "GCaMP6s")]).unwrap_err();
        assert!(matches!(err, CurateError::AliasConflict { .. }));
        assert!(err.to_string().contains("'G6'"));
    }

    #[test]
    fn reject_conflict_after_normalization() {
        let err = AliasTable::from_rules(&[rule("G-6", "GCaMP6f"), rule("g 6", "GCaMP6s")]).unwrap_err();
        assert!(matches!(err, CurateError::AliasConflict { .. }));
    }

    #[test]
    fn reject_chain() {
        let err = AliasTable::from_rules(&[rule("a1", "b1"), rule("b1", "c1")]).unwrap_err();
        assert!(matches!(err, CurateError::AliasChain { .. }));
    }

    #[test]
    fn reject_empty_names() {
        let err = AliasTable::from_rules(&[rule("--", "GCaMP6f")]).unwrap_err();
        assert!(err.to_string().contains("must not be empty"));
    }
}
