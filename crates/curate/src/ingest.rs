use std::collections::BTreeMap;
use std::str::FromStr;

use tracing::{debug, warn};

use crate::config::ColumnMapping;
use crate::error::CurateError;
use crate::model::{IngestIssue, RawRecord, StatisticalInfo};
use crate::units::MetricUnit;

/// Records read from one CSV snapshot plus the field-level problems found
/// on the way. Every data row yields a record.
#[derive(Debug, Clone, Default)]
pub struct IngestOutput {
    pub records: Vec<RawRecord>,
    pub issues: Vec<IngestIssue>,
}

/// Column positions resolved against the header row.
struct Layout {
    name: usize,
    source_id: usize,
    evidence_type: usize,
    metric_value: Option<usize>,
    metric_unit: Option<usize>,
    sample_size: Option<usize>,
    std_dev: Option<usize>,
    ci_low: Option<usize>,
    ci_high: Option<usize>,
    reference: Option<usize>,
    license_tag: Option<usize>,
    /// (header, position) of every unmapped column.
    attributes: Vec<(String, usize)>,
}

impl Layout {
    fn resolve(headers: &[String], columns: &ColumnMapping) -> Result<Self, CurateError> {
        let find = |name: &str| headers.iter().position(|h| h == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| CurateError::MissingColumn { column: name.into() })
        };

        let mapped = columns.all();
        let attributes = headers
            .iter()
            .enumerate()
            .filter(|(_, h)| !h.is_empty() && !mapped.contains(&h.as_str()))
            .map(|(i, h)| (h.clone(), i))
            .collect();

        Ok(Self {
            name: require(&columns.name)?,
            source_id: require(&columns.source_id)?,
            evidence_type: require(&columns.evidence_type)?,
            metric_value: find(&columns.metric_value),
            metric_unit: find(&columns.metric_unit),
            sample_size: find(&columns.sample_size),
            std_dev: find(&columns.std_dev),
            ci_low: find(&columns.ci_low),
            ci_high: find(&columns.ci_high),
            reference: find(&columns.reference),
            license_tag: find(&columns.license_tag),
            attributes,
        })
    }
}

/// Per-row parsing context; collects issues instead of failing.
struct RowReader<'r> {
    row: usize,
    record: &'r csv::StringRecord,
    headers: &'r [String],
    issues: &'r mut Vec<IngestIssue>,
}

impl RowReader<'_> {
    fn text(&self, idx: usize) -> &str {
        self.record.get(idx).unwrap_or("")
    }

    fn optional_text(&self, idx: Option<usize>) -> &str {
        idx.map(|i| self.text(i)).unwrap_or("")
    }

    /// Blank is null; anything unparseable is null plus an issue.
    fn number<T: FromStr>(&mut self, idx: Option<usize>, accept: impl Fn(&T) -> bool) -> Option<T> {
        let i = idx?;
        let record = self.record;
        let raw = record.get(i).unwrap_or("").trim();
        if raw.is_empty() {
            return None;
        }
        match raw.parse::<T>() {
            Ok(v) if accept(&v) => Some(v),
            _ => {
                let column = self.headers.get(i).cloned().unwrap_or_default();
                warn!(row = self.row, column = %column, value = %raw, "unparseable numeric field treated as null");
                self.issues.push(IngestIssue {
                    row: self.row,
                    column,
                    value: raw.to_string(),
                    message: format!("expected {}", std::any::type_name::<T>()),
                });
                None
            }
        }
    }
}

/// Load a records CSV, mapping columns per `columns`.
///
/// The name, source and evidence-type columns are required; the remaining
/// mapped columns are optional. Unmapped columns become passthrough
/// attributes (blank cells are skipped). Malformed numeric cells are
/// isolated to their field: the row is kept, the field is null, and an
/// `IngestIssue` is recorded.
pub fn load_csv_records(csv_data: &str, columns: &ColumnMapping) -> Result<IngestOutput, CurateError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(csv_data.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
    let layout = Layout::resolve(&headers, columns)?;

    let mut out = IngestOutput::default();

    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let mut row = RowReader {
            row: i + 1,
            record: &record,
            headers: &headers,
            issues: &mut out.issues,
        };

        let metric_value = row.number::<f64>(layout.metric_value, |v| v.is_finite());
        let statistics = StatisticalInfo {
            sample_size: row.number::<u32>(layout.sample_size, |_| true),
            std_dev: row.number::<f64>(layout.std_dev, |v| v.is_finite()),
            ci_low: row.number::<f64>(layout.ci_low, |v| v.is_finite()),
            ci_high: row.number::<f64>(layout.ci_high, |v| v.is_finite()),
        };

        let reference = row.optional_text(layout.reference).trim();
        let mut attributes = BTreeMap::new();
        for (header, idx) in &layout.attributes {
            let value = row.text(*idx).trim();
            if !value.is_empty() {
                attributes.insert(header.clone(), value.to_string());
            }
        }

        out.records.push(RawRecord {
            raw_name: row.text(layout.name).to_string(),
            source_id: row.text(layout.source_id).trim().to_string(),
            evidence_type: row.text(layout.evidence_type).trim().to_string(),
            metric_value,
            metric_unit: MetricUnit::parse(row.optional_text(layout.metric_unit)),
            statistics,
            reference: (!reference.is_empty()).then(|| reference.to_string()),
            license_tag: row.optional_text(layout.license_tag).trim().to_string(),
            attributes,
        });
    }

    debug!(records = out.records.len(), issues = out.issues.len(), "csv ingested");
    Ok(out)
}
